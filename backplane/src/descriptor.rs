//! Declarative backend descriptor files.
//!
//! A backend can ship its registration as a TOML document instead of
//! code, so that registries and discovery tooling can read it without
//! loading the backend itself. The document mirrors [`BackendSpec`]
//! plus an optional `[autogen]` block used by generator tooling to
//! locate the live backend object:
//!
//! ```toml
//! [backend]
//! name = "fancy"
//! primary_types = ["arrays:GpuArray"]
//! secondary_types = ["arrays:CpuArray"]
//!
//! [functions."mylib:divide"]
//! function = "fancy.impls:divide"
//! should_run = "fancy.impls:divide_should_run"
//! uses_context = true
//! additional_docs = "Runs on the GPU."
//!
//! [autogen]
//! object = "fancy.backend:backend"
//! modules = ["fancy.impls"]
//! ```

use crate::error::DescriptorError;
use backplane_core::{BackendSpec, ImplRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Backend metadata section of a descriptor file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BackendMeta {
    /// Backend name.
    pub name: String,
    /// Identifiers of the types this backend specializes.
    #[serde(default)]
    pub primary_types: Vec<String>,
    /// Identifiers of types tolerated alongside a primary match.
    #[serde(default)]
    pub secondary_types: Vec<String>,
    /// Names this backend must outrank.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub higher_priority_than: Vec<String>,
    /// Names this backend must rank below.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lower_priority_than: Vec<String>,
    /// Whether the backend stays disabled until explicitly prioritized.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_opt_in: bool,
}

/// One function entry of a descriptor file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionEntry {
    /// Symbol of the implementation callable.
    pub function: String,
    /// Symbol of the optional `should_run` predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_run: Option<String>,
    /// Whether the implementation wants the dispatch context.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub uses_context: bool,
    /// Backend-specific documentation blurb.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_docs: Option<String>,
}

/// Generator bookkeeping: where the live backend object lives and which
/// modules must be imported to collect its functions.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AutogenMeta {
    /// Symbol of the live backend object.
    pub object: String,
    /// Modules to load before collecting.
    #[serde(default)]
    pub modules: Vec<String>,
}

/// A parsed backend descriptor file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BackendFile {
    /// Backend metadata.
    pub backend: BackendMeta,
    /// Function table keyed by dispatchable-function identifier.
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionEntry>,
    /// Generator bookkeeping, absent in handwritten files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autogen: Option<AutogenMeta>,
}

impl BackendFile {
    /// Parse a descriptor document.
    pub fn from_toml(document: &str) -> Result<Self, DescriptorError> {
        Ok(toml::from_str(document)?)
    }

    /// Render the descriptor as a document.
    pub fn to_toml(&self) -> Result<String, DescriptorError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Lower the descriptor into a raw spec for registration.
    pub fn into_spec(self) -> BackendSpec {
        let functions = self
            .functions
            .into_iter()
            .map(|(api, entry)| {
                let record = ImplRecord {
                    function: entry.function,
                    should_run: entry.should_run,
                    uses_context: entry.uses_context,
                    additional_docs: entry.additional_docs,
                };
                (api, record)
            })
            .collect();
        BackendSpec {
            name: self.backend.name,
            primary_types: self.backend.primary_types,
            secondary_types: self.backend.secondary_types,
            functions,
            higher_priority_than: self.backend.higher_priority_than,
            lower_priority_than: self.backend.lower_priority_than,
            requires_opt_in: self.backend.requires_opt_in,
        }
    }

    /// Build a descriptor from a raw spec.
    pub fn from_spec(spec: BackendSpec) -> Self {
        let functions = spec
            .functions
            .into_iter()
            .map(|(api, record)| {
                let entry = FunctionEntry {
                    function: record.function,
                    should_run: record.should_run,
                    uses_context: record.uses_context,
                    additional_docs: record.additional_docs,
                };
                (api, entry)
            })
            .collect();
        Self {
            backend: BackendMeta {
                name: spec.name,
                primary_types: spec.primary_types,
                secondary_types: spec.secondary_types,
                higher_priority_than: spec.higher_priority_than,
                lower_priority_than: spec.lower_priority_than,
                requires_opt_in: spec.requires_opt_in,
            },
            functions,
            autogen: None,
        }
    }

    /// Probe every symbol the descriptor names.
    ///
    /// Misses are logged and returned, never fatal: a descriptor may
    /// legitimately reference optional dependencies that are absent in
    /// this environment. Live dispatch is where an unresolvable symbol
    /// becomes an error.
    pub fn check_symbols(&self, exists: impl Fn(&str) -> bool) -> Vec<String> {
        let mut missing = Vec::new();
        let mut probe = |symbol: &str| {
            if !exists(symbol) {
                tracing::warn!(
                    backend = %self.backend.name,
                    %symbol,
                    "descriptor references an unresolvable symbol"
                );
                missing.push(symbol.to_string());
            }
        };
        for entry in self.functions.values() {
            probe(&entry.function);
            if let Some(should_run) = &entry.should_run {
                probe(should_run);
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::BackendFile;

    const DOCUMENT: &str = r#"
[backend]
name = "fancy"
primary_types = ["arrays:GpuArray"]
secondary_types = ["arrays:CpuArray"]
requires_opt_in = true

[functions."mylib:divide"]
function = "fancy.impls:divide"
should_run = "fancy.impls:divide_should_run"
uses_context = true
additional_docs = "Runs on the GPU."

[autogen]
object = "fancy.backend:backend"
modules = ["fancy.impls"]
"#;

    #[test]
    fn parses_and_lowers() {
        let file = BackendFile::from_toml(DOCUMENT).unwrap();
        assert_eq!(file.backend.name, "fancy");
        assert_eq!(file.autogen.as_ref().unwrap().modules, ["fancy.impls"]);

        let spec = file.into_spec();
        assert!(spec.requires_opt_in);
        let record = &spec.functions["mylib:divide"];
        assert_eq!(record.function, "fancy.impls:divide");
        assert!(record.uses_context);
    }

    #[test]
    fn round_trips() {
        let file = BackendFile::from_toml(DOCUMENT).unwrap();
        let rendered = file.to_toml().unwrap();
        let again = BackendFile::from_toml(&rendered).unwrap();
        assert_eq!(again.backend.name, file.backend.name);
        assert_eq!(again.functions.len(), file.functions.len());
        assert!(again.functions.contains_key("mylib:divide"));
    }

    #[test]
    fn missing_symbols_are_collected_not_fatal() {
        let file = BackendFile::from_toml(DOCUMENT).unwrap();
        let missing = file.check_symbols(|symbol| symbol == "fancy.impls:divide");
        assert_eq!(missing, ["fancy.impls:divide_should_run"]);

        let none = file.check_symbols(|_| true);
        assert!(none.is_empty());
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(BackendFile::from_toml("backend = 3").is_err());
    }
}
