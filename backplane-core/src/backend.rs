//! Backend descriptors.
//!
//! A backend is a named provider of alternative implementations for some
//! subset of a library's dispatchable functions. [`BackendSpec`] is the
//! raw record handed over by discovery or a descriptor file;
//! [`Backend`] is the validated, immutable form the engine works with.

use crate::error::BackendError;
use crate::ident::valid_backend_name;
use crate::types::{DispatchType, TypeSet, TypeUniverse};
use std::collections::{BTreeMap, BTreeSet};

/// Reserved name of the synthetic fallback backend.
pub const DEFAULT_BACKEND: &str = "default";

/// Declarative record for one backend implementation of one
/// dispatchable function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImplRecord {
    /// Symbol of the implementation callable.
    pub function: String,
    /// Symbol of the optional per-call `should_run` predicate.
    pub should_run: Option<String>,
    /// Whether the implementation wants the dispatch context passed in.
    pub uses_context: bool,
    /// Backend-specific documentation blurb.
    pub additional_docs: Option<String>,
}

impl ImplRecord {
    /// A record with just the implementation symbol.
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            should_run: None,
            uses_context: false,
            additional_docs: None,
        }
    }

    /// Attach a `should_run` predicate symbol.
    pub fn with_should_run(mut self, symbol: impl Into<String>) -> Self {
        self.should_run = Some(symbol.into());
        self
    }

    /// Request the dispatch context as first argument.
    pub fn with_context(mut self) -> Self {
        self.uses_context = true;
        self
    }

    /// Attach a documentation blurb.
    pub fn with_docs(mut self, docs: impl Into<String>) -> Self {
        self.additional_docs = Some(docs.into());
        self
    }
}

/// Raw backend descriptor, as supplied by discovery collaborators,
/// descriptor files or directly by a library's own backends.
#[derive(Clone, Debug, Default)]
pub struct BackendSpec {
    /// Backend name (entry-point charset).
    pub name: String,
    /// Identifiers of the types this backend specializes.
    pub primary_types: Vec<String>,
    /// Identifiers of types tolerated alongside a primary match.
    pub secondary_types: Vec<String>,
    /// Function table keyed by dispatchable-function identifier.
    pub functions: BTreeMap<String, ImplRecord>,
    /// Names this backend must outrank.
    pub higher_priority_than: Vec<String>,
    /// Names this backend must rank below.
    pub lower_priority_than: Vec<String>,
    /// Whether the backend stays disabled until explicitly prioritized.
    pub requires_opt_in: bool,
}

impl BackendSpec {
    /// Start building a spec for the named backend.
    pub fn builder(name: impl Into<String>) -> BackendSpecBuilder {
        BackendSpecBuilder {
            spec: BackendSpec {
                name: name.into(),
                ..BackendSpec::default()
            },
        }
    }
}

/// Fluent authoring helper for [`BackendSpec`].
pub struct BackendSpecBuilder {
    spec: BackendSpec,
}

impl BackendSpecBuilder {
    /// Declare a primary type identifier.
    pub fn primary(mut self, ident: impl Into<String>) -> Self {
        self.spec.primary_types.push(ident.into());
        self
    }

    /// Declare a secondary type identifier.
    pub fn secondary(mut self, ident: impl Into<String>) -> Self {
        self.spec.secondary_types.push(ident.into());
        self
    }

    /// Declare that this backend outranks `name`.
    pub fn higher_priority_than(mut self, name: impl Into<String>) -> Self {
        self.spec.higher_priority_than.push(name.into());
        self
    }

    /// Declare that this backend ranks below `name`.
    pub fn lower_priority_than(mut self, name: impl Into<String>) -> Self {
        self.spec.lower_priority_than.push(name.into());
        self
    }

    /// Keep the backend disabled until explicitly prioritized.
    pub fn requires_opt_in(mut self) -> Self {
        self.spec.requires_opt_in = true;
        self
    }

    /// Register an implementation of the dispatchable function `api`.
    pub fn implements(mut self, api: impl Into<String>, record: ImplRecord) -> Self {
        self.spec.functions.insert(api.into(), record);
        self
    }

    /// Finish building.
    pub fn build(self) -> BackendSpec {
        self.spec
    }
}

/// How a backend supports a given type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeSupport {
    /// The backend is the specializing provider for the type.
    Primary,
    /// The backend merely tolerates the type alongside a primary match.
    Secondary,
}

/// Validated, immutable backend descriptor.
#[derive(Clone, Debug)]
pub struct Backend {
    name: String,
    primary_types: TypeSet,
    secondary_types: TypeSet,
    supported_types: TypeSet,
    functions: BTreeMap<String, ImplRecord>,
    higher_priority_than: BTreeSet<String>,
    lower_priority_than: BTreeSet<String>,
    requires_opt_in: bool,
}

impl Backend {
    /// Validate a raw spec into a backend descriptor.
    pub fn from_spec(spec: BackendSpec) -> Result<Self, BackendError> {
        if !valid_backend_name(&spec.name) {
            return Err(BackendError::InvalidName(spec.name));
        }
        let bad_ident = |name: &str| {
            let name = name.to_string();
            move |source| BackendError::BadTypeIdentifier { name, source }
        };
        let primary_types = TypeSet::parse(spec.primary_types.iter().map(String::as_str))
            .map_err(bad_ident(&spec.name))?;
        if primary_types.is_empty() {
            return Err(BackendError::NoPrimaryTypes(spec.name));
        }
        let secondary_types = TypeSet::parse(spec.secondary_types.iter().map(String::as_str))
            .map_err(bad_ident(&spec.name))?;
        let supported_types = primary_types.union(&secondary_types);

        Ok(Self {
            name: spec.name,
            primary_types,
            secondary_types,
            supported_types,
            functions: spec.functions,
            higher_priority_than: spec.higher_priority_than.into_iter().collect(),
            lower_priority_than: spec.lower_priority_than.into_iter().collect(),
            requires_opt_in: spec.requires_opt_in,
        })
    }

    /// The synthetic fallback backend. It declares no functions and is
    /// the only backend allowed an arbitrary primary set.
    pub fn fallback(primary_types: TypeSet) -> Self {
        let supported_types = primary_types.clone();
        Self {
            name: DEFAULT_BACKEND.to_string(),
            primary_types,
            secondary_types: TypeSet::empty(),
            supported_types,
            functions: BTreeMap::new(),
            higher_priority_than: BTreeSet::new(),
            lower_priority_than: BTreeSet::new(),
            requires_opt_in: false,
        }
    }

    /// Backend name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Types this backend specializes.
    pub fn primary_types(&self) -> &TypeSet {
        &self.primary_types
    }

    /// Types tolerated alongside a primary match.
    pub fn secondary_types(&self) -> &TypeSet {
        &self.secondary_types
    }

    /// Primary and secondary types combined.
    pub fn supported_types(&self) -> &TypeSet {
        &self.supported_types
    }

    /// Function table keyed by dispatchable-function identifier.
    pub fn functions(&self) -> &BTreeMap<String, ImplRecord> {
        &self.functions
    }

    /// Whether the backend stays disabled until explicitly prioritized.
    pub fn requires_opt_in(&self) -> bool {
        self.requires_opt_in
    }

    /// How this backend supports `ty`, if at all.
    pub fn support_for(
        &self,
        ty: &DispatchType,
        universe: &dyn TypeUniverse,
    ) -> Option<TypeSupport> {
        if self.primary_types.contains(ty, universe) {
            Some(TypeSupport::Primary)
        } else if self.secondary_types.contains(ty, universe) {
            Some(TypeSupport::Secondary)
        } else {
            None
        }
    }

    /// Whether this backend matches a set of dispatch types: at least
    /// one primary match and no type unknown to the backend.
    pub fn matches(&self, types: &[DispatchType], universe: &dyn TypeUniverse) -> bool {
        let mut any_primary = false;
        for ty in types {
            match self.support_for(ty, universe) {
                Some(TypeSupport::Primary) => any_primary = true,
                Some(TypeSupport::Secondary) => {}
                None => return false,
            }
        }
        any_primary
    }

    /// One-directional priority signal against `other`.
    ///
    /// `Some(2)`/`Some(-2)` for declared overrides, `Some(1)` when this
    /// backend's declared surface is strictly more specific than
    /// `other`'s, `None` when no order can be derived. The engine
    /// evaluates both directions; conflicting signals of equal strength
    /// are an authoring bug reported at construction.
    pub fn compare_with(&self, other: &Backend) -> Option<i8> {
        if self.higher_priority_than.contains(other.name()) {
            return Some(2);
        }
        if self.lower_priority_than.contains(other.name()) {
            return Some(-2);
        }

        // If our primary types are a subset of the other's surface we
        // match more specifically, which means higher priority.
        if other.supported_types.encompasses(&self.primary_types, false) {
            return Some(1);
        }
        if other.primary_types.encompasses(&self.primary_types, true) {
            return Some(1);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::{Backend, BackendSpec, ImplRecord, TypeSupport};
    use crate::error::BackendError;
    use crate::types::{DispatchType, FullyLoaded};

    fn backend(name: &str, primary: &[&str], secondary: &[&str]) -> Backend {
        let mut builder = BackendSpec::builder(name);
        for ident in primary {
            builder = builder.primary(*ident);
        }
        for ident in secondary {
            builder = builder.secondary(*ident);
        }
        Backend::from_spec(builder.build()).unwrap()
    }

    #[test]
    fn spec_validation() {
        let err = Backend::from_spec(BackendSpec::builder("bad name").primary("a:b").build());
        assert!(matches!(err, Err(BackendError::InvalidName(_))));

        let err = Backend::from_spec(BackendSpec::builder("nameless").build());
        assert!(matches!(err, Err(BackendError::NoPrimaryTypes(_))));

        let err = Backend::from_spec(BackendSpec::builder("badtype").primary("oops").build());
        assert!(matches!(err, Err(BackendError::BadTypeIdentifier { .. })));
    }

    #[test]
    fn supported_is_union() {
        let b = backend("floaty", &["builtins:float"], &["builtins:int"]);
        let int = DispatchType::new("builtins:int").unwrap();
        let float = DispatchType::new("builtins:float").unwrap();

        assert_eq!(
            b.support_for(&float, &FullyLoaded),
            Some(TypeSupport::Primary)
        );
        assert_eq!(
            b.support_for(&int, &FullyLoaded),
            Some(TypeSupport::Secondary)
        );
        assert!(b.supported_types().contains(&int, &FullyLoaded));
    }

    #[test]
    fn matching_requires_primary_and_no_unknowns() {
        let b = backend("floaty", &["builtins:float"], &["builtins:int"]);
        let int = DispatchType::new("builtins:int").unwrap();
        let float = DispatchType::new("builtins:float").unwrap();
        let s = DispatchType::new("builtins:str").unwrap();

        assert!(b.matches(&[float.clone()], &FullyLoaded));
        assert!(b.matches(&[float.clone(), int.clone()], &FullyLoaded));
        // Secondary alone is not a match.
        assert!(!b.matches(&[int.clone()], &FullyLoaded));
        // Unknown types disqualify.
        assert!(!b.matches(&[float, s], &FullyLoaded));
        // No types, no match.
        assert!(!b.matches(&[], &FullyLoaded));
    }

    #[test]
    fn specificity_signal() {
        let narrow = backend("narrow", &["builtins:int"], &[]);
        let wide = backend("wide", &["builtins:float"], &["builtins:int"]);

        assert_eq!(narrow.compare_with(&wide), Some(1));
        assert_eq!(wide.compare_with(&narrow), None);
    }

    #[test]
    fn declared_overrides_beat_specificity() {
        let spec = BackendSpec::builder("pushy")
            .primary("builtins:float")
            .primary("builtins:int")
            .higher_priority_than("wide")
            .implements("lib:f", ImplRecord::new("pushy:f"))
            .build();
        let pushy = Backend::from_spec(spec).unwrap();
        let wide = backend("wide", &["builtins:float"], &["builtins:int"]);

        assert_eq!(pushy.compare_with(&wide), Some(2));
        assert_eq!(wide.compare_with(&pushy), Some(1));
    }
}
