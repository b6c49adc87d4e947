//! Override configuration.
//!
//! End users steer a backend system from outside the program through
//! three plain-string inputs, conventionally read from environment
//! variables:
//!
//! - `{PREFIX}_SET_ORDER` — comma-separated `A>B>C` chains forcing a
//!   relative order; later chains override earlier opposite pairs
//! - `{PREFIX}_PRIORITIZE` — comma-separated backend names moved to the
//!   front of the base order (this also enables opt-in backends)
//! - `{PREFIX}_BLOCK` — comma-separated backend names that are never
//!   registered
//!
//! A malformed input is never applied partially: [`OverrideConfig::from_env`]
//! logs a warning and ignores the whole variable.

use crate::error::ConfigError;
use crate::priority::OverrideMap;
use backplane_core::valid_backend_name;
use std::collections::HashSet;

/// Parsed override configuration, consumed by the system builder.
#[derive(Clone, Debug, Default)]
pub struct OverrideConfig {
    overrides: OverrideMap,
    prioritize: Vec<String>,
    block: HashSet<String>,
}

impl OverrideConfig {
    /// An empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the three `{prefix}_*` environment variables. Malformed
    /// variables are logged and ignored in full.
    pub fn from_env(prefix: &str) -> Self {
        type Apply = fn(OverrideConfig, &str) -> Result<OverrideConfig, ConfigError>;
        let sources: [(&str, Apply); 3] = [
            ("SET_ORDER", Self::set_order),
            ("PRIORITIZE", Self::prioritize),
            ("BLOCK", Self::block),
        ];

        let mut config = Self::default();
        for (suffix, apply) in sources {
            let variable = format!("{prefix}_{suffix}");
            let Ok(value) = std::env::var(&variable) else {
                continue;
            };
            // Applied onto a copy so a malformed variable is dropped in
            // full without losing earlier ones.
            match apply(config.clone(), &value) {
                Ok(applied) => config = applied,
                Err(error) => {
                    tracing::warn!(%variable, %error, "ignoring invalid environment variable");
                }
            }
        }
        config
    }

    /// Apply comma-separated `A>B>C` order chains.
    ///
    /// Each adjacent pair records "left outranks right". A later
    /// opposite pair (for example `B>A` after `A>B`) discards the
    /// earlier one, so appending to an existing setting can flip it. A
    /// name repeated within one chain is inconsistent and rejected.
    pub fn set_order(mut self, input: &str) -> Result<Self, ConfigError> {
        for chain in input.split(',').filter(|c| !c.is_empty()) {
            let names: Vec<&str> = chain.split('>').collect();
            let unique: HashSet<&str> = names.iter().copied().collect();
            if unique.len() != names.len() {
                return Err(ConfigError::DuplicateInChain {
                    chain: chain.to_string(),
                });
            }
            for name in &names {
                if !valid_backend_name(name) {
                    return Err(ConfigError::InvalidName {
                        name: (*name).to_string(),
                    });
                }
            }
            for pair in names.windows(2) {
                let (left, right) = (pair[0], pair[1]);
                self.overrides
                    .entry(left.to_string())
                    .or_default()
                    .insert(right.to_string());
                if let Some(opposite) = self.overrides.get_mut(right) {
                    opposite.remove(left);
                }
            }
        }
        Ok(self)
    }

    /// Apply a comma-separated prioritize list.
    pub fn prioritize(mut self, input: &str) -> Result<Self, ConfigError> {
        for name in input.split(',').filter(|n| !n.is_empty()) {
            if !valid_backend_name(name) {
                return Err(ConfigError::InvalidName {
                    name: name.to_string(),
                });
            }
            self.prioritize.push(name.to_string());
        }
        Ok(self)
    }

    /// Apply a comma-separated block list.
    pub fn block(mut self, input: &str) -> Result<Self, ConfigError> {
        for name in input.split(',').filter(|n| !n.is_empty()) {
            if !valid_backend_name(name) {
                return Err(ConfigError::InvalidName {
                    name: name.to_string(),
                });
            }
            self.block.insert(name.to_string());
        }
        Ok(self)
    }

    pub(crate) fn overrides(&self) -> &OverrideMap {
        &self.overrides
    }

    pub(crate) fn prioritize_list(&self) -> &[String] {
        &self.prioritize
    }

    pub(crate) fn blocked(&self, name: &str) -> bool {
        self.block.contains(name)
    }
}
