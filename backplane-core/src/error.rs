//! Error types for the core descriptor model.

use thiserror::Error;

/// A boxed error type for user-supplied failure payloads.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from parsing type or symbol identifiers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentError {
    /// The identifier is not of the `namespace:dotted.path` form.
    #[error("invalid identifier {0:?}, expected \"namespace:dotted.path\"")]
    Malformed(String),
}

/// Errors from validating a backend descriptor.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend name contains characters outside the entry-point charset.
    #[error("invalid backend name {0:?}, must use alphanumerics, '_', '.' or '-'")]
    InvalidName(String),

    /// A non-default backend declared no primary types.
    #[error("backend {0:?} must declare at least one primary type")]
    NoPrimaryTypes(String),

    /// A declared type identifier failed to parse.
    #[error("backend {name:?} declares a malformed type identifier")]
    BadTypeIdentifier {
        /// Name of the offending backend.
        name: String,
        /// The underlying parse failure.
        #[source]
        source: IdentError,
    },
}
