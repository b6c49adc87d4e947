//! Error types for the dispatch engine.
//!
//! The taxonomy follows the failure surface of the engine:
//!
//! - [`BuildError`] — fatal configuration problems; no partial backend
//!   system is ever exposed
//! - [`ScopeError`] — invalid scope construction or use
//! - [`DispatchError`] — per-call contract violations; these abort only
//!   the offending call
//! - [`ResolveError`] — a symbol resolver could not produce a callable

use backplane_core::BackendError;
pub use backplane_core::BoxError;
use thiserror::Error;

/// Fatal errors raised while constructing a backend system.
#[derive(Error, Debug)]
pub enum BuildError {
    /// An explicitly supplied backend descriptor failed validation.
    #[error("invalid backend descriptor")]
    Backend(#[from] BackendError),

    /// Two backends' priority signals conflict with equal strength.
    /// This is a bug in backend authoring, never silently resolved.
    #[error(
        "backends {a:?} and {b:?} report inconsistent priorities; \
         set a manual order override or remove one of them"
    )]
    InconsistentPriorities {
        /// First backend of the conflicting pair.
        a: String,
        /// Second backend of the conflicting pair.
        b: String,
    },

    /// Declared priorities form a cycle.
    #[error(
        "backends form a priority cycle: {}; break it with an order override such as {suggestion:?}",
        chain.join(" > ")
    )]
    PriorityCycle {
        /// The offending chain, first backend repeated at the end.
        chain: Vec<String>,
        /// An `A>B` override that would break the cycle.
        suggestion: String,
    },
}

/// Malformed override configuration input.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A name does not satisfy the backend-name charset.
    #[error("{name:?} is not a valid backend name")]
    InvalidName {
        /// The offending name.
        name: String,
    },

    /// A backend appears twice in one `A>B>C` order chain.
    #[error("order chain {chain:?} names a backend twice")]
    DuplicateInChain {
        /// The offending chain.
        chain: String,
    },
}

/// Errors raised while reading or writing descriptor files.
#[derive(Error, Debug)]
pub enum DescriptorError {
    /// The document is not a valid descriptor.
    #[error("invalid backend descriptor document")]
    Parse(#[from] toml::de::Error),

    /// The descriptor cannot be rendered as a document.
    #[error("cannot serialize backend descriptor")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors raised while constructing or entering a scope.
#[derive(Error, Debug)]
pub enum ScopeError {
    /// `prioritize`/`disable` named a backend the system does not know.
    #[error("backend {0:?} not found")]
    UnknownBackend(String),

    /// The forced type is not a primary type of any backend, so
    /// dispatch could never succeed for it.
    #[error("type {0:?} is not a primary type of any backend")]
    UnknownForcedType(String),

    /// The scope object is currently active.
    #[error("cannot enter a scope more than once at a time")]
    AlreadyEntered,
}

/// A symbol resolver failed to produce a callable.
#[derive(Error, Debug)]
#[error("failed to resolve symbol {symbol:?}")]
pub struct ResolveError {
    /// The symbol that was looked up.
    pub symbol: String,
    /// Underlying cause, if the resolver reported one.
    #[source]
    pub source: Option<BoxError>,
}

impl ResolveError {
    /// A resolution failure with no further cause.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            source: None,
        }
    }

    /// A resolution failure caused by `source`.
    pub fn with_source(symbol: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            symbol: symbol.into(),
            source: Some(source.into()),
        }
    }
}

/// Per-call dispatch failures. Engine state is never corrupted; the
/// next call proceeds normally.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A `should_run` predicate answered something other than
    /// `Proceed` or `Decline`.
    #[error(
        "should_run of backend {backend:?} for {function:?} must answer \
         Proceed or Decline (got {got:?})"
    )]
    VetoContract {
        /// The offending backend.
        backend: String,
        /// The dispatchable function being called.
        function: String,
        /// Debug rendering of the unexpected verdict.
        got: String,
    },

    /// An implementation or veto symbol failed to resolve during live
    /// dispatch. Unlike descriptor validation, this is fatal for the
    /// call: it genuinely cannot proceed.
    #[error("backend {backend:?} cannot serve {function:?}")]
    Resolution {
        /// The selected backend.
        backend: String,
        /// The dispatchable function being called.
        function: String,
        /// The failed lookup.
        #[source]
        source: ResolveError,
    },
}
