//! # backplane-core
//!
//! Core descriptor and type-matching model for the Backplane dispatch
//! engine.
//!
//! This crate has minimal dependencies and is designed to be imported by
//! backend packages that declare implementations without needing the full
//! `backplane` engine:
//!
//! - [`TypeSet`] / [`TypeEntry`] — named, possibly subclass-aware sets of
//!   type identifiers, with matching and specificity ordering
//! - [`DispatchType`] / [`Dispatched`] — the runtime type of a dispatch
//!   value, carrying its declared ancestor chain
//! - [`Backend`] / [`BackendSpec`] — immutable backend descriptors and the
//!   raw intake record they are validated from
//! - [`ImplRecord`] — one backend's implementation of one dispatchable
//!   function (target symbol, optional `should_run`, docs)
//!
//! # Error Types
//!
//! - [`IdentError`] — malformed type or symbol identifiers
//! - [`BackendError`] — backend descriptor validation failures

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod backend;
mod error;
mod ident;
mod types;

// Re-exports
pub use backend::{
    Backend, BackendSpec, BackendSpecBuilder, DEFAULT_BACKEND, ImplRecord, TypeSupport,
};
pub use error::{BackendError, BoxError, IdentError};
pub use ident::{split_symbol, valid_backend_name};
pub use types::{Dispatched, DispatchType, FullyLoaded, TypeEntry, TypeKey, TypeSet, TypeUniverse};
