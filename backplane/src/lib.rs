//! # backplane
//!
//! A multi-backend dynamic dispatch engine.
//!
//! A library builds one [`BackendSystem`] describing which backends
//! exist, which value types each one specializes, and how they rank
//! against each other. Every dispatchable function of the library is
//! then wrapped in a [`Dispatchable`], which routes each call to the
//! highest-priority matching backend (or the library's own default
//! implementation) based on the runtime types of the arguments.
//!
//! Users steer dispatch without touching the call sites:
//!
//! - [`BackendSystem::scope`] builds a [`Scope`] that prioritizes,
//!   disables, forces a type or traces within a dynamic extent
//! - [`OverrideConfig`] applies environment-style overrides (manual
//!   order, prioritize, block) at system construction
//!
//! Backends ship their registration either in code ([`BackendSpec`])
//! or as declarative TOML descriptors ([`descriptor::BackendFile`]).
//!
//! # Crates
//!
//! The descriptor and type-matching model lives in `backplane-core`
//! (re-exported here), which backend packages can depend on without
//! pulling in the engine.

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

pub use backplane_core;

pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod scope;
pub mod system;
pub mod testing;

mod priority;

// Re-exports
pub use backplane_core::{
    Backend, BackendSpec, BackendSpecBuilder, DEFAULT_BACKEND, DispatchType, Dispatched,
    FullyLoaded, ImplRecord, TypeKey, TypeSet, TypeSupport, TypeUniverse,
};
pub use config::OverrideConfig;
pub use dispatch::{DispatchContext, Dispatchable, FunctionResolver, Verdict};
pub use error::{BuildError, ConfigError, DescriptorError, DispatchError, ResolveError, ScopeError};
pub use scope::{CallTrace, Scope, ScopeGuard, TraceHandle, TraceStep};
pub use system::{BackendDiscovery, BackendSystem, SystemBuilder};
