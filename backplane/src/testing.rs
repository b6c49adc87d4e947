//! Testing utilities.
//!
//! This module provides small collaborators for exercising a backend
//! system without real backends:
//!
//! - [`dummy_spec`]: a canned [`BackendSpec`] whose implementation
//!   symbols follow a fixed naming convention
//! - [`MapResolver`]: a map-backed [`FunctionResolver`] that records
//!   every resolution, so tests can assert on resolution laziness
//! - [`StaticDiscovery`]: a [`BackendDiscovery`] serving a fixed list

use crate::dispatch::{DispatchContext, FunctionResolver, ImplFn, Verdict, VetoFn};
use crate::error::ResolveError;
use crate::system::BackendDiscovery;
use backplane_core::{BackendSpec, ImplRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// The implementation symbol [`dummy_spec`] registers for `api` on the
/// backend `name`.
pub fn dummy_symbol(name: &str, api: &str) -> String {
    let path = api.rsplit(':').next().unwrap_or(api);
    format!("{name}:{path}")
}

/// A minimal backend spec for tests.
///
/// Each identifier in `apis` gets an implementation whose symbol is
/// [`dummy_symbol`]`(name, api)`; register matching callables in a
/// [`MapResolver`].
pub fn dummy_spec(
    name: &str,
    primary: &[&str],
    secondary: &[&str],
    apis: &[&str],
) -> BackendSpec {
    let mut builder = BackendSpec::builder(name);
    for ident in primary {
        builder = builder.primary(*ident);
    }
    for ident in secondary {
        builder = builder.secondary(*ident);
    }
    for api in apis {
        builder = builder.implements(*api, ImplRecord::new(dummy_symbol(name, api)));
    }
    builder.build()
}

/// A [`BackendDiscovery`] that serves a fixed list of specs.
pub struct StaticDiscovery(pub Vec<BackendSpec>);

impl BackendDiscovery for StaticDiscovery {
    fn discover(&self) -> Vec<BackendSpec> {
        self.0.clone()
    }
}

/// A map-backed symbol resolver that logs every resolution.
///
/// Unknown symbols fail with a plain [`ResolveError`], which makes it
/// easy to exercise both descriptor probing and live-dispatch
/// resolution failures.
pub struct MapResolver<A, R> {
    impls: HashMap<String, ImplFn<A, R>>,
    vetoes: HashMap<String, VetoFn<A>>,
    log: Mutex<Vec<String>>,
}

impl<A, R> Default for MapResolver<A, R> {
    fn default() -> Self {
        Self {
            impls: HashMap::new(),
            vetoes: HashMap::new(),
            log: Mutex::new(Vec::new()),
        }
    }
}

impl<A, R> MapResolver<A, R> {
    /// An empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under `symbol`.
    pub fn insert(
        &mut self,
        symbol: impl Into<String>,
        function: impl Fn(&DispatchContext, A) -> R + Send + Sync + 'static,
    ) {
        self.impls.insert(symbol.into(), Arc::new(function));
    }

    /// Register a `should_run` predicate under `symbol`.
    pub fn insert_veto(
        &mut self,
        symbol: impl Into<String>,
        veto: impl Fn(&DispatchContext, &A) -> Verdict + Send + Sync + 'static,
    ) {
        self.vetoes.insert(symbol.into(), Arc::new(veto));
    }

    /// Every symbol resolved so far, in resolution order.
    pub fn resolutions(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl<A, R> FunctionResolver<A, R> for MapResolver<A, R> {
    fn resolve(&self, symbol: &str) -> Result<ImplFn<A, R>, ResolveError> {
        self.log.lock().push(symbol.to_string());
        self.impls
            .get(symbol)
            .map(Arc::clone)
            .ok_or_else(|| ResolveError::new(symbol))
    }

    fn resolve_veto(&self, symbol: &str) -> Result<VetoFn<A>, ResolveError> {
        self.log.lock().push(symbol.to_string());
        self.vetoes
            .get(symbol)
            .map(Arc::clone)
            .ok_or_else(|| ResolveError::new(symbol))
    }
}
