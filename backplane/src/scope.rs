//! Dynamically scoped dispatch configuration.
//!
//! Every backend system has a base state (the full priority order with
//! opt-in backends disabled). A [`Scope`] is a precomputed modification
//! of whatever state was active when it was built: prioritized backends
//! move to the front, disabled ones drop out, a type can be forced, and
//! tracing can be switched on.
//!
//! Entering a scope installs its state into a per-thread slot for this
//! system; dropping the guard restores the exact previous state (token
//! semantics, not a merge). Concurrent threads never observe each
//! other's scopes. Note the sharp edge this implies: a scope is
//! computed relative to the state active at *build* time, so building
//! two scopes eagerly and entering them out of order composes against
//! the build-time state, not the enter-time state.

use crate::error::ScopeError;
use crate::system::{BackendSystem, SystemCore};
use backplane_core::{Backend, DispatchType, TypeUniverse};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ============================================================================
// Tracing
// ============================================================================

/// One step in a per-call trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceStep {
    /// The backend's implementation was invoked.
    Called {
        /// Name of the invoked backend.
        backend: String,
    },
    /// The backend's `should_run` predicate declined the call.
    Vetoed {
        /// Name of the declining backend.
        backend: String,
    },
    /// No candidate accepted; the default implementation ran.
    Fallback,
}

/// Trace of a single dispatched call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallTrace {
    /// Identifier of the dispatchable function.
    pub function: String,
    /// What happened, in evaluation order.
    pub steps: Vec<TraceStep>,
}

/// Clonable handle onto a tracing scope's call buffer.
///
/// Tracing is meant for debugging and human readers; it never changes
/// the result of any call.
#[derive(Clone, Default)]
pub struct TraceHandle(Arc<Mutex<Vec<CallTrace>>>);

impl TraceHandle {
    /// A fresh, empty trace buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn calls(&self) -> Vec<CallTrace> {
        self.0.lock().clone()
    }

    /// Drain the buffer.
    pub fn take(&self) -> Vec<CallTrace> {
        std::mem::take(&mut *self.0.lock())
    }

    /// Number of recorded calls.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub(crate) fn record(&self, trace: CallTrace) {
        self.0.lock().push(trace);
    }
}

impl fmt::Debug for TraceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceHandle({} calls)", self.len())
    }
}

// ============================================================================
// Scope state
// ============================================================================

/// Immutable snapshot of the dispatch configuration active in a scope.
#[derive(Clone, Debug)]
pub struct ScopeState {
    pub(crate) ordered: Arc<[String]>,
    pub(crate) prioritized: Arc<HashSet<String>>,
    pub(crate) forced_type: Option<DispatchType>,
    pub(crate) trace: Option<TraceHandle>,
}

impl ScopeState {
    pub(crate) fn base(ordered: Arc<[String]>) -> Self {
        Self {
            ordered,
            prioritized: Arc::new(HashSet::new()),
            forced_type: None,
            trace: None,
        }
    }

    /// Active backend names in priority order.
    pub fn backends(&self) -> &[String] {
        &self.ordered
    }

    /// Whether `name` is currently prioritized.
    pub fn is_prioritized(&self, name: &str) -> bool {
        self.prioritized.contains(name)
    }

    /// The forced dispatch type, if any.
    pub fn forced_type(&self) -> Option<&DispatchType> {
        self.forced_type.as_ref()
    }
}

/// How to treat unknown backend names during state computation.
pub(crate) enum UnknownBackends {
    Raise,
    Ignore,
}

/// Compute a modified state from `curr`. Pure; the ambient state is not
/// touched.
pub(crate) fn modified_state(
    backends: &IndexMap<String, Backend>,
    universe: &dyn TypeUniverse,
    curr: &ScopeState,
    prioritize: &[String],
    disable: &[String],
    forced_type: Option<DispatchType>,
    trace: bool,
    unknown: UnknownBackends,
) -> Result<ScopeState, ScopeError> {
    let mut prioritize: Vec<&String> = prioritize.iter().collect();
    match unknown {
        UnknownBackends::Raise => {
            for name in prioritize.iter().copied().chain(disable) {
                if !backends.contains_key(name) {
                    return Err(ScopeError::UnknownBackend(name.clone()));
                }
            }
        }
        // Unknown names must not leak into the order; dispatch looks
        // every ordered name up in the backend table.
        UnknownBackends::Ignore => prioritize.retain(|name| backends.contains_key(*name)),
    }

    if let Some(ty) = &forced_type {
        let primary_somewhere = backends
            .values()
            .any(|b| b.primary_types().contains(ty, universe));
        if !primary_somewhere {
            return Err(ScopeError::UnknownForcedType(ty.key().to_string()));
        }
    }

    let mut prioritized: HashSet<String> = (*curr.prioritized).clone();
    prioritized.extend(prioritize.iter().map(|s| (*s).clone()));

    // Prioritized names first, then the previous order; disabled names
    // drop out and duplicates keep their first occurrence.
    let mut ordered: Vec<String> = Vec::with_capacity(prioritize.len() + curr.ordered.len());
    for name in prioritize.iter().copied().chain(curr.ordered.iter()) {
        if disable.iter().any(|d| d == name) || ordered.iter().any(|o| o == name) {
            continue;
        }
        ordered.push(name.clone());
    }

    // A fresh trace shadows any enclosing one while this scope is
    // active; it does not append to it.
    let trace = if trace {
        Some(TraceHandle::new())
    } else {
        curr.trace.clone()
    };

    Ok(ScopeState {
        ordered: ordered.into(),
        prioritized: Arc::new(prioritized),
        forced_type,
        trace,
    })
}

// ============================================================================
// Per-thread active state
// ============================================================================

thread_local! {
    // Active scope state per backend-system instance on this thread.
    static ACTIVE: RefCell<HashMap<u64, Arc<ScopeState>>> = RefCell::new(HashMap::new());
}

/// The state governing dispatch on the calling thread.
pub(crate) fn current_state(core: &SystemCore) -> Arc<ScopeState> {
    ACTIVE
        .with_borrow(|active| active.get(&core.id).cloned())
        .unwrap_or_else(|| core.base_state.load_full())
}

fn install(id: u64, state: Arc<ScopeState>) -> Option<Arc<ScopeState>> {
    ACTIVE.with_borrow_mut(|active| active.insert(id, state))
}

fn restore(id: u64, prev: Option<Arc<ScopeState>>) {
    ACTIVE.with_borrow_mut(|active| match prev {
        Some(state) => {
            active.insert(id, state);
        }
        None => {
            active.remove(&id);
        }
    });
}

// ============================================================================
// Scope
// ============================================================================

/// Builder for a [`Scope`].
///
/// The scope's state is computed against whatever state is active when
/// [`build`](ScopeBuilder::build) runs, and frozen from then on.
pub struct ScopeBuilder<'a> {
    system: &'a BackendSystem,
    prioritize: Vec<String>,
    disable: Vec<String>,
    forced_type: Option<DispatchType>,
    trace: bool,
}

impl<'a> ScopeBuilder<'a> {
    pub(crate) fn new(system: &'a BackendSystem) -> Self {
        Self {
            system,
            prioritize: Vec::new(),
            disable: Vec::new(),
            forced_type: None,
            trace: false,
        }
    }

    /// Prioritize the named backends, in the given order, ahead of the
    /// current order. This may enable a backend that would otherwise
    /// never be chosen (including opt-in backends).
    pub fn prioritize<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prioritize.extend(backends.into_iter().map(Into::into));
        self
    }

    /// Disable the named backends within the scope.
    pub fn disable<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disable.extend(backends.into_iter().map(Into::into));
        self
    }

    /// Dispatch as if `ty` were among every call's argument types.
    /// Replaces any forced type of an enclosing scope.
    pub fn forced_type(mut self, ty: DispatchType) -> Self {
        self.forced_type = Some(ty);
        self
    }

    /// Record a trace entry for every dispatched call in the scope.
    pub fn trace(mut self) -> Self {
        self.trace = true;
        self
    }

    /// Validate and freeze the scope state.
    pub fn build(self) -> Result<Scope, ScopeError> {
        let core = self.system.core();
        let curr = current_state(core);
        let state = modified_state(
            &core.backends,
            core.universe.as_ref(),
            &curr,
            &self.prioritize,
            &self.disable,
            self.forced_type,
            self.trace,
            UnknownBackends::Raise,
        )?;
        Ok(Scope {
            core: Arc::clone(self.system.core_arc()),
            state: Arc::new(state),
            entered: AtomicBool::new(false),
        })
    }
}

/// A precomputed dispatch configuration that can be entered and exited.
///
/// Create one via [`BackendSystem::scope`]. A scope can be entered any
/// number of times, but not while it is already active.
pub struct Scope {
    core: Arc<SystemCore>,
    state: Arc<ScopeState>,
    entered: AtomicBool,
}

impl Scope {
    /// Active backend names, in priority order, within this scope.
    pub fn backends(&self) -> &[String] {
        &self.state.ordered
    }

    /// Whether `name` is prioritized within this scope.
    pub fn is_prioritized(&self, name: &str) -> bool {
        self.state.prioritized.contains(name)
    }

    /// The forced dispatch type, if any.
    pub fn forced_type(&self) -> Option<&DispatchType> {
        self.state.forced_type.as_ref()
    }

    /// Handle onto the scope's trace buffer, if tracing was requested
    /// (or inherited from an enclosing scope).
    pub fn trace_handle(&self) -> Option<TraceHandle> {
        self.state.trace.clone()
    }

    /// Install the scope's state on the calling thread.
    ///
    /// Errors if the scope is already active. The returned guard
    /// restores the exact previous state when dropped, on every exit
    /// path including unwinding.
    pub fn enter(&self) -> Result<ScopeGuard<'_>, ScopeError> {
        if self.entered.swap(true, Ordering::Acquire) {
            return Err(ScopeError::AlreadyEntered);
        }
        let prev = install(self.core.id, Arc::clone(&self.state));
        Ok(ScopeGuard {
            scope: self,
            prev: Some(prev),
            _not_send: PhantomData,
        })
    }

    /// Run `f` with this scope's frozen state active.
    ///
    /// This is the decorator form: the state was fixed when the scope
    /// was built, so every invocation behaves the same regardless of
    /// what is active around the call. Unlike [`enter`](Scope::enter)
    /// it may be used concurrently from several threads.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let prev = install(self.core.id, Arc::clone(&self.state));
        let _restore = RestoreOnDrop {
            id: self.core.id,
            prev: Some(prev),
            _not_send: PhantomData,
        };
        f()
    }

    /// Replace the system's base state with this scope's state.
    ///
    /// Affects every thread with no active scope. This should be done
    /// once, from the main program, never from a library; a warning is
    /// logged if the base state was already modified.
    pub fn apply_globally(&self) {
        let prev = self.core.base_state.load_full();
        if !Arc::ptr_eq(&prev, &self.core.initial_state) {
            tracing::warn!(
                "backend options were previously modified; global changes \
                 should be made once, from the main program"
            );
        }
        if self.state.trace.is_some() {
            tracing::warn!("applying a tracing scope globally; every thread will record into it");
        }
        self.core.base_state.store(Arc::clone(&self.state));
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inactive: Vec<&str> = self
            .core
            .backends
            .keys()
            .filter(|n| !self.state.ordered.iter().any(|o| o == *n))
            .map(String::as_str)
            .collect();
        f.debug_struct("Scope")
            .field("active", &self.state.ordered)
            .field("inactive", &inactive)
            .field("forced_type", &self.state.forced_type)
            .field("tracing", &self.state.trace.is_some())
            .finish()
    }
}

/// Restores the previous dispatch state when dropped.
pub struct ScopeGuard<'a> {
    scope: &'a Scope,
    prev: Option<Option<Arc<ScopeState>>>,
    _not_send: PhantomData<*const ()>,
}

impl ScopeGuard<'_> {
    /// Handle onto the active trace buffer, if any.
    pub fn trace(&self) -> Option<TraceHandle> {
        self.scope.trace_handle()
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if let Some(prev) = self.prev.take() {
            restore(self.scope.core.id, prev);
        }
        self.scope.entered.store(false, Ordering::Release);
    }
}

struct RestoreOnDrop {
    id: u64,
    prev: Option<Option<Arc<ScopeState>>>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for RestoreOnDrop {
    fn drop(&mut self) {
        if let Some(prev) = self.prev.take() {
            restore(self.id, prev);
        }
    }
}
