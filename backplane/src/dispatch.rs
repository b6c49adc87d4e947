//! Per-call dispatch.
//!
//! A [`Dispatchable`] wraps one library function: a default
//! implementation, an extractor that pulls the dispatch-relevant values
//! out of the argument bundle, and a [`FunctionResolver`] that turns the
//! symbol strings of backend descriptors into typed callables.
//!
//! Calling one runs a fixed state machine: extract the dispatch types,
//! add the forced type of the active scope, filter and match them
//! against the active backend order (through the system's bounded
//! cache), then try the matching backends in priority order. A backend
//! with a `should_run` predicate is asked first; declining costs
//! nothing further because its implementation symbol is only resolved
//! on acceptance. The first acceptance wins. If nothing matches or
//! everything declines, the default implementation runs.

use crate::error::{DispatchError, ResolveError};
use crate::scope::{CallTrace, TraceStep, current_state};
use crate::system::BackendSystem;
use backplane_core::{DEFAULT_BACKEND, DispatchType, ImplRecord};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A typed backend implementation callable.
pub type ImplFn<A, R> = Arc<dyn Fn(&DispatchContext, A) -> R + Send + Sync>;

/// A typed `should_run` predicate callable.
pub type VetoFn<A> = Arc<dyn Fn(&DispatchContext, &A) -> Verdict + Send + Sync>;

/// An extractor producing the dispatch types of an argument bundle.
pub type ExtractFn<A> = Arc<dyn Fn(&A) -> Vec<DispatchType> + Send + Sync>;

/// Answer of a `should_run` predicate.
///
/// Predicates must answer [`Proceed`](Verdict::Proceed) or
/// [`Decline`](Verdict::Decline); anything else fails the call. The
/// strictness keeps the door open for richer answers later without
/// silently treating them as one of the two.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Use this backend for the call.
    Proceed,
    /// Skip this backend and keep looking.
    Decline,
    /// An out-of-contract answer, carried for diagnostics.
    Other(String),
}

/// Resolves the symbol strings of backend descriptors to typed
/// callables.
///
/// Symbols have the shape `"namespace:dotted.path"`. The engine
/// resolves implementations as late as possible and memoizes the
/// result, so a resolver may be arbitrarily expensive on first use but
/// must stay consistent: resolving the same symbol twice must produce
/// an equivalent callable.
pub trait FunctionResolver<A, R>: Send + Sync {
    /// Resolve an implementation symbol.
    fn resolve(&self, symbol: &str) -> Result<ImplFn<A, R>, ResolveError>;

    /// Resolve a `should_run` predicate symbol.
    fn resolve_veto(&self, symbol: &str) -> Result<VetoFn<A>, ResolveError>;
}

/// Per-call information handed to implementations and `should_run`
/// predicates.
///
/// Backends with more than one primary type must consult
/// [`types`](DispatchContext::types) to decide which type to return
/// when several are present.
#[derive(Clone, Debug)]
pub struct DispatchContext {
    types: Arc<[DispatchType]>,
    backend: Arc<str>,
    prioritized: bool,
}

impl DispatchContext {
    /// The unique known dispatch types of this call, including a forced
    /// type even when no argument carries it.
    pub fn types(&self) -> &[DispatchType] {
        &self.types
    }

    /// Name of the backend selected (or being asked).
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Whether the selected backend is explicitly prioritized in the
    /// active scope. Useful when deciding whether to decline.
    pub fn prioritized(&self) -> bool {
        self.prioritized
    }
}

// One backend's implementation of one function. Both callables resolve
// lazily: the veto at first consideration, the implementation only on
// first acceptance. `OnceLock` keeps a race benign, the losing
// resolution is dropped.
struct ImplSlot<A, R> {
    record: ImplRecord,
    function: OnceLock<ImplFn<A, R>>,
    veto: OnceLock<Option<VetoFn<A>>>,
}

impl<A, R> ImplSlot<A, R> {
    fn new(record: ImplRecord) -> Self {
        Self {
            record,
            function: OnceLock::new(),
            veto: OnceLock::new(),
        }
    }

    fn prefilled(record: ImplRecord, function: ImplFn<A, R>) -> Self {
        let slot = Self::new(record);
        let _ = slot.function.set(function);
        let _ = slot.veto.set(None);
        slot
    }

    fn veto(
        &self,
        resolver: &dyn FunctionResolver<A, R>,
    ) -> Result<Option<&VetoFn<A>>, ResolveError> {
        if let Some(v) = self.veto.get() {
            return Ok(v.as_ref());
        }
        let resolved = match &self.record.should_run {
            Some(symbol) => Some(resolver.resolve_veto(symbol)?),
            None => None,
        };
        Ok(self.veto.get_or_init(|| resolved).as_ref())
    }

    fn function(
        &self,
        resolver: &dyn FunctionResolver<A, R>,
    ) -> Result<&ImplFn<A, R>, ResolveError> {
        if let Some(f) = self.function.get() {
            return Ok(f);
        }
        let resolved = resolver.resolve(&self.record.function)?;
        Ok(self.function.get_or_init(|| resolved))
    }
}

/// One dispatchable library function.
///
/// `A` is the argument bundle consumed by a call, `R` the return type.
/// Construction snapshots the backend table; the only mutation
/// afterward is the memoization of resolved symbols.
pub struct Dispatchable<A, R> {
    system: BackendSystem,
    ident: String,
    doc: Option<String>,
    extract: ExtractFn<A>,
    resolver: Arc<dyn FunctionResolver<A, R>>,
    slots: HashMap<String, ImplSlot<A, R>>,
}

impl<A, R> Dispatchable<A, R> {
    /// Wrap the default implementation `fallback` as the dispatchable
    /// function `ident`.
    ///
    /// `extract` pulls the dispatch values' types out of the argument
    /// bundle; arguments it skips are invisible to dispatch.
    pub fn new(
        system: &BackendSystem,
        ident: impl Into<String>,
        resolver: Arc<dyn FunctionResolver<A, R>>,
        extract: impl Fn(&A) -> Vec<DispatchType> + Send + Sync + 'static,
        fallback: impl Fn(&DispatchContext, A) -> R + Send + Sync + 'static,
    ) -> Self {
        let ident = ident.into();
        let mut slots = HashMap::new();
        for backend in system.backends() {
            if backend.name() == DEFAULT_BACKEND {
                continue;
            }
            if let Some(record) = backend.functions().get(&ident) {
                slots.insert(backend.name().to_string(), ImplSlot::new(record.clone()));
            }
        }
        // The default backend always serves this function with the
        // fallback implementation, ranked like any other backend.
        let fallback: ImplFn<A, R> = Arc::new(fallback);
        slots.insert(
            DEFAULT_BACKEND.to_string(),
            ImplSlot::prefilled(ImplRecord::new(format!("{ident}#default")), fallback),
        );

        Self {
            system: system.clone(),
            ident,
            doc: None,
            extract: Arc::new(extract),
            resolver,
            slots,
        }
    }

    /// Attach the function's own documentation, rendered ahead of the
    /// backend blurbs by [`documentation`](Dispatchable::documentation).
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Identifier of this function.
    pub fn ident(&self) -> &str {
        &self.ident
    }

    /// Names of the backends implementing this function, in priority
    /// order, not counting the default.
    pub fn implementing_backends(&self) -> Vec<&str> {
        self.system
            .priority_order()
            .iter()
            .map(String::as_str)
            .filter(|n| *n != DEFAULT_BACKEND && self.slots.contains_key(*n))
            .collect()
    }

    /// The function's documentation with a blurb per implementing
    /// backend appended.
    pub fn documentation(&self) -> String {
        let mut blurbs = Vec::new();
        for name in self.implementing_backends() {
            let docs = self.slots[name]
                .record
                .additional_docs
                .as_deref()
                .unwrap_or("No backend documentation available.");
            let mut blurb = format!("{name} :\n");
            for line in docs.lines() {
                blurb.push_str("    ");
                blurb.push_str(line);
                blurb.push('\n');
            }
            blurbs.push(blurb.trim_end().to_string());
        }
        if blurbs.is_empty() {
            blurbs.push("No backends found for this function.".to_string());
        }

        let mut out = self.doc.clone().unwrap_or_default();
        out.push_str("\n\nBackends\n--------\n");
        out.push_str(&blurbs.join("\n\n"));
        out
    }

    /// Dispatch one call.
    pub fn call(&self, args: A) -> Result<R, DispatchError> {
        let core = self.system.core();
        let state = current_state(core);

        let mut raw_types = (self.extract)(&args);
        if let Some(forced) = &state.forced_type
            && !raw_types.contains(forced)
        {
            raw_types.push(forced.clone());
        }
        let outcome = core.types_and_backends(&raw_types, &state.ordered);

        let mut steps: Vec<TraceStep> = Vec::new();
        let record_trace = |steps: Vec<TraceStep>| {
            if let Some(trace) = &state.trace {
                trace.record(CallTrace {
                    function: self.ident.clone(),
                    steps,
                });
            }
        };

        for name in outcome.backends.iter() {
            // A matching backend without this function is skipped
            // without a trace entry.
            let Some(slot) = self.slots.get(name) else {
                continue;
            };

            let ctx = DispatchContext {
                types: Arc::clone(&outcome.types),
                backend: Arc::from(name.as_str()),
                prioritized: state.prioritized.contains(name),
            };

            match slot.veto(self.resolver.as_ref()) {
                Ok(Some(veto)) => match veto(&ctx, &args) {
                    Verdict::Proceed => {}
                    Verdict::Decline => {
                        steps.push(TraceStep::Vetoed {
                            backend: name.clone(),
                        });
                        continue;
                    }
                    Verdict::Other(got) => {
                        record_trace(steps);
                        return Err(DispatchError::VetoContract {
                            backend: name.clone(),
                            function: self.ident.clone(),
                            got,
                        });
                    }
                },
                Ok(None) => {}
                Err(source) => {
                    record_trace(steps);
                    return Err(DispatchError::Resolution {
                        backend: name.clone(),
                        function: self.ident.clone(),
                        source,
                    });
                }
            }

            let function = match slot.function(self.resolver.as_ref()) {
                Ok(f) => Arc::clone(f),
                Err(source) => {
                    record_trace(steps);
                    return Err(DispatchError::Resolution {
                        backend: name.clone(),
                        function: self.ident.clone(),
                        source,
                    });
                }
            };

            steps.push(TraceStep::Called {
                backend: name.clone(),
            });
            record_trace(steps);
            return Ok(function(&ctx, args));
        }

        steps.push(TraceStep::Fallback);
        record_trace(steps);

        let ctx = DispatchContext {
            types: Arc::clone(&outcome.types),
            backend: Arc::from(DEFAULT_BACKEND),
            prioritized: false,
        };
        let function = self
            .slots
            .get(DEFAULT_BACKEND)
            .and_then(|slot| slot.function.get())
            .map(Arc::clone);
        match function {
            Some(f) => Ok(f(&ctx, args)),
            // The default slot is always prefilled at construction.
            None => Err(DispatchError::Resolution {
                backend: DEFAULT_BACKEND.to_string(),
                function: self.ident.clone(),
                source: ResolveError::new(format!("{}#default", self.ident)),
            }),
        }
    }
}

impl BackendSystem {
    /// Wrap `fallback` as the dispatchable function `ident` on this
    /// system. See [`Dispatchable::new`].
    pub fn dispatchable<A, R>(
        &self,
        ident: impl Into<String>,
        resolver: Arc<dyn FunctionResolver<A, R>>,
        extract: impl Fn(&A) -> Vec<DispatchType> + Send + Sync + 'static,
        fallback: impl Fn(&DispatchContext, A) -> R + Send + Sync + 'static,
    ) -> Dispatchable<A, R> {
        Dispatchable::new(self, ident, resolver, extract, fallback)
    }
}

impl<A, R> fmt::Debug for Dispatchable<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatchable")
            .field("ident", &self.ident)
            .field("backends", &self.implementing_backends())
            .finish()
    }
}
