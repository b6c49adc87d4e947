//! The backend system: registration, ordering and shared call support.
//!
//! A [`BackendSystem`] is built once per library from explicit specs, a
//! discovery collaborator and an [`OverrideConfig`], then shared
//! (cheaply cloned) by every dispatchable function of that library.
//! After construction the backend table and priority order are frozen;
//! the only mutable pieces are the swap-on-write global base state and
//! the bounded match cache.

use crate::config::OverrideConfig;
use crate::error::BuildError;
use crate::priority::resolve_order;
use crate::scope::{ScopeBuilder, ScopeState, UnknownBackends, current_state, modified_state};
use backplane_core::{Backend, BackendError, BackendSpec, DispatchType, FullyLoaded, TypeSet,
    TypeUniverse};
use arc_swap::ArcSwap;
use indexmap::IndexMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// Caches the per-call type filtering and backend matching; 128 distinct
// (type set, order) pairs covers typical programs with room to spare.
const MATCH_CACHE_SIZE: usize = 128;

static NEXT_SYSTEM_ID: AtomicU64 = AtomicU64::new(0);

/// Supplies backend descriptors found in the environment (plugin
/// registries, entry points, manifest scans).
///
/// Discovered descriptors are best-effort: an invalid one is logged and
/// skipped, unlike explicitly registered specs which fail the build.
pub trait BackendDiscovery {
    /// All descriptors this collaborator can find.
    fn discover(&self) -> Vec<BackendSpec>;
}

pub(crate) struct MatchOutcome {
    /// The unique known dispatch types, sorted.
    pub(crate) types: Arc<[DispatchType]>,
    /// Names of the matching backends, in priority order.
    pub(crate) backends: Arc<[String]>,
}

#[derive(PartialEq, Eq, Hash)]
struct MatchKey {
    types: Box<[DispatchType]>,
    order: Arc<[String]>,
}

/// Shared immutable state behind a [`BackendSystem`].
pub(crate) struct SystemCore {
    pub(crate) id: u64,
    pub(crate) name: String,
    /// All backends including `default`, keyed by name, in priority
    /// order.
    pub(crate) backends: IndexMap<String, Backend>,
    pub(crate) universe: Arc<dyn TypeUniverse>,
    pub(crate) base_state: ArcSwap<ScopeState>,
    pub(crate) initial_state: Arc<ScopeState>,
    order: Arc<[String]>,
    match_cache: Mutex<LruCache<MatchKey, Arc<MatchOutcome>>>,
}

impl SystemCore {
    /// Whether any backend supports `ty` at all.
    fn known_type(&self, ty: &DispatchType) -> bool {
        self.backends
            .values()
            .any(|b| b.supported_types().contains(ty, self.universe.as_ref()))
    }

    /// Filter `raw` down to the unique known types and match them
    /// against `ordered`, memoized in the bounded cache.
    ///
    /// Pure function of immutable inputs, so a cache race at worst
    /// recomputes the same value.
    pub(crate) fn types_and_backends(
        &self,
        raw: &[DispatchType],
        ordered: &Arc<[String]>,
    ) -> Arc<MatchOutcome> {
        let mut types: Vec<DispatchType> = raw.to_vec();
        types.sort();
        types.dedup();

        let key = MatchKey {
            types: types.clone().into_boxed_slice(),
            order: Arc::clone(ordered),
        };
        if let Some(hit) = self.match_cache.lock().get(&key) {
            return Arc::clone(hit);
        }

        types.retain(|ty| self.known_type(ty));
        let backends: Vec<String> = ordered
            .iter()
            .filter(|name| {
                self.backends
                    .get(*name)
                    .is_some_and(|b| b.matches(&types, self.universe.as_ref()))
            })
            .cloned()
            .collect();
        let outcome = Arc::new(MatchOutcome {
            types: types.into(),
            backends: backends.into(),
        });
        self.match_cache.lock().put(key, Arc::clone(&outcome));
        outcome
    }
}

/// A library's backend registry and dispatch configuration.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct BackendSystem {
    core: Arc<SystemCore>,
}

impl BackendSystem {
    /// Start building a system. `name` identifies it in diagnostics.
    pub fn builder(name: impl Into<String>) -> SystemBuilder {
        SystemBuilder {
            name: name.into(),
            default_primary_types: None,
            explicit: Vec::new(),
            discovery: Vec::new(),
            config: OverrideConfig::default(),
            universe: Arc::new(FullyLoaded),
        }
    }

    pub(crate) fn core(&self) -> &SystemCore {
        &self.core
    }

    pub(crate) fn core_arc(&self) -> &Arc<SystemCore> {
        &self.core
    }

    /// The system's diagnostic name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// All registered backends (including `default`), in priority
    /// order.
    pub fn backends(&self) -> impl Iterator<Item = &Backend> {
        self.core.backends.values()
    }

    /// Look a backend up by name.
    pub fn backend(&self, name: &str) -> Option<&Backend> {
        self.core.backends.get(name)
    }

    /// The frozen total priority order, highest first.
    pub fn priority_order(&self) -> &[String] {
        &self.core.order
    }

    /// Names of the backends active on the calling thread, in priority
    /// order. Reflects any entered scope.
    pub fn current_backends(&self) -> Vec<String> {
        current_state(&self.core).backends().to_vec()
    }

    /// Start building a scope against the state active on the calling
    /// thread.
    pub fn scope(&self) -> ScopeBuilder<'_> {
        ScopeBuilder::new(self)
    }
}

impl std::fmt::Debug for BackendSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSystem")
            .field("name", &self.core.name)
            .field("order", &self.core.order)
            .finish()
    }
}

/// Builder for [`BackendSystem`].
pub struct SystemBuilder {
    name: String,
    default_primary_types: Option<Vec<String>>,
    explicit: Vec<BackendSpec>,
    discovery: Vec<Box<dyn BackendDiscovery>>,
    config: OverrideConfig,
    universe: Arc<dyn TypeUniverse>,
}

impl SystemBuilder {
    /// Type identifiers the synthetic `default` backend claims as
    /// primary. Without this no `default` backend is created and
    /// unmatched calls only reach the per-function fallback.
    pub fn default_primary_types<I, S>(mut self, idents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_primary_types = Some(idents.into_iter().map(Into::into).collect());
        self
    }

    /// Register a backend explicitly. Explicit backends are registered
    /// first, in the given order, and an invalid one fails the build.
    pub fn backend(mut self, spec: BackendSpec) -> Self {
        self.explicit.push(spec);
        self
    }

    /// Add a discovery collaborator. Discovered descriptors are
    /// registered after explicit ones, sorted by name.
    pub fn discovery(mut self, discovery: impl BackendDiscovery + 'static) -> Self {
        self.discovery.push(Box::new(discovery));
        self
    }

    /// Apply an override configuration (manual order, prioritize and
    /// block lists).
    pub fn config(mut self, config: OverrideConfig) -> Self {
        self.config = config;
        self
    }

    /// Install the type universe used for subclass matching. Defaults
    /// to [`FullyLoaded`].
    pub fn universe(mut self, universe: impl TypeUniverse + 'static) -> Self {
        self.universe = Arc::new(universe);
        self
    }

    /// Validate everything and freeze the system.
    pub fn build(self) -> Result<BackendSystem, BuildError> {
        let mut backends: IndexMap<String, Backend> = IndexMap::new();

        if let Some(idents) = &self.default_primary_types {
            let primary = TypeSet::parse(idents.iter().map(String::as_str)).map_err(|source| {
                BuildError::Backend(BackendError::BadTypeIdentifier {
                    name: backplane_core::DEFAULT_BACKEND.to_string(),
                    source,
                })
            })?;
            let default = Backend::fallback(primary);
            backends.insert(default.name().to_string(), default);
        }

        // Explicit backends fail the build when invalid; discovered
        // ones are best-effort and only logged.
        for spec in self.explicit {
            if self.config.blocked(&spec.name) {
                continue;
            }
            let backend = Backend::from_spec(spec)?;
            if backends.contains_key(backend.name()) {
                tracing::warn!(
                    system = %self.name,
                    backend = %backend.name(),
                    "backend name already registered, ignoring the second"
                );
                continue;
            }
            backends.insert(backend.name().to_string(), backend);
        }

        let mut discovered: Vec<BackendSpec> = self
            .discovery
            .iter()
            .flat_map(|d| d.discover())
            .collect();
        discovered.sort_by(|a, b| a.name.cmp(&b.name));
        for spec in discovered {
            if self.config.blocked(&spec.name) {
                continue;
            }
            let name = spec.name.clone();
            match Backend::from_spec(spec) {
                Ok(backend) => {
                    if backends.contains_key(backend.name()) {
                        tracing::warn!(
                            system = %self.name,
                            backend = %backend.name(),
                            "backend name already registered, ignoring the second"
                        );
                        continue;
                    }
                    backends.insert(backend.name().to_string(), backend);
                }
                Err(error) => {
                    tracing::warn!(
                        system = %self.name,
                        backend = %name,
                        %error,
                        "skipping discovered backend"
                    );
                }
            }
        }

        let order = resolve_order(&backends, self.config.overrides())?;

        // Freeze the table in priority order; iteration order is public
        // surface from here on.
        let backends: IndexMap<String, Backend> = order
            .iter()
            .filter_map(|n| backends.swap_remove_entry(n))
            .collect();
        let order: Arc<[String]> = order.into();

        // Base state: full order minus opt-in backends, with the
        // configured prioritize list applied (unknown names ignored).
        let full = ScopeState::base(Arc::clone(&order));
        let opt_in: Vec<String> = backends
            .values()
            .filter(|b| b.requires_opt_in())
            .map(|b| b.name().to_string())
            .collect();
        let base = modified_state(
            &backends,
            self.universe.as_ref(),
            &full,
            self.config.prioritize_list(),
            &opt_in,
            None,
            false,
            UnknownBackends::Ignore,
        )
        .unwrap_or(full);
        let initial_state = Arc::new(base);

        Ok(BackendSystem {
            core: Arc::new(SystemCore {
                id: NEXT_SYSTEM_ID.fetch_add(1, Ordering::Relaxed),
                name: self.name,
                backends,
                universe: self.universe,
                base_state: ArcSwap::from(Arc::clone(&initial_state)),
                initial_state,
                order,
                match_cache: Mutex::new(LruCache::new(
                    NonZeroUsize::new(MATCH_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
                )),
            }),
        })
    }
}
