//! # Resolution engine
//!
//! The container handle never builds anything itself. It commits its
//! finalized [`Catalog`] to a [`ResolutionEngine`] and asks the engine for
//! instances, scopes and teardown. [`NativeEngine`] is the built-in engine;
//! any other engine can be plugged in through
//! [`Container::with_engine`](crate::container::Container::with_engine).
//!
//! # Sharing
//! ```text
//! Lifestyle::Transient           ──>  Sharing::Unshared      new instance, caller owns it
//! Lifestyle::Singleton           ──>  Sharing::Root          one per catalog, root scope owns it
//! Lifestyle::ScopedToUnitOfWork  ──>  Sharing::CurrentScope  one per scope, that scope owns it
//! ```

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use anbar_support::rendering::suggest_similar;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::error::{AnbarError, DisposalError, NotRegisteredError, Result, UnsatisfiableGraphError};
use crate::key::ServiceKey;
use crate::lifestyle::Sharing;
use crate::registry::{Binding, Catalog, ComponentId};
use crate::resolver::Resolver;
use crate::scope::LifetimeScope;
use crate::services::{Erased, Instance};
use crate::settings::AmbiguityPolicy;

const MAX_SUGGESTIONS: usize = 3;

thread_local! {
    /// Components this thread is building right now, outermost first,
    /// tagged with the catalog they belong to.
    static ACTIVATING: RefCell<Vec<(usize, ComponentId, ServiceKey)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a component as under construction on the current thread.
///
/// Re-entering a component that is still being built is a cycle.
struct Activation;

impl Activation {
    fn enter(catalog: &Catalog, id: ComponentId) -> Result<Self> {
        let tag = catalog as *const Catalog as usize;
        let implementation = catalog.slot(id).registration.implementation();

        ACTIVATING.with_borrow_mut(|stack| {
            if let Some(start) = stack.iter().position(|&(t, i, _)| t == tag && i == id) {
                let mut chain: Vec<ServiceKey> = stack[start..].iter().map(|&(_, _, key)| key).collect();
                chain.push(implementation);
                warn!(cycle = ?chain, "Circular dependency while building");
                return Err(AnbarError::UnsatisfiableGraph(UnsatisfiableGraphError::Cycle { chain }));
            }
            stack.push((tag, id, implementation));
            Ok(Activation)
        })
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        ACTIVATING.with_borrow_mut(|stack| {
            stack.pop();
        });
    }
}

// ═══════════════════════════════════════════
// ResolutionEngine
// ═══════════════════════════════════════════

/// The mechanism that turns a committed catalog into instances.
pub trait ResolutionEngine: Send + Sync {
    /// Receives the finalized registrations. Called once per container tree.
    fn commit(&self, catalog: Catalog) -> Result<()>;

    /// Whether `key` resolves to anything in the committed catalog.
    fn is_registered(&self, key: &ServiceKey) -> bool;

    /// Resolves one instance of `key` in `scope`, as a boxed `Arc<T>`.
    fn resolve(&self, scope: &Arc<LifetimeScope>, key: &ServiceKey) -> Result<Erased>;

    /// Resolves every candidate for `key` in `scope`, in registration order.
    fn resolve_all(&self, scope: &Arc<LifetimeScope>, key: &ServiceKey) -> Result<Vec<Erased>>;

    fn open_scope(&self, parent: &Arc<LifetimeScope>) -> Arc<LifetimeScope>;

    fn close_scope(&self, scope: &LifetimeScope) -> std::result::Result<(), DisposalError>;

    /// Drops the committed catalog. Later resolutions fail with `Disposed`.
    fn release(&self);
}

// ═══════════════════════════════════════════
// NativeEngine
// ═══════════════════════════════════════════

enum State {
    Pending,
    Committed(Arc<Catalog>),
    Released,
}

/// The built-in engine.
///
/// Singletons live in the catalog's per-component slots, so every scope of a
/// container tree sees the same instance. Scoped instances live in the
/// scope's own cache.
pub struct NativeEngine {
    state: RwLock<State>,
}

impl NativeEngine {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::Pending),
        }
    }

    /// The committed catalog, or `None` while nothing is committed.
    fn catalog(&self) -> Result<Option<Arc<Catalog>>> {
        match &*self.state.read() {
            State::Pending => Ok(None),
            State::Committed(catalog) => Ok(Some(catalog.clone())),
            State::Released => Err(AnbarError::Disposed),
        }
    }

    fn select(catalog: &Catalog, key: &ServiceKey, ids: &[ComponentId]) -> Result<ComponentId> {
        match (ids, catalog.ambiguity()) {
            ([only], _) => Ok(*only),
            ([.., last], AmbiguityPolicy::LastWins) => {
                trace!(key = %key, candidates = ids.len(), "Last registration wins");
                Ok(*last)
            }
            ([], _) => Err(not_registered(catalog, key)),
            (_, AmbiguityPolicy::Reject) => Err(AnbarError::AmbiguousRegistration {
                key: *key,
                candidates: ids
                    .iter()
                    .map(|id| catalog.slot(*id).registration.implementation().to_string())
                    .collect(),
            }),
        }
    }

    fn provide(
        &self,
        catalog: &Catalog,
        scope: &Arc<LifetimeScope>,
        id: ComponentId,
        key: &ServiceKey,
    ) -> Result<Erased> {
        let instance = self.activate(catalog, scope, id)?;
        catalog.slot(id).registration.cast(key, &instance)
    }

    /// Returns an instance of component `id`, honoring its lifestyle.
    fn activate(
        &self,
        catalog: &Catalog,
        scope: &Arc<LifetimeScope>,
        id: ComponentId,
    ) -> Result<Instance> {
        let slot = catalog.slot(id);
        let registration = &slot.registration;
        let _activation = Activation::enter(catalog, id)?;

        match registration.lifestyle().sharing() {
            Sharing::Unshared => self.construct(catalog, scope, id),
            Sharing::Root => {
                let root = LifetimeScope::root_of(scope);
                slot.singleton
                    .get_or_try_init(|| -> Result<Instance> {
                        let instance = self.construct(catalog, root, id)?;
                        if let Some(disposer) = &registration.disposer {
                            root.adopt(registration.implementation(), &instance, disposer);
                        }
                        debug!(component = %registration.implementation(), "Singleton created");
                        Ok(instance)
                    })
                    .cloned()
            }
            Sharing::CurrentScope => scope.cached(id, || -> Result<Instance> {
                let instance = self.construct(catalog, scope, id)?;
                if let Some(disposer) = &registration.disposer {
                    scope.adopt(registration.implementation(), &instance, disposer);
                }
                debug!(
                    component = %registration.implementation(),
                    scope = scope.id(),
                    "Scoped instance created"
                );
                Ok(instance)
            }),
        }
    }

    fn construct(
        &self,
        catalog: &Catalog,
        scope: &Arc<LifetimeScope>,
        id: ComponentId,
    ) -> Result<Instance> {
        let registration = &catalog.slot(id).registration;
        trace!(component = %registration.implementation(), scope = scope.id(), "Constructing");
        let resolver = Resolver::new(self, catalog, scope);
        registration.activate(&resolver)
    }
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionEngine for NativeEngine {
    fn commit(&self, catalog: Catalog) -> Result<()> {
        let mut state = self.state.write();
        if matches!(*state, State::Released) {
            return Err(AnbarError::Disposed);
        }
        debug!(
            components = catalog.registrations().count(),
            services = catalog.len(),
            "Catalog committed"
        );
        *state = State::Committed(Arc::new(catalog));
        Ok(())
    }

    fn is_registered(&self, key: &ServiceKey) -> bool {
        matches!(self.catalog(), Ok(Some(catalog)) if catalog.contains(key))
    }

    fn resolve(&self, scope: &Arc<LifetimeScope>, key: &ServiceKey) -> Result<Erased> {
        let Some(catalog) = self.catalog()? else {
            return Err(AnbarError::NotRegistered(NotRegisteredError {
                requested: *key,
                suggestions: Vec::new(),
            }));
        };

        match catalog.binding(key) {
            None => Err(not_registered(&catalog, key)),
            Some(Binding::Preset(preset)) => Ok(preset()),
            Some(Binding::Shared(id)) => self.provide(&catalog, scope, *id, key),
            Some(Binding::Candidates(ids)) => {
                let id = Self::select(&catalog, key, ids)?;
                self.provide(&catalog, scope, id, key)
            }
        }
    }

    fn resolve_all(&self, scope: &Arc<LifetimeScope>, key: &ServiceKey) -> Result<Vec<Erased>> {
        let Some(catalog) = self.catalog()? else {
            return Ok(Vec::new());
        };

        match catalog.binding(key) {
            None => Ok(Vec::new()),
            Some(Binding::Preset(preset)) => Ok(vec![preset()]),
            Some(Binding::Shared(id)) => Ok(vec![self.provide(&catalog, scope, *id, key)?]),
            Some(Binding::Candidates(ids)) => ids
                .iter()
                .map(|id| self.provide(&catalog, scope, *id, key))
                .collect(),
        }
    }

    fn open_scope(&self, parent: &Arc<LifetimeScope>) -> Arc<LifetimeScope> {
        LifetimeScope::open_child(parent)
    }

    fn close_scope(&self, scope: &LifetimeScope) -> std::result::Result<(), DisposalError> {
        scope.close()
    }

    fn release(&self) {
        *self.state.write() = State::Released;
        debug!("Engine released");
    }
}

impl fmt::Debug for NativeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.read() {
            State::Pending => "pending",
            State::Committed(_) => "committed",
            State::Released => "released",
        };
        f.debug_struct("NativeEngine").field("state", &state).finish()
    }
}

fn not_registered(catalog: &Catalog, key: &ServiceKey) -> AnbarError {
    AnbarError::NotRegistered(NotRegisteredError {
        requested: *key,
        suggestions: suggest_similar(key.type_name(), &catalog.service_names(), MAX_SUGGESTIONS),
    })
}
