//! Lifetime scopes: ownership boundaries for constructed instances.
//!
//! Scopes form a tree. The root scope belongs to the root container and
//! owns singletons; every child container opens a child scope that owns the
//! `ScopedToUnitOfWork` instances built through it. Closing a scope disposes
//! what it owns, newest first.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{DisposalError, DisposalFailure, Result};
use crate::key::ServiceKey;
use crate::registry::ComponentId;
use crate::services::{Disposer, Instance};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(0);

/// An instance a scope must dispose when it closes.
struct Owned {
    component: ServiceKey,
    instance: Instance,
    disposer: Disposer,
}

/// A node in the scope tree.
pub struct LifetimeScope {
    id: u64,
    depth: usize,
    parent: Option<Arc<LifetimeScope>>,
    cache: DashMap<ComponentId, Arc<OnceCell<Instance>>>,
    owned: Mutex<Vec<Owned>>,
    closed: AtomicBool,
}

impl LifetimeScope {
    /// Opens a new root scope.
    pub fn root() -> Arc<Self> {
        Arc::new(Self::with_parent(None))
    }

    /// Opens a child scope of `parent`.
    ///
    /// The child shares nothing with its parent except ancestry: it starts
    /// with an empty cache and owns nothing.
    pub fn open_child(parent: &Arc<Self>) -> Arc<Self> {
        let child = Arc::new(Self::with_parent(Some(parent.clone())));
        debug!(scope = child.id, parent = parent.id, depth = child.depth, "Opened scope");
        child
    }

    fn with_parent(parent: Option<Arc<LifetimeScope>>) -> Self {
        Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            depth: parent.as_ref().map_or(0, |p| p.depth + 1),
            parent,
            cache: DashMap::new(),
            owned: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Walks up to the root of the tree `scope` belongs to.
    pub fn root_of(scope: &Arc<Self>) -> &Arc<Self> {
        let mut current = scope;
        while let Some(parent) = &current.parent {
            current = parent;
        }
        current
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Distance from the root; the root itself is 0.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of instances waiting to be disposed.
    pub fn owned_count(&self) -> usize {
        self.owned.lock().len()
    }

    /// Returns this scope's instance of `component`, building it at most once.
    ///
    /// The map shard lock is released before `init` runs, so `init` may
    /// resolve other scoped components from this same scope.
    pub(crate) fn cached(
        &self,
        component: ComponentId,
        init: impl FnOnce() -> Result<Instance>,
    ) -> Result<Instance> {
        let cell = self.cache.entry(component).or_default().value().clone();
        cell.get_or_try_init(init).cloned()
    }

    /// Takes ownership of `instance` for disposal.
    ///
    /// A scope that already closed cannot own anything; the instance is
    /// disposed on the spot instead.
    pub(crate) fn adopt(&self, component: ServiceKey, instance: &Instance, disposer: &Disposer) {
        let mut owned = self.owned.lock();
        if !self.is_closed() {
            trace!(scope = self.id, component = %component, "Scope took ownership");
            owned.push(Owned {
                component,
                instance: instance.clone(),
                disposer: disposer.clone(),
            });
            return;
        }
        drop(owned);

        warn!(scope = self.id, component = %component, "Instance built after scope closed; disposing immediately");
        if let Err(source) = disposer(instance) {
            warn!(component = %component, error = %source, "Late disposal failed");
        }
    }

    /// Closes the scope, disposing everything it owns in reverse creation order.
    ///
    /// Idempotent: only the first call disposes. Every owned instance gets a
    /// dispose attempt even if earlier ones fail; failures are returned
    /// together.
    pub fn close(&self) -> std::result::Result<(), DisposalError> {
        let owned = {
            let mut owned = self.owned.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            std::mem::take(&mut *owned)
        };

        debug!(scope = self.id, owned = owned.len(), "Closing scope");

        let mut failures = Vec::new();
        for entry in owned.into_iter().rev() {
            match (entry.disposer)(&entry.instance) {
                Ok(()) => trace!(scope = self.id, component = %entry.component, "Disposed"),
                Err(source) => {
                    warn!(scope = self.id, component = %entry.component, error = %source, "Disposal failed");
                    failures.push(DisposalFailure {
                        component: entry.component,
                        source,
                    });
                }
            }
        }
        self.cache.clear();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DisposalError { failures })
        }
    }
}

impl fmt::Debug for LifetimeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeScope")
            .field("id", &self.id)
            .field("depth", &self.depth)
            .field("owned", &self.owned_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
