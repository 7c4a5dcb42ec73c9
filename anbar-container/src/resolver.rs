//! The resolution handle given to constructors and factories.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use crate::engine::ResolutionEngine;
use crate::error::{AnbarError, Result};
use crate::key::ServiceKey;
use crate::properties::{PropertyKey, PropertyValue};
use crate::registry::Catalog;
use crate::scope::LifetimeScope;
use crate::services::Erased;

/// Resolves dependencies on behalf of a component being constructed.
///
/// A resolver is bound to the scope the construction happens in, so scoped
/// dependencies come from that scope. Singletons are always constructed
/// against the root scope.
///
/// ```rust,ignore
/// impl Component for OrderService {
///     fn construct(resolver: &Resolver<'_>) -> Result<Self> {
///         Ok(OrderService {
///             repository: resolver.resolve::<dyn OrderRepository>()?,
///             handlers: resolver.resolve_all::<dyn OrderHandler>()?,
///         })
///     }
/// }
/// ```
pub struct Resolver<'a> {
    engine: &'a dyn ResolutionEngine,
    catalog: &'a Catalog,
    scope: &'a Arc<LifetimeScope>,
}

impl<'a> Resolver<'a> {
    /// Binds a resolver to an engine, its committed catalog and a scope.
    pub fn new(
        engine: &'a dyn ResolutionEngine,
        catalog: &'a Catalog,
        scope: &'a Arc<LifetimeScope>,
    ) -> Self {
        Self {
            engine,
            catalog,
            scope,
        }
    }

    /// Resolves a single `T`, applying its lifestyle.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = ServiceKey::of::<T>();
        let erased = self.engine.resolve(self.scope, &key)?;
        downcast::<T>(key, erased)
    }

    /// Resolves every registered `T`, in registration order.
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        let key = ServiceKey::of::<T>();
        self.engine
            .resolve_all(self.scope, &key)?
            .into_iter()
            .map(|erased| downcast::<T>(key, erased))
            .collect()
    }

    /// Whether anything is registered for `T`.
    pub fn has<T: ?Sized + 'static>(&self) -> bool {
        self.has_key(&ServiceKey::of::<T>())
    }

    pub fn has_key(&self, key: &ServiceKey) -> bool {
        self.catalog.contains(key)
    }

    /// The scope construction happens in.
    pub fn scope(&self) -> &Arc<LifetimeScope> {
        self.scope
    }

    pub(crate) fn property_binding(&self, key: &PropertyKey) -> Option<&PropertyValue> {
        self.catalog.property(key)
    }
}

impl fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("scope", &self.scope.id())
            .field("depth", &self.scope.depth())
            .finish()
    }
}

/// Unwraps an engine result into the `Arc<T>` it must contain.
pub(crate) fn downcast<T: ?Sized + Send + Sync + 'static>(
    key: ServiceKey,
    erased: Erased,
) -> Result<Arc<T>> {
    erased
        .downcast::<Arc<T>>()
        .map(|boxed| *boxed)
        .map_err(|_| AnbarError::ConstructionFailed {
            key,
            source: format!("Type mismatch: expected Arc<{}>", type_name::<T>()).into(),
        })
}
