//! # The Container
//!
//! The handle an application registers components with and builds them from.
//!
//! # Architecture
//! ```text
//! configure / configure_factory(_component) / configure_property / register_singleton
//!                         │
//!                         ▼
//!                  Registry (open)
//!                         │  first build / build_all / has_component / finalize
//!                         ▼
//!     GraphVerifier ──> Catalog ──commit──> ResolutionEngine
//!                                                 │
//!                     build_child_container() ──> child scope, same engine
//! ```
//!
//! # Examples
//! ```rust
//! use anbar_container::prelude::*;
//! use std::sync::Arc;
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//! impl Interface for dyn Greeter {}
//!
//! struct English;
//! impl Greeter for English {
//!     fn greet(&self) -> String { "hello".into() }
//! }
//! impl Component for English {
//!     fn construct(_: &Resolver<'_>) -> Result<Self> { Ok(English) }
//!     fn services(services: &mut ServiceSet<Self>) {
//!         services.implements::<dyn Greeter>(|e| e as Arc<dyn Greeter>);
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let container = Container::new();
//! container.configure::<English>(Lifestyle::Singleton)?;
//!
//! let greeter = container.build::<dyn Greeter>()?;
//! assert_eq!(greeter.greet(), "hello");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anbar_support::rendering::suggest_similar;
use tracing::{debug, error, info, warn};

use crate::component::Component;
use crate::engine::{NativeEngine, ResolutionEngine};
use crate::error::{AnbarError, NotRegisteredError, Result};
use crate::key::ServiceKey;
use crate::lifestyle::Lifestyle;
use crate::properties::{PropertyKey, PropertySet};
use crate::registry::{ComponentRegistration, Registry};
use crate::resolver::{Resolver, downcast};
use crate::scope::LifetimeScope;
use crate::services::Erased;
use crate::settings::ContainerSettings;

const MAX_SUGGESTIONS: usize = 3;

/// State shared by a root container and every child built from it.
struct Shared {
    registry: Registry,
    engine: Box<dyn ResolutionEngine>,
    settings: ContainerSettings,
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

/// A dependency-injection container, or a child scope of one.
///
/// Register everything first. The first `build`, `build_all`,
/// `has_component` or `finalize` call closes registration; after that the
/// container is safe to share across threads for resolution.
///
/// Dropping a container disposes its scope. Call [`dispose`](Self::dispose)
/// to observe disposal errors instead of having them logged.
pub struct Container {
    shared: Arc<Shared>,
    scope: Arc<LifetimeScope>,
    disposed: AtomicBool,
}

impl Container {
    /// A root container with default settings and the built-in engine.
    pub fn new() -> Self {
        Self::with_settings(ContainerSettings::default())
    }

    pub fn with_settings(settings: ContainerSettings) -> Self {
        Self::with_engine(settings, Box::new(NativeEngine::new()))
    }

    /// A root container backed by a custom resolution engine.
    pub fn with_engine(settings: ContainerSettings, engine: Box<dyn ResolutionEngine>) -> Self {
        info!(
            ambiguity = ?settings.ambiguity,
            verify_graph = settings.verify_graph,
            "Creating container"
        );
        Self {
            shared: Arc::new(Shared {
                registry: Registry::new(),
                engine,
                settings,
            }),
            scope: LifetimeScope::root(),
            disposed: AtomicBool::new(false),
        }
    }

    // ── Registration ──

    /// Registers `C` under itself and every interface it declares.
    pub fn configure<C: Component>(&self, lifestyle: Lifestyle) -> Result<&Self> {
        self.ensure_live()?;
        self.shared
            .registry
            .register(ComponentRegistration::of_component::<C>(lifestyle))?;
        Ok(self)
    }

    /// Registers a factory producing `T`, called lazily per `lifestyle`.
    ///
    /// The product is resolvable as `T` only. To have a factory-built
    /// component resolvable as its interfaces and property-injected, use
    /// [`configure_factory_component`](Self::configure_factory_component).
    pub fn configure_factory<T, F>(&self, lifestyle: Lifestyle, factory: F) -> Result<&Self>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        self.ensure_live()?;
        self.shared
            .registry
            .register(ComponentRegistration::of_factory::<T, F>(lifestyle, factory))?;
        Ok(self)
    }

    /// Registers `C` with `factory` standing in for [`Component::construct`].
    ///
    /// `C` is resolvable as itself and every interface it declares, and its
    /// properties are injected into each product like any other instance.
    /// Dependencies the factory resolves are not checked by `finalize`.
    pub fn configure_factory_component<C, F>(&self, lifestyle: Lifestyle, factory: F) -> Result<&Self>
    where
        C: Component,
        F: Fn(&Resolver<'_>) -> Result<C> + Send + Sync + 'static,
    {
        self.ensure_live()?;
        self.shared
            .registry
            .register(ComponentRegistration::of_factory_component::<C, F>(lifestyle, factory))?;
        Ok(self)
    }

    /// Sets property `name` of every `C` built by this container to `value`.
    ///
    /// Fails right away if `C` declares no such property or declares it
    /// with another type. The type must match exactly: a `String` property
    /// takes `"Debug".to_string()`, and a bare `"Debug"` is a `TypeMismatch`.
    pub fn configure_property<C, V>(&self, name: &str, value: V) -> Result<&Self>
    where
        C: Component,
        V: Send + Sync + 'static,
    {
        self.ensure_live()?;
        let name = PropertySet::<C>::collect().check(name, ServiceKey::of::<V>())?;
        self.shared.registry.bind_property(
            PropertyKey {
                component: ServiceKey::of::<C>(),
                name,
            },
            Arc::new(value),
        )?;
        Ok(self)
    }

    /// Like [`configure_property`](Self::configure_property), rejecting `None`.
    pub fn configure_property_opt<C, V>(&self, name: &str, value: Option<V>) -> Result<&Self>
    where
        C: Component,
        V: Send + Sync + 'static,
    {
        match value {
            Some(value) => self.configure_property::<C, V>(name, value),
            None => Err(AnbarError::InvalidArgument {
                argument: "value",
                reason: format!(
                    "property `{name}` of {} cannot be configured with None",
                    ServiceKey::of::<C>()
                ),
            }),
        }
    }

    /// Binds a pre-built instance as the only thing `T` resolves to.
    pub fn register_singleton<T>(&self, instance: Arc<T>) -> Result<&Self>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.ensure_live()?;
        self.shared.registry.register_preset(
            ServiceKey::of::<T>(),
            Arc::new(move || Box::new(instance.clone()) as Erased),
        )?;
        Ok(self)
    }

    // ── Resolution ──

    /// Closes registration and commits it to the engine.
    ///
    /// Happens implicitly on first use; calling it explicitly surfaces
    /// graph errors at startup.
    pub fn finalize(&self) -> Result<()> {
        self.ensure_live()?;
        self.shared
            .registry
            .finalize(self.shared.engine.as_ref(), &self.shared.settings)
    }

    /// Builds one `T` in this container's scope.
    pub fn build<T>(&self) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.finalize()?;
        let key = ServiceKey::of::<T>();
        if !self.shared.registry.has(&key) {
            return Err(self.not_registered(key));
        }

        let erased = self.shared.engine.resolve(&self.scope, &key)?;
        downcast::<T>(key, erased)
    }

    /// Builds every registered `T`, in registration order.
    ///
    /// Returns an empty list when nothing is registered for `T`.
    pub fn build_all<T>(&self) -> Result<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.finalize()?;
        let key = ServiceKey::of::<T>();
        self.shared
            .engine
            .resolve_all(&self.scope, &key)?
            .into_iter()
            .map(|erased| downcast::<T>(key, erased))
            .collect()
    }

    /// Whether anything is registered for `T`.
    pub fn has_component<T: ?Sized + 'static>(&self) -> bool {
        if let Err(err) = self.finalize() {
            warn!(error = %err, "Finalization failed; answering from registrations");
        }
        self.shared.registry.has(&ServiceKey::of::<T>())
    }

    // ── Scopes ──

    /// Opens a child container sharing this one's registrations.
    ///
    /// `ScopedToUnitOfWork` instances built through the child belong to it
    /// and are disposed with it.
    pub fn build_child_container(&self) -> Result<Container> {
        self.ensure_live()?;
        let scope = self.shared.engine.open_scope(&self.scope);
        Ok(Container {
            shared: self.shared.clone(),
            scope,
            disposed: AtomicBool::new(false),
        })
    }

    /// Disposes this container's scope. The root also releases the engine.
    ///
    /// Only the first call does anything.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let outcome = self.shared.engine.close_scope(&self.scope);
        if self.is_root() {
            self.shared.engine.release();
        }
        debug!(scope = self.scope.id(), depth = self.depth(), "Container disposed");
        outcome.map_err(AnbarError::Disposal)
    }

    // ── Introspection ──

    #[inline]
    pub fn is_root(&self) -> bool {
        self.scope.is_root()
    }

    /// Nesting depth: 0 for the root, one more per child level.
    #[inline]
    pub fn depth(&self) -> usize {
        self.scope.depth()
    }

    pub fn is_finalized(&self) -> bool {
        self.shared.registry.is_finalized()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> &ContainerSettings {
        &self.shared.settings
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(AnbarError::Disposed);
        }
        Ok(())
    }

    fn not_registered(&self, key: ServiceKey) -> AnbarError {
        let available = self.shared.registry.service_names();
        AnbarError::NotRegistered(NotRegisteredError {
            requested: key,
            suggestions: suggest_similar(key.type_name(), &available, MAX_SUGGESTIONS),
        })
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            error!(scope = self.scope.id(), error = %err, "Disposal failed while dropping container");
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registry", &self.shared.registry)
            .field("scope", &self.scope)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::Container;
    pub use crate::component::{Component, Dependencies, Disposable, Interface};
    pub use crate::engine::{NativeEngine, ResolutionEngine};
    pub use crate::error::{AnbarError, BoxError, Result};
    pub use crate::key::ServiceKey;
    pub use crate::lifestyle::Lifestyle;
    pub use crate::properties::PropertySet;
    pub use crate::resolver::Resolver;
    pub use crate::scope::LifetimeScope;
    pub use crate::services::{Parents, ServiceSet};
    pub use crate::settings::{AmbiguityPolicy, ContainerSettings};
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
