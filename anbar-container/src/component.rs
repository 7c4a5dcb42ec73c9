//! What a concrete type tells the container about itself.
//!
//! There is no runtime reflection in Rust, so a component declares up front
//! how it is constructed, which interfaces it can be resolved as, which
//! services its constructor needs, and which properties may be injected
//! after construction.
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//! use anbar_container::prelude::*;
//!
//! trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//! }
//! impl Interface for dyn Clock {}
//!
//! struct FixedClock;
//! impl Clock for FixedClock {
//!     fn now(&self) -> u64 { 42 }
//! }
//!
//! impl Component for FixedClock {
//!     fn construct(_: &Resolver<'_>) -> Result<Self> {
//!         Ok(FixedClock)
//!     }
//!
//!     fn services(services: &mut ServiceSet<Self>) {
//!         services.implements::<dyn Clock>(|c| c as Arc<dyn Clock>);
//!     }
//! }
//!
//! let container = Container::new();
//! container.configure::<FixedClock>(Lifestyle::Singleton).unwrap();
//! assert_eq!(container.build::<dyn Clock>().unwrap().now(), 42);
//! ```

use crate::error::{BoxError, Result};
use crate::key::ServiceKey;
use crate::properties::PropertySet;
use crate::resolver::Resolver;
use crate::services::{Parents, ServiceSet};

/// A concrete type the container knows how to build.
pub trait Component: Sized + Send + Sync + 'static {
    /// Builds a new instance, pulling constructor dependencies from `resolver`.
    fn construct(resolver: &Resolver<'_>) -> Result<Self>;

    /// Declares the interfaces this type is resolvable as.
    ///
    /// The type itself is always included.
    fn services(_services: &mut ServiceSet<Self>) {}

    /// Declares the services [`construct`](Component::construct) requires.
    ///
    /// Declared dependencies are checked when the container is finalized.
    fn dependencies(_dependencies: &mut Dependencies) {}

    /// Declares properties that may be set after construction.
    fn properties(_properties: &mut PropertySet<Self>) {}
}

/// An interface (trait object type) components can be resolved as.
///
/// Implement it on `dyn Trait`. Parent interfaces listed in
/// [`extends`](Interface::extends) are added to every component that
/// implements this one, transitively.
///
/// ```
/// use std::sync::Arc;
/// use anbar_container::prelude::*;
///
/// trait Handler: Send + Sync {}
/// trait AuditHandler: Handler {}
///
/// impl Interface for dyn Handler {}
/// impl Interface for dyn AuditHandler {
///     fn extends(parents: &mut Parents<'_, Self>) {
///         parents.parent::<dyn Handler>(|h| h as Arc<dyn Handler>);
///     }
/// }
/// ```
pub trait Interface: Send + Sync + 'static {
    fn extends(_parents: &mut Parents<'_, Self>) {}
}

/// A component that holds resources needing explicit release.
///
/// Opt in with [`ServiceSet::disposable`]. Scoped and singleton instances are
/// disposed when their owning scope closes; transients are never tracked.
pub trait Disposable: Send + Sync {
    fn dispose(&self) -> std::result::Result<(), BoxError>;
}

/// Constructor dependencies declared by a component.
#[derive(Debug, Default)]
pub struct Dependencies {
    keys: Vec<ServiceKey>,
}

impl Dependencies {
    pub(crate) fn collect<C: Component>() -> Vec<ServiceKey> {
        let mut dependencies = Dependencies::default();
        C::dependencies(&mut dependencies);
        dependencies.keys
    }

    /// Marks `T` as required: finalization fails if nothing provides it.
    pub fn require<T: ?Sized + 'static>(&mut self) -> &mut Self {
        let key = ServiceKey::of::<T>();
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
        self
    }
}
