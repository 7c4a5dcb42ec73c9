//! Service-set expansion.
//!
//! For a concrete type `C`, the service set is `C` itself plus every
//! interface it declares, plus every parent of those interfaces, without
//! duplicates. Each entry carries the cast that turns a constructed `C`
//! into the `Arc` of that service.

use std::any::Any;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::component::{Component, Disposable, Interface};
use crate::error::BoxError;
use crate::key::ServiceKey;

/// A constructed component, type-erased. Always holds an `Arc<C>` of the
/// concrete type (or `Arc<Arc<T>>` for factory products).
pub type Instance = Arc<dyn Any + Send + Sync>;

/// A resolved service handed out by the engine: a boxed `Arc<T>`.
pub type Erased = Box<dyn Any + Send + Sync>;

/// Turns a constructed instance into the `Arc` of one of its services.
pub(crate) type Caster = Arc<dyn Fn(&Instance) -> Option<Erased> + Send + Sync>;

/// Releases a constructed instance.
pub(crate) type Disposer = Arc<dyn Fn(&Instance) -> Result<(), BoxError> + Send + Sync>;

type Projection<I> = Arc<dyn Fn(&Instance) -> Option<Arc<I>> + Send + Sync>;

/// One service a component can be resolved as.
#[derive(Clone)]
pub(crate) struct ServiceEntry {
    pub key: ServiceKey,
    pub caster: Caster,
}

#[derive(Default)]
struct Expansion {
    entries: Vec<ServiceEntry>,
    seen: HashSet<ServiceKey>,
}

impl Expansion {
    fn add<I: Interface + ?Sized>(&mut self, project: Projection<I>) {
        if !self.seen.insert(ServiceKey::of::<I>()) {
            return;
        }

        let cast = project.clone();
        self.entries.push(ServiceEntry {
            key: ServiceKey::of::<I>(),
            caster: Arc::new(move |instance: &Instance| cast(instance).map(|arc| Box::new(arc) as Erased)),
        });

        I::extends(&mut Parents {
            expansion: self,
            project,
        });
    }
}

/// The parent interfaces of interface `I`, filled in by [`Interface::extends`].
pub struct Parents<'a, I: ?Sized> {
    expansion: &'a mut Expansion,
    project: Projection<I>,
}

impl<I: ?Sized + 'static> Parents<'_, I> {
    /// Declares `P` as a parent of `I`, reachable through `upcast`.
    pub fn parent<P: Interface + ?Sized>(&mut self, upcast: fn(Arc<I>) -> Arc<P>) -> &mut Self {
        let project = self.project.clone();
        self.expansion
            .add::<P>(Arc::new(move |instance: &Instance| project(instance).map(upcast)));
        self
    }
}

/// Every service a concrete component `C` is resolvable as.
pub struct ServiceSet<C> {
    expansion: Expansion,
    disposer: Option<Disposer>,
    _component: PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static> ServiceSet<C> {
    fn new() -> Self {
        let key = ServiceKey::of::<C>();
        let mut expansion = Expansion::default();
        expansion.seen.insert(key);
        expansion.entries.push(ServiceEntry {
            key,
            caster: Arc::new(|instance: &Instance| {
                instance
                    .clone()
                    .downcast::<C>()
                    .ok()
                    .map(|c| Box::new(c) as Erased)
            }),
        });

        Self {
            expansion,
            disposer: None,
            _component: PhantomData,
        }
    }

    /// Declares that `C` implements interface `I`.
    ///
    /// `cast` is normally just an unsizing coercion: `|c| c as Arc<dyn I>`.
    pub fn implements<I: Interface + ?Sized>(&mut self, cast: fn(Arc<C>) -> Arc<I>) -> &mut Self {
        self.expansion.add::<I>(Arc::new(move |instance: &Instance| {
            instance.clone().downcast::<C>().ok().map(cast)
        }));
        self
    }

    /// Tracks instances for disposal when their owning scope closes.
    pub fn disposable(&mut self) -> &mut Self
    where
        C: Disposable,
    {
        self.disposer = Some(Arc::new(|instance: &Instance| match instance.downcast_ref::<C>() {
            Some(component) => component.dispose(),
            None => Ok(()),
        }));
        self
    }

    /// The expanded service keys, the concrete type first.
    pub fn keys(&self) -> Vec<ServiceKey> {
        self.expansion.entries.iter().map(|entry| entry.key).collect()
    }

    pub(crate) fn into_parts(self) -> (Vec<ServiceEntry>, Option<Disposer>) {
        (self.expansion.entries, self.disposer)
    }
}

/// Expands concrete type `C` into the full set of services it provides.
pub fn expand<C: Component>() -> ServiceSet<C> {
    let mut services = ServiceSet::new();
    C::services(&mut services);
    services
}
