//! The registration table.
//!
//! Registrations accumulate while the table is open. The first `build`,
//! `build_all`, `has_component` or explicit `finalize` closes it: the graph is
//! verified and the table is committed to the resolution engine as a
//! [`Catalog`]. That transition happens exactly once, under the table's
//! write lock, so no reader ever sees a half-committed table.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::component::{Component, Dependencies};
use crate::engine::ResolutionEngine;
use crate::error::{AnbarError, Result, UnsatisfiableGraphError};
use crate::graph::{GraphVerifier, Node};
use crate::key::ServiceKey;
use crate::lifestyle::Lifestyle;
use crate::properties::{PropertyKey, PropertySet, PropertyValue};
use crate::resolver::Resolver;
use crate::services::{Caster, Disposer, Erased, Instance, expand};
use crate::settings::{AmbiguityPolicy, ContainerSettings};

/// Builds a fresh instance of a component, properties included.
pub(crate) type Activator = Arc<dyn Fn(&Resolver<'_>) -> Result<Instance> + Send + Sync>;

/// Produces the pre-built instance bound by `register_singleton`.
pub(crate) type Preset = Arc<dyn Fn() -> Erased + Send + Sync>;

/// Index of a component in the registration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Constructed through [`Component::construct`]; deduplicated by type.
    Type,
    /// Produced by a registered closure; every registration is distinct.
    Factory,
}

/// One way to produce instances, and the services it can be resolved as.
pub struct ComponentRegistration {
    pub(crate) id: ComponentId,
    pub(crate) implementation: ServiceKey,
    pub(crate) lifestyle: Lifestyle,
    pub(crate) origin: Origin,
    pub(crate) activator: Activator,
    pub(crate) services: Vec<ServiceKey>,
    pub(crate) casters: HashMap<ServiceKey, Caster>,
    pub(crate) dependencies: Vec<ServiceKey>,
    /// Autowired properties and the services they pull in.
    pub(crate) autowired: Vec<(&'static str, ServiceKey)>,
    pub(crate) disposer: Option<Disposer>,
}

impl ComponentRegistration {
    /// Registration for a concrete component, expanded over its services.
    pub(crate) fn of_component<C: Component>(lifestyle: Lifestyle) -> Self {
        Self::assemble::<C, _>(lifestyle, Origin::Type, Dependencies::collect::<C>(), C::construct)
    }

    /// Registration for a component built by `factory` instead of
    /// [`Component::construct`]. Services and properties are those of `C`.
    pub(crate) fn of_factory_component<C, F>(lifestyle: Lifestyle, factory: F) -> Self
    where
        C: Component,
        F: Fn(&Resolver<'_>) -> Result<C> + Send + Sync + 'static,
    {
        Self::assemble::<C, F>(lifestyle, Origin::Factory, Vec::new(), factory)
    }

    fn assemble<C, F>(
        lifestyle: Lifestyle,
        origin: Origin,
        dependencies: Vec<ServiceKey>,
        build: F,
    ) -> Self
    where
        C: Component,
        F: Fn(&Resolver<'_>) -> Result<C> + Send + Sync + 'static,
    {
        let (entries, disposer) = expand::<C>().into_parts();
        let properties = Arc::new(PropertySet::<C>::collect());
        let autowired = properties.autowired();

        let activator: Activator = Arc::new(move |resolver: &Resolver<'_>| {
            let mut component = build(resolver)?;
            properties.inject(&mut component, resolver)?;
            Ok(Arc::new(component) as Instance)
        });

        Self {
            id: ComponentId(usize::MAX),
            implementation: ServiceKey::of::<C>(),
            lifestyle,
            origin,
            activator,
            services: entries.iter().map(|entry| entry.key).collect(),
            casters: entries
                .into_iter()
                .map(|entry| (entry.key, entry.caster))
                .collect(),
            dependencies,
            autowired,
            disposer,
        }
    }

    /// Registration for a factory producing `Arc<T>`, resolvable as `T` only.
    pub(crate) fn of_factory<T, F>(lifestyle: Lifestyle, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<T>();
        let activator: Activator = Arc::new(move |resolver: &Resolver<'_>| {
            Ok(Arc::new(factory(resolver)?) as Instance)
        });
        let caster: Caster = Arc::new(|instance: &Instance| {
            instance
                .downcast_ref::<Arc<T>>()
                .map(|service| Box::new(service.clone()) as Erased)
        });

        Self {
            id: ComponentId(usize::MAX),
            implementation: key,
            lifestyle,
            origin: Origin::Factory,
            activator,
            services: vec![key],
            casters: HashMap::from([(key, caster)]),
            dependencies: Vec::new(),
            autowired: Vec::new(),
            disposer: None,
        }
    }

    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// The concrete type (or factory product type) behind this registration.
    #[inline]
    pub fn implementation(&self) -> ServiceKey {
        self.implementation
    }

    #[inline]
    pub fn lifestyle(&self) -> Lifestyle {
        self.lifestyle
    }

    /// Every service this registration can be resolved as.
    pub fn services(&self) -> &[ServiceKey] {
        &self.services
    }

    pub fn dependencies(&self) -> &[ServiceKey] {
        &self.dependencies
    }

    pub fn is_disposable(&self) -> bool {
        self.disposer.is_some()
    }

    /// Builds a fresh instance, properties included.
    pub fn activate(&self, resolver: &Resolver<'_>) -> Result<Instance> {
        (self.activator)(resolver)
    }

    /// Casts a constructed instance to the `Arc` of service `key`.
    pub fn cast(&self, key: &ServiceKey, instance: &Instance) -> Result<Erased> {
        self.casters
            .get(key)
            .and_then(|caster| caster(instance))
            .ok_or_else(|| AnbarError::ConstructionFailed {
                key: *key,
                source: format!("{} does not provide {key}", self.implementation).into(),
            })
    }
}

/// Two type-based registrations are the same registration when they build
/// the same concrete type. Factory registrations are only equal to themselves.
impl PartialEq for ComponentRegistration {
    fn eq(&self, other: &Self) -> bool {
        match (self.origin, other.origin) {
            (Origin::Type, Origin::Type) => self.implementation == other.implementation,
            _ => std::ptr::eq(self, other),
        }
    }
}

impl fmt::Debug for ComponentRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistration")
            .field("id", &self.id)
            .field("implementation", &self.implementation)
            .field("lifestyle", &self.lifestyle)
            .field("origin", &self.origin)
            .field("services", &self.services)
            .field("dependencies", &self.dependencies)
            .field("autowired", &self.autowired)
            .field("disposable", &self.is_disposable())
            .finish()
    }
}

/// How a service key resolves once the table is committed.
pub(crate) enum Binding {
    /// A pre-built instance; the sole target for the key.
    Preset(Preset),
    /// Exactly one candidate and it is a singleton: one shared instance.
    Shared(ComponentId),
    /// One or more candidates in registration order.
    Candidates(Vec<ComponentId>),
}

/// A committed component plus its singleton slot.
pub(crate) struct ComponentSlot {
    pub registration: Arc<ComponentRegistration>,
    pub singleton: OnceCell<Instance>,
}

/// The finalized registration table, as handed to the resolution engine.
pub struct Catalog {
    components: Vec<ComponentSlot>,
    bindings: HashMap<ServiceKey, Binding>,
    properties: HashMap<PropertyKey, PropertyValue>,
    ambiguity: AmbiguityPolicy,
}

impl Catalog {
    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.bindings.contains_key(key)
    }

    /// Number of resolvable service keys.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn ambiguity(&self) -> AmbiguityPolicy {
        self.ambiguity
    }

    /// Registrations in the order they were added.
    pub fn registrations(&self) -> impl Iterator<Item = &ComponentRegistration> {
        self.components.iter().map(|slot| slot.registration.as_ref())
    }

    pub(crate) fn binding(&self, key: &ServiceKey) -> Option<&Binding> {
        self.bindings.get(key)
    }

    pub(crate) fn slot(&self, id: ComponentId) -> &ComponentSlot {
        &self.components[id.0]
    }

    pub(crate) fn property(&self, key: &PropertyKey) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub(crate) fn service_names(&self) -> Vec<&'static str> {
        self.bindings.keys().map(ServiceKey::type_name).collect()
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("components", &self.components.len())
            .field("services", &self.bindings.len())
            .field("properties", &self.properties.len())
            .field("ambiguity", &self.ambiguity)
            .finish()
    }
}

#[derive(Debug)]
enum Stage {
    Open,
    Finalized,
    /// Verification failed. Terminal: every later resolution replays the error.
    Faulted(UnsatisfiableGraphError),
}

#[derive(Default)]
struct Table {
    components: Vec<Arc<ComponentRegistration>>,
    by_implementation: HashMap<ServiceKey, ComponentId>,
    services: HashMap<ServiceKey, Vec<ComponentId>>,
    presets: HashMap<ServiceKey, Preset>,
    properties: HashMap<PropertyKey, PropertyValue>,
}

impl Table {
    fn has(&self, key: &ServiceKey) -> bool {
        self.presets.contains_key(key) || self.services.contains_key(key)
    }

    /// A configured property is never autowired.
    fn is_bound(&self, component: ServiceKey, name: &'static str) -> bool {
        self.properties.contains_key(&PropertyKey { component, name })
    }

    fn verify(&self) -> std::result::Result<(), UnsatisfiableGraphError> {
        let nodes: Vec<Node> = self
            .components
            .iter()
            .map(|registration| Node {
                implementation: registration.implementation,
                dependencies: registration.dependencies.clone(),
                optional: registration
                    .autowired
                    .iter()
                    .filter(|&&(name, _)| !self.is_bound(registration.implementation, name))
                    .map(|(_, service)| *service)
                    .collect(),
            })
            .collect();
        let providers: HashMap<ServiceKey, Vec<usize>> = self
            .services
            .iter()
            .map(|(key, ids)| (*key, ids.iter().map(|id| id.0).collect()))
            .collect();
        let presets: HashSet<ServiceKey> = self.presets.keys().copied().collect();

        GraphVerifier::new(&nodes, &providers, &presets).verify()
    }

    fn catalog(&self, ambiguity: AmbiguityPolicy) -> Catalog {
        let mut bindings: HashMap<ServiceKey, Binding> = HashMap::new();

        for (key, ids) in &self.services {
            if self.presets.contains_key(key) {
                continue;
            }
            let binding = match ids.as_slice() {
                [only] if self.components[only.0].lifestyle.is_singleton() => Binding::Shared(*only),
                _ => Binding::Candidates(ids.clone()),
            };
            bindings.insert(*key, binding);
        }
        for (key, preset) in &self.presets {
            bindings.insert(*key, Binding::Preset(preset.clone()));
        }

        Catalog {
            components: self
                .components
                .iter()
                .map(|registration| ComponentSlot {
                    registration: registration.clone(),
                    singleton: OnceCell::new(),
                })
                .collect(),
            bindings,
            properties: self.properties.clone(),
            ambiguity,
        }
    }
}

/// Accumulates registrations and commits them exactly once.
pub(crate) struct Registry {
    stage: RwLock<Stage>,
    table: RwLock<Table>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            stage: RwLock::new(Stage::Open),
            table: RwLock::new(Table::default()),
        }
    }

    /// Adds a registration under every service it provides.
    ///
    /// A type-based registration for a concrete type that is already
    /// registered is merged into the existing one: binding the same
    /// (service, type) pair again is a no-op.
    pub fn register(&self, mut registration: ComponentRegistration) -> Result<ComponentId> {
        let stage = self.stage.read();
        ensure_open(&stage)?;
        let mut table = self.table.write();

        if registration.origin == Origin::Type {
            if let Some(&existing) = table.by_implementation.get(&registration.implementation) {
                let current = &table.components[existing.0];
                if current.lifestyle != registration.lifestyle {
                    warn!(
                        component = %registration.implementation,
                        kept = %current.lifestyle,
                        ignored = %registration.lifestyle,
                        "Component already configured with a different lifestyle"
                    );
                } else {
                    debug!(component = %registration.implementation, "Duplicate registration merged");
                }
                return Ok(existing);
            }
        }

        let id = ComponentId(table.components.len());
        registration.id = id;

        for key in &registration.services {
            let ids = table.services.entry(*key).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        if registration.origin == Origin::Type {
            table.by_implementation.insert(registration.implementation, id);
        }

        debug!(
            component = %registration.implementation,
            lifestyle = %registration.lifestyle,
            services = registration.services.len(),
            "Registered component"
        );
        table.components.push(Arc::new(registration));
        Ok(id)
    }

    /// Binds a pre-built instance as the only target for `key`.
    pub fn register_preset(&self, key: ServiceKey, preset: Preset) -> Result<()> {
        let stage = self.stage.read();
        ensure_open(&stage)?;
        let mut table = self.table.write();

        if table.presets.insert(key, preset).is_some() {
            debug!(key = %key, "Replaced registered instance");
        } else {
            debug!(key = %key, "Registered instance");
        }
        Ok(())
    }

    pub fn bind_property(&self, key: PropertyKey, value: PropertyValue) -> Result<()> {
        let stage = self.stage.read();
        ensure_open(&stage)?;
        self.table.write().properties.insert(key, value);
        debug!(component = %key.component, property = key.name, "Configured property");
        Ok(())
    }

    /// Whether any registration or instance exists for `key`.
    pub fn has(&self, key: &ServiceKey) -> bool {
        self.table.read().has(key)
    }

    pub fn is_finalized(&self) -> bool {
        matches!(*self.stage.read(), Stage::Finalized)
    }

    pub fn len(&self) -> usize {
        self.table.read().components.len()
    }

    /// Registered service names, for "did you mean" suggestions.
    pub fn service_names(&self) -> Vec<&'static str> {
        let table = self.table.read();
        table
            .services
            .keys()
            .chain(table.presets.keys())
            .map(ServiceKey::type_name)
            .collect()
    }

    /// Verifies and commits the table to `engine`, once.
    ///
    /// Concurrent callers block on the stage lock until the first one is
    /// done, then observe its outcome.
    #[instrument(skip_all, name = "finalize")]
    pub fn finalize(
        &self,
        engine: &dyn ResolutionEngine,
        settings: &ContainerSettings,
    ) -> Result<()> {
        if let Some(outcome) = settled(&self.stage.read()) {
            return outcome;
        }

        let mut stage = self.stage.write();
        if let Some(outcome) = settled(&stage) {
            return outcome;
        }

        let table = self.table.read();
        info!(
            components = table.components.len(),
            services = table.services.len(),
            instances = table.presets.len(),
            "Finalizing registrations"
        );

        if settings.verify_graph {
            if let Err(err) = table.verify() {
                *stage = Stage::Faulted(err.clone());
                return Err(AnbarError::UnsatisfiableGraph(err));
            }
        }

        engine.commit(table.catalog(settings.ambiguity))?;
        *stage = Stage::Finalized;

        info!("Registrations finalized ✓");
        Ok(())
    }
}

fn ensure_open(stage: &Stage) -> Result<()> {
    match stage {
        Stage::Open => Ok(()),
        Stage::Finalized | Stage::Faulted(_) => Err(AnbarError::RegistrationClosed),
    }
}

fn settled(stage: &Stage) -> Option<Result<()>> {
    match stage {
        Stage::Open => None,
        Stage::Finalized => Some(Ok(())),
        Stage::Faulted(err) => Some(Err(AnbarError::UnsatisfiableGraph(err.clone()))),
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("stage", &*self.stage.read())
            .field("components", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NativeEngine;
    use crate::services::ServiceSet;
    use crate::component::Interface;

    trait Greeter: Send + Sync {}
    impl Interface for dyn Greeter {}

    struct English;
    impl Greeter for English {}
    impl Component for English {
        fn construct(_: &Resolver<'_>) -> Result<Self> {
            Ok(English)
        }
        fn services(services: &mut ServiceSet<Self>) {
            services.implements::<dyn Greeter>(|e| e as Arc<dyn Greeter>);
        }
    }

    struct French;
    impl Greeter for French {}
    impl Component for French {
        fn construct(_: &Resolver<'_>) -> Result<Self> {
            Ok(French)
        }
        fn services(services: &mut ServiceSet<Self>) {
            services.implements::<dyn Greeter>(|f| f as Arc<dyn Greeter>);
        }
    }

    struct NeedsGreeter;
    impl Component for NeedsGreeter {
        fn construct(_: &Resolver<'_>) -> Result<Self> {
            Ok(NeedsGreeter)
        }
        fn dependencies(dependencies: &mut Dependencies) {
            dependencies.require::<dyn Greeter>();
        }
    }

    fn finalize(registry: &Registry) -> Result<()> {
        registry.finalize(&NativeEngine::new(), &ContainerSettings::default())
    }

    #[test]
    fn registering_twice_is_a_no_op() {
        let registry = Registry::new();
        let first = registry
            .register(ComponentRegistration::of_component::<English>(Lifestyle::Transient))
            .unwrap();
        let second = registry
            .register(ComponentRegistration::of_component::<English>(Lifestyle::Transient))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.table.read().services[&ServiceKey::of::<dyn Greeter>()],
            vec![first]
        );
    }

    #[test]
    fn candidates_accumulate_in_order() {
        let registry = Registry::new();
        let en = registry
            .register(ComponentRegistration::of_component::<English>(Lifestyle::Transient))
            .unwrap();
        let fr = registry
            .register(ComponentRegistration::of_component::<French>(Lifestyle::Transient))
            .unwrap();

        assert_eq!(
            registry.table.read().services[&ServiceKey::of::<dyn Greeter>()],
            vec![en, fr]
        );
    }

    #[test]
    fn factory_registrations_are_never_merged() {
        let registry = Registry::new();
        for _ in 0..2 {
            registry
                .register(ComponentRegistration::of_factory::<u32, _>(
                    Lifestyle::Transient,
                    |_: &Resolver<'_>| Ok(Arc::new(1u32)),
                ))
                .unwrap();
        }
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn factory_component_provides_the_services_of_its_type() {
        let registry = Registry::new();
        let built = registry
            .register(ComponentRegistration::of_component::<English>(Lifestyle::Transient))
            .unwrap();
        let produced = registry
            .register(ComponentRegistration::of_factory_component::<English, _>(
                Lifestyle::Transient,
                |_: &Resolver<'_>| Ok(English),
            ))
            .unwrap();

        assert_ne!(built, produced);
        assert_eq!(
            registry.table.read().services[&ServiceKey::of::<dyn Greeter>()],
            vec![built, produced]
        );
    }

    #[test]
    fn has_covers_components_and_presets() {
        let registry = Registry::new();
        assert!(!registry.has(&ServiceKey::of::<dyn Greeter>()));

        registry
            .register(ComponentRegistration::of_component::<English>(Lifestyle::Singleton))
            .unwrap();
        registry
            .register_preset(ServiceKey::of::<String>(), Arc::new(|| Box::new(Arc::new(String::new())) as Erased))
            .unwrap();

        assert!(registry.has(&ServiceKey::of::<English>()));
        assert!(registry.has(&ServiceKey::of::<dyn Greeter>()));
        assert!(registry.has(&ServiceKey::of::<String>()));
    }

    #[test]
    fn finalized_table_rejects_registrations() {
        let registry = Registry::new();
        finalize(&registry).unwrap();

        assert!(registry.is_finalized());
        assert!(matches!(
            registry.register(ComponentRegistration::of_component::<English>(Lifestyle::Transient)),
            Err(AnbarError::RegistrationClosed)
        ));
    }

    #[test]
    fn faulted_table_replays_the_error() {
        let registry = Registry::new();
        registry
            .register(ComponentRegistration::of_component::<NeedsGreeter>(Lifestyle::Transient))
            .unwrap();

        assert!(matches!(finalize(&registry), Err(AnbarError::UnsatisfiableGraph(_))));
        assert!(matches!(finalize(&registry), Err(AnbarError::UnsatisfiableGraph(_))));
        assert!(!registry.is_finalized());
    }

    #[test]
    fn single_singleton_becomes_shared_binding() {
        let registry = Registry::new();
        registry
            .register(ComponentRegistration::of_component::<English>(Lifestyle::Singleton))
            .unwrap();
        let catalog = registry.table.read().catalog(AmbiguityPolicy::LastWins);

        assert!(matches!(
            catalog.binding(&ServiceKey::of::<dyn Greeter>()),
            Some(Binding::Shared(_))
        ));
    }

    #[test]
    fn catalog_lists_registrations_in_order() {
        let registry = Registry::new();
        for registration in [
            ComponentRegistration::of_component::<French>(Lifestyle::Transient),
            ComponentRegistration::of_component::<English>(Lifestyle::Singleton),
        ] {
            registry.register(registration).unwrap();
        }
        let catalog = registry.table.read().catalog(AmbiguityPolicy::LastWins);

        let implementations: Vec<ServiceKey> =
            catalog.registrations().map(ComponentRegistration::implementation).collect();
        assert_eq!(
            implementations,
            vec![ServiceKey::of::<French>(), ServiceKey::of::<English>()]
        );
    }

    #[test]
    fn preset_shadows_candidates() {
        let registry = Registry::new();
        registry
            .register(ComponentRegistration::of_component::<English>(Lifestyle::Transient))
            .unwrap();
        let french: Arc<dyn Greeter> = Arc::new(French);
        registry
            .register_preset(
                ServiceKey::of::<dyn Greeter>(),
                Arc::new(move || Box::new(french.clone()) as Erased),
            )
            .unwrap();
        let catalog = registry.table.read().catalog(AmbiguityPolicy::LastWins);

        assert!(matches!(
            catalog.binding(&ServiceKey::of::<dyn Greeter>()),
            Some(Binding::Preset(_))
        ));
    }
}
