//! End-to-end registration and resolution scenarios.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anbar::error::UnsatisfiableGraphError;
use anbar::prelude::*;

// === Interfaces ===

trait ILogger: Send + Sync {
    fn log(&self, message: &str) -> String;
}
impl Interface for dyn ILogger {}

trait IDisposableService: Send + Sync {
    fn name(&self) -> &'static str;
}
impl Interface for dyn IDisposableService {}

trait IAuditLogger: ILogger {}
impl Interface for dyn IAuditLogger {
    fn extends(parents: &mut Parents<'_, Self>) {
        parents.parent::<dyn ILogger>(|audit| audit as Arc<dyn ILogger>);
    }
}

trait IHandler: Send + Sync {
    fn handle(&self) -> &'static str;
}
impl Interface for dyn IHandler {}

// === Components ===

struct Logger {
    level: String,
}

impl ILogger for Logger {
    fn log(&self, message: &str) -> String {
        format!("[{}] {message}", self.level)
    }
}

impl IDisposableService for Logger {
    fn name(&self) -> &'static str {
        "logger"
    }
}

impl Component for Logger {
    fn construct(_: &Resolver<'_>) -> Result<Self> {
        Ok(Logger {
            level: String::from("Info"),
        })
    }

    fn services(services: &mut ServiceSet<Self>) {
        services
            .implements::<dyn ILogger>(|l| l as Arc<dyn ILogger>)
            .implements::<dyn IDisposableService>(|l| l as Arc<dyn IDisposableService>);
    }

    fn properties(properties: &mut PropertySet<Self>) {
        properties.value::<String>("Level", |logger, level| logger.level = level);
    }
}

struct AuditLogger;

impl ILogger for AuditLogger {
    fn log(&self, message: &str) -> String {
        format!("[audit] {message}")
    }
}
impl IAuditLogger for AuditLogger {}

impl Component for AuditLogger {
    fn construct(_: &Resolver<'_>) -> Result<Self> {
        Ok(AuditLogger)
    }

    fn services(services: &mut ServiceSet<Self>) {
        services.implements::<dyn IAuditLogger>(|a| a as Arc<dyn IAuditLogger>);
    }
}

struct ServiceA;
impl IHandler for ServiceA {
    fn handle(&self) -> &'static str {
        "A"
    }
}
impl Component for ServiceA {
    fn construct(_: &Resolver<'_>) -> Result<Self> {
        Ok(ServiceA)
    }
    fn services(services: &mut ServiceSet<Self>) {
        services.implements::<dyn IHandler>(|a| a as Arc<dyn IHandler>);
    }
}

struct ServiceB;
impl IHandler for ServiceB {
    fn handle(&self) -> &'static str {
        "B"
    }
}
impl Component for ServiceB {
    fn construct(_: &Resolver<'_>) -> Result<Self> {
        Ok(ServiceB)
    }
    fn services(services: &mut ServiceSet<Self>) {
        services.implements::<dyn IHandler>(|b| b as Arc<dyn IHandler>);
    }
}

/// Takes the logger through its constructor and every handler as a collection.
struct Dispatcher {
    logger: Arc<dyn ILogger>,
    handlers: Vec<Arc<dyn IHandler>>,
}

impl Component for Dispatcher {
    fn construct(resolver: &Resolver<'_>) -> Result<Self> {
        Ok(Dispatcher {
            logger: resolver.resolve::<dyn ILogger>()?,
            handlers: resolver.resolve_all::<dyn IHandler>()?,
        })
    }

    fn dependencies(dependencies: &mut Dependencies) {
        dependencies.require::<dyn ILogger>();
    }
}

/// Gets its logger through an optional property instead.
struct Reporter {
    logger: Option<Arc<dyn ILogger>>,
}

impl Component for Reporter {
    fn construct(_: &Resolver<'_>) -> Result<Self> {
        Ok(Reporter { logger: None })
    }

    fn properties(properties: &mut PropertySet<Self>) {
        properties.service::<dyn ILogger>(
            "Logger",
            |reporter| reporter.logger.is_some(),
            |reporter, logger| reporter.logger = Some(logger),
        );
    }
}

struct Ping;
struct Pong;

impl Component for Ping {
    fn construct(resolver: &Resolver<'_>) -> Result<Self> {
        resolver.resolve::<Pong>()?;
        Ok(Ping)
    }
    fn dependencies(dependencies: &mut Dependencies) {
        dependencies.require::<Pong>();
    }
}

impl Component for Pong {
    fn construct(resolver: &Resolver<'_>) -> Result<Self> {
        resolver.resolve::<Ping>()?;
        Ok(Pong)
    }
    fn dependencies(dependencies: &mut Dependencies) {
        dependencies.require::<Ping>();
    }
}

trait IInbox: Send + Sync {}
impl Interface for dyn IInbox {}

trait IOutbox: Send + Sync {}
impl Interface for dyn IOutbox {}

/// Inbox and Outbox autowire each other.
struct Inbox {
    outbox: Option<Arc<dyn IOutbox>>,
}
impl IInbox for Inbox {}

impl Component for Inbox {
    fn construct(_: &Resolver<'_>) -> Result<Self> {
        Ok(Inbox { outbox: None })
    }
    fn services(services: &mut ServiceSet<Self>) {
        services.implements::<dyn IInbox>(|i| i as Arc<dyn IInbox>);
    }
    fn properties(properties: &mut PropertySet<Self>) {
        properties.service::<dyn IOutbox>("Outbox", |i| i.outbox.is_some(), |i, o| i.outbox = Some(o));
    }
}

struct Outbox {
    inbox: Option<Arc<dyn IInbox>>,
}
impl IOutbox for Outbox {}

impl Component for Outbox {
    fn construct(_: &Resolver<'_>) -> Result<Self> {
        Ok(Outbox { inbox: None })
    }
    fn services(services: &mut ServiceSet<Self>) {
        services.implements::<dyn IOutbox>(|o| o as Arc<dyn IOutbox>);
    }
    fn properties(properties: &mut PropertySet<Self>) {
        properties.service::<dyn IInbox>("Inbox", |o| o.inbox.is_some(), |o, i| o.inbox = Some(i));
    }
}

struct Vault;

impl Component for Vault {
    fn construct(_: &Resolver<'_>) -> Result<Self> {
        Err(AnbarError::construction::<Self>("vault is sealed"))
    }
}

fn address<T: ?Sized>(instance: &Arc<T>) -> *const () {
    Arc::as_ptr(instance) as *const ()
}

// === Scenarios ===

#[test]
fn singleton_is_shared_across_all_of_its_services() {
    let container = Container::new();
    container.configure::<Logger>(Lifestyle::Singleton).unwrap();

    let as_logger = container.build::<dyn ILogger>().unwrap();
    let as_disposable = container.build::<dyn IDisposableService>().unwrap();
    let as_concrete = container.build::<Logger>().unwrap();

    assert_eq!(address(&as_logger), address(&as_disposable));
    assert_eq!(address(&as_logger), address(&as_concrete));
}

#[test]
fn build_all_returns_one_instance_per_candidate() {
    let container = Container::new();
    container
        .configure::<ServiceA>(Lifestyle::Transient)
        .unwrap()
        .configure::<ServiceB>(Lifestyle::Transient)
        .unwrap();

    let handlers = container.build_all::<dyn IHandler>().unwrap();
    let names: Vec<_> = handlers.iter().map(|h| h.handle()).collect();
    assert_eq!(names, vec!["A", "B"]);

    let again = container.build_all::<dyn IHandler>().unwrap();
    assert_ne!(address(&handlers[0]), address(&again[0]));
}

#[test]
fn last_registration_wins_for_single_build() {
    let container = Container::new();
    container
        .configure::<ServiceA>(Lifestyle::Transient)
        .unwrap()
        .configure::<ServiceB>(Lifestyle::Transient)
        .unwrap();

    assert_eq!(container.build::<dyn IHandler>().unwrap().handle(), "B");
}

#[test]
fn reject_policy_refuses_to_pick() {
    let container =
        Container::with_settings(ContainerSettings::default().ambiguity(AmbiguityPolicy::Reject));
    container
        .configure::<ServiceA>(Lifestyle::Transient)
        .unwrap()
        .configure::<ServiceB>(Lifestyle::Transient)
        .unwrap();

    assert!(matches!(
        container.build::<dyn IHandler>(),
        Err(AnbarError::AmbiguousRegistration { .. })
    ));
    assert_eq!(container.build_all::<dyn IHandler>().unwrap().len(), 2);
}

#[test]
fn parent_interfaces_are_registered_transitively() {
    let container = Container::new();
    container.configure::<AuditLogger>(Lifestyle::Singleton).unwrap();

    assert!(container.has_component::<dyn IAuditLogger>());
    assert!(container.has_component::<dyn ILogger>());
    assert_eq!(container.build::<dyn ILogger>().unwrap().log("x"), "[audit] x");
    assert_eq!(
        address(&container.build::<dyn ILogger>().unwrap()),
        address(&container.build::<dyn IAuditLogger>().unwrap())
    );
}

#[test]
fn constructor_resolves_single_and_collection_dependencies() {
    let container = Container::new();
    container
        .configure::<Logger>(Lifestyle::Singleton)
        .unwrap()
        .configure::<ServiceA>(Lifestyle::Transient)
        .unwrap()
        .configure::<ServiceB>(Lifestyle::Transient)
        .unwrap()
        .configure::<Dispatcher>(Lifestyle::Transient)
        .unwrap();

    let dispatcher = container.build::<Dispatcher>().unwrap();
    assert_eq!(dispatcher.handlers.len(), 2);
    assert_eq!(dispatcher.logger.log("go"), "[Info] go");
}

#[test]
fn configured_property_is_applied_to_every_instance() {
    let container = Container::new();
    container
        .configure::<Logger>(Lifestyle::Transient)
        .unwrap()
        .configure_property::<Logger, String>("Level", "Debug".to_string())
        .unwrap();

    assert_eq!(container.build::<dyn ILogger>().unwrap().log("a"), "[Debug] a");
    assert_eq!(container.build::<Logger>().unwrap().level, "Debug");
}

#[test]
fn string_literal_does_not_configure_a_string_property() {
    let container = Container::new();
    container.configure::<Logger>(Lifestyle::Transient).unwrap();

    match container.configure_property::<Logger, &str>("Level", "Debug") {
        Err(AnbarError::TypeMismatch(err)) => {
            assert_eq!(err.property, "Level");
            assert_eq!(err.actual, "&str");
        }
        other => panic!("expected TypeMismatch, got {:?}", other.map(|_| ())),
    }
    assert_eq!(container.build::<Logger>().unwrap().level, "Info");
}

#[test]
fn factory_built_component_gets_configured_properties() {
    let container = Container::new();
    container
        .configure_factory_component::<Logger, _>(Lifestyle::Transient, |_: &Resolver<'_>| {
            Ok(Logger {
                level: String::from("Trace"),
            })
        })
        .unwrap()
        .configure_property::<Logger, String>("Level", "Debug".to_string())
        .unwrap();

    assert_eq!(container.build::<dyn ILogger>().unwrap().log("a"), "[Debug] a");
    assert_eq!(container.build::<dyn IDisposableService>().unwrap().name(), "logger");
}

#[test]
fn unknown_property_is_rejected_at_configuration() {
    let container = Container::new();
    container.configure::<Logger>(Lifestyle::Transient).unwrap();

    match container.configure_property::<Logger, String>("Nonexistent", "x".to_string()) {
        Err(AnbarError::UnknownProperty(err)) => {
            assert_eq!(err.property, "Nonexistent");
            assert_eq!(err.known, vec!["Level"]);
        }
        other => panic!("expected UnknownProperty, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn registered_service_property_is_autowired() {
    let container = Container::new();
    container
        .configure::<Logger>(Lifestyle::Singleton)
        .unwrap()
        .configure::<Reporter>(Lifestyle::Transient)
        .unwrap();

    let reporter = container.build::<Reporter>().unwrap();
    let logger = container.build::<dyn ILogger>().unwrap();
    assert_eq!(reporter.logger.as_ref().map(address), Some(address(&logger)));
}

#[test]
fn unregistered_service_property_is_left_unset() {
    let container = Container::new();
    container.configure::<Reporter>(Lifestyle::Transient).unwrap();

    assert!(container.build::<Reporter>().unwrap().logger.is_none());
}

#[test]
fn explicit_service_property_beats_autowiring() {
    let container = Container::new();
    let pinned: Arc<dyn ILogger> = Arc::new(AuditLogger);
    container
        .configure::<Logger>(Lifestyle::Singleton)
        .unwrap()
        .configure::<Reporter>(Lifestyle::Transient)
        .unwrap()
        .configure_property::<Reporter, Arc<dyn ILogger>>("Logger", pinned.clone())
        .unwrap();

    let reporter = container.build::<Reporter>().unwrap();
    assert_eq!(reporter.logger.as_ref().map(address), Some(address(&pinned)));
}

#[test]
fn registered_singleton_is_returned_verbatim() {
    let container = Container::new();
    let logger: Arc<dyn ILogger> = Arc::new(Logger {
        level: String::from("Warn"),
    });
    container.register_singleton::<dyn ILogger>(logger.clone()).unwrap();

    let built = container.build::<dyn ILogger>().unwrap();
    assert!(Arc::ptr_eq(&built, &logger));
    assert_eq!(built.log("disk"), "[Warn] disk");
}

#[test]
fn factory_is_lazy_and_follows_its_lifestyle() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let container = Container::new();
    container
        .configure_factory::<dyn IHandler, _>(Lifestyle::Transient, move |_: &Resolver<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(ServiceA) as Arc<dyn IHandler>)
        })
        .unwrap();

    container.finalize().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    container.build::<dyn IHandler>().unwrap();
    container.build::<dyn IHandler>().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn unregistered_identity_fails_and_is_reported_absent() {
    let container = Container::new();
    container.configure::<ServiceA>(Lifestyle::Transient).unwrap();

    assert!(matches!(
        container.build::<dyn ILogger>(),
        Err(AnbarError::NotRegistered(_))
    ));
    assert!(!container.has_component::<dyn ILogger>());
    assert!(container.build_all::<dyn ILogger>().unwrap().is_empty());
}

#[test]
fn missing_constructor_dependency_fails_finalize() {
    let container = Container::new();
    container.configure::<Dispatcher>(Lifestyle::Transient).unwrap();

    match container.finalize() {
        Err(AnbarError::UnsatisfiableGraph(UnsatisfiableGraphError::Missing {
            component,
            dependency,
        })) => {
            assert_eq!(component, ServiceKey::of::<Dispatcher>());
            assert_eq!(dependency, ServiceKey::of::<dyn ILogger>());
        }
        other => panic!("expected a missing dependency, got {other:?}"),
    }
}

#[test]
fn dependency_cycle_fails_finalize() {
    let container = Container::new();
    container
        .configure::<Ping>(Lifestyle::Transient)
        .unwrap()
        .configure::<Pong>(Lifestyle::Transient)
        .unwrap();

    assert!(matches!(
        container.finalize(),
        Err(AnbarError::UnsatisfiableGraph(UnsatisfiableGraphError::Cycle { .. }))
    ));
}

#[test]
fn autowired_cycle_fails_finalize() {
    let container = Container::new();
    container
        .configure::<Inbox>(Lifestyle::Singleton)
        .unwrap()
        .configure::<Outbox>(Lifestyle::Singleton)
        .unwrap();

    match container.finalize() {
        Err(AnbarError::UnsatisfiableGraph(UnsatisfiableGraphError::Cycle { chain })) => {
            assert_eq!(chain.first(), chain.last());
            assert!(chain.contains(&ServiceKey::of::<Inbox>()));
            assert!(chain.contains(&ServiceKey::of::<Outbox>()));
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn unverified_cycles_fail_on_build_instead_of_hanging() {
    let container =
        Container::with_settings(ContainerSettings::default().verify_graph(false));
    container
        .configure::<Inbox>(Lifestyle::Singleton)
        .unwrap()
        .configure::<Outbox>(Lifestyle::Singleton)
        .unwrap()
        .configure::<Ping>(Lifestyle::Transient)
        .unwrap()
        .configure::<Pong>(Lifestyle::Transient)
        .unwrap();

    container.finalize().unwrap();
    assert!(matches!(
        container.build::<dyn IInbox>(),
        Err(AnbarError::UnsatisfiableGraph(UnsatisfiableGraphError::Cycle { .. }))
    ));
    assert!(matches!(
        container.build::<Ping>(),
        Err(AnbarError::UnsatisfiableGraph(UnsatisfiableGraphError::Cycle { .. }))
    ));
}

#[test]
fn configured_property_breaks_an_autowired_cycle() {
    let container = Container::new();
    let outbox: Arc<dyn IOutbox> = Arc::new(Outbox { inbox: None });
    container
        .configure::<Inbox>(Lifestyle::Singleton)
        .unwrap()
        .configure::<Outbox>(Lifestyle::Singleton)
        .unwrap()
        .configure_property::<Inbox, Arc<dyn IOutbox>>("Outbox", outbox.clone())
        .unwrap();

    container.finalize().unwrap();
    let inbox = container.build::<Inbox>().unwrap();
    assert_eq!(inbox.outbox.as_ref().map(address), Some(address(&outbox)));
}

#[test]
fn failing_constructor_names_the_component() {
    let container = Container::new();
    container.configure::<Vault>(Lifestyle::Transient).unwrap();

    match container.build::<Vault>() {
        Err(AnbarError::ConstructionFailed { key, source }) => {
            assert_eq!(key, ServiceKey::of::<Vault>());
            assert_eq!(source.to_string(), "vault is sealed");
        }
        other => panic!("expected ConstructionFailed, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn skipping_verification_defers_missing_dependencies_to_build() {
    let container =
        Container::with_settings(ContainerSettings::default().verify_graph(false));
    container.configure::<Dispatcher>(Lifestyle::Transient).unwrap();

    container.finalize().unwrap();
    assert!(matches!(
        container.build::<Dispatcher>(),
        Err(AnbarError::NotRegistered(_))
    ));
}

#[test]
fn registration_is_closed_once_finalized() {
    let container = Container::new();
    container.configure::<ServiceA>(Lifestyle::Transient).unwrap();
    assert!(container.has_component::<ServiceA>());

    assert!(matches!(
        container.configure::<ServiceB>(Lifestyle::Transient),
        Err(AnbarError::RegistrationClosed)
    ));
    assert!(matches!(
        container.register_singleton::<dyn IHandler>(Arc::new(ServiceB)),
        Err(AnbarError::RegistrationClosed)
    ));
}
