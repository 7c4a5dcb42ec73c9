//! Basic example of the Anbar DI container.
//!
//! Run with `RUST_LOG=anbar_container=debug` to watch registration,
//! finalization and disposal.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anbar::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

// === Define your traits and types ===

trait Logger: Send + Sync {
    fn log(&self, message: &str);
}
impl Interface for dyn Logger {}

trait AuditTrail: Logger {
    fn audit(&self, action: &str) {
        self.log(&format!("AUDIT {action}"));
    }
}
impl Interface for dyn AuditTrail {
    fn extends(parents: &mut Parents<'_, Self>) {
        parents.parent::<dyn Logger>(|trail| trail as Arc<dyn Logger>);
    }
}

trait OrderHandler: Send + Sync {
    fn handle(&self, order: u64) -> String;
}
impl Interface for dyn OrderHandler {}

struct ConsoleLogger {
    prefix: String,
}

impl Logger for ConsoleLogger {
    fn log(&self, message: &str) {
        println!("[{}] {message}", self.prefix);
    }
}
impl AuditTrail for ConsoleLogger {}

impl Component for ConsoleLogger {
    fn construct(_: &Resolver<'_>) -> Result<Self> {
        Ok(ConsoleLogger {
            prefix: String::from("LOG"),
        })
    }

    fn services(services: &mut ServiceSet<Self>) {
        services.implements::<dyn AuditTrail>(|l| l as Arc<dyn AuditTrail>);
    }

    fn properties(properties: &mut PropertySet<Self>) {
        properties.value::<String>("Prefix", |logger, prefix| logger.prefix = prefix);
    }
}

/// One per unit of work; rolled back unless committed.
struct Transaction {
    id: u64,
    logger: Arc<dyn Logger>,
}

static NEXT_TRANSACTION: AtomicU64 = AtomicU64::new(1);

impl Disposable for Transaction {
    fn dispose(&self) -> std::result::Result<(), BoxError> {
        self.logger.log(&format!("transaction #{} closed", self.id));
        Ok(())
    }
}

impl Component for Transaction {
    fn construct(resolver: &Resolver<'_>) -> Result<Self> {
        Ok(Transaction {
            id: NEXT_TRANSACTION.fetch_add(1, Ordering::Relaxed),
            logger: resolver.resolve::<dyn Logger>()?,
        })
    }

    fn services(services: &mut ServiceSet<Self>) {
        services.disposable();
    }

    fn dependencies(dependencies: &mut Dependencies) {
        dependencies.require::<dyn Logger>();
    }
}

struct Warehouse {
    name: String,
    capacity: u32,
}

impl Component for Warehouse {
    fn construct(_: &Resolver<'_>) -> Result<Self> {
        Ok(Warehouse {
            name: String::from("main"),
            capacity: 100,
        })
    }

    fn properties(properties: &mut PropertySet<Self>) {
        properties.value::<String>("Name", |warehouse, name| warehouse.name = name);
    }
}

/// Reads the capacity from `WAREHOUSE_CAPACITY` when set.
fn warehouse_from_env(_: &Resolver<'_>) -> Result<Warehouse> {
    let capacity = match std::env::var("WAREHOUSE_CAPACITY") {
        Ok(raw) => raw.parse::<u32>().map_err(AnbarError::construction::<Warehouse>)?,
        Err(_) => 100,
    };
    Ok(Warehouse {
        name: String::from("main"),
        capacity,
    })
}

struct ShippingHandler {
    transaction: Arc<Transaction>,
    warehouse: Arc<Warehouse>,
}

impl OrderHandler for ShippingHandler {
    fn handle(&self, order: u64) -> String {
        format!(
            "shipped order {order} from {} ({} slots) in tx #{}",
            self.warehouse.name, self.warehouse.capacity, self.transaction.id
        )
    }
}

impl Component for ShippingHandler {
    fn construct(resolver: &Resolver<'_>) -> Result<Self> {
        Ok(ShippingHandler {
            transaction: resolver.resolve::<Transaction>()?,
            warehouse: resolver.resolve::<Warehouse>()?,
        })
    }

    fn services(services: &mut ServiceSet<Self>) {
        services.implements::<dyn OrderHandler>(|h| h as Arc<dyn OrderHandler>);
    }

    fn dependencies(dependencies: &mut Dependencies) {
        dependencies.require::<Transaction>().require::<Warehouse>();
    }
}

struct BillingHandler {
    audit: Option<Arc<dyn AuditTrail>>,
}

impl OrderHandler for BillingHandler {
    fn handle(&self, order: u64) -> String {
        if let Some(audit) = &self.audit {
            audit.audit(&format!("billed order {order}"));
        }
        format!("billed order {order}")
    }
}

impl Component for BillingHandler {
    fn construct(_: &Resolver<'_>) -> Result<Self> {
        Ok(BillingHandler { audit: None })
    }

    fn services(services: &mut ServiceSet<Self>) {
        services.implements::<dyn OrderHandler>(|h| h as Arc<dyn OrderHandler>);
    }

    fn properties(properties: &mut PropertySet<Self>) {
        properties.service::<dyn AuditTrail>(
            "Audit",
            |handler| handler.audit.is_some(),
            |handler, audit| handler.audit = Some(audit),
        );
    }
}

fn main() -> Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("anbar_container=info")),
        )
        .init();

    let container = Container::new();
    container
        .configure::<ConsoleLogger>(Lifestyle::Singleton)?
        .configure_property::<ConsoleLogger, String>("Prefix", "shop".to_string())?
        .configure_factory_component::<Warehouse, _>(Lifestyle::Singleton, warehouse_from_env)?
        .configure_property::<Warehouse, String>("Name", "east".to_string())?
        .configure::<Transaction>(Lifestyle::ScopedToUnitOfWork)?
        .configure::<ShippingHandler>(Lifestyle::Transient)?
        .configure::<BillingHandler>(Lifestyle::Transient)?;

    // Fail fast on missing dependencies or cycles.
    container.finalize()?;

    let logger = container.build::<dyn Logger>()?;
    logger.log("container ready");

    for order in [1001, 1002] {
        let unit = container.build_child_container()?;
        for handler in unit.build_all::<dyn OrderHandler>()? {
            info!(order, "{}", handler.handle(order));
        }
        unit.dispose()?;
    }

    container.dispose()?;
    Ok(())
}
