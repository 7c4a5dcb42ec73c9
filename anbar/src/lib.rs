//! # Anbar: a dependency injection container for Rust
//!
//! Register concrete components under every interface they implement,
//! resolve them by lifestyle (transient, singleton, scoped to a unit of
//! work), and tear scopes down deterministically.
//!
//! ```rust
//! use anbar::prelude::*;
//!
//! struct Config {
//!     url: String,
//! }
//! impl Component for Config {
//!     fn construct(_: &Resolver<'_>) -> Result<Self> {
//!         Ok(Config { url: "memory://".into() })
//!     }
//! }
//!
//! let container = Container::new();
//! container.configure::<Config>(Lifestyle::Singleton).unwrap();
//! assert_eq!(container.build::<Config>().unwrap().url, "memory://");
//! ```

pub use anbar_container::*;
pub use anbar_support::*;
