//! Core container implementation for Anbar DI.

pub mod component;
pub mod container;
pub mod engine;
pub mod error;
mod graph;
pub mod key;
pub mod lifestyle;
pub mod properties;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod services;
pub mod settings;

pub use component::{Component, Disposable, Interface};
pub use container::{Container, prelude};
pub use engine::{NativeEngine, ResolutionEngine};
pub use error::{AnbarError, Result};
pub use key::ServiceKey;
pub use lifestyle::Lifestyle;
pub use settings::{AmbiguityPolicy, ContainerSettings};
