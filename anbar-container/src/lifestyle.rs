//! Component lifestyles and how they translate into sharing policy.
//!
//! - [`Lifestyle::Transient`]: new instance on every build, owned by the caller
//! - [`Lifestyle::Singleton`]: one instance for the container tree, owned by the root
//! - [`Lifestyle::ScopedToUnitOfWork`]: one instance per scope, owned by that scope

use std::fmt;

use serde::{Deserialize, Serialize};

/// How long a constructed component lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifestyle {
    /// Built fresh on every request. The container keeps no reference.
    Transient,

    /// Built once and shared by the root container and all of its children.
    Singleton,

    /// Built once per scope (child container) and released with it.
    ScopedToUnitOfWork,
}

/// The caching and ownership rule the engine applies to an activation.
///
/// This is what a [`Lifestyle`] means to the resolution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharing {
    /// Never cached; the caller owns the instance.
    Unshared,
    /// Cached once per component and owned by the root scope.
    Root,
    /// Cached once per component in the scope doing the resolving.
    CurrentScope,
}

impl Lifestyle {
    /// Translates the lifestyle into the engine's sharing policy.
    #[inline]
    pub fn sharing(self) -> Sharing {
        match self {
            Lifestyle::Transient => Sharing::Unshared,
            Lifestyle::Singleton => Sharing::Root,
            Lifestyle::ScopedToUnitOfWork => Sharing::CurrentScope,
        }
    }

    #[inline]
    pub fn is_singleton(self) -> bool {
        matches!(self, Lifestyle::Singleton)
    }
}

impl Sharing {
    /// Whether the engine keeps the instance around after handing it out.
    #[inline]
    pub fn is_cached(self) -> bool {
        !matches!(self, Sharing::Unshared)
    }
}

impl fmt::Display for Lifestyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifestyle::Transient => "Transient",
            Lifestyle::Singleton => "Singleton",
            Lifestyle::ScopedToUnitOfWork => "ScopedToUnitOfWork",
        })
    }
}
