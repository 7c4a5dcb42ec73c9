//! Container settings.
//!
//! Settings are fixed when the container is created. They deserialize from
//! any serde format, with every field optional:
//!
//! ```
//! use anbar_container::settings::{AmbiguityPolicy, ContainerSettings};
//!
//! let settings = ContainerSettings::default()
//!     .ambiguity(AmbiguityPolicy::Reject)
//!     .verify_graph(false);
//! assert_eq!(settings.ambiguity, AmbiguityPolicy::Reject);
//! assert!(!settings.verify_graph);
//! ```

use serde::{Deserialize, Serialize};

/// What `build` does when a service has several candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// The most recently registered candidate wins. Registering a second
    /// implementation is how an application overrides a default one.
    #[default]
    LastWins,

    /// Fail with [`AnbarError::AmbiguousRegistration`](crate::error::AnbarError::AmbiguousRegistration).
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// Tie-break for `build` on multiply-registered services.
    /// `build_all` is unaffected and always returns every candidate.
    pub ambiguity: AmbiguityPolicy,

    /// Check declared dependencies for missing services and cycles when
    /// the registration table is finalized.
    pub verify_graph: bool,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            ambiguity: AmbiguityPolicy::LastWins,
            verify_graph: true,
        }
    }
}

impl ContainerSettings {
    pub fn ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity = policy;
        self
    }

    pub fn verify_graph(mut self, verify: bool) -> Self {
        self.verify_graph = verify;
        self
    }
}
