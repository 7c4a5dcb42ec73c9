//! Error types for container operations.
//!
//! Configuration errors surface from the `configure_*` call that caused
//! them. Resolution errors surface from `build`. Disposal errors are
//! collected across a whole scope and reported together.

use std::fmt;

use anbar_support::rendering::{render_bullets, render_chain};

use crate::key::ServiceKey;

/// Boxed error produced by user code (factories, disposers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all Anbar operations.
#[derive(Debug, thiserror::Error)]
pub enum AnbarError {
    /// `build` was asked for a service nobody registered.
    #[error("{}", .0)]
    NotRegistered(NotRegisteredError),

    /// A required argument was missing or blank.
    #[error("Invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },

    /// A property binding names a property the component does not declare.
    #[error("{}", .0)]
    UnknownProperty(UnknownPropertyError),

    /// A property binding value has the wrong type.
    #[error("{}", .0)]
    TypeMismatch(TypeMismatchError),

    /// Finalization found a dependency graph that cannot be built.
    #[error("{}", .0)]
    UnsatisfiableGraph(UnsatisfiableGraphError),

    /// One or more scope-owned instances failed to dispose.
    #[error("{}", .0)]
    Disposal(DisposalError),

    /// Several candidates are registered and the settings forbid picking one.
    #[error(
        "Ambiguous registration for {key}: {} candidates{}\n  Hint: remove the extra registrations or use build_all()",
        .candidates.len(),
        render_bullets(.candidates)
    )]
    AmbiguousRegistration {
        key: ServiceKey,
        candidates: Vec<String>,
    },

    /// The registration table is finalized and no longer accepts changes.
    #[error("Container is finalized. Register components before the first build()")]
    RegistrationClosed,

    /// The container (or the scope behind it) was already disposed.
    #[error("Container has been disposed")]
    Disposed,

    /// A constructor or factory failed, or produced the wrong type.
    #[error("Failed to construct {key}: {source}")]
    ConstructionFailed {
        key: ServiceKey,
        #[source]
        source: BoxError,
    },
}

impl AnbarError {
    /// Wraps a user error raised while building `T`.
    pub fn construction<T: ?Sized + 'static>(source: impl Into<BoxError>) -> Self {
        AnbarError::ConstructionFailed {
            key: ServiceKey::of::<T>(),
            source: source.into(),
        }
    }
}

/// A service was requested that has no registration.
#[derive(Debug)]
pub struct NotRegisteredError {
    /// The service that was requested.
    pub requested: ServiceKey,
    /// Registered services with similar names.
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service not registered: {}", self.requested)?;
        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:{}", render_bullets(&self.suggestions))?;
        }
        write!(
            f,
            "\n  Hint: Did you forget to configure a component implementing {}?",
            self.requested
        )
    }
}

/// A property binding named a property the component does not have.
#[derive(Debug)]
pub struct UnknownPropertyError {
    pub component: ServiceKey,
    pub property: String,
    /// Properties the component does declare.
    pub known: Vec<&'static str>,
}

impl fmt::Display for UnknownPropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown property `{}` on {}",
            self.property, self.component
        )?;
        if self.known.is_empty() {
            write!(f, "\n  {} declares no settable properties", self.component)
        } else {
            write!(f, "\n  Declared properties:{}", render_bullets(&self.known))
        }
    }
}

/// A property binding value does not match the property's declared type.
#[derive(Debug)]
pub struct TypeMismatchError {
    pub component: ServiceKey,
    pub property: &'static str,
    pub expected: &'static str,
    pub actual: &'static str,
}

impl fmt::Display for TypeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type mismatch for property `{}` on {}: expected {}, got {}",
            self.property, self.component, self.expected, self.actual
        )
    }
}

/// Why the dependency graph could not be satisfied.
#[derive(Debug, Clone)]
pub enum UnsatisfiableGraphError {
    /// A component requires a service that nothing provides.
    Missing {
        component: ServiceKey,
        dependency: ServiceKey,
    },
    /// Declared dependencies form a cycle.
    Cycle { chain: Vec<ServiceKey> },
}

impl fmt::Display for UnsatisfiableGraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsatisfiableGraphError::Missing {
                component,
                dependency,
            } => {
                write!(f, "Unsatisfiable dependency: {component} requires {dependency}")?;
                write!(f, "\n  Hint: Configure a component or instance for {dependency}")
            }
            UnsatisfiableGraphError::Cycle { chain } => {
                let names: Vec<String> = chain.iter().map(ServiceKey::short_name).collect();
                write!(f, "Circular dependency detected:\n  {}", render_chain(&names))?;
                write!(
                    f,
                    "\n  Hint: Break the cycle with an injected property or a factory"
                )
            }
        }
    }
}

/// A single instance that failed to dispose.
#[derive(Debug)]
pub struct DisposalFailure {
    /// The component whose instance failed.
    pub component: ServiceKey,
    pub source: BoxError,
}

/// Every disposal failure from one scope teardown.
#[derive(Debug)]
pub struct DisposalError {
    pub failures: Vec<DisposalFailure>,
}

impl fmt::Display for DisposalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self
            .failures
            .iter()
            .map(|failure| format!("{}: {}", failure.component, failure.source))
            .collect();
        write!(
            f,
            "{} instance(s) failed to dispose:{}",
            self.failures.len(),
            render_bullets(&lines)
        )
    }
}

/// Convenient Result type for Anbar operations.
pub type Result<T> = std::result::Result<T, AnbarError>;
