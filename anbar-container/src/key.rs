//! Service identities.
//!
//! A [`ServiceKey`] names a contract the container can hand out: a concrete
//! type such as `ConsoleLogger`, or an interface such as `dyn Logger`.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use anbar_support::rendering::shorten_type_name;

/// Identifies a service contract in the container.
///
/// Two keys are equal when they were made from the same Rust type; the
/// stored type name only feeds diagnostics.
///
/// # Examples
/// ```
/// use anbar_container::key::ServiceKey;
///
/// trait Handler {}
///
/// let key = ServiceKey::of::<dyn Handler>();
/// assert_eq!(key.short_name(), "dyn Handler");
/// assert_eq!(key, ServiceKey::of::<dyn Handler>());
/// assert_ne!(key, ServiceKey::of::<String>());
/// ```
#[derive(Clone, Copy)]
pub struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl ServiceKey {
    /// Key for type `T`, sized or not.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name, as reported by [`std::any::type_name`].
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type name without module paths.
    pub fn short_name(&self) -> String {
        shorten_type_name(self.type_name)
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({})", self.type_name)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}
