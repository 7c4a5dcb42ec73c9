//! Property injection.
//!
//! After a component is constructed, its declared properties are filled in:
//! an explicitly configured value always wins; otherwise a property whose
//! type is a registered service is resolved and assigned if still unset.
//!
//! Setters are plain function pointers captured when the component declares
//! its properties, so nothing is looked up by name at injection time except
//! the configured bindings.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::component::Component;
use crate::error::{AnbarError, Result, TypeMismatchError, UnknownPropertyError};
use crate::key::ServiceKey;
use crate::resolver::Resolver;

/// A configured property value, type-erased.
pub(crate) type PropertyValue = Arc<dyn Any + Send + Sync>;

/// Identifies a property binding: which component, which property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PropertyKey {
    pub component: ServiceKey,
    pub name: &'static str,
}

type Assign<C> = Box<dyn Fn(&mut C, &PropertyValue) -> bool + Send + Sync>;
type Fill<C> = Box<dyn Fn(&mut C, &Resolver<'_>) -> Result<()> + Send + Sync>;

struct Autowire<C> {
    service: ServiceKey,
    is_set: fn(&C) -> bool,
    fill: Fill<C>,
}

struct Property<C> {
    name: &'static str,
    value_type: ServiceKey,
    assign: Assign<C>,
    autowire: Option<Autowire<C>>,
}

/// The settable properties of component `C`.
pub struct PropertySet<C> {
    properties: Vec<Property<C>>,
}

impl<C: Send + Sync + 'static> PropertySet<C> {
    pub(crate) fn collect() -> Self
    where
        C: Component,
    {
        let mut set = PropertySet {
            properties: Vec::new(),
        };
        C::properties(&mut set);
        set
    }

    /// Declares a property that only takes explicitly configured values.
    pub fn value<V>(&mut self, name: &'static str, set: fn(&mut C, V)) -> &mut Self
    where
        V: Clone + Send + Sync + 'static,
    {
        self.properties.push(Property {
            name,
            value_type: ServiceKey::of::<V>(),
            assign: Box::new(move |component: &mut C, value: &PropertyValue| {
                match value.downcast_ref::<V>() {
                    Some(value) => {
                        set(component, value.clone());
                        true
                    }
                    None => false,
                }
            }),
            autowire: None,
        });
        self
    }

    /// Declares an optional dependency on service `T`.
    ///
    /// The property's declared type is `Arc<T>`. If no value is configured,
    /// `is_set` reports `false` and `T` is registered, it is resolved and
    /// passed to `set`.
    pub fn service<T>(
        &mut self,
        name: &'static str,
        is_set: fn(&C) -> bool,
        set: fn(&mut C, Arc<T>),
    ) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.properties.push(Property {
            name,
            value_type: ServiceKey::of::<Arc<T>>(),
            assign: Box::new(move |component: &mut C, value: &PropertyValue| {
                match value.downcast_ref::<Arc<T>>() {
                    Some(service) => {
                        set(component, service.clone());
                        true
                    }
                    None => false,
                }
            }),
            autowire: Some(Autowire {
                service: ServiceKey::of::<T>(),
                is_set,
                fill: Box::new(move |component: &mut C, resolver: &Resolver<'_>| {
                    set(component, resolver.resolve::<T>()?);
                    Ok(())
                }),
            }),
        });
        self
    }

    /// Names of all declared properties, in declaration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.properties.iter().map(|p| p.name).collect()
    }

    /// Properties that are autowired when left unset, with their services.
    pub(crate) fn autowired(&self) -> Vec<(&'static str, ServiceKey)> {
        self.properties
            .iter()
            .filter_map(|p| p.autowire.as_ref().map(|autowire| (p.name, autowire.service)))
            .collect()
    }

    /// Validates a binding for `name` carrying a value of type `value_type`.
    ///
    /// Returns the declared (static) property name on success.
    pub(crate) fn check(&self, name: &str, value_type: ServiceKey) -> Result<&'static str> {
        if name.trim().is_empty() {
            return Err(AnbarError::InvalidArgument {
                argument: "property",
                reason: "property name must not be blank".into(),
            });
        }

        let component = ServiceKey::of::<C>();
        let property = self
            .properties
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| {
                AnbarError::UnknownProperty(UnknownPropertyError {
                    component,
                    property: name.to_string(),
                    known: self.names(),
                })
            })?;

        if property.value_type != value_type {
            return Err(AnbarError::TypeMismatch(TypeMismatchError {
                component,
                property: property.name,
                expected: property.value_type.type_name(),
                actual: value_type.type_name(),
            }));
        }

        Ok(property.name)
    }

    /// Fills in the properties of a freshly constructed instance.
    pub(crate) fn inject(&self, instance: &mut C, resolver: &Resolver<'_>) -> Result<()> {
        let component = ServiceKey::of::<C>();

        for property in &self.properties {
            let key = PropertyKey {
                component,
                name: property.name,
            };

            if let Some(value) = resolver.property_binding(&key) {
                if !(property.assign)(instance, value) {
                    return Err(AnbarError::TypeMismatch(TypeMismatchError {
                        component,
                        property: property.name,
                        expected: property.value_type.type_name(),
                        actual: "<unknown>",
                    }));
                }
                trace!(component = %component, property = property.name, "Applied configured property");
                continue;
            }

            let Some(autowire) = &property.autowire else {
                continue;
            };
            if !(autowire.is_set)(instance) && resolver.has_key(&autowire.service) {
                (autowire.fill)(instance, resolver)?;
                trace!(
                    component = %component,
                    property = property.name,
                    service = %autowire.service,
                    "Autowired property"
                );
            }
        }

        Ok(())
    }
}

impl<C> fmt::Debug for PropertySet<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.properties.iter().map(|p| (p.name, p.value_type)))
            .finish()
    }
}
