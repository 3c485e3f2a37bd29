// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property registry.
//!
//! Properties are registered once, before any object uses them, and live as
//! long as the registry. The registry is moved into an
//! [`ObjectTree`](crate::ObjectTree), which consults it for defaults,
//! validation and inheritance on every operation.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::{Any, TypeId};
use core::fmt;
use hashbrown::HashMap;

use crate::metadata::PropertyMetadata;
use crate::property::{OwnerType, Property, PropertyId, PropertyValue};
use crate::value::ErasedValue;

/// A registered property: its name, value type and metadata.
pub struct PropertyRegistration {
    name: &'static str,
    type_id: TypeId,
    type_name: &'static str,
    metadata: Box<dyn ErasedMetadata>,
}

impl PropertyRegistration {
    /// Returns the property name.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the [`TypeId`] of the value type.
    #[must_use]
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the name of the value type.
    #[must_use]
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns whether the property inherits.
    #[must_use]
    #[inline]
    pub fn inherits(&self) -> bool {
        self.metadata.inherits()
    }

    /// Returns whether the property is direct.
    #[must_use]
    #[inline]
    pub fn is_direct(&self) -> bool {
        self.metadata.is_direct()
    }

    /// Returns the default for objects of `owner`, boxed.
    #[must_use]
    pub fn default_value(&self, owner: OwnerType) -> ErasedValue {
        self.metadata.default_value(owner)
    }

    /// Runs the validator against an erased value.
    ///
    /// Values of the wrong type are never valid.
    #[must_use]
    pub fn is_valid(&self, value: &ErasedValue) -> bool {
        self.metadata.is_valid(value)
    }
}

impl fmt::Debug for PropertyRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyRegistration")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("inherits", &self.inherits())
            .field("direct", &self.is_direct())
            .finish_non_exhaustive()
    }
}

/// The set of known properties.
///
/// # Example
///
/// ```rust
/// use understory_value_store::{OwnerType, PropertyMetadataBuilder, PropertyRegistry};
///
/// let mut registry = PropertyRegistry::new();
/// let font_size = registry.register(
///     "FontSize",
///     PropertyMetadataBuilder::new(12.0_f64).inherits(true).build(),
/// );
///
/// assert_eq!(registry.by_name("FontSize"), Some(font_size.id()));
/// assert!(registry.inherits(font_size.id()));
/// assert_eq!(
///     registry.default_value(font_size.id(), OwnerType::default()),
///     Some(understory_value_store::ErasedValue::new(12.0_f64)),
/// );
/// ```
#[derive(Default)]
pub struct PropertyRegistry {
    properties: Vec<PropertyRegistration>,
    by_name: HashMap<&'static str, PropertyId>,
}

impl PropertyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a property and returns its typed key.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered, or if more than 65,535
    /// properties are registered.
    pub fn register<T: PropertyValue>(
        &mut self,
        name: &'static str,
        metadata: PropertyMetadata<T>,
    ) -> Property<T> {
        assert!(
            !self.by_name.contains_key(name),
            "Property '{name}' is already registered"
        );
        assert!(
            self.properties.len() < u16::MAX as usize,
            "Too many properties registered (max {})",
            u16::MAX
        );

        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let id = PropertyId::new(self.properties.len() as u16);

        self.properties.push(PropertyRegistration {
            name,
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
            metadata: Box::new(metadata),
        });
        self.by_name.insert(name, id);

        Property::from_id(id)
    }

    /// Returns the number of registered properties.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<PropertyId> {
        self.by_name.get(name).copied()
    }

    /// Returns the registration for `id`.
    #[must_use]
    #[inline]
    pub fn get(&self, id: PropertyId) -> Option<&PropertyRegistration> {
        self.properties.get(usize::from(id.index()))
    }

    /// Returns the name of `id`.
    #[must_use]
    pub fn name(&self, id: PropertyId) -> Option<&'static str> {
        self.get(id).map(PropertyRegistration::name)
    }

    /// Returns whether `id` inherits. Unknown properties do not.
    #[must_use]
    pub fn inherits(&self, id: PropertyId) -> bool {
        self.get(id).is_some_and(PropertyRegistration::inherits)
    }

    /// Returns the default of `id` for objects of `owner`.
    #[must_use]
    pub fn default_value(&self, id: PropertyId, owner: OwnerType) -> Option<ErasedValue> {
        self.get(id).map(|r| r.default_value(owner))
    }

    /// Returns the typed metadata for `property`.
    ///
    /// Returns `None` if the property is unknown or registered with another type.
    #[must_use]
    pub fn get_metadata<T: PropertyValue>(
        &self,
        property: Property<T>,
    ) -> Option<&PropertyMetadata<T>> {
        self.get(property.id())
            .and_then(|r| r.metadata.as_any().downcast_ref())
    }

    /// Iterates over all registrations in ID order.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &PropertyRegistration)> {
        self.properties.iter().enumerate().map(|(i, r)| {
            #[expect(clippy::cast_possible_truncation, reason = "index < len < u16::MAX")]
            let id = PropertyId::new(i as u16);
            (id, r)
        })
    }
}

impl fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("count", &self.properties.len())
            .field(
                "properties",
                &self.properties.iter().map(|r| r.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

trait ErasedMetadata: Any {
    fn as_any(&self) -> &dyn Any;
    fn inherits(&self) -> bool;
    fn is_direct(&self) -> bool;
    fn default_value(&self, owner: OwnerType) -> ErasedValue;
    fn is_valid(&self, value: &ErasedValue) -> bool;
}

impl<T: PropertyValue> ErasedMetadata for PropertyMetadata<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn inherits(&self) -> bool {
        Self::inherits(self)
    }

    fn is_direct(&self) -> bool {
        Self::is_direct(self)
    }

    fn default_value(&self, owner: OwnerType) -> ErasedValue {
        ErasedValue::new(self.default_for(owner).clone())
    }

    fn is_valid(&self, value: &ErasedValue) -> bool {
        value.downcast_ref::<T>().is_some_and(|v| Self::is_valid(self, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::PropertyMetadataBuilder;
    use alloc::{format, vec};

    #[test]
    fn register_assigns_dense_ids() {
        let mut registry = PropertyRegistry::new();
        assert!(registry.is_empty());

        let width = registry.register("Width", PropertyMetadata::new(0.0_f64));
        let height = registry.register("Height", PropertyMetadata::new(0.0_f64));

        assert_eq!(registry.len(), 2);
        assert_eq!(width.id().index(), 0);
        assert_eq!(height.id().index(), 1);
        assert_eq!(registry.name(height.id()), Some("Height"));
        assert_eq!(registry.name(PropertyId::new(99)), None);
    }

    #[test]
    fn erased_queries() {
        const LABEL: OwnerType = OwnerType::new(4);
        let mut registry = PropertyRegistry::new();
        let size = registry.register(
            "FontSize",
            PropertyMetadataBuilder::new(12.0_f64)
                .inherits(true)
                .default_for(LABEL, 10.0)
                .validate(|v| *v > 0.0)
                .build(),
        );
        let registration = registry.get(size.id()).unwrap();

        assert!(registration.inherits());
        assert!(!registration.is_direct());
        assert_eq!(registration.type_id(), TypeId::of::<f64>());
        assert_eq!(
            registration.default_value(LABEL),
            ErasedValue::new(10.0_f64)
        );
        assert!(registration.is_valid(&ErasedValue::new(3.0_f64)));
        assert!(!registration.is_valid(&ErasedValue::new(-3.0_f64)));
        assert!(!registration.is_valid(&ErasedValue::new(3_i32)));
    }

    #[test]
    fn typed_metadata_requires_matching_type() {
        let mut registry = PropertyRegistry::new();
        let width = registry.register("Width", PropertyMetadata::new(5.0_f64));

        assert_eq!(registry.get_metadata(width).unwrap().default_value(), &5.0);
        let wrong: Property<i32> = Property::from_id(width.id());
        assert!(registry.get_metadata(wrong).is_none());
    }

    #[test]
    fn iter_in_registration_order() {
        let mut registry = PropertyRegistry::new();
        registry.register("A", PropertyMetadata::new(0_u8));
        registry.register("B", PropertyMetadata::new(0_u8));

        let names: Vec<_> = registry.iter().map(|(_, r)| r.name()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(format!("{registry:?}").contains("\"A\""));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_name_panics() {
        let mut registry = PropertyRegistry::new();
        registry.register("Width", PropertyMetadata::new(0.0_f64));
        registry.register("Width", PropertyMetadata::new(0.0_f64));
    }
}
