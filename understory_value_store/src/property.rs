// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property identity.
//!
//! [`PropertyId`] names a registered property at runtime, [`Property<T>`] adds the
//! value type for compile-time checking, and [`OwnerType`] identifies the runtime
//! type of an object so defaults can vary per type.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// Bound for types that can be stored as property values.
///
/// Values are compared on every write to decide whether observers need to be
/// notified, and formatted when a write is rejected.
pub trait PropertyValue: Clone + PartialEq + fmt::Debug + 'static {}

impl<T: Clone + PartialEq + fmt::Debug + 'static> PropertyValue for T {}

/// A runtime property identifier.
///
/// Assigned densely by [`PropertyRegistry::register`](crate::PropertyRegistry::register).
/// The u16 keeps per-object entries compact.
///
/// # Example
///
/// ```rust
/// use understory_value_store::PropertyId;
///
/// let id = PropertyId::new(7);
/// assert_eq!(id.index(), 7);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(u16);

impl PropertyId {
    /// Creates a property ID from a registry index.
    #[must_use]
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the registry index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyId").field(&self.0).finish()
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyId({})", self.0)
    }
}

/// A typed property key.
///
/// Wraps a [`PropertyId`] with the value type `T`, so reads and writes through
/// [`ObjectTree`](crate::ObjectTree) are checked at compile time.
pub struct Property<T> {
    id: PropertyId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Property<T> {
    /// Creates a typed property from an ID.
    ///
    /// The ID must have been registered with the same `T`; mismatches are
    /// reported as [`PropertyError::TypeMismatch`](crate::PropertyError::TypeMismatch)
    /// by fallible operations and panic in getters.
    #[must_use]
    #[inline]
    pub const fn from_id(id: PropertyId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the untyped ID.
    #[must_use]
    #[inline]
    pub const fn id(self) -> PropertyId {
        self.id
    }
}

impl<T> Copy for Property<T> {}

impl<T> Clone for Property<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Property<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Property<T> {}

impl<T> Hash for Property<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("id", &self.id)
            .field("type", &core::any::type_name::<T>())
            .finish()
    }
}

/// The runtime type of an object in an [`ObjectTree`](crate::ObjectTree).
///
/// The engine does not know about concrete widget types. Hosts assign each of
/// their object types an `OwnerType` and use it to register per-type defaults
/// with [`PropertyMetadataBuilder::default_for`](crate::PropertyMetadataBuilder::default_for).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerType(u32);

impl OwnerType {
    /// Creates an owner type from a host-chosen index.
    #[must_use]
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the host-chosen index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::String;

    #[test]
    fn property_id_formatting() {
        let id = PropertyId::new(42);
        assert_eq!(format!("{id:?}"), "PropertyId(42)");
        assert_eq!(format!("{id}"), "PropertyId(42)");
    }

    #[test]
    fn typed_property_keeps_id() {
        let id = PropertyId::new(3);
        let width: Property<f64> = Property::from_id(id);
        let name: Property<String> = Property::from_id(id);
        assert_eq!(width.id(), name.id());

        let copy = width;
        assert_eq!(copy, width);
    }

    #[test]
    fn handles_stay_small() {
        use core::mem::size_of;
        assert_eq!(size_of::<Property<String>>(), 2);
        assert_eq!(size_of::<OwnerType>(), 4);
    }

    #[test]
    fn owner_type_default_is_zero() {
        assert_eq!(OwnerType::default(), OwnerType::new(0));
        assert_eq!(OwnerType::new(9).index(), 9);
    }
}
