// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change notifications and diagnostics.

use crate::priority::BindingPriority;
use crate::property::{Property, PropertyId, PropertyValue};
use crate::tree::ObjectId;
use crate::value::ErasedValue;

/// A change to what an object shows for a property.
///
/// Collected by [`ObjectTree`](crate::ObjectTree) in the order they happen and
/// handed out by [`drain_changes`](crate::ObjectTree::drain_changes).
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyChange {
    /// Object whose property changed.
    pub object: ObjectId,
    /// Property that changed.
    pub property: PropertyId,
    /// Previous value.
    pub old_value: ErasedValue,
    /// New value.
    pub new_value: ErasedValue,
    /// Tier of the new value.
    pub priority: BindingPriority,
    /// `false` when only the base value changed and the visible value did not.
    pub is_effective_value_change: bool,
}

impl PropertyChange {
    /// Returns `true` if this change concerns `property`.
    #[must_use]
    #[inline]
    pub fn is<T>(&self, property: Property<T>) -> bool {
        self.property == property.id()
    }

    /// Returns the new value as `T`, if it is one.
    #[must_use]
    pub fn new_value_as<T: PropertyValue>(&self) -> Option<&T> {
        self.new_value.downcast_ref()
    }

    /// Returns the old value as `T`, if it is one.
    #[must_use]
    pub fn old_value_as<T: PropertyValue>(&self) -> Option<&T> {
        self.old_value.downcast_ref()
    }
}

/// A snapshot of how a property resolved on one object.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDiagnostic {
    /// The property.
    pub property: PropertyId,
    /// Its registered name.
    pub name: &'static str,
    /// What the object currently shows.
    pub value: ErasedValue,
    /// Where it came from; `Inherited` or `Unset` without an effective value.
    pub priority: BindingPriority,
    /// The value without animations, when a non-animation contributor exists.
    pub base_value: Option<ErasedValue>,
    /// Tier of [`base_value`](Self::base_value), or `Unset`.
    pub base_priority: BindingPriority,
}
