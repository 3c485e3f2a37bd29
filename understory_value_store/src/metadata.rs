// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property metadata.
//!
//! [`PropertyMetadata`] is the immutable description of a property: its
//! defaults, whether it inherits, whether it bypasses layered resolution, and
//! an optional validator. Build it with [`PropertyMetadataBuilder`].

use alloc::boxed::Box;
use core::fmt;
use smallvec::SmallVec;

use crate::property::{OwnerType, PropertyValue};

/// Callback deciding whether a value is acceptable for a property.
pub type ValidateValueCallback<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Metadata for a property.
///
/// # Example
///
/// ```rust
/// use understory_value_store::{OwnerType, PropertyMetadataBuilder};
///
/// const BUTTON: OwnerType = OwnerType::new(1);
///
/// let metadata = PropertyMetadataBuilder::new(12.0_f64)
///     .inherits(true)
///     .default_for(BUTTON, 14.0)
///     .validate(|size| *size > 0.0)
///     .build();
///
/// assert_eq!(metadata.default_value(), &12.0);
/// assert_eq!(metadata.default_for(BUTTON), &14.0);
/// assert!(metadata.inherits());
/// assert!(!metadata.is_valid(&-1.0));
/// ```
pub struct PropertyMetadata<T: PropertyValue> {
    default_value: T,
    owner_defaults: SmallVec<[(OwnerType, T); 2]>,
    inherits: bool,
    direct: bool,
    validate: Option<ValidateValueCallback<T>>,
}

impl<T: PropertyValue> PropertyMetadata<T> {
    /// Creates metadata with the given default and no other configuration.
    #[must_use]
    pub fn new(default_value: T) -> Self {
        PropertyMetadataBuilder::new(default_value).build()
    }

    /// Returns the default shared by all owner types without an override.
    #[must_use]
    #[inline]
    pub fn default_value(&self) -> &T {
        &self.default_value
    }

    /// Returns the default for objects of `owner`.
    #[must_use]
    pub fn default_for(&self, owner: OwnerType) -> &T {
        self.owner_defaults
            .iter()
            .find(|(ty, _)| *ty == owner)
            .map_or(&self.default_value, |(_, value)| value)
    }

    /// Returns whether the property flows from ancestors to descendants.
    #[must_use]
    #[inline]
    pub fn inherits(&self) -> bool {
        self.inherits
    }

    /// Returns whether the property bypasses layered resolution.
    ///
    /// Direct properties are stored by their owner; the value store rejects
    /// writes and bindings to them.
    #[must_use]
    #[inline]
    pub fn is_direct(&self) -> bool {
        self.direct
    }

    /// Runs the validator, if any.
    #[must_use]
    pub fn is_valid(&self, value: &T) -> bool {
        self.validate.as_ref().is_none_or(|validate| validate(value))
    }

    /// Returns whether a validator is set.
    #[must_use]
    #[inline]
    pub fn has_validator(&self) -> bool {
        self.validate.is_some()
    }
}

impl<T: PropertyValue> fmt::Debug for PropertyMetadata<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMetadata")
            .field("default_value", &self.default_value)
            .field("owner_defaults", &self.owner_defaults)
            .field("inherits", &self.inherits)
            .field("direct", &self.direct)
            .field("has_validator", &self.validate.is_some())
            .finish()
    }
}

/// Builder for [`PropertyMetadata`].
pub struct PropertyMetadataBuilder<T: PropertyValue> {
    metadata: PropertyMetadata<T>,
}

impl<T: PropertyValue> PropertyMetadataBuilder<T> {
    /// Starts a builder with the given default.
    #[must_use]
    pub fn new(default_value: T) -> Self {
        Self {
            metadata: PropertyMetadata {
                default_value,
                owner_defaults: SmallVec::new(),
                inherits: false,
                direct: false,
                validate: None,
            },
        }
    }

    /// Sets whether descendants inherit this property's value.
    #[must_use]
    pub fn inherits(mut self, inherits: bool) -> Self {
        self.metadata.inherits = inherits;
        self
    }

    /// Marks the property as direct (stored by its owner, not layered).
    #[must_use]
    pub fn direct(mut self, direct: bool) -> Self {
        self.metadata.direct = direct;
        self
    }

    /// Overrides the default for objects of `owner`.
    ///
    /// Calling this again for the same owner replaces the earlier override.
    #[must_use]
    pub fn default_for(mut self, owner: OwnerType, value: T) -> Self {
        let defaults = &mut self.metadata.owner_defaults;
        match defaults.iter_mut().find(|(ty, _)| *ty == owner) {
            Some(slot) => slot.1 = value,
            None => defaults.push((owner, value)),
        }
        self
    }

    /// Sets a validator; writes it rejects fail with
    /// [`PropertyError::InvalidValue`](crate::PropertyError::InvalidValue).
    #[must_use]
    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.metadata.validate = Some(Box::new(validate));
        self
    }

    /// Builds the [`PropertyMetadata`].
    #[must_use]
    pub fn build(self) -> PropertyMetadata<T> {
        self.metadata
    }
}

impl<T: PropertyValue> fmt::Debug for PropertyMetadataBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMetadataBuilder")
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    const BUTTON: OwnerType = OwnerType::new(1);
    const LABEL: OwnerType = OwnerType::new(2);

    #[test]
    fn plain_metadata() {
        let metadata = PropertyMetadata::new(42_i32);
        assert_eq!(metadata.default_value(), &42);
        assert_eq!(metadata.default_for(BUTTON), &42);
        assert!(!metadata.inherits());
        assert!(!metadata.is_direct());
        assert!(!metadata.has_validator());
        assert!(metadata.is_valid(&-5));
    }

    #[test]
    fn owner_defaults_override_and_replace() {
        let metadata = PropertyMetadataBuilder::new(0_u8)
            .default_for(BUTTON, 1)
            .default_for(LABEL, 2)
            .default_for(BUTTON, 3)
            .build();

        assert_eq!(metadata.default_for(BUTTON), &3);
        assert_eq!(metadata.default_for(LABEL), &2);
        assert_eq!(metadata.default_for(OwnerType::new(9)), &0);
    }

    #[test]
    fn validator_runs() {
        let metadata = PropertyMetadataBuilder::new(1.0_f64)
            .validate(|v| v.is_finite() && *v >= 0.0)
            .build();

        assert!(metadata.has_validator());
        assert!(metadata.is_valid(&0.0));
        assert!(!metadata.is_valid(&-1.0));
        assert!(!metadata.is_valid(&f64::NAN));
    }

    #[test]
    fn debug_lists_configuration() {
        let metadata = PropertyMetadataBuilder::new(7_i32)
            .inherits(true)
            .direct(true)
            .build();
        let debug = format!("{metadata:?}");
        assert!(debug.contains("PropertyMetadata"));
        assert!(debug.contains("inherits: true"));
        assert!(debug.contains("direct: true"));
    }
}
