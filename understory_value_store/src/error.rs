// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors reported by value store operations.

use alloc::string::String;

use crate::property::PropertyId;
use crate::tree::ObjectId;

/// An error returned by a fallible [`ObjectTree`](crate::ObjectTree) operation.
///
/// Every failing operation leaves the tree unchanged.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    /// The property's validator rejected the value.
    #[error("{value} is not a valid value for '{property}'")]
    InvalidValue {
        /// Name of the property.
        property: &'static str,
        /// Debug rendering of the rejected value.
        value: String,
    },
    /// The operation is not supported for this property or in this state.
    #[error("unsupported operation: {operation}")]
    UnsupportedOperation {
        /// What was attempted.
        operation: &'static str,
    },
    /// The property is not registered.
    #[error("unknown property {0}")]
    UnknownProperty(PropertyId),
    /// The object does not exist (never inserted, or removed).
    #[error("unknown object {0:?}")]
    UnknownObject(ObjectId),
    /// A value's type does not match the property's registered type.
    #[error("'{property}' holds {expected}, got {actual}")]
    TypeMismatch {
        /// Name of the property.
        property: &'static str,
        /// Registered value type.
        expected: &'static str,
        /// Supplied value type.
        actual: &'static str,
    },
}

impl PropertyError {
    pub(crate) const fn unsupported(operation: &'static str) -> Self {
        Self::UnsupportedOperation { operation }
    }
}

/// Reports an engine bug on the diagnostic channel.
///
/// Asserts in debug builds; release builds log and carry on.
pub(crate) fn report_inconsistency(owner: ObjectId, property: PropertyId, detail: &'static str) {
    tracing::error!(?owner, %property, detail, "internal value store inconsistency");
    if cfg!(debug_assertions) {
        panic!("internal value store inconsistency: {detail}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn messages_name_the_property() {
        let err = PropertyError::InvalidValue {
            property: "Opacity",
            value: format!("{:?}", 2.5_f64),
        };
        assert_eq!(format!("{err}"), "2.5 is not a valid value for 'Opacity'");

        let err = PropertyError::TypeMismatch {
            property: "Width",
            expected: "f64",
            actual: "i32",
        };
        assert_eq!(format!("{err}"), "'Width' holds f64, got i32");
        assert_eq!(
            format!("{}", PropertyError::UnknownProperty(PropertyId::new(3))),
            "unknown property PropertyId(3)"
        );
        assert_eq!(
            format!("{}", PropertyError::unsupported("end_styling without begin_styling")),
            "unsupported operation: end_styling without begin_styling"
        );
    }
}
