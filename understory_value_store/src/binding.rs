// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Push-based binding sources.
//!
//! A binding contributes values over time. The engine calls
//! [`BindingSource::subscribe`] the first time the binding could matter, then
//! the producer delivers further [`BindingSignal`]s through
//! [`ObjectTree::push`](crate::ObjectTree::push) using the entry's
//! [`EntryToken`]. Producers on other threads must hop onto the tree's thread
//! before pushing.
//!
//! ```rust
//! use understory_value_store::{
//!     ActivationCx, BindingPriority, BindingSignal, BindingSource, ObjectTree, OwnerType,
//!     PropertyMetadata, PropertyRegistry,
//! };
//!
//! struct Constant(f64);
//!
//! impl BindingSource<f64> for Constant {
//!     fn subscribe(&mut self, _cx: &mut ActivationCx<'_>) -> BindingSignal<f64> {
//!         BindingSignal::Value(self.0)
//!     }
//! }
//!
//! let mut registry = PropertyRegistry::new();
//! let opacity = registry.register("Opacity", PropertyMetadata::new(1.0_f64));
//! let mut tree = ObjectTree::new(registry);
//! let obj = tree.insert(OwnerType::default(), None).unwrap();
//!
//! let token = tree
//!     .add_binding(obj, opacity, Constant(0.5), BindingPriority::Style)
//!     .unwrap();
//! assert_eq!(tree.get_value(obj, opacity), 0.5);
//!
//! tree.push(token, BindingSignal::Value(0.25)).unwrap();
//! assert_eq!(tree.get_value(obj, opacity), 0.25);
//!
//! tree.push(token, BindingSignal::<f64>::Completed).unwrap();
//! assert_eq!(tree.get_value(obj, opacity), 1.0);
//! ```

use alloc::boxed::Box;
use core::fmt;
use core::marker::PhantomData;

use crate::error::PropertyError;
use crate::frame::{EntryToken, FrameId, ValueFrame};
use crate::property::{PropertyId, PropertyValue};
use crate::registry::PropertyRegistry;
use crate::store::ValueStore;
use crate::tree::ObjectId;
use crate::value::ErasedValue;

/// One delivery from a binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindingSignal<T> {
    /// A new value.
    Value(T),
    /// The binding currently has no value. Not an error; lower tiers show through.
    Cleared,
    /// The binding is finished and its entry is removed.
    Completed,
}

impl<T> BindingSignal<T> {
    /// Maps the carried value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> BindingSignal<U> {
        match self {
            Self::Value(value) => BindingSignal::Value(f(value)),
            Self::Cleared => BindingSignal::Cleared,
            Self::Completed => BindingSignal::Completed,
        }
    }
}

/// A producer of values for one property on one object.
pub trait BindingSource<T>: 'static {
    /// Starts the binding and returns its current state.
    ///
    /// Called at most once, and only when resolution first consults the binding.
    /// A binding added below the tier that currently holds the property is not
    /// subscribed until that changes.
    fn subscribe(&mut self, cx: &mut ActivationCx<'_>) -> BindingSignal<T>;

    /// Stops the binding. Called when its entry or frame is removed, or when its
    /// object is removed from the tree.
    fn unsubscribe(&mut self) {}
}

/// Access to the owning store while a binding is being subscribed.
///
/// Subscribing may restructure the store, for example by adding a frame with a
/// more authoritative value. Resolution in progress restarts so the outcome is
/// the same as if the change had happened before it began.
pub struct ActivationCx<'a> {
    pub(crate) store: &'a mut ValueStore,
    pub(crate) registry: &'a PropertyRegistry,
    pub(crate) token: EntryToken,
    pub(crate) property: PropertyId,
}

impl ActivationCx<'_> {
    /// Returns the token to push further signals with.
    #[must_use]
    pub fn token(&self) -> EntryToken {
        self.token
    }

    /// Returns the bound property.
    #[must_use]
    pub fn property(&self) -> PropertyId {
        self.property
    }

    /// Returns the object the binding belongs to.
    #[must_use]
    pub fn object(&self) -> ObjectId {
        self.store.owner()
    }

    /// Adds a frame to the owning store.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectTree::add_frame`](crate::ObjectTree::add_frame).
    pub fn add_frame(&mut self, frame: ValueFrame) -> Result<FrameId, PropertyError> {
        self.store.add_frame(self.registry, frame)
    }

    /// Removes a frame from the owning store. Returns `false` if it was not there.
    pub fn remove_frame(&mut self, frame: FrameId) -> bool {
        self.store.remove_frame(frame)
    }

    /// Activates or deactivates a frame of the owning store.
    /// Returns `false` if it was not there.
    pub fn set_frame_active(&mut self, frame: FrameId, active: bool) -> bool {
        self.store.set_frame_active(frame, active)
    }
}

impl fmt::Debug for ActivationCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationCx")
            .field("object", &self.store.owner())
            .field("property", &self.property)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// A binding source with its value type erased.
pub(crate) trait ErasedBindingSource {
    fn subscribe(&mut self, cx: &mut ActivationCx<'_>) -> BindingSignal<ErasedValue>;
    fn unsubscribe(&mut self);
}

pub(crate) struct TypedSource<T, S> {
    source: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T: PropertyValue, S: BindingSource<T>> TypedSource<T, S> {
    pub(crate) fn boxed(source: S) -> Box<dyn ErasedBindingSource> {
        Box::new(Self {
            source,
            _marker: PhantomData,
        })
    }
}

impl<T: PropertyValue, S: BindingSource<T>> ErasedBindingSource for TypedSource<T, S> {
    fn subscribe(&mut self, cx: &mut ActivationCx<'_>) -> BindingSignal<ErasedValue> {
        self.source.subscribe(cx).map(ErasedValue::new)
    }

    fn unsubscribe(&mut self) {
        self.source.unsubscribe();
    }
}
