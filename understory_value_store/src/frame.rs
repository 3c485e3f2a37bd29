// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Value frames and their entries.
//!
//! A [`ValueFrame`] is a batch of contributions at one [`BindingPriority`]: the
//! setters of a style, or the imperative values written at a tier. Frames are
//! the unit of layering; a store keeps them ordered from most to least
//! authoritative, newest first within a tier.

use alloc::boxed::Box;
use core::any::TypeId;
use core::fmt;
use smallvec::SmallVec;

use crate::binding::{BindingSource, ErasedBindingSource, TypedSource};
use crate::priority::BindingPriority;
use crate::property::{Property, PropertyId, PropertyValue};
use crate::tree::ObjectId;
use crate::value::ErasedValue;

/// Identifies a frame within one object's store.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(u32);

impl FrameId {
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct EntryId(u32);

impl EntryId {
    pub(crate) const PENDING: Self = Self(0);

    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }
}

/// Handle to one contribution: a value set at a frame tier, a binding, or a
/// local-value binding.
///
/// Pass it to [`ObjectTree::dispose`](crate::ObjectTree::dispose) to retract
/// the contribution, or to [`ObjectTree::push`](crate::ObjectTree::push) to
/// deliver binding signals. Tokens of retracted contributions are inert.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntryToken {
    object: ObjectId,
    entry: EntryId,
}

impl EntryToken {
    pub(crate) const fn new(object: ObjectId, entry: EntryId) -> Self {
        Self { object, entry }
    }

    /// Returns the object the contribution belongs to.
    #[must_use]
    #[inline]
    pub fn object(self) -> ObjectId {
        self.object
    }

    pub(crate) fn entry(self) -> EntryId {
        self.entry
    }
}

/// How a frame came to exist.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Created by the store to hold imperative writes and bindings at a tier.
    /// Removed automatically once empty.
    Immediate,
    /// Supplied by a style or template pass through
    /// [`ObjectTree::add_frame`](crate::ObjectTree::add_frame).
    Style,
}

/// A batch of contributions sharing one priority.
///
/// # Example
///
/// ```rust
/// use understory_value_store::{
///     BindingPriority, ObjectTree, OwnerType, PropertyMetadata, PropertyRegistry,
///     ValueFrameBuilder,
/// };
///
/// let mut registry = PropertyRegistry::new();
/// let width = registry.register("Width", PropertyMetadata::new(0.0_f64));
/// let mut tree = ObjectTree::new(registry);
/// let obj = tree.insert(OwnerType::default(), None).unwrap();
///
/// let frame = ValueFrameBuilder::new(BindingPriority::Style)
///     .set(width, 120.0)
///     .build();
/// let id = tree.add_frame(obj, frame).unwrap();
/// assert_eq!(tree.get_value(obj, width), 120.0);
///
/// tree.set_frame_active(obj, id, false).unwrap();
/// assert_eq!(tree.get_value(obj, width), 0.0);
/// ```
pub struct ValueFrame {
    id: Option<FrameId>,
    priority: BindingPriority,
    kind: FrameKind,
    active: bool,
    entries: SmallVec<[ValueEntry; 4]>,
}

impl ValueFrame {
    pub(crate) fn immediate(id: FrameId, priority: BindingPriority) -> Self {
        Self {
            id: Some(id),
            priority,
            kind: FrameKind::Immediate,
            active: true,
            entries: SmallVec::new(),
        }
    }

    /// Returns the ID assigned when the frame was added to a store.
    #[must_use]
    #[inline]
    pub fn id(&self) -> Option<FrameId> {
        self.id
    }

    /// Returns the frame's priority.
    #[must_use]
    #[inline]
    pub fn priority(&self) -> BindingPriority {
        self.priority
    }

    /// Returns how the frame was created.
    #[must_use]
    #[inline]
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Returns whether the frame participates in resolution.
    #[must_use]
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the number of entries.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the frame has no entries.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if the frame has an entry for `property`.
    #[must_use]
    pub fn contains(&self, property: PropertyId) -> bool {
        self.find(property).is_some()
    }

    /// Returns the properties with entries, in ID order.
    pub fn properties(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.entries.iter().map(|e| e.property)
    }

    /// Returns the current value of the entry for `property`.
    ///
    /// `None` if there is no entry, or it is a binding without a value.
    #[must_use]
    pub fn value(&self, property: PropertyId) -> Option<&ErasedValue> {
        self.find(property)
            .and_then(|idx| self.entries[idx].value.as_ref())
    }

    pub(crate) fn find(&self, property: PropertyId) -> Option<usize> {
        self.entries
            .binary_search_by_key(&property, |e| e.property)
            .ok()
    }

    pub(crate) fn set_id(&mut self, id: FrameId) {
        self.id = Some(id);
    }

    pub(crate) fn set_active(&mut self, active: bool) -> bool {
        core::mem::replace(&mut self.active, active) != active
    }

    pub(crate) fn entries(&self) -> &[ValueEntry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [ValueEntry] {
        &mut self.entries
    }

    /// Inserts or replaces the entry for its property. Returns the replaced one.
    pub(crate) fn insert(&mut self, entry: ValueEntry) -> Option<ValueEntry> {
        match self
            .entries
            .binary_search_by_key(&entry.property, |e| e.property)
        {
            Ok(idx) => Some(core::mem::replace(&mut self.entries[idx], entry)),
            Err(idx) => {
                self.entries.insert(idx, entry);
                None
            }
        }
    }

    pub(crate) fn remove(&mut self, idx: usize) -> ValueEntry {
        self.entries.remove(idx)
    }

    /// Stops every subscribed binding in the frame.
    pub(crate) fn release(self) {
        for entry in self.entries {
            entry.release();
        }
    }
}

impl fmt::Debug for ValueFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueFrame")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("kind", &self.kind)
            .field("active", &self.active)
            .field("entries", &self.entries)
            .finish()
    }
}

/// Builds a [`ValueFrame`] for a style or template pass.
///
/// Setting the same property twice keeps the last contribution.
#[derive(Debug)]
pub struct ValueFrameBuilder {
    frame: ValueFrame,
}

impl ValueFrameBuilder {
    /// Starts an active frame at `priority`.
    #[must_use]
    pub fn new(priority: BindingPriority) -> Self {
        Self {
            frame: ValueFrame {
                id: None,
                priority,
                kind: FrameKind::Style,
                active: true,
                entries: SmallVec::new(),
            },
        }
    }

    /// Adds a constant value.
    #[must_use]
    pub fn set<T: PropertyValue>(mut self, property: Property<T>, value: T) -> Self {
        self.frame
            .insert(ValueEntry::constant(property.id(), ErasedValue::new(value)));
        self
    }

    /// Adds a binding.
    #[must_use]
    pub fn bind<T: PropertyValue, S: BindingSource<T>>(
        mut self,
        property: Property<T>,
        source: S,
    ) -> Self {
        self.frame.insert(ValueEntry::binding::<T>(
            property.id(),
            TypedSource::<T, S>::boxed(source),
        ));
        self
    }

    /// Starts the frame inactive, e.g. for a style whose selector does not match yet.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.frame.active = false;
        self
    }

    /// Finishes the frame.
    #[must_use]
    pub fn build(self) -> ValueFrame {
        self.frame
    }
}

/// Where an entry's value comes from.
pub(crate) enum EntrySource {
    Constant,
    Binding {
        subscribed: bool,
        /// `None` while the source's `subscribe` is running.
        source: Option<Box<dyn ErasedBindingSource>>,
    },
}

/// One property's contribution within a frame.
pub(crate) struct ValueEntry {
    pub(crate) property: PropertyId,
    pub(crate) id: EntryId,
    pub(crate) value_type: (TypeId, &'static str),
    pub(crate) value: Option<ErasedValue>,
    pub(crate) source: EntrySource,
}

impl ValueEntry {
    pub(crate) fn constant(property: PropertyId, value: ErasedValue) -> Self {
        Self {
            property,
            id: EntryId::PENDING,
            value_type: (value.type_id(), value.type_name()),
            value: Some(value),
            source: EntrySource::Constant,
        }
    }

    pub(crate) fn binding<T: PropertyValue>(
        property: PropertyId,
        source: Box<dyn ErasedBindingSource>,
    ) -> Self {
        Self {
            property,
            id: EntryId::PENDING,
            value_type: (TypeId::of::<T>(), core::any::type_name::<T>()),
            value: None,
            source: EntrySource::Binding {
                subscribed: false,
                source: Some(source),
            },
        }
    }

    pub(crate) fn with_id(mut self, id: EntryId) -> Self {
        self.id = id;
        self
    }

    pub(crate) fn is_constant(&self) -> bool {
        matches!(self.source, EntrySource::Constant)
    }

    /// A binding that has not been subscribed yet.
    pub(crate) fn is_dormant(&self) -> bool {
        matches!(
            self.source,
            EntrySource::Binding {
                subscribed: false,
                ..
            }
        )
    }

    /// Marks the binding subscribed and lends out its source.
    pub(crate) fn take_source(&mut self) -> Option<Box<dyn ErasedBindingSource>> {
        match &mut self.source {
            EntrySource::Binding { subscribed, source } => {
                *subscribed = true;
                source.take()
            }
            EntrySource::Constant => None,
        }
    }

    pub(crate) fn restore_source(&mut self, restored: Box<dyn ErasedBindingSource>) {
        if let EntrySource::Binding { source, .. } = &mut self.source {
            *source = Some(restored);
        }
    }

    /// Stops the binding if it was subscribed.
    pub(crate) fn release(self) {
        if let EntrySource::Binding {
            subscribed: true,
            source: Some(mut source),
        } = self.source
        {
            source.unsubscribe();
        }
    }
}

impl fmt::Debug for ValueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            EntrySource::Constant => "constant",
            EntrySource::Binding {
                subscribed: false, ..
            } => "dormant binding",
            EntrySource::Binding { .. } => "binding",
        };
        f.debug_struct("ValueEntry")
            .field("property", &self.property)
            .field("kind", &kind)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{ActivationCx, BindingSignal};

    struct Never;

    impl BindingSource<i32> for Never {
        fn subscribe(&mut self, _cx: &mut ActivationCx<'_>) -> BindingSignal<i32> {
            BindingSignal::Cleared
        }
    }

    fn prop(i: u16) -> Property<i32> {
        Property::from_id(PropertyId::new(i))
    }

    #[test]
    fn builder_sorts_and_replaces() {
        let frame = ValueFrameBuilder::new(BindingPriority::Style)
            .set(prop(3), 30)
            .set(prop(1), 10)
            .set(prop(3), 31)
            .bind(prop(2), Never)
            .build();

        assert_eq!(frame.kind(), FrameKind::Style);
        assert_eq!(frame.id(), None);
        assert!(frame.is_active());
        assert_eq!(frame.len(), 3);
        let props: alloc::vec::Vec<_> = frame.properties().map(PropertyId::index).collect();
        assert_eq!(props, [1, 2, 3]);
        assert_eq!(frame.value(PropertyId::new(3)), Some(&ErasedValue::new(31)));
        assert_eq!(frame.value(PropertyId::new(2)), None);
        assert!(frame.entries()[1].is_dormant());
        assert!(frame.entries()[0].is_constant());
    }

    #[test]
    fn inactive_builder_and_toggle() {
        let mut frame = ValueFrameBuilder::new(BindingPriority::Template)
            .inactive()
            .build();
        assert!(!frame.is_active());
        assert!(frame.set_active(true));
        assert!(!frame.set_active(true));
        assert!(frame.is_empty());
    }

    #[test]
    fn take_source_marks_subscribed() {
        let mut entry = ValueEntry::binding::<i32>(
            PropertyId::new(0),
            TypedSource::<i32, Never>::boxed(Never),
        );
        assert!(entry.is_dormant());
        let source = entry.take_source().unwrap();
        assert!(!entry.is_dormant());
        entry.restore_source(source);
        assert!(matches!(
            entry.source,
            EntrySource::Binding {
                subscribed: true,
                source: Some(_)
            }
        ));
    }
}
