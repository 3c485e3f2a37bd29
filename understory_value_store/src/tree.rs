// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The object tree: objects, their value stores, and inheritance.

use alloc::vec::Vec;
use core::any::TypeId;
use core::fmt;
use smallvec::SmallVec;

use crate::binding::{BindingSignal, BindingSource, TypedSource};
use crate::change::{PropertyChange, PropertyDiagnostic};
use crate::error::PropertyError;
use crate::frame::{EntryToken, FrameId, ValueEntry, ValueFrame};
use crate::inheritance::{self, SharedFrame};
use crate::priority::BindingPriority;
use crate::property::{OwnerType, Property, PropertyId, PropertyValue};
use crate::registry::PropertyRegistry;
use crate::store::{
    StoreEvent, ValueStore, check_layered, check_valid, registration, type_mismatch,
};
use crate::value::ErasedValue;

/// Identifier for an object in an [`ObjectTree`].
///
/// A small, copyable handle made of a slot index and a generation counter.
///
/// ## Semantics
///
/// - On insert, a fresh slot is allocated with generation `1`.
/// - On remove, the slot is freed; any existing `ObjectId` for it is now stale.
/// - On reuse of a freed slot, its generation is incremented, producing a new, distinct `ObjectId`.
///
/// Use [`ObjectTree::is_alive`] to check whether an `ObjectId` still refers to a
/// live object. Stale IDs never alias a different live object.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ObjectId(pub(crate) u32, pub(crate) u32);

impl ObjectId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

type Children = SmallVec<[ObjectId; 8]>;

struct ObjectNode {
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    store: ValueStore,
}

struct Slot {
    generation: u32,
    node: Option<ObjectNode>,
}

/// Owns a set of objects arranged in a tree, each with its own [`ValueStore`].
///
/// The tree is the single entry point for reads and writes. It resolves values
/// through each object's store, propagates inheriting properties to
/// descendants, and queues a [`PropertyChange`] for every change in what an
/// object shows.
///
/// ```rust
/// use understory_value_store::{
///     BindingPriority, ObjectTree, OwnerType, PropertyMetadataBuilder, PropertyRegistry,
/// };
///
/// let mut registry = PropertyRegistry::new();
/// let font_size = registry.register(
///     "FontSize",
///     PropertyMetadataBuilder::new(12.0_f64).inherits(true).build(),
/// );
/// let mut tree = ObjectTree::new(registry);
/// let window = tree.insert(OwnerType::default(), None).unwrap();
/// let label = tree.insert(OwnerType::default(), Some(window)).unwrap();
///
/// tree.set_value(window, font_size, 16.0, BindingPriority::LocalValue).unwrap();
/// assert_eq!(tree.get_value(label, font_size), 16.0);
///
/// let changes = tree.drain_changes();
/// assert_eq!(changes.len(), 2);
/// assert_eq!(changes[1].object, label);
/// assert_eq!(changes[1].priority, BindingPriority::Inherited);
/// ```
pub struct ObjectTree {
    registry: PropertyRegistry,
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    changes: Vec<PropertyChange>,
    events: Vec<StoreEvent>,
}

impl ObjectTree {
    /// Creates an empty tree resolving properties from `registry`.
    #[must_use]
    pub fn new(registry: PropertyRegistry) -> Self {
        Self {
            registry,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            changes: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Returns the property registry.
    #[must_use]
    #[inline]
    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    /// Returns the number of live objects.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if the tree holds no objects.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Inserts an object of runtime type `owner_type` under `parent`.
    ///
    /// The new object immediately sees the inheriting values of its ancestors;
    /// a change is queued for each one that differs from its default.
    ///
    /// # Errors
    ///
    /// [`PropertyError::UnknownObject`] if `parent` is not alive.
    pub fn insert(
        &mut self,
        owner_type: OwnerType,
        parent: Option<ObjectId>,
    ) -> Result<ObjectId, PropertyError> {
        if let Some(parent) = parent {
            self.node(parent)?;
        }

        let id = match self.free.pop() {
            Some(idx) => {
                let slot = &mut self.slots[idx as usize];
                slot.generation += 1;
                ObjectId::new(idx, slot.generation)
            }
            None => {
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "object counts never approach u32::MAX"
                )]
                let idx = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 1,
                    node: None,
                });
                ObjectId::new(idx, 1)
            }
        };
        self.slots[id.idx()].node = Some(ObjectNode {
            parent,
            children: Vec::new(),
            store: ValueStore::new(id, owner_type),
        });
        self.live += 1;

        if let Some(parent) = parent {
            node_mut(&mut self.slots, parent)?.children.push(id);
            self.set_inheritance_parent(id, Some(parent));
        }
        Ok(id)
    }

    /// Removes `id` and its whole subtree, unsubscribing every binding they hold.
    ///
    /// No changes are queued for removed objects.
    ///
    /// # Errors
    ///
    /// [`PropertyError::UnknownObject`] if `id` is not alive.
    pub fn remove(&mut self, id: ObjectId) -> Result<(), PropertyError> {
        let parent = self.node(id)?.parent;
        if let Some(parent) = parent
            && let Ok(node) = node_mut(&mut self.slots, parent)
        {
            node.children.retain(|c| *c != id);
        }

        let mut stack: Children = SmallVec::new();
        stack.push(id);
        while let Some(id) = stack.pop() {
            let Some(mut node) = self.slots[id.idx()].node.take() else {
                continue;
            };
            node.store.release();
            stack.extend(node.children.iter().copied());
            self.free.push(id.0);
            self.live -= 1;
        }
        Ok(())
    }

    /// Moves `id` under `parent`, or detaches it with `None`.
    ///
    /// Inheriting values that differ between the old and new ancestry are
    /// re-propagated through the subtree.
    ///
    /// # Errors
    ///
    /// - [`PropertyError::UnknownObject`] if either object is not alive.
    /// - [`PropertyError::UnsupportedOperation`] if `parent` is `id` or one of its descendants.
    pub fn set_parent(
        &mut self,
        id: ObjectId,
        parent: Option<ObjectId>,
    ) -> Result<(), PropertyError> {
        let old_parent = self.node(id)?.parent;
        if let Some(parent) = parent {
            self.node(parent)?;
            let mut ancestor = Some(parent);
            while let Some(a) = ancestor {
                if a == id {
                    return Err(PropertyError::unsupported(
                        "set_parent would create a cycle",
                    ));
                }
                ancestor = self.parent(a);
            }
        }
        if old_parent == parent {
            return Ok(());
        }

        if let Some(old) = old_parent
            && let Ok(node) = node_mut(&mut self.slots, old)
        {
            node.children.retain(|c| *c != id);
        }
        if let Some(parent) = parent {
            node_mut(&mut self.slots, parent)?.children.push(id);
        }
        node_mut(&mut self.slots, id)?.parent = parent;
        self.set_inheritance_parent(id, parent);
        Ok(())
    }

    /// Returns the parent of `id`, or `None` for roots and dead objects.
    #[must_use]
    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.node(id).ok().and_then(|n| n.parent)
    }

    /// Returns the children of `id`; empty for dead objects.
    #[must_use]
    pub fn children(&self, id: ObjectId) -> &[ObjectId] {
        match self.node(id) {
            Ok(node) => &node.children,
            Err(_) => &[],
        }
    }

    /// Returns `true` if `id` refers to a live object.
    #[must_use]
    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.node(id).is_ok()
    }

    /// Returns the runtime type `id` was inserted with.
    #[must_use]
    pub fn owner_type(&self, id: ObjectId) -> Option<OwnerType> {
        self.node(id).ok().map(|n| n.store.owner_type())
    }

    /// Returns the value store of `id`.
    #[must_use]
    pub fn store(&self, id: ObjectId) -> Option<&ValueStore> {
        self.node(id).ok().map(|n| &n.store)
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Sets `property` on `id` at `priority`.
    ///
    /// Local values replace the previous local value and return `None`. Values at
    /// the style tiers are stored in an immediate frame and return a token which
    /// [`dispose`](Self::dispose) retracts them with.
    ///
    /// # Errors
    ///
    /// - [`PropertyError::UnknownObject`] if `id` is not alive.
    /// - [`PropertyError::UnknownProperty`] if `property` is not registered here.
    /// - [`PropertyError::TypeMismatch`] if `property` was registered with another type.
    /// - [`PropertyError::InvalidValue`] if the validator rejects `value`.
    /// - [`PropertyError::UnsupportedOperation`] for direct properties and for the
    ///   `Inherited` and `Unset` tiers.
    pub fn set_value<T: PropertyValue>(
        &mut self,
        id: ObjectId,
        property: Property<T>,
        value: T,
        priority: BindingPriority,
    ) -> Result<Option<EntryToken>, PropertyError> {
        let property = property.id();
        let value = ErasedValue::new(value);
        self.node(id)?;
        let registration = registration(&self.registry, property)?;
        check_layered(registration)?;
        if !priority.is_settable() {
            return Err(PropertyError::unsupported(
                "values cannot be set at the Inherited or Unset tiers",
            ));
        }
        check_valid(registration, &value)?;

        self.apply(id, |store, registry, events| {
            store.set_value(registry, property, value, priority, events)
        })
    }

    /// Drops the local value of `property`, letting lower tiers show through.
    ///
    /// # Errors
    ///
    /// [`PropertyError::UnknownObject`] or [`PropertyError::UnknownProperty`].
    pub fn clear_local_value<T>(
        &mut self,
        id: ObjectId,
        property: Property<T>,
    ) -> Result<(), PropertyError> {
        let property = property.id();
        self.node(id)?;
        registration(&self.registry, property)?;
        self.apply(id, |store, registry, events| {
            store.clear_local_value(registry, property, events);
        })
    }

    /// Returns what `id` shows for `property`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not alive or `property` is not registered with type `T`.
    #[must_use]
    pub fn get_value<T: PropertyValue>(&self, id: ObjectId, property: Property<T>) -> T {
        let value = self.get_value_erased(id, property.id());
        match value.downcast_ref::<T>() {
            Some(value) => value.clone(),
            None => panic!(
                "property {} holds {}, not {}",
                property.id(),
                value.type_name(),
                core::any::type_name::<T>()
            ),
        }
    }

    /// Returns what `id` shows for `property`, type erased.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not alive or `property` is not registered.
    #[must_use]
    pub fn get_value_erased(&self, id: ObjectId, property: PropertyId) -> ErasedValue {
        assert!(
            self.registry.get(property).is_some(),
            "property {property} is not registered"
        );
        self.live_node(id).store.visible_value(&self.registry, property).0
    }

    /// Returns the value of `property` on `id` ignoring animations.
    ///
    /// Returns `None` when `id` has no value of its own for `property` (it shows
    /// an inherited or default value) or when only an animation contributes.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not alive or `property` is not registered with type `T`.
    #[must_use]
    pub fn get_base_value<T: PropertyValue>(
        &self,
        id: ObjectId,
        property: Property<T>,
    ) -> Option<T> {
        let store = &self.live_node(id).store;
        store
            .effective_value(property.id())?
            .base_value()?
            .downcast_ref::<T>()
            .cloned()
    }

    /// Returns `true` if `property` has a value on `id` itself rather than an
    /// inherited or default one.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not alive.
    #[must_use]
    pub fn is_set<T>(&self, id: ObjectId, property: Property<T>) -> bool {
        self.live_node(id)
            .store
            .effective_value(property.id())
            .is_some_and(|e| e.priority() < BindingPriority::Inherited)
    }

    /// Returns `true` if an animation currently supplies `property` on `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not alive.
    #[must_use]
    pub fn is_animating<T>(&self, id: ObjectId, property: Property<T>) -> bool {
        self.live_node(id)
            .store
            .effective_value(property.id())
            .is_some_and(|e| e.priority() == BindingPriority::Animation)
    }

    /// Returns how `property` currently resolves on `id`.
    #[must_use]
    pub fn diagnostic(&self, id: ObjectId, property: PropertyId) -> Option<PropertyDiagnostic> {
        let store = &self.node(id).ok()?.store;
        let name = self.registry.name(property)?;
        let (value, priority) = store.visible_value(&self.registry, property);
        let effective = store.effective_value(property);
        Some(PropertyDiagnostic {
            property,
            name,
            value,
            priority,
            base_value: effective.and_then(|e| e.base_value().cloned()),
            base_priority: effective.map_or(BindingPriority::Unset, |e| e.base_priority()),
        })
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    /// Binds `property` on `id` to `source` at `priority`.
    ///
    /// A local-value binding replaces any previous one and is subscribed at once.
    /// Other bindings are subscribed only once they could supply the value.
    ///
    /// # Errors
    ///
    /// As for [`set_value`](Self::set_value), except that values are validated
    /// as they arrive.
    pub fn add_binding<T: PropertyValue, S: BindingSource<T>>(
        &mut self,
        id: ObjectId,
        property: Property<T>,
        source: S,
        priority: BindingPriority,
    ) -> Result<EntryToken, PropertyError> {
        let property = property.id();
        self.node(id)?;
        let registration = registration(&self.registry, property)?;
        check_layered(registration)?;
        if registration.type_id() != TypeId::of::<T>() {
            return Err(type_mismatch(registration, core::any::type_name::<T>()));
        }
        if !priority.is_settable() {
            return Err(PropertyError::unsupported(
                "bindings cannot target the Inherited or Unset tiers",
            ));
        }

        let entry = ValueEntry::binding::<T>(property, TypedSource::<T, S>::boxed(source));
        self.apply(id, |store, registry, events| {
            store.add_binding(registry, entry, priority, events)
        })
    }

    /// Delivers a signal from the binding behind `token`.
    ///
    /// Signals for bindings that were already removed from a live object are
    /// ignored. Once the object itself is removed, pushes fail with
    /// [`PropertyError::UnknownObject`].
    ///
    /// # Errors
    ///
    /// - [`PropertyError::UnknownObject`] if the token's object is gone.
    /// - [`PropertyError::TypeMismatch`] or [`PropertyError::InvalidValue`] for bad values.
    /// - [`PropertyError::UnsupportedOperation`] if the token refers to a constant
    ///   or to a binding that has not been subscribed.
    pub fn push<T: PropertyValue>(
        &mut self,
        token: EntryToken,
        signal: BindingSignal<T>,
    ) -> Result<(), PropertyError> {
        self.apply(token.object(), |store, registry, events| {
            store.push(registry, token.entry(), signal.map(ErasedValue::new), events)
        })?
    }

    /// Retracts the value or binding behind `token`.
    ///
    /// Tokens whose object or entry is already gone are ignored.
    pub fn dispose(&mut self, token: EntryToken) {
        if !self.is_alive(token.object()) {
            return;
        }
        let _ = self.apply(token.object(), |store, registry, events| {
            store.dispose(registry, token.entry(), events);
        });
    }

    // =========================================================================
    // Frames
    // =========================================================================

    /// Re-resolves every property of `id` from its frames and local values.
    ///
    /// Frame changes already trigger this; without intervening changes it
    /// queues nothing. Deferred while a styling batch is open.
    ///
    /// # Errors
    ///
    /// [`PropertyError::UnknownObject`] if `id` is not alive.
    pub fn reevaluate(&mut self, id: ObjectId) -> Result<(), PropertyError> {
        self.apply(id, |store, registry, events| {
            store.reevaluate_all(registry, events);
        })
    }

    /// Opens a styling batch on `id`; frame changes are resolved once the
    /// outermost batch ends.
    ///
    /// # Errors
    ///
    /// [`PropertyError::UnknownObject`] if `id` is not alive.
    pub fn begin_styling(&mut self, id: ObjectId) -> Result<(), PropertyError> {
        self.apply(id, |store, _, _| store.begin_styling())
    }

    /// Closes a styling batch on `id`.
    ///
    /// # Errors
    ///
    /// - [`PropertyError::UnknownObject`] if `id` is not alive.
    /// - [`PropertyError::UnsupportedOperation`] if no batch is open.
    pub fn end_styling(&mut self, id: ObjectId) -> Result<(), PropertyError> {
        self.apply(id, |store, _, _| store.end_styling())??;
        tracing::debug!(object = ?id, "styling batch ended");
        Ok(())
    }

    /// Adds a frame of values to `id`.
    ///
    /// # Errors
    ///
    /// - [`PropertyError::UnknownObject`] if `id` is not alive.
    /// - [`PropertyError::UnsupportedOperation`] if the frame's priority is not a
    ///   frame tier or it targets a direct property.
    /// - [`PropertyError::UnknownProperty`], [`PropertyError::TypeMismatch`] or
    ///   [`PropertyError::InvalidValue`] for a bad entry.
    pub fn add_frame(&mut self, id: ObjectId, frame: ValueFrame) -> Result<FrameId, PropertyError> {
        self.apply(id, |store, registry, _| store.add_frame(registry, frame))?
    }

    /// Removes a frame from `id`. Returns `false` if the frame was not there.
    ///
    /// # Errors
    ///
    /// [`PropertyError::UnknownObject`] if `id` is not alive.
    pub fn remove_frame(&mut self, id: ObjectId, frame: FrameId) -> Result<bool, PropertyError> {
        self.apply(id, |store, _, _| store.remove_frame(frame))
    }

    /// Activates or deactivates a frame on `id`, for example when a style
    /// trigger starts or stops matching. Returns `false` if the frame was not there.
    ///
    /// # Errors
    ///
    /// [`PropertyError::UnknownObject`] if `id` is not alive.
    pub fn set_frame_active(
        &mut self,
        id: ObjectId,
        frame: FrameId,
        active: bool,
    ) -> Result<bool, PropertyError> {
        self.apply(id, |store, _, _| store.set_frame_active(frame, active))
    }

    /// Returns the token for the entry of `property` in `frame`, for pushing to
    /// a binding set up through [`ValueFrameBuilder::bind`](crate::ValueFrameBuilder::bind).
    #[must_use]
    pub fn entry_token(
        &self,
        id: ObjectId,
        frame: FrameId,
        property: PropertyId,
    ) -> Option<EntryToken> {
        self.node(id).ok()?.store.entry_token(frame, property)
    }

    // =========================================================================
    // Changes
    // =========================================================================

    /// Takes the queued changes, oldest first.
    pub fn drain_changes(&mut self) -> Vec<PropertyChange> {
        core::mem::take(&mut self.changes)
    }

    /// Returns the queued changes without taking them.
    #[must_use]
    pub fn pending_changes(&self) -> &[PropertyChange] {
        &self.changes
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn node(&self, id: ObjectId) -> Result<&ObjectNode, PropertyError> {
        self.slots
            .get(id.idx())
            .filter(|slot| slot.generation == id.1)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(PropertyError::UnknownObject(id))
    }

    fn live_node(&self, id: ObjectId) -> &ObjectNode {
        match self.node(id) {
            Ok(node) => node,
            Err(_) => panic!("object {id:?} is not alive"),
        }
    }

    fn children_of(&self, id: ObjectId) -> Children {
        self.children(id).iter().copied().collect()
    }

    /// Runs `op` on the store of `id`, settles it, and dispatches what happened.
    fn apply<R>(
        &mut self,
        id: ObjectId,
        op: impl FnOnce(&mut ValueStore, &PropertyRegistry, &mut Vec<StoreEvent>) -> R,
    ) -> Result<R, PropertyError> {
        let mut events = core::mem::take(&mut self.events);
        let result = match node_mut(&mut self.slots, id) {
            Ok(node) => {
                let result = op(&mut node.store, &self.registry, &mut events);
                node.store.settle(&self.registry, &mut events);
                result
            }
            Err(err) => {
                self.events = events;
                return Err(err);
            }
        };
        for event in events.drain(..) {
            self.dispatch(id, event);
        }
        self.events = events;
        Ok(result)
    }

    fn dispatch(&mut self, id: ObjectId, event: StoreEvent) {
        match event {
            StoreEvent::Changed {
                property,
                old,
                new,
                priority,
                old_priority,
            } => {
                self.raise(id, property, old.clone(), new.clone(), priority, true);
                if self.registry.inherits(property) {
                    let children = self.children_of(id);
                    if !children.is_empty() {
                        self.own_inheritance_frame(id);
                        let old = (old_priority != BindingPriority::Unset).then_some(&old);
                        for child in children {
                            self.inherited_value_changed(child, property, old, Some(&new));
                        }
                    }
                }
            }
            StoreEvent::BaseChanged {
                property,
                old,
                new,
                priority,
            } => self.raise(id, property, old, new, priority, false),
            StoreEvent::Removed {
                property,
                old,
                new,
                priority,
            } => {
                if old != new {
                    self.raise(id, property, old.clone(), new, priority, true);
                }
                if self.registry.inherits(property) {
                    let children = self.children_of(id);
                    let inherited = self
                        .node(id)
                        .ok()
                        .and_then(|n| n.store.inherited_value(property));
                    for child in children {
                        self.inherited_value_changed(
                            child,
                            property,
                            Some(&old),
                            inherited.as_ref(),
                        );
                    }
                }
            }
            StoreEvent::Pinned { .. } => {
                if !self.children(id).is_empty() {
                    self.own_inheritance_frame(id);
                }
            }
        }
    }

    fn raise(
        &mut self,
        object: ObjectId,
        property: PropertyId,
        old_value: ErasedValue,
        new_value: ErasedValue,
        priority: BindingPriority,
        is_effective_value_change: bool,
    ) {
        tracing::trace!(
            ?object,
            %property,
            ?old_value,
            ?new_value,
            %priority,
            is_effective_value_change,
            "property changed"
        );
        self.changes.push(PropertyChange {
            object,
            property,
            old_value,
            new_value,
            priority,
            is_effective_value_change,
        });
    }

    // =========================================================================
    // Inheritance
    // =========================================================================

    /// Returns the frame descendants of `id` should read through, creating an
    /// owned frame first if `id` has inheriting values of its own.
    fn frame_for_children(&mut self, id: ObjectId) -> Option<SharedFrame> {
        let store = &self.node(id).ok()?.store;
        if !store.owns_inheritance_frame() && store.has_inheriting_values(&self.registry) {
            return self.own_inheritance_frame(id);
        }
        store.inheritance_frame().cloned()
    }

    /// Makes sure `id` owns an inheritance frame and points its descendants at it.
    fn own_inheritance_frame(&mut self, id: ObjectId) -> Option<SharedFrame> {
        let (frame, children) = {
            let node = node_mut(&mut self.slots, id).ok()?;
            if node.store.owns_inheritance_frame() {
                return node.store.inheritance_frame().cloned();
            }
            let parent = node.store.inheritance_frame().cloned();
            let frame = node
                .store
                .own_inheritance_frame(&self.registry, parent.as_ref());
            (frame, node.children.clone())
        };
        for child in children {
            self.parent_inheritance_frame_changed(child, Some(&frame));
        }
        Some(frame)
    }

    /// Re-points `id` and the descendants sharing its frame at `frame`.
    fn parent_inheritance_frame_changed(&mut self, id: ObjectId, frame: Option<&SharedFrame>) {
        let mut stack: Children = SmallVec::new();
        stack.push(id);
        while let Some(id) = stack.pop() {
            let Ok(node) = node_mut(&mut self.slots, id) else {
                continue;
            };
            if node.store.owns_inheritance_frame() {
                if let Some(own) = node.store.inheritance_frame() {
                    own.borrow_mut().set_parent(frame);
                }
                continue;
            }
            if inheritance::same_frame(node.store.inheritance_frame(), frame) {
                continue;
            }
            node.store.share_inheritance_frame(frame.cloned());
            stack.extend(node.children.iter().copied());
        }
    }

    /// Attaches `id` to the inheritance chain of `parent` and raises a change
    /// for every inherited value that differs from before.
    fn set_inheritance_parent(&mut self, id: ObjectId, parent: Option<ObjectId>) {
        let old_frame = match self.node(id) {
            Ok(node) if node.store.owns_inheritance_frame() => node
                .store
                .inheritance_frame()
                .and_then(|f| f.borrow().parent()),
            Ok(node) => node.store.inheritance_frame().cloned(),
            Err(_) => return,
        };
        let new_frame = parent.and_then(|p| self.frame_for_children(p));
        if inheritance::same_frame(old_frame.as_ref(), new_frame.as_ref()) {
            return;
        }

        let old_values = inheritance::collect_visible(old_frame.as_ref());
        let new_values = inheritance::collect_visible(new_frame.as_ref());
        self.parent_inheritance_frame_changed(id, new_frame.as_ref());

        let lookup = |values: &inheritance::InheritedValues, property: PropertyId| {
            values
                .binary_search_by_key(&property, |(p, _)| *p)
                .ok()
                .map(|idx| values[idx].1.clone())
        };
        let mut properties: SmallVec<[PropertyId; 8]> = old_values
            .iter()
            .chain(new_values.iter())
            .map(|(p, _)| *p)
            .collect();
        properties.sort_unstable();
        properties.dedup();

        for property in properties {
            let old = lookup(&old_values, property);
            let new = lookup(&new_values, property);
            if old != new {
                self.inherited_value_changed(id, property, old.as_ref(), new.as_ref());
            }
        }
    }

    /// Propagates a change in the inherited value of `property` from `id` down.
    ///
    /// `old` and `new` are what the inheritance chain supplied; `None` means the
    /// object's own default. Propagation stops at objects with a value of their own.
    fn inherited_value_changed(
        &mut self,
        id: ObjectId,
        property: PropertyId,
        old: Option<&ErasedValue>,
        new: Option<&ErasedValue>,
    ) {
        let priority = if new.is_some() {
            BindingPriority::Inherited
        } else {
            BindingPriority::Unset
        };
        let mut stack: Children = SmallVec::new();
        stack.push(id);
        while let Some(id) = stack.pop() {
            let Ok(node) = self.node(id) else {
                continue;
            };
            if node.store.effective_value(property).is_some() {
                continue;
            }
            let (old, new) = match (old, new) {
                (Some(old), Some(new)) => (old.clone(), new.clone()),
                _ => {
                    let default = node.store.default_value(&self.registry, property);
                    (
                        old.cloned().unwrap_or_else(|| default.clone()),
                        new.cloned().unwrap_or(default),
                    )
                }
            };
            stack.extend(node.children.iter().rev().copied());
            if old != new {
                self.raise(id, property, old, new, priority, true);
            }
        }
    }
}

impl Default for ObjectTree {
    fn default() -> Self {
        Self::new(PropertyRegistry::new())
    }
}

impl fmt::Debug for ObjectTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectTree")
            .field("registry", &self.registry)
            .field("live", &self.live)
            .field("free_slots", &self.free.len())
            .field("pending_changes", &self.changes.len())
            .finish_non_exhaustive()
    }
}

fn node_mut(slots: &mut [Slot], id: ObjectId) -> Result<&mut ObjectNode, PropertyError> {
    slots
        .get_mut(id.idx())
        .filter(|slot| slot.generation == id.1)
        .and_then(|slot| slot.node.as_mut())
        .ok_or(PropertyError::UnknownObject(id))
}
