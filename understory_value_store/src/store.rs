// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-object value storage and resolution.
//!
//! A [`ValueStore`] holds everything that contributes to one object's
//! properties: the frame list, the local values and local-value bindings, and a
//! cache of [`EffectiveValue`]s. Writes update the cache directly where they
//! can; structural changes to the frame list mark the store for a full
//! re-evaluation which the owning [`ObjectTree`](crate::ObjectTree) runs once
//! the operation (or styling batch) completes.
//!
//! The store does not notify anyone itself. Operations append [`StoreEvent`]s
//! which the tree turns into change notifications and inheritance propagation.
//!
//! # Storage
//!
//! Effective values live in a `SmallVec` sorted by [`PropertyId`] and are found
//! by binary search, like the other per-object maps in this workspace; objects
//! typically have only a handful of set properties.

use alloc::format;
use alloc::vec::Vec;
use core::fmt;
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::binding::{ActivationCx, BindingSignal, ErasedBindingSource};
use crate::effective::{EffectiveValue, Resolution, ValueChange};
use crate::error::{PropertyError, report_inconsistency};
use crate::frame::{EntryId, EntryToken, FrameId, FrameKind, ValueEntry, ValueFrame};
use crate::inheritance::{self, InheritanceFrame, SharedFrame};
use crate::priority::BindingPriority;
use crate::property::{OwnerType, PropertyId};
use crate::registry::{PropertyRegistration, PropertyRegistry};
use crate::tree::ObjectId;
use crate::value::ErasedValue;

/// Most objects set fewer than 8 properties.
const INLINE_CAPACITY: usize = 8;

/// Something observable that happened inside a store.
#[derive(Debug)]
pub(crate) enum StoreEvent {
    /// The effective value changed.
    Changed {
        property: PropertyId,
        old: ErasedValue,
        new: ErasedValue,
        priority: BindingPriority,
        /// `Inherited` or `Unset` when no effective value existed before.
        old_priority: BindingPriority,
    },
    /// Only the base value changed.
    BaseChanged {
        property: PropertyId,
        old: ErasedValue,
        new: ErasedValue,
        priority: BindingPriority,
    },
    /// The effective value was dropped; `new` is what the object shows now.
    Removed {
        property: PropertyId,
        old: ErasedValue,
        new: ErasedValue,
        priority: BindingPriority,
    },
    /// An inheriting property gained an effective value equal to the one it
    /// already showed. Nothing changed, but descendants now inherit from here.
    Pinned { property: PropertyId },
}

/// Resolution state for one property during a full re-evaluation.
#[derive(Debug, Default)]
struct Pending {
    value: Option<(ErasedValue, BindingPriority)>,
    base: Option<(ErasedValue, BindingPriority)>,
}

struct LocalBinding {
    id: EntryId,
    source: alloc::boxed::Box<dyn ErasedBindingSource>,
}

/// The layered values of one object.
pub struct ValueStore {
    owner: ObjectId,
    owner_type: OwnerType,
    /// Most authoritative first; newest first within a priority.
    frames: Vec<ValueFrame>,
    effective: SmallVec<[(PropertyId, EffectiveValue); INLINE_CAPACITY]>,
    local_bindings: HashMap<PropertyId, LocalBinding>,
    inheritance_frame: Option<SharedFrame>,
    generation: u32,
    styling: u32,
    next_frame: u32,
    next_entry: u32,
    needs_reevaluation: bool,
    scratch: Vec<(PropertyId, Pending)>,
}

impl ValueStore {
    pub(crate) fn new(owner: ObjectId, owner_type: OwnerType) -> Self {
        Self {
            owner,
            owner_type,
            frames: Vec::new(),
            effective: SmallVec::new(),
            local_bindings: HashMap::new(),
            inheritance_frame: None,
            generation: 0,
            styling: 0,
            next_frame: 0,
            next_entry: 0,
            needs_reevaluation: false,
            scratch: Vec::new(),
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Returns the object owning this store.
    #[must_use]
    #[inline]
    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    /// Returns the runtime type of the owning object.
    #[must_use]
    #[inline]
    pub fn owner_type(&self) -> OwnerType {
        self.owner_type
    }

    /// Returns the frames, most authoritative first.
    pub fn frames(&self) -> impl Iterator<Item = &ValueFrame> {
        self.frames.iter()
    }

    /// Returns the number of frames.
    #[must_use]
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Returns the frame with `id`.
    #[must_use]
    pub fn frame(&self, id: FrameId) -> Option<&ValueFrame> {
        self.frames.iter().find(|f| f.id() == Some(id))
    }

    /// Returns the frame generation.
    ///
    /// Bumped whenever frames or their entries are added, removed, activated or
    /// deactivated.
    #[must_use]
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Returns the depth of open styling batches.
    #[must_use]
    #[inline]
    pub fn styling_depth(&self) -> u32 {
        self.styling
    }

    /// Returns the cached effective value of `property`.
    #[must_use]
    pub fn effective_value(&self, property: PropertyId) -> Option<&EffectiveValue> {
        self.find_effective(property)
            .ok()
            .map(|idx| &self.effective[idx].1)
    }

    /// Returns all cached effective values in ID order.
    pub fn effective_values(&self) -> impl Iterator<Item = (PropertyId, &EffectiveValue)> {
        self.effective.iter().map(|(id, e)| (*id, e))
    }

    /// Returns `true` if a local-value binding is attached to `property`.
    #[must_use]
    pub fn has_local_binding(&self, property: PropertyId) -> bool {
        self.local_bindings.contains_key(&property)
    }

    /// Returns the object whose inheritance frame this store reads through.
    ///
    /// This is the store's own object once it exposes inheriting values to its
    /// descendants, the nearest such ancestor before that, and `None` when no
    /// ancestor exposes any.
    #[must_use]
    pub fn inheritance_frame_owner(&self) -> Option<ObjectId> {
        self.inheritance_frame.as_ref().map(|f| f.borrow().owner())
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.effective.is_empty() && self.local_bindings.is_empty()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    #[inline]
    fn find_effective(&self, property: PropertyId) -> Result<usize, usize> {
        self.effective.binary_search_by_key(&property, |(id, _)| *id)
    }

    /// Returns what the object shows for `property` and where it came from.
    pub(crate) fn visible_value(
        &self,
        registry: &PropertyRegistry,
        property: PropertyId,
    ) -> (ErasedValue, BindingPriority) {
        if let Some(e) = self.effective_value(property) {
            return (e.value().clone(), e.priority());
        }
        if let Some(value) = self.inherited_value(property) {
            return (value, BindingPriority::Inherited);
        }
        (self.default_value(registry, property), BindingPriority::Unset)
    }

    /// Looks `property` up through the inheritance frame chain.
    pub(crate) fn inherited_value(&self, property: PropertyId) -> Option<ErasedValue> {
        self.inheritance_frame
            .as_ref()
            .and_then(|frame| inheritance::lookup(frame, property))
    }

    pub(crate) fn default_value(
        &self,
        registry: &PropertyRegistry,
        property: PropertyId,
    ) -> ErasedValue {
        match registry.default_value(property, self.owner_type) {
            Some(value) => value,
            None => {
                report_inconsistency(self.owner, property, "store used an unregistered property");
                ErasedValue::new(())
            }
        }
    }

    // =========================================================================
    // Inheritance frame bookkeeping
    // =========================================================================

    pub(crate) fn inheritance_frame(&self) -> Option<&SharedFrame> {
        self.inheritance_frame.as_ref()
    }

    pub(crate) fn owns_inheritance_frame(&self) -> bool {
        self.inheritance_frame
            .as_ref()
            .is_some_and(|f| f.borrow().owner() == self.owner)
    }

    /// Points the store at a frame it reads through but does not own.
    pub(crate) fn share_inheritance_frame(&mut self, frame: Option<SharedFrame>) {
        self.inheritance_frame = frame;
    }

    /// Creates an owned frame chained to `parent` and fills it with this store's
    /// inheriting values.
    pub(crate) fn own_inheritance_frame(
        &mut self,
        registry: &PropertyRegistry,
        parent: Option<&SharedFrame>,
    ) -> SharedFrame {
        let frame = InheritanceFrame::new_shared(self.owner, parent);
        {
            let mut f = frame.borrow_mut();
            for (property, e) in &self.effective {
                if registry.inherits(*property) {
                    f.insert(*property, e.value().clone());
                }
            }
        }
        self.inheritance_frame = Some(frame.clone());
        frame
    }

    pub(crate) fn has_inheriting_values(&self, registry: &PropertyRegistry) -> bool {
        self.effective.iter().any(|(id, _)| registry.inherits(*id))
    }

    fn sync_owned_frame(&self, property: PropertyId, value: Option<ErasedValue>) {
        if !self.owns_inheritance_frame() {
            return;
        }
        if let Some(frame) = &self.inheritance_frame {
            let mut frame = frame.borrow_mut();
            match value {
                Some(value) => frame.insert(property, value),
                None => {
                    frame.remove(property);
                }
            }
        }
    }

    // =========================================================================
    // Frame list
    // =========================================================================

    fn next_frame_id(&mut self) -> FrameId {
        self.next_frame += 1;
        FrameId::new(self.next_frame)
    }

    fn next_entry_id(&mut self) -> EntryId {
        self.next_entry += 1;
        EntryId::new(self.next_entry)
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn locate_frame(&self, id: FrameId) -> Option<usize> {
        self.frames.iter().position(|f| f.id() == Some(id))
    }

    fn locate_entry(&self, id: EntryId) -> Option<(usize, usize)> {
        self.frames.iter().enumerate().find_map(|(fi, frame)| {
            frame
                .entries()
                .iter()
                .position(|e| e.id == id)
                .map(|ei| (fi, ei))
        })
    }

    /// Inserts a frame after the more authoritative ones and before older frames
    /// of the same priority.
    fn insert_frame(&mut self, frame: ValueFrame) -> usize {
        let priority = frame.priority();
        let idx = self.frames.partition_point(|f| f.priority() < priority);
        self.frames.insert(idx, frame);
        self.bump_generation();
        idx
    }

    /// Finds the immediate frame a new write of `property` at `priority` goes to.
    ///
    /// Walks the frames of that priority from newest to oldest and reuses the
    /// first immediate frame, unless a frame already holding `property` comes
    /// first. Otherwise a new frame is created as the newest of its priority.
    fn immediate_frame(&mut self, property: PropertyId, priority: BindingPriority) -> usize {
        let start = self.frames.partition_point(|f| f.priority() < priority);
        for (offset, frame) in self.frames[start..].iter().enumerate() {
            if frame.priority() != priority || frame.contains(property) {
                break;
            }
            if frame.kind() == FrameKind::Immediate && frame.is_active() {
                return start + offset;
            }
        }
        let id = self.next_frame_id();
        self.insert_frame(ValueFrame::immediate(id, priority))
    }

    /// Removes an entry, and its frame if that was an immediate frame left empty.
    fn remove_entry(&mut self, fi: usize, ei: usize) -> ValueEntry {
        let entry = self.frames[fi].remove(ei);
        if self.frames[fi].is_empty() && self.frames[fi].kind() == FrameKind::Immediate {
            self.frames.remove(fi);
        }
        self.bump_generation();
        entry
    }

    pub(crate) fn add_frame(
        &mut self,
        registry: &PropertyRegistry,
        mut frame: ValueFrame,
    ) -> Result<FrameId, PropertyError> {
        if !frame.priority().is_frame_tier() {
            return Err(PropertyError::unsupported(
                "frames cannot hold LocalValue, Inherited or Unset values",
            ));
        }
        for entry in frame.entries() {
            let registration = registry
                .get(entry.property)
                .ok_or(PropertyError::UnknownProperty(entry.property))?;
            check_layered(registration)?;
            if registration.type_id() != entry.value_type.0 {
                return Err(type_mismatch(registration, entry.value_type.1));
            }
            if let Some(value) = &entry.value {
                check_valid(registration, value)?;
            }
        }

        let id = self.next_frame_id();
        frame.set_id(id);
        for entry in frame.entries_mut() {
            self.next_entry += 1;
            entry.id = EntryId::new(self.next_entry);
        }
        self.insert_frame(frame);
        self.needs_reevaluation = true;
        Ok(id)
    }

    pub(crate) fn remove_frame(&mut self, id: FrameId) -> bool {
        let Some(fi) = self.locate_frame(id) else {
            return false;
        };
        let frame = self.frames.remove(fi);
        frame.release();
        self.bump_generation();
        self.needs_reevaluation = true;
        true
    }

    pub(crate) fn set_frame_active(&mut self, id: FrameId, active: bool) -> bool {
        let Some(fi) = self.locate_frame(id) else {
            return false;
        };
        if self.frames[fi].set_active(active) {
            self.bump_generation();
            self.needs_reevaluation = true;
        }
        true
    }

    pub(crate) fn entry_token(&self, frame: FrameId, property: PropertyId) -> Option<EntryToken> {
        let frame = &self.frames[self.locate_frame(frame)?];
        let idx = frame.find(property)?;
        Some(EntryToken::new(self.owner, frame.entries()[idx].id))
    }

    pub(crate) fn begin_styling(&mut self) {
        self.styling += 1;
    }

    pub(crate) fn end_styling(&mut self) -> Result<(), PropertyError> {
        if self.styling == 0 {
            return Err(PropertyError::unsupported(
                "end_styling without a matching begin_styling",
            ));
        }
        self.styling -= 1;
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Writes a validated value at `priority`.
    pub(crate) fn set_value(
        &mut self,
        registry: &PropertyRegistry,
        property: PropertyId,
        value: ErasedValue,
        priority: BindingPriority,
        events: &mut Vec<StoreEvent>,
    ) -> Option<EntryToken> {
        let token = if priority.is_frame_tier() {
            let fi = self.immediate_frame(property, priority);
            let id = self.next_entry_id();
            self.frames[fi].insert(ValueEntry::constant(property, value.clone()).with_id(id));
            Some(EntryToken::new(self.owner, id))
        } else {
            None
        };
        self.update_effective(registry, property, |e| e.set(value, priority), events);
        token
    }

    /// Re-resolves `property` without its local value, if the local value is
    /// what the object shows. While an animation runs the local value is kept
    /// as the base and returns once the animation ends.
    pub(crate) fn clear_local_value(
        &mut self,
        registry: &PropertyRegistry,
        property: PropertyId,
        events: &mut Vec<StoreEvent>,
    ) {
        let shows_local = self
            .effective_value(property)
            .is_some_and(|e| e.priority() == BindingPriority::LocalValue);
        if shows_local {
            self.reevaluate_property(registry, property, false, events);
        }
    }

    /// Attaches a binding, subscribing it right away if it could win now.
    pub(crate) fn add_binding(
        &mut self,
        registry: &PropertyRegistry,
        mut entry: ValueEntry,
        priority: BindingPriority,
        events: &mut Vec<StoreEvent>,
    ) -> EntryToken {
        let property = entry.property;
        let id = self.next_entry_id();
        let token = EntryToken::new(self.owner, id);

        if priority == BindingPriority::LocalValue {
            // The previous binding's value stays until the new one has spoken.
            let replaced = match self.local_bindings.remove(&property) {
                Some(mut previous) => {
                    previous.source.unsubscribe();
                    true
                }
                None => false,
            };
            let Some(mut source) = entry.take_source() else {
                return token;
            };
            let signal = source.subscribe(&mut ActivationCx {
                store: &mut *self,
                registry,
                token,
                property,
            });
            let supplied = match signal {
                BindingSignal::Value(value) => {
                    self.local_bindings
                        .insert(property, LocalBinding { id, source });
                    self.set_local_from_binding(registry, property, value, events)
                }
                BindingSignal::Cleared => {
                    self.local_bindings
                        .insert(property, LocalBinding { id, source });
                    false
                }
                BindingSignal::Completed => {
                    source.unsubscribe();
                    false
                }
            };
            if replaced && !supplied {
                self.clear_local_value(registry, property, events);
            }
            return token;
        }

        // Only a binding that could supply the value itself starts now.
        let start = self
            .effective_value(property)
            .is_none_or(|e| priority <= e.priority());
        let fi = self.immediate_frame(property, priority);
        self.frames[fi].insert(entry.with_id(id));
        if start {
            if let Some((fi, ei)) = self.locate_entry(id) {
                self.activate(registry, fi, ei);
            }
            self.entry_changed(registry, property, priority, events);
        }
        token
    }

    /// Delivers a binding signal.
    pub(crate) fn push(
        &mut self,
        registry: &PropertyRegistry,
        entry: EntryId,
        signal: BindingSignal<ErasedValue>,
        events: &mut Vec<StoreEvent>,
    ) -> Result<(), PropertyError> {
        if let Some(property) = self.local_binding_property(entry) {
            match signal {
                BindingSignal::Value(value) => {
                    check_valid(registration(registry, property)?, &value)?;
                    self.update_effective(
                        registry,
                        property,
                        |e| e.set(value, BindingPriority::LocalValue),
                        events,
                    );
                }
                BindingSignal::Cleared => self.clear_local_value(registry, property, events),
                BindingSignal::Completed => {
                    self.dispose_local_binding(registry, property, events);
                }
            }
            return Ok(());
        }

        let Some((fi, ei)) = self.locate_entry(entry) else {
            return Ok(());
        };
        let (property, priority, active) = {
            let frame = &self.frames[fi];
            let entry = &frame.entries()[ei];
            if entry.is_constant() {
                return Err(PropertyError::unsupported("push to a constant value"));
            }
            if entry.is_dormant() {
                return Err(PropertyError::unsupported(
                    "push to a binding that has not been subscribed",
                ));
            }
            (entry.property, frame.priority(), frame.is_active())
        };

        match signal {
            BindingSignal::Value(value) => {
                check_valid(registration(registry, property)?, &value)?;
                self.frames[fi].entries_mut()[ei].value = Some(value);
            }
            BindingSignal::Cleared => self.frames[fi].entries_mut()[ei].value = None,
            BindingSignal::Completed => self.remove_entry(fi, ei).release(),
        }
        if active {
            self.entry_changed(registry, property, priority, events);
        }
        Ok(())
    }

    /// Retracts the contribution behind `entry`. Unknown entries are ignored.
    pub(crate) fn dispose(
        &mut self,
        registry: &PropertyRegistry,
        entry: EntryId,
        events: &mut Vec<StoreEvent>,
    ) {
        if let Some(property) = self.local_binding_property(entry) {
            self.dispose_local_binding(registry, property, events);
            return;
        }

        let Some((fi, ei)) = self.locate_entry(entry) else {
            return;
        };
        let (property, priority, active, had_value) = {
            let frame = &self.frames[fi];
            let entry = &frame.entries()[ei];
            (
                entry.property,
                frame.priority(),
                frame.is_active(),
                entry.value.is_some(),
            )
        };
        self.remove_entry(fi, ei).release();

        if !(active && had_value) {
            return;
        }
        if self.effective_value(property).is_some() {
            self.entry_changed(registry, property, priority, events);
        } else if self.styling == 0 && !self.needs_reevaluation {
            report_inconsistency(
                self.owner,
                property,
                "removed a contributing entry but no effective value existed",
            );
        }
    }

    /// Stops every subscribed binding. Used when the owning object goes away.
    pub(crate) fn release(&mut self) {
        for frame in self.frames.drain(..) {
            frame.release();
        }
        for (_, mut binding) in self.local_bindings.drain() {
            binding.source.unsubscribe();
        }
    }

    fn local_binding_property(&self, entry: EntryId) -> Option<PropertyId> {
        self.local_bindings
            .iter()
            .find(|(_, binding)| binding.id == entry)
            .map(|(property, _)| *property)
    }

    fn dispose_local_binding(
        &mut self,
        registry: &PropertyRegistry,
        property: PropertyId,
        events: &mut Vec<StoreEvent>,
    ) {
        if let Some(mut binding) = self.local_bindings.remove(&property) {
            binding.source.unsubscribe();
            self.clear_local_value(registry, property, events);
        }
    }

    /// Applies a local value produced by a binding. Returns `false` if it was
    /// rejected.
    fn set_local_from_binding(
        &mut self,
        registry: &PropertyRegistry,
        property: PropertyId,
        value: ErasedValue,
        events: &mut Vec<StoreEvent>,
    ) -> bool {
        let valid = registry.get(property).is_some_and(|r| r.is_valid(&value));
        if valid {
            self.update_effective(
                registry,
                property,
                |e| e.set(value, BindingPriority::LocalValue),
                events,
            );
        } else {
            tracing::warn!(owner = ?self.owner, %property, ?value, "binding produced an invalid value");
        }
        valid
    }

    /// Re-resolves `property` if a change at `priority` could affect it.
    fn entry_changed(
        &mut self,
        registry: &PropertyRegistry,
        property: PropertyId,
        priority: BindingPriority,
        events: &mut Vec<StoreEvent>,
    ) {
        if self.could_affect(property, priority) {
            self.reevaluate_property(registry, property, true, events);
        }
    }

    /// Returns `true` if a contribution at `priority` could change the value or
    /// the base value of `property`.
    fn could_affect(&self, property: PropertyId, priority: BindingPriority) -> bool {
        self.effective_value(property).is_none_or(|e| {
            priority <= e.priority()
                || (priority.is_base_eligible() && priority <= e.base_priority())
        })
    }

    // =========================================================================
    // Binding activation
    // =========================================================================

    /// Returns the value of an entry, subscribing it first if it is dormant.
    ///
    /// Subscribing can restructure the frame list; callers compare the
    /// generation afterwards.
    fn consult(
        &mut self,
        registry: &PropertyRegistry,
        fi: usize,
        ei: usize,
    ) -> Option<ErasedValue> {
        let entry = &self.frames[fi].entries()[ei];
        if !entry.is_dormant() {
            return entry.value.clone();
        }
        let id = entry.id;
        self.activate(registry, fi, ei);
        let (fi, ei) = self.locate_entry(id)?;
        self.frames[fi].entries()[ei].value.clone()
    }

    fn activate(&mut self, registry: &PropertyRegistry, fi: usize, ei: usize) {
        let entry = &mut self.frames[fi].entries_mut()[ei];
        let (id, property) = (entry.id, entry.property);
        let Some(mut source) = entry.take_source() else {
            return;
        };
        tracing::trace!(owner = ?self.owner, %property, "subscribing binding");

        let token = EntryToken::new(self.owner, id);
        let signal = source.subscribe(&mut ActivationCx {
            store: &mut *self,
            registry,
            token,
            property,
        });

        let Some((fi, ei)) = self.locate_entry(id) else {
            source.unsubscribe();
            return;
        };
        self.frames[fi].entries_mut()[ei].restore_source(source);
        match signal {
            BindingSignal::Value(value) => {
                if registry.get(property).is_some_and(|r| r.is_valid(&value)) {
                    self.frames[fi].entries_mut()[ei].value = Some(value);
                } else {
                    tracing::warn!(owner = ?self.owner, %property, ?value, "binding produced an invalid value");
                }
            }
            BindingSignal::Cleared => {}
            BindingSignal::Completed => self.remove_entry(fi, ei).release(),
        }
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolves one property from the frames.
    ///
    /// Animation frames are scanned first; the first active one with a value
    /// supplies the value. The local value, when included, is the base value.
    /// Otherwise the first active non-animation frame with a value supplies the
    /// base value, and the value too if no animation did. Restarts if subscribing
    /// a binding changes the frame list.
    fn evaluate(
        &mut self,
        registry: &PropertyRegistry,
        property: PropertyId,
        include_local: bool,
    ) -> Option<Resolution> {
        let local = if include_local {
            self.effective_value(property)
                .and_then(EffectiveValue::local_value)
                .cloned()
        } else {
            None
        };

        'restart: loop {
            let generation = self.generation;
            let mut animated = None;
            let mut fi = 0;

            while fi < self.frames.len() && self.frames[fi].priority().is_animation() {
                let hit = self.consult_frame(registry, fi, property);
                if self.generation != generation {
                    tracing::debug!(owner = ?self.owner, %property, "frames changed during evaluation, restarting");
                    continue 'restart;
                }
                fi += 1;
                if hit.is_some() {
                    animated = hit;
                    break;
                }
            }
            while fi < self.frames.len() && self.frames[fi].priority().is_animation() {
                fi += 1;
            }

            if let Some(local) = &local {
                let (value, priority) = match animated {
                    Some(value) => (value, BindingPriority::Animation),
                    None => (local.clone(), BindingPriority::LocalValue),
                };
                return Some(Resolution {
                    value,
                    priority,
                    base: Some((local.clone(), BindingPriority::LocalValue)),
                });
            }

            while fi < self.frames.len() {
                let priority = self.frames[fi].priority();
                let hit = self.consult_frame(registry, fi, property);
                if self.generation != generation {
                    tracing::debug!(owner = ?self.owner, %property, "frames changed during evaluation, restarting");
                    continue 'restart;
                }
                fi += 1;
                if let Some(base) = hit {
                    let (value, priority_out) = match animated {
                        Some(value) => (value, BindingPriority::Animation),
                        None => (base.clone(), priority),
                    };
                    return Some(Resolution {
                        value,
                        priority: priority_out,
                        base: Some((base, priority)),
                    });
                }
            }

            return animated.map(|value| Resolution {
                value,
                priority: BindingPriority::Animation,
                base: None,
            });
        }
    }

    fn consult_frame(
        &mut self,
        registry: &PropertyRegistry,
        fi: usize,
        property: PropertyId,
    ) -> Option<ErasedValue> {
        let frame = &self.frames[fi];
        if !frame.is_active() {
            return None;
        }
        let ei = frame.find(property)?;
        self.consult(registry, fi, ei)
    }

    /// Resolves one property and updates or drops its effective value.
    pub(crate) fn reevaluate_property(
        &mut self,
        registry: &PropertyRegistry,
        property: PropertyId,
        include_local: bool,
        events: &mut Vec<StoreEvent>,
    ) {
        match self.evaluate(registry, property, include_local) {
            Some(resolution) => {
                self.update_effective(registry, property, |e| e.resolve(resolution), events);
            }
            None => self.remove_effective(registry, property, events),
        }
    }

    /// Runs the pending full re-evaluation, unless a styling batch is open.
    pub(crate) fn settle(&mut self, registry: &PropertyRegistry, events: &mut Vec<StoreEvent>) {
        if self.needs_reevaluation && self.styling == 0 {
            self.reevaluate_all(registry, events);
        }
    }

    /// Resolves every property from scratch.
    ///
    /// Walks active frames from most to least authoritative. An entry is only
    /// consulted while its property still lacks a value or a base value, so
    /// bindings that cannot win stay dormant. If the frame list changes during
    /// the walk the walk starts over; results are applied only after a walk
    /// completes, so observers never see a partial state.
    pub(crate) fn reevaluate_all(
        &mut self,
        registry: &PropertyRegistry,
        events: &mut Vec<StoreEvent>,
    ) {
        if self.styling > 0 {
            self.needs_reevaluation = true;
            return;
        }

        let mut pending = core::mem::take(&mut self.scratch);

        'restart: loop {
            self.needs_reevaluation = false;
            let generation = self.generation;
            pending.clear();
            for (property, e) in &self.effective {
                if let Some(local) = e.local_value() {
                    pending.push((
                        *property,
                        Pending {
                            value: Some((local.clone(), BindingPriority::LocalValue)),
                            base: Some((local.clone(), BindingPriority::LocalValue)),
                        },
                    ));
                }
            }

            for fi in 0..self.frames.len() {
                let frame = &self.frames[fi];
                if !frame.is_active() {
                    continue;
                }
                let priority = frame.priority();
                for ei in 0..frame.len() {
                    let property = self.frames[fi].entries()[ei].property;
                    let slot = pending_slot(&mut pending, property);
                    let needs_value = pending[slot]
                        .1
                        .value
                        .as_ref()
                        .is_none_or(|(_, p)| priority < *p);
                    let needs_base = priority.is_base_eligible() && pending[slot].1.base.is_none();
                    if !needs_value && !needs_base {
                        continue;
                    }

                    let hit = self.consult(registry, fi, ei);
                    if self.generation != generation {
                        tracing::debug!(owner = ?self.owner, "frames changed during re-evaluation, restarting");
                        continue 'restart;
                    }
                    if let Some(value) = hit {
                        let slot = &mut pending[slot].1;
                        if needs_base {
                            slot.base = Some((value.clone(), priority));
                        }
                        if needs_value {
                            slot.value = Some((value, priority));
                        }
                    }
                }
            }
            break;
        }

        let unresolved: SmallVec<[PropertyId; 4]> = self
            .effective
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| {
                pending
                    .binary_search_by_key(id, |(p, _)| *p)
                    .ok()
                    .is_none_or(|idx| pending[idx].1.value.is_none())
            })
            .collect();

        for (property, slot) in pending.drain(..) {
            if let Some((value, priority)) = slot.value {
                let resolution = Resolution {
                    value,
                    priority,
                    base: slot.base,
                };
                self.update_effective(registry, property, |e| e.resolve(resolution), events);
            }
        }
        for property in unresolved {
            self.remove_effective(registry, property, events);
        }

        self.scratch = pending;
    }

    /// Applies `update` to the effective value of `property`, creating it first
    /// if needed, and records what changed.
    fn update_effective(
        &mut self,
        registry: &PropertyRegistry,
        property: PropertyId,
        update: impl FnOnce(&mut EffectiveValue) -> ValueChange,
        events: &mut Vec<StoreEvent>,
    ) {
        let (idx, created, old_priority) = match self.find_effective(property) {
            Ok(idx) => (idx, false, self.effective[idx].1.priority()),
            Err(idx) => {
                let (initial, priority) = self.visible_value(registry, property);
                self.effective
                    .insert(idx, (property, EffectiveValue::unset(initial)));
                (idx, true, priority)
            }
        };

        let change = update(&mut self.effective[idx].1);
        let effective = &self.effective[idx].1;
        let event = match change {
            ValueChange::Value { old } => Some(StoreEvent::Changed {
                property,
                old,
                new: effective.value().clone(),
                priority: effective.priority(),
                old_priority,
            }),
            ValueChange::Base { old } => effective.base_value().map(|new| StoreEvent::BaseChanged {
                property,
                old: old.unwrap_or_else(|| self.default_value(registry, property)),
                new: new.clone(),
                priority: effective.base_priority(),
            }),
            ValueChange::Unchanged => None,
        };

        if registry.inherits(property) {
            let value = effective.value().clone();
            let value_changed = matches!(event, Some(StoreEvent::Changed { .. }));
            self.sync_owned_frame(property, Some(value));
            if created && !value_changed {
                events.push(StoreEvent::Pinned { property });
            }
        }
        if let Some(event) = event {
            events.push(event);
        }
    }

    /// Drops the effective value of `property`, if any.
    fn remove_effective(
        &mut self,
        registry: &PropertyRegistry,
        property: PropertyId,
        events: &mut Vec<StoreEvent>,
    ) {
        let Ok(idx) = self.find_effective(property) else {
            return;
        };
        let (_, old) = self.effective.remove(idx);
        if registry.inherits(property) {
            self.sync_owned_frame(property, None);
        }
        let (new, priority) = self.visible_value(registry, property);
        events.push(StoreEvent::Removed {
            property,
            old: old.value().clone(),
            new,
            priority,
        });
    }
}

impl fmt::Debug for ValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueStore")
            .field("owner", &self.owner)
            .field("owner_type", &self.owner_type)
            .field("frames", &self.frames)
            .field("effective", &self.effective)
            .field(
                "local_bindings",
                &self.local_bindings.keys().collect::<Vec<_>>(),
            )
            .field("inheritance_frame_owner", &self.inheritance_frame_owner())
            .field("generation", &self.generation)
            .field("styling", &self.styling)
            .finish_non_exhaustive()
    }
}

/// Returns the index of `property` in the sorted pending list, inserting it.
fn pending_slot(pending: &mut Vec<(PropertyId, Pending)>, property: PropertyId) -> usize {
    match pending.binary_search_by_key(&property, |(p, _)| *p) {
        Ok(idx) => idx,
        Err(idx) => {
            pending.insert(idx, (property, Pending::default()));
            idx
        }
    }
}

pub(crate) fn registration(
    registry: &PropertyRegistry,
    property: PropertyId,
) -> Result<&PropertyRegistration, PropertyError> {
    registry
        .get(property)
        .ok_or(PropertyError::UnknownProperty(property))
}

/// Rejects properties that bypass layered resolution.
pub(crate) fn check_layered(registration: &PropertyRegistration) -> Result<(), PropertyError> {
    if registration.is_direct() {
        Err(PropertyError::unsupported(
            "direct properties are not stored in a value store",
        ))
    } else {
        Ok(())
    }
}

pub(crate) fn check_valid(
    registration: &PropertyRegistration,
    value: &ErasedValue,
) -> Result<(), PropertyError> {
    if registration.type_id() != value.type_id() {
        return Err(type_mismatch(registration, value.type_name()));
    }
    if registration.is_valid(value) {
        Ok(())
    } else {
        Err(PropertyError::InvalidValue {
            property: registration.name(),
            value: format!("{value:?}"),
        })
    }
}

pub(crate) fn type_mismatch(
    registration: &PropertyRegistration,
    actual: &'static str,
) -> PropertyError {
    PropertyError::TypeMismatch {
        property: registration.name(),
        expected: registration.type_name(),
        actual,
    }
}
