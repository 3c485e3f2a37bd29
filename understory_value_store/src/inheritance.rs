// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Inheritance frames.
//!
//! An inheritance frame records the inheriting property values one object
//! exposes to its descendants. Frames chain to the nearest ancestor frame, so a
//! lookup walks at most one frame per ancestor that actually sets an inheriting
//! property.
//!
//! A store that sets no inheriting property shares its parent's frame instead of
//! owning one. When it gains such a value it creates its own frame chained to
//! the shared one; shared frames are never written by a non-owner.

use alloc::rc::{Rc, Weak};
use core::cell::RefCell;
use smallvec::SmallVec;

use crate::property::PropertyId;
use crate::tree::ObjectId;
use crate::value::ErasedValue;

/// Handle to a frame, shared between its owner and the descendants reading it.
pub(crate) type SharedFrame = Rc<RefCell<InheritanceFrame>>;

/// Property values sorted by ID.
pub(crate) type InheritedValues = SmallVec<[(PropertyId, ErasedValue); 8]>;

#[derive(Debug)]
pub(crate) struct InheritanceFrame {
    owner: ObjectId,
    parent: Option<Weak<RefCell<InheritanceFrame>>>,
    values: SmallVec<[(PropertyId, ErasedValue); 4]>,
}

impl InheritanceFrame {
    pub(crate) fn new_shared(owner: ObjectId, parent: Option<&SharedFrame>) -> SharedFrame {
        Rc::new(RefCell::new(Self {
            owner,
            parent: parent.map(Rc::downgrade),
            values: SmallVec::new(),
        }))
    }

    pub(crate) fn owner(&self) -> ObjectId {
        self.owner
    }

    pub(crate) fn parent(&self) -> Option<SharedFrame> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_parent(&mut self, parent: Option<&SharedFrame>) {
        self.parent = parent.map(Rc::downgrade);
    }

    pub(crate) fn get(&self, property: PropertyId) -> Option<&ErasedValue> {
        self.values
            .binary_search_by_key(&property, |(id, _)| *id)
            .ok()
            .map(|idx| &self.values[idx].1)
    }

    pub(crate) fn insert(&mut self, property: PropertyId, value: ErasedValue) {
        match self.values.binary_search_by_key(&property, |(id, _)| *id) {
            Ok(idx) => self.values[idx].1 = value,
            Err(idx) => self.values.insert(idx, (property, value)),
        }
    }

    pub(crate) fn remove(&mut self, property: PropertyId) -> Option<ErasedValue> {
        self.values
            .binary_search_by_key(&property, |(id, _)| *id)
            .ok()
            .map(|idx| self.values.remove(idx).1)
    }
}

/// Finds `property` in `frame` or the nearest ancestor frame holding it.
pub(crate) fn lookup(frame: &SharedFrame, property: PropertyId) -> Option<ErasedValue> {
    let mut current = Some(frame.clone());
    while let Some(f) = current {
        let f = f.borrow();
        if let Some(value) = f.get(property) {
            return Some(value.clone());
        }
        current = f.parent();
    }
    None
}

/// Collects every value visible from `frame`; nearer frames shadow farther ones.
pub(crate) fn collect_visible(frame: Option<&SharedFrame>) -> InheritedValues {
    let mut out = InheritedValues::new();
    let mut current = frame.cloned();
    while let Some(f) = current {
        let f = f.borrow();
        for (property, value) in &f.values {
            if let Err(idx) = out.binary_search_by_key(property, |(id, _)| *id) {
                out.insert(idx, (*property, value.clone()));
            }
        }
        current = f.parent();
    }
    out
}

/// Returns `true` if both handles point at the same frame (or both are absent).
pub(crate) fn same_frame(a: Option<&SharedFrame>, b: Option<&SharedFrame>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(i: u16) -> PropertyId {
        PropertyId::new(i)
    }

    fn v(x: i32) -> ErasedValue {
        ErasedValue::new(x)
    }

    #[test]
    fn lookup_walks_to_nearest_holder() {
        let root = InheritanceFrame::new_shared(ObjectId::new(0, 1), None);
        root.borrow_mut().insert(p(1), v(10));
        root.borrow_mut().insert(p(2), v(20));

        let child = InheritanceFrame::new_shared(ObjectId::new(1, 1), Some(&root));
        child.borrow_mut().insert(p(1), v(11));

        assert_eq!(lookup(&child, p(1)), Some(v(11)));
        assert_eq!(lookup(&child, p(2)), Some(v(20)));
        assert_eq!(lookup(&child, p(3)), None);
        assert_eq!(child.borrow().parent().map(|f| f.borrow().owner()), Some(ObjectId::new(0, 1)));
    }

    #[test]
    fn collect_prefers_nearer_frames() {
        let root = InheritanceFrame::new_shared(ObjectId::new(0, 1), None);
        root.borrow_mut().insert(p(1), v(10));
        root.borrow_mut().insert(p(3), v(30));
        let child = InheritanceFrame::new_shared(ObjectId::new(1, 1), Some(&root));
        child.borrow_mut().insert(p(1), v(11));
        child.borrow_mut().insert(p(2), v(22));

        let visible = collect_visible(Some(&child));
        assert_eq!(
            visible.as_slice(),
            &[(p(1), v(11)), (p(2), v(22)), (p(3), v(30))]
        );
        assert!(collect_visible(None).is_empty());
    }

    #[test]
    fn remove_and_reparent() {
        let a = InheritanceFrame::new_shared(ObjectId::new(0, 1), None);
        a.borrow_mut().insert(p(1), v(1));
        let b = InheritanceFrame::new_shared(ObjectId::new(1, 1), None);
        b.borrow_mut().insert(p(1), v(2));
        let child = InheritanceFrame::new_shared(ObjectId::new(2, 1), Some(&a));

        assert_eq!(lookup(&child, p(1)), Some(v(1)));
        child.borrow_mut().set_parent(Some(&b));
        assert_eq!(lookup(&child, p(1)), Some(v(2)));
        assert_eq!(b.borrow_mut().remove(p(1)), Some(v(2)));
        assert_eq!(lookup(&child, p(1)), None);

        assert!(same_frame(Some(&a), Some(&a)));
        assert!(!same_frame(Some(&a), Some(&b)));
        assert!(same_frame(None, None));
    }
}
