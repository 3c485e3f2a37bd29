// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tests for property inheritance in `understory_value_store`.
//!
//! These exercise propagation from ancestors to descendants: one notification
//! per affected object, hard stops at local overrides, reverting to the
//! ancestor's current value, and reparenting whole subtrees.

use understory_value_store::{
    BindingPriority, ObjectId, ObjectTree, OwnerType, Property, PropertyChange,
    PropertyMetadataBuilder, PropertyRegistry, ValueFrameBuilder,
};

use BindingPriority::{Inherited, LocalValue, Style, Unset};

struct Fixture {
    tree: ObjectTree,
    /// Inherits, default 0.
    p: Property<i32>,
    /// Inherits, default 0, or 50 on `OwnerType::new(1)`.
    typed: Property<i32>,
    /// Does not inherit.
    plain: Property<i32>,
}

fn fixture() -> Fixture {
    let mut registry = PropertyRegistry::new();
    let p = registry.register(
        "P",
        PropertyMetadataBuilder::new(0_i32).inherits(true).build(),
    );
    let typed = registry.register(
        "Typed",
        PropertyMetadataBuilder::new(0_i32)
            .inherits(true)
            .default_for(OwnerType::new(1), 50)
            .build(),
    );
    let plain = registry.register("Plain", PropertyMetadataBuilder::new(0_i32).build());
    Fixture {
        tree: ObjectTree::new(registry),
        p,
        typed,
        plain,
    }
}

fn insert(tree: &mut ObjectTree, parent: Option<ObjectId>) -> ObjectId {
    tree.insert(OwnerType::default(), parent).unwrap()
}

fn changes_on(changes: &[PropertyChange], object: ObjectId) -> Vec<(i32, i32, BindingPriority)> {
    changes
        .iter()
        .filter(|c| c.object == object && c.is_effective_value_change)
        .map(|c| {
            (
                *c.old_value_as::<i32>().unwrap(),
                *c.new_value_as::<i32>().unwrap(),
                c.priority,
            )
        })
        .collect()
}

#[test]
fn descendants_see_ancestor_value() {
    let Fixture { mut tree, p, plain, .. } = fixture();
    let a = insert(&mut tree, None);
    let mid = insert(&mut tree, Some(a));
    let b = insert(&mut tree, Some(mid));

    tree.set_value(a, p, 1, LocalValue).unwrap();
    tree.set_value(a, plain, 1, LocalValue).unwrap();
    assert_eq!(tree.get_value(b, p), 1);
    assert_eq!(tree.get_value(b, plain), 0);
    assert!(!tree.is_set(b, p));

    let d = tree.diagnostic(b, p.id()).unwrap();
    assert_eq!(d.priority, Inherited);
}

#[test]
fn ancestor_change_notifies_each_descendant_once() {
    let Fixture { mut tree, p, .. } = fixture();
    let a = insert(&mut tree, None);
    let mid = insert(&mut tree, Some(a));
    let b = insert(&mut tree, Some(mid));
    let sibling = insert(&mut tree, Some(mid));
    tree.set_value(a, p, 1, LocalValue).unwrap();
    tree.drain_changes();

    tree.set_value(a, p, 2, LocalValue).unwrap();
    let changes = tree.drain_changes();
    assert_eq!(changes_on(&changes, a), [(1, 2, LocalValue)]);
    assert_eq!(changes_on(&changes, mid), [(1, 2, Inherited)]);
    assert_eq!(changes_on(&changes, b), [(1, 2, Inherited)]);
    assert_eq!(changes_on(&changes, sibling), [(1, 2, Inherited)]);
    assert_eq!(changes.len(), 4);
    assert_eq!(tree.get_value(b, p), 2);
}

#[test]
fn local_override_stops_propagation() {
    let Fixture { mut tree, p, .. } = fixture();
    let a = insert(&mut tree, None);
    let b = insert(&mut tree, Some(a));
    let c = insert(&mut tree, Some(b));
    tree.set_value(a, p, 1, LocalValue).unwrap();

    tree.set_value(b, p, 3, LocalValue).unwrap();
    assert_eq!(tree.get_value(c, p), 3);
    tree.drain_changes();

    tree.set_value(a, p, 4, LocalValue).unwrap();
    let changes = tree.drain_changes();
    assert_eq!(changes_on(&changes, a), [(1, 4, LocalValue)]);
    assert!(changes_on(&changes, b).is_empty());
    assert!(changes_on(&changes, c).is_empty());
    assert_eq!(tree.get_value(b, p), 3);
    assert_eq!(tree.get_value(c, p), 3);
}

#[test]
fn clearing_override_tracks_current_ancestor_value() {
    let Fixture { mut tree, p, .. } = fixture();
    let a = insert(&mut tree, None);
    let b = insert(&mut tree, Some(a));
    let c = insert(&mut tree, Some(b));
    tree.set_value(a, p, 1, LocalValue).unwrap();
    tree.set_value(b, p, 3, LocalValue).unwrap();
    tree.set_value(a, p, 4, LocalValue).unwrap();
    tree.drain_changes();

    tree.clear_local_value(b, p).unwrap();
    assert_eq!(tree.get_value(b, p), 4);
    assert_eq!(tree.get_value(c, p), 4);

    let changes = tree.drain_changes();
    assert_eq!(changes_on(&changes, b), [(3, 4, Inherited)]);
    assert_eq!(changes_on(&changes, c), [(3, 4, Inherited)]);

    // Tracking resumes.
    tree.set_value(a, p, 5, LocalValue).unwrap();
    assert_eq!(tree.get_value(c, p), 5);
}

#[test]
fn clearing_root_value_reverts_descendants_to_default() {
    let Fixture { mut tree, p, .. } = fixture();
    let a = insert(&mut tree, None);
    let b = insert(&mut tree, Some(a));
    tree.set_value(a, p, 1, LocalValue).unwrap();
    tree.drain_changes();

    tree.clear_local_value(a, p).unwrap();
    let changes = tree.drain_changes();
    assert_eq!(changes_on(&changes, a), [(1, 0, Unset)]);
    assert_eq!(changes_on(&changes, b), [(1, 0, Unset)]);
}

#[test]
fn owner_type_defaults_apply_per_descendant() {
    let Fixture { mut tree, typed, .. } = fixture();
    let a = insert(&mut tree, None);
    let special = tree.insert(OwnerType::new(1), Some(a)).unwrap();
    assert_eq!(tree.get_value(special, typed), 50);

    tree.set_value(a, typed, 7, LocalValue).unwrap();
    assert_eq!(tree.get_value(special, typed), 7);
    let changes = tree.drain_changes();
    assert_eq!(changes_on(&changes, special), [(50, 7, Inherited)]);

    tree.clear_local_value(a, typed).unwrap();
    assert_eq!(tree.get_value(special, typed), 50);
    let changes = tree.drain_changes();
    assert_eq!(changes_on(&changes, a), [(7, 0, Unset)]);
    assert_eq!(changes_on(&changes, special), [(7, 50, Unset)]);
}

#[test]
fn style_values_inherit_too() {
    let Fixture { mut tree, p, .. } = fixture();
    let a = insert(&mut tree, None);
    let b = insert(&mut tree, Some(a));
    let style = tree
        .add_frame(a, ValueFrameBuilder::new(Style).set(p, 8).build())
        .unwrap();
    assert_eq!(tree.get_value(b, p), 8);

    tree.remove_frame(a, style).unwrap();
    assert_eq!(tree.get_value(b, p), 0);
    let changes = tree.drain_changes();
    assert_eq!(changes_on(&changes, b), [(0, 8, Inherited), (8, 0, Unset)]);
}

#[test]
fn new_children_see_inherited_values_immediately() {
    let Fixture { mut tree, p, .. } = fixture();
    let a = insert(&mut tree, None);
    tree.set_value(a, p, 6, LocalValue).unwrap();
    tree.drain_changes();

    let b = insert(&mut tree, Some(a));
    assert_eq!(tree.get_value(b, p), 6);
    assert_eq!(changes_on(&tree.drain_changes(), b), [(0, 6, Inherited)]);
    assert_eq!(tree.store(b).unwrap().inheritance_frame_owner(), Some(a));
}

#[test]
fn equal_value_on_child_is_silent_but_pins_it() {
    let Fixture { mut tree, p, .. } = fixture();
    let a = insert(&mut tree, None);
    let b = insert(&mut tree, Some(a));
    let c = insert(&mut tree, Some(b));
    tree.set_value(a, p, 1, LocalValue).unwrap();
    tree.drain_changes();

    // B now holds the value itself; nothing visible changes.
    tree.set_value(b, p, 1, LocalValue).unwrap();
    assert!(changes_on(&tree.drain_changes(), b).is_empty());
    assert_eq!(tree.store(c).unwrap().inheritance_frame_owner(), Some(b));

    // ...but A no longer reaches C.
    tree.set_value(a, p, 2, LocalValue).unwrap();
    assert_eq!(tree.get_value(c, p), 1);
}

#[test]
fn reparenting_diffs_inherited_values_once() {
    let Fixture { mut tree, p, typed, .. } = fixture();
    let left = insert(&mut tree, None);
    let right = insert(&mut tree, None);
    tree.set_value(left, p, 1, LocalValue).unwrap();
    tree.set_value(right, p, 2, LocalValue).unwrap();
    tree.set_value(left, typed, 9, LocalValue).unwrap();
    tree.set_value(right, typed, 9, LocalValue).unwrap();

    let b = insert(&mut tree, Some(left));
    let d = insert(&mut tree, Some(b));
    tree.drain_changes();

    tree.set_parent(b, Some(right)).unwrap();
    assert_eq!(tree.parent(b), Some(right));
    assert_eq!(tree.children(right), &[b]);
    assert!(tree.children(left).is_empty());
    assert_eq!(tree.get_value(d, p), 2);

    let changes = tree.drain_changes();
    // `typed` is 9 on both sides, so only `p` changes.
    assert_eq!(changes.len(), 2);
    assert_eq!(changes_on(&changes, b), [(1, 2, Inherited)]);
    assert_eq!(changes_on(&changes, d), [(1, 2, Inherited)]);
}

#[test]
fn reparenting_through_an_owned_frame() {
    let Fixture { mut tree, p, typed, .. } = fixture();
    let left = insert(&mut tree, None);
    let right = insert(&mut tree, None);
    tree.set_value(left, p, 1, LocalValue).unwrap();
    tree.set_value(right, p, 2, LocalValue).unwrap();

    // B sets its own inheriting value, so its child reads through B's frame.
    let b = insert(&mut tree, Some(left));
    tree.set_value(b, typed, 3, LocalValue).unwrap();
    let d = insert(&mut tree, Some(b));
    assert_eq!(tree.store(d).unwrap().inheritance_frame_owner(), Some(b));
    tree.drain_changes();

    tree.set_parent(b, Some(right)).unwrap();
    assert_eq!(tree.get_value(d, p), 2);
    assert_eq!(tree.get_value(d, typed), 3);
    let changes = tree.drain_changes();
    assert_eq!(changes_on(&changes, b), [(1, 2, Inherited)]);
    assert_eq!(changes_on(&changes, d), [(1, 2, Inherited)]);

    // Later changes on the new side still flow through B's frame.
    tree.set_value(right, p, 4, LocalValue).unwrap();
    assert_eq!(tree.get_value(d, p), 4);
}

#[test]
fn detaching_reverts_to_defaults() {
    let Fixture { mut tree, p, .. } = fixture();
    let a = insert(&mut tree, None);
    let b = insert(&mut tree, Some(a));
    tree.set_value(a, p, 1, LocalValue).unwrap();
    tree.drain_changes();

    tree.set_parent(b, None).unwrap();
    assert_eq!(tree.parent(b), None);
    assert_eq!(tree.get_value(b, p), 0);
    assert_eq!(changes_on(&tree.drain_changes(), b), [(1, 0, Unset)]);
}

#[test]
fn removed_subtree_no_longer_receives_changes() {
    let Fixture { mut tree, p, .. } = fixture();
    let a = insert(&mut tree, None);
    let b = insert(&mut tree, Some(a));
    tree.remove(b).unwrap();
    tree.drain_changes();

    tree.set_value(a, p, 1, LocalValue).unwrap();
    let changes = tree.drain_changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].object, a);
}
