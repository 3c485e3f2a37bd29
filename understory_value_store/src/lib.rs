// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Value Store: layered property value resolution.
//!
//! Every property of an object can receive values from several places at once:
//! a running animation, a locally set value, style triggers, templates, styles,
//! and the object's ancestors. This crate decides which one wins, caches the
//! result, and reports each change exactly once.
//!
//! ## Core Concepts
//!
//! ### Priorities
//!
//! [`BindingPriority`] orders the tiers, most authoritative first:
//!
//! - **Animation** - transient values that override everything
//! - **`LocalValue`** - values set directly on the object
//! - **`StyleTrigger`**, **Template**, **Style** - values from styling
//! - **Inherited** - values coming from an ancestor
//! - **Unset** - the registered default
//!
//! Within a tier, the most recently added contribution wins.
//!
//! ### Frames and entries
//!
//! Style-tier values live in [`ValueFrame`]s: groups of per-property entries
//! sharing a priority, activated and deactivated together. An entry is either
//! a constant or a [`BindingSource`], which is only subscribed once resolution
//! actually needs it.
//!
//! ### Effective and base values
//!
//! Each object's [`ValueStore`] caches an [`EffectiveValue`] per set property:
//! the winning value and tier, plus the *base value* the property would show
//! without animations.
//!
//! ### Inheritance
//!
//! Properties registered with `inherits(true)` flow from ancestors to
//! descendants that have no value of their own. Objects only materialize an
//! inheritance frame once they set an inheriting property; others read
//! through their ancestor's frame.
//!
//! ## Quick Start
//!
//! ```rust
//! use understory_value_store::{
//!     BindingPriority, ObjectTree, OwnerType, PropertyMetadataBuilder, PropertyRegistry,
//!     ValueFrameBuilder,
//! };
//!
//! let mut registry = PropertyRegistry::new();
//! let width = registry.register(
//!     "Width",
//!     PropertyMetadataBuilder::new(0.0_f64)
//!         .validate(|w: &f64| *w >= 0.0)
//!         .build(),
//! );
//!
//! let mut tree = ObjectTree::new(registry);
//! let button = tree.insert(OwnerType::default(), None).unwrap();
//!
//! // A style supplies a value...
//! let style = ValueFrameBuilder::new(BindingPriority::Style)
//!     .set(width, 80.0)
//!     .build();
//! tree.add_frame(button, style).unwrap();
//! assert_eq!(tree.get_value(button, width), 80.0);
//!
//! // ...a local value overrides it...
//! tree.set_value(button, width, 120.0, BindingPriority::LocalValue).unwrap();
//! assert_eq!(tree.get_value(button, width), 120.0);
//!
//! // ...an animation overrides both, while the local value stays the base.
//! tree.set_value(button, width, 150.0, BindingPriority::Animation).unwrap();
//! assert!(tree.is_animating(button, width));
//! assert_eq!(tree.get_base_value(button, width), Some(120.0));
//!
//! // Invalid values are rejected.
//! assert!(tree.set_value(button, width, -1.0, BindingPriority::LocalValue).is_err());
//!
//! for change in tree.drain_changes() {
//!     assert!(change.is(width));
//! }
//! ```
//!
//! ## Change notifications
//!
//! [`ObjectTree::drain_changes`] returns a [`PropertyChange`] for each change
//! in the order it happened. Changes where only the base value moved are
//! flagged with `is_effective_value_change == false`.
//!
//! ## Diagnostics
//!
//! Structured diagnostics go through [`tracing`](https://docs.rs/tracing):
//! internal inconsistencies at `error`, rejected binding values at `warn`,
//! re-evaluation restarts and styling batches at `debug`, and every raised
//! change at `trace`. No subscriber is installed by this crate.
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

mod binding;
mod change;
mod effective;
mod error;
mod frame;
mod inheritance;
mod metadata;
mod priority;
mod property;
mod registry;
mod store;
mod tree;
mod value;

pub use binding::{ActivationCx, BindingSignal, BindingSource};
pub use change::{PropertyChange, PropertyDiagnostic};
pub use effective::EffectiveValue;
pub use error::PropertyError;
pub use frame::{EntryToken, FrameId, FrameKind, ValueFrame, ValueFrameBuilder};
pub use metadata::{PropertyMetadata, PropertyMetadataBuilder, ValidateValueCallback};
pub use priority::BindingPriority;
pub use property::{OwnerType, Property, PropertyId, PropertyValue};
pub use registry::{PropertyRegistration, PropertyRegistry};
pub use store::ValueStore;
pub use tree::{ObjectId, ObjectTree};
pub use value::ErasedValue;
