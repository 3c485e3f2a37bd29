// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cached resolution results.

use crate::priority::BindingPriority;
use crate::value::ErasedValue;

/// The resolved value of one property on one object.
///
/// Besides the winning `(value, priority)` pair it tracks the *base value*:
/// what the property would resolve to if no animation were running. The base
/// priority is never [`BindingPriority::Animation`].
#[derive(Clone, Debug)]
pub struct EffectiveValue {
    value: ErasedValue,
    priority: BindingPriority,
    base_value: Option<ErasedValue>,
    base_priority: BindingPriority,
}

/// Outcome of updating an [`EffectiveValue`].
#[derive(Debug)]
pub(crate) enum ValueChange {
    Unchanged,
    /// The value changed; the base may have changed too.
    Value { old: ErasedValue },
    /// Only the base value changed.
    Base { old: Option<ErasedValue> },
}

/// A complete resolution for one property, as produced by a frame scan.
#[derive(Debug)]
pub(crate) struct Resolution {
    pub(crate) value: ErasedValue,
    pub(crate) priority: BindingPriority,
    pub(crate) base: Option<(ErasedValue, BindingPriority)>,
}

impl EffectiveValue {
    /// Starts out showing `initial` with no contributor.
    ///
    /// `initial` is whatever the object exposed before this value existed, so the
    /// first update reports a change only if the visible value moves.
    pub(crate) fn unset(initial: ErasedValue) -> Self {
        Self {
            value: initial,
            priority: BindingPriority::Unset,
            base_value: None,
            base_priority: BindingPriority::Unset,
        }
    }

    /// Returns the resolved value.
    #[must_use]
    #[inline]
    pub fn value(&self) -> &ErasedValue {
        &self.value
    }

    /// Returns the tier that produced [`value`](Self::value).
    #[must_use]
    #[inline]
    pub fn priority(&self) -> BindingPriority {
        self.priority
    }

    /// Returns the value without animations, if any non-animation contributor exists.
    #[must_use]
    #[inline]
    pub fn base_value(&self) -> Option<&ErasedValue> {
        self.base_value.as_ref()
    }

    /// Returns the tier of the base value, or `Unset` without one.
    #[must_use]
    #[inline]
    pub fn base_priority(&self) -> BindingPriority {
        self.base_priority
    }

    /// Returns the local value held in this cell, if any.
    pub(crate) fn local_value(&self) -> Option<&ErasedValue> {
        if self.priority == BindingPriority::LocalValue {
            Some(&self.value)
        } else if self.base_priority == BindingPriority::LocalValue {
            self.base_value.as_ref()
        } else {
            None
        }
    }

    /// Applies a single contribution.
    ///
    /// The value is replaced when `priority` is at least as authoritative as the
    /// current one; the base is replaced likewise when `priority` is base eligible.
    pub(crate) fn set(&mut self, value: ErasedValue, priority: BindingPriority) -> ValueChange {
        debug_assert!(priority.is_settable(), "cannot set at {priority}");

        let mut old_value = None;
        let mut old_base = None;

        if priority.is_base_eligible() && priority <= self.base_priority {
            if self.base_value.as_ref() != Some(&value) {
                old_base = Some(self.base_value.replace(value.clone()));
            }
            self.base_priority = priority;
        }

        if priority <= self.priority {
            if self.value != value {
                old_value = Some(core::mem::replace(&mut self.value, value));
            }
            self.priority = priority;
        }

        match (old_value, old_base) {
            (Some(old), _) => ValueChange::Value { old },
            (None, Some(old)) => ValueChange::Base { old },
            (None, None) => ValueChange::Unchanged,
        }
    }

    /// Replaces both pairs with a fresh resolution.
    ///
    /// Losing the base while the value stays (an animation whose underlying
    /// contributors all went away) reports `Unchanged`: there is no base value
    /// left to announce, and [`base_value`](Self::base_value) reads `None`.
    pub(crate) fn resolve(&mut self, resolution: Resolution) -> ValueChange {
        let Resolution {
            value,
            priority,
            base,
        } = resolution;
        debug_assert!(
            base.as_ref().is_none_or(|(_, p)| p.is_base_eligible()),
            "base value must come from a base eligible tier"
        );

        let (base_value, base_priority) = match base {
            Some((v, p)) => (Some(v), p),
            None => (None, BindingPriority::Unset),
        };
        let base_changed = base_value.is_some() && self.base_value != base_value;
        let old_base = core::mem::replace(&mut self.base_value, base_value);
        self.base_priority = base_priority;
        self.priority = priority;

        if self.value != value {
            let old = core::mem::replace(&mut self.value, value);
            ValueChange::Value { old }
        } else if base_changed {
            ValueChange::Base { old: old_base }
        } else {
            ValueChange::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BindingPriority::*;

    fn v(x: i32) -> ErasedValue {
        ErasedValue::new(x)
    }

    fn changed_from(change: &ValueChange) -> Option<i32> {
        match change {
            ValueChange::Value { old } => old.downcast_ref().copied(),
            _ => None,
        }
    }

    #[test]
    fn first_set_takes_value_and_base() {
        let mut e = EffectiveValue::unset(v(0));
        let change = e.set(v(10), Style);

        assert_eq!(changed_from(&change), Some(0));
        assert_eq!(e.value(), &v(10));
        assert_eq!(e.priority(), Style);
        assert_eq!(e.base_value(), Some(&v(10)));
        assert_eq!(e.base_priority(), Style);
    }

    #[test]
    fn animation_over_local_keeps_local_as_base() {
        let mut e = EffectiveValue::unset(v(0));
        e.set(v(5), LocalValue);
        let change = e.set(v(99), Animation);

        assert_eq!(changed_from(&change), Some(5));
        assert_eq!(e.priority(), Animation);
        assert_eq!(e.base_value(), Some(&v(5)));
        assert_eq!(e.base_priority(), LocalValue);
        assert_eq!(e.local_value(), Some(&v(5)));
    }

    #[test]
    fn weaker_write_only_moves_base() {
        let mut e = EffectiveValue::unset(v(0));
        e.set(v(99), Animation);
        assert_eq!(e.base_value(), None);

        let change = e.set(v(7), Style);
        assert!(matches!(change, ValueChange::Base { old: None }));
        assert_eq!(e.value(), &v(99));
        assert_eq!(e.base_value(), Some(&v(7)));

        let change = e.set(v(8), Template);
        assert!(matches!(change, ValueChange::Base { .. }));
        assert_eq!(e.base_priority(), Template);

        assert!(matches!(e.set(v(1), Style), ValueChange::Unchanged));
        assert_eq!(e.base_value(), Some(&v(8)));
    }

    #[test]
    fn equal_value_reports_nothing() {
        let mut e = EffectiveValue::unset(v(3));
        assert!(matches!(e.set(v(3), LocalValue), ValueChange::Base { old: None }));
        assert!(matches!(e.set(v(3), LocalValue), ValueChange::Unchanged));
        assert_eq!(e.priority(), LocalValue);
    }

    #[test]
    fn resolve_replaces_base_with_its_own() {
        let mut e = EffectiveValue::unset(v(0));
        e.set(v(10), Style);
        e.set(v(99), Animation);

        let change = e.resolve(Resolution {
            value: v(99),
            priority: Animation,
            base: Some((v(20), Template)),
        });
        assert!(matches!(change, ValueChange::Base { .. }));
        assert_eq!(e.base_value(), Some(&v(20)));
        assert_eq!(e.base_priority(), Template);
    }

    #[test]
    fn losing_the_base_under_an_animation_is_silent() {
        let mut e = EffectiveValue::unset(v(0));
        e.set(v(10), Style);
        e.set(v(99), Animation);
        assert_eq!(e.base_value(), Some(&v(10)));

        let change = e.resolve(Resolution {
            value: v(99),
            priority: Animation,
            base: None,
        });
        assert!(matches!(change, ValueChange::Unchanged));
        assert_eq!(e.base_value(), None);
        assert_eq!(e.base_priority(), Unset);
    }
}
