// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Value priority tiers.

use core::fmt;

/// The tier a contribution to a property value belongs to.
///
/// Tiers are ordered from most to least authoritative, so a *smaller* priority
/// wins: `Animation < LocalValue < StyleTrigger < Template < Style < Inherited < Unset`.
///
/// `Inherited` and `Unset` are never written directly. They only appear in
/// notifications and diagnostics to say where a resolved value came from.
///
/// # Example
///
/// ```rust
/// use understory_value_store::BindingPriority;
///
/// assert!(BindingPriority::Animation < BindingPriority::LocalValue);
/// assert!(BindingPriority::LocalValue < BindingPriority::Style);
/// assert!(BindingPriority::Style.is_base_eligible());
/// assert!(!BindingPriority::Animation.is_base_eligible());
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BindingPriority {
    /// A value produced by a running animation.
    Animation,
    /// A value assigned imperatively on the object itself.
    LocalValue,
    /// A value from a style whose selector depends on a trigger (pseudo-class etc.).
    StyleTrigger,
    /// A value from a control template.
    Template,
    /// A value from a plain style setter.
    Style,
    /// A value inherited from an ancestor.
    Inherited,
    /// No contributor; the property's default.
    Unset,
}

impl BindingPriority {
    /// Returns `true` for the animation tier.
    #[must_use]
    #[inline]
    pub const fn is_animation(self) -> bool {
        matches!(self, Self::Animation)
    }

    /// Returns `true` if a value at this tier can be a base value.
    ///
    /// Base values are what a property would resolve to without animations,
    /// so only tiers from `LocalValue` up to (but excluding) `Inherited` qualify.
    #[must_use]
    #[inline]
    pub const fn is_base_eligible(self) -> bool {
        matches!(
            self,
            Self::LocalValue | Self::StyleTrigger | Self::Template | Self::Style
        )
    }

    /// Returns `true` if values can be set or bound at this tier.
    #[must_use]
    #[inline]
    pub const fn is_settable(self) -> bool {
        !matches!(self, Self::Inherited | Self::Unset)
    }

    /// Returns `true` if this tier is held in value frames.
    ///
    /// Local values have their own slot and never live in a frame.
    #[must_use]
    #[inline]
    pub const fn is_frame_tier(self) -> bool {
        self.is_settable() && !matches!(self, Self::LocalValue)
    }
}

impl fmt::Display for BindingPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Animation => "Animation",
            Self::LocalValue => "LocalValue",
            Self::StyleTrigger => "StyleTrigger",
            Self::Template => "Template",
            Self::Style => "Style",
            Self::Inherited => "Inherited",
            Self::Unset => "Unset",
        };
        f.write_str(name)
    }
}
