//! Priority lanes.
//!
//! Every update carries exactly one lane. A root tracks the union of lanes that still
//! have work, and each render processes a single lane: the most urgent pending one.

use crate::scheduler::Priority;

bitflags::bitflags! {
    /// A set of lanes. A single-bit set is used wherever one lane is meant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lanes: u32 {
        /// Discrete user input and explicit container renders. Flushed in a microtask.
        const SYNC = 1 << 0;
        /// Continuous input such as drags or scrolling.
        const INPUT_CONTINUOUS = 1 << 1;
        /// Updates with no better classification.
        const DEFAULT = 1 << 2;
        /// Updates that may be deferred behind everything above.
        const TRANSITION = 1 << 3;
        /// Offscreen or speculative work.
        const IDLE = 1 << 29;
    }
}

/// A single lane.
pub type Lane = Lanes;

impl Lanes {
    /// The empty set.
    pub const NONE: Self = Self::empty();

    /// Returns the most urgent lane in the set, or [`Lanes::NONE`].
    #[must_use]
    pub const fn highest_priority(self) -> Lane {
        let bits = self.bits();
        Self::from_bits_retain(bits & bits.wrapping_neg())
    }

    /// Whether every lane of `subset` is included in `self`.
    ///
    /// The empty subset is always included, which is how rebased updates are
    /// re-applied in every later render.
    #[must_use]
    pub const fn includes(self, subset: Self) -> bool {
        self.bits() & subset.bits() == subset.bits()
    }

    /// Maps the most urgent lane in the set to a scheduler priority.
    #[must_use]
    pub fn to_priority(self) -> Priority {
        let lane = self.highest_priority();
        if lane == Self::SYNC {
            Priority::Immediate
        } else if lane == Self::INPUT_CONTINUOUS {
            Priority::UserBlocking
        } else if lane == Self::DEFAULT {
            Priority::Normal
        } else if lane == Self::TRANSITION {
            Priority::Low
        } else {
            Priority::Idle
        }
    }
}
