//! Delay-state analysis.
//!
//! While a trigger body is compiled the compiler tracks whether a suspension
//! point (a `delay`-like statement) has definitely, possibly, or never run on
//! the current path.  Statements whose legality depends on that knowledge
//! read it from [`CompileContext::delay`](crate::context::CompileContext).
//!
//! The value uses three-valued logic: [`DelayState::Maybe`] absorbs
//! everything that is not a definite answer.

use std::fmt;

/// Whether a suspension point is guaranteed to have occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DelayState {
    /// No suspension point on any path so far.
    #[default]
    No,
    /// Every path so far has passed a suspension point.
    Yes,
    /// Some paths have, some have not.
    Maybe,
}

impl DelayState {
    /// Three-valued conjunction.
    pub fn and(self, other: DelayState) -> DelayState {
        use DelayState::*;
        match (self, other) {
            (Yes, Yes) => Yes,
            (No, _) | (_, No) => No,
            _ => Maybe,
        }
    }

    /// Three-valued disjunction.
    pub fn or(self, other: DelayState) -> DelayState {
        use DelayState::*;
        match (self, other) {
            (No, No) => No,
            (Yes, _) | (_, Yes) => Yes,
            _ => Maybe,
        }
    }

    /// State after a block that may run zero times (`loop`, `while`, `if`
    /// without `else`).
    ///
    /// `before` is the state entering the block, `after` the state at the
    /// end of its body.  A guarantee made before the block survives; a
    /// guarantee made only inside the body does not, and a body without any
    /// suspension leaves the entering state alone.
    pub fn merge_optional(before: DelayState, after: DelayState) -> DelayState {
        match (before, after) {
            (DelayState::Yes, _) => DelayState::Yes,
            (_, DelayState::No) => before,
            _ => DelayState::Maybe,
        }
    }

    /// State after an `if`/`else` pair.
    ///
    /// `before_if` is the state entering the `if`, `after_if` the state at
    /// the end of the then-branch, `after_else` at the end of the else-branch.
    pub fn merge_branches(
        before_if: DelayState,
        after_if: DelayState,
        after_else: DelayState,
    ) -> DelayState {
        after_else.and(after_if).or(before_if)
    }
}

impl fmt::Display for DelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DelayState::No => "no",
            DelayState::Yes => "yes",
            DelayState::Maybe => "maybe",
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
