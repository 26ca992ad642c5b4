//! Reaction state machine.
//!
//! A member's standing reaction to a target is `None`, `Liked` or `Disliked`.
//! Requesting the current kind again toggles it off; requesting the other
//! kind swaps it. Every step yields the counter deltas and the persistence
//! change that keep the stored counters equal to the live reactions.
//!
//! | current  | requested | next     | like | dislike |
//! |----------|-----------|----------|------|---------|
//! | None     | Like      | Liked    | +1   | 0       |
//! | None     | Dislike   | Disliked | 0    | +1      |
//! | Liked    | Like      | None     | -1   | 0       |
//! | Liked    | Dislike   | Disliked | -1   | +1      |
//! | Disliked | Dislike   | None     | 0    | -1      |
//! | Disliked | Like      | Liked    | +1   | -1      |

use crate::state::ReactionKind;
use serde::{Deserialize, Serialize};

/// A member's standing reaction to one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionState {
    /// No live reaction.
    #[default]
    None,
    /// A live LIKE.
    Liked,
    /// A live DISLIKE.
    Disliked,
}

/// Row-level change implied by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Create the member's reaction with this kind.
    Insert(ReactionKind),
    /// Switch the existing reaction to this kind.
    Update(ReactionKind),
    /// Remove the existing reaction.
    Delete,
}

/// Result of applying a requested kind to a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State after the request
    pub next: ReactionState,
    /// Change to `like_count`
    pub like_delta: i8,
    /// Change to `dislike_count`
    pub dislike_delta: i8,
    /// Persistence instruction
    pub change: Change,
}

impl ReactionState {
    /// State of an existing reaction of `kind`, or `None`.
    #[must_use]
    pub const fn from_kind(kind: Option<ReactionKind>) -> Self {
        match kind {
            Some(ReactionKind::Like) => Self::Liked,
            Some(ReactionKind::Dislike) => Self::Disliked,
            None => Self::None,
        }
    }

    /// Kind of the live reaction, if any.
    #[must_use]
    pub const fn kind(self) -> Option<ReactionKind> {
        match self {
            Self::None => None,
            Self::Liked => Some(ReactionKind::Like),
            Self::Disliked => Some(ReactionKind::Dislike),
        }
    }

    /// Apply a requested reaction.
    ///
    /// # Examples
    ///
    /// ```
    /// use tastebud_content::reaction::{Change, ReactionState};
    /// use tastebud_content::state::ReactionKind;
    ///
    /// let step = ReactionState::Liked.apply(ReactionKind::Dislike);
    /// assert_eq!(step.next, ReactionState::Disliked);
    /// assert_eq!((step.like_delta, step.dislike_delta), (-1, 1));
    /// assert_eq!(step.change, Change::Update(ReactionKind::Dislike));
    /// ```
    #[must_use]
    pub const fn apply(self, requested: ReactionKind) -> Transition {
        use ReactionKind::{Dislike, Like};

        let (next, like_delta, dislike_delta, change) = match (self, requested) {
            (Self::None, Like) => (Self::Liked, 1, 0, Change::Insert(Like)),
            (Self::None, Dislike) => (Self::Disliked, 0, 1, Change::Insert(Dislike)),
            (Self::Liked, Like) => (Self::None, -1, 0, Change::Delete),
            (Self::Liked, Dislike) => (Self::Disliked, -1, 1, Change::Update(Dislike)),
            (Self::Disliked, Dislike) => (Self::None, 0, -1, Change::Delete),
            (Self::Disliked, Like) => (Self::Liked, 1, -1, Change::Update(Like)),
        };

        Transition {
            next,
            like_delta,
            dislike_delta,
            change,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::state::Counters;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn test_repeat_toggles_off() {
        for kind in [ReactionKind::Like, ReactionKind::Dislike] {
            let on = ReactionState::None.apply(kind);
            let off = on.next.apply(kind);
            assert_eq!(off.next, ReactionState::None);
            assert_eq!(off.change, Change::Delete);
            assert_eq!(on.like_delta + off.like_delta, 0);
            assert_eq!(on.dislike_delta + off.dislike_delta, 0);
        }
    }

    #[test]
    fn test_state_kind_round_trip() {
        for state in [ReactionState::None, ReactionState::Liked, ReactionState::Disliked] {
            assert_eq!(ReactionState::from_kind(state.kind()), state);
        }
    }

    fn kind() -> impl Strategy<Value = ReactionKind> {
        prop_oneof![Just(ReactionKind::Like), Just(ReactionKind::Dislike)]
    }

    proptest! {
        // Counters always equal the number of live reactions of each kind.
        #[test]
        fn prop_counters_match_live_reactions(
            requests in prop::collection::vec((0..6usize, kind()), 0..200)
        ) {
            let mut states: HashMap<usize, ReactionState> = HashMap::new();
            let mut counters = Counters::default();

            for (member, kind) in requests {
                let state = states.entry(member).or_default();
                let step = state.apply(kind);
                counters = counters.apply(&step).unwrap();
                *state = step.next;
            }

            let likes = states.values().filter(|s| **s == ReactionState::Liked).count() as u64;
            let dislikes = states.values().filter(|s| **s == ReactionState::Disliked).count() as u64;
            prop_assert_eq!(counters.like_count, likes);
            prop_assert_eq!(counters.dislike_count, dislikes);
        }

        // The change is consistent with the states on either side.
        #[test]
        fn prop_change_matches_states(start in prop_oneof![
            Just(ReactionState::None),
            Just(ReactionState::Liked),
            Just(ReactionState::Disliked),
        ], requested in kind()) {
            let step = start.apply(requested);
            match step.change {
                Change::Insert(k) => {
                    prop_assert_eq!(start, ReactionState::None);
                    prop_assert_eq!(step.next.kind(), Some(k));
                }
                Change::Update(k) => {
                    prop_assert!(start.kind().is_some());
                    prop_assert_ne!(start.kind(), Some(k));
                    prop_assert_eq!(step.next.kind(), Some(k));
                }
                Change::Delete => {
                    prop_assert_eq!(start.kind(), Some(requested));
                    prop_assert_eq!(step.next, ReactionState::None);
                }
            }
        }
    }
}
