//! Post-write hooks.
//!
//! Grading a claim can invalidate grades derived from it: an atomic child
//! feeds its composite parent's rollup. Rather than recursing from inside a
//! write, each operation collects the follow-ups it implies in a
//! [`PostWriteQueue`] and drains it once its own writes are done, inside the
//! same transaction.

use std::collections::{HashSet, VecDeque};

use crate::evidence::{Claim, ClaimId};

/// Derived write owed after a grade change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum PostWrite {
    /// Recompute a composite's grade from its atomic children
    Rollup(ClaimId),
}

/// Ordered, de-duplicated queue of pending hooks.
///
/// A hook runs at most once per queue, which also bounds the cascade if the
/// parent chain ever loops.
#[derive(Debug, Default)]
pub(crate) struct PostWriteQueue {
    pending: VecDeque<PostWrite>,
    done: HashSet<PostWrite>,
}

impl PostWriteQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue the follow-ups implied by a new grade on `claim`.
    pub(crate) fn graded(&mut self, claim: &Claim) {
        if !claim.is_atomic() {
            return;
        }
        if let Some(parent) = claim.parent_claim_id {
            self.push(PostWrite::Rollup(parent));
        }
    }

    fn push(&mut self, hook: PostWrite) {
        if !self.done.contains(&hook) && !self.pending.contains(&hook) {
            self.pending.push_back(hook);
        }
    }

    pub(crate) fn next(&mut self) -> Option<PostWrite> {
        let hook = self.pending.pop_front()?;
        self.done.insert(hook);
        Some(hook)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
