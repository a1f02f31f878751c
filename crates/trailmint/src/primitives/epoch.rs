use core::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// A ledger epoch: the ledger's discrete unit of time.
///
/// Login sessions are bounded by an epoch, not by wall-clock time: a
/// composite signature carrying `max_epoch = e` is accepted while the
/// ledger's current epoch is at most `e`.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Deserialize,
    Serialize,
    BorshDeserialize,
    BorshSerialize,
)]
#[serde(transparent)]
pub struct Epoch(u64);

impl Epoch {
    /// `self + lookahead`, or `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, lookahead: u64) -> Option<Self> {
        match self.0.checked_add(lookahead) {
            Some(epoch) => Some(Self(epoch)),
            None => None,
        }
    }

    /// Whether a session bounded by `self` has lapsed at `current`.
    #[must_use]
    pub const fn has_elapsed_at(self, current: Self) -> bool {
        current.0 > self.0
    }
}

impl From<u64> for Epoch {
    fn from(epoch: u64) -> Self {
        Self(epoch)
    }
}

impl From<Epoch> for u64 {
    fn from(epoch: Epoch) -> Self {
        epoch.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_epoch_is_inclusive() {
        let max = Epoch::from(12);
        assert!(!max.has_elapsed_at(Epoch::from(11)));
        assert!(!max.has_elapsed_at(Epoch::from(12)));
        assert!(max.has_elapsed_at(Epoch::from(13)));
    }

    #[test]
    fn lookahead_overflow_is_none() {
        assert_eq!(Epoch::from(u64::MAX).checked_add(1), None);
        assert_eq!(Epoch::from(5).checked_add(10), Some(Epoch::from(15)));
    }
}
