//! Slot and epoch arithmetic.
//!
//! A [`Slot`] is a monotonically increasing 64-bit proposal counter; an
//! [`Epoch`] is a fixed window of slots at which validator-set bookkeeping
//! happens. Both are transparent newtypes over `u64` so they SSZ-encode and
//! merkleize exactly like the raw integer.

use std::fmt;

use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

/// Discrete proposal opportunity, one per consensus height.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Encode,
    Decode,
    TreeHash,
)]
#[ssz(struct_behaviour = "transparent")]
#[tree_hash(struct_behaviour = "transparent")]
#[serde(transparent)]
pub struct Slot(u64);

/// Fixed window of [`Slot`]s at which epoch processing runs.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Encode,
    Decode,
    TreeHash,
)]
#[ssz(struct_behaviour = "transparent")]
#[tree_hash(struct_behaviour = "transparent")]
#[serde(transparent)]
pub struct Epoch(u64);

impl Slot {
    pub const fn new(slot: u64) -> Self {
        Self(slot)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The epoch this slot belongs to.
    pub const fn epoch(self, slots_per_epoch: u64) -> Epoch {
        Epoch(self.0 / slots_per_epoch)
    }

    /// True when this slot is the first slot of its epoch.
    pub const fn is_epoch_start(self, slots_per_epoch: u64) -> bool {
        self.0 % slots_per_epoch == 0
    }

    pub const fn saturating_sub(self, rhs: u64) -> Self {
        Self(self.0.saturating_sub(rhs))
    }

    /// Next slot. Panics on `u64::MAX`, which is unreachable for any chain
    /// younger than the heat death of the universe.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Epoch {
    pub const fn new(epoch: u64) -> Self {
        Self(epoch)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// First slot of this epoch.
    pub const fn start_slot(self, slots_per_epoch: u64) -> Slot {
        Slot(self.0 * slots_per_epoch)
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn saturating_sub(self, rhs: u64) -> Self {
        Self(self.0.saturating_sub(rhs))
    }
}

/// Epoch sentinel meaning "never": pending activations, exits and withdrawals
/// are parked here until scheduled.
pub const FAR_FUTURE_EPOCH: Epoch = Epoch(u64::MAX);

impl From<u64> for Slot {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<u64> for Epoch {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::ops::Add<u64> for Slot {
    type Output = Slot;

    fn add(self, rhs: u64) -> Slot {
        Slot(self.0 + rhs)
    }
}

impl std::ops::Add<u64> for Epoch {
    type Output = Epoch;

    fn add(self, rhs: u64) -> Epoch {
        Epoch(self.0 + rhs)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
