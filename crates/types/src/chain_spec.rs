//! Chain specification: protocol constants and the fork schedule.

use serde::{Deserialize, Serialize};

use crate::{
    Hash256,
    slot::{Epoch, Slot},
};

/// A 4-byte fork version as used in signing domains.
pub type Version = [u8; 4];

/// Fork discriminator decoded from the slot. SSZ decoders and the state
/// transition switch on this tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fork {
    Deneb,
}

/// Signing-domain separators, per the consensus spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DomainType {
    BeaconProposer,
    Randao,
    Deposit,
}

impl DomainType {
    pub const fn as_bytes(self) -> [u8; 4] {
        match self {
            Self::BeaconProposer => [0x00, 0x00, 0x00, 0x00],
            Self::Randao => [0x02, 0x00, 0x00, 0x00],
            Self::Deposit => [0x03, 0x00, 0x00, 0x00],
        }
    }
}

/// Protocol constants for a viridian chain.
///
/// Loaded from the node configuration; [`ChainSpec::devnet`] provides the
/// defaults used by local networks and tests. Constants that determine SSZ
/// layouts (list limits, vector lengths) are type-level and live in the
/// container modules; everything here is a runtime policy value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSpec {
    // Time
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
    pub genesis_time: u64,

    // Forks
    pub genesis_fork_version: Version,
    pub deneb_fork_epoch: Epoch,

    // Validators and balances
    pub max_effective_balance: u64,
    pub effective_balance_increment: u64,
    pub ejection_balance: u64,
    pub min_activation_balance: u64,
    pub hysteresis_quotient: u64,
    pub hysteresis_downward_multiplier: u64,
    pub hysteresis_upward_multiplier: u64,

    // Blocks
    pub max_deposits_per_block: u64,
    pub max_blobs_per_block: u64,
    pub max_withdrawals_per_payload: u64,
    pub max_validators_per_withdrawals_sweep: u64,

    // Deposits
    pub eth1_follow_distance: u64,

    // Data availability
    pub min_epochs_for_blob_sidecars_requests: u64,
}

impl ChainSpec {
    /// Devnet parameters. Epoch bookkeeping is compressed (8 slots per epoch)
    /// so tests cross epoch boundaries quickly.
    pub fn devnet() -> Self {
        Self {
            seconds_per_slot: 2,
            slots_per_epoch: 8,
            genesis_time: 0,
            genesis_fork_version: [0, 0, 0, 0],
            deneb_fork_epoch: Epoch::new(0),
            max_effective_balance: 32_000_000_000,
            effective_balance_increment: 1_000_000_000,
            ejection_balance: 16_000_000_000,
            min_activation_balance: 32_000_000_000,
            hysteresis_quotient: 4,
            hysteresis_downward_multiplier: 1,
            hysteresis_upward_multiplier: 5,
            max_deposits_per_block: 16,
            max_blobs_per_block: 6,
            max_withdrawals_per_payload: 16,
            max_validators_per_withdrawals_sweep: 16_384,
            eth1_follow_distance: 8,
            min_epochs_for_blob_sidecars_requests: 4096,
        }
    }

    /// The fork in force at `slot`. Deneb is the genesis fork today; new forks
    /// extend the match with their activation epochs.
    pub fn active_fork_for_slot(&self, slot: Slot) -> Fork {
        let _epoch = slot.epoch(self.slots_per_epoch);
        Fork::Deneb
    }

    pub fn fork_version(&self, fork: Fork) -> Version {
        match fork {
            Fork::Deneb => self.genesis_fork_version,
        }
    }

    pub fn epoch_of(&self, slot: Slot) -> Epoch {
        slot.epoch(self.slots_per_epoch)
    }

    /// Wall-clock timestamp of a slot, anchored at genesis.
    pub fn timestamp_at_slot(&self, slot: Slot) -> u64 {
        self.genesis_time + slot.as_u64() * self.seconds_per_slot
    }

    /// Slots retained in the DA window before sidecars become prunable.
    pub fn blob_retention_slots(&self) -> u64 {
        self.min_epochs_for_blob_sidecars_requests * self.slots_per_epoch
    }

    /// Signing domain: `domain_type ++ fork_data_root(fork_version, gvr)[..28]`.
    pub fn compute_domain(
        &self,
        domain_type: DomainType,
        fork: Fork,
        genesis_validators_root: Hash256,
    ) -> Hash256 {
        let fork_data_root =
            crate::signing::fork_data_root(self.fork_version(fork), genesis_validators_root);
        let mut domain = [0u8; 32];
        domain[..4].copy_from_slice(&domain_type.as_bytes());
        domain[4..].copy_from_slice(&fork_data_root[..28]);
        Hash256::from(domain)
    }
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self::devnet()
    }
}
