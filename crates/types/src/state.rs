//! The beacon state.
//!
//! Exclusively owned by the storage backend; the state transition receives a
//! mutable snapshot scoped to a single call and the caller commits or discards
//! it. Accessors here are the narrow surface the state transition needs — no
//! component reaches into the raw vectors directly.

use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{
    FixedVector, VariableList,
    typenum::{U4, U8192, U65536, U1099511627776},
};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

use crate::{
    ExecutionHash, Gwei, Hash256,
    block::BeaconBlockHeader,
    chain_spec::Version,
    crypto::BlsPublicKey,
    eth1::Eth1Data,
    execution_payload::ExecutionPayloadHeader,
    slot::{Epoch, Slot},
    validator::Validator,
};

/// Length of the rolling block/state root vectors.
pub const SLOTS_PER_HISTORICAL_ROOT: usize = 8192;

/// Length of the randao mix ring buffer.
pub const EPOCHS_PER_HISTORICAL_VECTOR: usize = 65536;

/// Length of the slashings ring buffer.
pub const EPOCHS_PER_SLASHINGS_VECTOR: usize = 8192;

pub type Validators = VariableList<Validator, U1099511627776>;
pub type Balances = VariableList<u64, U1099511627776>;

/// Fork bookkeeping carried in the state; versions feed signing domains.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct ForkInfo {
    pub previous_version: FixedVector<u8, U4>,
    pub current_version: FixedVector<u8, U4>,
    pub epoch: Epoch,
}

impl ForkInfo {
    pub fn from_versions(previous: Version, current: Version, epoch: Epoch) -> Self {
        Self {
            previous_version: FixedVector::new(previous.to_vec()).expect("4 bytes"),
            current_version: FixedVector::new(current.to_vec()).expect("4 bytes"),
            epoch,
        }
    }

    pub fn current(&self) -> Version {
        let mut version = [0u8; 4];
        version.copy_from_slice(&self.current_version);
        version
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BeaconState {
    pub slot: Slot,
    pub fork: ForkInfo,
    pub genesis_validators_root: Hash256,
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: FixedVector<Hash256, U8192>,
    pub state_roots: FixedVector<Hash256, U8192>,
    pub eth1_data: Eth1Data,
    pub eth1_deposit_index: u64,
    pub latest_execution_payload_header: ExecutionPayloadHeader,
    pub validators: Validators,
    pub balances: Balances,
    pub randao_mixes: FixedVector<Hash256, U65536>,
    pub slashings: FixedVector<u64, U8192>,
    pub next_withdrawal_index: u64,
    pub next_withdrawal_validator_index: u64,
    pub total_slashing: Gwei,
}

impl BeaconState {
    pub fn hash_tree_root(&self) -> Hash256 {
        Hash256::from_slice(self.tree_hash_root().as_ref())
    }

    pub fn current_epoch(&self, slots_per_epoch: u64) -> Epoch {
        self.slot.epoch(slots_per_epoch)
    }

    pub fn randao_mix(&self, epoch: Epoch) -> Hash256 {
        self.randao_mixes[epoch.as_usize() % EPOCHS_PER_HISTORICAL_VECTOR]
    }

    pub fn set_randao_mix(&mut self, epoch: Epoch, mix: Hash256) {
        self.randao_mixes[epoch.as_usize() % EPOCHS_PER_HISTORICAL_VECTOR] = mix;
    }

    pub fn set_block_root(&mut self, slot: Slot, root: Hash256) {
        self.block_roots[slot.as_usize() % SLOTS_PER_HISTORICAL_ROOT] = root;
    }

    pub fn set_state_root(&mut self, slot: Slot, root: Hash256) {
        self.state_roots[slot.as_usize() % SLOTS_PER_HISTORICAL_ROOT] = root;
    }

    pub fn slashing_at(&self, epoch: Epoch) -> u64 {
        self.slashings[epoch.as_usize() % EPOCHS_PER_SLASHINGS_VECTOR]
    }

    pub fn reset_slashing_at(&mut self, epoch: Epoch) {
        self.slashings[epoch.as_usize() % EPOCHS_PER_SLASHINGS_VECTOR] = 0;
    }

    pub fn balance(&self, validator_index: usize) -> Gwei {
        self.balances[validator_index]
    }

    pub fn increase_balance(&mut self, validator_index: usize, delta: Gwei) {
        self.balances[validator_index] = self.balances[validator_index].saturating_add(delta);
    }

    pub fn decrease_balance(&mut self, validator_index: usize, delta: Gwei) {
        self.balances[validator_index] = self.balances[validator_index].saturating_sub(delta);
    }

    /// Linear scan by pubkey. Deterministic and adequate at the validator
    /// counts this chain runs with.
    pub fn validator_index_by_pubkey(&self, pubkey: &BlsPublicKey) -> Option<usize> {
        self.validators.iter().position(|v| &v.pubkey == pubkey)
    }

    /// Root of the latest block header with the post-state root patched in.
    ///
    /// Between `process_slot` and body application the stored header carries a
    /// zero state root; anyone deriving a parent root must see the patched
    /// form, never the zero placeholder.
    pub fn latest_block_root(&self) -> Hash256 {
        let mut header = self.latest_block_header.clone();
        if header.state_root == Hash256::ZERO {
            header.state_root = self.hash_tree_root();
        }
        header.hash_tree_root()
    }

    /// Hash of the execution block the consensus head currently points at.
    pub fn latest_execution_block_hash(&self) -> ExecutionHash {
        self.latest_execution_payload_header.block_hash
    }
}

#[cfg(test)]
mod tests {
    use ssz::{Decode, Encode};

    use super::*;

    fn empty_state() -> BeaconState {
        BeaconState {
            block_roots: FixedVector::new(vec![Hash256::ZERO; SLOTS_PER_HISTORICAL_ROOT])
                .unwrap(),
            state_roots: FixedVector::new(vec![Hash256::ZERO; SLOTS_PER_HISTORICAL_ROOT])
                .unwrap(),
            randao_mixes: FixedVector::new(vec![Hash256::ZERO; EPOCHS_PER_HISTORICAL_VECTOR])
                .unwrap(),
            slashings: FixedVector::new(vec![0u64; EPOCHS_PER_SLASHINGS_VECTOR]).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn randao_mix_ring_indexing() {
        let mut state = empty_state();
        let epoch = Epoch::new(3);
        state.set_randao_mix(epoch, Hash256::repeat_byte(7));
        assert_eq!(state.randao_mix(epoch), Hash256::repeat_byte(7));
        assert_eq!(
            state.randao_mix(Epoch::new(3 + EPOCHS_PER_HISTORICAL_VECTOR as u64)),
            Hash256::repeat_byte(7)
        );
    }

    #[test]
    fn balance_arithmetic_saturates() {
        let mut state = empty_state();
        state.validators = Validators::empty();
        state.balances = Balances::new(vec![10]).unwrap();

        state.decrease_balance(0, 25);
        assert_eq!(state.balance(0), 0);
        state.increase_balance(0, 5);
        assert_eq!(state.balance(0), 5);
    }

    #[test]
    fn latest_block_root_patches_zero_state_root() {
        let mut state = empty_state();
        state.latest_block_header =
            BeaconBlockHeader { slot: Slot::new(1), ..Default::default() };

        let patched = state.latest_block_root();

        let mut explicit = state.latest_block_header.clone();
        explicit.state_root = state.hash_tree_root();
        assert_eq!(patched, explicit.hash_tree_root());
    }

    #[test]
    fn ssz_roundtrip() {
        let state = empty_state();
        let decoded = BeaconState::from_ssz_bytes(&state.as_ssz_bytes()).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(decoded.hash_tree_root(), state.hash_tree_root());
    }
}
