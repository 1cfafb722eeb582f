//! Genesis path: build the initial state from the genesis deposit set.

use viridian_types::{
    Hash256, ValidatorUpdate,
    block::{BeaconBlockBody, BeaconBlockHeader},
    chain_spec::ChainSpec,
    deposit::deposit_tree,
    eth1::Eth1Data,
    genesis::Genesis,
    slot::{Epoch, Slot},
    state::{BeaconState, EPOCHS_PER_HISTORICAL_VECTOR, ForkInfo},
    validator::Validator,
};

use crate::error::StateTransitionError;

/// Build the genesis [`BeaconState`] and the initial validator set for the
/// host consensus.
///
/// Genesis deposits come from the operator-distributed genesis file rather
/// than the wire, so inclusion proofs are recomputed here instead of
/// verified; the derived deposit root is what later blocks must prove
/// against.
pub fn initialize_state_from_genesis(
    spec: &ChainSpec,
    genesis: &Genesis,
) -> Result<(BeaconState, Vec<ValidatorUpdate>), StateTransitionError> {
    let mut state = BeaconState {
        slot: Slot::new(0),
        fork: ForkInfo::from_versions(
            spec.genesis_fork_version,
            spec.genesis_fork_version,
            Epoch::new(0),
        ),
        latest_execution_payload_header: genesis.execution_payload_header.clone(),
        ..Default::default()
    };

    // The randao accumulator seeds from the anchor execution block hash.
    for epoch in 0..EPOCHS_PER_HISTORICAL_VECTOR {
        state.set_randao_mix(Epoch::new(epoch as u64), genesis.eth1_block_hash);
    }

    let leaves: Vec<Hash256> = genesis.deposits.iter().map(|d| d.leaf_root()).collect();
    let (deposit_root, _) = deposit_tree(&leaves);
    state.eth1_data = Eth1Data {
        deposit_root,
        deposit_count: genesis.deposits.len() as u64,
        block_hash: genesis.eth1_block_hash,
    };

    for deposit in &genesis.deposits {
        if deposit.index != state.eth1_deposit_index {
            return Err(StateTransitionError::DepositIndexMismatch {
                in_block: deposit.index,
                expected: state.eth1_deposit_index,
            });
        }

        match state.validator_index_by_pubkey(&deposit.pubkey) {
            Some(index) => state.increase_balance(index, deposit.amount),
            None => {
                let mut validator = Validator::from_deposit(
                    deposit.pubkey,
                    deposit.withdrawal_credentials,
                    deposit.amount,
                    spec,
                );
                // Genesis validators are live from epoch zero.
                validator.activation_eligibility_epoch = Epoch::new(0);
                validator.activation_epoch = Epoch::new(0);
                state.validators.push(validator).expect("registry limit");
                state.balances.push(deposit.amount).expect("balances limit");
            }
        }
        state.eth1_deposit_index += 1;
    }

    state.genesis_validators_root = Hash256::from_slice(
        tree_hash::TreeHash::tree_hash_root(&state.validators).as_ref(),
    );

    state.latest_block_header = BeaconBlockHeader {
        slot: Slot::new(0),
        proposer_index: 0,
        parent_root: Hash256::ZERO,
        state_root: Hash256::ZERO,
        body_root: BeaconBlockBody::default().hash_tree_root(),
    };

    let updates = state
        .validators
        .iter()
        .map(|v| ValidatorUpdate { pubkey: v.pubkey, effective_balance: v.effective_balance })
        .collect();

    Ok((state, updates))
}
