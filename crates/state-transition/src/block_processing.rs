//! Block application: stages 2–6 of the transition.

use sha2::{Digest, Sha256};
use tracing::warn;
use viridian_types::{
    Hash256,
    blob::kzg_to_versioned_hash,
    block::{BeaconBlockHeader, SignedBeaconBlock, verify_block_signature},
    chain_spec::{ChainSpec, DomainType},
    execution_payload::ExecutionPayload,
    signing::compute_signing_root,
    slot::Epoch,
    state::BeaconState,
    validator::Validator,
    withdrawal::Withdrawal,
};

use crate::{Context, PayloadVerdict, error::StateTransitionError};

/// Blob gas charged per blob, per EIP-4844.
const GAS_PER_BLOB: u64 = 131_072;

/// Returns the engine's verdict on the execution payload; everything else a
/// block changes lands in `state`.
pub async fn process_block(
    spec: &ChainSpec,
    state: &mut BeaconState,
    block: &SignedBeaconBlock,
    ctx: &Context,
) -> Result<PayloadVerdict, StateTransitionError> {
    process_block_header(spec, state, block, ctx)?;

    // The payload's prev-randao is checked against the epoch mix as it stood
    // when the payload was built, i.e. before this block's own reveal lands.
    let epoch = state.current_epoch(spec.slots_per_epoch);
    let mix_before_reveal = state.randao_mix(epoch);

    process_randao(spec, state, block, epoch, mix_before_reveal, ctx)?;
    let verdict =
        process_execution_payload(spec, state, block, mix_before_reveal, ctx).await?;
    process_deposits(spec, state, block, ctx)?;
    process_withdrawals(spec, state, &block.message.body.execution_payload)?;

    Ok(verdict)
}

fn process_block_header(
    spec: &ChainSpec,
    state: &mut BeaconState,
    block: &SignedBeaconBlock,
    ctx: &Context,
) -> Result<(), StateTransitionError> {
    let message = &block.message;

    if message.slot != state.slot {
        return Err(StateTransitionError::SlotMismatch {
            block: message.slot,
            state: state.slot,
        });
    }

    if message.slot <= state.latest_block_header.slot {
        return Err(StateTransitionError::BlockNotNewer {
            block: message.slot,
            latest: state.latest_block_header.slot,
        });
    }

    if ctx.verify_proposer {
        if let Some(expected) = ctx.expected_proposer {
            if message.proposer_index != expected {
                return Err(StateTransitionError::ProposerMismatch {
                    in_block: message.proposer_index,
                    expected,
                });
            }
        }
    }

    let proposer = state
        .validators
        .get(message.proposer_index as usize)
        .ok_or(StateTransitionError::UnknownProposer(message.proposer_index))?;
    if proposer.slashed {
        return Err(StateTransitionError::ProposerSlashed(message.proposer_index));
    }

    // Parent linkage against the latest header; its state root was patched in
    // during slot processing, so the root is final here.
    let expected_parent = state.latest_block_root();
    if message.parent_root != expected_parent {
        return Err(StateTransitionError::ParentRootMismatch {
            in_block: message.parent_root,
            expected: expected_parent,
        });
    }

    if ctx.verify_signatures {
        let proposer_pubkey = proposer.pubkey;
        if !verify_block_signature(block, &proposer_pubkey, spec, state.genesis_validators_root) {
            return Err(StateTransitionError::InvalidBlockSignature(message.slot));
        }
    }

    // Stamp the header with a zero state root; the next process_slot patches
    // in the post-state root once it is known.
    state.latest_block_header = BeaconBlockHeader {
        slot: message.slot,
        proposer_index: message.proposer_index,
        parent_root: message.parent_root,
        state_root: Hash256::ZERO,
        body_root: message.body.hash_tree_root(),
    };

    Ok(())
}

fn process_randao(
    spec: &ChainSpec,
    state: &mut BeaconState,
    block: &SignedBeaconBlock,
    epoch: Epoch,
    mix_before_reveal: Hash256,
    ctx: &Context,
) -> Result<(), StateTransitionError> {
    let reveal = &block.message.body.randao_reveal;

    if ctx.verify_signatures {
        let proposer = &state.validators[block.message.proposer_index as usize];
        let fork = spec.active_fork_for_slot(block.slot());
        let domain =
            spec.compute_domain(DomainType::Randao, fork, state.genesis_validators_root);
        // hash_tree_root(epoch): the u64 little-endian padded to a chunk.
        let mut epoch_root = Hash256::ZERO;
        epoch_root.0[..8].copy_from_slice(&epoch.as_u64().to_le_bytes());
        let signing_root = compute_signing_root(epoch_root, domain);

        if !reveal.verify(&proposer.pubkey, signing_root.as_slice()) {
            return Err(StateTransitionError::InvalidRandaoReveal(epoch));
        }
    }

    // mix' = mix xor sha256(reveal)
    let reveal_digest = Sha256::digest(reveal.as_bytes());
    let mut mixed = mix_before_reveal;
    for (byte, digest_byte) in mixed.0.iter_mut().zip(reveal_digest.iter()) {
        *byte ^= digest_byte;
    }
    state.set_randao_mix(epoch, mixed);

    Ok(())
}

async fn process_execution_payload(
    spec: &ChainSpec,
    state: &mut BeaconState,
    block: &SignedBeaconBlock,
    prev_randao_expected: Hash256,
    ctx: &Context,
) -> Result<PayloadVerdict, StateTransitionError> {
    let body = &block.message.body;
    let payload = &body.execution_payload;

    if payload.parent_hash != state.latest_execution_payload_header.block_hash {
        return Err(StateTransitionError::PayloadParentHashMismatch {
            in_block: payload.parent_hash,
            in_state: state.latest_execution_payload_header.block_hash,
        });
    }

    let previous_timestamp = state.latest_execution_payload_header.timestamp;
    if payload.timestamp <= previous_timestamp {
        return Err(StateTransitionError::PayloadTimestampNotMonotonic {
            in_block: payload.timestamp,
            previous: previous_timestamp,
        });
    }

    if payload.prev_randao != prev_randao_expected {
        return Err(StateTransitionError::PayloadPrevRandaoMismatch {
            in_block: payload.prev_randao,
            expected: prev_randao_expected,
        });
    }

    let commitment_count = body.blob_kzg_commitments.len();
    if commitment_count as u64 > spec.max_blobs_per_block {
        return Err(StateTransitionError::TooManyBlobCommitments {
            count: commitment_count,
            max: spec.max_blobs_per_block,
        });
    }
    if payload.blob_gas_used != commitment_count as u64 * GAS_PER_BLOB {
        return Err(StateTransitionError::BlobGasMismatch {
            in_block: payload.blob_gas_used,
            commitments: commitment_count,
        });
    }

    let versioned_hashes =
        body.blob_kzg_commitments.iter().map(kzg_to_versioned_hash).collect();
    let verdict = ctx
        .executor
        .notify_new_payload(payload, versioned_hashes, block.message.parent_root)
        .await?;
    if verdict == PayloadVerdict::Optimistic {
        warn!(slot = %block.slot(), "engine deferred payload judgement, proceeding optimistically");
    }

    state.latest_execution_payload_header = payload.to_header();
    Ok(verdict)
}

fn process_deposits(
    spec: &ChainSpec,
    state: &mut BeaconState,
    block: &SignedBeaconBlock,
    ctx: &Context,
) -> Result<(), StateTransitionError> {
    let body = &block.message.body;

    if body.deposits.len() as u64 > spec.max_deposits_per_block {
        return Err(StateTransitionError::TooManyDeposits {
            count: body.deposits.len(),
            max: spec.max_deposits_per_block,
        });
    }

    // Adopt the block's view of the deposit contract before verifying the
    // inclusion proofs against it.
    state.eth1_data = body.eth1_data.clone();

    for deposit in body.deposits.iter() {
        if deposit.index != state.eth1_deposit_index {
            return Err(StateTransitionError::DepositIndexMismatch {
                in_block: deposit.index,
                expected: state.eth1_deposit_index,
            });
        }

        if !deposit.verify_inclusion(state.eth1_data.deposit_root) {
            return Err(StateTransitionError::InvalidDepositProof { index: deposit.index });
        }

        apply_deposit(spec, state, deposit, ctx);
        state.eth1_deposit_index += 1;
    }

    Ok(())
}

/// Top up an existing validator or admit a new one. A new-validator deposit
/// with a bad proof-of-possession signature is skipped, not fatal: anyone can
/// send garbage to the deposit contract.
fn apply_deposit(
    spec: &ChainSpec,
    state: &mut BeaconState,
    deposit: &viridian_types::deposit::Deposit,
    ctx: &Context,
) {
    if let Some(index) = state.validator_index_by_pubkey(&deposit.pubkey) {
        state.increase_balance(index, deposit.amount);
        return;
    }

    if ctx.verify_signatures && !deposit.verify_signature(spec) {
        warn!(index = deposit.index, "skipping deposit with invalid signature");
        return;
    }

    let validator = Validator::from_deposit(
        deposit.pubkey,
        deposit.withdrawal_credentials,
        deposit.amount,
        spec,
    );
    state.validators.push(validator).expect("validator registry limit is 2^40");
    state.balances.push(deposit.amount).expect("balances limit is 2^40");
}

/// The withdrawal sweep: walk the registry from
/// `next_withdrawal_validator_index`, collecting full withdrawals for exited
/// validators past their withdrawable epoch and partial withdrawals for
/// balances above the effective ceiling.
pub fn expected_withdrawals(spec: &ChainSpec, state: &BeaconState) -> Vec<Withdrawal> {
    let epoch = state.current_epoch(spec.slots_per_epoch);
    let validator_count = state.validators.len() as u64;
    if validator_count == 0 {
        return Vec::new();
    }

    let mut withdrawals = Vec::new();
    let mut withdrawal_index = state.next_withdrawal_index;
    let mut validator_index = state.next_withdrawal_validator_index;

    let sweep_bound = std::cmp::min(validator_count, spec.max_validators_per_withdrawals_sweep);
    for _ in 0..sweep_bound {
        let validator = &state.validators[validator_index as usize];
        let balance = state.balance(validator_index as usize);

        if validator.is_fully_withdrawable_at(balance, epoch) {
            withdrawals.push(Withdrawal {
                index: withdrawal_index,
                validator_index,
                address: validator.withdrawal_address(),
                amount: balance,
            });
            withdrawal_index += 1;
        } else if validator.is_partially_withdrawable(balance, spec) {
            withdrawals.push(Withdrawal {
                index: withdrawal_index,
                validator_index,
                address: validator.withdrawal_address(),
                amount: balance - spec.max_effective_balance,
            });
            withdrawal_index += 1;
        }

        if withdrawals.len() as u64 == spec.max_withdrawals_per_payload {
            break;
        }
        validator_index = (validator_index + 1) % validator_count;
    }

    withdrawals
}

fn process_withdrawals(
    spec: &ChainSpec,
    state: &mut BeaconState,
    payload: &ExecutionPayload,
) -> Result<(), StateTransitionError> {
    let expected = expected_withdrawals(spec, state);

    // Bit-exact equality with what the payload carries.
    let in_payload: Vec<Withdrawal> = payload.withdrawals.to_vec();
    if in_payload != expected {
        return Err(StateTransitionError::WithdrawalsMismatch { slot: state.slot });
    }

    for withdrawal in &expected {
        state.decrease_balance(withdrawal.validator_index as usize, withdrawal.amount);
    }

    let validator_count = state.validators.len() as u64;
    if validator_count == 0 {
        return Ok(());
    }

    state.next_withdrawal_index += expected.len() as u64;
    state.next_withdrawal_validator_index =
        if expected.len() as u64 == spec.max_withdrawals_per_payload {
            // Sweep stopped at the cap: resume right after the last one paid.
            (expected.last().expect("nonempty at cap").validator_index + 1) % validator_count
        } else {
            // Sweep ran its full bound.
            (state.next_withdrawal_validator_index + spec.max_validators_per_withdrawals_sweep) %
                validator_count
        };

    Ok(())
}

#[cfg(test)]
mod tests {
    use viridian_types::{
        Hash256,
        crypto::BlsSecretKey,
        slot::{Epoch, Slot},
        state::{Balances, Validators},
    };

    use super::*;

    fn spec() -> ChainSpec {
        ChainSpec::devnet()
    }

    fn withdrawable_validator(seed: u8, spec: &ChainSpec) -> Validator {
        let pubkey = BlsSecretKey::from_ikm(&[seed; 32]).unwrap().public_key();
        let mut credentials = Hash256::ZERO;
        credentials.0[0] = 0x01;
        credentials.0[31] = seed;
        let mut v = Validator::from_deposit(pubkey, credentials, spec.max_effective_balance, spec);
        v.activation_epoch = Epoch::new(0);
        v
    }

    fn state_with_balances(balances: Vec<u64>, spec: &ChainSpec) -> BeaconState {
        let validators: Vec<Validator> =
            (0..balances.len()).map(|i| withdrawable_validator(i as u8 + 1, spec)).collect();
        BeaconState {
            slot: Slot::new(16),
            validators: Validators::new(validators).unwrap(),
            balances: Balances::new(balances).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn sweep_collects_partial_withdrawals_in_index_order() {
        let spec = spec();
        let over = spec.max_effective_balance + 5_000_000_000;
        let state = state_with_balances(vec![over, spec.max_effective_balance, over], &spec);

        let withdrawals = expected_withdrawals(&spec, &state);
        assert_eq!(withdrawals.len(), 2);
        assert_eq!(withdrawals[0].validator_index, 0);
        assert_eq!(withdrawals[0].amount, 5_000_000_000);
        assert_eq!(withdrawals[1].validator_index, 2);
        assert_eq!(withdrawals[0].index, 0);
        assert_eq!(withdrawals[1].index, 1);
    }

    #[test]
    fn sweep_collects_full_withdrawal_for_exited_validator() {
        let spec = spec();
        let mut state = state_with_balances(vec![spec.max_effective_balance], &spec);
        state.validators[0].withdrawable_epoch = Epoch::new(0);

        let withdrawals = expected_withdrawals(&spec, &state);
        assert_eq!(withdrawals.len(), 1);
        assert_eq!(withdrawals[0].amount, spec.max_effective_balance);
    }

    #[test]
    fn sweep_starts_at_next_withdrawal_validator_index() {
        let spec = spec();
        let over = spec.max_effective_balance + 1_000_000_000;
        let mut state = state_with_balances(vec![over, over, over], &spec);
        state.next_withdrawal_validator_index = 1;

        let withdrawals = expected_withdrawals(&spec, &state);
        assert_eq!(withdrawals[0].validator_index, 1);
        assert_eq!(withdrawals[1].validator_index, 2);
        assert_eq!(withdrawals[2].validator_index, 0);
    }

    #[test]
    fn mismatched_payload_withdrawals_fail() {
        let spec = spec();
        let over = spec.max_effective_balance + 1_000_000_000;
        let mut state = state_with_balances(vec![over], &spec);

        // Payload claims no withdrawals; the sweep expects one.
        let payload = ExecutionPayload::default();
        assert!(matches!(
            process_withdrawals(&spec, &mut state, &payload),
            Err(StateTransitionError::WithdrawalsMismatch { .. })
        ));
    }

    #[test]
    fn applied_withdrawals_deduct_balances_and_advance_indices() {
        let spec = spec();
        let over = spec.max_effective_balance + 2_000_000_000;
        let mut state = state_with_balances(vec![over, spec.max_effective_balance], &spec);

        let expected = expected_withdrawals(&spec, &state);
        let mut payload = ExecutionPayload::default();
        payload.withdrawals =
            viridian_types::execution_payload::Withdrawals::new(expected).unwrap();

        process_withdrawals(&spec, &mut state, &payload).unwrap();
        assert_eq!(state.balance(0), spec.max_effective_balance);
        assert_eq!(state.next_withdrawal_index, 1);
    }
}
