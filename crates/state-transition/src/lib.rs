//! The state-transition processor.
//!
//! `transition(state, block, ctx)` is the only place the canonical beacon
//! state changes. It is deterministic by construction: no map iteration, no
//! clock reads, no floating point, and ties broken by ascending validator
//! index everywhere. The single suspension point is the engine-API call that
//! validates the execution payload.
//!
//! Stage order, each able to fail the whole transition:
//! slots → header → randao → execution payload → deposits → withdrawals →
//! validator-set delta.

mod block_processing;
mod context;
mod epoch_processing;
mod error;
mod genesis;
mod slot_processing;

pub use block_processing::expected_withdrawals;
pub use context::{Context, NoopExecutor, PayloadExecutor, PayloadVerdict};
pub use error::StateTransitionError;
pub use genesis::initialize_state_from_genesis;

use tracing::debug;
use viridian_types::{
    Gwei, ValidatorUpdate,
    block::SignedBeaconBlock,
    chain_spec::ChainSpec,
    slot::{Epoch, Slot},
    state::BeaconState,
};

/// What a successful transition hands back to the caller: the validator-set
/// delta for the host consensus, plus the engine's judgement of the execution
/// payload so callers can withhold optimistic side effects while the engine
/// is still syncing.
#[derive(Clone, Debug)]
pub struct TransitionOutcome {
    pub validator_updates: Vec<ValidatorUpdate>,
    pub payload_verdict: PayloadVerdict,
}

pub struct StateProcessor {
    spec: ChainSpec,
}

impl StateProcessor {
    pub fn new(spec: ChainSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    /// Apply `block` to `state`. On error the state snapshot is poisoned and
    /// must be discarded by the caller.
    pub async fn transition(
        &self,
        state: &mut BeaconState,
        block: &SignedBeaconBlock,
        ctx: &Context,
    ) -> Result<TransitionOutcome, StateTransitionError> {
        let weights_before = validator_weights(state, &self.spec);

        self.process_slots(state, block.slot())?;
        let payload_verdict =
            block_processing::process_block(&self.spec, state, block, ctx).await?;

        if ctx.verify_state_root {
            let computed = state.hash_tree_root();
            if block.message.state_root != computed {
                return Err(StateTransitionError::StateRootMismatch {
                    in_block: block.message.state_root,
                    computed,
                });
            }
        }

        let validator_updates = diff_validator_weights(&weights_before, state, &self.spec);
        debug!(
            slot = %block.slot(),
            updates = validator_updates.len(),
            verdict = ?payload_verdict,
            "state transition complete"
        );
        Ok(TransitionOutcome { validator_updates, payload_verdict })
    }

    /// Advance `state` through empty slots up to and including `target`.
    pub fn process_slots(
        &self,
        state: &mut BeaconState,
        target: Slot,
    ) -> Result<(), StateTransitionError> {
        slot_processing::process_slots(&self.spec, state, target)
    }
}

/// Host-consensus voting weight of each validator: effective balance while the
/// validator can vote, zero once it has exited.
fn validator_weights(state: &BeaconState, spec: &ChainSpec) -> Vec<Gwei> {
    let epoch = state.current_epoch(spec.slots_per_epoch);
    state.validators.iter().map(|v| weight_at(v, epoch)).collect()
}

fn weight_at(validator: &viridian_types::validator::Validator, epoch: Epoch) -> Gwei {
    if validator.exit_epoch <= epoch { 0 } else { validator.effective_balance }
}

/// Set-difference of weights before/after, ascending by validator index. New
/// validators always appear; removals surface as zero-weight updates.
fn diff_validator_weights(
    before: &[Gwei],
    state: &BeaconState,
    spec: &ChainSpec,
) -> Vec<ValidatorUpdate> {
    let epoch = state.current_epoch(spec.slots_per_epoch);
    state
        .validators
        .iter()
        .enumerate()
        .filter_map(|(index, validator)| {
            let weight = weight_at(validator, epoch);
            let changed = before.get(index).map(|prior| *prior != weight).unwrap_or(true);
            changed.then(|| ValidatorUpdate {
                pubkey: validator.pubkey,
                effective_balance: weight,
            })
        })
        .collect()
}
