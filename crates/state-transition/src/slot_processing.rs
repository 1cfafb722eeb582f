//! Per-slot bookkeeping: rolling root caches and epoch-boundary transitions.

use viridian_types::{Hash256, chain_spec::ChainSpec, slot::Slot, state::BeaconState};

use crate::{epoch_processing, error::StateTransitionError};

/// Advance `state` to `target`, caching roots each slot and running the epoch
/// transition whenever the next slot starts a new epoch. Rewinding is a
/// caller bug surfaced as an error, not a panic: snapshots come from storage
/// and a stale read must not take the node down.
pub fn process_slots(
    spec: &ChainSpec,
    state: &mut BeaconState,
    target: Slot,
) -> Result<(), StateTransitionError> {
    if target < state.slot {
        return Err(StateTransitionError::SlotsOutOfOrder { state: state.slot, target });
    }

    while state.slot < target {
        process_slot(state);
        if state.slot.next().is_epoch_start(spec.slots_per_epoch) {
            epoch_processing::process_epoch(spec, state);
        }
        state.slot = state.slot.next();
    }
    Ok(())
}

/// Cache the previous state root and block root into the rolling SSZ vectors,
/// patching the pending zero state root in the latest block header on the
/// way.
fn process_slot(state: &mut BeaconState) {
    let previous_state_root = state.hash_tree_root();
    state.set_state_root(state.slot, previous_state_root);

    if state.latest_block_header.state_root == Hash256::ZERO {
        state.latest_block_header.state_root = previous_state_root;
    }

    let previous_block_root = state.latest_block_header.hash_tree_root();
    state.set_block_root(state.slot, previous_block_root);
}
