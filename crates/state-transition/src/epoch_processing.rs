//! Epoch-boundary transitions.
//!
//! Runs just before the first slot of each epoch: registry updates
//! (eligibility, ejection, activation), slashings-vector reset, randao-mix
//! rotation, and effective-balance hysteresis. All sweeps iterate in
//! ascending validator index order.

use tracing::debug;
use viridian_types::{
    chain_spec::ChainSpec,
    slot::{Epoch, FAR_FUTURE_EPOCH},
    state::BeaconState,
};

pub fn process_epoch(spec: &ChainSpec, state: &mut BeaconState) {
    let current_epoch = state.current_epoch(spec.slots_per_epoch);
    let next_epoch = current_epoch.next();

    process_registry_updates(spec, state, current_epoch);
    process_slashings_reset(state, next_epoch);
    process_randao_mixes_reset(state, current_epoch, next_epoch);
    process_effective_balance_updates(spec, state);
}

/// Queue eligible validators, eject the underfunded, and activate the queued.
///
/// Activation is immediate (next epoch) rather than rate-limited: the host
/// consensus owns committee churn, so the eth2 activation queue and its churn
/// limit have no counterpart here.
fn process_registry_updates(spec: &ChainSpec, state: &mut BeaconState, current_epoch: Epoch) {
    let next_epoch = current_epoch.next();

    for index in 0..state.validators.len() {
        let validator = &mut state.validators[index];

        if validator.is_eligible_for_activation_queue(spec) {
            validator.activation_eligibility_epoch = next_epoch;
        }

        if validator.is_active_at(current_epoch) &&
            validator.effective_balance <= spec.ejection_balance &&
            validator.exit_epoch == FAR_FUTURE_EPOCH
        {
            debug!(index, "ejecting underfunded validator");
            validator.exit_epoch = next_epoch;
            validator.withdrawable_epoch = next_epoch.next();
        }

        if validator.activation_epoch == FAR_FUTURE_EPOCH &&
            validator.activation_eligibility_epoch <= current_epoch
        {
            validator.activation_epoch = next_epoch;
        }
    }
}

fn process_slashings_reset(state: &mut BeaconState, next_epoch: Epoch) {
    state.reset_slashing_at(next_epoch);
}

fn process_randao_mixes_reset(state: &mut BeaconState, current_epoch: Epoch, next_epoch: Epoch) {
    let mix = state.randao_mix(current_epoch);
    state.set_randao_mix(next_epoch, mix);
}

/// Hysteresis: the effective balance follows the actual balance only once the
/// gap crosses the configured thresholds, damping oscillation at increment
/// boundaries.
fn process_effective_balance_updates(spec: &ChainSpec, state: &mut BeaconState) {
    let hysteresis_increment = spec.effective_balance_increment / spec.hysteresis_quotient;
    let downward_threshold = hysteresis_increment * spec.hysteresis_downward_multiplier;
    let upward_threshold = hysteresis_increment * spec.hysteresis_upward_multiplier;

    for index in 0..state.validators.len() {
        let balance = state.balances[index];
        let validator = &mut state.validators[index];

        if balance + downward_threshold < validator.effective_balance ||
            validator.effective_balance + upward_threshold < balance
        {
            validator.effective_balance = std::cmp::min(
                balance - balance % spec.effective_balance_increment,
                spec.max_effective_balance,
            );
        }
    }
}
