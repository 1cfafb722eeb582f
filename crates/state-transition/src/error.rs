//! Transition failures. Every variant is fatal to the block being applied;
//! the caller discards the state snapshot and reports up to the host
//! consensus.

use thiserror::Error;
use viridian_types::{ExecutionHash, Hash256, slot::Slot};

#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("block slot {block} does not match state slot {state}")]
    SlotMismatch { block: Slot, state: Slot },

    #[error("block slot {block} is not newer than latest header slot {latest}")]
    BlockNotNewer { block: Slot, latest: Slot },

    #[error("cannot rewind state from slot {state} to {target}")]
    SlotsOutOfOrder { state: Slot, target: Slot },

    #[error("block parent root {in_block} does not match expected {expected}")]
    ParentRootMismatch { in_block: Hash256, expected: Hash256 },

    #[error("proposer index {in_block} does not match expected {expected}")]
    ProposerMismatch { in_block: u64, expected: u64 },

    #[error("proposer index {0} not in the validator registry")]
    UnknownProposer(u64),

    #[error("proposer {0} is slashed")]
    ProposerSlashed(u64),

    #[error("invalid proposer signature on block at slot {0}")]
    InvalidBlockSignature(Slot),

    #[error("invalid RANDAO reveal at epoch {0}")]
    InvalidRandaoReveal(viridian_types::slot::Epoch),

    #[error("payload parent hash {in_block} does not match state {in_state}")]
    PayloadParentHashMismatch { in_block: ExecutionHash, in_state: ExecutionHash },

    #[error("payload timestamp {in_block} not beyond previous {previous}")]
    PayloadTimestampNotMonotonic { in_block: u64, previous: u64 },

    #[error("payload prev-randao {in_block} does not match mix {expected}")]
    PayloadPrevRandaoMismatch { in_block: Hash256, expected: Hash256 },

    /// Policy error: commitment count above the chain-spec cap.
    #[error("block carries {count} KZG commitments, cap is {max}")]
    TooManyBlobCommitments { count: usize, max: u64 },

    #[error("payload blob gas {in_block} inconsistent with {commitments} commitments")]
    BlobGasMismatch { in_block: u64, commitments: usize },

    /// The engine judged the payload invalid. Terminal for this block; if the
    /// block was already finalized this is fatal to the process, which the
    /// caller decides.
    #[error("execution engine rejected payload: {reason}")]
    PayloadInvalid { reason: String },

    /// Engine unreachable after the client's internal retries.
    #[error("execution engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Policy error: deposit count above the chain-spec cap.
    #[error("block carries {count} deposits, cap is {max}")]
    TooManyDeposits { count: usize, max: u64 },

    #[error("deposit index {in_block} does not match state index {expected}")]
    DepositIndexMismatch { in_block: u64, expected: u64 },

    #[error("deposit {index} inclusion proof invalid")]
    InvalidDepositProof { index: u64 },

    #[error("payload withdrawals do not match the expected sweep at slot {slot}")]
    WithdrawalsMismatch { slot: Slot },

    #[error("block state root {in_block} does not match computed {computed}")]
    StateRootMismatch { in_block: Hash256, computed: Hash256 },
}
