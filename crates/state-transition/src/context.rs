//! Transition context: verification policy plus the engine seam.

use std::sync::Arc;

use async_trait::async_trait;
use viridian_types::{B256, Hash256, execution_payload::ExecutionPayload};

use crate::error::StateTransitionError;

/// Outcome of handing a payload to the execution engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadVerdict {
    /// Engine fully validated the payload.
    Valid,
    /// Engine is syncing or deferred judgement (`SYNCING`/`ACCEPTED`); the
    /// payload is treated as tentatively valid downstream.
    Optimistic,
}

/// The one capability the state transition needs from the execution layer.
///
/// `INVALID` surfaces as [`StateTransitionError::PayloadInvalid`]; transport
/// failures that outlive the client's retries surface as
/// [`StateTransitionError::EngineUnavailable`].
#[async_trait]
pub trait PayloadExecutor: Send + Sync {
    async fn notify_new_payload(
        &self,
        payload: &ExecutionPayload,
        versioned_hashes: Vec<B256>,
        parent_beacon_block_root: Hash256,
    ) -> Result<PayloadVerdict, StateTransitionError>;
}

/// Executor that accepts every payload. Used for proposal dry-runs where the
/// payload came out of our own engine moments ago, and for replay.
pub struct NoopExecutor;

#[async_trait]
impl PayloadExecutor for NoopExecutor {
    async fn notify_new_payload(
        &self,
        _payload: &ExecutionPayload,
        _versioned_hashes: Vec<B256>,
        _parent_beacon_block_root: Hash256,
    ) -> Result<PayloadVerdict, StateTransitionError> {
        Ok(PayloadVerdict::Valid)
    }
}

/// Signature/proposer policy plus the engine handle for one transition call.
#[derive(Clone)]
pub struct Context {
    /// Verify the proposer block signature, the RANDAO reveal and deposit
    /// signatures. Disabled for replay and self-built blocks.
    pub verify_signatures: bool,
    /// Enforce that the block's proposer index matches `expected_proposer`.
    pub verify_proposer: bool,
    /// Proposer the host consensus says this slot belongs to.
    pub expected_proposer: Option<u64>,
    /// Check the block's state root against the post-state. Disabled while
    /// computing the state root of a block under construction.
    pub verify_state_root: bool,
    /// Engine seam for payload execution.
    pub executor: Arc<dyn PayloadExecutor>,
}

impl Context {
    /// Policy for verifying a proposal from the wire.
    pub fn for_verification(executor: Arc<dyn PayloadExecutor>) -> Self {
        Self {
            verify_signatures: true,
            verify_proposer: false,
            expected_proposer: None,
            verify_state_root: true,
            executor,
        }
    }

    /// Policy for the finalize path: the proposal already passed wire
    /// verification this slot.
    pub fn for_finalization(executor: Arc<dyn PayloadExecutor>) -> Self {
        Self {
            verify_signatures: true,
            verify_proposer: false,
            expected_proposer: None,
            verify_state_root: true,
            executor,
        }
    }

    /// Policy for computing the state root of a block being built locally:
    /// nothing to verify, nothing to execute.
    pub fn for_proposal_dry_run() -> Self {
        Self {
            verify_signatures: false,
            verify_proposer: false,
            expected_proposer: None,
            verify_state_root: false,
            executor: Arc::new(NoopExecutor),
        }
    }

    pub fn with_expected_proposer(mut self, proposer_index: u64) -> Self {
        self.verify_proposer = true;
        self.expected_proposer = Some(proposer_index);
        self
    }
}
