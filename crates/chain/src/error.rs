//! Chain-service errors.

use thiserror::Error;
use viridian_da::BlobError;
use viridian_events::EventBusError;
use viridian_execution::{EngineApiError, PayloadBuilderError};
use viridian_state_transition::StateTransitionError;
use viridian_types::slot::Slot;

#[derive(Debug, Error)]
pub enum ChainError {
    /// Opaque consensus txs did not decode into a block + sidecars pair.
    #[error("malformed consensus payload at height {height}: {reason}")]
    MalformedPayload { height: u64, reason: String },

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("state transition failed at slot {slot}: {source}")]
    Transition {
        slot: Slot,
        #[source]
        source: StateTransitionError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineApiError),

    #[error(transparent)]
    PayloadBuilder(#[from] PayloadBuilderError),

    #[error(transparent)]
    EventBus(#[from] EventBusError),

    /// No committed state on disk yet; the chain has not seen genesis.
    #[error("no beacon state available, node not initialized")]
    MissingState,

    #[error("invalid genesis file: {0}")]
    InvalidGenesis(String),

    /// The validator service produced nothing within the proposal window.
    #[error("no proposal produced for slot {0} before the deadline")]
    ProposalTimeout(Slot),

    /// This node's signing key is not in the validator registry.
    #[error("local signing key is not a registered validator")]
    NotAValidator,

    /// Deposit-log fetch failure; retried with backoff by the fetcher.
    #[error("deposit fetch failed: {0}")]
    DepositFetch(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("codec error: {0}")]
    Codec(String),

    /// Deposit indices must stay dense; a gap means the fetcher and the
    /// store disagree about history.
    #[error("deposit store gap at index {expected}")]
    DepositGap { expected: u64 },
}
