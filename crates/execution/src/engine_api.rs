//! The engine API surface consumed by the rest of the node.

use alloy_rpc_types_engine::{
    ExecutionPayloadV3, ForkchoiceState, ForkchoiceUpdated, PayloadAttributes, PayloadId,
    PayloadStatus,
};
use async_trait::async_trait;
use viridian_types::{B256, ExecutionHash, blob::BlobsBundle};

use crate::error::EngineApiError;

/// JSON-RPC method names.
pub const ENGINE_NEW_PAYLOAD_V3: &str = "engine_newPayloadV3";
pub const ENGINE_FORKCHOICE_UPDATED_V3: &str = "engine_forkchoiceUpdatedV3";
pub const ENGINE_GET_PAYLOAD_V3: &str = "engine_getPayloadV3";
pub const ETH_GET_LOGS: &str = "eth_getLogs";
pub const ETH_BLOCK_NUMBER: &str = "eth_blockNumber";

/// What `engine_getPayloadV3` hands back: the payload plus its blobs bundle.
#[derive(Clone, Debug)]
pub struct PayloadEnvelope {
    pub payload: ExecutionPayloadV3,
    pub blobs_bundle: BlobsBundle,
}

/// The engine API, the interface between consensus and execution.
///
/// Implementations retry transport failures internally; callers only see
/// terminal outcomes or exhausted retries.
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// `engine_newPayloadV3`: hand the engine a payload for validation.
    ///
    /// Returns the raw status; mapping `SYNCING`/`ACCEPTED` to optimistic
    /// treatment is the caller's policy, not the client's.
    async fn new_payload(
        &self,
        payload: ExecutionPayloadV3,
        versioned_hashes: Vec<B256>,
        parent_beacon_block_root: B256,
    ) -> Result<PayloadStatus, EngineApiError>;

    /// `engine_forkchoiceUpdatedV3`: move the engine's head/safe/finalized
    /// view, optionally kicking off a payload build via `attributes`.
    async fn forkchoice_updated(
        &self,
        state: ForkchoiceState,
        attributes: Option<PayloadAttributes>,
    ) -> Result<ForkchoiceUpdated, EngineApiError>;

    /// `engine_getPayloadV3`: collect a payload the engine has been building.
    async fn get_payload(&self, payload_id: PayloadId)
    -> Result<PayloadEnvelope, EngineApiError>;
}

/// Forkchoice triple where everything points at one hash. The single-slot
/// finality of the host consensus makes head == safe == finalized the normal
/// case.
pub fn forkchoice_state_at(head: ExecutionHash) -> ForkchoiceState {
    ForkchoiceState {
        head_block_hash: head,
        safe_block_hash: head,
        finalized_block_hash: head,
    }
}
