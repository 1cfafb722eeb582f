//! Adapter from the engine client to the state transition's executor seam.

use std::sync::Arc;

use alloy_rpc_types_engine::PayloadStatusEnum;
use async_trait::async_trait;
use viridian_execution::{EngineApi, EngineApiError};
use viridian_state_transition::{PayloadExecutor, PayloadVerdict, StateTransitionError};
use viridian_types::{B256, Hash256, execution_payload::ExecutionPayload};

pub struct EngineExecutor {
    engine: Arc<dyn EngineApi>,
}

impl EngineExecutor {
    pub fn new(engine: Arc<dyn EngineApi>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl PayloadExecutor for EngineExecutor {
    async fn notify_new_payload(
        &self,
        payload: &ExecutionPayload,
        versioned_hashes: Vec<B256>,
        parent_beacon_block_root: Hash256,
    ) -> Result<PayloadVerdict, StateTransitionError> {
        let status = self
            .engine
            .new_payload(payload.to_engine_payload(), versioned_hashes, parent_beacon_block_root)
            .await
            .map_err(|error| match error {
                EngineApiError::InvalidPayload { reason } => {
                    StateTransitionError::PayloadInvalid { reason }
                }
                other => StateTransitionError::EngineUnavailable(other.to_string()),
            })?;

        match &status.status {
            PayloadStatusEnum::Valid => Ok(PayloadVerdict::Valid),
            invalid @ PayloadStatusEnum::Invalid { .. } => {
                Err(StateTransitionError::PayloadInvalid { reason: format!("{invalid:?}") })
            }
            PayloadStatusEnum::Syncing | PayloadStatusEnum::Accepted => {
                Ok(PayloadVerdict::Optimistic)
            }
        }
    }
}
