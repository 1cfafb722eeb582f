//! Engine API client over a pluggable transport.

use std::{sync::Arc, time::Duration};

use alloy_rpc_types_engine::{
    ExecutionPayloadEnvelopeV3, ExecutionPayloadV3, ForkchoiceState, ForkchoiceUpdated,
    PayloadAttributes, PayloadId, PayloadStatus,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};
use viridian_types::{B256, blob::BlobsBundle};

use crate::{
    engine_api::{
        ENGINE_FORKCHOICE_UPDATED_V3, ENGINE_GET_PAYLOAD_V3, ENGINE_NEW_PAYLOAD_V3, EngineApi,
        PayloadEnvelope,
    },
    error::{ENGINE_ERROR_UNKNOWN_PAYLOAD, EngineApiError},
    transport::{JsonRpcRequest, Transport},
};

/// Retry/timeout policy for engine calls. Transport errors and timeouts are
/// retried with exponential backoff; RPC-level answers are returned as-is.
#[derive(Clone, Debug)]
pub struct EngineClientConfig {
    pub call_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for EngineClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(8),
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
        }
    }
}

pub struct EngineClient {
    transport: Arc<dyn Transport>,
    config: EngineClientConfig,
}

impl EngineClient {
    pub fn new(transport: impl Transport + 'static, config: EngineClientConfig) -> Self {
        Self { transport: Arc::new(transport), config }
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<R, EngineApiError> {
        let request = JsonRpcRequest::new(method, params);
        let mut backoff = self.config.backoff_base;
        let mut attempt = 0;

        loop {
            let outcome = tokio::time::timeout(
                self.config.call_timeout,
                self.transport.send(&request),
            )
            .await
            .map_err(|_| EngineApiError::Timeout {
                method,
                timeout_ms: self.config.call_timeout.as_millis() as u64,
            })
            .and_then(|result| result);

            match outcome {
                Ok(response) => {
                    if let Some(error) = response.error {
                        return Err(EngineApiError::Rpc {
                            code: error.code,
                            message: error.message,
                        });
                    }
                    let result = response.result.ok_or_else(|| {
                        EngineApiError::Decode("missing result field".to_owned())
                    })?;
                    return serde_json::from_value(result)
                        .map_err(|e| EngineApiError::Decode(e.to_string()));
                }
                Err(error) if error.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        method,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "engine call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl EngineApi for EngineClient {
    async fn new_payload(
        &self,
        payload: ExecutionPayloadV3,
        versioned_hashes: Vec<B256>,
        parent_beacon_block_root: B256,
    ) -> Result<PayloadStatus, EngineApiError> {
        let status: PayloadStatus = self
            .request(
                ENGINE_NEW_PAYLOAD_V3,
                json!([payload, versioned_hashes, parent_beacon_block_root]),
            )
            .await?;
        debug!(status = ?status.status, "engine_newPayloadV3");
        Ok(status)
    }

    async fn forkchoice_updated(
        &self,
        state: ForkchoiceState,
        attributes: Option<PayloadAttributes>,
    ) -> Result<ForkchoiceUpdated, EngineApiError> {
        let updated: ForkchoiceUpdated = self
            .request(ENGINE_FORKCHOICE_UPDATED_V3, json!([state, attributes]))
            .await?;
        debug!(
            head = %state.head_block_hash,
            status = ?updated.payload_status.status,
            payload_id = ?updated.payload_id,
            "engine_forkchoiceUpdatedV3"
        );
        Ok(updated)
    }

    async fn get_payload(
        &self,
        payload_id: PayloadId,
    ) -> Result<PayloadEnvelope, EngineApiError> {
        let envelope: ExecutionPayloadEnvelopeV3 = self
            .request(ENGINE_GET_PAYLOAD_V3, json!([payload_id]))
            .await
            .map_err(|error| match error {
                EngineApiError::Rpc { code, .. } if code == ENGINE_ERROR_UNKNOWN_PAYLOAD => {
                    EngineApiError::UnknownPayload(payload_id.to_string())
                }
                other => other,
            })?;

        let blobs_bundle = BlobsBundle::try_from(envelope.blobs_bundle)
            .map_err(EngineApiError::Decode)?;

        Ok(PayloadEnvelope { payload: envelope.execution_payload, blobs_bundle })
    }
}
