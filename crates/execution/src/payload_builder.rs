//! Local payload builder.
//!
//! Wraps the engine API's build flow: a `forkchoice_updated` carrying payload
//! attributes starts a build and yields a payload id; `get_payload` later
//! collects the result. Ids are cached by `(slot, parent_root)` so the
//! blockchain service can start builds optimistically on block verification
//! and the validator service can collect them when proposer duty arrives.

use std::{collections::HashMap, sync::Arc};

use alloy_rpc_types_engine::{PayloadAttributes, PayloadId};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use viridian_types::{ExecutionHash, Hash256, slot::Slot};

use crate::{
    engine_api::{EngineApi, PayloadEnvelope, forkchoice_state_at},
    error::EngineApiError,
};

#[derive(Debug, Error)]
pub enum PayloadBuilderError {
    /// `retrieve_payload` without a matching `request_payload`.
    #[error("no payload prepared for slot {slot} parent {parent_root}")]
    PayloadNotPrepared { slot: Slot, parent_root: Hash256 },

    /// The engine evicted a payload id we handed it. Fatal for the builder:
    /// the caller must fall back to a synchronous build.
    #[error("engine no longer knows payload for slot {slot}: {source}")]
    EnginePayloadUnknown {
        slot: Slot,
        #[source]
        source: EngineApiError,
    },

    /// The engine refused to start a build.
    #[error("engine rejected payload build for slot {slot}: {reason}")]
    BuildRejected { slot: Slot, reason: String },

    #[error(transparent)]
    Engine(#[from] EngineApiError),
}

/// Key for the payload-id cache. A re-request for the same key overwrites the
/// stale entry, which is what resolves the optimistic-build fork race.
type CacheKey = (Slot, Hash256);

pub struct PayloadBuilder {
    engine: Arc<dyn EngineApi>,
    cache: Mutex<HashMap<CacheKey, PayloadId>>,
}

impl PayloadBuilder {
    pub fn new(engine: Arc<dyn EngineApi>) -> Self {
        Self { engine, cache: Mutex::new(HashMap::new()) }
    }

    /// Ask the engine to start building a payload for `slot` on top of
    /// `parent_block_hash`, and remember the returned id.
    pub async fn request_payload(
        &self,
        slot: Slot,
        parent_root: Hash256,
        parent_block_hash: ExecutionHash,
        attributes: PayloadAttributes,
    ) -> Result<PayloadId, PayloadBuilderError> {
        let updated = self
            .engine
            .forkchoice_updated(forkchoice_state_at(parent_block_hash), Some(attributes))
            .await?;

        if updated.payload_status.status.is_invalid() {
            return Err(PayloadBuilderError::BuildRejected {
                slot,
                reason: format!("{:?}", updated.payload_status.status),
            });
        }

        let payload_id = updated.payload_id.ok_or_else(|| {
            // SYNCING engines accept the forkchoice but cannot build yet.
            PayloadBuilderError::BuildRejected {
                slot,
                reason: format!(
                    "engine returned no payload id (status {:?})",
                    updated.payload_status.status
                ),
            }
        })?;

        let previous =
            self.cache.lock().await.insert((slot, parent_root), payload_id);
        match previous {
            Some(stale) if stale != payload_id => {
                info!(%slot, %parent_root, ?stale, ?payload_id, "overwrote stale payload id");
            }
            _ => debug!(%slot, %parent_root, ?payload_id, "cached payload id"),
        }

        Ok(payload_id)
    }

    /// Collect the payload prepared for `(slot, parent_root)`. The cache entry
    /// is consumed regardless of outcome: ids are single-use at the engine.
    pub async fn retrieve_payload(
        &self,
        slot: Slot,
        parent_root: Hash256,
    ) -> Result<PayloadEnvelope, PayloadBuilderError> {
        let payload_id = self
            .cache
            .lock()
            .await
            .remove(&(slot, parent_root))
            .ok_or(PayloadBuilderError::PayloadNotPrepared { slot, parent_root })?;

        match self.engine.get_payload(payload_id).await {
            Ok(envelope) => Ok(envelope),
            Err(error @ EngineApiError::UnknownPayload(_)) => {
                warn!(%slot, ?payload_id, "engine evicted prepared payload");
                Err(PayloadBuilderError::EnginePayloadUnknown { slot, source: error })
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Whether a payload is cached for `(slot, parent_root)`.
    pub async fn has_payload(&self, slot: Slot, parent_root: Hash256) -> bool {
        self.cache.lock().await.contains_key(&(slot, parent_root))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use alloy_rpc_types_engine::{
        ExecutionPayloadV3, ForkchoiceState, ForkchoiceUpdated, PayloadStatus, PayloadStatusEnum,
    };
    use async_trait::async_trait;
    use viridian_types::{B256, blob::BlobsBundle, execution_payload::ExecutionPayload};

    use super::*;

    /// Engine double returning a fresh payload id per forkchoice call.
    #[derive(Default)]
    struct FakeEngine {
        next_id: StdMutex<u8>,
        known_ids: StdMutex<Vec<PayloadId>>,
    }

    #[async_trait]
    impl EngineApi for FakeEngine {
        async fn new_payload(
            &self,
            _payload: ExecutionPayloadV3,
            _versioned_hashes: Vec<B256>,
            _parent_beacon_block_root: B256,
        ) -> Result<PayloadStatus, EngineApiError> {
            Ok(PayloadStatus::from_status(PayloadStatusEnum::Valid))
        }

        async fn forkchoice_updated(
            &self,
            _state: ForkchoiceState,
            attributes: Option<PayloadAttributes>,
        ) -> Result<ForkchoiceUpdated, EngineApiError> {
            let payload_id = attributes.map(|_| {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                let id = PayloadId::new([*next; 8]);
                self.known_ids.lock().unwrap().push(id);
                id
            });
            Ok(ForkchoiceUpdated {
                payload_status: PayloadStatus::from_status(PayloadStatusEnum::Valid),
                payload_id,
            })
        }

        async fn get_payload(
            &self,
            payload_id: PayloadId,
        ) -> Result<PayloadEnvelope, EngineApiError> {
            if !self.known_ids.lock().unwrap().contains(&payload_id) {
                return Err(EngineApiError::UnknownPayload(payload_id.to_string()));
            }
            Ok(PayloadEnvelope {
                payload: ExecutionPayload::default().to_engine_payload(),
                blobs_bundle: BlobsBundle::default(),
            })
        }
    }

    fn attributes() -> PayloadAttributes {
        PayloadAttributes {
            timestamp: 12,
            prev_randao: B256::ZERO,
            suggested_fee_recipient: Default::default(),
            withdrawals: Some(vec![]),
            parent_beacon_block_root: Some(B256::ZERO),
        }
    }

    #[tokio::test]
    async fn retrieve_without_request_fails() {
        let builder = PayloadBuilder::new(Arc::new(FakeEngine::default()));
        let error = builder.retrieve_payload(Slot::new(1), Hash256::ZERO).await.unwrap_err();
        assert!(matches!(error, PayloadBuilderError::PayloadNotPrepared { .. }));
    }

    #[tokio::test]
    async fn request_then_retrieve_roundtrip() {
        let builder = PayloadBuilder::new(Arc::new(FakeEngine::default()));
        let slot = Slot::new(2);
        let parent = Hash256::repeat_byte(1);

        builder
            .request_payload(slot, parent, ExecutionHash::repeat_byte(9), attributes())
            .await
            .unwrap();
        assert!(builder.has_payload(slot, parent).await);

        builder.retrieve_payload(slot, parent).await.unwrap();
        // Entry is consumed.
        assert!(!builder.has_payload(slot, parent).await);
    }

    /// The optimistic-build race: a second request for the same slot against
    /// a different parent must not be shadowed by the stale entry, and a
    /// repeat request for the same key overwrites it.
    #[tokio::test]
    async fn rerequest_overwrites_stale_entry() {
        let builder = PayloadBuilder::new(Arc::new(FakeEngine::default()));
        let slot = Slot::new(3);
        let parent = Hash256::repeat_byte(1);

        let first = builder
            .request_payload(slot, parent, ExecutionHash::repeat_byte(1), attributes())
            .await
            .unwrap();
        let second = builder
            .request_payload(slot, parent, ExecutionHash::repeat_byte(2), attributes())
            .await
            .unwrap();
        assert_ne!(first, second);

        // Only one entry remains and it is the fresh one.
        builder.retrieve_payload(slot, parent).await.unwrap();
        assert!(!builder.has_payload(slot, parent).await);
    }
}
