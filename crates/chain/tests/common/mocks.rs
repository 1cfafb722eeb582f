//! Test doubles for the execution layer.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use alloy_rpc_types_engine::{
    ForkchoiceState, ForkchoiceUpdated, PayloadAttributes, PayloadId, PayloadStatus,
    PayloadStatusEnum,
};
use async_trait::async_trait;
use viridian_execution::{
    EngineApi, EngineApiError,
    deposits::{DepositReader, DepositReaderError},
    engine_api::PayloadEnvelope,
};
use viridian_types::{
    B256,
    blob::BlobsBundle,
    deposit::Deposit,
    execution_payload::{ExecutionPayload, Withdrawals},
};

/// Behaviour knob for `engine_newPayloadV3`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NewPayloadBehaviour {
    Valid,
    Syncing,
    Invalid,
}

/// Engine double that behaves like a well-formed execution client: payload
/// builds derive deterministically from the forkchoice attributes, so blocks
/// assembled from them satisfy the state transition's linkage checks.
pub struct MockEngine {
    pub new_payload_behaviour: Mutex<NewPayloadBehaviour>,
    pub forkchoice_heads: Mutex<Vec<B256>>,
    pub builds_requested: Mutex<u64>,
    builds: Mutex<HashMap<PayloadId, PayloadEnvelope>>,
    bundle_for_next_build: Mutex<Option<BlobsBundle>>,
    next_id: Mutex<u64>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            new_payload_behaviour: Mutex::new(NewPayloadBehaviour::Valid),
            forkchoice_heads: Mutex::new(Vec::new()),
            builds_requested: Mutex::new(0),
            builds: Mutex::new(HashMap::new()),
            bundle_for_next_build: Mutex::new(None),
            next_id: Mutex::new(0),
        }
    }

    pub fn set_new_payload_behaviour(&self, behaviour: NewPayloadBehaviour) {
        *self.new_payload_behaviour.lock().unwrap() = behaviour;
    }

    /// Attach a blobs bundle to the next payload build.
    pub fn stage_bundle(&self, bundle: BlobsBundle) {
        *self.bundle_for_next_build.lock().unwrap() = Some(bundle);
    }

    pub fn forkchoice_count(&self) -> usize {
        self.forkchoice_heads.lock().unwrap().len()
    }

    pub fn build_count(&self) -> u64 {
        *self.builds_requested.lock().unwrap()
    }
}

#[async_trait]
impl EngineApi for MockEngine {
    async fn new_payload(
        &self,
        _payload: alloy_rpc_types_engine::ExecutionPayloadV3,
        _versioned_hashes: Vec<B256>,
        _parent_beacon_block_root: B256,
    ) -> Result<PayloadStatus, EngineApiError> {
        match *self.new_payload_behaviour.lock().unwrap() {
            NewPayloadBehaviour::Valid => {
                Ok(PayloadStatus::from_status(PayloadStatusEnum::Valid))
            }
            NewPayloadBehaviour::Syncing => {
                Ok(PayloadStatus::from_status(PayloadStatusEnum::Syncing))
            }
            NewPayloadBehaviour::Invalid => Err(EngineApiError::InvalidPayload {
                reason: "mock engine says no".into(),
            }),
        }
    }

    async fn forkchoice_updated(
        &self,
        state: ForkchoiceState,
        attributes: Option<PayloadAttributes>,
    ) -> Result<ForkchoiceUpdated, EngineApiError> {
        self.forkchoice_heads.lock().unwrap().push(state.head_block_hash);

        let payload_id = if let Some(attrs) = attributes {
            *self.builds_requested.lock().unwrap() += 1;
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            let id = PayloadId::new((*next).to_be_bytes());

            let bundle =
                self.bundle_for_next_build.lock().unwrap().take().unwrap_or_default();

            // A deterministic payload consistent with the attributes, the way
            // a real engine would build it.
            let mut block_hash = B256::ZERO;
            block_hash.0[..8].copy_from_slice(&(*next).to_be_bytes());
            block_hash.0[8] = 0xb1;

            let payload = ExecutionPayload {
                parent_hash: state.head_block_hash,
                block_hash,
                prev_randao: attrs.prev_randao,
                timestamp: attrs.timestamp,
                withdrawals: Withdrawals::new(
                    attrs
                        .withdrawals
                        .unwrap_or_default()
                        .iter()
                        .map(Into::into)
                        .collect(),
                )
                .unwrap(),
                blob_gas_used: bundle.len() as u64 * 131_072,
                ..Default::default()
            };

            self.builds.lock().unwrap().insert(
                id,
                PayloadEnvelope { payload: payload.to_engine_payload(), blobs_bundle: bundle },
            );
            Some(id)
        } else {
            None
        };

        Ok(ForkchoiceUpdated {
            payload_status: PayloadStatus::from_status(PayloadStatusEnum::Valid),
            payload_id,
        })
    }

    async fn get_payload(
        &self,
        payload_id: PayloadId,
    ) -> Result<PayloadEnvelope, EngineApiError> {
        self.builds
            .lock()
            .unwrap()
            .get(&payload_id)
            .cloned()
            .ok_or_else(|| EngineApiError::UnknownPayload(payload_id.to_string()))
    }
}

/// Deposit reader fed from a fixed log set.
pub struct MockDepositReader {
    pub head: Mutex<u64>,
    /// (eth1_block, deposit) pairs the "contract" has emitted.
    pub logs: Mutex<Vec<(u64, Deposit)>>,
    pub fail_next: Mutex<bool>,
}

impl MockDepositReader {
    pub fn new(head: u64) -> Self {
        Self { head: Mutex::new(head), logs: Mutex::new(Vec::new()), fail_next: Mutex::new(false) }
    }

    pub fn emit(&self, eth1_block: u64, deposit: Deposit) {
        self.logs.lock().unwrap().push((eth1_block, deposit));
    }
}

#[async_trait]
impl DepositReader for MockDepositReader {
    async fn latest_block_number(&self) -> Result<u64, DepositReaderError> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(DepositReaderError::MalformedLog("mock failure".into()));
        }
        Ok(*self.head.lock().unwrap())
    }

    async fn deposits_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Deposit>, DepositReaderError> {
        let mut deposits: Vec<Deposit> = self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|(block, _)| (from_block..=to_block).contains(block))
            .map(|(_, deposit)| deposit.clone())
            .collect();
        deposits.sort_by_key(|d| d.index);
        Ok(deposits)
    }
}
