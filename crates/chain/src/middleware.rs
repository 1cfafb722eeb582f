//! Host-consensus middleware: ABCI-style callbacks over opaque tx bytes.
//!
//! Opaque tx layout: position 0 carries the SSZ-encoded signed beacon block,
//! position 1 the SSZ-encoded sidecar batch. Fork selection for the decoders
//! comes from the chain spec and the height.

use std::sync::Arc;

use bytes::Bytes;
use ssz::{Decode, Encode};
use tokio::sync::Mutex;
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};
use viridian_events::{BlockProposalEvent, EventBus, EventId, NewSlotEvent};
use viridian_types::{
    ValidatorUpdate,
    blob::BlobSidecars,
    block::SignedBeaconBlock,
    chain_spec::ChainSpec,
    slot::Slot,
};

use crate::{error::ChainError, service::ChainService};

/// Position of the block within the opaque tx list.
pub const BEACON_BLOCK_TX_INDEX: usize = 0;
/// Position of the sidecar batch within the opaque tx list.
pub const BLOB_SIDECARS_TX_INDEX: usize = 1;

/// Outcome of `process_proposal`, mirroring the host's accept/reject vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProposalVerdict {
    Accept,
    Reject,
}

pub struct ConsensusMiddleware {
    spec: ChainSpec,
    chain: Arc<ChainService>,
    bus: EventBus,
    /// Subscription carrying proposals assembled by the validator service.
    proposal_rx: Mutex<tokio::sync::mpsc::Receiver<BlockProposalEvent>>,
    proposal_timeout: Duration,
}

impl ConsensusMiddleware {
    pub fn new(
        spec: ChainSpec,
        chain: Arc<ChainService>,
        bus: EventBus,
        proposal_timeout: Duration,
    ) -> Result<Self, ChainError> {
        let proposal_rx = bus.subscribe::<BlockProposalEvent>(EventId::BlockProposal)?;
        Ok(Self { spec, chain, bus, proposal_rx: Mutex::new(proposal_rx), proposal_timeout })
    }

    /// `InitGenesis`: hand the genesis JSON to the chain service.
    pub fn init_genesis(&self, genesis_bytes: &[u8]) -> Result<Vec<ValidatorUpdate>, ChainError> {
        self.chain.init_chain(genesis_bytes)
    }

    /// `PrepareProposal`: this node holds proposer duty for `height`. Wake
    /// the validator service over the bus and wait for its proposal.
    pub async fn prepare_proposal(&self, height: u64) -> Result<Vec<Bytes>, ChainError> {
        let slot = Slot::new(height);
        self.bus
            .publish(EventId::NewSlot, NewSlotEvent { slot, is_local_proposer: true })
            .await?;

        let mut rx = self.proposal_rx.lock().await;
        loop {
            let event = timeout(self.proposal_timeout, rx.recv())
                .await
                .map_err(|_| ChainError::ProposalTimeout(slot))?
                .ok_or(ChainError::ProposalTimeout(slot))?;

            // Stale proposals from earlier slots may still sit in the queue
            // after a missed deadline; skip past them.
            if event.block.slot() != slot {
                debug!(
                    got = %event.block.slot(),
                    want = %slot,
                    "discarding stale proposal"
                );
                continue;
            }

            return Ok(vec![
                Bytes::from(event.block.as_ssz_bytes()),
                Bytes::from(event.sidecars.as_ssz_bytes()),
            ]);
        }
    }

    /// `ProcessProposal`: decode and verify, voting accept or reject.
    pub async fn process_proposal(&self, height: u64, txs: &[Bytes]) -> ProposalVerdict {
        let (block, sidecars) = match self.decode_payload(height, txs) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!(height, %error, "rejecting undecodable proposal");
                return ProposalVerdict::Reject;
            }
        };

        match self.chain.verify_incoming_block(&block, &sidecars).await {
            Ok(()) => ProposalVerdict::Accept,
            Err(_) => ProposalVerdict::Reject,
        }
    }

    /// `FinalizeBlock`: decode and commit. `syncing_to_height` beyond the
    /// current height marks a state-sync catch-up block, which suppresses
    /// payload-building side effects.
    pub async fn finalize_block(
        &self,
        height: u64,
        txs: &[Bytes],
        syncing_to_height: u64,
    ) -> Result<Vec<ValidatorUpdate>, ChainError> {
        let (block, sidecars) = self.decode_payload(height, txs)?;
        let is_syncing = syncing_to_height > height;
        self.chain.finalize_block(&block, &sidecars, is_syncing).await
    }

    fn decode_payload(
        &self,
        height: u64,
        txs: &[Bytes],
    ) -> Result<(SignedBeaconBlock, BlobSidecars), ChainError> {
        let fork = self.spec.active_fork_for_slot(Slot::new(height));

        let block_bytes = txs.get(BEACON_BLOCK_TX_INDEX).ok_or_else(|| {
            ChainError::MalformedPayload { height, reason: "missing block tx".into() }
        })?;
        let block =
            SignedBeaconBlock::from_ssz_bytes_for_fork(block_bytes, fork).map_err(|e| {
                ChainError::MalformedPayload { height, reason: format!("block: {e:?}") }
            })?;

        let sidecar_bytes = txs.get(BLOB_SIDECARS_TX_INDEX).ok_or_else(|| {
            ChainError::MalformedPayload { height, reason: "missing sidecars tx".into() }
        })?;
        let sidecars = BlobSidecars::from_ssz_bytes(sidecar_bytes).map_err(|e| {
            ChainError::MalformedPayload { height, reason: format!("sidecars: {e:?}") }
        })?;

        if block.slot().as_u64() != height {
            return Err(ChainError::MalformedPayload {
                height,
                reason: format!("block slot {} does not match height", block.slot()),
            });
        }

        Ok((block, sidecars))
    }
}
