//! The blockchain service: the host-consensus facing orchestrator.
//!
//! Per slot, the host consensus calls `verify_incoming_block` during its
//! proposal round and `finalize_block` once the round decides. Verification
//! dry-runs the state transition against a snapshot; finalization runs it
//! again and commits state, block and sidecars atomically. Blocks that fail
//! finalization are parked in `failed_blocks` until the deposit catch-up
//! fetcher has the data to retry them.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use alloy_rpc_types_engine::PayloadAttributes;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use viridian_da::BlobProcessor;
use viridian_events::{BlockCommittedEvent, EventBus, EventId};
use viridian_execution::{EngineApi, PayloadBuilder, engine_api::forkchoice_state_at};
use viridian_state_transition::{
    Context, PayloadVerdict, StateProcessor, expected_withdrawals,
    initialize_state_from_genesis,
};
use viridian_types::{
    ExecutionAddress, ExecutionHash, ValidatorUpdate,
    blob::BlobSidecars,
    block::SignedBeaconBlock,
    genesis::Genesis,
    slot::Slot,
    state::BeaconState,
};

use crate::{
    error::ChainError,
    executor::EngineExecutor,
    metrics::ChainMetrics,
    store::ChainStore,
};

pub struct ChainServiceConfig {
    /// Start building the next slot's payload as soon as a proposal
    /// verifies, hiding engine build latency behind host-consensus voting.
    pub optimistic_builds: bool,
    pub fee_recipient: ExecutionAddress,
}

impl Default for ChainServiceConfig {
    fn default() -> Self {
        Self { optimistic_builds: true, fee_recipient: ExecutionAddress::ZERO }
    }
}

pub struct ChainService {
    config: ChainServiceConfig,
    store: Arc<ChainStore>,
    blob_processor: Arc<BlobProcessor>,
    engine: Arc<dyn EngineApi>,
    payload_builder: Arc<PayloadBuilder>,
    state_processor: StateProcessor,
    bus: EventBus,
    metrics: ChainMetrics,

    /// Slots whose finalization failed and awaits deposit catch-up. The
    /// fetcher writes, the finalize path reads.
    failed_blocks: RwLock<HashSet<Slot>>,
    /// Last execution head we pointed the engine at; redundant forkchoice
    /// calls are skipped when unchanged.
    last_forkchoice_head: Mutex<Option<ExecutionHash>>,
    /// First finalize after process start always re-syncs the engine, even
    /// when its view appears to agree. Defends against crash-restart
    /// divergence between our store and the engine's head.
    force_startup_sync: AtomicBool,
}

impl ChainService {
    pub fn new(
        config: ChainServiceConfig,
        store: Arc<ChainStore>,
        blob_processor: Arc<BlobProcessor>,
        engine: Arc<dyn EngineApi>,
        payload_builder: Arc<PayloadBuilder>,
        state_processor: StateProcessor,
        bus: EventBus,
        metrics: ChainMetrics,
    ) -> Self {
        Self {
            config,
            store,
            blob_processor,
            engine,
            payload_builder,
            state_processor,
            bus,
            metrics,
            failed_blocks: RwLock::new(HashSet::new()),
            last_forkchoice_head: Mutex::new(None),
            force_startup_sync: AtomicBool::new(true),
        }
    }

    pub fn store(&self) -> &Arc<ChainStore> {
        &self.store
    }

    /// Process the genesis file: run the genesis deposit path, seed the
    /// store, and hand the initial validator set to the host consensus.
    pub fn init_chain(&self, genesis_bytes: &[u8]) -> Result<Vec<ValidatorUpdate>, ChainError> {
        let genesis = Genesis::from_json_bytes(genesis_bytes)
            .map_err(|e| ChainError::InvalidGenesis(e.to_string()))?;

        let (state, updates) = initialize_state_from_genesis(self.state_processor.spec(), &genesis)
            .map_err(|e| ChainError::InvalidGenesis(e.to_string()))?;

        self.store.commit_genesis(&state)?;
        info!(
            validators = updates.len(),
            eth1_block = %genesis.eth1_block_hash,
            "chain initialized from genesis"
        );
        Ok(updates)
    }

    /// Host-consensus `ProcessProposal`: verify blobs and dry-run the state
    /// transition against a snapshot. On success, optionally kick off the
    /// optimistic build for the next slot.
    pub async fn verify_incoming_block(
        &self,
        block: &SignedBeaconBlock,
        sidecars: &BlobSidecars,
    ) -> Result<(), ChainError> {
        let start = Instant::now();
        let slot = block.slot();
        let result = self.verify_inner(block, sidecars).await;
        self.metrics.observe_verify(start.elapsed().as_secs_f64(), result.is_ok());

        if let Err(error) = &result {
            warn!(%slot, %error, "rejecting proposal");
            self.mark_failed(slot).await;
        }
        result
    }

    async fn verify_inner(
        &self,
        block: &SignedBeaconBlock,
        sidecars: &BlobSidecars,
    ) -> Result<(), ChainError> {
        let slot = block.slot();

        self.blob_processor.verify_sidecars(sidecars, &block.signed_header())?;

        let mut snapshot = self.store.head_state()?.ok_or(ChainError::MissingState)?;
        let ctx = Context::for_verification(Arc::new(EngineExecutor::new(self.engine.clone())));
        let outcome = self
            .state_processor
            .transition(&mut snapshot, block, &ctx)
            .await
            .map_err(|source| ChainError::Transition { slot, source })?;

        // The dry-run snapshot is already the post-state; reuse it to derive
        // the next slot's payload attributes. A syncing engine cannot build
        // on a head it has not validated, so an optimistic verdict skips the
        // build entirely.
        if self.config.optimistic_builds && outcome.payload_verdict == PayloadVerdict::Valid {
            if let Err(error) = self.start_optimistic_build(block, snapshot).await {
                // Best effort: a failed optimistic build costs latency, not
                // correctness.
                debug!(%slot, %error, "optimistic build not started");
            }
        }

        Ok(())
    }

    /// Host-consensus `FinalizeBlock`: verify and persist sidecars, run the
    /// transition committing to disk, advance the engine forkchoice, publish
    /// `BlockCommitted` and return the validator delta.
    pub async fn finalize_block(
        &self,
        block: &SignedBeaconBlock,
        sidecars: &BlobSidecars,
        is_syncing: bool,
    ) -> Result<Vec<ValidatorUpdate>, ChainError> {
        let start = Instant::now();
        let result = self.finalize_inner(block, sidecars, is_syncing).await;
        self.metrics.observe_finalize(start.elapsed().as_secs_f64(), result.is_ok());

        match &result {
            Ok(updates) => {
                info!(
                    slot = %block.slot(),
                    validator_updates = updates.len(),
                    "block finalized"
                );
            }
            Err(error) => {
                error!(slot = %block.slot(), %error, "finalize failed");
                self.mark_failed(block.slot()).await;
            }
        }
        result
    }

    async fn finalize_inner(
        &self,
        block: &SignedBeaconBlock,
        sidecars: &BlobSidecars,
        is_syncing: bool,
    ) -> Result<Vec<ValidatorUpdate>, ChainError> {
        let slot = block.slot();

        self.blob_processor.verify_sidecars(sidecars, &block.signed_header())?;

        let mut state = self.store.head_state()?.ok_or(ChainError::MissingState)?;
        let ctx = Context::for_finalization(Arc::new(EngineExecutor::new(self.engine.clone())));
        let outcome = self
            .state_processor
            .transition(&mut state, block, &ctx)
            .await
            .map_err(|source| ChainError::Transition { slot, source })?;

        // Commit everything for this slot atomically, sidecars beside it.
        self.store.commit_finalized(slot, &state, block)?;
        self.blob_processor.process_sidecars(sidecars).await?;

        let block_root = block.hash_tree_root();
        self.bus
            .publish(
                EventId::BlockCommitted,
                BlockCommittedEvent { slot, block_root, block: Arc::new(block.clone()) },
            )
            .await?;

        self.update_forkchoice(state.latest_execution_block_hash()).await?;

        // Skip the optimistic build both for catch-up blocks (host-consensus
        // state sync) and whenever the engine answered SYNCING/ACCEPTED: the
        // block is recorded either way, but there is no validated head to
        // build the next payload on.
        if self.config.optimistic_builds &&
            !is_syncing &&
            outcome.payload_verdict == PayloadVerdict::Valid
        {
            if let Err(error) = self.start_optimistic_build(block, state).await {
                debug!(%slot, %error, "optimistic build not started after finalize");
            }
        }

        // DA window pruning.
        let retention = self.state_processor.spec().blob_retention_slots();
        if let Ok(pruned) = self.blob_processor.prune_below(slot.saturating_sub(retention)).await {
            if pruned > 0 {
                debug!(pruned, "pruned sidecar batches outside the DA window");
            }
        }

        Ok(outcome.validator_updates)
    }

    /// Move the engine's head. Skipped when the head is unchanged, except for
    /// the very first finalize after startup, which always syncs.
    async fn update_forkchoice(&self, head: ExecutionHash) -> Result<(), ChainError> {
        let mut last = self.last_forkchoice_head.lock().await;
        let forced = self.force_startup_sync.swap(false, Ordering::SeqCst);
        if !forced && *last == Some(head) {
            return Ok(());
        }

        self.engine.forkchoice_updated(forkchoice_state_at(head), None).await?;
        *last = Some(head);
        debug!(%head, forced, "engine forkchoice updated");
        Ok(())
    }

    /// Speculatively prepare the next slot's payload on top of `block`,
    /// using the post-state the transition just produced.
    async fn start_optimistic_build(
        &self,
        block: &SignedBeaconBlock,
        mut post_state: BeaconState,
    ) -> Result<(), ChainError> {
        let spec = self.state_processor.spec().clone();
        let next_slot = block.slot().next();

        // Advance to the next slot so the parent root and withdrawal sweep
        // match what the transition will expect there.
        self.state_processor
            .process_slots(&mut post_state, next_slot)
            .map_err(|source| ChainError::Transition { slot: next_slot, source })?;

        let parent_root = post_state.latest_block_root();
        let parent_block_hash = post_state.latest_execution_block_hash();
        let epoch = post_state.current_epoch(spec.slots_per_epoch);

        let attributes = PayloadAttributes {
            timestamp: post_state.latest_execution_payload_header.timestamp +
                spec.seconds_per_slot,
            prev_randao: post_state.randao_mix(epoch),
            suggested_fee_recipient: self.config.fee_recipient,
            withdrawals: Some(
                expected_withdrawals(&spec, &post_state).iter().map(Into::into).collect(),
            ),
            parent_beacon_block_root: Some(parent_root),
        };

        self.payload_builder
            .request_payload(next_slot, parent_root, parent_block_hash, attributes)
            .await?;
        self.metrics.record_optimistic_build();
        debug!(%next_slot, %parent_root, "optimistic payload build started");
        Ok(())
    }

    async fn mark_failed(&self, slot: Slot) {
        let mut failed = self.failed_blocks.write().await;
        failed.insert(slot);
        self.metrics.set_failed_blocks(failed.len());
    }

    /// Deposit-fetcher bookkeeping hook.
    pub fn note_deposits_ingested(&self, count: usize) {
        self.metrics.record_deposits(count);
    }

    /// Called by the deposit fetcher once a poll round has buffered fresh
    /// deposits: parked slots become retryable.
    pub async fn clear_failed_blocks(&self) -> usize {
        let mut failed = self.failed_blocks.write().await;
        let cleared = failed.len();
        failed.clear();
        self.metrics.set_failed_blocks(0);
        cleared
    }

    pub async fn failed_block_count(&self) -> usize {
        self.failed_blocks.read().await.len()
    }

    pub async fn is_failed(&self, slot: Slot) -> bool {
        self.failed_blocks.read().await.contains(&slot)
    }
}
