//! Validator service: assembles proposals when this node holds proposer duty.
//!
//! Listens for `NewSlot` events; on duty it collects the prepared execution
//! payload from the builder (falling back to a synchronous build), pending
//! deposits from the store, constructs sidecars with inclusion proofs, signs
//! the block, and publishes the proposal back onto the bus for the
//! middleware to hand to the host consensus. All coupling to the blockchain
//! service goes through the bus and the store.

use std::sync::Arc;

use alloy_rpc_types_engine::PayloadAttributes;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use viridian_events::{BlockProposalEvent, EventBus, EventId, NewSlotEvent};
use viridian_execution::{PayloadBuilder, PayloadBuilderError, engine_api::PayloadEnvelope};
use viridian_state_transition::{Context, StateProcessor, expected_withdrawals};
use viridian_types::{
    ExecutionAddress, Hash256,
    blob::{BlobSidecar, BlobSidecars, KzgCommitments},
    block::{
        BeaconBlock, BeaconBlockBody, Deposits, SignedBeaconBlock, block_signing_root,
        inclusion_proof_vector,
    },
    chain_spec::DomainType,
    crypto::BlsSecretKey,
    deposit::{Deposit, deposit_tree},
    eth1::Eth1Data,
    execution_payload::ExecutionPayload,
    signing::compute_signing_root,
    slot::Slot,
    state::BeaconState,
};

use crate::{error::ChainError, store::ChainStore};

pub struct ValidatorService {
    bus: EventBus,
    store: Arc<ChainStore>,
    payload_builder: Arc<PayloadBuilder>,
    state_processor: Arc<StateProcessor>,
    signer: BlsSecretKey,
    fee_recipient: ExecutionAddress,
    graffiti: Hash256,
    /// Subscribed at construction so no slot published between construction
    /// and the event loop spinning up can be missed. Taken by `run`.
    slots: Option<tokio::sync::mpsc::Receiver<NewSlotEvent>>,
}

impl ValidatorService {
    pub fn new(
        bus: EventBus,
        store: Arc<ChainStore>,
        payload_builder: Arc<PayloadBuilder>,
        state_processor: Arc<StateProcessor>,
        signer: BlsSecretKey,
        fee_recipient: ExecutionAddress,
        graffiti: Hash256,
    ) -> Result<Self, ChainError> {
        let slots = bus.subscribe::<NewSlotEvent>(EventId::NewSlot)?;
        Ok(Self {
            bus,
            store,
            payload_builder,
            state_processor,
            signer,
            fee_recipient,
            graffiti,
            slots: Some(slots),
        })
    }

    /// Event loop. Returns when the cancel signal fires or the bus closes.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ChainError> {
        let mut slots = self.slots.take().expect("run called once");

        loop {
            tokio::select! {
                maybe_event = slots.recv() => {
                    let Some(event) = maybe_event else { return Ok(()) };
                    if !event.is_local_proposer {
                        continue;
                    }
                    if let Err(error) = self.propose(event.slot).await {
                        warn!(slot = %event.slot, %error, "failed to assemble proposal");
                    }
                }
                () = cancel.cancelled() => {
                    debug!("validator service shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn propose(&self, slot: Slot) -> Result<(), ChainError> {
        let head_state = self.store.head_state()?.ok_or(ChainError::MissingState)?;
        let spec = self.state_processor.spec().clone();

        // Advance a copy to the proposal slot; everything the block must
        // link against (parent root, withdrawals, randao mix) lives there.
        let mut pre = head_state.clone();
        self.state_processor
            .process_slots(&mut pre, slot)
            .map_err(|source| ChainError::Transition { slot, source })?;
        let parent_root = pre.latest_block_root();

        let envelope = self.collect_payload(slot, parent_root, &pre).await?;
        let payload = ExecutionPayload::from_engine_payload(&envelope.payload)
            .map_err(|e| ChainError::MalformedPayload { height: slot.as_u64(), reason: e })?;
        let bundle = envelope.blobs_bundle;

        // Pending deposits, dense from the state's deposit cursor.
        let deposit_start = pre.eth1_deposit_index;
        let mut deposits =
            self.store.deposits_from(deposit_start, spec.max_deposits_per_block)?;

        let eth1_data = self.attach_deposit_proofs(&pre, &mut deposits)?;

        let epoch = pre.current_epoch(spec.slots_per_epoch);
        let fork = spec.active_fork_for_slot(slot);
        let randao_domain =
            spec.compute_domain(DomainType::Randao, fork, pre.genesis_validators_root);
        let mut epoch_root = Hash256::ZERO;
        epoch_root.0[..8].copy_from_slice(&epoch.as_u64().to_le_bytes());
        let randao_reveal =
            self.signer.sign(compute_signing_root(epoch_root, randao_domain).as_slice());

        let proposer_index = pre
            .validator_index_by_pubkey(&self.signer.public_key())
            .ok_or(ChainError::NotAValidator)? as u64;

        let commitments = KzgCommitments::new(bundle.commitments.clone())
            .map_err(|e| ChainError::MalformedPayload {
                height: slot.as_u64(),
                reason: format!("commitments: {e:?}"),
            })?;

        let body = BeaconBlockBody {
            randao_reveal,
            eth1_data,
            graffiti: self.graffiti,
            deposits: Deposits::new(deposits).map_err(|e| ChainError::MalformedPayload {
                height: slot.as_u64(),
                reason: format!("deposits: {e:?}"),
            })?,
            execution_payload: payload,
            blob_kzg_commitments: commitments,
        };

        let mut block = BeaconBlock {
            slot,
            proposer_index,
            parent_root,
            state_root: Hash256::ZERO,
            body,
        };

        // Fill in the state root via a dry run on a scratch snapshot.
        let unsigned = SignedBeaconBlock { message: block.clone(), signature: Default::default() };
        let mut scratch = head_state;
        let ctx = Context::for_proposal_dry_run();
        self.state_processor
            .transition(&mut scratch, &unsigned, &ctx)
            .await
            .map_err(|source| ChainError::Transition { slot, source })?;
        block.state_root = scratch.hash_tree_root();

        let signing_root =
            block_signing_root(block.hash_tree_root(), &spec, fork, pre.genesis_validators_root);
        let signature = self.signer.sign(signing_root.as_slice());
        let signed = SignedBeaconBlock { message: block, signature };

        let sidecars = self.build_sidecars(&signed, &bundle)?;

        info!(
            %slot,
            deposits = signed.message.body.deposits.len(),
            blobs = sidecars.len(),
            "assembled block proposal"
        );
        self.bus
            .publish(
                EventId::BlockProposal,
                BlockProposalEvent { block: Arc::new(signed), sidecars: Arc::new(sidecars) },
            )
            .await?;
        Ok(())
    }

    /// Prefer the optimistically prepared payload; build synchronously when
    /// the cache is cold or the engine evicted the id.
    async fn collect_payload(
        &self,
        slot: Slot,
        parent_root: Hash256,
        pre: &BeaconState,
    ) -> Result<PayloadEnvelope, ChainError> {
        match self.payload_builder.retrieve_payload(slot, parent_root).await {
            Ok(envelope) => Ok(envelope),
            Err(
                PayloadBuilderError::PayloadNotPrepared { .. } |
                PayloadBuilderError::EnginePayloadUnknown { .. },
            ) => {
                debug!(%slot, "no prepared payload, building synchronously");
                let spec = self.state_processor.spec();
                let epoch = pre.current_epoch(spec.slots_per_epoch);
                let attributes = PayloadAttributes {
                    timestamp: pre.latest_execution_payload_header.timestamp +
                        spec.seconds_per_slot,
                    prev_randao: pre.randao_mix(epoch),
                    suggested_fee_recipient: self.fee_recipient,
                    withdrawals: Some(
                        expected_withdrawals(spec, pre).iter().map(Into::into).collect(),
                    ),
                    parent_beacon_block_root: Some(parent_root),
                };
                self.payload_builder
                    .request_payload(
                        slot,
                        parent_root,
                        pre.latest_execution_block_hash(),
                        attributes,
                    )
                    .await?;
                Ok(self.payload_builder.retrieve_payload(slot, parent_root).await?)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Recompute the contract tree over every known deposit so the included
    /// ones carry fresh inclusion branches, and commit to that tree in the
    /// block's eth1 data.
    fn attach_deposit_proofs(
        &self,
        pre: &BeaconState,
        deposits: &mut [Deposit],
    ) -> Result<Eth1Data, ChainError> {
        let count = pre.eth1_deposit_index + deposits.len() as u64;
        if deposits.is_empty() {
            return Ok(pre.eth1_data.clone());
        }

        let leaves = self.store.deposit_leaves(count)?;
        let (deposit_root, branches) = deposit_tree(&leaves);
        for deposit in deposits.iter_mut() {
            deposit.proof = branches[deposit.index as usize].clone();
        }

        Ok(Eth1Data {
            deposit_root,
            deposit_count: count,
            block_hash: pre.eth1_data.block_hash,
        })
    }

    fn build_sidecars(
        &self,
        block: &SignedBeaconBlock,
        bundle: &viridian_types::blob::BlobsBundle,
    ) -> Result<BlobSidecars, ChainError> {
        let height = block.slot().as_u64();
        let malformed = |reason: String| ChainError::MalformedPayload { height, reason };

        bundle.validate().map_err(malformed)?;

        let signed_header = block.signed_header();
        let body = &block.message.body;

        let sidecars = bundle
            .blobs
            .iter()
            .enumerate()
            .map(|(index, blob)| {
                let proof = body
                    .kzg_commitment_inclusion_proof(index)
                    .and_then(inclusion_proof_vector)
                    .map_err(malformed)?;
                Ok(BlobSidecar {
                    index: index as u64,
                    blob: blob.clone(),
                    kzg_commitment: bundle.commitments[index],
                    kzg_proof: bundle.proofs[index],
                    signed_block_header: signed_header.clone(),
                    kzg_commitment_inclusion_proof: proof,
                })
            })
            .collect::<Result<Vec<_>, ChainError>>()?;

        BlobSidecars::new(sidecars)
            .map_err(|e| malformed(format!("sidecars: {e:?}")))
    }
}

/// Hash arbitrary operator-provided graffiti bytes down to the 32-byte field.
pub fn graffiti_from_bytes(bytes: &[u8]) -> Hash256 {
    if bytes.len() <= 32 {
        let mut graffiti = Hash256::ZERO;
        graffiti.0[..bytes.len()].copy_from_slice(bytes);
        graffiti
    } else {
        Hash256::from_slice(&Sha256::digest(bytes))
    }
}
