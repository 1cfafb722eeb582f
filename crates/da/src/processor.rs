//! Blob processor: the verification pipeline in front of the availability
//! store.

use std::{sync::Arc, time::Instant};

use tracing::{debug, warn};
use viridian_types::{
    Hash256,
    blob::BlobSidecars,
    block::{SignedBeaconBlockHeader, verify_kzg_commitment_inclusion_proof},
    chain_spec::ChainSpec,
    slot::Slot,
};

use crate::{
    error::BlobError, metrics::BlobMetrics, store::AvailabilityStore, verifier::KzgVerifier,
};

pub struct BlobProcessor {
    chain_spec: ChainSpec,
    verifier: KzgVerifier,
    store: Arc<dyn AvailabilityStore>,
    metrics: BlobMetrics,
}

impl BlobProcessor {
    pub fn new(
        chain_spec: ChainSpec,
        store: Arc<dyn AvailabilityStore>,
        metrics: BlobMetrics,
    ) -> Self {
        Self { chain_spec, verifier: KzgVerifier::new(), store, metrics }
    }

    /// Verify a sidecar batch against the block header the caller has already
    /// committed to. Any failure aborts the whole batch; empty batches pass.
    ///
    /// Pipeline per sidecar, in order:
    /// 1. index below the chain-spec blob cap,
    /// 2. signed header equals the expected header (equality on root),
    /// 3. commitment inclusion proof against the header's body root,
    /// 4. batched KZG proof check over all sidecars at once.
    pub fn verify_sidecars(
        &self,
        sidecars: &BlobSidecars,
        expected_header: &SignedBeaconBlockHeader,
    ) -> Result<(), BlobError> {
        if sidecars.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let slot = expected_header.message.slot;
        let result = self.verify_sidecars_inner(sidecars, expected_header, slot);
        self.metrics.record_verification(result.is_ok(), start.elapsed().as_secs_f64());

        if let Err(error) = &result {
            warn!(%slot, count = sidecars.len(), %error, "sidecar batch rejected");
        }
        result
    }

    fn verify_sidecars_inner(
        &self,
        sidecars: &BlobSidecars,
        expected_header: &SignedBeaconBlockHeader,
        slot: Slot,
    ) -> Result<(), BlobError> {
        let expected_root = expected_header.message.hash_tree_root();

        for sidecar in sidecars.iter() {
            if sidecar.index >= self.chain_spec.max_blobs_per_block {
                return Err(BlobError::IndexOutOfBounds {
                    slot,
                    index: sidecar.index,
                    max_blobs: self.chain_spec.max_blobs_per_block,
                });
            }

            if sidecar.signed_block_header.message.hash_tree_root() != expected_root {
                return Err(BlobError::HeaderMismatch { slot, index: sidecar.index });
            }

            let body_root = sidecar.signed_block_header.message.body_root;
            let proof: Vec<Hash256> = sidecar.kzg_commitment_inclusion_proof.to_vec();
            if !verify_kzg_commitment_inclusion_proof(
                &sidecar.kzg_commitment,
                &proof,
                sidecar.index as usize,
                body_root,
            ) {
                return Err(BlobError::InclusionProofInvalid { slot, index: sidecar.index });
            }
        }

        self.verifier.verify_batch(sidecars, slot)
    }

    /// Persist a verified batch, keyed by the slot of its header. Must only be
    /// called with batches that passed [`Self::verify_sidecars`].
    pub async fn process_sidecars(&self, sidecars: &BlobSidecars) -> Result<(), BlobError> {
        let Some(first) = sidecars.first() else {
            debug!("no sidecars to persist");
            return Ok(());
        };

        let slot = first.slot();
        self.store.persist(slot, sidecars).await?;
        self.metrics.record_persisted(sidecars.len());
        Ok(())
    }

    /// DA-window pruning passthrough.
    pub async fn prune_below(&self, slot: Slot) -> Result<usize, BlobError> {
        self.store.prune_below(slot).await
    }
}
