//! KZG proof verification.
//!
//! Wraps `c-kzg` with the embedded Ethereum mainnet trusted setup. The curve
//! math is a black box; this module only marshals bytes and applies the batch
//! API, which is substantially faster than per-blob verification.

use c_kzg::{Blob as CKzgBlob, Bytes48, KzgSettings, ethereum_kzg_settings};
use viridian_types::{blob::BlobSidecar, slot::Slot};

use crate::error::BlobError;

/// Precomputation width for fixed-base MSM. Zero trades a little verify speed
/// for a small memory footprint, matching what other consensus clients ship.
const NO_PRECOMPUTE: u64 = 0;

pub struct KzgVerifier {
    settings: &'static KzgSettings,
}

impl KzgVerifier {
    /// Verifier backed by the embedded mainnet trusted setup.
    pub fn new() -> Self {
        Self { settings: ethereum_kzg_settings(NO_PRECOMPUTE) }
    }

    /// Batch-verify every sidecar's blob against its commitment and proof.
    ///
    /// The batch pairing check cannot identify which blob failed; callers get
    /// a batch-level error and the whole batch is rejected.
    pub fn verify_batch(&self, sidecars: &[BlobSidecar], slot: Slot) -> Result<(), BlobError> {
        if sidecars.is_empty() {
            return Ok(());
        }

        let blobs: Vec<CKzgBlob> = sidecars
            .iter()
            .map(|s| CKzgBlob::from_bytes(s.blob.as_bytes()))
            .collect::<Result<_, _>>()
            .map_err(|e| BlobError::Malformed(format!("blob: {e:?}")))?;

        let commitments: Vec<Bytes48> = sidecars
            .iter()
            .map(|s| Bytes48::from_bytes(s.kzg_commitment.as_bytes()))
            .collect::<Result<_, _>>()
            .map_err(|e| BlobError::Malformed(format!("commitment: {e:?}")))?;

        let proofs: Vec<Bytes48> = sidecars
            .iter()
            .map(|s| Bytes48::from_bytes(s.kzg_proof.as_bytes()))
            .collect::<Result<_, _>>()
            .map_err(|e| BlobError::Malformed(format!("proof: {e:?}")))?;

        let valid = self
            .settings
            .verify_blob_kzg_proof_batch(&blobs, &commitments, &proofs)
            .map_err(|e| BlobError::Malformed(format!("kzg: {e:?}")))?;

        if !valid {
            return Err(BlobError::KzgProofInvalid { slot, count: sidecars.len() });
        }
        Ok(())
    }
}

impl Default for KzgVerifier {
    fn default() -> Self {
        Self::new()
    }
}
