//! Blob pipeline errors.

use thiserror::Error;
use viridian_types::slot::Slot;

#[derive(Debug, Error)]
pub enum BlobError {
    /// Sidecar index at or above the chain-spec blob cap.
    #[error("sidecar index {index} exceeds the {max_blobs} blob limit at slot {slot}")]
    IndexOutOfBounds { slot: Slot, index: u64, max_blobs: u64 },

    /// Sidecar header does not match the block being processed.
    #[error("sidecar {index} header root does not match the block at slot {slot}")]
    HeaderMismatch { slot: Slot, index: u64 },

    /// Commitment inclusion proof failed against the body root.
    #[error("sidecar {index} inclusion proof invalid at slot {slot}")]
    InclusionProofInvalid { slot: Slot, index: u64 },

    /// The batched KZG check failed; the batch API cannot name the culprit.
    #[error("KZG proof verification failed for {count} sidecars at slot {slot}")]
    KzgProofInvalid { slot: Slot, count: usize },

    /// Malformed blob, commitment or proof bytes.
    #[error("malformed sidecar data: {0}")]
    Malformed(String),

    /// Availability store failure.
    #[error("availability store error: {0}")]
    Store(String),
}
