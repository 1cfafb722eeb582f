//! Data availability: blob sidecar verification and persistence.
//!
//! The [`BlobProcessor`] is the security gate between gossip and storage.
//! A sidecar batch passes, in order: index bounds, header equality against
//! the block being processed, the Merkle inclusion proof of each commitment,
//! and a batched KZG proof check. Only then does the batch reach the
//! availability store, in a single atomic persist keyed by slot.

pub mod error;
pub mod metrics;
pub mod processor;
pub mod store;
pub mod verifier;

pub use error::BlobError;
pub use processor::BlobProcessor;
pub use store::{AvailabilityStore, MemoryAvailabilityStore, RedbAvailabilityStore};
pub use verifier::KzgVerifier;
