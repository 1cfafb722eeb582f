//! EIP-4844 blob types: blobs, KZG commitments and proofs, sidecars.
//!
//! Blobs are fixed 131,072-byte data chunks committed to via KZG. The block
//! body carries only the 48-byte commitments; the blob data travels beside the
//! block as [`BlobSidecar`]s, each carrying a Merkle proof tying its
//! commitment back into the block body root.

use alloy_rpc_types_engine::BlobsBundleV1;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ssz_derive::{Decode, Encode};
use ssz_types::{
    FixedVector, VariableList,
    typenum::{U16, U131072, U4096},
};
use tree_hash::{PackedEncoding, TreeHash, TreeHashType};
use tree_hash_derive::TreeHash;

use crate::{
    B256, Hash256,
    block::SignedBeaconBlockHeader,
    crypto::impl_fixed_bytes_codecs,
    slot::Slot,
};

/// Exact byte length of a blob: 4096 field elements of 32 bytes.
pub const BYTES_PER_BLOB: usize = 131_072;

/// Compressed BLS12-381 G1 point length, shared by commitments and proofs.
pub const BYTES_PER_COMMITMENT: usize = 48;

/// SSZ capacity of the commitments list; fixes the Merkle tree depth used by
/// inclusion proofs. The per-block protocol cap lives in the chain spec.
pub const MAX_BLOB_COMMITMENTS_PER_BLOCK: usize = 4096;

/// Branch length of a commitment inclusion proof: the commitments subtree
/// (depth 12 plus the length mixin) and the block-body subtree (depth 3).
pub const KZG_COMMITMENT_INCLUSION_PROOF_DEPTH: usize = 16;

/// Versioned-hash prefix per EIP-4844.
pub const VERSIONED_HASH_VERSION_KZG: u8 = 0x01;

/// Fixed-size blob payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
#[ssz(struct_behaviour = "transparent")]
#[tree_hash(struct_behaviour = "transparent")]
#[serde(transparent)]
pub struct Blob(FixedVector<u8, U131072>);

impl Blob {
    /// Validates the exact EIP-4844 blob length.
    pub fn new(data: Vec<u8>) -> Result<Self, String> {
        if data.len() != BYTES_PER_BLOB {
            return Err(format!(
                "invalid blob size: expected {BYTES_PER_BLOB} bytes, got {}",
                data.len()
            ));
        }
        FixedVector::new(data).map(Self).map_err(|e| format!("blob: {e:?}"))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// An all-zero blob, a valid polynomial useful in tests.
    pub fn zero() -> Self {
        Self(FixedVector::new(vec![0u8; BYTES_PER_BLOB]).expect("length matches"))
    }
}

/// KZG commitment to a blob (compressed G1 point).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KzgCommitment(pub [u8; BYTES_PER_COMMITMENT]);

/// KZG proof for a blob/commitment pair (compressed G1 point).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct KzgProof(pub [u8; BYTES_PER_COMMITMENT]);

impl KzgCommitment {
    pub const fn as_bytes(&self) -> &[u8; BYTES_PER_COMMITMENT] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        let array: [u8; BYTES_PER_COMMITMENT] =
            bytes.try_into().map_err(|_| format!("invalid commitment length: {}", bytes.len()))?;
        Ok(Self(array))
    }
}

impl KzgProof {
    pub const fn as_bytes(&self) -> &[u8; BYTES_PER_COMMITMENT] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        let array: [u8; BYTES_PER_COMMITMENT] =
            bytes.try_into().map_err(|_| format!("invalid proof length: {}", bytes.len()))?;
        Ok(Self(array))
    }
}

impl_fixed_bytes_codecs!(KzgCommitment, BYTES_PER_COMMITMENT);
impl_fixed_bytes_codecs!(KzgProof, BYTES_PER_COMMITMENT);

/// Commitment list as carried in a block body.
pub type KzgCommitments = VariableList<KzgCommitment, U4096>;

/// `versioned_hash = 0x01 ++ sha256(commitment)[1..]`, the form execution
/// payloads reference blobs by.
pub fn kzg_to_versioned_hash(commitment: &KzgCommitment) -> B256 {
    alloy_eips::eip4844::kzg_to_versioned_hash(commitment.as_bytes())
}

/// A blob plus everything needed to verify it belongs to a block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BlobSidecar {
    pub index: u64,
    pub blob: Blob,
    pub kzg_commitment: KzgCommitment,
    pub kzg_proof: KzgProof,
    pub signed_block_header: SignedBeaconBlockHeader,
    pub kzg_commitment_inclusion_proof: FixedVector<Hash256, U16>,
}

impl BlobSidecar {
    pub fn slot(&self) -> Slot {
        self.signed_block_header.message.slot
    }
}

/// Sidecar batch for one block, SSZ-decoded from consensus tx position 1.
pub type BlobSidecars = VariableList<BlobSidecar, U4096>;

/// Blobs bundle returned by `engine_getPayloadV3`, converted out of the alloy
/// wire type with length validation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlobsBundle {
    pub commitments: Vec<KzgCommitment>,
    pub proofs: Vec<KzgProof>,
    pub blobs: Vec<Blob>,
}

impl BlobsBundle {
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Commitments, proofs and blobs must line up one-to-one.
    pub fn validate(&self) -> Result<(), String> {
        if self.commitments.len() != self.blobs.len() || self.proofs.len() != self.blobs.len() {
            return Err(format!(
                "blobs bundle length mismatch: {} blobs, {} commitments, {} proofs",
                self.blobs.len(),
                self.commitments.len(),
                self.proofs.len()
            ));
        }
        Ok(())
    }

    pub fn versioned_hashes(&self) -> Vec<B256> {
        self.commitments.iter().map(kzg_to_versioned_hash).collect()
    }
}

impl TryFrom<BlobsBundleV1> for BlobsBundle {
    type Error = String;

    fn try_from(bundle: BlobsBundleV1) -> Result<Self, Self::Error> {
        let commitments = bundle
            .commitments
            .iter()
            .map(|c| KzgCommitment::from_slice(c.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let proofs = bundle
            .proofs
            .iter()
            .map(|p| KzgProof::from_slice(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let blobs = bundle
            .blobs
            .iter()
            .map(|b| Blob::new(b.as_ref().to_vec()))
            .collect::<Result<Vec<_>, _>>()?;

        let converted = Self { commitments, proofs, blobs };
        converted.validate()?;
        Ok(converted)
    }
}

#[cfg(test)]
mod tests {
    use ssz::{Decode, Encode};

    use super::*;

    #[test]
    fn blob_length_is_enforced() {
        assert!(Blob::new(vec![0u8; 100]).is_err());
        assert!(Blob::new(vec![0u8; BYTES_PER_BLOB]).is_ok());
    }

    #[test]
    fn versioned_hash_has_kzg_prefix() {
        let commitment = KzgCommitment([0xab; BYTES_PER_COMMITMENT]);
        let hash = kzg_to_versioned_hash(&commitment);
        assert_eq!(hash[0], VERSIONED_HASH_VERSION_KZG);
    }

    #[test]
    fn commitment_ssz_roundtrip() {
        let commitment = KzgCommitment([7u8; BYTES_PER_COMMITMENT]);
        let bytes = commitment.as_ssz_bytes();
        assert_eq!(bytes.len(), BYTES_PER_COMMITMENT);
        assert_eq!(KzgCommitment::from_ssz_bytes(&bytes).unwrap(), commitment);
    }

    #[test]
    fn bundle_validation_catches_mismatch() {
        let bundle = BlobsBundle {
            commitments: vec![KzgCommitment::default()],
            proofs: vec![],
            blobs: vec![Blob::zero()],
        };
        assert!(bundle.validate().is_err());
    }
}
