//! Beacon block containers and commitment inclusion proofs.
//!
//! The SSZ hash tree root of a block is its canonical identity. Decoding is
//! fork-versioned: the host consensus hands us opaque bytes and the slot, the
//! chain spec maps the slot to a [`Fork`], and the decoder switches on it.

use serde::{Deserialize, Serialize};
use ssz::{Decode, DecodeError, Encode};
use ssz_derive::{Decode, Encode};
use ssz_types::{FixedVector, VariableList, typenum::U16};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

use crate::{
    Hash256,
    blob::{
        KZG_COMMITMENT_INCLUSION_PROOF_DEPTH, KzgCommitment, KzgCommitments,
        MAX_BLOB_COMMITMENTS_PER_BLOCK,
    },
    chain_spec::Fork,
    crypto::{BlsPublicKey, BlsSignature},
    deposit::Deposit,
    eth1::Eth1Data,
    execution_payload::ExecutionPayload,
    merkle::{self, MerkleTree},
    slot::Slot,
};

/// Deposits list bound for a single block body.
pub type Deposits = VariableList<Deposit, U16>;

/// Number of fields in [`BeaconBlockBody`]; fixes the body merkle fan-out.
const BODY_FIELD_COUNT: usize = 6;

/// Position of `blob_kzg_commitments` within the body container.
pub const KZG_COMMITMENTS_FIELD_INDEX: usize = 5;

/// A beacon block header: the block tuple with the body collapsed to its root.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct BeaconBlockHeader {
    pub slot: Slot,
    pub proposer_index: u64,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub body_root: Hash256,
}

impl BeaconBlockHeader {
    pub fn hash_tree_root(&self) -> Hash256 {
        Hash256::from_slice(self.tree_hash_root().as_ref())
    }
}

/// Header plus the proposer's BLS signature over its signing root.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SignedBeaconBlockHeader {
    pub message: BeaconBlockHeader,
    pub signature: BlsSignature,
}

/// Block body. Execution payload contents are opaque to the consensus layer
/// except for the linkage fields the state transition checks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BeaconBlockBody {
    pub randao_reveal: BlsSignature,
    pub eth1_data: Eth1Data,
    pub graffiti: Hash256,
    pub deposits: Deposits,
    pub execution_payload: ExecutionPayload,
    pub blob_kzg_commitments: KzgCommitments,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BeaconBlock {
    pub slot: Slot,
    pub proposer_index: u64,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub body: BeaconBlockBody,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SignedBeaconBlock {
    pub message: BeaconBlock,
    pub signature: BlsSignature,
}

impl BeaconBlock {
    pub fn hash_tree_root(&self) -> Hash256 {
        Hash256::from_slice(self.tree_hash_root().as_ref())
    }

    /// Header form with the body collapsed to its root.
    pub fn to_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot,
            proposer_index: self.proposer_index,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body_root: Hash256::from_slice(self.body.tree_hash_root().as_ref()),
        }
    }

    /// Fork-versioned SSZ decoding. Deneb is the only live fork; new forks add
    /// arms here without touching call sites.
    pub fn from_ssz_bytes_for_fork(bytes: &[u8], fork: Fork) -> Result<Self, DecodeError> {
        match fork {
            Fork::Deneb => Self::from_ssz_bytes(bytes),
        }
    }
}

impl SignedBeaconBlock {
    pub fn hash_tree_root(&self) -> Hash256 {
        self.message.hash_tree_root()
    }

    pub fn slot(&self) -> Slot {
        self.message.slot
    }

    pub fn signed_header(&self) -> SignedBeaconBlockHeader {
        SignedBeaconBlockHeader { message: self.message.to_header(), signature: self.signature }
    }

    pub fn from_ssz_bytes_for_fork(bytes: &[u8], fork: Fork) -> Result<Self, DecodeError> {
        match fork {
            Fork::Deneb => Self::from_ssz_bytes(bytes),
        }
    }
}

impl BeaconBlockBody {
    pub fn hash_tree_root(&self) -> Hash256 {
        Hash256::from_slice(self.tree_hash_root().as_ref())
    }

    /// Roots of the six body fields, in container order. Inclusion proofs fold
    /// through this level, so the order here is consensus-critical.
    fn field_roots(&self) -> [Hash256; BODY_FIELD_COUNT] {
        [
            Hash256::from_slice(self.randao_reveal.tree_hash_root().as_ref()),
            Hash256::from_slice(self.eth1_data.tree_hash_root().as_ref()),
            self.graffiti,
            Hash256::from_slice(self.deposits.tree_hash_root().as_ref()),
            Hash256::from_slice(self.execution_payload.tree_hash_root().as_ref()),
            Hash256::from_slice(self.blob_kzg_commitments.tree_hash_root().as_ref()),
        ]
    }

    /// Generate the inclusion proof for `blob_kzg_commitments[index]`.
    ///
    /// Two concatenated branches: commitment up to the commitments list root
    /// (fixed subtree depth plus the length mixin), then the list root up to
    /// the body root.
    pub fn kzg_commitment_inclusion_proof(
        &self,
        index: usize,
    ) -> Result<Vec<Hash256>, String> {
        let commitments = &self.blob_kzg_commitments;
        if index >= commitments.len() {
            return Err(format!(
                "commitment index {index} out of bounds for {} commitments",
                commitments.len()
            ));
        }

        let commitments_depth = merkle::cover_depth(MAX_BLOB_COMMITMENTS_PER_BLOCK);
        let leaves: Vec<Hash256> = commitments
            .iter()
            .map(|c| Hash256::from_slice(c.tree_hash_root().as_ref()))
            .collect();
        let commitments_tree = MerkleTree::create(&leaves, commitments_depth);
        let mut proof =
            commitments_tree.proof(index).map_err(|e| format!("commitments proof: {e}"))?;

        // The length mixin acts as one more sibling above the subtree root.
        let mut length_chunk = [0u8; 32];
        length_chunk[..8].copy_from_slice(&(commitments.len() as u64).to_le_bytes());
        proof.push(Hash256::from(length_chunk));

        let body_tree =
            MerkleTree::create(&self.field_roots(), merkle::cover_depth(BODY_FIELD_COUNT));
        let body_branch = body_tree
            .proof(KZG_COMMITMENTS_FIELD_INDEX)
            .map_err(|e| format!("body proof: {e}"))?;
        proof.extend(body_branch);

        debug_assert_eq!(proof.len(), KZG_COMMITMENT_INCLUSION_PROOF_DEPTH);
        Ok(proof)
    }
}

/// Verify that `commitment` sits at `index` in the commitments list of the
/// body committed to by `body_root`.
pub fn verify_kzg_commitment_inclusion_proof(
    commitment: &KzgCommitment,
    proof: &[Hash256],
    index: usize,
    body_root: Hash256,
) -> bool {
    if proof.len() != KZG_COMMITMENT_INCLUSION_PROOF_DEPTH ||
        index >= MAX_BLOB_COMMITMENTS_PER_BLOCK
    {
        return false;
    }

    // Branch through the commitments list, including the length mixin.
    let commitments_branch_len = merkle::cover_depth(MAX_BLOB_COMMITMENTS_PER_BLOCK) + 1;
    let (list_branch, body_branch) = proof.split_at(commitments_branch_len);

    let leaf = Hash256::from_slice(commitment.tree_hash_root().as_ref());
    let list_root = merkle::merkle_root_from_branch(leaf, list_branch, index);
    let reconstructed =
        merkle::merkle_root_from_branch(list_root, body_branch, KZG_COMMITMENTS_FIELD_INDEX);

    reconstructed == body_root
}

/// Convenience for sidecar construction: fixed-length proof form.
pub fn inclusion_proof_vector(
    proof: Vec<Hash256>,
) -> Result<FixedVector<Hash256, U16>, String> {
    FixedVector::new(proof).map_err(|e| format!("inclusion proof: {e:?}"))
}

/// Signing seam used by proposers and verifiers: the proposer signature covers
/// the block root bound to the proposer domain.
pub fn block_signing_root(
    block_root: Hash256,
    spec: &crate::chain_spec::ChainSpec,
    fork: Fork,
    genesis_validators_root: Hash256,
) -> Hash256 {
    let domain = spec.compute_domain(
        crate::chain_spec::DomainType::BeaconProposer,
        fork,
        genesis_validators_root,
    );
    crate::signing::compute_signing_root(block_root, domain)
}

/// Verify the proposer signature on a signed block.
pub fn verify_block_signature(
    block: &SignedBeaconBlock,
    proposer_pubkey: &BlsPublicKey,
    spec: &crate::chain_spec::ChainSpec,
    genesis_validators_root: Hash256,
) -> bool {
    let fork = spec.active_fork_for_slot(block.slot());
    let signing_root =
        block_signing_root(block.hash_tree_root(), spec, fork, genesis_validators_root);
    block.signature.verify(proposer_pubkey, signing_root.as_slice())
}
