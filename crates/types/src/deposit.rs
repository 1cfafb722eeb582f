//! Deposits drawn from the execution-layer deposit contract.

use serde::{Deserialize, Serialize};
use ssz_types::{FixedVector, typenum::U33};
use ssz_derive::{Decode, Encode};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

use crate::{
    Gwei, Hash256,
    chain_spec::{ChainSpec, DomainType, Fork},
    crypto::{BlsPublicKey, BlsSignature},
    merkle,
    signing::compute_signing_root,
};

/// Depth of the deposit contract's incremental Merkle tree.
pub const DEPOSIT_CONTRACT_TREE_DEPTH: usize = 32;

/// Branch length for a deposit inclusion proof: contract tree plus the
/// deposit-count length mixin.
pub const DEPOSIT_PROOF_LENGTH: usize = DEPOSIT_CONTRACT_TREE_DEPTH + 1;

/// A deposit as carried in a beacon block. `index` is dense and monotonic from
/// zero; `proof` is the Merkle branch placing the deposit data under
/// `eth1_data.deposit_root`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Deposit {
    pub pubkey: BlsPublicKey,
    pub withdrawal_credentials: Hash256,
    pub amount: Gwei,
    pub signature: BlsSignature,
    pub index: u64,
    pub proof: FixedVector<Hash256, U33>,
}

/// The leaf container hashed into the deposit contract tree (what the
/// contract itself merkleizes).
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, TreeHash)]
pub struct DepositData {
    pub pubkey: BlsPublicKey,
    pub withdrawal_credentials: Hash256,
    pub amount: Gwei,
    pub signature: BlsSignature,
}

/// Unsigned deposit message, the object covered by the deposit signature.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, TreeHash)]
pub struct DepositMessage {
    pub pubkey: BlsPublicKey,
    pub withdrawal_credentials: Hash256,
    pub amount: Gwei,
}

impl Deposit {
    /// Root of the contract-tree leaf for this deposit.
    pub fn leaf_root(&self) -> Hash256 {
        let data = DepositData {
            pubkey: self.pubkey,
            withdrawal_credentials: self.withdrawal_credentials,
            amount: self.amount,
            signature: self.signature,
        };
        Hash256::from_slice(data.tree_hash_root().as_ref())
    }

    /// Verify the inclusion branch against the deposit root committed in the
    /// state's eth1 data. The final branch element witnesses the contract's
    /// deposit count (SSZ length mixin).
    pub fn verify_inclusion(&self, deposit_root: Hash256) -> bool {
        merkle::verify_merkle_branch(
            self.leaf_root(),
            &self.proof,
            DEPOSIT_PROOF_LENGTH,
            self.index as usize,
            deposit_root,
        )
    }

    /// Verify the proof-of-possession signature over the deposit data.
    ///
    /// Deposit signatures are bound to the genesis fork version with a zero
    /// genesis-validators-root: the contract cannot know either.
    pub fn verify_signature(&self, spec: &ChainSpec) -> bool {
        let message = DepositMessage {
            pubkey: self.pubkey,
            withdrawal_credentials: self.withdrawal_credentials,
            amount: self.amount,
        };
        let domain = spec.compute_domain(DomainType::Deposit, Fork::Deneb, Hash256::ZERO);
        let root = message.tree_hash_root();
        let signing_root = compute_signing_root(Hash256::from_slice(root.as_ref()), domain);
        self.signature.verify(&self.pubkey, signing_root.as_slice())
    }

    /// Compute the signature for `message` fields with `secret_key`. Used by
    /// genesis tooling and tests.
    pub fn sign_deposit_data(
        secret_key: &crate::crypto::BlsSecretKey,
        withdrawal_credentials: Hash256,
        amount: Gwei,
        spec: &ChainSpec,
    ) -> BlsSignature {
        let message = DepositMessage {
            pubkey: secret_key.public_key(),
            withdrawal_credentials,
            amount,
        };
        let domain = spec.compute_domain(DomainType::Deposit, Fork::Deneb, Hash256::ZERO);
        let root = message.tree_hash_root();
        let signing_root = compute_signing_root(Hash256::from_slice(root.as_ref()), domain);
        secret_key.sign(signing_root.as_slice())
    }
}

/// Build the contract-shaped tree over deposit leaves: returns the mixed-in
/// root and the per-leaf inclusion branches (count mixin appended).
///
/// Proposers use this to attach proofs to pending deposits; the contract's
/// incremental tree produces identical roots.
pub fn deposit_tree(leaves: &[Hash256]) -> (Hash256, Vec<FixedVector<Hash256, U33>>) {
    let tree = merkle::MerkleTree::create(leaves, DEPOSIT_CONTRACT_TREE_DEPTH);
    let root = merkle::mix_in_length(tree.root(), leaves.len());

    let mut length_chunk = [0u8; 32];
    length_chunk[..8].copy_from_slice(&(leaves.len() as u64).to_le_bytes());

    let branches = (0..leaves.len())
        .map(|i| {
            let mut branch = tree.proof(i).expect("index bounded by leaf count");
            branch.push(Hash256::from(length_chunk));
            FixedVector::new(branch).expect("branch length is DEPOSIT_PROOF_LENGTH")
        })
        .collect();

    (root, branches)
}
