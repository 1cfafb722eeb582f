//! Eth1 (execution-layer) data tracked in the beacon state.

use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

use crate::{ExecutionHash, Hash256};

/// Snapshot of the deposit contract as seen from the consensus layer.
///
/// `deposit_root` is the root of the deposit contract's incremental Merkle
/// tree; deposit inclusion proofs in blocks are verified against it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Eth1Data {
    pub deposit_root: Hash256,
    pub deposit_count: u64,
    pub block_hash: ExecutionHash,
}
