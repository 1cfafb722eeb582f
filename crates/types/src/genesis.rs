//! Genesis file format.
//!
//! The host consensus hands `init_genesis` a JSON blob; this is its schema.
//! Deposits listed here become the initial validator set via the state
//! transition's genesis path.

use serde::{Deserialize, Serialize};

use crate::{ExecutionHash, deposit::Deposit, execution_payload::ExecutionPayloadHeader};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Genesis {
    /// Unix timestamp of slot zero.
    pub genesis_time: u64,
    /// Execution block the chain anchors to.
    pub eth1_block_hash: ExecutionHash,
    /// Genesis deposit set, dense-indexed from zero.
    pub deposits: Vec<Deposit>,
    /// Header of the genesis execution payload.
    pub execution_payload_header: ExecutionPayloadHeader,
}

impl Genesis {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}
