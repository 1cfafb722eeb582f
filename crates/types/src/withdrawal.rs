//! Withdrawals swept from the validator set into the execution layer.

use alloy_eips::eip4895;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

use crate::{ExecutionAddress, Gwei};

/// A single withdrawal as it appears in an execution payload. The state
/// transition recomputes the expected list with the sweep algorithm and
/// requires bit-exact equality with what the payload carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Withdrawal {
    pub index: u64,
    pub validator_index: u64,
    pub address: ExecutionAddress,
    pub amount: Gwei,
}

impl From<&Withdrawal> for eip4895::Withdrawal {
    fn from(withdrawal: &Withdrawal) -> Self {
        Self {
            index: withdrawal.index,
            validator_index: withdrawal.validator_index,
            address: withdrawal.address,
            amount: withdrawal.amount,
        }
    }
}

impl From<&eip4895::Withdrawal> for Withdrawal {
    fn from(withdrawal: &eip4895::Withdrawal) -> Self {
        Self {
            index: withdrawal.index,
            validator_index: withdrawal.validator_index,
            address: withdrawal.address,
            amount: withdrawal.amount,
        }
    }
}
