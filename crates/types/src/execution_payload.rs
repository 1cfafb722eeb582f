//! Execution payload containers (Deneb layout).
//!
//! The consensus layer treats payload contents as opaque except for the
//! linkage fields the state transition checks (parent hash, timestamp,
//! prev-randao, blob gas) and the withdrawals list. Payloads cross the engine
//! API as `alloy` types; these containers exist so blocks and states have a
//! deterministic SSZ encoding and hash tree root.

use alloy_rpc_types_engine::{ExecutionPayloadV1, ExecutionPayloadV2, ExecutionPayloadV3};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{
    FixedVector, VariableList,
    typenum::{U16, U32, U256, U1048576, U1073741824},
};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

use crate::{ExecutionAddress, ExecutionHash, Hash256, U256 as Uint256, withdrawal::Withdrawal};

/// An opaque, length-bounded execution transaction.
pub type Transaction = VariableList<u8, U1073741824>;

/// Transactions list as carried in a payload.
pub type Transactions = VariableList<Transaction, U1048576>;

/// Withdrawals list as carried in a payload.
pub type Withdrawals = VariableList<Withdrawal, U16>;

/// Full execution payload embedded in a beacon block body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct ExecutionPayload {
    pub parent_hash: ExecutionHash,
    pub fee_recipient: ExecutionAddress,
    pub state_root: Hash256,
    pub receipts_root: Hash256,
    pub logs_bloom: FixedVector<u8, U256>,
    pub prev_randao: Hash256,
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: VariableList<u8, U32>,
    pub base_fee_per_gas: Uint256,
    pub block_hash: ExecutionHash,
    pub transactions: Transactions,
    pub withdrawals: Withdrawals,
    pub blob_gas_used: u64,
    pub excess_blob_gas: u64,
}

/// Header form of the payload: transactions and withdrawals replaced by their
/// list roots. This is what the beacon state retains.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct ExecutionPayloadHeader {
    pub parent_hash: ExecutionHash,
    pub fee_recipient: ExecutionAddress,
    pub state_root: Hash256,
    pub receipts_root: Hash256,
    pub logs_bloom: FixedVector<u8, U256>,
    pub prev_randao: Hash256,
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: VariableList<u8, U32>,
    pub base_fee_per_gas: Uint256,
    pub block_hash: ExecutionHash,
    pub transactions_root: Hash256,
    pub withdrawals_root: Hash256,
    pub blob_gas_used: u64,
    pub excess_blob_gas: u64,
}

impl ExecutionPayload {
    /// Collapse to the header the state retains after the payload is applied.
    pub fn to_header(&self) -> ExecutionPayloadHeader {
        ExecutionPayloadHeader {
            parent_hash: self.parent_hash,
            fee_recipient: self.fee_recipient,
            state_root: self.state_root,
            receipts_root: self.receipts_root,
            logs_bloom: self.logs_bloom.clone(),
            prev_randao: self.prev_randao,
            block_number: self.block_number,
            gas_limit: self.gas_limit,
            gas_used: self.gas_used,
            timestamp: self.timestamp,
            extra_data: self.extra_data.clone(),
            base_fee_per_gas: self.base_fee_per_gas,
            block_hash: self.block_hash,
            transactions_root: Hash256::from_slice(
                self.transactions.tree_hash_root().as_ref(),
            ),
            withdrawals_root: Hash256::from_slice(self.withdrawals.tree_hash_root().as_ref()),
            blob_gas_used: self.blob_gas_used,
            excess_blob_gas: self.excess_blob_gas,
        }
    }

    /// Convert to the wire form sent over `engine_newPayloadV3`.
    pub fn to_engine_payload(&self) -> ExecutionPayloadV3 {
        ExecutionPayloadV3 {
            payload_inner: ExecutionPayloadV2 {
                payload_inner: ExecutionPayloadV1 {
                    parent_hash: self.parent_hash,
                    fee_recipient: self.fee_recipient,
                    state_root: self.state_root,
                    receipts_root: self.receipts_root,
                    logs_bloom: crate::Bloom::from_slice(&self.logs_bloom),
                    prev_randao: self.prev_randao,
                    block_number: self.block_number,
                    gas_limit: self.gas_limit,
                    gas_used: self.gas_used,
                    timestamp: self.timestamp,
                    extra_data: self.extra_data.to_vec().into(),
                    base_fee_per_gas: self.base_fee_per_gas,
                    block_hash: self.block_hash,
                    transactions: self.transactions.iter().map(|tx| tx.to_vec().into()).collect(),
                },
                withdrawals: self.withdrawals.iter().map(Into::into).collect(),
            },
            blob_gas_used: self.blob_gas_used,
            excess_blob_gas: self.excess_blob_gas,
        }
    }

    /// Convert an engine payload into the consensus container.
    ///
    /// Fails only when the engine hands back something over the SSZ bounds,
    /// which indicates a broken execution client rather than a bad block.
    pub fn from_engine_payload(payload: &ExecutionPayloadV3) -> Result<Self, String> {
        let v1 = &payload.payload_inner.payload_inner;

        let transactions = payload
            .payload_inner
            .payload_inner
            .transactions
            .iter()
            .map(|tx| Transaction::new(tx.to_vec()).map_err(|e| format!("transaction: {e:?}")))
            .collect::<Result<Vec<_>, _>>()
            .and_then(|txs| Transactions::new(txs).map_err(|e| format!("transactions: {e:?}")))?;

        let withdrawals = Withdrawals::new(
            payload.payload_inner.withdrawals.iter().map(Into::into).collect(),
        )
        .map_err(|e| format!("withdrawals: {e:?}"))?;

        Ok(Self {
            parent_hash: v1.parent_hash,
            fee_recipient: v1.fee_recipient,
            state_root: v1.state_root,
            receipts_root: v1.receipts_root,
            logs_bloom: FixedVector::new(v1.logs_bloom.as_slice().to_vec())
                .map_err(|e| format!("logs bloom: {e:?}"))?,
            prev_randao: v1.prev_randao,
            block_number: v1.block_number,
            gas_limit: v1.gas_limit,
            gas_used: v1.gas_used,
            timestamp: v1.timestamp,
            extra_data: VariableList::new(v1.extra_data.to_vec())
                .map_err(|e| format!("extra data: {e:?}"))?,
            base_fee_per_gas: v1.base_fee_per_gas,
            block_hash: v1.block_hash,
            transactions,
            withdrawals,
            blob_gas_used: payload.blob_gas_used,
            excess_blob_gas: payload.excess_blob_gas,
        })
    }
}

impl Default for ExecutionPayload {
    fn default() -> Self {
        Self {
            parent_hash: ExecutionHash::ZERO,
            fee_recipient: ExecutionAddress::ZERO,
            state_root: Hash256::ZERO,
            receipts_root: Hash256::ZERO,
            logs_bloom: FixedVector::default(),
            prev_randao: Hash256::ZERO,
            block_number: 0,
            gas_limit: 0,
            gas_used: 0,
            timestamp: 0,
            extra_data: VariableList::empty(),
            base_fee_per_gas: Uint256::ZERO,
            block_hash: ExecutionHash::ZERO,
            transactions: VariableList::empty(),
            withdrawals: VariableList::empty(),
            blob_gas_used: 0,
            excess_blob_gas: 0,
        }
    }
}
