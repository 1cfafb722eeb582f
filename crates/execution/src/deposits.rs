//! Deposit-contract follower.
//!
//! Reads `DepositEvent` logs from the execution client over `eth_getLogs`,
//! decodes them into [`Deposit`]s and reports the current head so the caller
//! can honor the follow distance. Deposits surfaced here carry no inclusion
//! proof yet; proposers attach branches when the deposit enters a block.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use ssz_types::FixedVector;
use thiserror::Error;
use tracing::debug;
use viridian_types::{
    ExecutionAddress, Hash256,
    crypto::{BlsPublicKey, BlsSignature},
    deposit::Deposit,
};

use crate::{
    engine_api::{ETH_BLOCK_NUMBER, ETH_GET_LOGS},
    error::EngineApiError,
    transport::{JsonRpcRequest, Transport},
};

/// `keccak256("DepositEvent(bytes,bytes,bytes,bytes,bytes)")`, the topic the
/// deposit contract emits.
pub const DEPOSIT_EVENT_TOPIC: &str =
    "0x649bbc62d0e31342afea4e5cd82d4049e7e1ee912fc0889aa790803be39038c5";

#[derive(Debug, Error)]
pub enum DepositReaderError {
    #[error(transparent)]
    Rpc(#[from] EngineApiError),

    #[error("malformed deposit log: {0}")]
    MalformedLog(String),
}

/// Read side of the deposit contract, narrow enough to mock in tests.
#[async_trait]
pub trait DepositReader: Send + Sync {
    /// Current execution head block number.
    async fn latest_block_number(&self) -> Result<u64, DepositReaderError>;

    /// Deposit logs in `[from_block, to_block]`, ascending by deposit index.
    async fn deposits_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Deposit>, DepositReaderError>;
}

/// JSON-RPC implementation over the shared transport.
pub struct RpcDepositReader {
    transport: std::sync::Arc<dyn Transport>,
    contract_address: ExecutionAddress,
}

#[derive(Deserialize)]
struct LogEntry {
    data: String,
}

impl RpcDepositReader {
    pub fn new(transport: impl Transport + 'static, contract_address: ExecutionAddress) -> Self {
        Self { transport: std::sync::Arc::new(transport), contract_address }
    }

    async fn call(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, DepositReaderError> {
        let response = self.transport.send(&JsonRpcRequest::new(method, params)).await?;
        if let Some(error) = response.error {
            return Err(EngineApiError::Rpc { code: error.code, message: error.message }.into());
        }
        response
            .result
            .ok_or_else(|| EngineApiError::Decode("missing result field".to_owned()).into())
    }
}

#[async_trait]
impl DepositReader for RpcDepositReader {
    async fn latest_block_number(&self) -> Result<u64, DepositReaderError> {
        let result = self.call(ETH_BLOCK_NUMBER, json!([])).await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| EngineApiError::Decode("eth_blockNumber not a string".into()))?;
        u64::from_str_radix(hex_str.trim_start_matches("0x"), 16)
            .map_err(|e| EngineApiError::Decode(format!("eth_blockNumber: {e}")).into())
    }

    async fn deposits_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Deposit>, DepositReaderError> {
        let filter = json!([{
            "address": self.contract_address,
            "fromBlock": format!("0x{from_block:x}"),
            "toBlock": format!("0x{to_block:x}"),
            "topics": [DEPOSIT_EVENT_TOPIC],
        }]);

        let result = self.call(ETH_GET_LOGS, filter).await?;
        let logs: Vec<LogEntry> = serde_json::from_value(result)
            .map_err(|e| EngineApiError::Decode(format!("eth_getLogs: {e}")))?;

        let mut deposits = logs
            .iter()
            .map(|log| {
                let data = hex::decode(log.data.trim_start_matches("0x"))
                    .map_err(|e| DepositReaderError::MalformedLog(e.to_string()))?;
                decode_deposit_log(&data)
            })
            .collect::<Result<Vec<_>, _>>()?;

        // The contract emits in index order per block, but log batches across
        // blocks arrive unsorted often enough to matter.
        deposits.sort_by_key(|d| d.index);
        debug!(from_block, to_block, count = deposits.len(), "fetched deposit logs");
        Ok(deposits)
    }
}

/// Decode one ABI-encoded `DepositEvent(bytes,bytes,bytes,bytes,bytes)` data
/// blob: five offset words, then length-prefixed byte strings for pubkey (48),
/// withdrawal credentials (32), amount (8, little-endian), signature (96) and
/// index (8, little-endian).
pub fn decode_deposit_log(data: &[u8]) -> Result<Deposit, DepositReaderError> {
    let field = |position: usize, expected_len: usize| -> Result<&[u8], DepositReaderError> {
        let offset_word = data
            .get(position * 32..position * 32 + 32)
            .ok_or_else(|| DepositReaderError::MalformedLog("truncated offsets".into()))?;
        let offset = u64::from_be_bytes(
            offset_word[24..].try_into().expect("8-byte slice"),
        ) as usize;

        let length_word = data
            .get(offset..offset + 32)
            .ok_or_else(|| DepositReaderError::MalformedLog("truncated length".into()))?;
        let length =
            u64::from_be_bytes(length_word[24..].try_into().expect("8-byte slice")) as usize;
        if length != expected_len {
            return Err(DepositReaderError::MalformedLog(format!(
                "field {position}: expected {expected_len} bytes, got {length}"
            )));
        }

        data.get(offset + 32..offset + 32 + length)
            .ok_or_else(|| DepositReaderError::MalformedLog("truncated field body".into()))
    };

    let pubkey = BlsPublicKey::from_slice(field(0, 48)?)
        .map_err(DepositReaderError::MalformedLog)?;
    let withdrawal_credentials = Hash256::from_slice(field(1, 32)?);
    let amount = u64::from_le_bytes(field(2, 8)?.try_into().expect("8-byte slice"));
    let signature = BlsSignature::from_slice(field(3, 96)?)
        .map_err(DepositReaderError::MalformedLog)?;
    let index = u64::from_le_bytes(field(4, 8)?.try_into().expect("8-byte slice"));

    Ok(Deposit {
        pubkey,
        withdrawal_credentials,
        amount,
        signature,
        index,
        proof: FixedVector::default(),
    })
}

/// Encode a deposit back into the event's data layout. Test and tooling
/// counterpart of [`decode_deposit_log`].
pub fn encode_deposit_log(deposit: &Deposit) -> Vec<u8> {
    fn padded(bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + bytes.len().div_ceil(32) * 32);
        out.extend_from_slice(&[0u8; 24]);
        out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
        out.extend_from_slice(bytes);
        out.resize(32 + bytes.len().div_ceil(32) * 32, 0);
        out
    }

    let fields: [Vec<u8>; 5] = [
        padded(deposit.pubkey.as_bytes()),
        padded(deposit.withdrawal_credentials.as_slice()),
        padded(&deposit.amount.to_le_bytes()),
        padded(deposit.signature.as_bytes()),
        padded(&deposit.index.to_le_bytes()),
    ];

    let mut out = Vec::new();
    let mut offset = 5 * 32;
    for body in &fields {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&(offset as u64).to_be_bytes());
        out.extend_from_slice(&word);
        offset += body.len();
    }
    for body in &fields {
        out.extend_from_slice(body);
    }
    out
}
