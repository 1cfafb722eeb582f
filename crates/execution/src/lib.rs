//! Execution-layer plumbing.
//!
//! [`EngineApi`] wraps the JSON-RPC engine API (`engine_newPayloadV3`,
//! `engine_forkchoiceUpdatedV3`, `engine_getPayloadV3`); [`PayloadBuilder`]
//! drives it to prepare the next slot's payload; [`DepositReader`] follows the
//! deposit contract through `eth_getLogs`.

pub mod client;
pub mod deposits;
pub mod engine_api;
pub mod error;
pub mod jwt;
pub mod payload_builder;
pub mod transport;

pub use client::EngineClient;
pub use engine_api::{EngineApi, PayloadEnvelope};
pub use error::EngineApiError;
pub use payload_builder::{PayloadBuilder, PayloadBuilderError};
