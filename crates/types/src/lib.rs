//! Core types shared across the viridian node.
//!
//! Everything that crosses a component boundary lives here: slots and epochs,
//! the beacon containers (blocks, state, validators, deposits), blob sidecars,
//! the chain specification, SSZ merkleization helpers and the BLS signing seam.
//!
//! Containers are SSZ-encoded on the wire and identified by their hash tree
//! root. Decoders are fork-versioned: callers select the fork from the slot via
//! [`chain_spec::ChainSpec::active_fork_for_slot`] before decoding.

pub mod blob;
pub mod block;
pub mod chain_spec;
pub mod crypto;
pub mod deposit;
pub mod eth1;
pub mod execution_payload;
pub mod genesis;
pub mod merkle;
pub mod signing;
pub mod slot;
pub mod state;
pub mod validator;
pub mod withdrawal;

pub use alloy_primitives::{Address as ExecutionAddress, B256, Bloom, U256};

/// Canonical 32-byte root type. Identical layout to [`B256`].
pub type Hash256 = B256;

/// Balance denomination. 1 ETH = 10^9 Gwei.
pub type Gwei = u64;

/// Execution-layer block hash.
pub type ExecutionHash = B256;

/// A validator-set delta reported to the host consensus after a state
/// transition. An `effective_balance` of zero removes the validator from the
/// host's voting set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorUpdate {
    pub pubkey: crypto::BlsPublicKey,
    pub effective_balance: Gwei,
}
