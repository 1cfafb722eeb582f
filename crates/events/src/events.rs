//! Event ids and payload types.
//!
//! Payloads are immutable once published; large ones are shared behind `Arc`
//! so fan-out to multiple subscribers stays cheap.

use std::sync::Arc;

use viridian_types::{
    Hash256,
    blob::BlobSidecars,
    block::SignedBeaconBlock,
    deposit::Deposit,
    slot::Slot,
};

/// Enumerated event tags. One publisher per id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventId {
    /// A new proposal slot opened and this node may have proposer duty.
    NewSlot,
    /// A block was finalized and committed to disk.
    BlockCommitted,
    /// The validator service assembled a proposal for the host consensus.
    BlockProposal,
    /// The catch-up fetcher buffered a deposit from the execution layer.
    DepositIngested,
}

/// Published by the consensus middleware when the host consensus asks this
/// node to propose at `slot`.
#[derive(Clone, Debug)]
pub struct NewSlotEvent {
    pub slot: Slot,
    /// Whether the host consensus selected this node as proposer.
    pub is_local_proposer: bool,
}

/// Published by the blockchain service after a successful finalize.
#[derive(Clone, Debug)]
pub struct BlockCommittedEvent {
    pub slot: Slot,
    pub block_root: Hash256,
    pub block: Arc<SignedBeaconBlock>,
}

/// Published by the validator service; consumed by the consensus middleware,
/// which hands the encoded proposal to the host consensus.
#[derive(Clone, Debug)]
pub struct BlockProposalEvent {
    pub block: Arc<SignedBeaconBlock>,
    pub sidecars: Arc<BlobSidecars>,
}

/// Published by the deposit catch-up fetcher, in ascending deposit index
/// order.
#[derive(Clone, Debug)]
pub struct DepositIngestedEvent {
    pub deposit: Deposit,
}
