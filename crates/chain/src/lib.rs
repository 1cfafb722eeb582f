//! The blockchain service and its host-consensus face.
//!
//! [`service::ChainService`] orchestrates everything the host consensus asks
//! of this node: proposal verification, finalization, genesis. It drives the
//! engine API, the blob processor and the state transition, owns the
//! failed-block retry set, and starts optimistic payload builds for the next
//! slot. [`middleware::ConsensusMiddleware`] translates the host's
//! ABCI-style callbacks (opaque tx bytes in, validator updates out) into
//! typed calls; [`validator::ValidatorService`] assembles proposals when
//! this node holds proposer duty. Components talk through the event bus, so
//! none of them holds a handle to another service.

pub mod deposit_fetcher;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod middleware;
pub mod service;
pub mod store;
pub mod validator;

pub use error::ChainError;
pub use middleware::{ConsensusMiddleware, ProposalVerdict};
pub use service::ChainService;
pub use store::ChainStore;
pub use validator::ValidatorService;
