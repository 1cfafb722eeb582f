//! Asynchronous event bus.
//!
//! A process-wide registry maps an [`EventId`] to a publisher carrying exactly
//! one payload type. Components never hold handles to each other; everything
//! that crosses a component boundary asynchronously goes through here.
//!
//! Delivery guarantees:
//! - at-least-once per subscriber within the process lifetime,
//! - strict FIFO per (publisher, subscriber) pair,
//! - a full subscriber queue blocks the publisher's pump (backpressure)
//!   until space frees up,
//! - shutdown closes intake and then drains: an event accepted into a
//!   publisher's queue is always delivered, cancellation never aborts it.
//!
//! One broker per event id rather than one global broker: subscribers get the
//! payload type statically, and a slow subscriber on one topic cannot
//! head-of-line-block another topic.

mod bus;
mod events;

pub use bus::{EventBus, Publisher};
pub use events::{
    BlockCommittedEvent, BlockProposalEvent, DepositIngestedEvent, EventId, NewSlotEvent,
};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventBusError {
    /// A publisher is already bound to this event id.
    #[error("publisher already registered for {0:?}")]
    DuplicateEventId(EventId),

    /// No publisher bound to this event id.
    #[error("no publisher registered for {0:?}")]
    PublisherNotFound(EventId),

    /// The payload type does not match the publisher's declared type.
    #[error("wrong event type for {0:?}")]
    WrongEventType(EventId),

    /// The bus has shut down and the publisher's queue is gone.
    #[error("publisher for {0:?} is closed")]
    PublisherClosed(EventId),
}
