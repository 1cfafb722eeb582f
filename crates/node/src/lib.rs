//! Node assembly.
//!
//! Plain constructor wiring at the composition root: every component is built
//! here, handed exactly the collaborators it needs, and nothing else. No
//! injection container, no globals; the event bus is cloned into whoever
//! publishes or subscribes.

mod node;

pub use node::{Node, NodeHandle};
