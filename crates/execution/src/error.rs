//! Engine API error taxonomy.

use thiserror::Error;

/// Errors crossing the engine-client boundary.
///
/// The retry policy keys off the variant: transport problems and timeouts are
/// retried with backoff inside the client, an `INVALID` payload status is
/// terminal for the block in flight, and an unknown payload id is terminal for
/// the local builder.
#[derive(Debug, Error)]
pub enum EngineApiError {
    /// Connection-level failure. Retryable.
    #[error("engine transport error: {0}")]
    Transport(String),

    /// The call did not complete within its deadline. Retryable.
    #[error("engine call {method} timed out after {timeout_ms}ms")]
    Timeout { method: &'static str, timeout_ms: u64 },

    /// The engine answered with a JSON-RPC error object.
    #[error("engine RPC error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    /// The engine judged the payload invalid. Terminal for this block.
    #[error("execution payload invalid: {reason}")]
    InvalidPayload { reason: String },

    /// `engine_getPayload` for an id the engine no longer knows. Terminal for
    /// the local payload builder.
    #[error("engine does not know payload id {0}")]
    UnknownPayload(String),

    /// Malformed response body.
    #[error("failed to decode engine response: {0}")]
    Decode(String),
}

impl EngineApiError {
    /// Whether the client's backoff loop may retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

/// Engine API error code for an unknown payload id.
pub const ENGINE_ERROR_UNKNOWN_PAYLOAD: i64 = -38001;
