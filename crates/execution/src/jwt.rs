//! Engine API JWT authentication.
//!
//! Tokens carry only an `iat` claim. Execution clients reject tokens whose
//! `iat` is older than 60 seconds, so the cached token is rotated well before
//! that window closes.

use std::{
    sync::Mutex,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;

const TOKEN_VALIDITY: Duration = Duration::from_secs(55);

#[derive(Serialize)]
struct Claims {
    iat: u64,
}

struct CachedToken {
    token: String,
    created_at: SystemTime,
}

/// Issues and caches HS256 tokens for the engine transport.
pub struct JwtProvider {
    key: EncodingKey,
    cache: Mutex<Option<CachedToken>>,
}

impl JwtProvider {
    pub fn new(secret: [u8; 32]) -> Self {
        Self { key: EncodingKey::from_secret(&secret), cache: Mutex::new(None) }
    }

    /// Parse a hex-encoded secret file body (with or without 0x prefix).
    pub fn secret_from_hex(hex_str: &str) -> Result<[u8; 32], String> {
        let trimmed = hex_str.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(stripped).map_err(|e| format!("invalid JWT secret hex: {e}"))?;
        bytes.try_into().map_err(|_| "JWT secret must be exactly 32 bytes".to_owned())
    }

    pub fn get_token(&self) -> Result<String, String> {
        let mut cache = self.cache.lock().expect("jwt cache lock poisoned");

        if let Some(cached) = cache.as_ref() {
            let fresh = cached
                .created_at
                .elapsed()
                .map(|elapsed| elapsed < TOKEN_VALIDITY)
                .unwrap_or(false);
            if fresh {
                return Ok(cached.token.clone());
            }
        }

        let now = SystemTime::now();
        let iat = now
            .duration_since(UNIX_EPOCH)
            .map_err(|e| format!("system clock before epoch: {e}"))?
            .as_secs();
        let token = encode(&Header::default(), &Claims { iat }, &self.key)
            .map_err(|e| format!("JWT encoding failed: {e}"))?;

        *cache = Some(CachedToken { token: token.clone(), created_at: now });
        Ok(token)
    }
}
