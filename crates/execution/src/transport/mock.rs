//! Scripted transport for tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::Value;

use super::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, Transport};
use crate::error::EngineApiError;

/// Replays queued responses in order and records every request it sees.
#[derive(Clone, Default)]
pub struct MockTransport {
    responses: Arc<Mutex<VecDeque<Result<JsonRpcResponse, EngineApiError>>>>,
    pub requests: Arc<Mutex<Vec<JsonRpcRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_result(&self, result: Value) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(JsonRpcResponse { result: Some(result), error: None }));
    }

    pub fn push_rpc_error(&self, code: i64, message: &str) {
        self.responses.lock().unwrap().push_back(Ok(JsonRpcResponse {
            result: None,
            error: Some(JsonRpcError { code, message: message.to_owned() }),
        }));
    }

    pub fn push_transport_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(EngineApiError::Transport(message.to_owned())));
    }

    pub fn recorded_methods(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|r| r.method.clone()).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, EngineApiError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EngineApiError::Transport("no scripted response".into())))
    }
}
