//! HTTP transport with engine JWT authentication.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::{JsonRpcRequest, JsonRpcResponse, Transport};
use crate::{error::EngineApiError, jwt::JwtProvider};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

pub struct HttpTransport {
    client: Client,
    url: Url,
    jwt_provider: Option<JwtProvider>,
}

impl HttpTransport {
    pub fn new(url: Url) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction only fails on TLS misconfiguration");
        Self { client, url, jwt_provider: None }
    }

    pub fn with_jwt(mut self, secret: [u8; 32]) -> Self {
        self.jwt_provider = Some(JwtProvider::new(secret));
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, EngineApiError> {
        let mut builder = self.client.post(self.url.clone()).json(request);
        if let Some(provider) = &self.jwt_provider {
            let token = provider.get_token().map_err(EngineApiError::Transport)?;
            builder = builder.bearer_auth(token);
        }

        let response =
            builder.send().await.map_err(|e| EngineApiError::Transport(e.to_string()))?;
        let bytes =
            response.bytes().await.map_err(|e| EngineApiError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| EngineApiError::Decode(e.to_string()))
    }
}
