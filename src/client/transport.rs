//! HTTP transport for the chat-completions endpoint.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::client::message::Message;
use crate::core::error::GptError;

/// Wire body of a streaming chat-completions request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub functions: Vec<Value>,
    pub max_tokens: u32,
    pub n: u32,
    pub temperature: f32,
    pub stream: bool,
}

/// Raw body chunks of a streaming response.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, GptError>>;

/// The outbound side of the chat protocol. A non-200 status must surface as
/// [`GptError::Transport`] carrying the status code and body text.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn post_chat(&self, request: &ChatCompletionRequest) -> Result<ByteStream, GptError>;
}

/// Reqwest-backed transport. The inner client is built once and reused for
/// the lifetime of the session.
pub struct ApiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    extra_headers: HashMap<String, String>,
}

impl ApiClient {
    pub fn new(
        endpoint: String,
        api_key: String,
        extra_headers: Option<HashMap<String, String>>,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
            extra_headers: extra_headers.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ChatTransport for ApiClient {
    async fn post_chat(&self, request: &ChatCompletionRequest) -> Result<ByteStream, GptError> {
        let url = format!("{}/chat/completions", self.endpoint);

        let mut req = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");

        for (key, value) in &self.extra_headers {
            req = req.header(key, value);
        }

        let response = req.json(request).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(GptError::Transport {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|item| item.map(|chunk| chunk.to_vec()).map_err(GptError::from))
            .boxed())
    }
}
