//! HTTP transport backed by reqwest

use super::traits::{ByteStream, ChatTransport};
use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::store::ChatRequest;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct FirstMessageResponse {
    message: String,
}

/// Talks to the chat backend over HTTP
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    chat_url: String,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        // No overall timeout: a response may legitimately stream for minutes
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            chat_url: config.chat_url(),
            config,
        })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        tracing::debug!(url = %self.chat_url, messages = request.messages.len(), "Opening chat stream");

        let response = self.client.post(&self.chat_url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Chat request rejected");
            return Err(TransportError::status(status.as_u16()));
        }
        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Err(TransportError::no_body());
        }

        Ok(response
            .bytes_stream()
            .map_ok(|chunk| chunk.to_vec())
            .map_err(TransportError::from)
            .boxed())
    }

    async fn fetch_first_message(
        &self,
        thread_id: &str,
        session_id: &str,
    ) -> Result<String, TransportError> {
        let url = self.config.first_message_url(thread_id).ok_or_else(|| {
            TransportError::network(format!("Invalid API base URL: {}", self.config.api_base))
        })?;
        let response = self
            .client
            .get(url)
            .query(&[("sid", session_id)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::status(status.as_u16()));
        }

        let body: FirstMessageResponse = response.json().await?;
        Ok(body.message)
    }
}
