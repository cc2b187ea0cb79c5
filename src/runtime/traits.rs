//! Trait abstractions for runtime I/O
//!
//! The executor only talks to the backend through [`ChatTransport`], so it
//! can be driven by scripted streams in tests.

use crate::error::TransportError;
use crate::store::ChatRequest;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Response body as it arrives; chunk boundaries are arbitrary
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Backend the client streams from
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send the chat request and return the streaming body.
    ///
    /// Fails before any bytes are read if the request could not be sent,
    /// the server answered with a non-success status, or there is no body.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, TransportError>;

    /// First user message of a thread, used to derive its title
    async fn fetch_first_message(
        &self,
        thread_id: &str,
        session_id: &str,
    ) -> Result<String, TransportError>;
}

// ============================================================================
// Arc implementation for trait objects
// ============================================================================

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        (**self).open_stream(request).await
    }

    async fn fetch_first_message(
        &self,
        thread_id: &str,
        session_id: &str,
    ) -> Result<String, TransportError> {
        (**self).fetch_first_message(thread_id, session_id).await
    }
}
