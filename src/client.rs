//! Core error type and the transport seam.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::model::CompletionRequest;

/// Errors that can occur while opening or consuming a completion stream.
///
/// Cancellation is deliberately absent: a cancelled session ends with
/// [`SessionOutcome::Cancelled`](crate::model::SessionOutcome::Cancelled).
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("HTTP error! status: {status}: {body}")]
    Status { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input is {len} characters, the limit is {max}")]
    InputTooLong { len: usize, max: usize },
}

/// A cancellable sequence of raw response chunks.
///
/// Chunk boundaries carry no meaning; see [`crate::sse::FrameDecoder`].
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// Opens the response byte stream for one completion request.
///
/// Implement this trait to plug in a different transport. The
/// [`StreamClient`](crate::stream::StreamClient) drops the returned stream
/// when its session is cancelled, so implementations only need to release
/// resources on drop.
///
/// # Example
/// ```rust,ignore
/// struct Canned(Vec<&'static str>);
///
/// #[async_trait]
/// impl TransportOpener for Canned {
///     async fn open(&self, _request: &CompletionRequest) -> Result<ByteStream, ClientError> {
///         let chunks = self.0.iter().map(|c| Ok(Bytes::from_static(c.as_bytes())));
///         Ok(futures::stream::iter(chunks.collect::<Vec<_>>()).boxed())
///     }
/// }
/// ```
#[async_trait]
pub trait TransportOpener: Send + Sync {
    /// Issue the request and return its body as a byte stream.
    ///
    /// Returns an error for network failures, non-success statuses, or a
    /// transport that cannot stream.
    async fn open(&self, request: &CompletionRequest) -> Result<ByteStream, ClientError>;
}
