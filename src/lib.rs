//! # jsunpack - streaming client for the code deobfuscation service
//!
//! Sends a code snippet to a remote completion service and delivers the
//! answer incrementally as it streams back over Server-Sent Events.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Chunk-boundary-agnostic SSE decoding, including split multi-byte characters
//! - One active session per client, with cancel-then-replace semantics
//! - Fenced code block extraction that works on partial markdown
//! - Pluggable transport via the [`TransportOpener`] trait
//!
//! ## Architecture
//!
//! - **[`sse::FrameDecoder`]**: turns raw chunks into [`Frame`]s
//! - **[`stream::StreamClient`]**: owns the session lifecycle and invokes a
//!   [`stream::StreamHandler`]
//! - **[`http::HttpOpener`]**: reqwest-based [`TransportOpener`]
//! - **[`extract::extract_code_blocks`]**: live code preview over the
//!   accumulated answer
//!
//! ## Example
//! ```no_run
//! use jsunpack::http::HttpOpener;
//! use jsunpack::options::{HttpTransport, TransportOptions};
//! use jsunpack::session::{CookieIdentity, SessionContext};
//! use jsunpack::stream::{StreamClient, Transcript};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport_options = TransportOptions::new(
//!         HttpTransport::default().with_base_url("https://jsunpack.example".to_string()),
//!     );
//!     let client = StreamClient::new(HttpOpener::new(&transport_options)?);
//!
//!     let identity = CookieIdentity::new(".jsunpack/cookie.json");
//!     let context = SessionContext::for_page(&identity, "https://jsunpack.example/?from=docs")?;
//!
//!     let mut transcript = Transcript::new();
//!     client.start("!function(){var a=1}()", &context, &mut transcript).await;
//!
//!     for block in transcript.code_blocks() {
//!         println!("{}", block);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod extract;
pub mod http;
pub mod model;
pub mod options;
pub mod session;
pub mod sse;
pub mod stream;

// Re-exports for convenience
pub use client::{ByteStream, ClientError, TransportOpener};
pub use extract::extract_code_blocks;
pub use model::{CompletionRequest, Frame, SessionOutcome, SessionPhase};
pub use session::SessionContext;
pub use stream::{StreamClient, StreamHandler, Transcript};
