//! Stream client: owns one completion session at a time.
//!
//! A [`StreamClient`] opens a byte stream through a [`TransportOpener`],
//! decodes it with a [`FrameDecoder`], and forwards every payload to a
//! [`StreamHandler`] as soon as it is decoded. Starting a new session
//! cancels the one in flight, and dropping a `start` future cancels its
//! session and drops the underlying byte stream.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClientError, TransportOpener};
use crate::extract::extract_code_blocks;
use crate::model::{CompletionRequest, Frame, SessionOutcome, SessionPhase};
use crate::session::SessionContext;
use crate::sse::FrameDecoder;

/// Consumer callbacks for one session.
///
/// `on_payload` runs synchronously for each decoded fragment, in arrival
/// order. Exactly one of `on_complete` / `on_error` runs at the end of a
/// session, and neither runs for a cancelled session.
pub trait StreamHandler {
    fn on_payload(&mut self, content: &str);

    fn on_complete(&mut self) {}

    fn on_error(&mut self, _error: &ClientError) {}
}

/// Closures receive payloads only.
impl<F> StreamHandler for F
where
    F: FnMut(&str),
{
    fn on_payload(&mut self, content: &str) {
        self(content)
    }
}

/// Accumulates the streamed answer for display.
///
/// Partial output is kept when the session fails.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    text: String,
    completed: bool,
    error: Option<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Message of the error that ended the session, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Code blocks in the accumulated text, including one still streaming.
    pub fn code_blocks(&self) -> Vec<String> {
        extract_code_blocks(&self.text)
    }

    /// Reset for a new session.
    pub fn clear(&mut self) {
        self.text.clear();
        self.completed = false;
        self.error = None;
    }
}

impl StreamHandler for Transcript {
    fn on_payload(&mut self, content: &str) {
        self.text.push_str(content);
    }

    fn on_complete(&mut self) {
        self.completed = true;
    }

    fn on_error(&mut self, error: &ClientError) {
        self.error = Some(error.to_string());
    }
}

#[derive(Debug)]
struct ActiveSession {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct ClientState {
    active: Option<ActiveSession>,
    phase: SessionPhase,
    last_error: Option<Arc<ClientError>>,
    next_id: u64,
}

/// Drives one completion session at a time.
///
/// The client is shared by reference; wrap it in an `Arc` to start
/// sessions from several tasks. A `start` that begins while another
/// session is running cancels that session first, so the superseded
/// session delivers no further callbacks.
///
/// # Example
/// ```no_run
/// use jsunpack::http::HttpOpener;
/// use jsunpack::options::TransportOptions;
/// use jsunpack::session::SessionContext;
/// use jsunpack::stream::{StreamClient, Transcript};
///
/// # async fn run() -> Result<(), jsunpack::ClientError> {
/// let opener = HttpOpener::new(&TransportOptions::from_env()?)?;
/// let client = StreamClient::new(opener);
/// let context = SessionContext::new("visitor-id", "web");
///
/// let mut transcript = Transcript::new();
/// let outcome = client.start("eval(function(p,a,c,k,e,d){...})", &context, &mut transcript).await;
/// println!("{:?}: {}", outcome, transcript.text());
/// # Ok(())
/// # }
/// ```
pub struct StreamClient<T> {
    transport: T,
    state: Mutex<ClientState>,
}

impl<T: TransportOpener> StreamClient<T> {
    /// Create a client over the given transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: Mutex::new(ClientState {
                active: None,
                phase: SessionPhase::Idle,
                last_error: None,
                next_id: 0,
            }),
        }
    }

    /// Stream a completion for `input`, delivering payloads to `handler`.
    ///
    /// Resolves once the session reaches a terminal state. Input is sent
    /// as-is; see [`validate_input`](crate::options::validate_input).
    pub async fn start<H>(
        &self,
        input: impl Into<String>,
        context: &SessionContext,
        handler: &mut H,
    ) -> SessionOutcome
    where
        H: StreamHandler + ?Sized,
    {
        let (id, cancel) = self.begin();
        let mut guard = SessionGuard {
            client: self,
            id,
            settled: false,
        };

        let request = CompletionRequest {
            tmp_uid: context.token.expose_secret().to_string(),
            content: input.into(),
            from: context.origin.clone(),
        };

        let outcome = self.run(id, &cancel, &request, handler).await;
        // Cancelled between the last read and here: report it as such.
        let outcome = if guard.settle(&outcome) {
            outcome
        } else {
            SessionOutcome::Cancelled
        };

        match &outcome {
            SessionOutcome::Completed { payloads, dropped } => {
                info!(session = id, payloads, dropped, "completion stream finished");
                handler.on_complete();
            }
            SessionOutcome::Failed(e) => {
                warn!(session = id, error = %e, "completion stream failed");
                handler.on_error(e);
            }
            SessionOutcome::Cancelled => {
                debug!(session = id, "completion stream cancelled");
            }
        }

        outcome
    }

    /// Abort the active session, if any. Idempotent.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if let Some(session) = state.active.take() {
            debug!(session = session.id, "cancelling session");
            session.cancel.cancel();
            state.phase = SessionPhase::Cancelled;
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    /// Whether a session is starting or streaming.
    pub fn is_loading(&self) -> bool {
        self.state.lock().phase.is_active()
    }

    /// Error from the most recent failed session, cleared by `start`.
    pub fn last_error(&self) -> Option<Arc<ClientError>> {
        self.state.lock().last_error.clone()
    }

    /// The transport this client opens streams with.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let mut state = self.state.lock();

        if let Some(previous) = state.active.take() {
            debug!(session = previous.id, "superseding active session");
            previous.cancel.cancel();
        }

        state.next_id += 1;
        let id = state.next_id;
        let cancel = CancellationToken::new();
        state.active = Some(ActiveSession {
            id,
            cancel: cancel.clone(),
        });
        state.phase = SessionPhase::Starting;
        state.last_error = None;

        (id, cancel)
    }

    async fn run<H>(
        &self,
        id: u64,
        cancel: &CancellationToken,
        request: &CompletionRequest,
        handler: &mut H,
    ) -> SessionOutcome
    where
        H: StreamHandler + ?Sized,
    {
        let mut bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionOutcome::Cancelled,
            opened = self.transport.open(request) => match opened {
                Ok(bytes) => bytes,
                Err(e) => return SessionOutcome::Failed(Arc::new(e)),
            },
        };

        if !self.mark_streaming(id) {
            return SessionOutcome::Cancelled;
        }

        let mut decoder = FrameDecoder::new();
        let mut payloads = 0;

        while !decoder.is_finished() {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionOutcome::Cancelled,
                next = bytes.next() => next,
            };

            let frames = match next {
                Some(Ok(chunk)) => decoder.push(&chunk),
                Some(Err(e)) => return SessionOutcome::Failed(Arc::new(e)),
                None => decoder.finish(),
            };

            for frame in frames {
                if cancel.is_cancelled() {
                    return SessionOutcome::Cancelled;
                }
                match frame {
                    Frame::Payload(content) => {
                        payloads += 1;
                        handler.on_payload(&content);
                    }
                    Frame::Terminator => break,
                }
            }
        }

        SessionOutcome::Completed {
            payloads,
            dropped: decoder.dropped(),
        }
    }

    fn mark_streaming(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        let owns_state = matches!(&state.active, Some(session) if session.id == id);
        if owns_state {
            state.phase = SessionPhase::Streaming;
        }
        owns_state
    }

    /// Release session `id`. Returns false if it was already cancelled or
    /// superseded, in which case the state belongs to someone else.
    fn settle(&self, id: u64, outcome: &SessionOutcome) -> bool {
        let mut state = self.state.lock();

        let owns_state = matches!(&state.active, Some(session) if session.id == id);
        if !owns_state {
            return false;
        }

        if let Some(session) = state.active.take() {
            session.cancel.cancel();
        }
        state.phase = outcome.phase();
        if let SessionOutcome::Failed(e) = outcome {
            state.last_error = Some(Arc::clone(e));
        }
        true
    }
}

/// Releases the session if the `start` future is dropped before it settles,
/// so an aborted task leaves no active session behind.
struct SessionGuard<'a, T: TransportOpener> {
    client: &'a StreamClient<T>,
    id: u64,
    settled: bool,
}

impl<T: TransportOpener> SessionGuard<'_, T> {
    fn settle(&mut self, outcome: &SessionOutcome) -> bool {
        self.settled = true;
        self.client.settle(self.id, outcome)
    }
}

impl<T: TransportOpener> Drop for SessionGuard<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(session = self.id, "start future dropped, releasing session");
            self.client.settle(self.id, &SessionOutcome::Cancelled);
        }
    }
}
