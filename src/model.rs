//! Data models for completion requests and decoded stream frames.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::client::ClientError;

/// JSON body posted to the completion service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Opaque per-browser session token
    pub tmp_uid: String,

    /// Raw user input (the code snippet)
    pub content: String,

    /// Source tag, `"web"` unless the page was opened with `from`/`ref`
    pub from: String,
}

/// A single logical unit decoded from the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Decoded content fragment
    Payload(String),

    /// End-of-stream sentinel (`data: [DONE]`)
    Terminator,
}

/// Lifecycle phase of the session owned by a
/// [`StreamClient`](crate::stream::StreamClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Starting,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl SessionPhase {
    /// Whether a session in this phase still holds its cancellation handle.
    pub fn is_active(self) -> bool {
        matches!(self, SessionPhase::Starting | SessionPhase::Streaming)
    }
}

/// Terminal result of one streaming session.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// Terminator seen or the stream ended naturally.
    Completed {
        /// Payload frames delivered to the handler
        payloads: usize,
        /// Malformed events that were skipped
        dropped: usize,
    },

    /// Aborted by `cancel()`, a superseding `start`, or client teardown.
    Cancelled,

    /// Transport failure; the handler already received `on_error`.
    Failed(Arc<ClientError>),
}

impl SessionOutcome {
    /// The phase a session ending with this outcome lands in.
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionOutcome::Completed { .. } => SessionPhase::Completed,
            SessionOutcome::Cancelled => SessionPhase::Cancelled,
            SessionOutcome::Failed(_) => SessionPhase::Failed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionOutcome::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_expected_fields() {
        let request = CompletionRequest {
            tmp_uid: "abc".to_string(),
            content: "var a=1".to_string(),
            from: "web".to_string(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"tmp_uid": "abc", "content": "var a=1", "from": "web"})
        );
    }

    #[test]
    fn test_outcome_phase() {
        let done = SessionOutcome::Completed { payloads: 2, dropped: 0 };
        assert_eq!(done.phase(), SessionPhase::Completed);
        assert!(done.is_completed());

        assert_eq!(SessionOutcome::Cancelled.phase(), SessionPhase::Cancelled);
        assert!(!SessionPhase::Cancelled.is_active());
        assert!(SessionPhase::Streaming.is_active());
    }
}
