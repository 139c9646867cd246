//! Stream error types.
//!
//! The state machine itself never fails: malformed events are logged and
//! ignored.  [`StreamError`] covers the edges around it: parsing raw
//! provider lines and talking to session drivers.

/// Unified error type for the stream crate.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    // -- Parsing -------------------------------------------------------------
    /// A provider line or canonical event could not be parsed.
    #[error("stream parse error: {reason}")]
    Parse { reason: String },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Sessions ------------------------------------------------------------
    /// The session driver has stopped and accepts no more events.
    #[error("session closed: {session_id}")]
    SessionClosed { session_id: String },

    /// No live session with this id.
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// A live session with this id already exists.
    #[error("session already open: {session_id}")]
    SessionExists { session_id: String },
}

/// Convenience alias used throughout the stream crate.
pub type Result<T> = std::result::Result<T, StreamError>;
