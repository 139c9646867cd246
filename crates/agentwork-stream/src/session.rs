//! Per-session driver task.
//!
//! Each session gets its own tokio task that owns a [`StreamNormalizer`] and
//! applies events strictly in the order they were sent.  Producers talk to it
//! through a cloneable [`SessionHandle`]; the single consumer reads
//! [`SessionUpdate`]s from a bounded channel, so a slow consumer applies
//! backpressure to producers instead of growing memory.
//!
//! ```text
//! producer ──► SessionHandle ──mpsc──► driver (StreamNormalizer) ──mpsc──► consumer
//! ```
//!
//! The driver stops when the last handle is dropped or [`SessionHandle::close`]
//! is called.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, trace};

use crate::error::{Result, StreamError};
use crate::event::AgentEvent;
use crate::machine::{Applied, StreamNormalizer};
use crate::state::AgentStateSnapshot;

/// Default capacity of both session channels.
pub const DEFAULT_SESSION_CAPACITY: usize = 64;

/// What the consumer of a session receives.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// State after a state-changing event.
    Snapshot(AgentStateSnapshot),
    /// A content delta, forwarded verbatim.
    ContentDelta(String),
}

enum Command {
    Apply(AgentEvent),
    Close(oneshot::Sender<AgentStateSnapshot>),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apply(event) => write!(f, "Apply({})", event.kind()),
            Self::Close(_) => f.write_str("Close"),
        }
    }
}

/// Producer side of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Arc<str>,
    commands: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// The session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the driver has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Queue an event.  Waits while the session's queue is full.
    pub async fn send(&self, event: AgentEvent) -> Result<()> {
        self.commands
            .send(Command::Apply(event))
            .await
            .map_err(|_| self.closed())
    }

    /// Parse a raw JSON event and queue it.
    pub async fn send_json(&self, raw: &str) -> Result<()> {
        let event: AgentEvent = serde_json::from_str(raw)?;
        self.send(event).await
    }

    /// Stop the driver after every queued event is applied and return the
    /// final state.
    pub async fn close(&self) -> Result<AgentStateSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Close(reply))
            .await
            .map_err(|_| self.closed())?;
        rx.await.map_err(|_| self.closed())
    }

    fn closed(&self) -> StreamError {
        StreamError::SessionClosed {
            session_id: self.id.to_string(),
        }
    }
}

/// Start a session driver on the current tokio runtime.
///
/// `capacity` bounds both the event queue and the update queue.
pub fn spawn_session(
    id: impl Into<String>,
    capacity: usize,
) -> (SessionHandle, mpsc::Receiver<SessionUpdate>) {
    let id: Arc<str> = Arc::from(id.into());
    let capacity = capacity.max(1);
    let (commands_tx, commands_rx) = mpsc::channel(capacity);
    let (updates_tx, updates_rx) = mpsc::channel(capacity);

    tokio::spawn(run_driver(Arc::clone(&id), commands_rx, updates_tx));

    let handle = SessionHandle {
        id,
        commands: commands_tx,
    };
    (handle, updates_rx)
}

#[instrument(name = "session", skip_all, fields(session_id = %id))]
async fn run_driver(
    id: Arc<str>,
    mut commands: mpsc::Receiver<Command>,
    updates: mpsc::Sender<SessionUpdate>,
) {
    let mut normalizer = StreamNormalizer::new();
    let mut consumer_gone = false;
    debug!("session driver started");

    while let Some(command) = commands.recv().await {
        let event = match command {
            Command::Apply(event) => event,
            Command::Close(reply) => {
                debug!(phase = ?normalizer.phase(), "session closed by request");
                let _ = reply.send(normalizer.snapshot());
                return;
            }
        };

        let update = match normalizer.apply(event) {
            Applied::StateChanged => SessionUpdate::Snapshot(normalizer.snapshot()),
            Applied::ContentDelta(content) => SessionUpdate::ContentDelta(content),
            Applied::Ignored => continue,
        };

        if consumer_gone {
            continue;
        }
        if updates.send(update).await.is_err() {
            // Keep applying so `close` still reports the final state.
            debug!("session consumer dropped, updates discarded");
            consumer_gone = true;
        } else {
            trace!(phase = ?normalizer.phase(), "update delivered");
        }
    }

    debug!(phase = ?normalizer.phase(), "all session handles dropped, driver stopping");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
