//! Registry of live sessions.
//!
//! Maps session ids to [`SessionHandle`]s in a [`DashMap`] so many sessions
//! can be opened, fed and closed concurrently from any task.  Map guards are
//! never held across an `.await`: handles are cloned out before sending.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{Result, StreamError};
use crate::event::AgentEvent;
use crate::session::{DEFAULT_SESSION_CAPACITY, SessionHandle, SessionUpdate, spawn_session};
use crate::state::AgentStateSnapshot;

/// Concurrent session registry.
#[derive(Debug)]
pub struct SessionHub {
    sessions: DashMap<String, SessionHandle>,
    capacity: usize,
}

impl SessionHub {
    /// A hub whose sessions use `capacity`-bounded channels.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            capacity,
        }
    }

    /// Start a session.  Fails if a live session already uses `id`; a
    /// stopped session with the same id is replaced.
    pub fn open(&self, id: impl Into<String>) -> Result<mpsc::Receiver<SessionUpdate>> {
        let id = id.into();
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(entry) if !entry.get().is_closed() => {
                Err(StreamError::SessionExists { session_id: id })
            }
            Entry::Occupied(mut entry) => {
                let (handle, updates) = spawn_session(id.clone(), self.capacity);
                entry.insert(handle);
                debug!(session_id = %id, "stopped session replaced");
                Ok(updates)
            }
            Entry::Vacant(entry) => {
                let (handle, updates) = spawn_session(id.clone(), self.capacity);
                entry.insert(handle);
                info!(session_id = %id, "session opened");
                Ok(updates)
            }
        }
    }

    /// Producer handle for a live session.
    pub fn handle(&self, id: &str) -> Result<SessionHandle> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StreamError::SessionNotFound {
                session_id: id.to_owned(),
            })
    }

    /// Route an event to a session.  A session found stopped is removed.
    pub async fn send(&self, id: &str, event: AgentEvent) -> Result<()> {
        let handle = self.handle(id)?;
        let result = handle.send(event).await;
        if matches!(result, Err(StreamError::SessionClosed { .. })) {
            self.sessions.remove_if(id, |_, h| h.is_closed());
        }
        result
    }

    /// Close a session and return its final state.
    pub async fn close(&self, id: &str) -> Result<AgentStateSnapshot> {
        let (_, handle) =
            self.sessions
                .remove(id)
                .ok_or_else(|| StreamError::SessionNotFound {
                    session_id: id.to_owned(),
                })?;
        let snapshot = handle.close().await?;
        info!(
            session_id = %id,
            phase = ?snapshot.phase,
            activities = snapshot.activities.len(),
            "session closed"
        );
        Ok(snapshot)
    }

    /// Whether a session with this id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Registered session ids.
    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
