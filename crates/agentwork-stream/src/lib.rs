//! Stream normalizer for AgentWork.
//!
//! Turns heterogeneous provider streams into one canonical event vocabulary
//! and reduces those events into a per-session agent state that consumers
//! render.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐   ┌──────────────────┐   ┌───────────┐
//! │ provider SSE │──>│ ProviderStream │──>│ StreamNormalizer │──>│ consumer  │
//! │ (lines)      │   │ (adapters)     │   │ (AgentState)     │   │ snapshots │
//! └──────────────┘   └────────────────┘   └────────┬─────────┘   └───────────┘
//!                                                 │
//!                                  spawn_session / SessionHub
//!                                  (one task per session)
//! ```
//!
//! ## Modules
//!
//! - [`event`] -- Canonical [`AgentEvent`] wire type.
//! - [`state`] -- Phases, activities, [`AgentState`] and snapshots.
//! - [`machine`] -- [`StreamNormalizer`], the event reducer.
//! - [`adapters`] -- Anthropic and OpenAI stream adapters.
//! - [`session`] -- Per-session driver task with bounded channels.
//! - [`hub`] -- Concurrent registry of live sessions.
//! - [`error`] -- Error types.

pub mod adapters;
pub mod error;
pub mod event;
pub mod hub;
pub mod machine;
pub mod session;
pub mod state;

pub use adapters::{
    AnthropicAdapter, OpenAiAdapter, PendingToolCall, ProviderKind, ProviderStream,
};
pub use error::{Result, StreamError};
pub use event::{AgentEvent, StreamMetrics, ToolRef};
pub use hub::SessionHub;
pub use machine::{Applied, StreamNormalizer};
pub use session::{DEFAULT_SESSION_CAPACITY, SessionHandle, SessionUpdate, spawn_session};
pub use state::{
    ActivityKind, ActivityStatus, AgentActivity, AgentPhase, AgentState, AgentStateSnapshot,
};
