//! Agent state: phase, activity log, accumulators.
//!
//! [`AgentState`] is owned by exactly one [`StreamNormalizer`] and mutated
//! only by sequential event application.  Consumers read an
//! [`AgentStateSnapshot`] after each applied event.
//!
//! [`StreamNormalizer`]: crate::machine::StreamNormalizer

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// What the agent is doing right now.  One active phase per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    #[default]
    Idle,
    Thinking,
    ToolCalling,
    ToolExecuting,
    Streaming,
    Synthesizing,
    Complete,
}

/// Discriminant of an [`AgentActivity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Thinking,
    ToolCall,
    ToolResult,
    Text,
    Handoff,
    Error,
}

/// Lifecycle status of an [`AgentActivity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Pending,
    Executing,
    Complete,
    Error,
}

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

/// One discrete entry in the normalized activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentActivity {
    /// Unique id (UUID v7).
    pub id: String,
    /// Which kind of activity this is.
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub status: ActivityStatus,
    /// Human-readable content: thinking text, tool name, answer text,
    /// handoff summary, or error message.
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error text or code attached to the activity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// MCP server that served the tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    /// Set on a tool result that matched no executing tool call.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub orphaned: bool,
}

impl AgentActivity {
    /// A bare activity; callers fill in the optional fields.
    pub fn new(
        kind: ActivityKind,
        status: ActivityStatus,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            kind,
            status,
            content: content.into(),
            timestamp,
            duration: None,
            round: None,
            tool_call_id: None,
            tool_name: None,
            arguments: None,
            result: None,
            details: None,
            model: None,
            role: None,
            server_id: None,
            server_name: None,
            orphaned: false,
        }
    }

    /// Whether this is a tool call still waiting for its result.
    pub fn is_executing_tool_call(&self) -> bool {
        self.kind == ActivityKind::ToolCall && self.status == ActivityStatus::Executing
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Per-turn aggregate.  Fields are crate-visible so the state machine can
/// mutate them; everyone else reads through accessors or a snapshot.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub(crate) phase: AgentPhase,
    pub(crate) current_model: Option<String>,
    pub(crate) current_model_role: Option<String>,
    pub(crate) current_round: u32,
    pub(crate) activities: Vec<AgentActivity>,
    pub(crate) thinking_content: String,
    pub(crate) thinking_started_at: Option<DateTime<Utc>>,
    pub(crate) orchestration_id: Option<String>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) total_duration: Option<u64>,
    pub(crate) total_cost: Option<f64>,
    pub(crate) roles_executed: Vec<String>,
}

impl AgentState {
    /// Fresh state for a turn that starts now.
    pub(crate) fn started(model: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            phase: AgentPhase::Streaming,
            current_model: model,
            started_at: Some(at),
            ..Self::default()
        }
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    pub fn current_model(&self) -> Option<&str> {
        self.current_model.as_deref()
    }

    pub fn current_model_role(&self) -> Option<&str> {
        self.current_model_role.as_deref()
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    /// The activity log, oldest first.
    pub fn activities(&self) -> &[AgentActivity] {
        &self.activities
    }

    pub fn thinking_content(&self) -> &str {
        &self.thinking_content
    }

    pub fn orchestration_id(&self) -> Option<&str> {
        self.orchestration_id.as_deref()
    }

    pub fn total_duration(&self) -> Option<u64> {
        self.total_duration
    }

    pub fn total_cost(&self) -> Option<f64> {
        self.total_cost
    }

    /// A timestamp strictly later than every logged activity.
    pub(crate) fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.activities.last() {
            Some(last) if now <= last.timestamp => last.timestamp + TimeDelta::microseconds(1),
            _ => now,
        }
    }

    /// Append an activity.  The log is append-only.
    pub(crate) fn push(&mut self, activity: AgentActivity) {
        self.activities.push(activity);
    }

    /// Read-only copy for consumers.
    pub fn snapshot(&self) -> AgentStateSnapshot {
        AgentStateSnapshot {
            phase: self.phase,
            current_model: self.current_model.clone(),
            current_model_role: self.current_model_role.clone(),
            current_round: self.current_round,
            activities: self.activities.clone(),
            thinking_content: (!self.thinking_content.is_empty())
                .then(|| self.thinking_content.clone()),
            orchestration_id: self.orchestration_id.clone(),
            total_duration: self.total_duration,
            total_cost: self.total_cost,
            roles_executed: self.roles_executed.clone(),
        }
    }
}

/// Serializable, read-only view of [`AgentState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStateSnapshot {
    pub phase: AgentPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_model_role: Option<String>,
    pub current_round: u32,
    pub activities: Vec<AgentActivity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestration_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles_executed: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
