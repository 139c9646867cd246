//! Canonical event vocabulary.
//!
//! Every provider adapter translates its native chunk shape into
//! [`AgentEvent`] before anything reaches the state machine.  On the wire the
//! events are internally tagged JSON objects:
//!
//! ```json
//! {"type": "TOOL_EXECUTING", "name": "grep", "arguments": {"q": "x"}, "serverId": "fs"}
//! ```
//!
//! Unknown `type` values deserialize to [`AgentEvent::Unknown`] so newer
//! producers never break older consumers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool named in a `TOOL_EXECUTION_START` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRef {
    /// Tool name.
    pub name: String,
}

impl ToolRef {
    /// Create a tool reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Rollup metrics reported when a stream completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMetrics {
    /// Wall-clock duration of the turn, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    /// Cost of the turn in the billing currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    /// Prompt tokens consumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    /// Completion tokens produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
}

/// A provider-agnostic stream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum AgentEvent {
    /// A new turn begins.  Discards any previous state.
    StreamStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },

    /// The model started a reasoning block.
    ThinkingStart,

    /// A fragment of reasoning text.
    ThinkingUpdate { content: String },

    /// The reasoning block ended.  `content`, when present, replaces the
    /// accumulated fragments.
    ThinkingComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },

    /// A fragment of answer text.  Forwarded, never logged.
    ContentDelta { content: String },

    /// The consumer-assembled final answer text.
    ContentComplete { content: String },

    /// The model began emitting a tool call.
    ToolCallStart {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
    },

    /// A batch of tool calls is about to run.
    ToolExecutionStart {
        #[serde(default)]
        tools: Vec<ToolRef>,
        round: u32,
    },

    /// One tool call started running.
    ToolExecuting {
        name: String,
        #[serde(default)]
        arguments: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_name: Option<String>,
    },

    /// One tool call finished.
    ToolResult {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Milliseconds.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<u64>,
    },

    /// The batch finished; the loop may start another round.
    ToolExecutionComplete {
        round: u32,
        #[serde(default)]
        success_count: u32,
        #[serde(default)]
        error_count: u32,
    },

    /// Work moved from one model to another.
    ModelHandoff {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_model: Option<String>,
        to_model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },

    /// A multi-model orchestration started.
    MultiModelStart {
        orchestration_id: String,
        #[serde(default)]
        roles: Vec<String>,
    },

    /// A multi-model orchestration finished.
    MultiModelComplete {
        #[serde(default)]
        roles_executed: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_cost: Option<f64>,
    },

    /// Something went wrong upstream.  The session stays alive.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// The turn is over.
    StreamComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metrics: Option<StreamMetrics>,
    },

    /// Discard everything and return to idle.
    Reset,

    /// Any `type` this build does not know.
    #[serde(other)]
    Unknown,
}

impl AgentEvent {
    /// The wire name of this event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StreamStart { .. } => "STREAM_START",
            Self::ThinkingStart => "THINKING_START",
            Self::ThinkingUpdate { .. } => "THINKING_UPDATE",
            Self::ThinkingComplete { .. } => "THINKING_COMPLETE",
            Self::ContentDelta { .. } => "CONTENT_DELTA",
            Self::ContentComplete { .. } => "CONTENT_COMPLETE",
            Self::ToolCallStart { .. } => "TOOL_CALL_START",
            Self::ToolExecutionStart { .. } => "TOOL_EXECUTION_START",
            Self::ToolExecuting { .. } => "TOOL_EXECUTING",
            Self::ToolResult { .. } => "TOOL_RESULT",
            Self::ToolExecutionComplete { .. } => "TOOL_EXECUTION_COMPLETE",
            Self::ModelHandoff { .. } => "MODEL_HANDOFF",
            Self::MultiModelStart { .. } => "MULTI_MODEL_START",
            Self::MultiModelComplete { .. } => "MULTI_MODEL_COMPLETE",
            Self::Error { .. } => "ERROR",
            Self::StreamComplete { .. } => "STREAM_COMPLETE",
            Self::Reset => "RESET",
            Self::Unknown => "UNKNOWN",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
