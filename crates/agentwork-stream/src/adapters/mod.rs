//! Provider adapters: native stream lines in, canonical events out.
//!
//! Each adapter owns the provider-specific parsing state for one agent turn.
//! Nothing downstream of [`ProviderStream::feed_line`] knows which provider
//! produced an event.

pub mod anthropic;
pub mod openai;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{Result, StreamError};
use crate::event::AgentEvent;

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAiAdapter;

/// A tool call the model requested; the host executes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingToolCall {
    /// Provider-assigned call id, used as the correlation id.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Which wire format a stream speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// One canonical JSON event per line.
    Canonical,
    /// Anthropic Messages API SSE.
    Anthropic,
    /// OpenAI Chat Completions SSE.
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Canonical => "canonical",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "canonical" => Ok(Self::Canonical),
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(StreamError::Parse {
                reason: format!("unknown provider `{other}`"),
            }),
        }
    }
}

/// A stream adapter selected by [`ProviderKind`].
#[derive(Debug)]
pub enum ProviderStream {
    Canonical,
    Anthropic(AnthropicAdapter),
    OpenAi(OpenAiAdapter),
}

impl ProviderStream {
    /// A fresh adapter for `kind`.
    pub fn new(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Canonical => Self::Canonical,
            ProviderKind::Anthropic => Self::Anthropic(AnthropicAdapter::new()),
            ProviderKind::OpenAi => Self::OpenAi(OpenAiAdapter::new()),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Canonical => ProviderKind::Canonical,
            Self::Anthropic(_) => ProviderKind::Anthropic,
            Self::OpenAi(_) => ProviderKind::OpenAi,
        }
    }

    /// Translate one raw line into zero or more canonical events.
    pub fn feed_line(&mut self, line: &str) -> Result<Vec<AgentEvent>> {
        match self {
            Self::Canonical => {
                let line = line.trim();
                if line.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![serde_json::from_str(line)?])
            }
            Self::Anthropic(adapter) => adapter.feed_line(line),
            Self::OpenAi(adapter) => adapter.feed_line(line),
        }
    }

    /// Drain tool calls the model requested.  Always empty for canonical
    /// streams, which report execution directly.
    pub fn take_tool_calls(&mut self) -> Vec<PendingToolCall> {
        match self {
            Self::Canonical => Vec::new(),
            Self::Anthropic(adapter) => adapter.take_tool_calls(),
            Self::OpenAi(adapter) => adapter.take_tool_calls(),
        }
    }
}

/// Parse accumulated tool arguments.  Empty input is an empty object; invalid
/// JSON is kept as a raw string.
pub(crate) fn parse_arguments(name: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(tool = %name, error = %e, "tool arguments are not valid JSON");
        Value::String(raw.to_owned())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
