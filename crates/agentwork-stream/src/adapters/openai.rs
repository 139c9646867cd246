//! Adapter for the OpenAI Chat Completions SSE stream.
//!
//! The stream sends `data:` lines whose JSON carries `choices[].delta`
//! objects and terminates each completion with `data: [DONE]`.  Reasoning
//! models put their reasoning in `delta.reasoning_content`; tool calls arrive
//! as `delta.tool_calls` fragments correlated by `index`.
//!
//! A tool loop is a sequence of completions on the same adapter: a
//! completion that finishes with `tool_calls` leaves the turn open, and the
//! next completion continues it.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::{PendingToolCall, parse_arguments};
use crate::error::{Result, StreamError};
use crate::event::{AgentEvent, StreamMetrics};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One `data:` payload of the OpenAI stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiChunk {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// In-progress tool call being assembled from streaming deltas.
#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
    announced: bool,
}

/// Translates OpenAI SSE lines into canonical [`AgentEvent`]s.
#[derive(Debug, Default)]
pub struct OpenAiAdapter {
    started: bool,
    /// A completion is open (between its first chunk and `[DONE]`).
    in_completion: bool,
    model: Option<String>,
    reasoning: bool,
    text: String,
    /// Keyed by the provider's `index`; indexes may be sparse.
    tool_call_builders: BTreeMap<usize, ToolCallBuilder>,
    finish_reason: Option<String>,
    input_tokens: u64,
    output_tokens: u64,
    pending: Vec<PendingToolCall>,
}

impl OpenAiAdapter {
    /// Create a new adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tool calls the model requested since the last drain.
    pub fn take_tool_calls(&mut self) -> Vec<PendingToolCall> {
        std::mem::take(&mut self.pending)
    }

    /// Feed a single SSE line.
    pub fn feed_line(&mut self, line: &str) -> Result<Vec<AgentEvent>> {
        let line = line.trim_end();

        if line.is_empty() || line.starts_with(':') {
            return Ok(Vec::new());
        }

        // `event:` and other SSE fields carry nothing for this API.
        let Some(data) = line.strip_prefix("data:") else {
            trace!(line, "ignoring non-data SSE line");
            return Ok(Vec::new());
        };
        let data = data.trim();

        if data == "[DONE]" {
            return Ok(self.finish());
        }

        let chunk: OpenAiChunk = serde_json::from_str(data).map_err(|e| StreamError::Parse {
            reason: format!("invalid JSON in OpenAI SSE data: {e}"),
        })?;

        Ok(self.adapt(chunk))
    }

    /// Translate one parsed chunk.
    pub fn adapt(&mut self, chunk: OpenAiChunk) -> Vec<AgentEvent> {
        let mut events = Vec::new();

        if let Some(error) = chunk.error {
            events.push(AgentEvent::Error {
                message: error.message,
                code: error.kind,
            });
            return events;
        }

        if !self.in_completion {
            self.open_completion(chunk.model.clone(), &mut events);
        }

        for choice in chunk.choices {
            let delta = choice.delta;

            if let Some(reasoning) = delta.reasoning_content.filter(|r| !r.is_empty()) {
                if !self.reasoning {
                    self.reasoning = true;
                    events.push(AgentEvent::ThinkingStart);
                }
                events.push(AgentEvent::ThinkingUpdate { content: reasoning });
            }

            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                self.close_reasoning(&mut events);
                self.text.push_str(&content);
                events.push(AgentEvent::ContentDelta { content });
            }

            if !delta.tool_calls.is_empty() {
                self.close_reasoning(&mut events);
            }
            for tc in delta.tool_calls {
                self.accumulate_tool_call(tc, &mut events);
            }

            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
        }

        if let Some(usage) = chunk.usage {
            self.input_tokens += usage.prompt_tokens.unwrap_or(0);
            self.output_tokens += usage.completion_tokens.unwrap_or(0);
        }

        events
    }

    fn open_completion(&mut self, model: Option<String>, events: &mut Vec<AgentEvent>) {
        self.in_completion = true;
        self.finish_reason = None;

        if !self.started {
            self.started = true;
            self.model = model.clone();
            debug!(model = model.as_deref().unwrap_or(""), "openai stream started");
            events.push(AgentEvent::StreamStart { model });
        } else if let Some(model) = model {
            if self.model.as_deref() != Some(model.as_str()) {
                events.push(AgentEvent::ModelHandoff {
                    from_model: self.model.replace(model.clone()),
                    to_model: model,
                    role: None,
                });
            }
        }
    }

    fn close_reasoning(&mut self, events: &mut Vec<AgentEvent>) {
        if std::mem::take(&mut self.reasoning) {
            events.push(AgentEvent::ThinkingComplete { content: None });
        }
    }

    fn accumulate_tool_call(&mut self, tc: ToolCallDelta, events: &mut Vec<AgentEvent>) {
        let builder = self.tool_call_builders.entry(tc.index).or_default();

        if let Some(id) = tc.id {
            builder.id = id;
        }
        if let Some(function) = tc.function {
            if let Some(name) = function.name {
                builder.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                builder.arguments.push_str(&arguments);
            }
        }

        if !builder.announced && !builder.name.is_empty() {
            builder.announced = true;
            events.push(AgentEvent::ToolCallStart {
                name: builder.name.clone(),
                tool_call_id: (!builder.id.is_empty()).then(|| builder.id.clone()),
            });
        }
    }

    /// Handle `[DONE]`: flush open blocks and decide whether the turn ends.
    fn finish(&mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        if !self.in_completion {
            return events;
        }
        self.in_completion = false;
        self.close_reasoning(&mut events);

        let text = std::mem::take(&mut self.text);
        if !text.is_empty() {
            events.push(AgentEvent::ContentComplete { content: text });
        }

        let calls: Vec<PendingToolCall> = std::mem::take(&mut self.tool_call_builders)
            .into_iter()
            .filter_map(|(index, b)| {
                if b.name.is_empty() {
                    warn!(index, id = %b.id, "dropping tool call without a name");
                    None
                } else {
                    Some(b)
                }
            })
            .map(|b| PendingToolCall {
                arguments: parse_arguments(&b.name, &b.arguments),
                id: b.id,
                name: b.name,
            })
            .collect();
        let requested_tools = !calls.is_empty();
        self.pending.extend(calls);

        let finish_reason = self.finish_reason.take();
        if requested_tools || finish_reason.as_deref() == Some("tool_calls") {
            debug!(pending = self.pending.len(), "completion finished for tool calls");
        } else {
            events.push(AgentEvent::StreamComplete {
                metrics: Some(StreamMetrics {
                    input_tokens: Some(self.input_tokens),
                    output_tokens: Some(self.output_tokens),
                    ..StreamMetrics::default()
                }),
            });
        }

        events
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
