//! Adapter for the Anthropic Messages API SSE stream.
//!
//! The stream sends `event:` and `data:` lines.  Every `data:` payload carries
//! its own `type`, so the `event:` line is only remembered for diagnostics.
//!
//! | Native chunk | Canonical events |
//! |--------------|------------------|
//! | first `message_start` | `STREAM_START` |
//! | later `message_start`, new model | `MODEL_HANDOFF` |
//! | `content_block_start` thinking | `THINKING_START` |
//! | `thinking_delta` | `THINKING_UPDATE` |
//! | thinking block stop | `THINKING_COMPLETE` |
//! | `text_delta` | `CONTENT_DELTA` |
//! | text block stop | `CONTENT_COMPLETE` |
//! | `content_block_start` tool_use | `TOOL_CALL_START` |
//! | `message_stop`, stop reason not `tool_use` | `STREAM_COMPLETE` |
//! | `error` | `ERROR` |
//!
//! Tool execution happens in the host, which drains requested calls with
//! [`AnthropicAdapter::take_tool_calls`] and reports execution through
//! canonical events.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::{PendingToolCall, parse_arguments};
use crate::error::{Result, StreamError};
use crate::event::{AgentEvent, StreamMetrics};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One `data:` payload of the Anthropic stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicChunk {
    MessageStart {
        message: MessageMeta,
    },
    ContentBlockStart {
        index: u32,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<Usage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageMeta {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// An open content block, keyed by its `index`.
#[derive(Debug)]
enum OpenBlock {
    Thinking,
    Text(String),
    ToolUse {
        id: String,
        name: String,
        input: String,
    },
    Other,
}

/// Translates Anthropic SSE lines into canonical [`AgentEvent`]s.
///
/// One adapter spans a whole agent turn: every `message_start` after the
/// first is another round of the same tool loop, not a new stream.
#[derive(Debug, Default)]
pub struct AnthropicAdapter {
    /// The most recently seen `event:` type.
    current_event_type: Option<String>,
    started: bool,
    model: Option<String>,
    blocks: HashMap<u32, OpenBlock>,
    stop_reason: Option<String>,
    input_tokens: u64,
    /// Output tokens of finished messages.
    output_tokens: u64,
    /// Running output count of the open message; `message_delta` reports it
    /// cumulatively.
    message_output_tokens: u64,
    pending: Vec<PendingToolCall>,
}

impl AnthropicAdapter {
    /// Create a new adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tool calls the model requested since the last drain.
    pub fn take_tool_calls(&mut self) -> Vec<PendingToolCall> {
        std::mem::take(&mut self.pending)
    }

    /// Feed a single SSE line.
    ///
    /// Blank lines, comments and `event:` lines yield no events.
    pub fn feed_line(&mut self, line: &str) -> Result<Vec<AgentEvent>> {
        let line = line.trim_end();

        if line.is_empty() || line.starts_with(':') {
            return Ok(Vec::new());
        }

        if let Some(event_type) = line.strip_prefix("event:") {
            self.current_event_type = Some(event_type.trim().to_owned());
            return Ok(Vec::new());
        }

        let Some(data) = line.strip_prefix("data:") else {
            trace!(line, "ignoring unrecognised SSE line");
            return Ok(Vec::new());
        };
        let data = data.trim();
        let event_type = self.current_event_type.take();

        if data == "[DONE]" {
            return Ok(self.adapt(AnthropicChunk::MessageStop));
        }

        let chunk: AnthropicChunk =
            serde_json::from_str(data).map_err(|e| StreamError::Parse {
                reason: format!(
                    "invalid JSON in Anthropic SSE data ({}): {e}",
                    event_type.as_deref().unwrap_or("no event line")
                ),
            })?;

        Ok(self.adapt(chunk))
    }

    /// Translate one parsed chunk.
    pub fn adapt(&mut self, chunk: AnthropicChunk) -> Vec<AgentEvent> {
        let mut events = Vec::new();

        match chunk {
            AnthropicChunk::MessageStart { message } => {
                self.output_tokens += std::mem::take(&mut self.message_output_tokens);
                if let Some(usage) = message.usage {
                    self.input_tokens += usage.input_tokens.unwrap_or(0);
                    self.message_output_tokens = usage.output_tokens.unwrap_or(0);
                }
                self.stop_reason = None;
                self.blocks.clear();

                if !self.started {
                    self.started = true;
                    self.model = message.model.clone();
                    debug!(message_id = %message.id, "anthropic stream started");
                    events.push(AgentEvent::StreamStart {
                        model: message.model,
                    });
                } else if let Some(model) = message.model {
                    if self.model.as_deref() != Some(model.as_str()) {
                        events.push(AgentEvent::ModelHandoff {
                            from_model: self.model.replace(model.clone()),
                            to_model: model,
                            role: None,
                        });
                    }
                }
            }

            AnthropicChunk::ContentBlockStart {
                index,
                content_block,
            } => {
                let block = match content_block {
                    ContentBlock::Thinking { thinking } => {
                        events.push(AgentEvent::ThinkingStart);
                        if !thinking.is_empty() {
                            events.push(AgentEvent::ThinkingUpdate { content: thinking });
                        }
                        OpenBlock::Thinking
                    }
                    ContentBlock::Text { text } => {
                        if !text.is_empty() {
                            events.push(AgentEvent::ContentDelta {
                                content: text.clone(),
                            });
                        }
                        OpenBlock::Text(text)
                    }
                    ContentBlock::ToolUse { id, name } => {
                        events.push(AgentEvent::ToolCallStart {
                            name: name.clone(),
                            tool_call_id: Some(id.clone()),
                        });
                        OpenBlock::ToolUse {
                            id,
                            name,
                            input: String::new(),
                        }
                    }
                    ContentBlock::Other => OpenBlock::Other,
                };
                self.blocks.insert(index, block);
            }

            AnthropicChunk::ContentBlockDelta { index, delta } => {
                match (self.blocks.get_mut(&index), delta) {
                    (Some(OpenBlock::Thinking), BlockDelta::ThinkingDelta { thinking }) => {
                        events.push(AgentEvent::ThinkingUpdate { content: thinking });
                    }
                    (Some(OpenBlock::Text(buf)), BlockDelta::TextDelta { text }) => {
                        buf.push_str(&text);
                        events.push(AgentEvent::ContentDelta { content: text });
                    }
                    (Some(OpenBlock::ToolUse { input, .. }), BlockDelta::InputJsonDelta { partial_json }) => {
                        input.push_str(&partial_json);
                    }
                    (_, BlockDelta::Other) => {}
                    (block, delta) => {
                        warn!(index, ?delta, open = block.is_some(), "delta does not match content block");
                    }
                }
            }

            AnthropicChunk::ContentBlockStop { index } => match self.blocks.remove(&index) {
                Some(OpenBlock::Thinking) => {
                    events.push(AgentEvent::ThinkingComplete { content: None });
                }
                Some(OpenBlock::Text(text)) => {
                    if !text.is_empty() {
                        events.push(AgentEvent::ContentComplete { content: text });
                    }
                }
                Some(OpenBlock::ToolUse { id, name, input }) => {
                    self.pending.push(PendingToolCall {
                        arguments: parse_arguments(&name, &input),
                        id,
                        name,
                    });
                }
                Some(OpenBlock::Other) => {}
                None => warn!(index, "stop for unknown content block"),
            },

            AnthropicChunk::MessageDelta { delta, usage } => {
                if let Some(output) = usage.and_then(|u| u.output_tokens) {
                    self.message_output_tokens = output;
                }
                self.stop_reason = delta.stop_reason;
            }

            AnthropicChunk::MessageStop => {
                let stop_reason = self.stop_reason.take();
                if stop_reason.as_deref() == Some("tool_use") {
                    debug!(pending = self.pending.len(), "message stopped for tool use");
                } else {
                    events.push(AgentEvent::StreamComplete {
                        metrics: Some(StreamMetrics {
                            input_tokens: Some(self.input_tokens),
                            output_tokens: Some(self.output_tokens + self.message_output_tokens),
                            ..StreamMetrics::default()
                        }),
                    });
                }
            }

            AnthropicChunk::Ping => {}

            AnthropicChunk::Error { error } => {
                events.push(AgentEvent::Error {
                    message: error.message,
                    code: error.kind,
                });
            }

            AnthropicChunk::Unknown => {
                trace!("ignoring unknown Anthropic chunk type");
            }
        }

        events
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(adapter: &mut AnthropicAdapter, lines: &[&str]) -> Vec<AgentEvent> {
        lines
            .iter()
            .flat_map(|line| adapter.feed_line(line).unwrap())
            .collect()
    }

    const MESSAGE_START: &str = r#"data: {"type":"message_start","message":{"id":"msg_01","model":"claude-sonnet","usage":{"input_tokens":10,"output_tokens":1}}}"#;

    #[test]
    fn first_message_start_opens_stream() {
        let mut adapter = AnthropicAdapter::new();
        let events = feed(&mut adapter, &["event: message_start", MESSAGE_START]);
        assert_eq!(
            events,
            vec![AgentEvent::StreamStart {
                model: Some("claude-sonnet".into())
            }]
        );
    }

    #[test]
    fn thinking_block_maps_to_thinking_events() {
        let mut adapter = AnthropicAdapter::new();
        let events = feed(
            &mut adapter,
            &[
                MESSAGE_START,
                r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#,
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"a"}}"#,
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"sig"}}"#,
                r#"data: {"type":"content_block_stop","index":0}"#,
            ],
        );
        assert_eq!(
            &events[1..],
            &[
                AgentEvent::ThinkingStart,
                AgentEvent::ThinkingUpdate {
                    content: "a".into()
                },
                AgentEvent::ThinkingComplete { content: None },
            ]
        );
    }

    #[test]
    fn text_block_forwards_deltas_and_completes() {
        let mut adapter = AnthropicAdapter::new();
        let events = feed(
            &mut adapter,
            &[
                MESSAGE_START,
                r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#,
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"lo"}}"#,
                r#"data: {"type":"content_block_stop","index":0}"#,
                r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":5}}"#,
                r#"data: {"type":"message_stop"}"#,
            ],
        );
        assert_eq!(
            events[3],
            AgentEvent::ContentComplete {
                content: "Hello".into()
            }
        );
        match &events[4] {
            AgentEvent::StreamComplete { metrics: Some(m) } => {
                assert_eq!(m.input_tokens, Some(10));
                assert_eq!(m.output_tokens, Some(5));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn tool_use_is_announced_and_queued() {
        let mut adapter = AnthropicAdapter::new();
        let events = feed(
            &mut adapter,
            &[
                MESSAGE_START,
                r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"grep","input":{}}}"#,
                r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"q\":"}}"#,
                r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"x\"}"}}"#,
                r#"data: {"type":"content_block_stop","index":1}"#,
                r#"data: {"type":"message_delta","delta":{"stop_reason":"tool_use"}}"#,
                r#"data: {"type":"message_stop"}"#,
            ],
        );
        assert_eq!(
            events[1],
            AgentEvent::ToolCallStart {
                name: "grep".into(),
                tool_call_id: Some("toolu_1".into())
            }
        );
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, AgentEvent::StreamComplete { .. }))
        );

        let calls = adapter.take_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "toolu_1");
        assert_eq!(calls[0].arguments["q"], "x");
        assert!(adapter.take_tool_calls().is_empty());
    }

    #[test]
    fn second_message_with_new_model_is_a_handoff() {
        let mut adapter = AnthropicAdapter::new();
        feed(&mut adapter, &[MESSAGE_START]);
        let events = feed(
            &mut adapter,
            &[
                MESSAGE_START,
                r#"data: {"type":"message_start","message":{"id":"msg_02","model":"claude-opus"}}"#,
            ],
        );
        assert_eq!(
            events,
            vec![AgentEvent::ModelHandoff {
                from_model: Some("claude-sonnet".into()),
                to_model: "claude-opus".into(),
                role: None,
            }]
        );
    }

    #[test]
    fn error_chunk_maps_to_error_event() {
        let mut adapter = AnthropicAdapter::new();
        let events = feed(
            &mut adapter,
            &[
                "event: error",
                r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
            ],
        );
        assert_eq!(
            events,
            vec![AgentEvent::Error {
                message: "Overloaded".into(),
                code: Some("overloaded_error".into()),
            }]
        );
    }

    #[test]
    fn blank_comment_and_ping_lines_yield_nothing() {
        let mut adapter = AnthropicAdapter::new();
        let events = feed(
            &mut adapter,
            &["", ": keepalive", "event: ping", r#"data: {"type":"ping"}"#],
        );
        assert!(events.is_empty());
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let mut adapter = AnthropicAdapter::new();
        let err = adapter.feed_line("data: {nope").unwrap_err();
        assert!(matches!(err, StreamError::Parse { .. }));
    }
}
