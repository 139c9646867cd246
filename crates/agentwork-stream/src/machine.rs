//! The stream normalizer: a state machine over [`AgentPhase`].
//!
//! | Event | Phase after | Activity log |
//! |-------|-------------|--------------|
//! | `STREAM_START` | streaming | cleared |
//! | `THINKING_START` | thinking | |
//! | `THINKING_UPDATE` | unchanged | (accumulates) |
//! | `THINKING_COMPLETE` | streaming | + thinking (unless empty) |
//! | `TOOL_CALL_START` | tool_calling | |
//! | `TOOL_EXECUTION_START` | tool_executing | (sets round) |
//! | `TOOL_EXECUTING` | unchanged | + tool_call (executing) |
//! | `TOOL_RESULT` | unchanged | tool_call → complete/error, or + orphan |
//! | `TOOL_EXECUTION_COMPLETE` | streaming | |
//! | `MODEL_HANDOFF` | unchanged | + handoff |
//! | `MULTI_MODEL_START` | synthesizing | |
//! | `MULTI_MODEL_COMPLETE` | complete | |
//! | `CONTENT_DELTA` | unchanged | (forwarded) |
//! | `CONTENT_COMPLETE` | unchanged | + text |
//! | `ERROR` | unchanged | + error |
//! | `STREAM_COMPLETE` | complete | |
//! | `RESET` | idle | cleared |
//!
//! Events are applied strictly in receipt order by a single owner; the
//! machine does no internal synchronization and never branches on provider
//! identity.

use chrono::Utc;
use tracing::{debug, trace, warn};

use crate::event::{AgentEvent, StreamMetrics, ToolRef};
use crate::state::{
    ActivityKind, ActivityStatus, AgentActivity, AgentPhase, AgentState, AgentStateSnapshot,
};

/// What applying one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Phase, accumulators or the activity log may have changed.
    StateChanged,
    /// A content delta to forward to the consumer; state untouched.
    ContentDelta(String),
    /// The event was unknown or malformed and was dropped.
    Ignored,
}

/// Reduces canonical [`AgentEvent`]s into one [`AgentState`].
#[derive(Debug, Default)]
pub struct StreamNormalizer {
    state: AgentState,
}

impl StreamNormalizer {
    /// A normalizer in the idle phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// Shorthand for `state().phase()`.
    pub fn phase(&self) -> AgentPhase {
        self.state.phase
    }

    /// Read-only copy of the current state.
    pub fn snapshot(&self) -> AgentStateSnapshot {
        self.state.snapshot()
    }

    /// Parse and apply a raw JSON event.  Unparseable input is logged and
    /// ignored.
    pub fn apply_json(&mut self, raw: &str) -> Applied {
        match serde_json::from_str::<AgentEvent>(raw) {
            Ok(event) => self.apply(event),
            Err(e) => {
                warn!(error = %e, phase = ?self.state.phase, "ignoring malformed stream event");
                Applied::Ignored
            }
        }
    }

    /// Apply one event.  Total: never panics, never fails.
    pub fn apply(&mut self, event: AgentEvent) -> Applied {
        trace!(event = event.kind(), phase = ?self.state.phase, "applying event");

        match event {
            AgentEvent::StreamStart { model } => {
                debug!(model = model.as_deref().unwrap_or(""), "stream started");
                self.state = AgentState::started(model, Utc::now());
            }

            AgentEvent::ThinkingStart => {
                self.state.phase = AgentPhase::Thinking;
                self.state.thinking_content.clear();
                self.state.thinking_started_at = Some(Utc::now());
            }

            AgentEvent::ThinkingUpdate { content } => {
                self.state.thinking_content.push_str(&content);
            }

            AgentEvent::ThinkingComplete { content } => self.complete_thinking(content),

            AgentEvent::ContentDelta { content } => return Applied::ContentDelta(content),

            AgentEvent::ContentComplete { content } => {
                let ts = self.state.next_timestamp();
                let mut activity =
                    AgentActivity::new(ActivityKind::Text, ActivityStatus::Complete, content, ts);
                activity.model = self.state.current_model.clone();
                self.state.push(activity);
            }

            AgentEvent::ToolCallStart { name, tool_call_id } => {
                debug!(tool = %name, tool_call_id = tool_call_id.as_deref().unwrap_or(""), "tool call announced");
                self.state.phase = AgentPhase::ToolCalling;
            }

            AgentEvent::ToolExecutionStart { tools, round } => self.start_round(&tools, round),

            AgentEvent::ToolExecuting {
                name,
                arguments,
                tool_call_id,
                server_id,
                server_name,
            } => {
                let ts = self.state.next_timestamp();
                let mut activity = AgentActivity::new(
                    ActivityKind::ToolCall,
                    ActivityStatus::Executing,
                    name.clone(),
                    ts,
                );
                activity.tool_call_id =
                    Some(tool_call_id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string()));
                activity.tool_name = Some(name);
                activity.arguments = (!arguments.is_null()).then_some(arguments);
                activity.round = Some(self.state.current_round);
                activity.server_id = server_id;
                activity.server_name = server_name;
                self.state.push(activity);
            }

            AgentEvent::ToolResult {
                name,
                tool_call_id,
                result,
                error,
                duration,
            } => self.finish_tool_call(name, tool_call_id, result, error, duration),

            AgentEvent::ToolExecutionComplete {
                round,
                success_count,
                error_count,
            } => {
                debug!(round, success_count, error_count, "tool round complete");
                self.state.phase = AgentPhase::Streaming;
            }

            AgentEvent::ModelHandoff {
                from_model,
                to_model,
                role,
            } => {
                let from = from_model.or_else(|| self.state.current_model.clone());
                let summary = match (&from, &role) {
                    (Some(from), Some(role)) => format!("{from} → {to_model} ({role})"),
                    (Some(from), None) => format!("{from} → {to_model}"),
                    (None, Some(role)) => format!("→ {to_model} ({role})"),
                    (None, None) => format!("→ {to_model}"),
                };
                let ts = self.state.next_timestamp();
                let mut activity =
                    AgentActivity::new(ActivityKind::Handoff, ActivityStatus::Complete, summary, ts);
                activity.model = Some(to_model.clone());
                activity.role = role.clone();
                activity.round = Some(self.state.current_round);
                self.state.push(activity);

                debug!(to = %to_model, role = role.as_deref().unwrap_or(""), "model handoff");
                self.state.current_model = Some(to_model);
                self.state.current_model_role = role;
            }

            AgentEvent::MultiModelStart {
                orchestration_id,
                roles,
            } => {
                debug!(orchestration_id = %orchestration_id, ?roles, "multi-model orchestration started");
                self.state.phase = AgentPhase::Synthesizing;
                self.state.orchestration_id = Some(orchestration_id);
            }

            AgentEvent::MultiModelComplete {
                roles_executed,
                total_cost,
            } => {
                self.state.phase = AgentPhase::Complete;
                self.state.roles_executed = roles_executed;
                if total_cost.is_some() {
                    self.state.total_cost = total_cost;
                }
            }

            AgentEvent::Error { message, code } => {
                warn!(message = %message, code = code.as_deref().unwrap_or(""), phase = ?self.state.phase, "stream error recorded");
                let ts = self.state.next_timestamp();
                let mut activity =
                    AgentActivity::new(ActivityKind::Error, ActivityStatus::Error, message, ts);
                activity.details = code;
                activity.round = (self.state.current_round > 0).then_some(self.state.current_round);
                self.state.push(activity);
            }

            AgentEvent::StreamComplete { metrics } => self.complete_stream(metrics),

            AgentEvent::Reset => {
                debug!(activities = self.state.activities.len(), "session reset");
                self.state = AgentState::default();
            }

            AgentEvent::Unknown => {
                warn!(phase = ?self.state.phase, "ignoring unknown stream event");
                return Applied::Ignored;
            }
        }

        Applied::StateChanged
    }

    // -- handlers -----------------------------------------------------------

    fn complete_thinking(&mut self, content: Option<String>) {
        if let Some(content) = content {
            self.state.thinking_content = content;
        }
        self.state.phase = AgentPhase::Streaming;

        if self.state.thinking_content.is_empty() {
            debug!("skipping empty thinking block");
            self.state.thinking_started_at = None;
            return;
        }

        let ts = self.state.next_timestamp();
        let mut activity = AgentActivity::new(
            ActivityKind::Thinking,
            ActivityStatus::Complete,
            self.state.thinking_content.clone(),
            ts,
        );
        activity.duration = self
            .state
            .thinking_started_at
            .take()
            .map(|started| elapsed_ms(started, ts));
        activity.model = self.state.current_model.clone();
        self.state.push(activity);
    }

    fn start_round(&mut self, tools: &[ToolRef], round: u32) {
        if round < self.state.current_round {
            warn!(
                round,
                current = self.state.current_round,
                "tool round went backwards, keeping current round"
            );
        } else {
            self.state.current_round = round;
        }
        debug!(
            round = self.state.current_round,
            tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "tool round started"
        );
        self.state.phase = AgentPhase::ToolExecuting;
    }

    /// Correlate a tool result with its call: by id first, then the most
    /// recent executing call with the same name.
    fn find_executing_call(&self, name: &str, tool_call_id: Option<&str>) -> Option<usize> {
        let activities = &self.state.activities;

        if let Some(id) = tool_call_id {
            let by_id = activities
                .iter()
                .rposition(|a| a.is_executing_tool_call() && a.tool_call_id.as_deref() == Some(id));
            if by_id.is_some() {
                return by_id;
            }
        }

        let candidates = activities
            .iter()
            .filter(|a| a.is_executing_tool_call() && a.tool_name.as_deref() == Some(name))
            .count();
        if candidates > 1 {
            debug!(tool = %name, candidates, "ambiguous tool result, matching most recent call");
        }

        activities
            .iter()
            .rposition(|a| a.is_executing_tool_call() && a.tool_name.as_deref() == Some(name))
    }

    fn finish_tool_call(
        &mut self,
        name: String,
        tool_call_id: Option<String>,
        result: Option<serde_json::Value>,
        error: Option<String>,
        duration: Option<u64>,
    ) {
        let status = if error.is_some() {
            ActivityStatus::Error
        } else {
            ActivityStatus::Complete
        };

        match self.find_executing_call(&name, tool_call_id.as_deref()) {
            Some(index) => {
                let now = Utc::now();
                let activity = &mut self.state.activities[index];
                activity.status = status;
                activity.result = result;
                activity.details = error;
                activity.duration =
                    Some(duration.unwrap_or_else(|| elapsed_ms(activity.timestamp, now)));
                debug!(tool = %name, ?status, duration = activity.duration, "tool call finished");
            }
            None => {
                warn!(
                    tool = %name,
                    tool_call_id = tool_call_id.as_deref().unwrap_or(""),
                    round = self.state.current_round,
                    "orphaned tool result, recording standalone activity"
                );
                let ts = self.state.next_timestamp();
                let mut activity =
                    AgentActivity::new(ActivityKind::ToolCall, status, name.clone(), ts);
                activity.tool_name = Some(name);
                activity.tool_call_id = tool_call_id;
                activity.result = result;
                activity.details = error;
                activity.duration = duration;
                activity.round = Some(self.state.current_round);
                activity.orphaned = true;
                self.state.push(activity);
            }
        }
    }

    fn complete_stream(&mut self, metrics: Option<StreamMetrics>) {
        let metrics = metrics.unwrap_or_default();
        let now = Utc::now();

        self.state.phase = AgentPhase::Complete;
        self.state.total_duration = metrics.total_duration.or_else(|| {
            self.state
                .started_at
                .map(|started| elapsed_ms(started, now))
        });
        if metrics.total_cost.is_some() {
            self.state.total_cost = metrics.total_cost;
        }

        debug!(
            activities = self.state.activities.len(),
            duration_ms = self.state.total_duration,
            "stream complete"
        );
    }
}

fn elapsed_ms(from: chrono::DateTime<Utc>, to: chrono::DateTime<Utc>) -> u64 {
    (to - from).num_milliseconds().max(0) as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn started() -> StreamNormalizer {
        let mut n = StreamNormalizer::new();
        n.apply(AgentEvent::StreamStart {
            model: Some("model-a".into()),
        });
        n
    }

    fn executing(name: &str, id: Option<&str>) -> AgentEvent {
        AgentEvent::ToolExecuting {
            name: name.into(),
            arguments: json!({"q": "x"}),
            tool_call_id: id.map(String::from),
            server_id: None,
            server_name: None,
        }
    }

    fn result(name: &str, id: Option<&str>, error: Option<&str>) -> AgentEvent {
        AgentEvent::ToolResult {
            name: name.into(),
            tool_call_id: id.map(String::from),
            result: Some(json!("ok")),
            error: error.map(String::from),
            duration: Some(5),
        }
    }

    #[test]
    fn stream_start_enters_streaming_and_clears_log() {
        let mut n = started();
        n.apply(AgentEvent::Error {
            message: "boom".into(),
            code: None,
        });
        n.apply(AgentEvent::StreamStart { model: None });
        assert_eq!(n.phase(), AgentPhase::Streaming);
        assert!(n.state().activities().is_empty());
    }

    #[test]
    fn thinking_accumulates_into_one_activity() {
        let mut n = started();
        n.apply(AgentEvent::ThinkingStart);
        assert_eq!(n.phase(), AgentPhase::Thinking);
        n.apply(AgentEvent::ThinkingUpdate { content: "a".into() });
        n.apply(AgentEvent::ThinkingUpdate { content: "b".into() });
        assert_eq!(n.phase(), AgentPhase::Thinking);
        n.apply(AgentEvent::ThinkingComplete { content: None });

        let activities = n.state().activities();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].kind, ActivityKind::Thinking);
        assert_eq!(activities[0].content, "ab");
        assert_eq!(n.phase(), AgentPhase::Streaming);
    }

    #[test]
    fn empty_thinking_block_is_skipped() {
        let mut n = started();
        n.apply(AgentEvent::ThinkingComplete { content: None });
        assert!(n.state().activities().is_empty());
        assert_eq!(n.phase(), AgentPhase::Streaming);

        n.apply(AgentEvent::ThinkingStart);
        n.apply(AgentEvent::ThinkingComplete {
            content: Some(String::new()),
        });
        assert!(n.state().activities().is_empty());
        assert_eq!(n.phase(), AgentPhase::Streaming);
    }

    #[test]
    fn thinking_complete_content_overrides_fragments() {
        let mut n = started();
        n.apply(AgentEvent::ThinkingStart);
        n.apply(AgentEvent::ThinkingUpdate { content: "draft".into() });
        n.apply(AgentEvent::ThinkingComplete {
            content: Some("final".into()),
        });
        assert_eq!(n.state().activities()[0].content, "final");
        assert_eq!(n.state().thinking_content(), "final");
    }

    #[test]
    fn tool_result_completes_matching_call() {
        let mut n = started();
        n.apply(AgentEvent::ToolExecutionStart {
            tools: vec![ToolRef::new("grep")],
            round: 1,
        });
        assert_eq!(n.phase(), AgentPhase::ToolExecuting);
        n.apply(executing("grep", None));
        n.apply(AgentEvent::ToolResult {
            name: "grep".into(),
            tool_call_id: None,
            result: Some(json!({"matches": 3})),
            error: None,
            duration: Some(120),
        });

        let activities = n.state().activities();
        assert_eq!(activities.len(), 1);
        let call = &activities[0];
        assert_eq!(call.kind, ActivityKind::ToolCall);
        assert_eq!(call.status, ActivityStatus::Complete);
        assert_eq!(call.round, Some(1));
        assert_eq!(call.duration, Some(120));
        assert_eq!(call.result, Some(json!({"matches": 3})));
        assert!(call.tool_call_id.is_some());
    }

    #[test]
    fn tool_error_marks_call_error() {
        let mut n = started();
        n.apply(executing("fetch", None));
        n.apply(result("fetch", None, Some("timeout")));
        let call = &n.state().activities()[0];
        assert_eq!(call.status, ActivityStatus::Error);
        assert_eq!(call.details.as_deref(), Some("timeout"));
    }

    #[test]
    fn correlation_id_beats_name_order() {
        let mut n = started();
        n.apply(executing("grep", Some("call-1")));
        n.apply(executing("grep", Some("call-2")));
        n.apply(result("grep", Some("call-1"), None));

        let activities = n.state().activities();
        assert_eq!(activities[0].status, ActivityStatus::Complete);
        assert_eq!(activities[1].status, ActivityStatus::Executing);
    }

    #[test]
    fn name_fallback_matches_most_recent_call() {
        let mut n = started();
        n.apply(executing("grep", None));
        n.apply(executing("grep", None));
        n.apply(result("grep", None, None));

        let activities = n.state().activities();
        assert_eq!(activities[0].status, ActivityStatus::Executing);
        assert_eq!(activities[1].status, ActivityStatus::Complete);
    }

    #[test]
    fn completed_call_is_not_matched_twice() {
        let mut n = started();
        n.apply(executing("grep", None));
        n.apply(result("grep", None, None));
        n.apply(result("grep", None, None));

        let activities = n.state().activities();
        assert_eq!(activities.len(), 2);
        assert!(!activities[0].orphaned);
        assert!(activities[1].orphaned);
    }

    #[test]
    fn orphaned_result_is_recorded() {
        let mut n = started();
        n.apply(result("ls", Some("call-9"), Some("denied")));

        let activities = n.state().activities();
        assert_eq!(activities.len(), 1);
        let orphan = &activities[0];
        assert_eq!(orphan.kind, ActivityKind::ToolCall);
        assert_eq!(orphan.status, ActivityStatus::Error);
        assert!(orphan.orphaned);
        assert_eq!(orphan.tool_call_id.as_deref(), Some("call-9"));
    }

    #[test]
    fn round_never_decreases() {
        let mut n = started();
        n.apply(AgentEvent::ToolExecutionStart {
            tools: vec![],
            round: 3,
        });
        n.apply(AgentEvent::ToolExecutionStart {
            tools: vec![],
            round: 2,
        });
        assert_eq!(n.state().current_round(), 3);
    }

    #[test]
    fn execution_complete_returns_to_streaming() {
        let mut n = started();
        n.apply(AgentEvent::ToolCallStart {
            name: "grep".into(),
            tool_call_id: None,
        });
        assert_eq!(n.phase(), AgentPhase::ToolCalling);
        n.apply(AgentEvent::ToolExecutionStart {
            tools: vec![ToolRef::new("grep")],
            round: 1,
        });
        n.apply(AgentEvent::ToolExecutionComplete {
            round: 1,
            success_count: 1,
            error_count: 0,
        });
        assert_eq!(n.phase(), AgentPhase::Streaming);
    }

    #[test]
    fn handoff_updates_model_without_phase_change() {
        let mut n = started();
        n.apply(AgentEvent::ModelHandoff {
            from_model: None,
            to_model: "model-b".into(),
            role: Some("reviewer".into()),
        });
        assert_eq!(n.phase(), AgentPhase::Streaming);
        assert_eq!(n.state().current_model(), Some("model-b"));
        assert_eq!(n.state().current_model_role(), Some("reviewer"));
        let handoff = &n.state().activities()[0];
        assert_eq!(handoff.kind, ActivityKind::Handoff);
        assert_eq!(handoff.content, "model-a → model-b (reviewer)");
    }

    #[test]
    fn multi_model_lifecycle() {
        let mut n = started();
        n.apply(AgentEvent::MultiModelStart {
            orchestration_id: "orch-1".into(),
            roles: vec!["planner".into(), "writer".into()],
        });
        assert_eq!(n.phase(), AgentPhase::Synthesizing);
        assert_eq!(n.state().orchestration_id(), Some("orch-1"));

        n.apply(AgentEvent::MultiModelComplete {
            roles_executed: vec!["planner".into(), "writer".into()],
            total_cost: Some(0.25),
        });
        assert_eq!(n.phase(), AgentPhase::Complete);
        assert_eq!(n.state().total_cost(), Some(0.25));
        assert_eq!(n.snapshot().roles_executed.len(), 2);
    }

    #[test]
    fn content_delta_is_forwarded_only() {
        let mut n = started();
        let applied = n.apply(AgentEvent::ContentDelta {
            content: "Hel".into(),
        });
        assert_eq!(applied, Applied::ContentDelta("Hel".into()));
        assert!(n.state().activities().is_empty());
        assert_eq!(n.phase(), AgentPhase::Streaming);
    }

    #[test]
    fn content_complete_appends_text() {
        let mut n = started();
        n.apply(AgentEvent::ContentComplete {
            content: "Hello".into(),
        });
        let text = &n.state().activities()[0];
        assert_eq!(text.kind, ActivityKind::Text);
        assert_eq!(text.model.as_deref(), Some("model-a"));
    }

    #[test]
    fn error_keeps_phase_and_session_alive() {
        let mut n = started();
        n.apply(AgentEvent::ThinkingStart);
        n.apply(AgentEvent::Error {
            message: "rate limited".into(),
            code: Some("429".into()),
        });
        assert_eq!(n.phase(), AgentPhase::Thinking);
        n.apply(AgentEvent::ThinkingUpdate { content: "waiting".into() });
        n.apply(AgentEvent::ThinkingComplete { content: None });
        assert_eq!(n.state().activities().len(), 2);
        assert_eq!(n.state().activities()[0].details.as_deref(), Some("429"));
    }

    #[test]
    fn stream_complete_records_metrics() {
        let mut n = started();
        n.apply(AgentEvent::StreamComplete {
            metrics: Some(StreamMetrics {
                total_duration: Some(1500),
                total_cost: Some(0.01),
                ..StreamMetrics::default()
            }),
        });
        assert_eq!(n.phase(), AgentPhase::Complete);
        assert_eq!(n.state().total_duration(), Some(1500));
        assert_eq!(n.state().total_cost(), Some(0.01));
    }

    #[test]
    fn stream_complete_without_metrics_measures_elapsed() {
        let mut n = started();
        n.apply(AgentEvent::StreamComplete { metrics: None });
        assert!(n.state().total_duration().is_some());
        assert_eq!(n.state().total_cost(), None);
    }

    #[test]
    fn reset_from_any_phase_returns_to_idle() {
        let mut n = started();
        n.apply(AgentEvent::ToolExecutionStart {
            tools: vec![],
            round: 4,
        });
        n.apply(executing("grep", None));
        n.apply(AgentEvent::ThinkingStart);
        n.apply(AgentEvent::ThinkingUpdate {
            content: "x".into(),
        });
        n.apply(AgentEvent::Reset);

        let snapshot = n.snapshot();
        assert_eq!(snapshot.phase, AgentPhase::Idle);
        assert!(snapshot.activities.is_empty());
        assert_eq!(snapshot.current_round, 0);
        assert_eq!(snapshot.thinking_content, None);
    }

    #[test]
    fn unknown_and_malformed_events_are_ignored() {
        let mut n = started();
        n.apply(AgentEvent::ThinkingStart);

        assert_eq!(n.apply(AgentEvent::Unknown), Applied::Ignored);
        assert_eq!(n.apply_json(r#"{"type":"FUTURE_THING","x":1}"#), Applied::Ignored);
        assert_eq!(n.apply_json("not json"), Applied::Ignored);
        assert_eq!(n.apply_json(r#"{"type":"TOOL_RESULT"}"#), Applied::Ignored);

        assert_eq!(n.phase(), AgentPhase::Thinking);
        assert!(n.state().activities().is_empty());
    }

    #[test]
    fn apply_json_applies_valid_events() {
        let mut n = StreamNormalizer::new();
        assert_eq!(
            n.apply_json(r#"{"type":"STREAM_START","model":"m"}"#),
            Applied::StateChanged
        );
        assert_eq!(n.phase(), AgentPhase::Streaming);
    }
}
