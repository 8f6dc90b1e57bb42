//! The loop controller: send → parse → classify → execute → fold back.
//!
//! Each iteration:
//!
//! 1. **Guard**: stop if aborted or the iteration budget is spent
//! 2. **Send** the whole conversation to the provider (failure ends the run)
//! 3. **Append** the reply as an assistant message
//! 4. **Parse** directives; no calls means the model is done
//! 5. **Classify** calls as read or write; a turn mixing both runs only the
//!    reads and withholds the writes with an advisory
//! 6. **Execute** sequentially in parse order, re-checking the abort flag
//!    before each tool; a failed critical tool ends the run
//! 7. **Fold** every result into one user message and loop
//!
//! Every run ends in a [`LoopOutcome`]; nothing is returned as `Err`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use stylesmith_core::error::ToolError;
use stylesmith_core::event::{EventBus, LoopEvent};
use stylesmith_core::message::Message;
use stylesmith_core::provider::{Provider, ProviderRequest};
use stylesmith_core::tool::{Tool, ToolCall, ToolExecutionResult, ToolRegistry};
use tracing::{debug, info, warn};

use crate::parser::{RESULTS_HEADER, parse_tool_calls};
use crate::state::{ConversationState, LoopState};

/// Marker carried by the response of a user-stopped run.
pub const STOPPED_BY_USER: &str = "[Stopped by user]";

/// How a run ended, with everything needed to render or resume it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopOutcome {
    pub state: LoopState,

    /// Final reply text (Completed), or the last reply plus a marker
    pub response: String,

    /// Failure description (Failed only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Critical tools whose failure ended the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_tools: Vec<String>,

    /// Truncation, trimming and withholding notices raised during the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<String>,

    /// Iterations used by this run
    pub iterations: u32,

    /// Conversation snapshot at the end of the run
    pub messages: Vec<Message>,
}

impl LoopOutcome {
    /// Completed, or stopped by the user.
    pub fn is_success(&self) -> bool {
        matches!(self.state, LoopState::Completed | LoopState::Aborted)
    }

    /// Transport failure or critical tool failure.
    pub fn is_failure(&self) -> bool {
        self.state == LoopState::Failed
    }
}

/// One entry of a classified batch.
enum Planned<'a> {
    Run { call: &'a ToolCall, tool: &'a dyn Tool },
    Unknown(&'a ToolCall),
}

struct BatchPlan<'a> {
    entries: Vec<Planned<'a>>,
    withheld: Vec<String>,
}

/// Drives the tool-calling loop for any number of independent conversations.
pub struct LoopController {
    /// The model transport
    provider: Arc<dyn Provider>,

    /// The model to request
    model: String,

    temperature: f32,

    /// Max tokens per reply
    max_tokens: Option<u32>,

    /// Tool registry, read-only during a run
    tools: Arc<ToolRegistry>,

    /// Tools whose failure ends the run
    critical_tools: HashSet<String>,

    /// Observer sink
    event_bus: Arc<EventBus>,
}

impl LoopController {
    /// Create a new loop controller with no critical tools.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
            critical_tools: HashSet::new(),
            event_bus,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per model reply.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the tools whose failure is fatal for the run.
    pub fn with_critical_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical_tools = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn is_critical(&self, tool_name: &str) -> bool {
        self.critical_tools.contains(tool_name)
    }

    /// Run one user turn to a terminal state.
    pub async fn run(&self, state: &mut ConversationState, user_input: &str) -> LoopOutcome {
        info!(
            conversation_id = %state.id(),
            messages = state.messages().len(),
            max_iterations = state.max_iterations(),
            "Loop run starting"
        );

        state.iteration_count = 0;
        state.status = LoopState::Running;
        let mut notices = Vec::new();
        let mut last_reply = String::new();

        self.append(state, Message::user(user_input), &mut notices);
        self.event_bus.publish(LoopEvent::UserInput {
            content: user_input.to_string(),
            timestamp: Utc::now(),
        });

        loop {
            if state.is_aborted() {
                return self.finish_aborted(state, notices, &last_reply);
            }
            if state.iteration_count >= state.max_iterations() {
                return self.finish_max_iterations(state, notices, &last_reply);
            }

            state.iteration_count += 1;
            let iteration = state.iteration_count;
            debug!(conversation_id = %state.id(), iteration, "Loop iteration");

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: state.messages().to_vec(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };

            let reply = match self.provider.complete(request).await {
                Ok(response) => response.content,
                Err(e) => {
                    warn!(provider = %self.provider.name(), error = %e, "Model transport failed");
                    return self.finish_failed(state, notices, &last_reply, e.to_string(), Vec::new());
                }
            };

            let calls = parse_tool_calls(&reply);
            self.append(state, Message::assistant(reply.as_str()), &mut notices);
            self.event_bus.publish(LoopEvent::AssistantReply {
                iteration,
                content: reply.clone(),
                tool_calls: calls.len(),
                timestamp: Utc::now(),
            });
            last_reply = reply;

            // Stop requested while the model was answering
            if state.is_aborted() {
                return self.finish_aborted(state, notices, &last_reply);
            }

            if calls.is_empty() {
                return self.finish_completed(state, notices, last_reply);
            }

            let plan = self.plan_batch(&calls);
            let advisory = if plan.withheld.is_empty() {
                None
            } else {
                warn!(
                    iteration,
                    withheld = ?plan.withheld,
                    "Mixed read/write turn, withholding write calls"
                );
                self.event_bus.publish(LoopEvent::WritesWithheld {
                    iteration,
                    withheld: plan.withheld.clone(),
                    timestamp: Utc::now(),
                });
                let text = withheld_advisory(&plan.withheld);
                notices.push(text.clone());
                Some(text)
            };

            let mut results: Vec<ToolExecutionResult> = Vec::with_capacity(plan.entries.len());
            for entry in plan.entries {
                let (call, tool) = match entry {
                    Planned::Unknown(call) => {
                        debug!(tool = %call.name, "Skipping unknown tool");
                        results.push(ToolExecutionResult::failure(
                            &call.name,
                            ToolError::NotFound(call.name.clone()).to_string(),
                        ));
                        continue;
                    }
                    Planned::Run { call, tool } => (call, tool),
                };

                if state.is_aborted() {
                    if !results.is_empty() {
                        let message = format_results_message(advisory.as_deref(), &results);
                        self.append(state, Message::user(message), &mut notices);
                    }
                    return self.finish_aborted(state, notices, &last_reply);
                }

                let result = self.execute_tool(iteration, call, tool).await;
                let critical_failure = !result.success && self.is_critical(&call.name);
                let error = result.error.clone().unwrap_or_default();
                results.push(result);

                if critical_failure {
                    let message = format_results_message(advisory.as_deref(), &results);
                    self.append(state, Message::user(message), &mut notices);
                    let text = format!("Critical tool '{}' failed: {}", call.name, error);
                    return self.finish_failed(state, notices, &last_reply, text, vec![call.name.clone()]);
                }
            }

            let message = format_results_message(advisory.as_deref(), &results);
            self.append(state, Message::user(message), &mut notices);
            // Loop back: the model sees the results and decides what to do next
        }
    }

    /// Classify calls and apply the mixed-usage rule.
    fn plan_batch<'a>(&'a self, calls: &'a [ToolCall]) -> BatchPlan<'a> {
        let mut has_read = false;
        let mut has_write = false;
        for call in calls {
            match self.tools.is_write(&call.name) {
                Some(true) => has_write = true,
                Some(false) => has_read = true,
                None => {}
            }
        }
        let mixed = has_read && has_write;

        let mut entries = Vec::with_capacity(calls.len());
        let mut withheld = Vec::new();
        for call in calls {
            match self.tools.get(&call.name) {
                Some(tool) if mixed && tool.is_write() => withheld.push(call.name.clone()),
                Some(tool) => entries.push(Planned::Run { call, tool }),
                None => entries.push(Planned::Unknown(call)),
            }
        }
        BatchPlan { entries, withheld }
    }

    async fn execute_tool(&self, iteration: u32, call: &ToolCall, tool: &dyn Tool) -> ToolExecutionResult {
        self.event_bus.publish(LoopEvent::ToolStarted {
            iteration,
            tool_name: call.name.clone(),
            parameters: serde_json::Value::Object(call.parameters.clone()),
            timestamp: Utc::now(),
        });

        let start = std::time::Instant::now();
        let result = tool.execute(&call.parameters).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if result.success {
            debug!(tool = %call.name, duration_ms, "Tool succeeded");
        } else {
            warn!(tool = %call.name, error = ?result.error, "Tool failed");
        }

        self.event_bus.publish(LoopEvent::ToolFinished {
            iteration,
            tool_name: call.name.clone(),
            success: result.success,
            error: result.error.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });
        result
    }

    /// Append through the memory bounds and report what they did.
    fn append(&self, state: &mut ConversationState, message: Message, notices: &mut Vec<String>) {
        let report = state.memory.push(message);

        if let Some(t) = report.truncated {
            info!(original_bytes = t.original_bytes, stored_bytes = t.stored_bytes, "Message truncated");
            notices.push(format!(
                "A message was truncated from {} to {} bytes.",
                t.original_bytes, t.stored_bytes
            ));
            self.event_bus.publish(LoopEvent::MessageTruncated {
                original_bytes: t.original_bytes,
                stored_bytes: t.stored_bytes,
                timestamp: Utc::now(),
            });
        }

        if let Some(t) = report.trimmed {
            info!(
                evicted = t.evicted,
                before_bytes = t.before_bytes,
                after_bytes = t.after_bytes,
                "Conversation history trimmed"
            );
            notices.push(format!(
                "Removed {} older message(s) to fit the conversation limit ({} -> {} bytes).",
                t.evicted, t.before_bytes, t.after_bytes
            ));
            self.event_bus.publish(LoopEvent::HistoryTrimmed {
                evicted: t.evicted,
                before_bytes: t.before_bytes,
                after_bytes: t.after_bytes,
                timestamp: Utc::now(),
            });
        }
    }

    fn finish_completed(&self, state: &mut ConversationState, notices: Vec<String>, response: String) -> LoopOutcome {
        info!(iterations = state.iteration_count, "Loop completed");
        self.event_bus.publish(LoopEvent::LoopCompleted {
            iterations: state.iteration_count,
            timestamp: Utc::now(),
        });
        self.outcome(state, LoopState::Completed, response, None, Vec::new(), notices)
    }

    fn finish_failed(
        &self,
        state: &mut ConversationState,
        notices: Vec<String>,
        last_reply: &str,
        error: String,
        failed_tools: Vec<String>,
    ) -> LoopOutcome {
        warn!(iterations = state.iteration_count, error = %error, "Loop failed");
        self.event_bus.publish(LoopEvent::LoopFailed {
            iterations: state.iteration_count,
            error: error.clone(),
            timestamp: Utc::now(),
        });
        self.outcome(state, LoopState::Failed, last_reply.to_string(), Some(error), failed_tools, notices)
    }

    fn finish_aborted(&self, state: &mut ConversationState, notices: Vec<String>, last_reply: &str) -> LoopOutcome {
        info!(iterations = state.iteration_count, "Loop stopped by user");
        self.event_bus.publish(LoopEvent::LoopAborted {
            iterations: state.iteration_count,
            timestamp: Utc::now(),
        });
        let response = with_marker(last_reply, STOPPED_BY_USER);
        self.outcome(state, LoopState::Aborted, response, None, Vec::new(), notices)
    }

    fn finish_max_iterations(
        &self,
        state: &mut ConversationState,
        notices: Vec<String>,
        last_reply: &str,
    ) -> LoopOutcome {
        warn!(iterations = state.iteration_count, "Max iterations reached");
        self.event_bus.publish(LoopEvent::MaxIterationsReached {
            iterations: state.iteration_count,
            timestamp: Utc::now(),
        });
        let marker = format!(
            "[Reached the maximum of {} iterations. Send another message to continue.]",
            state.max_iterations()
        );
        let response = with_marker(last_reply, &marker);
        self.outcome(state, LoopState::MaxIterations, response, None, Vec::new(), notices)
    }

    fn outcome(
        &self,
        state: &mut ConversationState,
        terminal: LoopState,
        response: String,
        error: Option<String>,
        failed_tools: Vec<String>,
        notices: Vec<String>,
    ) -> LoopOutcome {
        state.status = terminal;
        LoopOutcome {
            state: terminal,
            response,
            error,
            failed_tools,
            notices,
            iterations: state.iteration_count,
            messages: state.messages().to_vec(),
        }
    }
}

fn with_marker(text: &str, marker: &str) -> String {
    let text = text.trim_end();
    if text.is_empty() {
        marker.to_string()
    } else {
        format!("{text}\n\n{marker}")
    }
}

/// Advisory folded into the next turn when write calls were withheld.
pub fn withheld_advisory(withheld: &[String]) -> String {
    format!(
        "NOTICE: This turn requested both read and write tools, so only the read tools were executed. \
Withheld write calls: {}. Review the read results below, then issue the write calls again if they are still needed.",
        withheld.join(", ")
    )
}

/// Render the synthesized results message: optional advisory, then one line per result.
pub fn format_results_message(advisory: Option<&str>, results: &[ToolExecutionResult]) -> String {
    let mut out = String::new();
    if let Some(advisory) = advisory {
        out.push_str(advisory);
        out.push_str("\n\n");
    }
    out.push_str(RESULTS_HEADER);
    for (i, result) in results.iter().enumerate() {
        let outcome = serde_json::to_string(&result.outcome()).unwrap_or_else(|_| {
            format!("{{\"success\":{}}}", result.success)
        });
        out.push_str(&format!("\n[{}] {} -> {}", i + 1, result.tool_name, outcome));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use serde_json::json;
    use stylesmith_core::limits::SizePolicy;

    fn state(max_iterations: u32) -> ConversationState {
        ConversationState::new("system", SizePolicy::default(), max_iterations)
    }

    fn controller(provider: Arc<ScriptedProvider>, registry: ToolRegistry) -> LoopController {
        LoopController::new(provider, "mock-model", Arc::new(registry), Arc::new(EventBus::default()))
    }

    #[tokio::test]
    async fn reply_without_calls_completes_on_first_iteration() {
        let provider = Arc::new(ScriptedProvider::text("All done."));
        let agent = controller(provider.clone(), ToolRegistry::new());
        let mut st = state(10);

        let outcome = agent.run(&mut st, "Make links red").await;
        assert_eq!(outcome.state, LoopState::Completed);
        assert!(outcome.is_success());
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.response, "All done.");
        // system + user + assistant
        assert_eq!(outcome.messages.len(), 3);
        assert_eq!(provider.calls(), 1);
        assert_eq!(st.status(), LoopState::Completed);
    }

    #[tokio::test]
    async fn empty_reply_completes() {
        let provider = Arc::new(ScriptedProvider::text(""));
        let agent = controller(provider, ToolRegistry::new());
        let outcome = agent.run(&mut state(10), "hi").await;
        assert_eq!(outcome.state, LoopState::Completed);
        assert_eq!(outcome.iterations, 1);
    }

    #[tokio::test]
    async fn tool_results_are_folded_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("TOOL_CALL: read_a\nPARAMETERS: {\"x\": 1}".into()),
            Ok("Finished.".into()),
        ]));
        let read = MockTool::read("read_a");
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(read.clone()));
        let agent = controller(provider.clone(), registry);
        let mut st = state(10);

        let outcome = agent.run(&mut st, "go").await;
        assert_eq!(outcome.state, LoopState::Completed);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(read.calls(), 1);
        assert_eq!(read.last_parameters(), Some(json!({"x": 1})));

        let results = &outcome.messages[3];
        assert_eq!(results.role, stylesmith_core::message::Role::User);
        assert!(results.content.starts_with(RESULTS_HEADER));
        assert!(results.content.contains("[1] read_a -> {\"data\":"));

        // The second request carried the folded results.
        let seen = provider.requests();
        assert_eq!(seen[1].len(), 4);
    }

    #[tokio::test]
    async fn transport_failure_fails_the_run() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(
            stylesmith_core::error::ProviderError::Network("connection reset".into()),
        )]));
        let agent = controller(provider, ToolRegistry::new());
        let outcome = agent.run(&mut state(10), "hi").await;
        assert_eq!(outcome.state, LoopState::Failed);
        assert!(outcome.is_failure());
        assert!(outcome.error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn mixed_turn_runs_reads_only() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("TOOL_CALL: save_css\nPARAMETERS: {\"code\": \"a{}\"}\nTOOL_CALL: get_css".into()),
            Ok("ok".into()),
        ]));
        let read = MockTool::read("get_css");
        let write = MockTool::write("save_css");
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(read.clone()));
        registry.register(Box::new(write.clone()));
        let agent = controller(provider, registry);

        let outcome = agent.run(&mut state(10), "restyle").await;
        assert_eq!(outcome.state, LoopState::Completed);
        assert_eq!(read.calls(), 1);
        assert_eq!(write.calls(), 0);
        let folded = &outcome.messages[3].content;
        assert!(folded.starts_with("NOTICE:"));
        assert!(folded.contains("save_css"));
        assert!(outcome.notices.iter().any(|n| n.contains("Withheld write calls: save_css")));
    }

    #[tokio::test]
    async fn writes_alone_are_executed() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("TOOL_CALL: save_css\nPARAMETERS: {\"code\": \"a{}\"}".into()),
            Ok("saved".into()),
        ]));
        let write = MockTool::write("save_css");
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(write.clone()));
        let agent = controller(provider, registry);
        let outcome = agent.run(&mut state(10), "save").await;
        assert_eq!(outcome.state, LoopState::Completed);
        assert_eq!(write.calls(), 1);
    }

    #[tokio::test]
    async fn critical_failure_halts_batch() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            "TOOL_CALL: save_css\nPARAMETERS: {\"code\": \"a{}\"}\nTOOL_CALL: save_js\nPARAMETERS: {\"code\": \"1\"}".into(),
        )]));
        let failing = MockTool::write("save_css").failing("disk full");
        let after = MockTool::write("save_js");
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(failing.clone()));
        registry.register(Box::new(after.clone()));
        let agent = controller(provider, registry).with_critical_tools(["save_css"]);

        let outcome = agent.run(&mut state(10), "save both").await;
        assert_eq!(outcome.state, LoopState::Failed);
        assert_eq!(outcome.failed_tools, vec!["save_css".to_string()]);
        let error = outcome.error.unwrap();
        assert!(error.contains("save_css"));
        assert!(error.contains("disk full"));
        assert_eq!(failing.calls(), 1);
        assert_eq!(after.calls(), 0);
    }

    #[tokio::test]
    async fn non_critical_failure_is_reported_to_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("TOOL_CALL: get_css".into()),
            Ok("I see the error.".into()),
        ]));
        let failing = MockTool::read("get_css").failing("no stylesheet");
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(failing));
        let agent = controller(provider, registry).with_critical_tools(["save_css"]);

        let outcome = agent.run(&mut state(10), "look").await;
        assert_eq!(outcome.state, LoopState::Completed);
        assert!(outcome.messages[3].content.contains("no stylesheet"));
    }

    #[tokio::test]
    async fn unknown_tools_are_reported_not_executed() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("TOOL_CALL: teleport".into()),
            Ok("fine".into()),
        ]));
        let agent = controller(provider, ToolRegistry::new()).with_critical_tools(["teleport"]);
        let outcome = agent.run(&mut state(10), "x").await;
        assert_eq!(outcome.state, LoopState::Completed);
        assert!(outcome.messages[3].content.contains("Tool not found: teleport"));
    }

    #[tokio::test]
    async fn max_iterations_is_distinct_from_failure() {
        let provider = Arc::new(ScriptedProvider::repeating("TOOL_CALL: get_css"));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(MockTool::read("get_css")));
        let agent = controller(provider.clone(), registry);

        let outcome = agent.run(&mut state(3), "loop forever").await;
        assert_eq!(outcome.state, LoopState::MaxIterations);
        assert!(!outcome.is_success());
        assert!(!outcome.is_failure());
        assert_eq!(outcome.iterations, 3);
        assert_eq!(provider.calls(), 3);
        assert!(outcome.response.contains("maximum of 3 iterations"));
    }

    #[tokio::test]
    async fn abort_before_run_stops_at_guard() {
        let provider = Arc::new(ScriptedProvider::text("never"));
        let agent = controller(provider.clone(), ToolRegistry::new());
        let mut st = state(10);
        st.abort();

        let outcome = agent.run(&mut st, "hi").await;
        assert_eq!(outcome.state, LoopState::Aborted);
        assert!(outcome.is_success());
        assert_eq!(outcome.response, STOPPED_BY_USER);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn abort_during_model_call_reports_stop() {
        let mut st = state(10);
        let provider = Arc::new(ScriptedProvider::text("Here you go.").aborting(st.abort_handle()));
        let agent = controller(provider.clone(), ToolRegistry::new());

        let outcome = agent.run(&mut st, "hi").await;
        assert_eq!(outcome.state, LoopState::Aborted);
        assert_eq!(outcome.response, format!("Here you go.\n\n{STOPPED_BY_USER}"));
        assert_eq!(provider.calls(), 1);
        // The reply is kept in the conversation
        assert_eq!(outcome.messages.last().unwrap().content, "Here you go.");
    }

    #[tokio::test]
    async fn abort_during_model_call_skips_requested_tools() {
        let mut st = state(10);
        let provider = Arc::new(ScriptedProvider::text("TOOL_CALL: get_css").aborting(st.abort_handle()));
        let tool = MockTool::read("get_css");
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(tool.clone()));
        let agent = controller(provider, registry);

        let outcome = agent.run(&mut st, "hi").await;
        assert_eq!(outcome.state, LoopState::Aborted);
        assert_eq!(tool.calls(), 0);
    }

    #[tokio::test]
    async fn abort_during_batch_stops_remaining_tools() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            "TOOL_CALL: first\nTOOL_CALL: second\nTOOL_CALL: third".into(),
        )]));
        let mut st = state(10);
        let first = MockTool::read("first").aborting(st.abort_handle());
        let second = MockTool::read("second");
        let third = MockTool::read("third");
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(first.clone()));
        registry.register(Box::new(second.clone()));
        registry.register(Box::new(third.clone()));
        let agent = controller(provider, registry);

        let outcome = agent.run(&mut st, "go").await;
        assert_eq!(outcome.state, LoopState::Aborted);
        assert!(outcome.response.contains(STOPPED_BY_USER));
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
        assert_eq!(third.calls(), 0);
        // The executed prefix is still recorded.
        assert!(outcome.messages.last().unwrap().content.contains("[1] first"));
    }

    #[tokio::test]
    async fn events_are_published_in_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("TOOL_CALL: get_css".into()),
            Ok("done".into()),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(MockTool::read("get_css")));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let agent = LoopController::new(provider, "mock-model", Arc::new(registry), bus);

        agent.run(&mut state(10), "hi").await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind());
        }
        assert_eq!(
            kinds,
            vec![
                "user_input",
                "assistant_reply",
                "tool_started",
                "tool_finished",
                "assistant_reply",
                "loop_completed",
            ]
        );
    }

    #[tokio::test]
    async fn trimming_is_reported_as_notice() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("TOOL_CALL: get_css".into()),
            Ok("done".into()),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(MockTool::read("get_css")));
        let agent = controller(provider, registry);
        let mut st = ConversationState::new("sys", SizePolicy::new(512, 300), 10);

        let outcome = agent.run(&mut st, &"long request ".repeat(10)).await;
        assert_eq!(outcome.state, LoopState::Completed);
        assert!(outcome.notices.iter().any(|n| n.starts_with("Removed")));
        assert!(outcome.messages[0].is_system());
    }

    #[test]
    fn results_message_format() {
        let results = vec![
            ToolExecutionResult::ok("get_css", json!({"code": "a{}"})),
            ToolExecutionResult::failure("save_css", "bad"),
        ];
        let text = format_results_message(Some("NOTICE: x"), &results);
        assert_eq!(
            text,
            "NOTICE: x\n\nTOOL_RESULTS:\n[1] get_css -> {\"data\":{\"code\":\"a{}\"},\"success\":true}\n[2] save_css -> {\"error\":\"bad\",\"success\":false}"
        );
    }
}
