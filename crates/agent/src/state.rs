//! Per-conversation loop state: memory, iteration bookkeeping, abort flag.
//!
//! Each conversation owns one `ConversationState`; nothing in it is shared
//! across conversations except the abort flag, which is handed out to
//! whoever may need to stop the run (a Ctrl-C handler, a UI button).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use stylesmith_core::limits::SizePolicy;
use stylesmith_core::message::{ConversationId, Message};

use crate::memory::ConversationMemory;

/// Default iteration budget per run.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Lifecycle of a loop run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Running,
    Completed,
    Failed,
    MaxIterations,
    Aborted,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::MaxIterations => "max_iterations",
            Self::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloneable handle that stops a running loop.
///
/// The flag is checked at the top of each iteration and before each tool
/// execution, so a stop takes effect within one in-flight call.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Messages plus loop bookkeeping for one conversation.
#[derive(Debug)]
pub struct ConversationState {
    id: ConversationId,
    pub(crate) memory: ConversationMemory,
    pub(crate) iteration_count: u32,
    max_iterations: u32,
    abort: AbortHandle,
    pub(crate) status: LoopState,
}

impl ConversationState {
    pub fn new(system_prompt: impl Into<String>, policy: SizePolicy, max_iterations: u32) -> Self {
        Self {
            id: ConversationId::new(),
            memory: ConversationMemory::with_system_prompt(system_prompt, policy),
            iteration_count: 0,
            max_iterations,
            abort: AbortHandle::new(),
            status: LoopState::Idle,
        }
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn messages(&self) -> &[Message] {
        self.memory.messages()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn status(&self) -> LoopState {
        self.status
    }

    /// A handle that can stop the loop from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Clear a previous abort before running another turn with the same context.
    pub fn resume(&mut self) {
        self.abort.clear();
        self.status = LoopState::Idle;
    }

    /// Start a brand-new conversation, keeping only the system prompt.
    pub fn reset(&mut self) {
        self.id = ConversationId::new();
        self.memory.reset();
        self.iteration_count = 0;
        self.abort.clear();
        self.status = LoopState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ConversationState {
        ConversationState::new("sys", SizePolicy::default(), DEFAULT_MAX_ITERATIONS)
    }

    #[test]
    fn new_state_is_idle_with_system_prompt() {
        let state = state();
        assert_eq!(state.status(), LoopState::Idle);
        assert_eq!(state.iteration_count(), 0);
        assert_eq!(state.messages().len(), 1);
        assert!(state.messages()[0].is_system());
    }

    #[test]
    fn abort_handle_shares_flag() {
        let state = state();
        let handle = state.abort_handle();
        assert!(!state.is_aborted());
        handle.abort();
        assert!(state.is_aborted());
    }

    #[test]
    fn resume_clears_abort() {
        let mut state = state();
        state.abort();
        state.resume();
        assert!(!state.is_aborted());
    }

    #[test]
    fn reset_starts_a_new_conversation() {
        let mut state = state();
        let old_id = state.id().clone();
        state.memory.push(Message::user("hi"));
        state.iteration_count = 3;
        state.abort();
        state.reset();
        assert_ne!(state.id(), &old_id);
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.iteration_count(), 0);
        assert!(!state.is_aborted());
    }

    #[test]
    fn terminal_states() {
        assert!(!LoopState::Running.is_terminal());
        assert!(LoopState::Aborted.is_terminal());
        assert_eq!(LoopState::MaxIterations.to_string(), "max_iterations");
    }
}
