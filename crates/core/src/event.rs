//! Loop events: structured progress notifications for observers.
//!
//! The loop controller publishes an event at every step a presentation
//! layer may want to render. Observers subscribe to the bus and filter for
//! what they care about; publishing with no subscribers is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All events emitted by a loop run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// User text entered the conversation
    UserInput {
        content: String,
        timestamp: DateTime<Utc>,
    },

    /// The model replied
    AssistantReply {
        iteration: u32,
        content: String,
        tool_calls: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool is about to execute
    ToolStarted {
        iteration: u32,
        tool_name: String,
        parameters: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    /// A tool finished (successfully or not)
    ToolFinished {
        iteration: u32,
        tool_name: String,
        success: bool,
        error: Option<String>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Write calls were withheld because the same turn also requested reads
    WritesWithheld {
        iteration: u32,
        withheld: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A single message was cut to fit the per-message limit
    MessageTruncated {
        original_bytes: usize,
        stored_bytes: usize,
        timestamp: DateTime<Utc>,
    },

    /// Oldest messages were evicted to fit the history limit
    HistoryTrimmed {
        evicted: usize,
        before_bytes: usize,
        after_bytes: usize,
        timestamp: DateTime<Utc>,
    },

    /// The model answered without tool calls
    LoopCompleted {
        iterations: u32,
        timestamp: DateTime<Utc>,
    },

    /// The run failed (transport or critical tool)
    LoopFailed {
        iterations: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The run was stopped by the user
    LoopAborted {
        iterations: u32,
        timestamp: DateTime<Utc>,
    },

    /// The iteration budget ran out
    MaxIterationsReached {
        iterations: u32,
        timestamp: DateTime<Utc>,
    },
}

impl LoopEvent {
    /// Stable event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserInput { .. } => "user_input",
            Self::AssistantReply { .. } => "assistant_reply",
            Self::ToolStarted { .. } => "tool_started",
            Self::ToolFinished { .. } => "tool_finished",
            Self::WritesWithheld { .. } => "writes_withheld",
            Self::MessageTruncated { .. } => "message_truncated",
            Self::HistoryTrimmed { .. } => "history_trimmed",
            Self::LoopCompleted { .. } => "loop_completed",
            Self::LoopFailed { .. } => "loop_failed",
            Self::LoopAborted { .. } => "loop_aborted",
            Self::MaxIterationsReached { .. } => "max_iterations_reached",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::UserInput { timestamp, .. }
            | Self::AssistantReply { timestamp, .. }
            | Self::ToolStarted { timestamp, .. }
            | Self::ToolFinished { timestamp, .. }
            | Self::WritesWithheld { timestamp, .. }
            | Self::MessageTruncated { timestamp, .. }
            | Self::HistoryTrimmed { timestamp, .. }
            | Self::LoopCompleted { timestamp, .. }
            | Self::LoopFailed { timestamp, .. }
            | Self::LoopAborted { timestamp, .. }
            | Self::MaxIterationsReached { timestamp, .. } => *timestamp,
        }
    }

    /// Whether this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::LoopCompleted { .. }
                | Self::LoopFailed { .. }
                | Self::LoopAborted { .. }
                | Self::MaxIterationsReached { .. }
        )
    }
}

/// A broadcast-based event bus for loop events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Each
/// conversation may own its own bus or share one; events carry no
/// conversation-mutable state.
pub struct EventBus {
    sender: broadcast::Sender<Arc<LoopEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: LoopEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LoopEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
