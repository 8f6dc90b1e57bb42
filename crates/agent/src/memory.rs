//! Conversation memory: an append-only message log with two byte bounds.
//!
//! 1. **Per-message truncation**: a message longer than
//!    `max_message_bytes` is cut on a UTF-8 character boundary and a notice
//!    is appended so the model knows its context was shortened.
//! 2. **Whole-history trimming**: after every append, while the serialized
//!    list exceeds `max_history_bytes` and more than one non-system message
//!    remains, the oldest non-system message is evicted.
//!
//! System messages are never truncated by trimming nor counted as evictable.
//! After any append either the history fits, or exactly one non-system
//! message remains.

use serde::{Deserialize, Serialize};
use stylesmith_core::limits::SizePolicy;
use stylesmith_core::message::Message;
use tracing::debug;

/// Appended to a message that was cut to fit the per-message limit.
pub const TRUNCATION_NOTICE: &str =
    "\n\n[... message truncated: it exceeded the per-message size limit ...]";

/// What happened to a single oversized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationReport {
    pub original_bytes: usize,
    pub stored_bytes: usize,
}

/// What a trimming pass evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimReport {
    pub evicted: usize,
    pub before_bytes: usize,
    pub after_bytes: usize,
}

/// Combined effect of one append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendReport {
    pub truncated: Option<TruncationReport>,
    pub trimmed: Option<TrimReport>,
}

/// Cut `content` to at most `max_bytes` UTF-8 bytes, ending with the notice.
///
/// Returns `None` when the content already fits.
pub fn truncate_to_bytes(content: &str, max_bytes: usize) -> Option<String> {
    if content.len() <= max_bytes {
        return None;
    }

    if max_bytes < TRUNCATION_NOTICE.len() {
        // The notice is ASCII, so any byte index is a char boundary.
        return Some(TRUNCATION_NOTICE[..max_bytes].to_string());
    }

    let mut end = max_bytes - TRUNCATION_NOTICE.len();
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }

    let mut out = String::with_capacity(end + TRUNCATION_NOTICE.len());
    out.push_str(&content[..end]);
    out.push_str(TRUNCATION_NOTICE);
    Some(out)
}

/// Serialized size of one message (`{"role":..,"content":..}`).
pub fn message_wire_bytes(message: &Message) -> usize {
    serde_json::to_string(message)
        .map(|s| s.len())
        .unwrap_or_else(|_| message.content.len())
}

/// Serialized size of a JSON array with elements of the given sizes.
fn list_wire_bytes(sizes: impl Iterator<Item = usize>) -> usize {
    let (count, sum) = sizes.fold((0usize, 0usize), |(n, s), size| (n + 1, s + size));
    // brackets plus commas between elements
    2 + sum + count.saturating_sub(1)
}

/// The bounded message log of one conversation.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    messages: Vec<Message>,
    policy: SizePolicy,
}

impl ConversationMemory {
    pub fn new(policy: SizePolicy) -> Self {
        Self {
            messages: Vec::new(),
            policy,
        }
    }

    /// Create a memory whose first message is the given system prompt.
    pub fn with_system_prompt(system_prompt: impl Into<String>, policy: SizePolicy) -> Self {
        let mut memory = Self::new(policy);
        memory.set_system_prompt(system_prompt);
        memory
    }

    /// Install or replace the leading system prompt. Not subject to truncation.
    pub fn set_system_prompt(&mut self, system_prompt: impl Into<String>) {
        let prompt = Message::system(system_prompt);
        match self.messages.first_mut() {
            Some(first) if first.is_system() => *first = prompt,
            _ => self.messages.insert(0, prompt),
        }
    }

    pub fn policy(&self) -> SizePolicy {
        self.policy
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn non_system_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_system()).count()
    }

    /// Content of the most recent message, if any.
    pub fn last_content(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }

    /// Size of the whole log as a serialized JSON array.
    pub fn serialized_size(&self) -> usize {
        list_wire_bytes(self.messages.iter().map(message_wire_bytes))
    }

    /// Append a message, truncating it if needed, then trim the history.
    pub fn push(&mut self, mut message: Message) -> AppendReport {
        let mut report = AppendReport::default();

        let original_bytes = message.content.len();
        if let Some(cut) = truncate_to_bytes(&message.content, self.policy.max_message_bytes) {
            message.content = cut;
            let stored_bytes = message.content.len();
            debug!(original_bytes, stored_bytes, "Truncated oversized message");
            report.truncated = Some(TruncationReport {
                original_bytes,
                stored_bytes,
            });
        }

        self.messages.push(message);
        report.trimmed = self.trim();
        report
    }

    /// Evict the oldest non-system messages until the history fits.
    ///
    /// Returns `None` when nothing was evicted.
    pub fn trim(&mut self) -> Option<TrimReport> {
        let mut sizes: Vec<usize> = self.messages.iter().map(message_wire_bytes).collect();
        let before_bytes = list_wire_bytes(sizes.iter().copied());
        if before_bytes <= self.policy.max_history_bytes {
            return None;
        }

        let mut size = before_bytes;
        let mut evicted = 0;
        while size > self.policy.max_history_bytes && self.non_system_count() > 1 {
            let Some(idx) = self.messages.iter().position(|m| !m.is_system()) else {
                break;
            };
            self.messages.remove(idx);
            sizes.remove(idx);
            size = list_wire_bytes(sizes.iter().copied());
            evicted += 1;
        }

        if evicted == 0 {
            return None;
        }

        debug!(evicted, before_bytes, after_bytes = size, "Trimmed conversation history");
        Some(TrimReport {
            evicted,
            before_bytes,
            after_bytes: size,
        })
    }

    /// Drop everything except system messages.
    pub fn reset(&mut self) {
        self.messages.retain(|m| m.is_system());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stylesmith_core::message::Role;

    fn policy(message: usize, history: usize) -> SizePolicy {
        SizePolicy::new(message, history)
    }

    #[test]
    fn short_content_is_untouched() {
        assert!(truncate_to_bytes("hello", 200).is_none());
    }

    #[test]
    fn truncation_respects_limit_and_ends_with_notice() {
        let content = "x".repeat(1_000);
        let cut = truncate_to_bytes(&content, 200).unwrap();
        assert!(cut.len() <= 200);
        assert!(cut.ends_with(TRUNCATION_NOTICE));
    }

    #[test]
    fn truncation_never_splits_multibyte_chars() {
        // Each "é" is two bytes, "😀" four; no cut may land inside one.
        let content = "é😀".repeat(200);
        for max in 130..160 {
            let cut = truncate_to_bytes(&content, max).unwrap();
            assert!(cut.len() <= max);
            assert!(cut.ends_with(TRUNCATION_NOTICE));
            let kept = &cut[..cut.len() - TRUNCATION_NOTICE.len()];
            assert!(content.starts_with(kept));
        }
    }

    #[test]
    fn tiny_limit_keeps_notice_prefix() {
        let cut = truncate_to_bytes(&"y".repeat(50), 10).unwrap();
        assert_eq!(cut.len(), 10);
    }

    #[test]
    fn serialized_size_matches_serde() {
        let mut memory = ConversationMemory::with_system_prompt("sys", policy(1_000, 100_000));
        memory.push(Message::user("hello \"quoted\" ✓"));
        memory.push(Message::assistant("line\nbreak"));
        let expected = serde_json::to_vec(memory.messages()).unwrap().len();
        assert_eq!(memory.serialized_size(), expected);
        assert_eq!(ConversationMemory::new(SizePolicy::default()).serialized_size(), 2);
    }

    #[test]
    fn push_truncates_oversized_message() {
        let mut memory = ConversationMemory::with_system_prompt("sys", policy(256, 100_000));
        let report = memory.push(Message::user("z".repeat(10_000)));
        let truncated = report.truncated.unwrap();
        assert_eq!(truncated.original_bytes, 10_000);
        assert!(truncated.stored_bytes <= 256);
        let stored = memory.last_content().unwrap();
        assert!(stored.len() <= 256);
        assert!(stored.ends_with(TRUNCATION_NOTICE));
    }

    #[test]
    fn trimming_evicts_oldest_non_system_first() {
        let mut memory = ConversationMemory::with_system_prompt("system rules", policy(1_000, 200));
        memory.push(Message::user("first message ".repeat(4)));
        memory.push(Message::assistant("second message ".repeat(4)));
        let report = memory.push(Message::user("third message ".repeat(4)));

        let trimmed = report.trimmed.unwrap();
        assert!(trimmed.evicted >= 1);
        assert!(trimmed.before_bytes > trimmed.after_bytes);
        assert_eq!(memory.messages()[0].role, Role::System);
        assert!(memory.last_content().unwrap().starts_with("third"));
        assert!(!memory.messages().iter().any(|m| m.content.starts_with("first")));
    }

    #[test]
    fn history_bound_holds_or_one_message_remains() {
        let mut memory = ConversationMemory::with_system_prompt("sys", policy(400, 600));
        for i in 0..50 {
            memory.push(Message::user(format!("message {i} ").repeat(i % 7 + 1)));
            assert!(
                memory.serialized_size() <= 600 || memory.non_system_count() == 1,
                "bound violated at step {i}"
            );
            assert!(memory.messages()[0].is_system());
        }
    }

    #[test]
    fn single_oversized_message_is_kept() {
        let mut memory = ConversationMemory::with_system_prompt("sys", policy(500, 100));
        let report = memory.push(Message::user("q".repeat(400)));
        assert!(report.trimmed.is_none());
        assert_eq!(memory.non_system_count(), 1);
        assert!(memory.serialized_size() > 100);
    }

    #[test]
    fn reset_keeps_system_prompt() {
        let mut memory = ConversationMemory::with_system_prompt("sys", SizePolicy::default());
        memory.push(Message::user("a"));
        memory.push(Message::assistant("b"));
        memory.reset();
        assert_eq!(memory.len(), 1);
        assert!(memory.messages()[0].is_system());
    }

    #[test]
    fn set_system_prompt_replaces_existing() {
        let mut memory = ConversationMemory::with_system_prompt("old", SizePolicy::default());
        memory.push(Message::user("a"));
        memory.set_system_prompt("new");
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.messages()[0].content, "new");
    }
}
