//! Conversation size limits.
//!
//! Settings are expressed in model tokens; the loop enforces them in UTF-8
//! bytes using a fixed multiplier.

use serde::{Deserialize, Serialize};

/// Bytes per model token used to turn token settings into byte budgets.
pub const BYTES_PER_TOKEN: usize = 4;

/// Default per-message limit, in tokens.
pub const DEFAULT_MAX_MESSAGE_TOKENS: u64 = 8_000;

/// Default whole-conversation limit, in tokens.
pub const DEFAULT_MAX_CONVERSATION_TOKENS: u64 = 100_000;

/// Smallest per-message byte budget; leaves room for the truncation notice.
pub const MIN_MESSAGE_BYTES: usize = 128;

/// External source of size settings, read once at session start.
pub trait SettingsProvider {
    /// Per-message limit in tokens, `None` when unset.
    fn max_individual_message_size(&self) -> Option<u64>;

    /// Whole-conversation limit in tokens, `None` when unset.
    fn max_conversation_size(&self) -> Option<u64>;
}

/// The two independent byte limits applied to conversation memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizePolicy {
    /// Applied to each message as it is appended
    pub max_message_bytes: usize,

    /// Applied to the serialized message list after every append
    pub max_history_bytes: usize,
}

impl SizePolicy {
    /// Build from byte limits. The message limit is raised to `MIN_MESSAGE_BYTES`.
    pub fn new(max_message_bytes: usize, max_history_bytes: usize) -> Self {
        Self {
            max_message_bytes: max_message_bytes.max(MIN_MESSAGE_BYTES),
            max_history_bytes,
        }
    }

    /// Build from token limits.
    pub fn from_tokens(max_message_tokens: u64, max_conversation_tokens: u64) -> Self {
        Self::new(
            tokens_to_bytes(max_message_tokens),
            tokens_to_bytes(max_conversation_tokens),
        )
    }

    /// Build from a settings collaborator; unset or zero values use defaults.
    pub fn from_settings(settings: &dyn SettingsProvider) -> Self {
        let message = settings
            .max_individual_message_size()
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_MESSAGE_TOKENS);
        let conversation = settings
            .max_conversation_size()
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_CONVERSATION_TOKENS);
        Self::from_tokens(message, conversation)
    }
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self::from_tokens(DEFAULT_MAX_MESSAGE_TOKENS, DEFAULT_MAX_CONVERSATION_TOKENS)
    }
}

fn tokens_to_bytes(tokens: u64) -> usize {
    usize::try_from(tokens)
        .unwrap_or(usize::MAX)
        .saturating_mul(BYTES_PER_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<u64>, Option<u64>);

    impl SettingsProvider for Fixed {
        fn max_individual_message_size(&self) -> Option<u64> {
            self.0
        }
        fn max_conversation_size(&self) -> Option<u64> {
            self.1
        }
    }

    #[test]
    fn tokens_convert_to_bytes() {
        let policy = SizePolicy::from_tokens(1_000, 10_000);
        assert_eq!(policy.max_message_bytes, 4_000);
        assert_eq!(policy.max_history_bytes, 40_000);
    }

    #[test]
    fn missing_settings_use_defaults() {
        let policy = SizePolicy::from_settings(&Fixed(None, Some(0)));
        assert_eq!(policy, SizePolicy::default());
    }

    #[test]
    fn settings_are_honored() {
        let policy = SizePolicy::from_settings(&Fixed(Some(100), Some(500)));
        assert_eq!(policy.max_message_bytes, 400);
        assert_eq!(policy.max_history_bytes, 2_000);
    }

    #[test]
    fn message_limit_has_a_floor() {
        let policy = SizePolicy::new(10, 1_000);
        assert_eq!(policy.max_message_bytes, MIN_MESSAGE_BYTES);
        assert_eq!(policy.max_history_bytes, 1_000);
    }
}
