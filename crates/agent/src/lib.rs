//! The tool-calling loop, the heart of stylesmith.
//!
//! The agent follows a **Send → Parse → Act → Fold** cycle:
//!
//! 1. **Receive** a user message and append it to bounded memory
//! 2. **Send** the conversation to the model via the configured provider
//! 3. **Parse** `TOOL_CALL:` / `PARAMETERS:` directives out of the reply text
//! 4. **If tool calls**: execute them, fold the results back as one message, loop to step 2
//! 5. **If plain text**: return it to the caller
//!
//! The loop also stops when the user aborts, when the iteration budget is
//! spent, or when a critical tool fails.

pub mod loop_runner;
pub mod memory;
pub mod parser;
pub mod state;
pub mod system_prompt;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use loop_runner::{LoopController, LoopOutcome, STOPPED_BY_USER};
pub use memory::{AppendReport, ConversationMemory, TRUNCATION_NOTICE, TrimReport, TruncationReport};
pub use parser::{extract_json_object, parse_tool_calls, strip_tool_artifacts};
pub use state::{AbortHandle, ConversationState, DEFAULT_MAX_ITERATIONS, LoopState};
pub use system_prompt::{DEFAULT_PREAMBLE, build_system_prompt};
