//! # stylesmith core
//!
//! Domain types, traits, and error definitions for the stylesmith agent.
//! This crate does **no I/O**: it defines the domain model
//! that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the agent loop is defined as a trait here. Concrete
//! implementations live in their own crates:
//! - the model transport (`Provider`) in `stylesmith-providers`
//! - the tools (`Tool`) in `stylesmith-tools`
//! - the settings (`SettingsProvider`) in `stylesmith-config`
//!
//! This keeps the loop testable with scripted transports and mock tools.

pub mod artifact;
pub mod error;
pub mod event;
pub mod limits;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use artifact::{ArtifactContext, ArtifactKind, ArtifactTarget};
pub use error::{Error, Result};
pub use event::{EventBus, LoopEvent};
pub use limits::{SettingsProvider, SizePolicy};
pub use message::{ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use tool::{
    ParamType, ParameterSchema, ParameterSpec, Tool, ToolCall, ToolDescriptor,
    ToolExecutionResult, ToolRegistry,
};
