//! # ToolRelay Core
//!
//! Domain types, traits, and error definitions for the ToolRelay bridge.
//! This crate has **zero framework dependencies**; it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The two outbound collaborators of a run (the completion provider and the
//! tool server) are traits here. Implementations live in their respective
//! crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{
    Error, ProviderError, Result, RunError, ToolInvocationError, ToolServerError, TranscriptError,
};
pub use event::{ConversationEvent, RunIds};
pub use message::{Message, Role, Transcript};
pub use provider::{Completion, Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{ToolCallRequest, ToolCallResult, ToolDescriptor, ToolServer, ToolSession};
