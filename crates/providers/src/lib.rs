//! Completion provider implementations for ToolRelay.
//!
//! All providers implement the `toolrelay_core::Provider` trait.
//! [`build_from_config`] selects and wraps the configured backend.

pub mod openai_compat;
pub mod retry;
pub mod router;

pub use openai_compat::{Dialect, OpenAiCompatProvider};
pub use retry::RetryProvider;
pub use router::build_from_config;
