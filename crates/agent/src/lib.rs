//! The tool-calling orchestration loop, the heart of ToolRelay.
//!
//! One run follows a **Discover → Complete → Act** cycle:
//!
//! 1. **Discover** the tool server's tools (fatal if unreachable)
//! 2. **Seed** the transcript with the user's request wrapped in the
//!    instruction template
//! 3. **Complete**: send transcript + tool schemas to the model
//! 4. **If tool calls**: run them in order, append results, loop back to step 3
//! 5. **If text**: stream it as the answer and finish
//!
//! Every step is reported as a [`ConversationEvent`](toolrelay_core::ConversationEvent)
//! through an [`EventSink`]; [`EventEncoder`] turns events into wire frames.

pub mod encoder;
pub mod instruction;
pub mod loop_runner;
pub mod registry;
pub mod sink;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use encoder::EventEncoder;
pub use instruction::render_instruction;
pub use loop_runner::{AgentLoop, RunOutcome};
pub use registry::ToolRegistryAdapter;
pub use sink::{EventSink, SinkClosed};
