//! Conversation events streamed to the client.
//!
//! Events follow the AG-UI protocol: a `type` tag in SCREAMING_SNAKE_CASE
//! and camelCase fields. Every event of a run carries identifiers taken from
//! one [`RunIds`], so a consumer can correlate deltas.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Role;

/// All events a run can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ConversationEvent {
    /// The run has begun.
    RunStarted { thread_id: String, run_id: String },

    /// The single assistant message of the run opens.
    TextMessageStart { message_id: String, role: Role },

    /// A piece of the final answer.
    TextMessageContent { message_id: String, delta: String },

    /// The assistant message is complete.
    TextMessageEnd { message_id: String },

    /// The model asked for a tool call.
    ToolCallStart {
        tool_call_id: String,
        tool_call_name: String,
        parent_message_id: String,
    },

    /// Arguments of a tool call.
    ToolCallArgs { tool_call_id: String, delta: String },

    /// Result (or failure description) of a tool call.
    ToolCallResult {
        message_id: String,
        tool_call_id: String,
        content: String,
        role: Role,
    },

    /// The run completed with a final answer.
    RunFinished { thread_id: String, run_id: String },

    /// The run failed. Nothing follows this event.
    RunError { message: String, code: String },
}

impl ConversationEvent {
    /// Wire name of this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "RUN_STARTED",
            Self::TextMessageStart { .. } => "TEXT_MESSAGE_START",
            Self::TextMessageContent { .. } => "TEXT_MESSAGE_CONTENT",
            Self::TextMessageEnd { .. } => "TEXT_MESSAGE_END",
            Self::ToolCallStart { .. } => "TOOL_CALL_START",
            Self::ToolCallArgs { .. } => "TOOL_CALL_ARGS",
            Self::ToolCallResult { .. } => "TOOL_CALL_RESULT",
            Self::RunFinished { .. } => "RUN_FINISHED",
            Self::RunError { .. } => "RUN_ERROR",
        }
    }

    /// Whether no further events may follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunFinished { .. } | Self::RunError { .. })
    }
}

/// Identifiers shared by every event of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIds {
    pub thread_id: String,
    pub run_id: String,
    /// The one logical assistant message spanning all tool rounds.
    pub message_id: String,
}

impl RunIds {
    /// Fresh run and message ids on the given thread.
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: format!("run_{}", Uuid::new_v4().simple()),
            message_id: format!("msg_{}", Uuid::new_v4().simple()),
        }
    }

    /// Fresh ids on a fresh thread.
    pub fn generate() -> Self {
        Self::new(format!("thread_{}", Uuid::new_v4().simple()))
    }

    pub fn run_started(&self) -> ConversationEvent {
        ConversationEvent::RunStarted {
            thread_id: self.thread_id.clone(),
            run_id: self.run_id.clone(),
        }
    }

    pub fn message_start(&self) -> ConversationEvent {
        ConversationEvent::TextMessageStart {
            message_id: self.message_id.clone(),
            role: Role::Assistant,
        }
    }

    pub fn content(&self, delta: impl Into<String>) -> ConversationEvent {
        ConversationEvent::TextMessageContent {
            message_id: self.message_id.clone(),
            delta: delta.into(),
        }
    }

    pub fn message_end(&self) -> ConversationEvent {
        ConversationEvent::TextMessageEnd {
            message_id: self.message_id.clone(),
        }
    }

    pub fn tool_call_start(
        &self,
        tool_call_id: impl Into<String>,
        tool_call_name: impl Into<String>,
    ) -> ConversationEvent {
        ConversationEvent::ToolCallStart {
            tool_call_id: tool_call_id.into(),
            tool_call_name: tool_call_name.into(),
            parent_message_id: self.message_id.clone(),
        }
    }

    pub fn tool_call_args(
        &self,
        tool_call_id: impl Into<String>,
        delta: impl Into<String>,
    ) -> ConversationEvent {
        ConversationEvent::ToolCallArgs {
            tool_call_id: tool_call_id.into(),
            delta: delta.into(),
        }
    }

    pub fn tool_call_result(
        &self,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> ConversationEvent {
        ConversationEvent::ToolCallResult {
            message_id: self.message_id.clone(),
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            role: Role::Tool,
        }
    }

    pub fn run_finished(&self) -> ConversationEvent {
        ConversationEvent::RunFinished {
            thread_id: self.thread_id.clone(),
            run_id: self.run_id.clone(),
        }
    }

    /// Run-error events carry no ids, only the failure.
    pub fn run_error(message: impl Into<String>, code: impl Into<String>) -> ConversationEvent {
        ConversationEvent::RunError {
            message: message.into(),
            code: code.into(),
        }
    }
}
