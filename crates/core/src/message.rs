//! Transcript message types.
//!
//! A [`Transcript`] is the ordered, append-only conversation a single run
//! sends to the model: the seeded user message, assistant turns that request
//! tool calls, and the tool results answering them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::TranscriptError;
use crate::tool::ToolCallRequest;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Tool execution result
    Tool,
}

/// A single message in a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// User utterance (with any instruction framing already applied).
    User { content: String },

    /// Assistant turn. Carries the tool calls it requested, if any.
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },

    /// Result of one tool call, correlated by call id.
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Create a new text-only assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::Tool { .. } => Role::Tool,
        }
    }

    /// Text content, if the message has any.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::User { content } | Self::Tool { content, .. } => Some(content),
            Self::Assistant { content, .. } => content.as_deref(),
        }
    }
}

/// Append-only message sequence owned by one orchestration run.
///
/// Invariant: every `tool` message follows (possibly after other tool
/// messages) an assistant message that declared its call id, and each declared
/// call is answered at most once.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    messages: Vec<Message>,

    /// Call ids declared by the latest assistant turn and not yet answered.
    #[serde(skip)]
    open_calls: HashSet<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.open_calls.clear();
        self.messages.push(Message::user(content));
    }

    /// Record an assistant turn that requested tool calls.
    pub fn push_tool_calls(&mut self, content: Option<String>, tool_calls: Vec<ToolCallRequest>) {
        self.open_calls = tool_calls.iter().map(|c| c.id.clone()).collect();
        self.messages.push(Message::Assistant {
            content,
            tool_calls,
        });
    }

    pub fn push_assistant_text(&mut self, content: impl Into<String>) {
        self.open_calls.clear();
        self.messages.push(Message::assistant(content));
    }

    /// Append the result of a call declared by the latest assistant turn.
    pub fn push_tool_result(
        &mut self,
        tool_call_id: &str,
        content: impl Into<String>,
    ) -> Result<(), TranscriptError> {
        if !self.open_calls.remove(tool_call_id) {
            let declared = self.messages.iter().rev().any(|m| {
                matches!(m, Message::Tool { tool_call_id: id, .. } if id == tool_call_id)
            });
            return Err(if declared {
                TranscriptError::DuplicateToolResult(tool_call_id.to_string())
            } else {
                TranscriptError::UnmatchedToolResult(tool_call_id.to_string())
            });
        }
        self.messages
            .push(Message::tool_result(tool_call_id, content));
        Ok(())
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

    /// Calls of the latest assistant turn still waiting for a result.
    pub fn has_open_calls(&self) -> bool {
        !self.open_calls.is_empty()
    }
}
