//! Wire encoding for conversation events.
//!
//! One event becomes one server-sent-events frame: `data: <json>\n\n`.

use toolrelay_core::ConversationEvent;

/// Media type of an encoded event stream.
pub const EVENT_STREAM_MEDIA_TYPE: &str = "text/event-stream";

/// Serializes [`ConversationEvent`]s into SSE frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventEncoder;

impl EventEncoder {
    pub fn new() -> Self {
        Self
    }

    /// The JSON carried in an event's `data:` line. Never contains a raw newline.
    pub fn payload(&self, event: &ConversationEvent) -> Result<String, serde_json::Error> {
        serde_json::to_string(event)
    }

    /// Encode a single event. Pure: the same event always yields the same frame.
    pub fn encode(&self, event: &ConversationEvent) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", self.payload(event)?))
    }

    pub fn media_type(&self) -> &'static str {
        EVENT_STREAM_MEDIA_TYPE
    }
}
