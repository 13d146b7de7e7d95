//! Common types for chat backend interactions

use crate::history::Turn;
use serde::Serialize;
use serde_json::Value;

/// Chat completion request, serialized as the `/api/chat` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Turn>,
    pub temperature: f32,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Turn>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature,
            stream: false,
        }
    }
}

/// Chat completion reply
///
/// `content` is `None` when the response had no recognisable message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatReply {
    pub content: Option<String>,
}

impl ChatReply {
    #[cfg(test)]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }

    /// Tolerant parse of a chat response body
    pub fn from_value(value: &Value) -> Self {
        Self {
            content: message_content(value),
        }
    }
}

/// Extract `message.content` from either a single response object or an
/// array whose first element carries the message.
pub fn message_content(value: &Value) -> Option<String> {
    let content_of = |v: &Value| {
        v.get("message")?
            .get("content")?
            .as_str()
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    };

    content_of(value).or_else(|| value.get(0).and_then(content_of))
}
