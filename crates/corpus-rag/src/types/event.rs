//! Output units of the streaming query pipeline

use serde::{Deserialize, Serialize};

/// One event pushed to a query consumer.
///
/// Every stream ends with exactly one `End` or one `Error`, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// A clean piece of answer text
    Content { text: String },
    /// Normal end of the answer
    End,
    /// Terminal failure with a description
    Error { text: String },
}

impl StreamEvent {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error { text: text.into() }
    }

    /// Whether no event may follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(StreamEvent::content("The cat")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "content", "text": "The cat"}));

        let json = serde_json::to_value(StreamEvent::End).unwrap();
        assert_eq!(json, serde_json::json!({"type": "end"}));

        let json = serde_json::to_value(StreamEvent::error("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "error", "text": "boom"}));
    }
}
