use serde::{Deserialize, Serialize};

/// Chat group identifier on the platform.
pub type GroupId = i64;
/// Platform user identifier.
pub type UserId = i64;
/// Identifier of a delivered message, as returned by the platform.
pub type MessageId = i64;

// ──────────────────── Message Segments ────────────────────

/// One typed piece of an outbound or inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageSegment {
    /// Plain text, passed through verbatim.
    Text { text: String },
    /// Mention of every group member.
    AtAll,
    /// Image referenced by URL (or any file locator the platform accepts).
    Image { url: String },
    /// Mention of a single user.
    Mention { user_id: UserId },
    /// Any other platform segment, kept as raw key/value data so that
    /// forwarded messages survive verbatim.
    Other {
        kind: String,
        #[serde(default)]
        data: Vec<(String, String)>,
    },
}

impl MessageSegment {
    /// Shorthand for a text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Shorthand for an image segment.
    pub fn image(url: impl Into<String>) -> Self {
        Self::Image { url: url.into() }
    }
}

/// Concatenate the text segments of a message, ignoring everything else.
pub fn plain_text(segments: &[MessageSegment]) -> String {
    segments
        .iter()
        .filter_map(|s| match s {
            MessageSegment::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

// ──────────────────── Inbound Events ────────────────────

/// The message an inbound event replies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMessage {
    /// Platform id of the replied-to message.
    pub message_id: MessageId,
    /// Content of the replied-to message.
    #[serde(default)]
    pub segments: Vec<MessageSegment>,
}

/// A group message delivered to the bot by a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Group the message was posted in.
    pub group_id: GroupId,
    /// Sender of the message.
    pub user_id: UserId,
    /// Display name of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Text content with non-text segments removed.
    pub plain_text: String,
    /// Message this event replies to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyMessage>,
    /// Platform message id of this event.
    #[serde(default)]
    pub message_id: MessageId,
    /// Event timestamp (unix seconds).
    #[serde(default)]
    pub timestamp: i64,
}

impl InboundEvent {
    /// Build a plain event with no reply, mostly useful in tests.
    pub fn new(group_id: GroupId, user_id: UserId, plain_text: impl Into<String>) -> Self {
        Self {
            group_id,
            user_id,
            sender_name: None,
            plain_text: plain_text.into(),
            reply: None,
            message_id: 0,
            timestamp: 0,
        }
    }

    /// Attach a reply target.
    pub fn with_reply(mut self, reply: ReplyMessage) -> Self {
        self.reply = Some(reply);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_serde() {
        let seg = MessageSegment::image("http://x/y.png");
        let json = serde_json::to_string(&seg).unwrap();
        assert!(json.contains("\"type\":\"image\""));
        let parsed: MessageSegment = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, seg);

        let json = serde_json::to_string(&MessageSegment::AtAll).unwrap();
        assert_eq!(json, r#"{"type":"at_all"}"#);
    }

    #[test]
    fn test_plain_text_skips_non_text() {
        let segments = vec![
            MessageSegment::text("hello "),
            MessageSegment::AtAll,
            MessageSegment::image("u"),
            MessageSegment::text("world"),
        ];
        assert_eq!(plain_text(&segments), "hello world");
    }

    #[test]
    fn test_inbound_event_without_reply_compat() {
        let json = r#"{"group_id":1,"user_id":2,"plain_text":"hi"}"#;
        let parsed: InboundEvent = serde_json::from_str(json).unwrap();
        assert!(parsed.reply.is_none());
        assert_eq!(parsed.message_id, 0);
    }

    #[test]
    fn test_with_reply() {
        let event = InboundEvent::new(1, 2, "x").with_reply(ReplyMessage {
            message_id: 42,
            segments: vec![MessageSegment::text("orig")],
        });
        assert_eq!(event.reply.unwrap().message_id, 42);
    }
}
