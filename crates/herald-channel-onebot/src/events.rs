//! Event webhook: receives OneBot HTTP POST reports and forwards group
//! messages addressed to the bot as `InboundEvent`s.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use herald_command::grammar;
use herald_types::{InboundEvent, MessageId, MessageSegment, ReplyMessage, UserId, plain_text};

use crate::api::OneBotApi;
use crate::types::Event;

/// Shared state of the webhook handler.
pub struct EventState {
    pub api: Arc<OneBotApi>,
    pub self_id: UserId,
    pub require_mention: bool,
    pub sender: mpsc::Sender<InboundEvent>,
}

/// A group message split into the parts herald cares about.
#[derive(Debug)]
pub struct GroupMessage {
    pub event: InboundEvent,
    pub reply_to: Option<MessageId>,
    pub mentions_self: bool,
}

/// Extract a group message from a reported event. Returns `None` for every
/// other event kind.
pub fn group_message(event: Event, self_id: UserId) -> Option<GroupMessage> {
    if !event.is_group_message() {
        return None;
    }
    let group_id = event.group_id?;
    let user_id = event.user_id.unwrap_or(event.sender.user_id);

    let mut reply_to = None;
    let mut segments = Vec::new();
    for wire in event.message.into_wire() {
        if wire.kind == "reply" {
            reply_to = wire.get("id").and_then(|id| id.parse().ok());
            continue;
        }
        segments.push(MessageSegment::from(wire));
    }

    let mentions_self = segments
        .iter()
        .any(|s| matches!(s, MessageSegment::Mention { user_id } if *user_id == self_id));

    let mut inbound = InboundEvent::new(group_id, user_id, plain_text(&segments));
    inbound.sender_name = event.sender.display_name();
    inbound.message_id = event.message_id.unwrap_or_default();
    inbound.timestamp = event.time;

    Some(GroupMessage {
        event: inbound,
        reply_to,
        mentions_self,
    })
}

/// POST handler for event reports. Always answers 204 so the implementation
/// performs no quick operation.
pub async fn handle_event(
    State(state): State<Arc<EventState>>,
    Json(event): Json<Event>,
) -> StatusCode {
    let self_id = if event.self_id != 0 {
        event.self_id
    } else {
        state.self_id
    };
    let Some(message) = group_message(event, self_id) else {
        return StatusCode::NO_CONTENT;
    };
    let GroupMessage {
        mut event,
        reply_to,
        mentions_self,
    } = message;
    if !grammar::is_command(&event.plain_text) {
        return StatusCode::NO_CONTENT;
    }

    let mut replies_to_self = false;
    if let Some(message_id) = reply_to {
        match state.api.get_msg(message_id).await {
            Ok(replied) => {
                replies_to_self = replied.sender.user_id == self_id;
                event.reply = Some(ReplyMessage {
                    message_id,
                    segments: replied
                        .message
                        .into_wire()
                        .into_iter()
                        .map(MessageSegment::from)
                        .collect(),
                });
            }
            Err(e) => warn!(message_id, "Failed to resolve replied message: {e:#}"),
        }
    }

    if state.require_mention && !mentions_self && !replies_to_self {
        debug!(group_id = event.group_id, "Ignoring message not addressed to the bot");
        return StatusCode::NO_CONTENT;
    }

    debug!(
        group_id = event.group_id,
        user_id = event.user_id,
        message_id = event.message_id,
        "Forwarding OneBot group message"
    );
    if state.sender.send(event).await.is_err() {
        warn!("Inbound channel closed, dropping event");
    }
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_config::OneBotConfig;

    fn event(message: serde_json::Value) -> Event {
        serde_json::from_value(serde_json::json!({
            "time": 1700000000,
            "self_id": 10001,
            "post_type": "message",
            "message_type": "group",
            "message_id": 77,
            "group_id": 100,
            "user_id": 7,
            "message": message,
            "sender": {"user_id": 7, "nickname": "nick", "card": "Card"}
        }))
        .unwrap()
    }

    fn state(require_mention: bool) -> (Arc<EventState>, mpsc::Receiver<InboundEvent>) {
        let config = OneBotConfig {
            api_url: "http://127.0.0.1:9".into(),
            timeout_secs: 1,
            ..Default::default()
        };
        let (sender, rx) = mpsc::channel(4);
        let state = Arc::new(EventState {
            api: Arc::new(OneBotApi::new(&config).unwrap()),
            self_id: 10001,
            require_mention,
            sender,
        });
        (state, rx)
    }

    #[test]
    fn test_group_message_extracts_text_and_mention() {
        let msg = group_message(
            event(serde_json::json!([
                {"type": "at", "data": {"qq": "10001"}},
                {"type": "text", "data": {"text": " [schedulemessage][][][]"}},
            ])),
            10001,
        )
        .unwrap();
        assert!(msg.mentions_self);
        assert_eq!(msg.reply_to, None);
        assert_eq!(msg.event.plain_text, " [schedulemessage][][][]");
        assert_eq!(msg.event.group_id, 100);
        assert_eq!(msg.event.user_id, 7);
        assert_eq!(msg.event.message_id, 77);
        assert_eq!(msg.event.sender_name.as_deref(), Some("Card"));
    }

    #[test]
    fn test_group_message_reply_id() {
        let msg = group_message(
            event(serde_json::json!([
                {"type": "reply", "data": {"id": "555"}},
                {"type": "at", "data": {"qq": "42"}},
                {"type": "text", "data": {"text": "[recallmessage][][][]"}},
            ])),
            10001,
        )
        .unwrap();
        assert_eq!(msg.reply_to, Some(555));
        assert!(!msg.mentions_self);
        assert_eq!(msg.event.plain_text, "[recallmessage][][][]");
    }

    #[test]
    fn test_non_group_events_ignored() {
        let private: Event = serde_json::from_value(serde_json::json!({
            "post_type": "message",
            "message_type": "private",
            "user_id": 7,
            "message": "hi"
        }))
        .unwrap();
        assert!(group_message(private, 1).is_none());
    }

    #[tokio::test]
    async fn test_handler_forwards_mentioning_message() {
        let (state, mut rx) = state(true);
        let status = handle_event(
            State(state),
            Json(event(serde_json::json!([
                {"type": "at", "data": {"qq": "10001"}},
                {"type": "text", "data": {"text": "message"}},
            ]))),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let forwarded = rx.try_recv().unwrap();
        assert_eq!(forwarded.plain_text, "message");
    }

    #[tokio::test]
    async fn test_handler_drops_unaddressed_message() {
        let (state, mut rx) = state(true);
        handle_event(
            State(state),
            Json(event(serde_json::json!([{"type": "text", "data": {"text": "message"}}]))),
        )
        .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handler_without_mention_requirement() {
        let (state, mut rx) = state(false);
        handle_event(
            State(state),
            Json(event(serde_json::json!("[schedulemessage][][][] [CQ:face,id=1]"))),
        )
        .await;
        assert_eq!(rx.try_recv().unwrap().plain_text, "[schedulemessage][][][] ");
    }

    #[tokio::test]
    async fn test_handler_drops_plain_chat() {
        let (state, mut rx) = state(false);
        handle_event(
            State(state),
            Json(event(serde_json::json!([{"type": "text", "data": {"text": "thanks bot"}}]))),
        )
        .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unresolvable_reply_still_forwarded_when_not_required() {
        let (state, mut rx) = state(false);
        handle_event(
            State(state),
            Json(event(serde_json::json!([
                {"type": "reply", "data": {"id": "1"}},
                {"type": "text", "data": {"text": "[forwardmessage][][][200]"}},
            ]))),
        )
        .await;
        let forwarded = rx.try_recv().unwrap();
        assert!(forwarded.reply.is_none());
    }
}
