//! OneBot v11 wire types (the subset herald uses).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use herald_command::cq;
use herald_types::{GroupId, MessageId, MessageSegment, UserId};

/// Generic OneBot action response.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(default)]
    pub retcode: i64,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub wording: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn is_ok(&self) -> bool {
        self.retcode == 0 && matches!(self.status.as_str(), "ok" | "async")
    }

    /// Best available error description.
    pub fn error_text(&self) -> String {
        self.wording
            .clone()
            .filter(|w| !w.is_empty())
            .or_else(|| self.message.clone().filter(|m| !m.is_empty()))
            .unwrap_or_else(|| format!("retcode {}", self.retcode))
    }
}

/// One element of OneBot's array message format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSegment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl WireSegment {
    fn new(kind: &str, data: &[(&str, &str)]) -> Self {
        Self {
            kind: kind.to_string(),
            data: data
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
        }
    }

    /// Data value as a string; implementations disagree on number vs string.
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.get(key).map(value_to_string)
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<&MessageSegment> for WireSegment {
    fn from(segment: &MessageSegment) -> Self {
        match segment {
            MessageSegment::Text { text } => Self::new("text", &[("text", text.as_str())]),
            MessageSegment::AtAll => Self::new("at", &[("qq", "all")]),
            MessageSegment::Image { url } => Self::new("image", &[("file", url.as_str())]),
            MessageSegment::Mention { user_id } => {
                let qq = user_id.to_string();
                Self::new("at", &[("qq", qq.as_str())])
            }
            MessageSegment::Other { kind, data } => Self {
                kind: kind.clone(),
                data: data
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            },
        }
    }
}

impl From<WireSegment> for MessageSegment {
    fn from(wire: WireSegment) -> Self {
        let data = wire
            .data
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect();
        cq::segment_from_parts(&wire.kind, data)
    }
}

/// Convert outbound segments to the array format.
pub fn to_wire(segments: &[MessageSegment]) -> Vec<WireSegment> {
    segments.iter().map(WireSegment::from).collect()
}

/// A message body as reported by the implementation: either the array
/// format or a CQ-code string, depending on its `message_format` setting.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Array(Vec<WireSegment>),
    Cq(String),
}

impl Default for MessageBody {
    fn default() -> Self {
        Self::Array(Vec::new())
    }
}

impl MessageBody {
    /// Normalize to the array format.
    pub fn into_wire(self) -> Vec<WireSegment> {
        match self {
            Self::Array(segments) => segments,
            Self::Cq(raw) => cq::decode(&raw).iter().map(WireSegment::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SendGroupMsgParams {
    pub group_id: GroupId,
    pub message: Vec<WireSegment>,
}

#[derive(Debug, Serialize)]
pub struct MessageIdParams {
    pub message_id: MessageId,
}

#[derive(Debug, Deserialize)]
pub struct SendMsgResult {
    pub message_id: MessageId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub user_id: UserId,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub card: Option<String>,
}

impl Sender {
    /// Group card if set, otherwise nickname.
    pub fn display_name(&self) -> Option<String> {
        self.card
            .clone()
            .filter(|c| !c.is_empty())
            .or_else(|| self.nickname.clone())
    }
}

/// Result of `get_msg`.
#[derive(Debug, Deserialize)]
pub struct GetMsgResult {
    pub message_id: MessageId,
    #[serde(default)]
    pub sender: Sender,
    #[serde(default)]
    pub message: MessageBody,
}

/// Result of `get_login_info`.
#[derive(Debug, Deserialize)]
pub struct LoginInfo {
    pub user_id: UserId,
    #[serde(default)]
    pub nickname: String,
}

/// An event reported to the webhook. Only group message fields are typed;
/// other event kinds deserialize with their message fields empty.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub post_type: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub self_id: UserId,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub message: MessageBody,
    #[serde(default)]
    pub sender: Sender,
}

impl Event {
    pub fn is_group_message(&self) -> bool {
        self.post_type == "message" && self.message_type.as_deref() == Some("group")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_segments_to_wire() {
        let wire = to_wire(&[
            MessageSegment::text("hi"),
            MessageSegment::AtAll,
            MessageSegment::image("http://x/a.png"),
            MessageSegment::Mention { user_id: 42 },
        ]);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"type": "text", "data": {"text": "hi"}},
                {"type": "at", "data": {"qq": "all"}},
                {"type": "image", "data": {"file": "http://x/a.png"}},
                {"type": "at", "data": {"qq": "42"}},
            ])
        );
    }

    #[test]
    fn test_inbound_wire_to_segments() {
        let wire: Vec<WireSegment> = serde_json::from_value(serde_json::json!([
            {"type": "at", "data": {"qq": 10001}},
            {"type": "image", "data": {"file": "abc.image", "url": "http://cdn/abc"}},
            {"type": "face", "data": {"id": "14"}},
        ]))
        .unwrap();
        let segments: Vec<MessageSegment> = wire.into_iter().map(Into::into).collect();
        assert_eq!(
            segments,
            vec![
                MessageSegment::Mention { user_id: 10001 },
                MessageSegment::image("http://cdn/abc"),
                MessageSegment::Other {
                    kind: "face".into(),
                    data: vec![("id".into(), "14".into())],
                },
            ]
        );
    }

    #[test]
    fn test_group_message_event_array_format() {
        let event: Event = serde_json::from_value(serde_json::json!({
            "time": 1700000000,
            "self_id": 10001,
            "post_type": "message",
            "message_type": "group",
            "sub_type": "normal",
            "message_id": 55,
            "group_id": 100,
            "user_id": 7,
            "message": [{"type": "text", "data": {"text": "hello"}}],
            "raw_message": "hello",
            "sender": {"user_id": 7, "nickname": "nick", "card": ""}
        }))
        .unwrap();
        assert!(event.is_group_message());
        assert_eq!(event.sender.display_name().as_deref(), Some("nick"));
        assert_eq!(event.message.into_wire().len(), 1);
    }

    #[test]
    fn test_string_message_format_is_decoded() {
        let event: Event = serde_json::from_value(serde_json::json!({
            "post_type": "message",
            "message_type": "group",
            "group_id": 1,
            "user_id": 2,
            "message": "[CQ:reply,id=9]see &#91;this&#93;"
        }))
        .unwrap();
        let wire = event.message.into_wire();
        assert_eq!(wire[0].kind, "reply");
        assert_eq!(wire[0].get("id").as_deref(), Some("9"));
        assert_eq!(wire[1].get("text").as_deref(), Some("see [this]"));
    }

    #[test]
    fn test_meta_event_parses() {
        let event: Event = serde_json::from_value(serde_json::json!({
            "post_type": "meta_event",
            "meta_event_type": "heartbeat",
            "self_id": 1,
            "time": 0
        }))
        .unwrap();
        assert!(!event.is_group_message());
    }

    #[test]
    fn test_api_response_error_text() {
        let resp: ApiResponse<SendMsgResult> = serde_json::from_value(serde_json::json!({
            "status": "failed",
            "retcode": 100,
            "data": null,
            "message": "",
            "wording": "group not found"
        }))
        .unwrap();
        assert!(!resp.is_ok());
        assert_eq!(resp.error_text(), "group not found");
    }
}
