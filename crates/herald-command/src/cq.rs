//! CQ-code string form of a message (`text[CQ:type,key=value,...]text`).
//!
//! Scheduled forwards persist the replied-to message in this form, since
//! the queue file stores content as a string.

use herald_types::MessageSegment;

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('[', "&#91;")
        .replace(']', "&#93;")
}

fn escape_param(s: &str) -> String {
    escape_text(s).replace(',', "&#44;")
}

fn unescape(s: &str) -> String {
    s.replace("&#44;", ",")
        .replace("&#91;", "[")
        .replace("&#93;", "]")
        .replace("&amp;", "&")
}

fn push_code(out: &mut String, kind: &str, data: &[(&str, &str)]) {
    out.push_str("[CQ:");
    out.push_str(kind);
    for (key, value) in data {
        out.push(',');
        out.push_str(key);
        out.push('=');
        out.push_str(&escape_param(value));
    }
    out.push(']');
}

/// Serialize segments into a CQ-code string.
pub fn encode(segments: &[MessageSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            MessageSegment::Text { text } => out.push_str(&escape_text(text)),
            MessageSegment::AtAll => push_code(&mut out, "at", &[("qq", "all")]),
            MessageSegment::Image { url } => {
                push_code(&mut out, "image", &[("file", url.as_str())])
            }
            MessageSegment::Mention { user_id } => {
                let qq = user_id.to_string();
                push_code(&mut out, "at", &[("qq", qq.as_str())]);
            }
            MessageSegment::Other { kind, data } => {
                let data: Vec<(&str, &str)> =
                    data.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                push_code(&mut out, kind, &data);
            }
        }
    }
    out
}

/// Build a segment from a CQ type and its (unescaped) parameters.
///
/// Types without a dedicated variant are kept as `Other`.
pub fn segment_from_parts(kind: &str, data: Vec<(String, String)>) -> MessageSegment {
    let get = |key: &str| {
        data.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };

    match kind {
        "text" => return MessageSegment::text(get("text").unwrap_or_default()),
        "at" => match get("qq").as_deref() {
            Some("all") => return MessageSegment::AtAll,
            Some(qq) => {
                if let Ok(user_id) = qq.parse() {
                    return MessageSegment::Mention { user_id };
                }
            }
            None => {}
        },
        "image" => {
            if let Some(url) = get("url").or_else(|| get("file")) {
                return MessageSegment::Image { url };
            }
        }
        _ => {}
    }

    MessageSegment::Other {
        kind: kind.to_string(),
        data,
    }
}

fn parse_code(body: &str) -> MessageSegment {
    let mut parts = body.split(',');
    let kind = parts.next().unwrap_or_default().trim();
    let data = parts
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            Some((key.trim().to_string(), unescape(value)))
        })
        .collect();
    segment_from_parts(kind, data)
}

/// Parse a CQ-code string back into segments.
///
/// An unterminated `[CQ:` is kept as literal text.
pub fn decode(input: &str) -> Vec<MessageSegment> {
    let mut segments = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find("[CQ:") {
        let Some(len) = rest[start..].find(']') else {
            break;
        };
        if start > 0 {
            segments.push(MessageSegment::text(unescape(&rest[..start])));
        }
        segments.push(parse_code(&rest[start + 4..start + len]));
        rest = &rest[start + len + 1..];
    }
    if !rest.is_empty() {
        segments.push(MessageSegment::text(unescape(rest)));
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_escapes_brackets() {
        let encoded = encode(&[MessageSegment::text("[sendmessage] & co")]);
        assert_eq!(encoded, "&#91;sendmessage&#93; &amp; co");
    }

    #[test]
    fn test_encode_codes() {
        let encoded = encode(&[
            MessageSegment::AtAll,
            MessageSegment::text(" hi "),
            MessageSegment::image("http://x/a,b.png"),
            MessageSegment::Mention { user_id: 42 },
        ]);
        assert_eq!(
            encoded,
            "[CQ:at,qq=all] hi [CQ:image,file=http://x/a&#44;b.png][CQ:at,qq=42]"
        );
    }

    #[test]
    fn test_decode_preserves_forwarded_message() {
        let original = vec![
            MessageSegment::text("公告 [重要]\n"),
            MessageSegment::AtAll,
            MessageSegment::image("http://x/y.png"),
            MessageSegment::Other {
                kind: "face".into(),
                data: vec![("id".into(), "14".into())],
            },
            MessageSegment::text("end"),
        ];
        assert_eq!(decode(&encode(&original)), original);
    }

    #[test]
    fn test_decode_image_prefers_url() {
        let segments = decode("[CQ:image,file=abc.image,url=http://cdn/abc.jpg]");
        assert_eq!(segments, vec![MessageSegment::image("http://cdn/abc.jpg")]);
    }

    #[test]
    fn test_decode_unterminated_code_is_text() {
        let segments = decode("hello [CQ:image,file=x");
        assert_eq!(segments, vec![MessageSegment::text("hello [CQ:image,file=x")]);
    }

    #[test]
    fn test_decode_plain_text() {
        assert_eq!(decode("just text"), vec![MessageSegment::text("just text")]);
        assert!(decode("").is_empty());
    }
}
