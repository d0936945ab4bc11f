//! Content markup: turns an operator-written body into message segments.
//!
//! Supported syntax:
//! - `\n` (backslash + `n`) becomes a line break.
//! - `{at_all}` mentions every member of the target group.
//! - `{:Image(url="...")}` embeds an image.
//!
//! Anything else, including malformed tags, is sent as literal text.

use once_cell::sync::Lazy;
use regex::Regex;

use herald_types::MessageSegment;

const AT_ALL_TAG: &str = "{at_all}";

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{at_all\}|\{:Image\(url="(.*?)"\)\}"#).expect("tag regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Text,
    AtAll,
    Image,
}

#[derive(Debug)]
struct Token<'a> {
    kind: TokenKind,
    /// For `Image` tokens this is the captured URL, otherwise the raw piece.
    text: &'a str,
}

/// Split `input` into text and tag tokens in a single left-to-right pass.
fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut last = 0;

    for caps in TAG_RE.captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        tokens.push(Token {
            kind: TokenKind::Text,
            text: &input[last..whole.start()],
        });
        match caps.get(1) {
            Some(url) => tokens.push(Token {
                kind: TokenKind::Image,
                text: url.as_str(),
            }),
            None => tokens.push(Token {
                kind: TokenKind::AtAll,
                text: AT_ALL_TAG,
            }),
        }
        last = whole.end();
    }
    tokens.push(Token {
        kind: TokenKind::Text,
        text: &input[last..],
    });

    tokens
}

/// Parse a markup string into ordered message segments.
///
/// Adjacent text pieces are not merged; empty text pieces are dropped.
pub fn parse_content(content: &str) -> Vec<MessageSegment> {
    let content = content.replace("\\n", "\n");

    tokenize(&content)
        .into_iter()
        .filter_map(|token| match token.kind {
            TokenKind::Text if token.text.is_empty() => None,
            TokenKind::Text => Some(MessageSegment::text(token.text)),
            TokenKind::AtAll => Some(MessageSegment::AtAll),
            TokenKind::Image => Some(MessageSegment::image(token.text)),
        })
        .collect()
}
