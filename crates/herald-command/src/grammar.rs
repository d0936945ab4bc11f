//! Command grammar: `[type][timestamp][content][group]`.
//!
//! The grammar is type-agnostic. It only splits the four bracketed fields
//! and trims them; deciding whether the values make sense for the command
//! type is left to the dispatcher.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Keyword that asks for the usage text instead of running a command.
pub const HELP_KEYWORD: &str = "message";

static COMMAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\[(.*?)\]\[(.*?)\]\[(.*?)\]\[(.*?)\]").expect("command regex is valid")
});

/// The text is not a command and should be ignored without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("not a command")]
pub struct NotACommand;

/// What a command asks the bot to do, taken from its first field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    SendMessage,
    ForwardMessage,
    RecallMessage,
    CancelMessage,
    ListSchedule,
    /// A syntactically valid command with an unrecognised keyword.
    Unknown(String),
}

impl CommandKind {
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "sendmessage" => Self::SendMessage,
            "forwardmessage" => Self::ForwardMessage,
            "recallmessage" => Self::RecallMessage,
            "cancelmessage" => Self::CancelMessage,
            "schedulemessage" => Self::ListSchedule,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn keyword(&self) -> &str {
        match self {
            Self::SendMessage => "sendmessage",
            Self::ForwardMessage => "forwardmessage",
            Self::RecallMessage => "recallmessage",
            Self::CancelMessage => "cancelmessage",
            Self::ListSchedule => "schedulemessage",
            Self::Unknown(keyword) => keyword,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A parsed command. Field values are raw, trimmed strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    /// `"0"` = now, digits = absolute time, `"-1"` = cancel marker, empty = unused.
    pub timestamp: String,
    /// Message body, job id, message id or regex filter depending on `kind`.
    pub content: String,
    /// Target group id, numeric or empty.
    pub target_group: String,
}

/// Result of parsing an inbound text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// The operator asked for the usage text.
    Help,
    Command(Command),
}

fn is_help(text: &str) -> bool {
    text.eq_ignore_ascii_case(HELP_KEYWORD)
}

/// Cheap check used by transports to decide whether a message is worth
/// dispatching at all.
pub fn is_command(text: &str) -> bool {
    let text = text.trim();
    is_help(text) || COMMAND_RE.is_match(text)
}

/// Parse a plaintext message into a command.
pub fn parse(text: &str) -> Result<Parsed, NotACommand> {
    let text = text.trim();
    if is_help(text) {
        return Ok(Parsed::Help);
    }

    let caps = COMMAND_RE.captures(text).ok_or(NotACommand)?;
    let field = |i: usize| {
        caps.get(i)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    };

    Ok(Parsed::Command(Command {
        kind: CommandKind::from_keyword(&field(1)),
        timestamp: field(2),
        content: field(3),
        target_group: field(4),
    }))
}
