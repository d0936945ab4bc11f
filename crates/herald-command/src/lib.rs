//! herald-command: the chat-side languages herald understands.
//!
//! - [`grammar`]: the bracketed `[type][timestamp][content][group]` command syntax.
//! - [`markup`]: the content mini-language (`{at_all}`, `\n`, image tags).
//! - [`cq`]: CQ-code serialization used to persist forwarded messages.

pub mod cq;
pub mod grammar;
pub mod markup;

pub use grammar::{Command, CommandKind, NotACommand, Parsed};
pub use markup::parse_content;
