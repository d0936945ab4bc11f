//! Message transport abstraction.
//!
//! A transport bridges herald to a chat platform: it delivers outbound
//! group messages, recalls messages, and pushes inbound group events into
//! the gateway.
//!
//! # Implementing a transport
//!
//! ```rust,ignore
//! use herald_gateway::transport::MessageTransport;
//!
//! struct MyPlatform { /* ... */ }
//!
//! #[async_trait::async_trait]
//! impl MessageTransport for MyPlatform {
//!     fn name(&self) -> &str { "my-platform" }
//!     async fn send_group_message(&self, group_id: GroupId, segments: Vec<MessageSegment>)
//!         -> anyhow::Result<MessageId> { /* ... */ }
//!     async fn delete_message(&self, message_id: MessageId) -> anyhow::Result<()> { /* ... */ }
//! }
//! ```

use herald_types::{GroupId, MessageId, MessageSegment};

/// Outbound side of a chat platform.
///
/// Implementations are expected to bound every call with a timeout.
#[async_trait::async_trait]
pub trait MessageTransport: Send + Sync {
    /// Transport identifier used in logs (e.g. "onebot").
    fn name(&self) -> &str;

    /// Post `segments` to a group and return the platform message id.
    async fn send_group_message(
        &self,
        group_id: GroupId,
        segments: Vec<MessageSegment>,
    ) -> anyhow::Result<MessageId>;

    /// Recall a previously sent message.
    async fn delete_message(&self, message_id: MessageId) -> anyhow::Result<()>;
}
