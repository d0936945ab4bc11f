//! OneBot v11 transport for herald.
//!
//! Outbound calls go to the implementation's HTTP API; inbound events are
//! received through HTTP POST reporting on a local webhook.
//!
//! # Configuration
//!
//! ```json5
//! onebot: {
//!     api_url: "http://127.0.0.1:5700",
//!     access_token: "secret",
//!     listen: "127.0.0.1:8080",
//!     require_mention: true,
//! }
//! ```
//!
//! Point the implementation's `post_url` at `http://<listen>/`.

pub mod api;
pub mod events;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::post;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use herald_config::OneBotConfig;
use herald_gateway::MessageTransport;
use herald_types::{GroupId, InboundEvent, MessageId, MessageSegment};

use api::OneBotApi;
use events::EventState;

/// OneBot transport implementing `MessageTransport`.
pub struct OneBotTransport {
    api: Arc<OneBotApi>,
    config: OneBotConfig,
}

impl OneBotTransport {
    pub fn new(config: &OneBotConfig) -> anyhow::Result<Self> {
        Ok(Self {
            api: Arc::new(OneBotApi::new(config)?),
            config: config.clone(),
        })
    }

    pub fn api(&self) -> &OneBotApi {
        &self.api
    }

    /// Run the event webhook until `cancel` fires, pushing group messages
    /// addressed to the bot into `sender`.
    pub async fn serve_events(
        &self,
        sender: mpsc::Sender<InboundEvent>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let login = self
            .api
            .get_login_info()
            .await
            .context("failed to reach the OneBot API")?;
        info!(self_id = login.user_id, nickname = %login.nickname, "OneBot account connected");

        let state = Arc::new(EventState {
            api: self.api.clone(),
            self_id: login.user_id,
            require_mention: self.config.require_mention,
            sender,
        });
        let app = Router::new()
            .route("/", post(events::handle_event))
            .with_state(state);

        let addr: SocketAddr = self
            .config
            .listen
            .parse()
            .with_context(|| format!("invalid listen address {}", self.config.listen))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!("OneBot webhook listening on http://{addr}/");

        axum::serve(listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await?;

        info!("OneBot webhook stopped");
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageTransport for OneBotTransport {
    fn name(&self) -> &str {
        "onebot"
    }

    async fn send_group_message(
        &self,
        group_id: GroupId,
        segments: Vec<MessageSegment>,
    ) -> anyhow::Result<MessageId> {
        self.api
            .send_group_msg(group_id, types::to_wire(&segments))
            .await
    }

    async fn delete_message(&self, message_id: MessageId) -> anyhow::Result<()> {
        self.api.delete_msg(message_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serve_fails_without_api() {
        let config = OneBotConfig {
            api_url: "http://127.0.0.1:9".into(),
            timeout_secs: 1,
            ..Default::default()
        };
        let transport = OneBotTransport::new(&config).unwrap();
        assert_eq!(transport.name(), "onebot");

        let (tx, _rx) = mpsc::channel(1);
        let err = transport
            .serve_events(tx, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("OneBot API"));
    }
}
