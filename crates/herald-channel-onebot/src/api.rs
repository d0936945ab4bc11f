//! OneBot v11 HTTP API client.

use std::time::Duration;

use anyhow::{Context, bail};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use herald_config::OneBotConfig;
use herald_types::{GroupId, MessageId};

use crate::types::{
    ApiResponse, GetMsgResult, LoginInfo, MessageIdParams, SendGroupMsgParams, SendMsgResult,
    WireSegment,
};

/// HTTP client for a OneBot implementation's action endpoints.
pub struct OneBotApi {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl OneBotApi {
    /// Create a client bounded by `config.timeout_secs` per call.
    pub fn new(config: &OneBotConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone().filter(|t| !t.is_empty()),
        })
    }

    async fn call<P, T>(&self, action: &str, params: &P) -> anyhow::Result<Option<T>>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(format!("{}/{action}", self.base_url))
            .json(params);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let resp: ApiResponse<T> = request
            .send()
            .await
            .with_context(|| format!("{action} request failed"))?
            .error_for_status()
            .with_context(|| format!("{action} rejected"))?
            .json()
            .await
            .with_context(|| format!("{action} response parse failed"))?;

        if !resp.is_ok() {
            bail!("{action} failed: {}", resp.error_text());
        }
        Ok(resp.data)
    }

    /// Post a message to a group and return its message id.
    pub async fn send_group_msg(
        &self,
        group_id: GroupId,
        message: Vec<WireSegment>,
    ) -> anyhow::Result<MessageId> {
        let result: Option<SendMsgResult> = self
            .call("send_group_msg", &SendGroupMsgParams { group_id, message })
            .await?;
        Ok(result.context("send_group_msg returned no message id")?.message_id)
    }

    /// Recall a message.
    pub async fn delete_msg(&self, message_id: MessageId) -> anyhow::Result<()> {
        self.call::<_, serde_json::Value>("delete_msg", &MessageIdParams { message_id })
            .await?;
        Ok(())
    }

    /// Fetch a message by id.
    pub async fn get_msg(&self, message_id: MessageId) -> anyhow::Result<GetMsgResult> {
        self.call("get_msg", &MessageIdParams { message_id })
            .await?
            .context("get_msg returned no message")
    }

    /// Identity of the logged-in bot account.
    pub async fn get_login_info(&self) -> anyhow::Result<LoginInfo> {
        self.call("get_login_info", &serde_json::json!({}))
            .await?
            .context("get_login_info returned no data")
    }
}
