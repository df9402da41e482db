// SPDX-License-Identifier: MIT

//! Slack Web API implementation of [`CommunicationPort`].

use super::CommunicationPort;
use crate::error::FlowError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct SlackClient {
    client: Client,
    base_url: String,
    bot_token: String,
}

impl SlackClient {
    pub fn new() -> Result<Self, FlowError> {
        let bot_token = env::var("SLACK_BOT_TOKEN")
            .map_err(|_| FlowError::config("SLACK_BOT_TOKEN must be set"))?;
        let base_url =
            env::var("SLACK_BASE_URL").unwrap_or_else(|_| "https://slack.com/api".to_string());

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url,
            bot_token,
        })
    }

    async fn call(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, FlowError> {
        let url = format!("{}/{}", self.base_url, method);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await?;

        let json: serde_json::Value = resp.json().await?;
        if !json.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
            let err = json
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown_error");
            return Err(FlowError::port("slack", format!("{}: {}", method, err)));
        }
        Ok(json)
    }

    /// Resolve a chat user id to the requester's email address.
    /// Falls back to the raw user id when the profile carries no email.
    pub async fn user_email(&self, user_id: &str) -> Result<String, FlowError> {
        let url = format!("{}/users.info?user={}", self.base_url, user_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.bot_token)
            .send()
            .await?;
        let json: serde_json::Value = resp.json().await?;

        if !json.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
            return Err(FlowError::port("slack", "users.info failed"));
        }

        Ok(json
            .get("user")
            .and_then(|u| u.get("profile"))
            .and_then(|p| p.get("email"))
            .and_then(|e| e.as_str())
            .unwrap_or(user_id)
            .to_string())
    }
}

#[async_trait]
impl CommunicationPort for SlackClient {
    async fn send(&self, channel: &str, thread: &str, text: &str) -> Result<(), FlowError> {
        self.call(
            "chat.postMessage",
            json!({
                "channel": channel,
                "text": text,
                "thread_ts": thread,
            }),
        )
        .await?;
        log::info!("Sent chat message to {} (thread: {})", channel, thread);
        Ok(())
    }

    async fn user_identity(&self, user_id: &str) -> Result<String, FlowError> {
        self.user_email(user_id).await
    }
}
