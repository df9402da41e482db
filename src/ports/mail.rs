// SPDX-License-Identifier: MIT

//! HTTP mail-relay implementation of [`MailPort`].
//!
//! Approval-request notifications go out through a JSON mail relay rather
//! than raw SMTP; the relay endpoint and token come from the environment.

use super::MailPort;
use crate::error::FlowError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;
use std::time::Duration;

pub struct MailRelayClient {
    client: Client,
    endpoint: String,
    api_token: String,
    sender: String,
}

impl MailRelayClient {
    pub fn new() -> Result<Self, FlowError> {
        let endpoint = env::var("MAIL_RELAY_URL")
            .map_err(|_| FlowError::config("MAIL_RELAY_URL must be set"))?;
        let api_token = env::var("MAIL_RELAY_TOKEN")
            .map_err(|_| FlowError::config("MAIL_RELAY_TOKEN must be set"))?;
        let sender = env::var("SENDER_EMAIL")
            .unwrap_or_else(|_| "access-requests@example.com".to_string());

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_token,
            sender,
        })
    }
}

#[async_trait]
impl MailPort for MailRelayClient {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), FlowError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&json!({
                "from": self.sender,
                "to": to,
                "subject": subject,
                "body": body,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(FlowError::port("mail", format!("{}: {}", status, text)));
        }

        log::info!("Email sent to {}", to);
        Ok(())
    }
}
