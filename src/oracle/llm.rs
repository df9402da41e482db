// SPDX-License-Identifier: MIT

//! LLM-backed decision oracle over an OpenAI-compatible chat API.

use super::prompt::ROUTING_SYSTEM_PROMPT;
use super::DecisionOracle;
use crate::error::FlowError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;
use std::time::Duration;

/// Chat-completions client used as the routing classifier.
///
/// Requires `ORACLE_API_KEY` (or `OPENAI_API_KEY`); optionally
/// `ORACLE_BASE_URL` for custom endpoints.
pub struct ChatOracle {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl ChatOracle {
    pub fn new(model_name: String) -> Result<Self, FlowError> {
        let api_key = env::var("ORACLE_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .map_err(|_| FlowError::config("ORACLE_API_KEY or OPENAI_API_KEY must be set"))?;
        let base_url = env::var("ORACLE_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model_name,
            base_url,
        })
    }
}

#[async_trait]
impl DecisionOracle for ChatOracle {
    async fn decide(&self, context: &str) -> Result<String, FlowError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model_name,
            "messages": [
                { "role": "system", "content": ROUTING_SYSTEM_PROMPT },
                { "role": "user", "content": context }
            ],
            "temperature": 0.0,
            "max_tokens": 16,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(FlowError::port("oracle", format!("{}: {}", status, text)));
        }

        let json: serde_json::Value = resp.json().await?;
        let choice = json
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| FlowError::port("oracle", "empty choices in response"))?;

        // Content filters surface as a dedicated finish reason; callers turn
        // this into the fixed user-facing apology.
        if choice.get("finish_reason").and_then(|r| r.as_str()) == Some("content_filter") {
            return Err(FlowError::ContentPolicyRejection(
                "routing request was filtered".to_string(),
            ));
        }

        let text = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();

        log::debug!("Oracle raw decision: '{}'", text);
        Ok(text)
    }
}
