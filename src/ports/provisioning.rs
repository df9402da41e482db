// SPDX-License-Identifier: MIT

//! HTTP implementation of [`ProvisioningPort`].
//!
//! The engine only decides *when* a grant may be applied; the actual cloud
//! side runs behind this endpoint. The backend answers either with created
//! resource ids or with a `needs_info` reason that keeps the ticket open.

use super::{GrantSpec, ProvisionOutcome, ProvisioningPort};
use crate::error::FlowError;
use async_trait::async_trait;
use reqwest::Client;
use std::env;
use std::time::Duration;

pub struct HttpProvisioner {
    client: Client,
    endpoint: String,
    api_token: String,
}

impl HttpProvisioner {
    pub fn new() -> Result<Self, FlowError> {
        let endpoint = env::var("PROVISIONER_URL")
            .map_err(|_| FlowError::config("PROVISIONER_URL must be set"))?;
        let api_token = env::var("PROVISIONER_TOKEN")
            .map_err(|_| FlowError::config("PROVISIONER_TOKEN must be set"))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_token,
        })
    }
}

#[async_trait]
impl ProvisioningPort for HttpProvisioner {
    async fn apply(&self, spec: &GrantSpec) -> Result<ProvisionOutcome, FlowError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(spec)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(FlowError::port(
                "provisioner",
                format!("{}: {}", status, text),
            ));
        }

        let json: serde_json::Value = resp.json().await?;

        if let Some(reason) = json.get("needs_info").and_then(|r| r.as_str()) {
            return Ok(ProvisionOutcome::NeedsInfo {
                reason: reason.to_string(),
            });
        }

        let resource_ids = json
            .get("resource_ids")
            .and_then(|ids| ids.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(ProvisionOutcome::Applied { resource_ids })
    }
}
