// SPDX-License-Identifier: MIT

//! Jira REST implementation of [`IssueTrackerPort`].

use super::{IssueTrackerPort, TicketComment, TicketInfo, TicketSnapshot};
use crate::error::FlowError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

/// Jira REST client. Works against both Jira Cloud (basic auth, API v3)
/// and Jira Data Center/Server (bearer auth, API v2).
#[derive(Clone)]
pub struct JiraClient {
    client: Client,
    base_url: String,
    email: Option<String>,
    api_token: String,
    use_bearer: bool,
}

impl JiraClient {
    pub fn new() -> Result<Self, FlowError> {
        let base_url =
            env::var("JIRA_BASE_URL").map_err(|_| FlowError::config("JIRA_BASE_URL must be set"))?;
        let api_token = env::var("JIRA_API_TOKEN")
            .map_err(|_| FlowError::config("JIRA_API_TOKEN must be set"))?;

        // Check for explicit auth type override, or auto-detect based on JIRA_EMAIL
        // JIRA_AUTH_TYPE=bearer forces Bearer auth, JIRA_AUTH_TYPE=basic forces Basic auth
        let auth_type = env::var("JIRA_AUTH_TYPE").ok();
        let email = env::var("JIRA_EMAIL").ok().filter(|e| !e.is_empty());

        let use_bearer = match auth_type.as_deref() {
            Some("bearer") => true,
            Some("basic") => false,
            _ => email.is_none(), // Auto-detect: no email = bearer
        };

        log::info!(
            "Jira client: base_url={}, use_bearer={}, has_email={}",
            base_url,
            use_bearer,
            email.is_some()
        );

        // Port operations must fail, not block; timeouts surface as deltas upstream.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url,
            email,
            api_token,
            use_bearer,
        })
    }

    /// Link shown to requesters and approvers
    pub fn browse_link(&self, ticket_ref: &str) -> String {
        format!("{}/browse/{}", self.base_url, ticket_ref)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, FlowError> {
        // Jira Cloud uses API v3, Jira Data Center/Server uses API v2
        let api_version = if self.use_bearer { "2" } else { "3" };
        let url = format!("{}/rest/api/{}/{}", self.base_url, api_version, path);

        let mut req = self
            .client
            .request(method, &url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json");

        if self.use_bearer {
            req = req.bearer_auth(&self.api_token);
        } else if let Some(email) = &self.email {
            req = req.basic_auth(email, Some(&self.api_token));
        }

        if let Some(b) = body {
            req = req.json(&b);
        }

        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(FlowError::port("jira", format!("{}: {}", status, text)));
        }

        if resp.content_length() == Some(0) {
            return Ok(Value::Null);
        }
        Ok(resp.json().await.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl IssueTrackerPort for JiraClient {
    async fn create(
        &self,
        project: &str,
        summary: &str,
        description: &str,
    ) -> Result<TicketInfo, FlowError> {
        let body = json!({
            "fields": {
                "project": { "key": project },
                "summary": summary,
                "description": description,
                "issuetype": { "name": "Task" }
            }
        });

        let resp = self.request(Method::POST, "issue", Some(body)).await?;
        let key = resp
            .get("key")
            .and_then(|k| k.as_str())
            .ok_or_else(|| FlowError::port("jira", "create response missing issue key"))?
            .to_string();

        log::info!("Created ticket {}", key);
        Ok(TicketInfo {
            link: self.browse_link(&key),
            ticket_ref: key,
        })
    }

    async fn get(&self, ticket_ref: &str) -> Result<TicketSnapshot, FlowError> {
        let resp = self
            .request(Method::GET, &format!("issue/{}", ticket_ref), None)
            .await?;

        let fields = resp
            .get("fields")
            .ok_or_else(|| FlowError::port("jira", "missing fields in issue response"))?;

        let comments = fields
            .get("comment")
            .and_then(|c| c.get("comments"))
            .and_then(|c| c.as_array())
            .map(|arr| {
                arr.iter()
                    .map(|comment| TicketComment {
                        author: comment
                            .get("author")
                            .and_then(|a| a.get("emailAddress").or_else(|| a.get("displayName")))
                            .and_then(|v| v.as_str())
                            .unwrap_or("unknown")
                            .to_string(),
                        body: comment
                            .get("body")
                            .and_then(|b| b.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        created: comment
                            .get("created")
                            .and_then(|c| c.as_str())
                            .map(|s| s.to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(TicketSnapshot {
            ticket_ref: ticket_ref.to_string(),
            status: fields
                .get("status")
                .and_then(|s| s.get("name"))
                .and_then(|n| n.as_str())
                .unwrap_or("Unknown")
                .to_string(),
            description: fields
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or_default()
                .to_string(),
            comments,
        })
    }

    async fn add_comment(&self, ticket_ref: &str, text: &str) -> Result<(), FlowError> {
        let body = json!({ "body": text });
        self.request(
            Method::POST,
            &format!("issue/{}/comment", ticket_ref),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn update_description(
        &self,
        ticket_ref: &str,
        description: &str,
    ) -> Result<(), FlowError> {
        let body = json!({ "fields": { "description": description } });
        self.request(Method::PUT, &format!("issue/{}", ticket_ref), Some(body))
            .await?;
        Ok(())
    }

    async fn transition(&self, ticket_ref: &str, target_state: &str) -> Result<(), FlowError> {
        let resp = self
            .request(
                Method::GET,
                &format!("issue/{}/transitions", ticket_ref),
                None,
            )
            .await?;

        // Match the requested state loosely; workflows name their terminal
        // transition "Done", "Approve", or "Closed" depending on the project.
        let wanted = target_state.to_lowercase();
        let candidates = ["done", "approve", "closed"];
        let transition_id = resp
            .get("transitions")
            .and_then(|t| t.as_array())
            .and_then(|arr| {
                arr.iter().find(|t| {
                    t.get("name")
                        .and_then(|n| n.as_str())
                        .map(|n| {
                            let name = n.to_lowercase();
                            name == wanted || candidates.contains(&name.as_str())
                        })
                        .unwrap_or(false)
                })
            })
            .and_then(|t| t.get("id"))
            .and_then(|id| id.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                FlowError::port(
                    "jira",
                    format!("no '{}' transition available for {}", target_state, ticket_ref),
                )
            })?;

        let body = json!({ "transition": { "id": transition_id } });
        self.request(
            Method::POST,
            &format!("issue/{}/transitions", ticket_ref),
            Some(body),
        )
        .await?;

        log::info!("Transitioned ticket {} toward '{}'", ticket_ref, target_state);
        Ok(())
    }
}
