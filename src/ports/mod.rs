// SPDX-License-Identifier: MIT

//! Capability ports consumed by the workflow engine.
//!
//! The engine never talks to Slack, Jira, the mail relay, or the
//! provisioning backend directly; it goes through these traits so tests can
//! substitute in-memory doubles and production can swap transports.

pub mod jira;
pub mod mail;
pub mod provisioning;
pub mod slack;

use crate::error::FlowError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of creating a ticket
#[derive(Debug, Clone)]
pub struct TicketInfo {
    pub ticket_ref: String,
    pub link: String,
}

/// One comment on a ticket
#[derive(Debug, Clone)]
pub struct TicketComment {
    pub author: String,
    pub body: String,
    pub created: Option<String>,
}

/// Snapshot of a ticket as fetched from the tracker
#[derive(Debug, Clone)]
pub struct TicketSnapshot {
    pub ticket_ref: String,
    pub status: String,
    pub description: String,
    pub comments: Vec<TicketComment>,
}

/// What the provisioning backend is asked to grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantSpec {
    pub requester_id: String,
    pub resource: String,
    pub ticket_ref: String,
}

/// Outcome of a provisioning attempt
#[derive(Debug, Clone)]
pub enum ProvisionOutcome {
    Applied { resource_ids: Vec<String> },
    NeedsInfo { reason: String },
}

/// Sends messages into a chat channel/thread
#[async_trait]
pub trait CommunicationPort: Send + Sync {
    async fn send(&self, channel: &str, thread: &str, text: &str) -> Result<(), FlowError>;

    /// Resolve a chat user id to a durable identity (an email address for
    /// transports with a directory). Defaults to the raw id.
    async fn user_identity(&self, user_id: &str) -> Result<String, FlowError> {
        Ok(user_id.to_string())
    }
}

/// Issue-tracker operations the engine needs
#[async_trait]
pub trait IssueTrackerPort: Send + Sync {
    async fn create(
        &self,
        project: &str,
        summary: &str,
        description: &str,
    ) -> Result<TicketInfo, FlowError>;

    async fn get(&self, ticket_ref: &str) -> Result<TicketSnapshot, FlowError>;

    async fn add_comment(&self, ticket_ref: &str, text: &str) -> Result<(), FlowError>;

    /// Rewrite the ticket description (carries the audit trail)
    async fn update_description(
        &self,
        ticket_ref: &str,
        description: &str,
    ) -> Result<(), FlowError>;

    async fn transition(&self, ticket_ref: &str, target_state: &str) -> Result<(), FlowError>;
}

/// Outbound mail
#[async_trait]
pub trait MailPort: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), FlowError>;
}

/// Applies access grants once a request is fully approved
#[async_trait]
pub trait ProvisioningPort: Send + Sync {
    async fn apply(&self, spec: &GrantSpec) -> Result<ProvisionOutcome, FlowError>;
}
