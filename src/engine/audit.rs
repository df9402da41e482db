// SPDX-License-Identifier: MIT

//! Audit-trail contract embedded in the ticket description.
//!
//! The description is the durable half of the conversation mapping: when the
//! in-memory store has no entry for a ticket, the gateway rebuilds the
//! workflow from these lines. The format is fixed:
//!
//! ```text
//! Request from: <requesterId>
//! Access requested: <resourceRequested>
//! Slack thread: <channelRef>#<threadRef>
//! Required approvers: <csv of approver ids>
//! ```

use crate::error::FlowError;
use std::collections::BTreeSet;

/// Fields recovered from a ticket's audit-trail description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditFields {
    pub requester_id: String,
    pub resource_requested: String,
    pub channel_ref: String,
    pub thread_ref: String,
    pub required_approvers: BTreeSet<String>,
}

/// Render the audit trail for a ticket description.
pub fn build_description(
    requester_id: &str,
    resource_requested: &str,
    channel_ref: &str,
    thread_ref: &str,
    required_approvers: &BTreeSet<String>,
) -> String {
    let approvers: Vec<&str> = required_approvers.iter().map(|s| s.as_str()).collect();
    format!(
        "Request from: {}\nAccess requested: {}\nSlack thread: {}#{}\nRequired approvers: {}",
        requester_id,
        resource_requested,
        channel_ref,
        thread_ref,
        approvers.join(",")
    )
}

/// Parse an audit-trail description back into its fields.
///
/// The `Slack thread:` line with a `#` separator is mandatory; without it
/// the conversation cannot be re-keyed and the caller must fall back to a
/// ticket-scoped workflow. The remaining lines degrade to empty values.
pub fn parse_description(description: &str) -> Result<AuditFields, FlowError> {
    let mut requester_id = String::new();
    let mut resource_requested = String::new();
    let mut channel_ref = None;
    let mut thread_ref = None;
    let mut required_approvers = BTreeSet::new();

    for line in description.lines() {
        let lower = line.to_lowercase();
        if let Some(value) = line.split_once(':').map(|(_, v)| v.trim()) {
            if lower.starts_with("request from:") {
                requester_id = value.to_string();
            } else if lower.starts_with("access requested:") {
                resource_requested = value.to_string();
            } else if lower.starts_with("slack thread:") {
                if let Some((channel, thread)) = value.split_once('#') {
                    let channel = channel.trim();
                    let thread = thread.trim();
                    if !channel.is_empty() && !thread.is_empty() {
                        channel_ref = Some(channel.to_string());
                        thread_ref = Some(thread.to_string());
                    }
                }
            } else if lower.starts_with("required approvers:") {
                required_approvers = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
        }
    }

    match (channel_ref, thread_ref) {
        (Some(channel_ref), Some(thread_ref)) => Ok(AuditFields {
            requester_id,
            resource_requested,
            channel_ref,
            thread_ref,
            required_approvers,
        }),
        _ => Err(FlowError::MappingReconstruction(
            "description has no parsable 'Slack thread:' line".to_string(),
        )),
    }
}
