// SPDX-License-Identifier: MIT

//! Approval-chain resolution and ticket approval scanning.

use crate::error::FlowError;
use crate::ports::IssueTrackerPort;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Comment keywords that count as an approval, matched case-insensitively.
const APPROVAL_KEYWORDS: [&str; 3] = ["approved", "done", "proceed"];

/// Manager -> direct reports table plus a fallback approver set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApprovalHierarchy {
    #[serde(default)]
    pub managers: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub fallback_approvers: Vec<String>,
}

/// Result of scanning a ticket's comments against the required set
#[derive(Debug, Clone)]
pub struct ApprovalScan {
    pub approved_by: BTreeSet<String>,
    pub pending: BTreeSet<String>,
    pub fully_approved: bool,
}

/// Resolves the required approver set for a requester. The hierarchy is
/// loaded once and read-only at run time, so resolution is deterministic:
/// the same requester always yields the same set.
pub struct ApprovalResolver {
    hierarchy: ApprovalHierarchy,
}

impl ApprovalResolver {
    pub fn new(hierarchy: ApprovalHierarchy) -> Self {
        Self { hierarchy }
    }

    /// Load the hierarchy from a JSON or YAML file, by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let hierarchy = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        log::info!("Loaded approval hierarchy from {}", path.display());
        Ok(Self::new(hierarchy))
    }

    /// Owning manager(s) for the requester, else the fallback set, else
    /// `NoApproversFound`.
    pub fn resolve(&self, requester_id: &str) -> Result<BTreeSet<String>, FlowError> {
        let needle = requester_id.to_lowercase();
        let mut managers: BTreeSet<String> = self
            .hierarchy
            .managers
            .iter()
            .filter(|(_, reports)| reports.iter().any(|r| r.to_lowercase() == needle))
            .map(|(manager, _)| manager.clone())
            .collect();

        if managers.is_empty() {
            managers = self.hierarchy.fallback_approvers.iter().cloned().collect();
        }
        if managers.is_empty() {
            return Err(FlowError::NoApproversFound(requester_id.to_string()));
        }
        Ok(managers)
    }

    /// Scan the ticket's comments. A comment approves iff its author is in
    /// the required set and its body contains an approval keyword.
    pub async fn check_approvals(
        &self,
        tracker: &dyn IssueTrackerPort,
        ticket_ref: &str,
        required_approvers: &BTreeSet<String>,
    ) -> Result<ApprovalScan, FlowError> {
        let snapshot = tracker.get(ticket_ref).await?;

        let required_lower: BTreeMap<String, String> = required_approvers
            .iter()
            .map(|a| (a.to_lowercase(), a.clone()))
            .collect();

        let mut approved_by = BTreeSet::new();
        for comment in &snapshot.comments {
            let body = comment.body.to_lowercase();
            if !APPROVAL_KEYWORDS.iter().any(|k| body.contains(k)) {
                continue;
            }
            if let Some(approver) = required_lower.get(&comment.author.to_lowercase()) {
                approved_by.insert(approver.clone());
            }
        }

        let pending: BTreeSet<String> = required_approvers
            .iter()
            .filter(|a| !approved_by.contains(*a))
            .cloned()
            .collect();
        // An empty required set means we do not know who must approve, which
        // is never the same as everyone having approved.
        let fully_approved = !required_approvers.is_empty() && pending.is_empty();

        log::info!(
            "Approval scan | ticket: {} | approved by: {} | pending: {}",
            ticket_ref,
            if approved_by.is_empty() {
                "-".to_string()
            } else {
                approved_by.iter().cloned().collect::<Vec<_>>().join(", ")
            },
            if pending.is_empty() {
                "-".to_string()
            } else {
                pending.iter().cloned().collect::<Vec<_>>().join(", ")
            },
        );

        Ok(ApprovalScan {
            approved_by,
            pending,
            fully_approved,
        })
    }
}
