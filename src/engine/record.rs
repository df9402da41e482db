// SPDX-License-Identifier: MIT

//! Per-conversation workflow state and the deltas nodes report against it.

use super::steps::StepTag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Approval progress. Monotonic: UNSET -> PENDING -> APPROVED, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Unset,
    Pending,
    Approved,
}

/// Ticket lifecycle. Monotonic: OPEN -> CLOSED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Closed,
}

/// Bound on the stored history; only the tail is ever shown to the oracle.
const HISTORY_LIMIT: usize = 50;

/// One workflow per conversation thread, keyed by `conversation_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub conversation_key: String,
    pub channel_ref: Option<String>,
    pub thread_ref: Option<String>,
    pub requester_id: String,
    pub resource_requested: String,
    pub ticket_ref: Option<String>,
    pub ticket_link: Option<String>,
    pub approval_status: ApprovalStatus,
    pub ticket_status: TicketStatus,
    pub required_approvers: BTreeSet<String>,
    pub approved_by: BTreeSet<String>,
    pub steps_completed: BTreeSet<StepTag>,
    pub last_check_time: Option<DateTime<Utc>>,
    pub iterations: u32,
    pub resource_ids: Vec<String>,
    pub needs_info: Option<String>,
    pub history: Vec<String>,
}

impl WorkflowRecord {
    pub fn new(
        conversation_key: impl Into<String>,
        requester_id: impl Into<String>,
        resource_requested: impl Into<String>,
    ) -> Self {
        Self {
            conversation_key: conversation_key.into(),
            channel_ref: None,
            thread_ref: None,
            requester_id: requester_id.into(),
            resource_requested: resource_requested.into(),
            ticket_ref: None,
            ticket_link: None,
            approval_status: ApprovalStatus::Unset,
            ticket_status: TicketStatus::Open,
            required_approvers: BTreeSet::new(),
            approved_by: BTreeSet::new(),
            steps_completed: BTreeSet::new(),
            last_check_time: None,
            iterations: 0,
            resource_ids: Vec::new(),
            needs_info: None,
            history: Vec::new(),
        }
    }

    pub fn with_thread(mut self, channel: impl Into<String>, thread: impl Into<String>) -> Self {
        self.channel_ref = Some(channel.into());
        self.thread_ref = Some(thread.into());
        self
    }

    /// Apply a node's delta. Set-once fields are never overwritten and
    /// monotonic fields never regress; violating updates are dropped.
    pub fn apply(&mut self, delta: &StateDelta) {
        if self.ticket_ref.is_none() {
            self.ticket_ref = delta.ticket_ref.clone();
        }
        if self.ticket_link.is_none() {
            self.ticket_link = delta.ticket_link.clone();
        }
        if let Some(status) = delta.approval_status {
            if status > self.approval_status {
                self.approval_status = status;
            }
        }
        if let Some(status) = delta.ticket_status {
            if status > self.ticket_status {
                self.ticket_status = status;
            }
        }
        if self.required_approvers.is_empty() {
            if let Some(approvers) = &delta.required_approvers {
                self.required_approvers = approvers.clone();
            }
        }
        self.approved_by.extend(delta.approved_by.iter().cloned());
        self.steps_completed.extend(delta.steps_completed.iter());
        if let Some(t) = delta.last_check_time {
            self.last_check_time = Some(t);
        }
        self.resource_ids.extend(delta.resource_ids.iter().cloned());
        if delta.needs_info.is_some() {
            self.needs_info = delta.needs_info.clone();
        }
        for note in &delta.notes {
            self.push_history(note.clone());
        }
        if let Some(err) = &delta.error {
            self.push_history(format!("error: {}", err));
        }

        if self.history.len() > HISTORY_LIMIT {
            let drop = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..drop);
        }
    }

    pub fn push_history(&mut self, line: String) {
        self.history.push(line);
    }

    /// Tail of the interaction history, formatted for the oracle prompt.
    pub fn recent_history(&self, limit: usize) -> String {
        let start = self.history.len().saturating_sub(limit);
        let recent = &self.history[start..];
        if recent.is_empty() {
            "None".to_string()
        } else {
            recent.join("\n")
        }
    }
}

/// State changes reported by one node execution. Applied atomically by the
/// store; never raised past the router.
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub ticket_ref: Option<String>,
    pub ticket_link: Option<String>,
    pub approval_status: Option<ApprovalStatus>,
    pub ticket_status: Option<TicketStatus>,
    pub required_approvers: Option<BTreeSet<String>>,
    pub approved_by: BTreeSet<String>,
    pub steps_completed: Vec<StepTag>,
    pub last_check_time: Option<DateTime<Utc>>,
    pub resource_ids: Vec<String>,
    pub needs_info: Option<String>,
    pub notes: Vec<String>,
    /// Recoverable failure; the router re-evaluates next cycle
    pub error: Option<String>,
    /// Unrecoverable for this workflow; the router surfaces it and stops
    pub fatal: Option<String>,
}

impl StateDelta {
    pub fn note(text: impl Into<String>) -> Self {
        Self {
            notes: vec![text.into()],
            ..Default::default()
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            error: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_note(mut self, text: impl Into<String>) -> Self {
        self.notes.push(text.into());
        self
    }
}
