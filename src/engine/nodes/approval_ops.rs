// SPDX-License-Identifier: MIT

//! Approver resolution, notification, and approval polling.

use crate::engine::audit;
use crate::engine::record::{ApprovalStatus, StateDelta, WorkflowRecord};
use crate::engine::resolver::ApprovalResolver;
use crate::engine::steps::{StepTag, StepTracker};
use crate::ports::{IssueTrackerPort, MailPort};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::AgentNode;

pub struct ApprovalOpsNode {
    resolver: Arc<ApprovalResolver>,
    tracker: Arc<dyn IssueTrackerPort>,
    mail: Arc<dyn MailPort>,
}

impl ApprovalOpsNode {
    pub fn new(
        resolver: Arc<ApprovalResolver>,
        tracker: Arc<dyn IssueTrackerPort>,
        mail: Arc<dyn MailPort>,
    ) -> Self {
        Self {
            resolver,
            tracker,
            mail,
        }
    }

    /// First entry: resolve the chain, stamp the audit trail on the ticket,
    /// and mail every required approver.
    async fn notify_approvers(&self, record: &WorkflowRecord) -> StateDelta {
        let Some(ticket_ref) = &record.ticket_ref else {
            return StateDelta::failure("approval_ops: no ticket yet, cannot notify approvers");
        };

        let approvers = match self.resolver.resolve(&record.requester_id) {
            Ok(approvers) => approvers,
            Err(e) => {
                // No chain means nobody can ever approve this workflow.
                return StateDelta {
                    fatal: Some(format!("approval_ops: {}", e)),
                    ..Default::default()
                };
            }
        };

        let description = audit::build_description(
            &record.requester_id,
            &record.resource_requested,
            record.channel_ref.as_deref().unwrap_or("-"),
            record.thread_ref.as_deref().unwrap_or("-"),
            &approvers,
        );
        if let Err(e) = self.tracker.update_description(ticket_ref, &description).await {
            return StateDelta::failure(format!("approval_ops: audit trail update failed: {}", e));
        }

        let link = record
            .ticket_link
            .clone()
            .unwrap_or_else(|| ticket_ref.clone());
        let subject = format!("Access Request: {}", ticket_ref);
        let body = format!(
            "Please review and approve the access request for {}:\n{}\nTo approve, please add a comment containing the word 'Approved' on the ticket.",
            record.requester_id, link
        );
        for approver in &approvers {
            if let Err(e) = self.mail.send(approver, &subject, &body).await {
                return StateDelta::failure(format!(
                    "approval_ops: notify {} failed: {}",
                    approver, e
                ));
            }
        }

        log::info!(
            "Notified {} approver(s) for {}",
            approvers.len(),
            ticket_ref
        );
        let mut delta = StateDelta::note(format!(
            "approval_ops: notified {}",
            approvers.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
        delta.required_approvers = Some(approvers);
        delta.approval_status = Some(ApprovalStatus::Pending);
        delta.last_check_time = Some(Utc::now());
        StepTracker::mark_step(&mut delta, StepTag::ApproversNotified);
        delta
    }

    /// Subsequent entries: scan the ticket's comments for new approvals.
    async fn poll_approvals(&self, record: &WorkflowRecord) -> StateDelta {
        let Some(ticket_ref) = &record.ticket_ref else {
            return StateDelta::failure("approval_ops: no ticket to scan");
        };

        let scan = match self
            .resolver
            .check_approvals(self.tracker.as_ref(), ticket_ref, &record.required_approvers)
            .await
        {
            Ok(scan) => scan,
            Err(e) => return StateDelta::failure(format!("approval_ops: scan failed: {}", e)),
        };

        let mut delta = if scan.fully_approved {
            let mut delta = StateDelta::note(format!("approval_ops: {} fully approved", ticket_ref));
            delta.approval_status = Some(ApprovalStatus::Approved);
            delta
        } else {
            StateDelta::note(format!(
                "approval_ops: {} still pending ({} of {} approvals)",
                ticket_ref,
                scan.approved_by.len(),
                record.required_approvers.len()
            ))
        };
        delta.approved_by = scan.approved_by;
        delta.last_check_time = Some(Utc::now());
        delta
    }
}

#[async_trait]
impl AgentNode for ApprovalOpsNode {
    fn name(&self) -> &str {
        "approval_ops"
    }

    async fn execute(&self, record: &WorkflowRecord) -> StateDelta {
        if StepTracker::has_step(record, StepTag::ApproversNotified) {
            self.poll_approvals(record).await
        } else {
            self.notify_approvers(record).await
        }
    }
}
