// SPDX-License-Identifier: MIT

//! Ticket lifecycle: idempotent creation, close + final comment.

use crate::engine::audit;
use crate::engine::record::{ApprovalStatus, StateDelta, TicketStatus, WorkflowRecord};
use crate::engine::steps::{StepTag, StepTracker};
use crate::ports::IssueTrackerPort;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::AgentNode;

const CLOSE_COMMENT: &str = "✅ All approvals received. Access granted. Closing ticket.";

pub struct TicketingNode {
    tracker: Arc<dyn IssueTrackerPort>,
    project: String,
}

impl TicketingNode {
    pub fn new(tracker: Arc<dyn IssueTrackerPort>, project: impl Into<String>) -> Self {
        Self {
            tracker,
            project: project.into(),
        }
    }

    async fn create_ticket(&self, record: &WorkflowRecord) -> StateDelta {
        // Idempotency: the conversation -> ticket lookup is the record itself.
        if let Some(ticket_ref) = &record.ticket_ref {
            let link = record.ticket_link.clone().unwrap_or_default();
            log::info!(
                "Ticket {} already exists for {}",
                ticket_ref,
                record.conversation_key
            );
            return StateDelta::note(format!("ticketing: already_exists {} {}", ticket_ref, link));
        }

        let summary = format!(
            "Grant {} access to {}",
            record.resource_requested, record.requester_id
        );
        let description = audit::build_description(
            &record.requester_id,
            &record.resource_requested,
            record.channel_ref.as_deref().unwrap_or("-"),
            record.thread_ref.as_deref().unwrap_or("-"),
            &BTreeSet::new(),
        );

        match self
            .tracker
            .create(&self.project, &summary, &description)
            .await
        {
            Ok(info) => {
                let mut delta = StateDelta::note(format!(
                    "ticketing: created {} ({})",
                    info.ticket_ref, info.link
                ));
                delta.ticket_ref = Some(info.ticket_ref);
                delta.ticket_link = Some(info.link);
                StepTracker::mark_step(&mut delta, StepTag::TicketCreated);
                delta
            }
            Err(e) => StateDelta::failure(format!("ticketing: create failed: {}", e)),
        }
    }

    async fn close_ticket(&self, record: &WorkflowRecord) -> StateDelta {
        if StepTracker::has_step(record, StepTag::GrantClosed) {
            return StateDelta::note("ticketing: skipped, already closed");
        }
        let Some(ticket_ref) = &record.ticket_ref else {
            return StateDelta::failure("ticketing: approved workflow has no ticket to close");
        };

        if let Err(e) = self.tracker.add_comment(ticket_ref, CLOSE_COMMENT).await {
            return StateDelta::failure(format!("ticketing: close comment failed: {}", e));
        }
        if let Err(e) = self.tracker.transition(ticket_ref, "Done").await {
            return StateDelta::failure(format!("ticketing: transition failed: {}", e));
        }

        let mut delta = StateDelta::note(format!("ticketing: closed {}", ticket_ref));
        delta.ticket_status = Some(TicketStatus::Closed);
        StepTracker::mark_step(&mut delta, StepTag::GrantClosed);
        delta
    }
}

#[async_trait]
impl AgentNode for TicketingNode {
    fn name(&self) -> &str {
        "ticketing"
    }

    async fn execute(&self, record: &WorkflowRecord) -> StateDelta {
        if record.approval_status == ApprovalStatus::Approved
            && record.ticket_status == TicketStatus::Open
        {
            self.close_ticket(record).await
        } else {
            self.create_ticket(record).await
        }
    }
}
