// SPDX-License-Identifier: MIT

//! Chat-thread notifications: acknowledgement, needs-info relay, final
//! confirmation. One message per step tag, never resent.

use crate::engine::record::{StateDelta, TicketStatus, WorkflowRecord};
use crate::engine::steps::{StepTag, StepTracker};
use crate::error::FlowError;
use crate::ports::CommunicationPort;
use async_trait::async_trait;
use std::sync::Arc;

use super::AgentNode;

pub struct CommunicationNode {
    chat: Arc<dyn CommunicationPort>,
}

impl CommunicationNode {
    pub fn new(chat: Arc<dyn CommunicationPort>) -> Self {
        Self { chat }
    }

    /// Ad-hoc delivery for router-originated messages (loop-limit notice,
    /// content-policy apology, fatal failures). Not step-guarded; callers
    /// own the send-once discipline.
    pub async fn notify(&self, record: &WorkflowRecord, text: &str) -> Result<(), FlowError> {
        match (&record.channel_ref, &record.thread_ref) {
            (Some(channel), Some(thread)) => self.chat.send(channel, thread, text).await,
            _ => {
                log::warn!(
                    "No chat context for {}; dropping notice: {}",
                    record.conversation_key,
                    text
                );
                Ok(())
            }
        }
    }

    fn pick_message(&self, record: &WorkflowRecord) -> Option<(StepTag, String)> {
        if record.ticket_status == TicketStatus::Closed
            && !StepTracker::has_step(record, StepTag::FinalNotified)
        {
            let link = record
                .ticket_link
                .clone()
                .or_else(|| record.ticket_ref.clone())
                .unwrap_or_else(|| "your request".to_string());
            return Some((
                StepTag::FinalNotified,
                format!(
                    "🚀 The access request in ticket {} has been fully approved and the ticket is now closed!",
                    link
                ),
            ));
        }

        if let Some(reason) = &record.needs_info {
            if !StepTracker::has_step(record, StepTag::InfoRequested) {
                return Some((
                    StepTag::InfoRequested,
                    format!(
                        "Your request for {} is approved but provisioning needs more information: {}. Please reply on the ticket.",
                        record.resource_requested, reason
                    ),
                ));
            }
        }

        if !StepTracker::has_step(record, StepTag::AckSent) {
            return Some((
                StepTag::AckSent,
                format!(
                    "Got it! I'm processing your access request for {}. I'll open a tracking ticket and loop in your approvers.",
                    record.resource_requested
                ),
            ));
        }

        None
    }
}

#[async_trait]
impl AgentNode for CommunicationNode {
    fn name(&self) -> &str {
        "communication"
    }

    async fn execute(&self, record: &WorkflowRecord) -> StateDelta {
        let Some((tag, text)) = self.pick_message(record) else {
            return StateDelta::note("communication: skipped, already done");
        };

        match (&record.channel_ref, &record.thread_ref) {
            (Some(channel), Some(thread)) => {
                match self.chat.send(channel, thread, &text).await {
                    Ok(()) => {
                        let mut delta = StateDelta::note(format!("communication: sent {}", tag));
                        StepTracker::mark_step(&mut delta, tag);
                        delta
                    }
                    Err(e) => StateDelta::failure(format!("communication: send failed: {}", e)),
                }
            }
            _ => {
                // Ticket-scoped workflow (reconstruction without chat context):
                // record the step so the workflow can still reach cleanup.
                let mut delta = StateDelta::note(format!(
                    "communication: no chat context, {} recorded without delivery",
                    tag
                ));
                StepTracker::mark_step(&mut delta, tag);
                delta
            }
        }
    }
}
