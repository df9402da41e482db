// SPDX-License-Identifier: MIT

//! Event intake: turns chat mentions, tracker webhooks, and timer ticks
//! into router runs.
//!
//! The gateway owns conversation keying and the reconstruction path. A
//! webhook for a ticket the store has never seen is not an error: the
//! durable mapping lives in the ticket's audit-trail description, and the
//! gateway rebuilds the workflow from it before routing.

use crate::engine::audit;
use crate::engine::record::{ApprovalStatus, WorkflowRecord};
use crate::engine::router::{Router, Trigger};
use crate::engine::steps::StepTag;
use crate::error::FlowError;
use crate::ports::{CommunicationPort, IssueTrackerPort};
use std::sync::Arc;

/// Tracker webhook event names that mean "a comment or update arrived"
const TICKET_EVENTS: [&str; 3] = ["comment_created", "jira:issue_updated", "issue_commented"];

/// What the gateway did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// A new workflow was created and a run dispatched
    Started,
    /// An existing or reconstructed workflow was resumed
    Resumed,
    /// The event is not one this system reacts to
    Ignored,
}

pub struct ResumptionGateway {
    router: Arc<Router>,
    tracker: Arc<dyn IssueTrackerPort>,
    chat: Arc<dyn CommunicationPort>,
}

impl ResumptionGateway {
    pub fn new(
        router: Arc<Router>,
        tracker: Arc<dyn IssueTrackerPort>,
        chat: Arc<dyn CommunicationPort>,
    ) -> Self {
        Self {
            router,
            tracker,
            chat,
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// A new mention in chat. Keyed by thread so every message in the same
    /// thread lands on the same workflow; creation happens at most once.
    pub async fn handle_chat_mention(
        &self,
        channel: &str,
        thread: &str,
        user: &str,
        text: &str,
    ) -> Result<GatewayOutcome, FlowError> {
        let key = conversation_key(thread);
        let request = extract_request_text(text);
        let existed = self.router.store().get(&key).await.is_some();

        // The hierarchy is keyed by email; fall back to the chat id when the
        // directory lookup fails rather than dropping the request.
        let requester = match self.chat.user_identity(user).await {
            Ok(identity) => identity,
            Err(e) => {
                log::warn!("Identity lookup failed for {}: {}", user, e);
                user.to_string()
            }
        };

        let record = WorkflowRecord::new(&key, &requester, &request).with_thread(channel, thread);
        self.router.store().create_if_absent(record).await;

        let router = self.router.clone();
        let run_key = key.clone();
        tokio::spawn(async move {
            router.run(&run_key, Trigger::ChatMention).await;
        });

        Ok(if existed {
            GatewayOutcome::Resumed
        } else {
            GatewayOutcome::Started
        })
    }

    /// A tracker webhook. Unknown tickets are rebuilt from the audit trail;
    /// tickets this system never created stay untouched.
    pub async fn handle_ticket_event(
        &self,
        event_name: &str,
        ticket_ref: &str,
        comment_author: &str,
        comment_body: &str,
    ) -> Result<GatewayOutcome, FlowError> {
        if !TICKET_EVENTS.contains(&event_name) {
            log::debug!("Ignoring tracker event '{}'", event_name);
            return Ok(GatewayOutcome::Ignored);
        }

        let key = match self.router.store().key_for_ticket(ticket_ref).await {
            Some(key) => key,
            None => self.reconstruct(ticket_ref).await?,
        };

        let trigger = Trigger::TicketComment {
            author: comment_author.to_string(),
            body: comment_body.to_string(),
        };
        let router = self.router.clone();
        let run_key = key.clone();
        tokio::spawn(async move {
            router.run(&run_key, trigger).await;
        });

        Ok(GatewayOutcome::Resumed)
    }

    /// Poller entry: re-check every workflow waiting on approvals.
    pub async fn poll_tick(&self) {
        let keys = self.router.store().pending_keys().await;
        if keys.is_empty() {
            return;
        }
        log::info!("Poll tick | {} workflow(s) pending approval", keys.len());
        for key in keys {
            self.router.run(&key, Trigger::TimerTick).await;
        }
    }

    /// Rebuild a workflow for a ticket the store has no entry for. Reads the
    /// ticket, parses its audit-trail description, and seeds a record that
    /// already carries the steps a created-and-notified ticket implies. A
    /// missing or unparsable trail degrades to a ticket-scoped workflow
    /// rather than dropping the event.
    async fn reconstruct(&self, ticket_ref: &str) -> Result<String, FlowError> {
        let snapshot = self.tracker.get(ticket_ref).await?;

        let (key, mut record) = match audit::parse_description(&snapshot.description) {
            Ok(fields) => {
                let key = conversation_key(&fields.thread_ref);
                let mut record =
                    WorkflowRecord::new(&key, &fields.requester_id, &fields.resource_requested)
                        .with_thread(&fields.channel_ref, &fields.thread_ref);
                record.required_approvers = fields.required_approvers;
                (key, record)
            }
            Err(e) => {
                log::warn!(
                    "Audit trail unusable for {}; falling back to ticket scope: {}",
                    ticket_ref,
                    e
                );
                let key = ticket_key(ticket_ref);
                (key.clone(), WorkflowRecord::new(&key, "unknown", "unknown"))
            }
        };

        record.ticket_ref = Some(ticket_ref.to_string());
        record.approval_status = ApprovalStatus::Pending;
        record.steps_completed.insert(StepTag::AckSent);
        record.steps_completed.insert(StepTag::TicketCreated);
        record.steps_completed.insert(StepTag::ApproversNotified);
        record.push_history(format!("gateway: rebuilt from ticket {}", ticket_ref));

        log::info!("Rebuilt workflow {} from ticket {}", key, ticket_ref);
        self.router.store().create_if_absent(record).await;
        self.router.store().register_ticket(ticket_ref, &key).await;
        Ok(key)
    }
}

pub fn conversation_key(thread: &str) -> String {
    format!("conv:{}", thread)
}

pub fn ticket_key(ticket_ref: &str) -> String {
    format!("ticket:{}", ticket_ref)
}

/// Strip bot-mention tokens like `<@U12345>` from the message text.
pub fn extract_request_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<@") {
        out.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
