// SPDX-License-Identifier: MIT

//! The orchestration loop.
//!
//! One `run` processes one trigger for one conversation, end to end, while
//! holding that conversation's store lock so webhook and timer re-entries
//! never interleave. Each cycle picks the next node, applies its delta, and
//! re-reads state; the cycle cap is the safety valve that bounds every run
//! regardless of what the oracle returns. The cap budget is per run, so a
//! workflow that legitimately waits across many triggers never exhausts it;
//! the record's cumulative `iterations` count is never reset.

use crate::engine::nodes::{
    AgentNode, ApprovalOpsNode, CommunicationNode, ProvisioningNode, TicketingNode,
};
use crate::engine::record::{ApprovalStatus, TicketStatus, WorkflowRecord};
use crate::engine::steps::{StepTag, StepTracker};
use crate::engine::store::WorkflowStore;
use crate::error::FlowError;
use crate::oracle::prompt::{ROUTING_RULES, ROUTING_SYSTEM_PROMPT};
use crate::oracle::{DecisionOracle, RouteLabel};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Attempts per cycle before an oracle answer counts as unusable
const ORACLE_ATTEMPTS: u32 = 3;

const APOLOGY_MESSAGE: &str = "I'm sorry, I can't help with that request. \
If you believe this is a legitimate access request, please contact IT support directly.";

#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    /// Per-run cycle cap when no approval loop is active
    pub cap_simple: u32,
    /// Per-run cycle cap once approvers are in the picture
    pub cap_full: u32,
    /// Minimum gap between approval scans for one workflow
    pub poll_interval: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cap_simple: 5,
            cap_full: 8,
            poll_interval: Duration::from_secs(60),
        }
    }
}

/// What woke the workflow up
#[derive(Debug, Clone)]
pub enum Trigger {
    ChatMention,
    TicketComment { author: String, body: String },
    TimerTick,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// Nothing left to do for this trigger
    Complete,
    /// Cycle cap hit; the workflow was torn down
    Aborted,
    /// Unrecoverable failure; the workflow was torn down
    Failed,
}

pub struct Router {
    store: WorkflowStore,
    oracle: Arc<dyn DecisionOracle>,
    config: RouterConfig,
    communication: CommunicationNode,
    ticketing: TicketingNode,
    approval_ops: ApprovalOpsNode,
    provisioning: ProvisioningNode,
}

impl Router {
    pub fn new(
        store: WorkflowStore,
        oracle: Arc<dyn DecisionOracle>,
        config: RouterConfig,
        communication: CommunicationNode,
        ticketing: TicketingNode,
        approval_ops: ApprovalOpsNode,
        provisioning: ProvisioningNode,
    ) -> Self {
        Self {
            store,
            oracle,
            config,
            communication,
            ticketing,
            approval_ops,
            provisioning,
        }
    }

    pub fn store(&self) -> &WorkflowStore {
        &self.store
    }

    /// Process one trigger for one conversation. Holds the per-key lock for
    /// the whole run.
    pub async fn run(&self, key: &str, trigger: Trigger) -> Terminal {
        let lock = self.store.lock_for(key).await;
        let _guard = lock.lock().await;

        log::info!("Run start | key: {} | trigger: {:?}", key, trigger);

        // A ticket comment after a needs-info stall is the missing input;
        // clear the stall so provisioning gets retried this run.
        if let Trigger::TicketComment { author, body } = &trigger {
            self.store
                .update(key, |r| {
                    if r.needs_info.take().is_some() {
                        r.push_history(format!(
                            "router: needs-info answered by {} ({})",
                            author,
                            body.chars().take(80).collect::<String>()
                        ));
                        r.steps_completed.remove(&StepTag::InfoRequested);
                    }
                })
                .await;
        }

        let mut apologized = false;
        // The cap budget belongs to this run; `record.iterations` keeps the
        // cumulative count across the workflow's whole life.
        let mut cycles: u32 = 0;

        loop {
            let Some(record) = self.store.get(key).await else {
                // Absent is a valid state: the workflow already finished.
                return Terminal::Complete;
            };

            // Terminal cleanup before the cap so a finished workflow resumed
            // by a late trigger never trips the safety valve.
            if record.ticket_status == TicketStatus::Closed
                && StepTracker::has_step(&record, StepTag::FinalNotified)
            {
                self.store.remove(key).await;
                log::info!("Run complete | key: {} | workflow finished", key);
                return Terminal::Complete;
            }

            let cap = self.cap_for(&record);
            if cycles >= cap {
                return self.abort(key, &record, cap).await;
            }

            let label = match self.decide(&record, &trigger, &mut apologized).await {
                Decision::Route(label) => label,
                Decision::Retry => {
                    cycles += 1;
                    self.store.update(key, |r| r.iterations += 1).await;
                    continue;
                }
            };

            if label == RouteLabel::End {
                log::info!("Run complete | key: {} | routed to END", key);
                return Terminal::Complete;
            }

            let node: &dyn AgentNode = match label {
                RouteLabel::Communication => &self.communication,
                RouteLabel::Ticketing => &self.ticketing,
                RouteLabel::ApprovalOps => &self.approval_ops,
                RouteLabel::Provisioning => &self.provisioning,
                RouteLabel::End => unreachable!(),
            };

            log::info!("Cycle {} | key: {} | node: {}", cycles + 1, key, node.name());
            let delta = node.execute(&record).await;

            if let Some(fatal) = &delta.fatal {
                log::error!("Run failed | key: {} | {}", key, fatal);
                let _ = self
                    .communication
                    .notify(
                        &record,
                        &format!(
                            "❌ I couldn't complete your access request: {}. Please contact IT support.",
                            fatal
                        ),
                    )
                    .await;
                self.store.remove(key).await;
                return Terminal::Failed;
            }

            let new_ticket = delta.ticket_ref.clone();
            let updated = self
                .store
                .update(key, |r| {
                    r.apply(&delta);
                    r.iterations += 1;
                })
                .await;
            cycles += 1;
            if let Some(ticket_ref) = new_ticket {
                self.store.register_ticket(&ticket_ref, key).await;
            }

            // Once approval ops leave the workflow pending, there is nothing
            // more this trigger can do; the next comment or poll resumes it.
            if label == RouteLabel::ApprovalOps {
                if let Some(r) = &updated {
                    if r.approval_status == ApprovalStatus::Pending {
                        log::info!("Run complete | key: {} | awaiting approvals", key);
                        return Terminal::Complete;
                    }
                }
            }
        }
    }

    fn cap_for(&self, record: &WorkflowRecord) -> u32 {
        // Waiting on humans takes more cycles than the straight-line path.
        if record.approval_status == ApprovalStatus::Unset
            && record.required_approvers.is_empty()
        {
            self.config.cap_simple
        } else {
            self.config.cap_full
        }
    }

    async fn abort(&self, key: &str, record: &WorkflowRecord, cap: u32) -> Terminal {
        let err = FlowError::LoopLimitReached(cap);
        log::warn!("Run aborted | key: {} | {}", key, err);
        let _ = self
            .communication
            .notify(
                record,
                &format!(
                    "⚠️ I stopped processing this request after {} steps without finishing. Please contact IT support{}.",
                    cap,
                    record
                        .ticket_ref
                        .as_ref()
                        .map(|t| format!(" and mention ticket {}", t))
                        .unwrap_or_default()
                ),
            )
            .await;
        // Tear down like the fatal path so the poller stops picking this
        // workflow up; a late approval comment can still rebuild it from the
        // ticket's audit trail.
        self.store.remove(key).await;
        Terminal::Aborted
    }

    /// Pick the next label: deterministic rules first, the oracle for the
    /// open-ended early routing.
    async fn decide(
        &self,
        record: &WorkflowRecord,
        trigger: &Trigger,
        apologized: &mut bool,
    ) -> Decision {
        if let Some(label) = deterministic_route(record, trigger, self.config.poll_interval) {
            return Decision::Route(label);
        }

        let context = self.build_context(record);
        for attempt in 1..=ORACLE_ATTEMPTS {
            match self.oracle.decide(&context).await {
                Ok(raw) => match raw.parse::<RouteLabel>() {
                    Ok(label) => return Decision::Route(label),
                    Err(e) => {
                        log::warn!(
                            "Oracle attempt {}/{} unusable: {}",
                            attempt,
                            ORACLE_ATTEMPTS,
                            e
                        );
                    }
                },
                Err(FlowError::ContentPolicyRejection(reason)) => {
                    log::warn!("Oracle content-policy rejection: {}", reason);
                    if !*apologized {
                        *apologized = true;
                        let _ = self.communication.notify(record, APOLOGY_MESSAGE).await;
                    }
                    // Consumes the cycle; a persistently refusing oracle is
                    // bounded by the cap like any other stuck run.
                    self.store
                        .update(&record.conversation_key, |r| {
                            r.push_history(
                                "router: request rejected by content policy".to_string(),
                            );
                        })
                        .await;
                    return Decision::Retry;
                }
                Err(e) => {
                    log::warn!(
                        "Oracle attempt {}/{} failed: {}",
                        attempt,
                        ORACLE_ATTEMPTS,
                        e
                    );
                }
            }
        }

        // Unusable answers still consume a cycle so the cap can fire.
        self.store
            .update(&record.conversation_key, |r| {
                r.push_history("router: oracle produced no usable label".to_string());
            })
            .await;
        Decision::Retry
    }

    fn build_context(&self, record: &WorkflowRecord) -> String {
        format!(
            "{}\n\nOriginal task: grant {} for {}\n\nCurrent state:\n- ticket: {}\n- approval status: {:?}\n- ticket status: {:?}\n\nRecent history:\n{}\n\n{}",
            ROUTING_SYSTEM_PROMPT,
            record.resource_requested,
            record.requester_id,
            record.ticket_ref.as_deref().unwrap_or("none"),
            record.approval_status,
            record.ticket_status,
            record.recent_history(10),
            ROUTING_RULES,
        )
    }
}

enum Decision {
    Route(RouteLabel),
    /// The cycle was consumed without a node run; loop again
    Retry,
}

/// Routing that never needs the oracle: post-approval mechanics and polls.
fn deterministic_route(
    record: &WorkflowRecord,
    trigger: &Trigger,
    poll_interval: Duration,
) -> Option<RouteLabel> {
    if record.ticket_status == TicketStatus::Closed
        && !StepTracker::has_step(record, StepTag::FinalNotified)
    {
        return Some(RouteLabel::Communication);
    }
    if record.needs_info.is_some() {
        if StepTracker::has_step(record, StepTag::InfoRequested) {
            // Already asked; nothing to do until the requester answers.
            return Some(RouteLabel::End);
        }
        return Some(RouteLabel::Communication);
    }
    if record.approval_status == ApprovalStatus::Approved {
        if !StepTracker::has_step(record, StepTag::GrantApplied) {
            return Some(RouteLabel::Provisioning);
        }
        if record.ticket_status == TicketStatus::Open {
            return Some(RouteLabel::Ticketing);
        }
    }
    if record.approval_status == ApprovalStatus::Pending {
        return match trigger {
            // A comment is new evidence and bypasses the poll gate.
            Trigger::TicketComment { .. } => Some(RouteLabel::ApprovalOps),
            Trigger::TimerTick => {
                let due = record.last_check_time.map_or(true, |t| {
                    Utc::now().signed_duration_since(t).num_seconds()
                        >= poll_interval.as_secs() as i64
                });
                Some(if due {
                    RouteLabel::ApprovalOps
                } else {
                    RouteLabel::End
                })
            }
            Trigger::ChatMention => Some(RouteLabel::End),
        };
    }
    None
}
