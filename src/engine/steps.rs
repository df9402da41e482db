// SPDX-License-Identifier: MIT

//! Step-tag vocabulary and the idempotency guard built on it.
//!
//! Every externally visible effect has exactly one enumerated tag. Nodes
//! check `has_step` before acting and mark the tag only after the effect
//! succeeded, so re-entering a workflow never repeats a side effect.

use super::record::{StateDelta, WorkflowRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Enumerated markers for completed externally visible actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepTag {
    AckSent,
    TicketCreated,
    ApproversNotified,
    GrantApplied,
    InfoRequested,
    GrantClosed,
    FinalNotified,
}

impl StepTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepTag::AckSent => "ack_sent",
            StepTag::TicketCreated => "ticket_created",
            StepTag::ApproversNotified => "approvers_notified",
            StepTag::GrantApplied => "grant_applied",
            StepTag::InfoRequested => "info_requested",
            StepTag::GrantClosed => "grant_closed",
            StepTag::FinalNotified => "final_notified",
        }
    }
}

impl fmt::Display for StepTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Idempotency guard over `WorkflowRecord::steps_completed`
pub struct StepTracker;

impl StepTracker {
    pub fn has_step(record: &WorkflowRecord, tag: StepTag) -> bool {
        record.steps_completed.contains(&tag)
    }

    /// Mark a step as done. Only call this after the effect succeeded.
    pub fn mark_step(delta: &mut StateDelta, tag: StepTag) {
        delta.steps_completed.push(tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_step_reflects_record() {
        let mut record = WorkflowRecord::new("conv:T1", "alice@co", "prod-db access");
        assert!(!StepTracker::has_step(&record, StepTag::AckSent));

        record.steps_completed.insert(StepTag::AckSent);
        assert!(StepTracker::has_step(&record, StepTag::AckSent));
        assert!(!StepTracker::has_step(&record, StepTag::TicketCreated));
    }

    #[test]
    fn test_mark_step_collects_into_delta() {
        let mut delta = StateDelta::default();
        StepTracker::mark_step(&mut delta, StepTag::TicketCreated);
        StepTracker::mark_step(&mut delta, StepTag::AckSent);
        assert_eq!(
            delta.steps_completed,
            vec![StepTag::TicketCreated, StepTag::AckSent]
        );
    }
}
