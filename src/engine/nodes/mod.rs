// SPDX-License-Identifier: MIT

//! Capability-scoped executors.
//!
//! Each node sees the current record, re-checks the step tracker before any
//! externally visible effect, and reports a [`StateDelta`]. Failures become
//! error deltas, never panics or raised errors; the router decides what
//! happens next cycle.

mod approval_ops;
mod communication;
mod provisioning;
mod ticketing;

pub use approval_ops::ApprovalOpsNode;
pub use communication::CommunicationNode;
pub use provisioning::ProvisioningNode;
pub use ticketing::TicketingNode;

use super::record::{StateDelta, WorkflowRecord};
use async_trait::async_trait;

#[async_trait]
pub trait AgentNode: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, record: &WorkflowRecord) -> StateDelta;
}
