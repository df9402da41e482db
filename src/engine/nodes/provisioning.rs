// SPDX-License-Identifier: MIT

//! Grant application. Runs only once the approval chain has signed off.

use crate::engine::record::{ApprovalStatus, StateDelta, WorkflowRecord};
use crate::engine::steps::{StepTag, StepTracker};
use crate::ports::{GrantSpec, ProvisionOutcome, ProvisioningPort};
use async_trait::async_trait;
use std::sync::Arc;

use super::AgentNode;

pub struct ProvisioningNode {
    provisioner: Arc<dyn ProvisioningPort>,
}

impl ProvisioningNode {
    pub fn new(provisioner: Arc<dyn ProvisioningPort>) -> Self {
        Self { provisioner }
    }
}

#[async_trait]
impl AgentNode for ProvisioningNode {
    fn name(&self) -> &str {
        "provisioning"
    }

    async fn execute(&self, record: &WorkflowRecord) -> StateDelta {
        if record.approval_status != ApprovalStatus::Approved {
            // Guard against a mis-route; granting before sign-off is the one
            // mistake this system exists to prevent.
            return StateDelta::failure(format!(
                "provisioning: refused, approval status is {:?}",
                record.approval_status
            ));
        }
        if StepTracker::has_step(record, StepTag::GrantApplied) {
            return StateDelta::note("provisioning: skipped, grant already applied");
        }

        let spec = GrantSpec {
            requester_id: record.requester_id.clone(),
            resource: record.resource_requested.clone(),
            ticket_ref: record.ticket_ref.clone().unwrap_or_default(),
        };

        match self.provisioner.apply(&spec).await {
            Ok(ProvisionOutcome::Applied { resource_ids }) => {
                log::info!(
                    "Granted {} to {} ({} resource(s))",
                    record.resource_requested,
                    record.requester_id,
                    resource_ids.len()
                );
                let mut delta = StateDelta::note(format!(
                    "provisioning: granted, resources [{}]",
                    resource_ids.join(", ")
                ));
                delta.resource_ids = resource_ids;
                StepTracker::mark_step(&mut delta, StepTag::GrantApplied);
                delta
            }
            Ok(ProvisionOutcome::NeedsInfo { reason }) => {
                let mut delta =
                    StateDelta::note(format!("provisioning: needs info: {}", reason));
                delta.needs_info = Some(reason);
                delta
            }
            Err(e) => StateDelta::failure(format!("provisioning: apply failed: {}", e)),
        }
    }
}
