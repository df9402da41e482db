// SPDX-License-Identifier: MIT

//! Engine-level settings loaded from the environment.
//!
//! Port clients read their own credentials in their constructors; this is
//! only the knobs the orchestration engine itself needs.

use std::env;
use std::time::Duration;

/// Runtime settings for the workflow engine
#[derive(Debug, Clone)]
pub struct Settings {
    /// Issue-tracker project new tickets are filed under
    pub tracker_project: String,
    /// Path to the approval hierarchy file (JSON or YAML)
    pub hierarchy_path: String,
    /// Minimum gap between approval polls for one workflow
    pub poll_interval: Duration,
    /// Router iteration cap before approvals are in play
    pub cap_simple: u32,
    /// Router iteration cap once the approval/provisioning loop is active
    pub cap_full: u32,
    /// Model name for the decision oracle
    pub oracle_model: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            tracker_project: env::var("TRACKER_PROJECT_KEY").unwrap_or_else(|_| "OPS".to_string()),
            hierarchy_path: env::var("APPROVAL_HIERARCHY_PATH")
                .unwrap_or_else(|_| "approval_hierarchy.json".to_string()),
            poll_interval: Duration::from_secs(
                env::var("APPROVAL_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
            cap_simple: env::var("ROUTER_CAP_SIMPLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            cap_full: env::var("ROUTER_CAP_FULL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            oracle_model: env::var("ORACLE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tracker_project: "OPS".to_string(),
            hierarchy_path: "approval_hierarchy.json".to_string(),
            poll_interval: Duration::from_secs(60),
            cap_simple: 5,
            cap_full: 8,
            oracle_model: "gpt-4o-mini".to_string(),
        }
    }
}
