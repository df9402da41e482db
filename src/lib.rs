// SPDX-License-Identifier: MIT

//! accessflow: IT access-request approval workflow orchestration.
//!
//! A chat mention becomes a tracked ticket, approvers are resolved and
//! notified, approvals arrive as ticket comments, and the grant is applied
//! and closed out. Workflow state survives across the asynchronous triggers
//! (webhooks, timer polls) that drive it.

pub mod config;
pub mod engine;
pub mod error;
pub mod oracle;
pub mod ports;
pub mod server;
