// SPDX-License-Identifier: MIT

//! Typed error handling for accessflow
//!
//! One taxonomy for the whole crate: port failures, oracle misbehavior,
//! approval-resolution failures, mapping reconstruction, and the loop
//! safety valve all live here so nodes and the router can classify them
//! uniformly.

use thiserror::Error;

/// Top-level error type for accessflow
#[derive(Debug, Error)]
pub enum FlowError {
    /// An external call through a capability port failed (Slack, Jira, mail, provisioner)
    #[error("{provider} port failure: {message}")]
    Port { provider: String, message: String },

    /// The decision oracle returned a label outside the routing enum
    #[error("oracle returned invalid route label: '{0}'")]
    OracleInvalidOutput(String),

    /// The decision oracle refused due to a content policy filter
    #[error("oracle refused by content policy: {0}")]
    ContentPolicyRejection(String),

    /// Hierarchy lookup produced no approvers and no fallback is configured
    #[error("no approvers found for requester '{0}'")]
    NoApproversFound(String),

    /// A webhook could not find or rebuild a conversation mapping
    #[error("could not reconstruct workflow mapping: {0}")]
    MappingReconstruction(String),

    /// The router hit its iteration cap (safety abort, not a bug)
    #[error("loop limit reached after {0} iterations")]
    LoopLimitReached(u32),

    /// Configuration errors (missing env vars, unreadable hierarchy file)
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper for compatibility
    #[error("{0}")]
    Other(String),
}

impl FlowError {
    /// Create a port failure error
    pub fn port(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Port {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<&str> for FlowError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for FlowError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
