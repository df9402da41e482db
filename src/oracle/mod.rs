// SPDX-License-Identifier: MIT

//! Decision oracle seam.
//!
//! The router's non-deterministic choices go through [`DecisionOracle`],
//! a black-box classifier over a fixed label set. Production uses the
//! LLM-backed [`llm::ChatOracle`]; tests substitute scripted stubs.

pub mod llm;
pub mod prompt;

use crate::error::FlowError;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

/// The enumerated routing labels the oracle may return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteLabel {
    Communication,
    Ticketing,
    ApprovalOps,
    Provisioning,
    End,
}

impl RouteLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteLabel::Communication => "COMMUNICATION",
            RouteLabel::Ticketing => "TICKETING",
            RouteLabel::ApprovalOps => "APPROVALOPS",
            RouteLabel::Provisioning => "PROVISIONING",
            RouteLabel::End => "END",
        }
    }
}

impl fmt::Display for RouteLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteLabel {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches(|c| c == '"' || c == '\'' || c == '.').to_uppercase().as_str() {
            "COMMUNICATION" => Ok(RouteLabel::Communication),
            "TICKETING" => Ok(RouteLabel::Ticketing),
            "APPROVALOPS" => Ok(RouteLabel::ApprovalOps),
            "PROVISIONING" => Ok(RouteLabel::Provisioning),
            "END" => Ok(RouteLabel::End),
            other => Err(FlowError::OracleInvalidOutput(other.to_string())),
        }
    }
}

/// Black-box routing classifier. Returns the raw label text; the router
/// validates it against [`RouteLabel`] and owns the retry policy.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(&self, context: &str) -> Result<String, FlowError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parsing_case_insensitive() {
        assert_eq!(
            "communication".parse::<RouteLabel>().unwrap(),
            RouteLabel::Communication
        );
        assert_eq!(
            " ApprovalOps ".parse::<RouteLabel>().unwrap(),
            RouteLabel::ApprovalOps
        );
        assert_eq!("END".parse::<RouteLabel>().unwrap(), RouteLabel::End);
    }

    #[test]
    fn test_label_parsing_strips_quotes() {
        assert_eq!(
            "\"TICKETING\"".parse::<RouteLabel>().unwrap(),
            RouteLabel::Ticketing
        );
        assert_eq!("END.".parse::<RouteLabel>().unwrap(), RouteLabel::End);
    }

    #[test]
    fn test_invalid_label_rejected() {
        let err = "SlackAgent".parse::<RouteLabel>().unwrap_err();
        assert!(matches!(err, FlowError::OracleInvalidOutput(_)));
    }
}
