//! Per-submission outcome.

use super::quorum::Verdict;
use shared_types::ComplianceResponse;
use std::time::Duration;

/// What happened to one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceReport {
    pub transaction_id: String,
    pub verdict: Verdict,
    /// Valid responses counted toward the quorum.
    pub valid_responses: usize,
    /// Negative responses received.
    pub invalid_responses: usize,
    /// Repeat responses from a responder already counted.
    pub duplicate_responses: usize,
    /// Payloads that failed to decode.
    pub malformed_responses: usize,
    /// Responses addressed to some other transaction.
    pub foreign_responses: usize,
    /// Time from submission to verdict.
    pub elapsed: Duration,
    /// Whether the deadline decided the verdict.
    pub timed_out: bool,
}

impl ComplianceReport {
    #[must_use]
    pub fn is_compliant(&self) -> bool {
        self.verdict.is_compliant()
    }

    /// Payload for the inbound caller.
    #[must_use]
    pub fn to_response(&self) -> ComplianceResponse {
        ComplianceResponse {
            is_compliant: self.is_compliant(),
        }
    }
}
