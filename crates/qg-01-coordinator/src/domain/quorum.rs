//! # Quorum Policy
//!
//! A fixed absolute-count gate: a request is compliant once `threshold`
//! valid responses have been seen, and non-compliant if the response stream
//! ends first. Negative responses never count and never reject early.
//!
//! Responses that carry a `responder_id` are counted at most once per
//! responder. Anonymous responses cannot be told apart from one another, so
//! each one counts.

use shared_types::TransactionResponse;
use std::collections::HashSet;

/// Final decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Compliant,
    NonCompliant,
}

impl Verdict {
    #[must_use]
    pub fn is_compliant(self) -> bool {
        matches!(self, Verdict::Compliant)
    }
}

/// Effect of recording one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyUpdate {
    /// A valid response was counted; the quorum is not reached yet.
    Counted { valid: usize },
    /// This response brought the valid count to the threshold.
    QuorumReached { valid: usize },
    /// A negative response; noted but not counted.
    Rejected,
    /// A second response from a responder already heard from.
    Duplicate,
}

/// Running count of valid responses for one request.
///
/// The valid count never decreases and only grows on `is_valid == true`.
#[derive(Debug, Clone)]
pub struct QuorumTally {
    threshold: usize,
    valid: usize,
    invalid: usize,
    duplicates: usize,
    responders: HashSet<String>,
}

impl QuorumTally {
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            valid: 0,
            invalid: 0,
            duplicates: 0,
            responders: HashSet::new(),
        }
    }

    /// Record one response.
    pub fn record(&mut self, response: &TransactionResponse) -> TallyUpdate {
        if let Some(responder) = &response.responder_id {
            if !self.responders.insert(responder.clone()) {
                self.duplicates += 1;
                return TallyUpdate::Duplicate;
            }
        }

        if !response.is_valid {
            self.invalid += 1;
            return TallyUpdate::Rejected;
        }

        self.valid += 1;
        if self.valid == self.threshold {
            TallyUpdate::QuorumReached { valid: self.valid }
        } else {
            TallyUpdate::Counted { valid: self.valid }
        }
    }

    #[must_use]
    pub fn is_reached(&self) -> bool {
        self.valid >= self.threshold
    }

    /// Verdict if the stream ended now.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if self.is_reached() {
            Verdict::Compliant
        } else {
            Verdict::NonCompliant
        }
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.valid
    }

    #[must_use]
    pub fn invalid_count(&self) -> usize {
        self.invalid
    }

    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.duplicates
    }
}

/// Evaluate a finite response stream against `threshold`.
///
/// Stops consuming the stream as soon as the quorum is reached.
pub fn evaluate<I>(responses: I, threshold: usize) -> Verdict
where
    I: IntoIterator<Item = TransactionResponse>,
{
    let mut tally = QuorumTally::new(threshold);
    if tally.is_reached() {
        return Verdict::Compliant;
    }
    for response in responses {
        tally.record(&response);
        if tally.is_reached() {
            return Verdict::Compliant;
        }
    }
    Verdict::NonCompliant
}
