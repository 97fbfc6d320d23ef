//! Accept/revise/reject decisions for produced drafts.
//!
//! The revision counter is the only thing that bounds the revise loop. It is
//! incremented once per `ReviseAndRetry` verdict and never decremented.

use serde::{Deserialize, Serialize};

use crate::config::QualityConfig;

/// Outcome of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    ReviseAndRetry,
    RejectedFinal,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::ReviseAndRetry => write!(f, "revise_and_retry"),
            Self::RejectedFinal => write!(f, "rejected_final"),
        }
    }
}

/// Pure decision table. A NaN score never meets the threshold.
pub fn evaluate(score: f64, attempts: u32, max_attempts: u32, threshold: f64) -> Verdict {
    if score >= threshold {
        Verdict::Approved
    } else if attempts < max_attempts {
        Verdict::ReviseAndRetry
    } else {
        Verdict::RejectedFinal
    }
}

/// The decision table bound to a threshold and attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityGate {
    threshold: f64,
    max_attempts: u32,
}

impl QualityGate {
    pub fn new(threshold: f64, max_attempts: u32) -> Self {
        Self {
            threshold,
            max_attempts,
        }
    }

    pub fn from_config(config: &QualityConfig) -> Self {
        Self::new(config.min_score, config.max_revisions)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn evaluate(&self, score: f64, attempts: u32) -> Verdict {
        evaluate(score, attempts, self.max_attempts, self.threshold)
    }

    /// Evaluate and advance `attempts` on `ReviseAndRetry`.
    pub fn review(&self, score: f64, attempts: &mut u32) -> Verdict {
        let verdict = self.evaluate(score, *attempts);
        if verdict == Verdict::ReviseAndRetry {
            *attempts += 1;
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_score_with_budget_revises() {
        let gate = QualityGate::new(0.7, 2);
        let mut attempts = 0;
        assert_eq!(gate.review(0.42, &mut attempts), Verdict::ReviseAndRetry);
        assert_eq!(attempts, 1);
    }

    #[test]
    fn low_score_without_budget_rejects() {
        let gate = QualityGate::new(0.7, 2);
        let mut attempts = 2;
        assert_eq!(gate.review(0.42, &mut attempts), Verdict::RejectedFinal);
        assert_eq!(attempts, 2);
    }

    #[test]
    fn high_score_approves_regardless_of_attempts() {
        for attempts in [0, 1, 2, 10] {
            assert_eq!(evaluate(0.81, attempts, 2, 0.7), Verdict::Approved);
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(evaluate(0.7, 0, 2, 0.7), Verdict::Approved);
    }

    #[test]
    fn nan_never_approves() {
        assert_eq!(evaluate(f64::NAN, 0, 2, 0.7), Verdict::ReviseAndRetry);
        assert_eq!(evaluate(f64::NAN, 2, 2, 0.7), Verdict::RejectedFinal);
    }

    #[test]
    fn attempts_never_exceed_ceiling() {
        let gate = QualityGate::new(0.7, 3);
        let mut attempts = 0;
        let mut verdicts = Vec::new();
        loop {
            let verdict = gate.review(0.0, &mut attempts);
            verdicts.push(verdict);
            assert!(attempts <= gate.max_attempts());
            if verdict != Verdict::ReviseAndRetry {
                break;
            }
        }
        assert_eq!(verdicts.len(), 4);
        assert_eq!(verdicts.last(), Some(&Verdict::RejectedFinal));
    }

    #[test]
    fn verdict_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Verdict::ReviseAndRetry).unwrap(),
            "\"revise_and_retry\""
        );
        assert_eq!(Verdict::RejectedFinal.to_string(), "rejected_final");
    }
}
