//! Per-batch retry decisions, kept free of I/O so the transition table is
//! checkable in isolation; the orchestrator executes whatever is decided.

use std::fmt;
use std::time::Duration;

use crate::chain::SubmitError;

/// Why a batch attempt did not reach confirmation.
#[derive(Debug)]
pub enum BatchFailure {
    /// The endpoint rejected the submission outright.
    Submit(SubmitError),
    /// A receipt arrived but execution failed on chain.
    Reverted,
    /// No receipt within the confirmation window; the transaction may still land.
    Unconfirmed,
    /// The endpoint broke mid-attempt (status lookup failed, etc).
    Endpoint(String),
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchFailure::Submit(err) => write!(f, "{err}"),
            BatchFailure::Reverted => write!(f, "transaction reverted"),
            BatchFailure::Unconfirmed => write!(f, "transaction unconfirmed within the wait window"),
            BatchFailure::Endpoint(msg) => write!(f, "endpoint error: {msg}"),
        }
    }
}

/// What the orchestrator should do next with the same batch.
#[derive(Debug, PartialEq, Eq)]
pub enum Next {
    /// Re-sync the nonce cursor from the endpoint and resubmit immediately;
    /// the renewed nonce implies the previous attempt is dead.
    RefreshNonce,
    /// Sleep, then resubmit with an escalated fee quote.
    Backoff(Duration),
    /// Stop: the batch cannot be delivered.
    Fatal(FatalKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    /// The operator wallet cannot pay for gas; retrying cannot help.
    OperatorFunds,
    /// The attempt budget is spent.
    AttemptsExhausted,
}

pub struct RetryController {
    max_attempts: u32,
    backoff_step: Duration,
    attempt: u32,
}

impl RetryController {
    pub fn new(max_attempts: u32, backoff_step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_step,
            attempt: 0,
        }
    }

    /// 0-based index of the attempt currently in flight; feeds fee escalation.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn after_failure(&mut self, failure: &BatchFailure) -> Next {
        if matches!(failure, BatchFailure::Submit(SubmitError::InsufficientFunds(_))) {
            return Next::Fatal(FatalKind::OperatorFunds);
        }
        self.attempt += 1;
        if self.attempt >= self.max_attempts {
            return Next::Fatal(FatalKind::AttemptsExhausted);
        }
        match failure {
            BatchFailure::Submit(SubmitError::NonceConflict(_))
            | BatchFailure::Submit(SubmitError::Underpriced(_)) => Next::RefreshNonce,
            _ => Next::Backoff(self.backoff_step * self.attempt),
        }
    }
}
