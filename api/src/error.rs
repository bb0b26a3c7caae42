use thiserror::Error;

use crate::state::ActionKind;

/// Reasons an action did not complete. Everything below the loop driver is
/// converted into one of these; none of them terminates the process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Hotkey {0} is not registered on the subnet")]
    NotRegistered(String),
    #[error("Hotkey {0} does not hold a validator permit")]
    NoPermit(String),
    #[error("Nothing to move from {0}; balance is zero")]
    ZeroBalanceSkip(String),
    #[error("Chain query failed: {0}")]
    QueryFailed(String),
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),
    #[error("Timed out waiting for confirmation")]
    ConfirmationTimeout,
    #[error("Shutdown requested before confirmation")]
    Shutdown,
}

impl ActionError {
    /// Pre-condition failures are skips, not errors.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ActionError::NotRegistered(_) | ActionError::NoPermit(_) | ActionError::ZeroBalanceSkip(_)
        )
    }

    /// Transient failures are retried inside the slot, then deferred.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ActionError::QueryFailed(_) | ActionError::SubmissionFailed(_) | ActionError::ConfirmationTimeout
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionError::NotRegistered(_) => "not_registered",
            ActionError::NoPermit(_) => "no_permit",
            ActionError::ZeroBalanceSkip(_) => "zero_balance",
            ActionError::QueryFailed(_) => "query_failed",
            ActionError::SubmissionFailed(_) => "submission_failed",
            ActionError::ConfirmationTimeout => "confirmation_timeout",
            ActionError::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("Slot for {kind} already reserved at key {key}")]
    DoubleReservation { kind: ActionKind, key: u64 },
    #[error("Initial {0} already claimed")]
    InitialAlreadyClaimed(ActionKind),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy() {
        assert!(ActionError::ZeroBalanceSkip("x".into()).is_precondition());
        assert!(!ActionError::ZeroBalanceSkip("x".into()).is_transient());
        assert!(ActionError::ConfirmationTimeout.is_transient());
        assert!(!ActionError::Shutdown.is_transient());
        assert!(!ActionError::Shutdown.is_precondition());
    }
}
