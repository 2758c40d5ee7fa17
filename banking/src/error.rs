//! Command handler errors.

use crate::types::ValidationError;
use ledger_outbox_core::event::EventError;
use ledger_outbox_core::persistence::PersistenceError;
use ledger_outbox_core::uow::UowError;
use thiserror::Error;

/// What went wrong while handling a command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandErrorKind {
    /// The command input was rejected before any write.
    #[error(transparent)]
    InvalidInput(#[from] ValidationError),

    /// Transaction boundary failure.
    #[error(transparent)]
    Uow(#[from] UowError),

    /// A repository write failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The domain event could not be built.
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Error returned by a command handler, tagged with the operation that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation}: {kind}")]
pub struct CommandError {
    /// Operation tag, e.g. `"Services.AccountService.CreateAccount"`.
    pub operation: &'static str,
    /// Underlying cause.
    #[source]
    pub kind: CommandErrorKind,
}

impl CommandError {
    /// Tag `kind` with `operation`.
    pub fn new(operation: &'static str, kind: impl Into<CommandErrorKind>) -> Self {
        Self { operation, kind: kind.into() }
    }

    /// Whether nothing was written because the input was invalid.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self.kind, CommandErrorKind::InvalidInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_operation() {
        let err = CommandError::new(
            "Services.AccountService.CreateAccount",
            ValidationError::InvalidCurrency("eur".into()),
        );
        assert_eq!(
            err.to_string(),
            "Services.AccountService.CreateAccount: invalid currency code: \"eur\""
        );
        assert!(err.is_invalid_input());
    }

    #[test]
    fn uow_errors_keep_batch_index() {
        let err = CommandError::new(
            "Services.TransactionService.CreateTransaction",
            UowError::BatchExecFailed { index: 2, reason: "duplicate key".into() },
        );
        assert!(matches!(err.kind, CommandErrorKind::Uow(UowError::BatchExecFailed { index: 2, .. })));
    }
}
