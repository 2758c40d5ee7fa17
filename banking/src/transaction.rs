//! Transaction aggregate.
//!
//! A transaction names the accounts money moves between. Which accounts it
//! must name depends on its type:
//!
//! | type       | source   | destination |
//! |------------|----------|-------------|
//! | deposit    | absent   | required    |
//! | withdrawal | required | absent      |
//! | transfer   | required | required, different from source |

use crate::types::{
    Currency, Description, Money, TransactionStatus, TransactionType, ValidationError,
};
use chrono::{DateTime, Utc};
use ledger_outbox_core::event::EventSource;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate type name carried on transaction events.
pub const TRANSACTION_AGGREGATE: &str = "transaction";

/// Validated input for [`Transaction::record`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTransaction {
    /// Account debited, if any.
    pub source_account_id: Option<Uuid>,
    /// Account credited, if any.
    pub destination_account_id: Option<Uuid>,
    /// Currency of the amount.
    pub currency: Currency,
    /// Positive amount.
    pub amount: Money,
    /// Direction of the movement.
    pub transaction_type: TransactionType,
    /// Optional note.
    pub description: Option<Description>,
}

/// A recorded money movement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Identity of the transaction.
    pub transaction_id: Uuid,
    /// Account debited, if any.
    pub source_account_id: Option<Uuid>,
    /// Account credited, if any.
    pub destination_account_id: Option<Uuid>,
    /// Currency of the amount.
    pub currency: Currency,
    /// Amount moved.
    pub amount: Money,
    /// Lifecycle state.
    pub status: TransactionStatus,
    /// Direction of the movement.
    pub transaction_type: TransactionType,
    /// Optional note.
    pub description: Option<Description>,
    /// Set once settlement rejects the transaction.
    pub failure_reason: Option<String>,
    /// When it was recorded.
    pub created_at: DateTime<Utc>,
    /// Last modification.
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Record a new transaction in [`TransactionStatus::New`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AccountMismatch`] when the accounts do not fit
    /// the transaction type.
    pub fn record(
        transaction_id: Uuid,
        input: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        check_accounts(
            input.transaction_type,
            input.source_account_id,
            input.destination_account_id,
        )?;

        Ok(Self {
            transaction_id,
            source_account_id: input.source_account_id,
            destination_account_id: input.destination_account_id,
            currency: input.currency,
            amount: input.amount,
            status: TransactionStatus::New,
            transaction_type: input.transaction_type,
            description: input.description,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        })
    }
}

fn check_accounts(
    transaction_type: TransactionType,
    source: Option<Uuid>,
    destination: Option<Uuid>,
) -> Result<(), ValidationError> {
    let mismatch = |reason| ValidationError::AccountMismatch { transaction_type, reason };

    match (transaction_type, source, destination) {
        (TransactionType::Deposit, None, Some(_))
        | (TransactionType::Withdrawal, Some(_), None) => Ok(()),
        (TransactionType::Transfer, Some(from), Some(to)) if from != to => Ok(()),
        (TransactionType::Transfer, Some(_), Some(_)) => {
            Err(mismatch("cannot move money to the same account"))
        }
        (TransactionType::Deposit, Some(_), _) => Err(mismatch("must not have a source account")),
        (TransactionType::Withdrawal, _, Some(_)) => {
            Err(mismatch("must not have a destination account"))
        }
        (_, None, _) if transaction_type != TransactionType::Deposit => {
            Err(mismatch("requires a source account"))
        }
        _ => Err(mismatch("requires a destination account")),
    }
}

impl EventSource for Transaction {
    fn aggregate_id(&self) -> Uuid {
        self.transaction_id
    }

    fn aggregate_type(&self) -> &str {
        TRANSACTION_AGGREGATE
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    fn input(
        transaction_type: TransactionType,
        source: Option<Uuid>,
        destination: Option<Uuid>,
    ) -> NewTransaction {
        NewTransaction {
            source_account_id: source,
            destination_account_id: destination,
            currency: "EUR".parse().unwrap(),
            amount: Money::positive(1_000).unwrap(),
            transaction_type,
            description: None,
        }
    }

    fn reason(result: Result<Transaction, ValidationError>) -> Option<&'static str> {
        match result {
            Err(ValidationError::AccountMismatch { reason, .. }) => Some(reason),
            _ => None,
        }
    }

    #[test]
    fn deposit_needs_destination_only() {
        let to = Uuid::new_v4();
        let tx = Transaction::record(
            Uuid::new_v4(),
            input(TransactionType::Deposit, None, Some(to)),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(tx.status, TransactionStatus::New);
        assert_eq!(tx.destination_account_id, Some(to));

        let id = Uuid::new_v4();
        assert_eq!(
            reason(Transaction::record(
                id,
                input(TransactionType::Deposit, Some(Uuid::new_v4()), Some(to)),
                Utc::now()
            )),
            Some("must not have a source account")
        );
        assert_eq!(
            reason(Transaction::record(id, input(TransactionType::Deposit, None, None), Utc::now())),
            Some("requires a destination account")
        );
    }

    #[test]
    fn withdrawal_needs_source_only() {
        let from = Uuid::new_v4();
        assert!(
            Transaction::record(
                Uuid::new_v4(),
                input(TransactionType::Withdrawal, Some(from), None),
                Utc::now()
            )
            .is_ok()
        );
        assert_eq!(
            reason(Transaction::record(
                Uuid::new_v4(),
                input(TransactionType::Withdrawal, None, None),
                Utc::now()
            )),
            Some("requires a source account")
        );
        assert_eq!(
            reason(Transaction::record(
                Uuid::new_v4(),
                input(TransactionType::Withdrawal, Some(from), Some(Uuid::new_v4())),
                Utc::now()
            )),
            Some("must not have a destination account")
        );
    }

    #[test]
    fn transfer_needs_two_distinct_accounts() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(
            Transaction::record(
                Uuid::new_v4(),
                input(TransactionType::Transfer, Some(a), Some(b)),
                Utc::now()
            )
            .is_ok()
        );
        assert_eq!(
            reason(Transaction::record(
                Uuid::new_v4(),
                input(TransactionType::Transfer, Some(a), Some(a)),
                Utc::now()
            )),
            Some("cannot move money to the same account")
        );
        assert_eq!(
            reason(Transaction::record(
                Uuid::new_v4(),
                input(TransactionType::Transfer, Some(a), None),
                Utc::now()
            )),
            Some("requires a destination account")
        );
        assert_eq!(
            reason(Transaction::record(
                Uuid::new_v4(),
                input(TransactionType::Transfer, None, Some(b)),
                Utc::now()
            )),
            Some("requires a source account")
        );
    }
}
