//! `PostgreSQL` repositories for the banking aggregates.

use crate::account::Account;
use crate::repository::{AccountRepository, TransactionRepository};
use crate::transaction::Transaction;
use ledger_outbox_core::persistence::PersistenceError;
use ledger_outbox_postgres::PgScope;
use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS accounts (
        account_id UUID PRIMARY KEY,
        client_id UUID NOT NULL,
        balance_cents BIGINT NOT NULL,
        currency CHAR(3) NOT NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_accounts_client ON accounts (client_id)",
    r"
    CREATE TABLE IF NOT EXISTS transactions (
        transaction_id UUID PRIMARY KEY,
        source_account_id UUID REFERENCES accounts (account_id),
        destination_account_id UUID REFERENCES accounts (account_id),
        currency CHAR(3) NOT NULL,
        amount_cents BIGINT NOT NULL CHECK (amount_cents > 0),
        status TEXT NOT NULL,
        transaction_type TEXT NOT NULL,
        description TEXT,
        failure_reason TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    ",
];

/// Create the `accounts` and `transactions` tables if missing.
///
/// Run after [`ledger_outbox_postgres::schema::bootstrap`].
///
/// # Errors
///
/// Returns the first sqlx error encountered.
pub async fn bootstrap(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("Banking schema ready");
    Ok(())
}

/// Writes accounts to the `accounts` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgAccountRepository;

impl AccountRepository<PgScope> for PgAccountRepository {
    async fn create(&self, scope: &mut PgScope, account: &Account) -> Result<(), PersistenceError> {
        let statement = sqlx::query(
            r"
            INSERT INTO accounts (
                account_id, client_id, balance_cents, currency, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(account.account_id)
        .bind(account.client_id)
        .bind(account.balance.cents())
        .bind(account.currency.to_string())
        .bind(account.status.as_str())
        .bind(account.created_at)
        .bind(account.updated_at);

        scope.execute(statement).await.map_err(|e| {
            tracing::error!(account_id = %account.account_id, error = %e, "Failed to create account");
            PersistenceError::failed("account", e)
        })
    }
}

/// Writes transactions to the `transactions` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgTransactionRepository;

impl TransactionRepository<PgScope> for PgTransactionRepository {
    async fn create(
        &self,
        scope: &mut PgScope,
        transaction: &Transaction,
    ) -> Result<(), PersistenceError> {
        let statement = sqlx::query(
            r"
            INSERT INTO transactions (
                transaction_id, source_account_id, destination_account_id, currency,
                amount_cents, status, transaction_type, description, failure_reason,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(transaction.transaction_id)
        .bind(transaction.source_account_id)
        .bind(transaction.destination_account_id)
        .bind(transaction.currency.to_string())
        .bind(transaction.amount.cents())
        .bind(transaction.status.as_str())
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.description.as_ref().map(|d| d.as_str().to_string()))
        .bind(transaction.failure_reason.clone())
        .bind(transaction.created_at)
        .bind(transaction.updated_at);

        scope.execute(statement).await.map_err(|e| {
            tracing::error!(
                transaction_id = %transaction.transaction_id,
                error = %e,
                "Failed to create transaction"
            );
            PersistenceError::failed("transaction", e)
        })
    }
}
