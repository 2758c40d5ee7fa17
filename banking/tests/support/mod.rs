//! In-memory banking repositories and handler wiring for integration tests.

#![allow(dead_code)]

use ledger_banking::{
    Account, AccountRepository, BankEnvironment, CreateAccountHandler, CreateTransactionHandler,
    OutboxWriters, Transaction, TransactionRepository,
};
use ledger_outbox_core::persistence::PersistenceError;
use ledger_outbox_testing::{
    FixedClock, InMemoryDatabase, InMemoryEventRepository, InMemoryOutboxStore, InMemoryScope,
    InMemoryUnitOfWork, SequentialIds, epoch,
};
use std::sync::Arc;

pub const ACCOUNTS_TABLE: &str = "accounts";
pub const TRANSACTIONS_TABLE: &str = "transactions";

#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryAccounts;

impl AccountRepository<InMemoryScope> for InMemoryAccounts {
    async fn create(
        &self,
        scope: &mut InMemoryScope,
        account: &Account,
    ) -> Result<(), PersistenceError> {
        let row = serde_json::to_value(account).map_err(|e| PersistenceError::failed("account", e))?;
        scope.insert_row(ACCOUNTS_TABLE, account.account_id, row)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryTransactions;

impl TransactionRepository<InMemoryScope> for InMemoryTransactions {
    async fn create(
        &self,
        scope: &mut InMemoryScope,
        transaction: &Transaction,
    ) -> Result<(), PersistenceError> {
        let row = serde_json::to_value(transaction)
            .map_err(|e| PersistenceError::failed("transaction", e))?;
        scope.insert_row(TRANSACTIONS_TABLE, transaction.transaction_id, row)
    }
}

pub type AccountHandler =
    CreateAccountHandler<InMemoryUnitOfWork, InMemoryAccounts, InMemoryEventRepository, InMemoryOutboxStore>;
pub type TransactionHandler = CreateTransactionHandler<
    InMemoryUnitOfWork,
    InMemoryTransactions,
    InMemoryEventRepository,
    InMemoryOutboxStore,
>;

/// Deterministic environment: clock pinned to [`epoch`], sequential ids.
pub fn environment() -> BankEnvironment {
    BankEnvironment::new(Arc::new(FixedClock::new(epoch())), Arc::new(SequentialIds::new()))
}

pub fn writers(db: &InMemoryDatabase) -> OutboxWriters<InMemoryEventRepository, InMemoryOutboxStore> {
    OutboxWriters::new(InMemoryEventRepository, InMemoryOutboxStore::new(db.clone()))
}

pub fn account_handler(db: &InMemoryDatabase, env: BankEnvironment) -> AccountHandler {
    CreateAccountHandler::new(InMemoryUnitOfWork::new(db.clone()), InMemoryAccounts, writers(db), env)
}

pub fn transaction_handler(db: &InMemoryDatabase, env: BankEnvironment) -> TransactionHandler {
    CreateTransactionHandler::new(
        InMemoryUnitOfWork::new(db.clone()),
        InMemoryTransactions,
        writers(db),
        env,
    )
}
