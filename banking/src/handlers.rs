//! Command handlers.
//!
//! Each handler validates its command, opens a unit of work, writes the
//! aggregate row, the event envelope and the outbox record through the same
//! scope, and commits. Any failure after `begin` rolls the scope back through
//! [`UnitOfWork::graceful_rollback`], so either all three rows become visible
//! or none does.

use crate::account::Account;
use crate::commands::{
    CreateAccountCommand, CreateAccountResult, CreateTransactionCommand, CreateTransactionResult,
};
use crate::environment::BankEnvironment;
use crate::error::{CommandError, CommandErrorKind};
use crate::repository::{AccountRepository, TransactionRepository};
use crate::transaction::{NewTransaction, Transaction};
use crate::types::{
    Currency, Description, Money, TransactionType, ValidationError, parse_id, parse_optional_id,
};
use chrono::{DateTime, Utc};
use ledger_outbox_core::event::{EventSource, EventType, build_event};
use ledger_outbox_core::outbox::OutboxRecord;
use ledger_outbox_core::persistence::{EventRepository, OutboxRepository};
use ledger_outbox_core::uow::UnitOfWork;

const CREATE_ACCOUNT: &str = "Services.AccountService.CreateAccount";
const CREATE_TRANSACTION: &str = "Services.TransactionService.CreateTransaction";

/// Event and outbox writers shared by every handler.
#[derive(Debug, Clone)]
pub struct OutboxWriters<E, O> {
    /// Event envelope repository.
    pub events: E,
    /// Outbox record repository.
    pub outbox: O,
}

impl<E, O> OutboxWriters<E, O> {
    /// Bundle the two writers.
    pub const fn new(events: E, outbox: O) -> Self {
        Self { events, outbox }
    }

    /// Build the envelope for `aggregate`, then save it and its outbox record
    /// inside `scope`.
    async fn record<S, A>(
        &self,
        scope: &mut S,
        env: &BankEnvironment,
        aggregate: &A,
        event_type: EventType,
        now: DateTime<Utc>,
    ) -> Result<(), CommandErrorKind>
    where
        S: Send,
        A: EventSource + Sync,
        E: EventRepository<S>,
        O: OutboxRepository<S>,
    {
        let event = build_event(aggregate, event_type, now, env.ids.next_id())?;
        self.events.save_event(scope, &event).await?;

        let record = OutboxRecord::from_event(&event, env.ids.next_id(), now)?;
        self.outbox.save_outbox_event(scope, &record).await?;

        tracing::debug!(
            event_id = %event.event_id,
            outbox_id = %record.outbox_id,
            event_type = %event_type,
            "Event staged for outbox"
        );
        Ok(())
    }
}

/// Opens accounts.
#[derive(Debug)]
pub struct CreateAccountHandler<U, A, E, O> {
    uow: U,
    accounts: A,
    writers: OutboxWriters<E, O>,
    env: BankEnvironment,
}

impl<U, A, E, O> CreateAccountHandler<U, A, E, O>
where
    U: UnitOfWork,
    A: AccountRepository<U::Scope>,
    E: EventRepository<U::Scope>,
    O: OutboxRepository<U::Scope>,
{
    /// Create a handler over the given unit of work and repositories.
    pub const fn new(
        uow: U,
        accounts: A,
        writers: OutboxWriters<E, O>,
        env: BankEnvironment,
    ) -> Self {
        Self { uow, accounts, writers, env }
    }

    /// Open an account and co-commit its `AccountCreated` event.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] tagged `Services.AccountService.CreateAccount`:
    /// invalid input before any write, otherwise the unit of work, repository
    /// or event failure that caused the rollback.
    pub async fn handle(
        &self,
        command: CreateAccountCommand,
    ) -> Result<CreateAccountResult, CommandError> {
        tracing::info!(
            operation = CREATE_ACCOUNT,
            client_id = %command.client_id,
            currency = %command.currency,
            "Attempting to create new account"
        );

        let client_id = parse_id("client_id", &command.client_id)
            .map_err(|e| CommandError::new(CREATE_ACCOUNT, e))?;
        let currency = command
            .currency
            .parse::<Currency>()
            .map_err(|e| CommandError::new(CREATE_ACCOUNT, e))?;

        let now = self.env.clock.now();
        let account = Account::open(self.env.ids.next_id(), client_id, currency, now);

        let mut scope = self
            .uow
            .begin_with_tx()
            .await
            .map_err(|e| CommandError::new(CREATE_ACCOUNT, e))?;

        let outcome = self.persist(&mut scope, &account, now).await;
        self.uow.graceful_rollback(&mut scope, &outcome).await;

        match outcome {
            Ok(()) => {
                tracing::info!(
                    operation = CREATE_ACCOUNT,
                    account_id = %account.account_id,
                    "Account creation completed successfully"
                );
                Ok(CreateAccountResult { account_id: account.account_id })
            }
            Err(kind) => {
                tracing::error!(operation = CREATE_ACCOUNT, error = %kind, "Account creation failed");
                Err(CommandError::new(CREATE_ACCOUNT, kind))
            }
        }
    }

    async fn persist(
        &self,
        scope: &mut U::Scope,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<(), CommandErrorKind> {
        self.accounts.create(scope, account).await?;
        self.writers
            .record(scope, &self.env, account, EventType::AccountCreated, now)
            .await?;
        self.uow.commit(scope).await?;
        Ok(())
    }
}

/// Records deposits, withdrawals and transfers.
///
/// Writes go through a batched scope: the three inserts are queued and run
/// in order at commit.
#[derive(Debug)]
pub struct CreateTransactionHandler<U, T, E, O> {
    uow: U,
    transactions: T,
    writers: OutboxWriters<E, O>,
    env: BankEnvironment,
}

impl<U, T, E, O> CreateTransactionHandler<U, T, E, O>
where
    U: UnitOfWork,
    T: TransactionRepository<U::Scope>,
    E: EventRepository<U::Scope>,
    O: OutboxRepository<U::Scope>,
{
    /// Create a handler over the given unit of work and repositories.
    pub const fn new(
        uow: U,
        transactions: T,
        writers: OutboxWriters<E, O>,
        env: BankEnvironment,
    ) -> Self {
        Self { uow, transactions, writers, env }
    }

    /// Record a transaction and co-commit its `TransactionCreated` event.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] tagged
    /// `Services.TransactionService.CreateTransaction`: invalid input before
    /// any write, otherwise the unit of work, repository or event failure that
    /// caused the rollback. A failing queued insert surfaces as
    /// [`UowError::BatchExecFailed`](ledger_outbox_core::uow::UowError::BatchExecFailed)
    /// with its position.
    pub async fn handle(
        &self,
        command: CreateTransactionCommand,
    ) -> Result<CreateTransactionResult, CommandError> {
        tracing::info!(
            operation = CREATE_TRANSACTION,
            transaction_type = %command.transaction_type,
            amount_cents = command.amount_cents,
            currency = %command.currency,
            "Attempting to create new transaction"
        );

        let input =
            parse_transaction(&command).map_err(|e| CommandError::new(CREATE_TRANSACTION, e))?;
        let now = self.env.clock.now();
        let transaction = Transaction::record(self.env.ids.next_id(), input, now)
            .map_err(|e| CommandError::new(CREATE_TRANSACTION, e))?;

        let mut scope = self
            .uow
            .begin_with_tx_and_batch()
            .await
            .map_err(|e| CommandError::new(CREATE_TRANSACTION, e))?;

        let outcome = self.persist(&mut scope, &transaction, now).await;
        self.uow.graceful_rollback(&mut scope, &outcome).await;

        match outcome {
            Ok(()) => {
                tracing::info!(
                    operation = CREATE_TRANSACTION,
                    transaction_id = %transaction.transaction_id,
                    "Transaction creation completed successfully"
                );
                Ok(CreateTransactionResult { transaction_id: transaction.transaction_id })
            }
            Err(kind) => {
                tracing::error!(
                    operation = CREATE_TRANSACTION,
                    error = %kind,
                    "Transaction creation failed"
                );
                Err(CommandError::new(CREATE_TRANSACTION, kind))
            }
        }
    }

    async fn persist(
        &self,
        scope: &mut U::Scope,
        transaction: &Transaction,
        now: DateTime<Utc>,
    ) -> Result<(), CommandErrorKind> {
        self.transactions.create(scope, transaction).await?;
        self.writers
            .record(scope, &self.env, transaction, EventType::TransactionCreated, now)
            .await?;
        self.uow.commit(scope).await?;
        Ok(())
    }
}

fn parse_transaction(
    command: &CreateTransactionCommand,
) -> Result<NewTransaction, ValidationError> {
    Ok(NewTransaction {
        source_account_id: parse_optional_id(
            "source_account_id",
            command.source_account_id.as_deref(),
        )?,
        destination_account_id: parse_optional_id(
            "destination_account_id",
            command.destination_account_id.as_deref(),
        )?,
        currency: command.currency.parse::<Currency>()?,
        amount: Money::positive(command.amount_cents)?,
        transaction_type: command.transaction_type.parse::<TransactionType>()?,
        description: Description::parse(command.description.as_deref())?,
    })
}
