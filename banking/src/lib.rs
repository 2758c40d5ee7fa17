//! # Ledger Banking
//!
//! Account and transaction commands for the ledger, written through the
//! transactional outbox.
//!
//! Handlers are generic over the [`UnitOfWork`](ledger_outbox_core::uow::UnitOfWork)
//! backend and its repositories, so the same code runs on `PostgreSQL`
//! ([`postgres`]) and on the in-memory doubles from `ledger-outbox-testing`.
//!
//! # Example
//!
//! ```no_run
//! use ledger_banking::{
//!     BankEnvironment, CreateAccountCommand, CreateAccountHandler, OutboxWriters,
//!     postgres::PgAccountRepository,
//! };
//! use ledger_outbox_postgres::{PgEventRepository, PgOutboxRepository, PgUnitOfWork, connect};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/ledger", 10).await?;
//! let handler = CreateAccountHandler::new(
//!     PgUnitOfWork::new(pool.clone()),
//!     PgAccountRepository,
//!     OutboxWriters::new(PgEventRepository, PgOutboxRepository::new(pool)),
//!     BankEnvironment::default(),
//! );
//!
//! let created = handler
//!     .handle(CreateAccountCommand {
//!         client_id: "7f1c5e0a-3f7b-4f55-9d1e-2b8f6f1d9a10".into(),
//!         currency: "EUR".into(),
//!     })
//!     .await?;
//! println!("opened {}", created.account_id);
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod commands;
pub mod environment;
pub mod error;
pub mod handlers;
pub mod postgres;
pub mod repository;
pub mod transaction;
pub mod types;

pub use account::Account;
pub use commands::{
    CreateAccountCommand, CreateAccountResult, CreateTransactionCommand, CreateTransactionResult,
};
pub use environment::BankEnvironment;
pub use error::{CommandError, CommandErrorKind};
pub use handlers::{CreateAccountHandler, CreateTransactionHandler, OutboxWriters};
pub use repository::{AccountRepository, TransactionRepository};
pub use transaction::{NewTransaction, Transaction};
pub use types::{
    AccountStatus, Currency, Description, Money, TransactionStatus, TransactionType,
    ValidationError,
};
