//! Account aggregate.

use crate::types::{AccountStatus, Currency, Money};
use chrono::{DateTime, Utc};
use ledger_outbox_core::event::EventSource;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate type name carried on account events.
pub const ACCOUNT_AGGREGATE: &str = "account";

/// A client's account in one currency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Identity of the account.
    pub account_id: Uuid,
    /// Owning client.
    pub client_id: Uuid,
    /// Current balance.
    pub balance: Money,
    /// Currency of the balance.
    pub currency: Currency,
    /// Lifecycle state.
    pub status: AccountStatus,
    /// When the account was opened.
    pub created_at: DateTime<Utc>,
    /// Last modification.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Open a new, active account with a zero balance.
    #[must_use]
    pub const fn open(
        account_id: Uuid,
        client_id: Uuid,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id,
            client_id,
            balance: Money::ZERO,
            currency,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

impl EventSource for Account {
    fn aggregate_id(&self) -> Uuid {
        self.account_id
    }

    fn aggregate_type(&self) -> &str {
        ACCOUNT_AGGREGATE
    }
}
