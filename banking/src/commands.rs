//! Command inputs and results.
//!
//! Commands carry raw, unvalidated input as it arrives from the API layer;
//! handlers parse it into [`crate::types`] values before touching storage.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Open an account for a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountCommand {
    /// Owning client (UUID).
    pub client_id: String,
    /// Currency code such as `"EUR"`.
    pub currency: String,
}

/// Outcome of [`CreateAccountCommand`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountResult {
    /// Identity of the new account.
    pub account_id: Uuid,
}

/// Record a deposit, withdrawal or transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransactionCommand {
    /// Account debited (UUID), blank when absent.
    pub source_account_id: Option<String>,
    /// Account credited (UUID), blank when absent.
    pub destination_account_id: Option<String>,
    /// Currency code.
    pub currency: String,
    /// Amount in minor units.
    pub amount_cents: i64,
    /// `deposit`, `withdrawal` or `transfer`.
    pub transaction_type: String,
    /// Optional note.
    pub description: Option<String>,
}

/// Outcome of [`CreateTransactionCommand`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransactionResult {
    /// Identity of the new transaction.
    pub transaction_id: Uuid,
}
