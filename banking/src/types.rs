//! Value types shared by the account and transaction aggregates.
//!
//! Every type here is validated on construction, so an aggregate holding one
//! never needs to re-check it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Longest description accepted on a transaction.
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// Rejected command input or domain rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A field that must hold a UUID does not.
    #[error("invalid {field}: {value:?} is not a UUID")]
    InvalidId {
        /// Field name as it appears on the command.
        field: &'static str,
        /// Rejected input.
        value: String,
    },

    /// Currency codes are three uppercase ASCII letters.
    #[error("invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// Amounts are strictly positive minor units.
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    /// Unknown transaction type.
    #[error("unknown transaction type: {0:?}")]
    UnknownTransactionType(String),

    /// Description longer than [`MAX_DESCRIPTION_LEN`].
    #[error("description exceeds {MAX_DESCRIPTION_LEN} characters")]
    DescriptionTooLong,

    /// The accounts named on a transaction do not fit its type.
    #[error("{transaction_type} transaction {reason}")]
    AccountMismatch {
        /// Type of the rejected transaction.
        transaction_type: TransactionType,
        /// Which rule was broken.
        reason: &'static str,
    },
}

/// Parse a UUID field from command input.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidId`] naming `field`.
pub fn parse_id(field: &'static str, value: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(value.trim())
        .map_err(|_| ValidationError::InvalidId { field, value: value.to_string() })
}

/// Parse an optional UUID field; blank input counts as absent.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidId`] if a non-blank value is not a UUID.
pub fn parse_optional_id(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<Uuid>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_id(field, raw).map(Some),
    }
}

/// ISO 4217 style currency code (`"EUR"`, `"USD"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Only ASCII uppercase letters are ever stored.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.as_bytes() {
            [a, b, c] if [a, b, c].iter().all(|byte| byte.is_ascii_uppercase()) => {
                Ok(Self([*a, *b, *c]))
            }
            _ => Err(ValidationError::InvalidCurrency(s.to_string())),
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.as_str().to_string()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Amount in minor units (cents).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero balance.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw minor-unit value.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// A strictly positive amount, as required for a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonPositiveAmount`] for zero or negative input.
    pub const fn positive(cents: i64) -> Result<Self, ValidationError> {
        if cents > 0 {
            Ok(Self(cents))
        } else {
            Err(ValidationError::NonPositiveAmount(cents))
        }
    }

    /// Raw minor units.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Lifecycle of an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Open for transactions.
    Active,
    /// Temporarily blocked.
    Frozen,
    /// Permanently closed.
    Closed,
}

impl AccountStatus {
    /// Column value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Frozen => "frozen",
            Self::Closed => "closed",
        }
    }
}

/// Lifecycle of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Recorded, not yet settled.
    New,
    /// Settled.
    Completed,
    /// Rejected during settlement; see `failure_reason`.
    Failed,
}

impl TransactionStatus {
    /// Column value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Direction of money movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money enters the ledger into a destination account.
    Deposit,
    /// Money leaves the ledger from a source account.
    Withdrawal,
    /// Money moves between two accounts.
    Transfer,
}

impl TransactionType {
    /// Column value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Transfer => "transfer",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "transfer" => Ok(Self::Transfer),
            _ => Err(ValidationError::UnknownTransactionType(s.to_string())),
        }
    }
}

/// Free-text note on a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Description(String);

impl Description {
    /// Validate an optional description; blank input counts as absent.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DescriptionTooLong`] past [`MAX_DESCRIPTION_LEN`] characters.
    pub fn parse(value: Option<&str>) -> Result<Option<Self>, ValidationError> {
        let Some(text) = value.map(str::trim).filter(|text| !text.is_empty()) else {
            return Ok(None);
        };
        if text.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ValidationError::DescriptionTooLong);
        }
        Ok(Some(Self(text.to_string())))
    }

    /// The text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn currency_requires_three_uppercase_letters() {
        assert_eq!("EUR".parse::<Currency>().unwrap().as_str(), "EUR");
        assert_eq!(" USD ".parse::<Currency>().unwrap().as_str(), "USD");
        assert!("eur".parse::<Currency>().is_err());
        assert!("EURO".parse::<Currency>().is_err());
        assert!("E1R".parse::<Currency>().is_err());
        assert!("".parse::<Currency>().is_err());
    }

    #[test]
    fn currency_serializes_as_code() {
        let json = serde_json::to_value("GBP".parse::<Currency>().unwrap()).unwrap();
        assert_eq!(json, "GBP");
        assert!(serde_json::from_value::<Currency>(serde_json::json!("gbp")).is_err());
    }

    #[test]
    fn money_must_be_positive_for_transactions() {
        assert_eq!(Money::positive(1).unwrap().cents(), 1);
        assert_eq!(Money::positive(0), Err(ValidationError::NonPositiveAmount(0)));
        assert!(Money::positive(-5).is_err());
    }

    #[test]
    fn money_displays_major_and_minor_units() {
        assert_eq!(Money::from_cents(12_345).to_string(), "123.45");
        assert_eq!(Money::from_cents(-7).to_string(), "-0.07");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn transaction_type_parses_case_insensitively() {
        assert_eq!("Deposit".parse::<TransactionType>().unwrap(), TransactionType::Deposit);
        assert_eq!("TRANSFER".parse::<TransactionType>().unwrap(), TransactionType::Transfer);
        assert!("refund".parse::<TransactionType>().is_err());
    }

    #[test]
    fn blank_description_is_absent() {
        assert_eq!(Description::parse(None).unwrap(), None);
        assert_eq!(Description::parse(Some("   ")).unwrap(), None);
        assert_eq!(Description::parse(Some(" rent ")).unwrap().unwrap().as_str(), "rent");
        let long = "x".repeat(MAX_DESCRIPTION_LEN + 1);
        assert_eq!(Description::parse(Some(&long)), Err(ValidationError::DescriptionTooLong));
    }

    #[test]
    fn optional_ids_treat_blank_as_none() {
        assert_eq!(parse_optional_id("source_account_id", Some("")).unwrap(), None);
        assert_eq!(parse_optional_id("source_account_id", None).unwrap(), None);
        let id = Uuid::new_v4();
        assert_eq!(
            parse_optional_id("source_account_id", Some(&id.to_string())).unwrap(),
            Some(id)
        );
        assert!(matches!(
            parse_optional_id("source_account_id", Some("nope")),
            Err(ValidationError::InvalidId { field: "source_account_id", .. })
        ));
    }
}
