//! Transaction data model shared by every extraction strategy.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a statement movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Deposit,
    Withdrawal,
}

impl TxKind {
    /// Parse a loosely-typed label ("deposit", "Withdrawal", "debit", ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "deposit" | "credit" => Some(Self::Deposit),
            "withdrawal" | "debit" => Some(Self::Withdrawal),
            _ => None,
        }
    }
}

/// Issuing bank of the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BankSource {
    #[default]
    Boc,
    Hsbc,
    Scb,
}

impl BankSource {
    /// Parse a bank code; unknown codes are left to the caller's default.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BOC" => Some(Self::Boc),
            "HSBC" => Some(Self::Hsbc),
            "SCB" => Some(Self::Scb),
            _ => None,
        }
    }
}

/// A single normalized statement transaction.
///
/// Created exactly once by the normalization stage and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction date.
    pub date: NaiveDate,

    /// Free-text label; `"Transaction"` when the statement gives none.
    pub description: String,

    /// Signed amount: negative for withdrawals, positive for deposits.
    /// Never zero.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    /// Movement direction; always consistent with the sign of `amount`.
    #[serde(rename = "type")]
    pub kind: TxKind,

    /// Running balance after the transaction (0 when not derivable).
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,

    /// Issuing bank.
    pub source: BankSource,

    /// Stamped once when the document was processed.
    #[serde(rename = "uploadedAt")]
    pub uploaded_at: DateTime<Utc>,

    /// Original matched fragment, kept for auditability.
    #[serde(rename = "rawData", skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<String>,
}

/// Result of processing one document.
///
/// `errors` is non-empty only when extraction could not proceed at all;
/// row-level problems are absorbed by dropping the row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseResult {
    pub transactions: Vec<Transaction>,
    pub errors: Vec<String>,
    #[serde(rename = "totalProcessed")]
    pub total_processed: usize,
}

impl ParseResult {
    /// Wrap normalized transactions; `totalProcessed` tracks the list length.
    pub fn from_transactions(transactions: Vec<Transaction>) -> Self {
        let total_processed = transactions.len();
        Self {
            transactions,
            errors: Vec::new(),
            total_processed,
        }
    }

    /// A document- or call-level failure: zero rows, one error message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            transactions: Vec::new(),
            errors: vec![message.into()],
            total_processed: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Untyped transaction candidate as produced by an extractor, before the
/// parse-and-validate boundary in [`crate::normalize`].
#[derive(Debug, Clone, Default)]
pub struct RawCandidate {
    /// Date token as matched (`2025/12/01`, `2025-12-01`, ...).
    pub date: String,

    pub description: Option<String>,

    /// Amount as matched; may carry thousands separators and a sign.
    pub amount: String,

    /// Declared direction, when the extractor knows it.
    pub kind: Option<TxKind>,

    /// Running balance as matched.
    pub balance: Option<String>,

    /// Declared bank code.
    pub source: Option<String>,

    /// Original fragment for `rawData`.
    pub raw: Option<String>,
}
