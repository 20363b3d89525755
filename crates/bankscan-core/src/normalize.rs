//! Shared normalization and validation applied to every raw candidate,
//! regardless of which extraction strategy produced it.

use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::models::transaction::{BankSource, RawCandidate, Transaction, TxKind};

lazy_static! {
    static ref CANONICAL_DATE: Regex =
        Regex::new(r"^(\d{4})[/\-](\d{2})[/\-](\d{2})$").unwrap();
}

/// Why a single candidate row was discarded. Absorbed by callers; never
/// surfaces past the pipeline boundary.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CandidateError {
    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("unparsable amount: {0}")]
    InvalidAmount(String),

    /// Zero-amount rows carry no information (subtotal lines and similar
    /// statement artifacts).
    #[error("zero amount")]
    ZeroAmount,
}

/// Rewrite `YYYY/MM/DD` (or `YYYY-MM-DD`) into a calendar date.
///
/// Anything that does not have this shape is invalid and drops the row.
pub fn canonical_date(s: &str) -> Option<NaiveDate> {
    let caps = CANONICAL_DATE.captures(s.trim())?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a statement amount, stripping thousands separators first.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned = s.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// Converts raw candidates into [`Transaction`]s.
///
/// One normalizer is built per document invocation so every row shares the
/// same `uploadedAt` stamp.
#[derive(Debug, Clone)]
pub struct Normalizer {
    default_source: BankSource,
    stamp: DateTime<Utc>,
}

impl Normalizer {
    pub fn new(default_source: BankSource) -> Self {
        Self {
            default_source,
            stamp: Utc::now(),
        }
    }

    /// Validate one candidate. Failures are row-local: callers drop the row
    /// and continue with the batch.
    pub fn normalize(&self, raw: RawCandidate) -> Result<Transaction, CandidateError> {
        let date = canonical_date(&raw.date)
            .ok_or_else(|| CandidateError::InvalidDate(raw.date.clone()))?;

        let amount = parse_amount(&raw.amount)
            .ok_or_else(|| CandidateError::InvalidAmount(raw.amount.clone()))?;
        if amount.is_zero() {
            return Err(CandidateError::ZeroAmount);
        }

        // A declared direction wins over the declared sign; without one the
        // sign decides the direction.
        let (amount, kind) = match raw.kind {
            Some(TxKind::Deposit) => (amount.abs(), TxKind::Deposit),
            Some(TxKind::Withdrawal) => (-amount.abs(), TxKind::Withdrawal),
            None if amount > Decimal::ZERO => (amount, TxKind::Deposit),
            None => (amount, TxKind::Withdrawal),
        };

        let balance = raw
            .balance
            .as_deref()
            .and_then(parse_amount)
            .unwrap_or(Decimal::ZERO);

        let source = raw
            .source
            .as_deref()
            .and_then(BankSource::parse)
            .unwrap_or(self.default_source);

        Ok(Transaction {
            date,
            description: raw
                .description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| "Transaction".to_string()),
            amount,
            kind,
            balance,
            source,
            uploaded_at: self.stamp,
            raw_data: raw.raw,
        })
    }

    /// Normalize a batch, silently dropping malformed rows and preserving
    /// discovery order.
    ///
    /// Rows repeated verbatim (page-boundary carry-over, re-printed header
    /// groups) are deduplicated on date, description, amount, and balance;
    /// the first occurrence wins.
    pub fn normalize_all(&self, raws: Vec<RawCandidate>) -> Vec<Transaction> {
        let mut seen: HashSet<(NaiveDate, String, Decimal, Decimal)> = HashSet::new();

        raws.into_iter()
            .filter_map(|raw| match self.normalize(raw) {
                Ok(tx) => Some(tx),
                Err(e) => {
                    debug!("dropping candidate: {e}");
                    None
                }
            })
            .filter(|tx| {
                let key = (tx.date, tx.description.clone(), tx.amount, tx.balance);
                if seen.insert(key) {
                    true
                } else {
                    debug!("dropping duplicate row on {}", tx.date);
                    false
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn candidate(date: &str, amount: &str) -> RawCandidate {
        RawCandidate {
            date: date.to_string(),
            amount: amount.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_date_round_trip() {
        let slash = canonical_date("2025/12/01").unwrap();
        let dash = canonical_date("2025-12-01").unwrap();
        assert_eq!(slash, dash);
        assert_eq!(slash.to_string(), "2025-12-01");
    }

    #[test]
    fn test_bad_dates_rejected() {
        assert_eq!(canonical_date("01/12/2025"), None);
        assert_eq!(canonical_date("2025/13/01"), None);
        assert_eq!(canonical_date("2025/12"), None);
        assert_eq!(canonical_date("yesterday"), None);
    }

    #[test]
    fn test_parse_amount_strips_separators() {
        assert_eq!(parse_amount("3,960.00"), Decimal::from_str("3960.00").ok());
        assert_eq!(parse_amount("-1,234,567.89"), Decimal::from_str("-1234567.89").ok());
        assert_eq!(parse_amount("abc"), None);
    }

    #[test]
    fn test_zero_amount_dropped() {
        let n = Normalizer::new(BankSource::Boc);
        assert_eq!(
            n.normalize(candidate("2025-12-01", "0.00")),
            Err(CandidateError::ZeroAmount)
        );
    }

    #[test]
    fn test_declared_kind_forces_sign() {
        let n = Normalizer::new(BankSource::Boc);

        let mut raw = candidate("2025-12-01", "3960.00");
        raw.kind = Some(TxKind::Withdrawal);
        let tx = n.normalize(raw).unwrap();
        assert_eq!(tx.amount, Decimal::from_str("-3960.00").unwrap());
        assert_eq!(tx.kind, TxKind::Withdrawal);

        let mut raw = candidate("2025-12-01", "-100.00");
        raw.kind = Some(TxKind::Deposit);
        let tx = n.normalize(raw).unwrap();
        assert_eq!(tx.amount, Decimal::from_str("100.00").unwrap());
        assert_eq!(tx.kind, TxKind::Deposit);
    }

    #[test]
    fn test_kind_derived_from_sign() {
        let n = Normalizer::new(BankSource::Boc);

        let tx = n.normalize(candidate("2025-12-01", "-50.00")).unwrap();
        assert_eq!(tx.kind, TxKind::Withdrawal);

        let tx = n.normalize(candidate("2025-12-01", "50.00")).unwrap();
        assert_eq!(tx.kind, TxKind::Deposit);
    }

    #[test]
    fn test_idempotent_on_normalized_input() {
        // Feeding an already-normalized row back through changes nothing.
        let n = Normalizer::new(BankSource::Boc);
        let first = n
            .normalize(RawCandidate {
                date: "2025/12/01".to_string(),
                amount: "3,960.00".to_string(),
                kind: Some(TxKind::Withdrawal),
                balance: Some("50,000.00".to_string()),
                ..Default::default()
            })
            .unwrap();

        let again = n
            .normalize(RawCandidate {
                date: first.date.to_string(),
                description: Some(first.description.clone()),
                amount: first.amount.to_string(),
                kind: Some(first.kind),
                balance: Some(first.balance.to_string()),
                source: Some("BOC".to_string()),
                raw: first.raw_data.clone(),
            })
            .unwrap();

        assert_eq!(first.date, again.date);
        assert_eq!(first.amount, again.amount);
        assert_eq!(first.kind, again.kind);
        assert_eq!(first.balance, again.balance);
        assert_eq!(first.source, again.source);
    }

    #[test]
    fn test_defaults_applied() {
        let n = Normalizer::new(BankSource::Hsbc);
        let tx = n.normalize(candidate("2025-12-01", "75.00")).unwrap();
        assert_eq!(tx.description, "Transaction");
        assert_eq!(tx.source, BankSource::Hsbc);
        assert_eq!(tx.balance, Decimal::ZERO);
    }

    #[test]
    fn test_batch_deduplicates_repeated_rows() {
        // The same row re-printed across a page boundary appears once.
        let n = Normalizer::new(BankSource::Boc);
        let row = RawCandidate {
            date: "2025-12-01".to_string(),
            amount: "3,960.00".to_string(),
            kind: Some(TxKind::Withdrawal),
            balance: Some("50,000.00".to_string()),
            ..Default::default()
        };
        let txs = n.normalize_all(vec![row.clone(), row.clone(), row]);
        assert_eq!(txs.len(), 1);
    }

    #[test]
    fn test_distinct_rows_survive_dedup() {
        // Same date and amount but a different running balance is a real,
        // separate movement.
        let n = Normalizer::new(BankSource::Boc);
        let mut first = candidate("2025-12-01", "100.00");
        first.balance = Some("900.00".to_string());
        let mut second = candidate("2025-12-01", "100.00");
        second.balance = Some("1,000.00".to_string());
        let txs = n.normalize_all(vec![first, second]);
        assert_eq!(txs.len(), 2);
    }

    #[test]
    fn test_batch_drops_malformed_preserving_order() {
        let n = Normalizer::new(BankSource::Boc);
        let raws = vec![
            candidate("2025-12-01", "100.00"),
            candidate("2025-12-02", "not-a-number"),
            candidate("2025-12-03", "200.00"),
        ];
        let txs = n.normalize_all(raws);
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].date.to_string(), "2025-12-01");
        assert_eq!(txs[1].date.to_string(), "2025-12-03");
    }
}
