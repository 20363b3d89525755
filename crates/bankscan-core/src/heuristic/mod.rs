//! Heuristic line scanner: regex-driven transaction candidates without any
//! model call.
//!
//! This path is inherently approximate. Amounts are paired with balances by
//! position rather than by column geometry, so it serves as the offline
//! fallback; the model-assisted extractor is the accuracy baseline.

pub mod patterns;

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::config::HeuristicConfig;
use crate::models::transaction::{ParseResult, RawCandidate, TxKind};
use crate::normalize::{Normalizer, parse_amount};
use patterns::{AMOUNT_TOKEN, CATEGORY_TOKEN, DATE_TOKEN, DEPOSIT_KEYWORD};

/// Scans free text line by line for transaction candidates.
pub struct HeuristicExtractor {
    config: HeuristicConfig,
}

/// An amount token waiting for its balance partner.
struct PendingAmount {
    token: String,
    kind: TxKind,
    description: Option<String>,
    line: String,
}

impl HeuristicExtractor {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    /// Extract candidates in line order.
    ///
    /// Statements often wrap one transaction across rows: the date on one
    /// line, items and amounts on the following lines. The most recently
    /// seen date therefore carries forward until the next date token.
    /// Malformed rows are dropped inside normalization; this never fails as
    /// a whole.
    pub fn extract(&self, text: &str, normalizer: &Normalizer) -> ParseResult {
        let min_amount = Decimal::from(self.config.min_amount);
        let mut current_date: Option<String> = None;
        let mut pending: Option<PendingAmount> = None;
        let mut candidates: Vec<RawCandidate> = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.chars().count() < self.config.min_line_chars {
                continue;
            }

            if let Some(date) = DATE_TOKEN.find(line).map(|m| m.as_str().to_string()) {
                if current_date.as_deref() != Some(date.as_str()) {
                    // New statement date: an unpaired amount from the
                    // previous group has no balance partner.
                    if pending.take().is_some() {
                        debug!("dropping unpaired amount at date change");
                    }
                    current_date = Some(date);
                }
            }

            // Amount-only lines before the first date are headers or noise.
            let Some(date) = current_date.clone() else {
                continue;
            };

            let kind = if DEPOSIT_KEYWORD.is_match(line) {
                TxKind::Deposit
            } else {
                TxKind::Withdrawal
            };
            let description = CATEGORY_TOKEN
                .find(line)
                .map(|m| m.as_str().trim().to_string());

            for token in AMOUNT_TOKEN.find_iter(line) {
                let token_str = token.as_str().to_string();
                let Some(value) = parse_amount(&token_str) else {
                    continue;
                };
                if value.abs() < min_amount {
                    continue;
                }

                match pending.take() {
                    None => {
                        pending = Some(PendingAmount {
                            token: token_str,
                            kind,
                            description: description.clone(),
                            line: line.to_string(),
                        });
                    }
                    Some(first) => {
                        // Positional pairing: the first token of a pair is
                        // the movement, the second the running balance.
                        candidates.push(RawCandidate {
                            date: date.clone(),
                            description: first.description,
                            amount: first.token,
                            kind: Some(first.kind),
                            balance: Some(token_str),
                            source: None,
                            raw: Some(first.line),
                        });
                    }
                }
            }
        }

        if pending.is_some() {
            debug!("dropping trailing unpaired amount");
        }

        ParseResult::from_transactions(normalizer.normalize_all(candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transaction::BankSource;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn extract(text: &str) -> ParseResult {
        let extractor = HeuristicExtractor::new(HeuristicConfig::default());
        let normalizer = Normalizer::new(BankSource::Boc);
        extractor.extract(text, &normalizer)
    }

    #[test]
    fn test_pairing_amount_then_balance() {
        let result = extract("2025/12/01 statement\n提取 transfer out 3,960.00 50,000.00\n");

        assert_eq!(result.total_processed, 1);
        let tx = &result.transactions[0];
        assert_eq!(tx.date.to_string(), "2025-12-01");
        assert_eq!(tx.amount, Decimal::from_str("-3960.00").unwrap());
        assert_eq!(tx.balance, Decimal::from_str("50000.00").unwrap());
        assert_eq!(tx.kind, TxKind::Withdrawal);
    }

    #[test]
    fn test_date_carries_forward_across_lines() {
        let text = "2025/12/01 opening entries\n\
                    現金交易 ref 0001 1,200.00\n\
                    balance carried 8,800.00\n";
        let result = extract(text);

        assert_eq!(result.total_processed, 1);
        let tx = &result.transactions[0];
        assert_eq!(tx.date.to_string(), "2025-12-01");
        assert_eq!(tx.amount, Decimal::from_str("-1200.00").unwrap());
        assert_eq!(tx.balance, Decimal::from_str("8800.00").unwrap());
        assert_eq!(tx.description, "現金交易");
    }

    #[test]
    fn test_deposit_keyword_keeps_amount_positive() {
        let result = extract("2025-12-05 存入 salary 12,000.00 62,000.00\n");

        assert_eq!(result.total_processed, 1);
        let tx = &result.transactions[0];
        assert_eq!(tx.kind, TxKind::Deposit);
        assert_eq!(tx.amount, Decimal::from_str("12000.00").unwrap());
    }

    #[test]
    fn test_small_amounts_are_noise() {
        // 25.00 is below the default cutoff and must not pair.
        let result = extract("2025/12/01 銀行費用 25.00 49,975.00\n");
        assert_eq!(result.total_processed, 0);
    }

    #[test]
    fn test_odd_amount_dropped_at_date_change() {
        let text = "2025/12/01 自動轉賬 5,000.00\n\
                    2025/12/02 自動轉賬 1,000.00 44,000.00\n";
        let result = extract(text);

        // The lone 5,000.00 has no balance partner before the date changes.
        assert_eq!(result.total_processed, 1);
        assert_eq!(result.transactions[0].date.to_string(), "2025-12-02");
    }

    #[test]
    fn test_trailing_unpaired_amount_dropped() {
        let result = extract("2025/12/01 自動轉賬 5,000.00\n");
        assert_eq!(result.total_processed, 0);
    }

    #[test]
    fn test_lines_without_any_date_are_skipped() {
        let result = extract("銀行費用 no date here 3,960.00 50,000.00\n");
        assert_eq!(result.total_processed, 0);
    }

    #[test]
    fn test_short_lines_filtered() {
        // The amount-bearing line is under ten characters and is noise.
        let result = extract("2025/12/01 statement\n50.00\n");
        assert_eq!(result.total_processed, 0);
    }

    #[test]
    fn test_order_and_invariants() {
        let text = "2025/12/01 header row\n\
                    提取 3,960.00 46,040.00\n\
                    存入 salary 12,000.00 58,040.00\n\
                    2025/12/03 next day\n\
                    自動轉賬 2,000.00 56,040.00\n";
        let result = extract(text);

        assert_eq!(result.total_processed, result.transactions.len());
        assert_eq!(result.total_processed, 3);
        for tx in &result.transactions {
            assert!(!tx.amount.is_zero());
            assert_eq!(tx.kind == TxKind::Deposit, tx.amount > Decimal::ZERO);
        }
        // Discovery order is preserved.
        assert_eq!(result.transactions[0].date.to_string(), "2025-12-01");
        assert_eq!(result.transactions[1].kind, TxKind::Deposit);
        assert_eq!(result.transactions[2].date.to_string(), "2025-12-03");
    }

    #[test]
    fn test_raw_fragment_captured() {
        let result = extract("2025/12/01 現金交易 1,200.00 8,800.00\n");
        let raw = result.transactions[0].raw_data.as_deref().unwrap();
        assert!(raw.contains("現金交易"));
    }
}
