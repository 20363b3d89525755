//! Model-assisted extraction under a fixed instruction contract.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::client::{ContentBlock, ModelClient};
use crate::acquire::PageImage;
use crate::error::ScanError;
use crate::models::transaction::{ParseResult, RawCandidate, TxKind};
use crate::normalize::Normalizer;

/// Instruction contract: exact output schema, sign convention, and the
/// bare-array requirement.
const EXTRACTION_PROMPT: &str = r#"Extract all bank transactions from this bank statement. Return ONLY a JSON array with no other text.

Each transaction object must have:
- "date": string in "YYYY-MM-DD" format
- "description": the transaction description
- "amount": number — negative for withdrawals/debits, positive for deposits/credits
- "type": "deposit" or "withdrawal"
- "balance": number — the running balance after the transaction
- "source": the bank name abbreviation (e.g. "BOC", "HSBC", "SCB")

Look carefully at every row in the statement. Dates may be in various formats — normalize to YYYY-MM-DD. There may be columns for deposits and withdrawals with a running balance.

Return ONLY the JSON array, no markdown fencing, no explanation. Example:
[{"date":"2025-12-01","description":"Transfer","amount":-3960.00,"type":"withdrawal","balance":50000.00,"source":"BOC"}]"#;

/// What the model is shown.
pub enum AiInput<'a> {
    /// Original document bytes, passed natively.
    Document {
        bytes: &'a [u8],
        media_type: &'a str,
    },
    /// Rasterized pages.
    Pages(&'a [PageImage]),
    /// Already-recognized text.
    Text(&'a str),
}

/// Extraction strategy delegating to the structured-extraction capability.
pub struct AiExtractor<'a> {
    client: &'a ModelClient,
}

impl<'a> AiExtractor<'a> {
    pub fn new(client: &'a ModelClient) -> Self {
        Self { client }
    }

    /// Run one extraction call.
    ///
    /// Call-level failures (endpoint down, no structured payload) become
    /// `ParseResult` errors with zero rows; element-level failures are
    /// dropped silently. Only cancellation escapes as an `Err`.
    pub async fn extract(
        &self,
        input: AiInput<'_>,
        normalizer: &Normalizer,
        cancel: &CancellationToken,
    ) -> Result<ParseResult, ScanError> {
        let content = match build_content(input) {
            Ok(content) => content,
            Err(e) => {
                return Ok(ParseResult::failure(format!(
                    "failed to prepare model input: {e}"
                )));
            }
        };

        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScanError::Cancelled),
            reply = self.client.complete(content) => reply,
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                warn!("model call failed: {e}");
                return Ok(ParseResult::failure(format!("model call failed: {e}")));
            }
        };

        Ok(self.parse_reply(&reply, normalizer))
    }

    /// Parse a model reply into transactions.
    ///
    /// Resilient to prose around the array; every element is still untrusted
    /// until it passes coercion and normalization.
    pub fn parse_reply(&self, reply: &str, normalizer: &Normalizer) -> ParseResult {
        let Some(array) = extract_json_array(reply) else {
            warn!("model reply carried no JSON array");
            return ParseResult::failure(
                "could not locate a JSON array in the model response",
            );
        };

        let records: Vec<RawRecord> = match serde_json::from_str(array) {
            Ok(records) => records,
            Err(e) => {
                return ParseResult::failure(format!("failed to parse model response: {e}"));
            }
        };

        debug!("model returned {} records", records.len());

        let candidates = records
            .into_iter()
            .filter_map(RawRecord::into_candidate)
            .collect();
        ParseResult::from_transactions(normalizer.normalize_all(candidates))
    }
}

/// Slice from the first `[` through the last `]`, tolerating prose wrapping.
pub fn extract_json_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (end > start).then(|| &raw[start..=end])
}

fn build_content(input: AiInput<'_>) -> Result<Vec<ContentBlock>, image::ImageError> {
    let mut content = Vec::new();
    match input {
        AiInput::Document { bytes, media_type } => {
            content.push(ContentBlock::document(media_type, bytes));
        }
        AiInput::Pages(pages) => {
            for page in pages {
                let mut png = Vec::new();
                page.image
                    .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)?;
                content.push(ContentBlock::image("image/png", &png));
            }
        }
        AiInput::Text(text) => {
            content.push(ContentBlock::text(format!("Statement text:\n{text}")));
        }
    }
    content.push(ContentBlock::text(EXTRACTION_PROMPT));
    Ok(content)
}

/// Loosely-typed record as the model writes it; fields are coerced before a
/// candidate is produced.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    amount: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    balance: Option<serde_json::Value>,
    #[serde(default)]
    source: Option<String>,
}

impl RawRecord {
    /// Element-level coercion. A record without a date or a usable amount is
    /// dropped here, not surfaced.
    fn into_candidate(self) -> Option<RawCandidate> {
        let date = self.date?;
        let amount = coerce_number(self.amount.as_ref()?)?;
        Some(RawCandidate {
            date,
            description: self.description,
            amount,
            kind: self.kind.as_deref().and_then(TxKind::parse),
            balance: self.balance.as_ref().and_then(coerce_number),
            source: self.source,
            raw: None,
        })
    }
}

/// JSON numbers and numeric strings are both accepted; the real parse
/// happens in normalization.
fn coerce_number(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::AiConfig;
    use crate::models::transaction::BankSource;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn test_client() -> ModelClient {
        ModelClient::from_config(&AiConfig {
            api_key: Some("test-key".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    fn parse(reply: &str) -> ParseResult {
        let client = test_client();
        let extractor = AiExtractor::new(&client);
        let normalizer = Normalizer::new(BankSource::Boc);
        extractor.parse_reply(reply, &normalizer)
    }

    #[test]
    fn test_extract_json_array_ignores_prose() {
        let reply = "Here you go:\n[{\"a\":1}]\nDone.";
        assert_eq!(extract_json_array(reply), Some("[{\"a\":1}]"));
    }

    #[test]
    fn test_extract_json_array_absent() {
        assert_eq!(extract_json_array("no array here"), None);
        assert_eq!(extract_json_array("] backwards ["), None);
    }

    #[test]
    fn test_prose_wrapped_reply() {
        let reply = "Here you go:\n[{\"date\":\"2025-12-01\",\"description\":\"Transfer\",\"amount\":-3960.00,\"type\":\"withdrawal\",\"balance\":50000.00,\"source\":\"BOC\"}]\nDone.";
        let result = parse(reply);

        assert!(result.errors.is_empty());
        assert_eq!(result.total_processed, 1);
        let tx = &result.transactions[0];
        assert_eq!(tx.amount, Decimal::from_str("-3960.00").unwrap());
        assert_eq!(tx.kind, TxKind::Withdrawal);
    }

    #[test]
    fn test_no_array_is_call_level_failure() {
        let result = parse("I could not read this statement, sorry.");
        assert_eq!(result.total_processed, 0);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn test_malformed_top_level_json() {
        let result = parse("[{\"date\": oops]");
        assert_eq!(result.total_processed, 0);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn test_one_bad_row_out_of_five_is_absorbed() {
        let reply = r#"[
            {"date":"2025-12-01","amount":-100.00,"type":"withdrawal","balance":900.00},
            {"date":"2025-12-02","amount":"not a number","type":"withdrawal","balance":800.00},
            {"date":"2025-12-03","amount":-100.00,"type":"withdrawal","balance":700.00},
            {"date":"2025-12-04","amount":200.00,"type":"deposit","balance":900.00},
            {"date":"2025-12-05","amount":-50.00,"type":"withdrawal","balance":850.00}
        ]"#;
        let result = parse(reply);

        assert_eq!(result.total_processed, 4);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_string_amounts_and_missing_fields_coerced() {
        let reply = r#"[
            {"date":"2025-12-01","amount":"1,234.56","balance":"2,000.00"},
            {"description":"no date","amount":10}
        ]"#;
        let result = parse(reply);

        assert_eq!(result.total_processed, 1);
        let tx = &result.transactions[0];
        assert_eq!(tx.amount, Decimal::from_str("1234.56").unwrap());
        assert_eq!(tx.balance, Decimal::from_str("2000.00").unwrap());
        // Sign decides the direction when the model omits the type.
        assert_eq!(tx.kind, TxKind::Deposit);
        assert_eq!(tx.description, "Transaction");
    }

    #[test]
    fn test_zero_amount_rows_dropped() {
        let reply = r#"[{"date":"2025-12-01","amount":0,"type":"deposit","balance":100.00}]"#;
        let result = parse(reply);
        assert_eq!(result.total_processed, 0);
        assert!(result.errors.is_empty());
    }
}
