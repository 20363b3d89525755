//! End-to-end pipeline tests over in-memory documents.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageBuffer, Rgba};
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use bankscan_core::ocr::ProgressFn;
use bankscan_core::{
    DocumentKind, OcrBackend, OcrError, Pipeline, ProcessOptions, ProgressEvent, ScanConfig,
    ScanError, StrategyPreference, TxKind,
};

/// A statement body long enough to clear the signal threshold.
const STATEMENT_TEXT: &str = "\
BANK OF CHINA (HONG KONG) CONSOLIDATED STATEMENT ACCOUNT 012-345-6-789012 PAGE 1 OF 3 CURRENCY HKD
2025/12/01 balance brought forward
交換票 00123 3,960.00 50,000.00
存入 salary payment 12,000.00 62,000.00
";

struct FakeOcr {
    text: String,
}

impl OcrBackend for FakeOcr {
    fn recognize_page(
        &self,
        _image: &DynamicImage,
        progress: ProgressFn<'_>,
    ) -> Result<String, OcrError> {
        progress(0.5);
        Ok(self.text.clone())
    }
}

struct FailingOcr;

impl OcrBackend for FailingOcr {
    fn recognize_page(
        &self,
        _image: &DynamicImage,
        _progress: ProgressFn<'_>,
    ) -> Result<String, OcrError> {
        Err(OcrError::Recognition("backend offline".to_string()))
    }
}

fn png_bytes() -> Vec<u8> {
    let image = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(
        8,
        8,
        Rgba([255u8, 255, 255, 255]),
    ));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn heuristic_path_over_plain_text() {
    let pipeline = Pipeline::new(ScanConfig::default());
    let options = ProcessOptions::default();

    let result = pipeline
        .process(STATEMENT_TEXT.as_bytes(), DocumentKind::PlainText, &options)
        .await
        .unwrap();

    assert!(result.errors.is_empty());
    assert_eq!(result.total_processed, result.transactions.len());
    assert_eq!(result.total_processed, 2);

    let cheque = &result.transactions[0];
    assert_eq!(cheque.date.to_string(), "2025-12-01");
    assert_eq!(cheque.kind, TxKind::Withdrawal);
    assert_eq!(cheque.amount, Decimal::from_str("-3960.00").unwrap());
    assert_eq!(cheque.balance, Decimal::from_str("50000.00").unwrap());

    let salary = &result.transactions[1];
    assert_eq!(salary.kind, TxKind::Deposit);
    assert_eq!(salary.amount, Decimal::from_str("12000.00").unwrap());

    for tx in &result.transactions {
        assert!(!tx.amount.is_zero());
        assert_eq!(tx.kind == TxKind::Deposit, tx.amount > Decimal::ZERO);
    }
}

#[tokio::test]
async fn ocr_path_over_image_with_progress() {
    let pipeline = Pipeline::new(ScanConfig::default()).with_ocr_backend(Arc::new(FakeOcr {
        text: STATEMENT_TEXT.to_string(),
    }));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let options = ProcessOptions {
        progress: Some(tx),
        ..Default::default()
    };

    let result = pipeline
        .process(&png_bytes(), DocumentKind::Image, &options)
        .await
        .unwrap();

    assert_eq!(result.total_processed, 2);

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::OcrStarted { pages: 1 })));
    assert!(events.iter().any(
        |e| matches!(e, ProgressEvent::OcrPage { page: 1, total: 1, percent: 50 })
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::Completed { transactions: 2 })));
}

#[tokio::test]
async fn ocr_failure_without_fallback_is_reported() {
    let pipeline = Pipeline::new(ScanConfig::default()).with_ocr_backend(Arc::new(FailingOcr));
    let options = ProcessOptions::default();

    let result = pipeline
        .process(&png_bytes(), DocumentKind::Image, &options)
        .await
        .unwrap();

    assert_eq!(result.total_processed, 0);
    assert!(!result.errors.is_empty());
}

#[tokio::test]
async fn missing_ocr_backend_is_reported() {
    let pipeline = Pipeline::new(ScanConfig::default());
    let options = ProcessOptions::default();

    let result = pipeline
        .process(&png_bytes(), DocumentKind::Image, &options)
        .await
        .unwrap();

    assert_eq!(result.total_processed, 0);
    assert!(!result.errors.is_empty());
}

#[tokio::test]
async fn cancellation_is_a_distinct_error() {
    let pipeline = Pipeline::new(ScanConfig::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let options = ProcessOptions {
        cancel,
        ..Default::default()
    };

    let outcome = pipeline
        .process(STATEMENT_TEXT.as_bytes(), DocumentKind::PlainText, &options)
        .await;

    assert!(matches!(outcome, Err(ScanError::Cancelled)));
}

#[tokio::test]
async fn thin_text_without_fallback_reports_low_signal() {
    // Under 100 non-whitespace characters and no model client configured.
    let thin = "2025/12/01 提取 3,960.00 50,000.00";
    let pipeline = Pipeline::new(ScanConfig::default());
    let options = ProcessOptions::default();

    let result = pipeline
        .process(thin.as_bytes(), DocumentKind::PlainText, &options)
        .await
        .unwrap();

    assert_eq!(result.total_processed, 0);
    assert!(!result.errors.is_empty());
}

#[tokio::test]
async fn heuristic_only_mode_never_needs_a_model() {
    let pipeline = Pipeline::new(ScanConfig::default());
    let options = ProcessOptions {
        strategy: StrategyPreference::HeuristicOnly,
        ..Default::default()
    };

    // A long document with no recognizable rows: offline mode yields an
    // empty result rather than escalating anywhere.
    let text = "terms and conditions ".repeat(20);
    let result = pipeline
        .process(text.as_bytes(), DocumentKind::PlainText, &options)
        .await
        .unwrap();

    assert_eq!(result.total_processed, 0);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn unsupported_docx_bytes_fail_gracefully() {
    let pipeline = Pipeline::new(ScanConfig::default());
    let options = ProcessOptions::default();

    let result = pipeline
        .process(b"not a zip container", DocumentKind::Docx, &options)
        .await
        .unwrap();

    assert_eq!(result.total_processed, 0);
    assert!(!result.errors.is_empty());
}
