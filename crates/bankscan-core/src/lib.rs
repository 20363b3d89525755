//! Core library for bank-statement transaction extraction.
//!
//! This crate provides:
//! - Document acquisition (PDF text layer, page images, DOCX, plain text)
//! - Recognition adapters (text-layer passthrough, OCR over page images)
//! - A heuristic line scanner for offline extraction
//! - A model-assisted extractor with a fixed instruction contract
//! - Shared normalization and validation behind a single `ParseResult` shape

pub mod acquire;
pub mod error;
pub mod heuristic;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod ocr;
pub mod pipeline;

pub use acquire::{AcquiredContent, DocumentKind, PageImage, StatementPdf, acquire};
pub use error::{AcquireError, ModelError, OcrError, Result, ScanError};
pub use heuristic::HeuristicExtractor;
pub use llm::{AiExtractor, AiInput, ModelClient};
pub use models::config::{AiConfig, HeuristicConfig, OcrConfig, PdfConfig, ScanConfig};
pub use models::transaction::{BankSource, ParseResult, RawCandidate, Transaction, TxKind};
pub use normalize::Normalizer;
#[cfg(feature = "native")]
pub use ocr::PaddleBackend;
pub use ocr::{OcrAdapter, OcrBackend};
pub use pipeline::{
    Pipeline, ProcessOptions, ProgressEvent, StrategyKind, StrategyPreference,
};
