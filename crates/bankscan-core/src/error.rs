//! Error types for the bankscan-core library.

use thiserror::Error;

/// Main error type for the bankscan library.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Document acquisition error.
    #[error("acquisition error: {0}")]
    Acquire(#[from] AcquireError),

    /// Optical character recognition error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Model-assisted extraction error.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// The file type is outside the supported allow-list. Raised before the
    /// pipeline runs.
    #[error("unsupported input: {0}")]
    Unsupported(String),

    /// The caller cancelled processing. Never carries a partial result.
    #[error("processing cancelled")]
    Cancelled,
}

/// Errors turning raw document bytes into text or page images.
#[derive(Error, Debug)]
pub enum AcquireError {
    /// The document could not be parsed at all.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Text-layer extraction failed.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// Page-image extraction failed.
    #[error("failed to extract page images: {0}")]
    PageExtraction(String),

    /// The PDF is password-protected with a non-empty password.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// The DOCX container or its document body could not be read.
    #[error("failed to read DOCX: {0}")]
    Docx(String),

    /// An uploaded image could not be decoded.
    #[error("failed to decode image: {0}")]
    ImageDecode(String),
}

/// Errors from the recognition capability.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The pipeline needed OCR but none was configured.
    #[error("no OCR backend configured")]
    NoBackend,

    /// Failed to load recognition models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Recognition itself failed.
    #[error("recognition failed: {0}")]
    Recognition(String),
}

/// Errors from the structured-extraction capability.
#[derive(Error, Debug)]
pub enum ModelError {
    /// No API key in config or environment.
    #[error("no API key configured for the model endpoint")]
    MissingApiKey,

    /// Transport-level failure (DNS, TLS, timeout).
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("model endpoint returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The reply carried no text content.
    #[error("model returned no text content")]
    EmptyResponse,
}

/// Result type for the bankscan library.
pub type Result<T> = std::result::Result<T, ScanError>;
