//! Configuration structures for the statement pipeline.
//!
//! One `ScanConfig` is built at startup and passed by reference into every
//! stage that needs it; there is no implicit global state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::transaction::BankSource;

/// Main configuration for the bankscan pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// PDF acquisition configuration.
    pub pdf: PdfConfig,

    /// OCR capability configuration.
    pub ocr: OcrConfig,

    /// Heuristic line-scanner configuration.
    pub heuristic: HeuristicConfig,

    /// Model-assisted extraction configuration.
    pub ai: AiConfig,

    /// Bank code assumed when an extractor does not supply one.
    pub default_source: BankSource,
}

/// PDF acquisition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Maximum pages considered for layout-text extraction.
    pub max_text_pages: usize,

    /// Maximum pages collected as images for OCR or model input. OCR runs in
    /// the tens of seconds per page, so this stays small.
    pub max_ocr_pages: usize,

    /// Non-whitespace character count below which the text layer is
    /// considered unreliable and recognition kicks in.
    pub signal_threshold: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            max_text_pages: 10,
            max_ocr_pages: 5,
            signal_threshold: 100,
        }
    }
}

/// OCR capability configuration.
///
/// The model set determines script coverage; statements from the supported
/// banks mix Chinese and English, so the recognition model and dictionary
/// must cover all configured languages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Directory containing detection/recognition model files.
    pub model_dir: PathBuf,

    /// Text detection model file name.
    pub detection_model: String,

    /// Text recognition model file name.
    pub recognition_model: String,

    /// Character dictionary file name.
    pub dictionary: String,

    /// Scripts the model set must cover.
    pub languages: Vec<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detection_model: "det.onnx".to_string(),
            recognition_model: "rec.onnx".to_string(),
            dictionary: "dict.txt".to_string(),
            languages: vec![
                "chi_sim".to_string(),
                "chi_tra".to_string(),
                "eng".to_string(),
            ],
        }
    }
}

/// Heuristic line-scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Lines shorter than this (after trimming) are noise.
    pub min_line_chars: usize,

    /// Candidate amounts below this magnitude are treated as reference
    /// numbers, page counters, or similar noise.
    pub min_amount: u32,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            min_line_chars: 10,
            min_amount: 50,
        }
    }
}

/// Structured-extraction capability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// API key. Usually left unset here and provided through the
    /// `ANTHROPIC_API_KEY` environment variable instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier.
    pub model: String,

    /// Response token budget.
    pub max_tokens: u32,

    /// Request timeout in seconds. Statement extraction over a multi-page
    /// scan can take a while.
    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 8192,
            request_timeout_secs: 120,
        }
    }
}

impl ScanConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }
}
