//! Document acquisition: raw bytes to extracted text or page images.

mod docx;
mod pdf;

pub use pdf::StatementPdf;

use image::DynamicImage;
use tracing::debug;

use crate::error::AcquireError;
use crate::models::config::PdfConfig;

/// Supported input formats, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
    Docx,
    Image,
}

impl DocumentKind {
    /// Map a file extension to a kind. `None` means the upload boundary
    /// should reject the file before the pipeline runs.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "text" => Some(Self::PlainText),
            "docx" => Some(Self::Docx),
            "png" | "jpg" | "jpeg" | "tiff" | "bmp" => Some(Self::Image),
            _ => None,
        }
    }
}

/// A rasterized statement page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Page number (1-indexed).
    pub number: u32,
    pub image: DynamicImage,
}

impl PageImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// What acquisition produced for a document.
#[derive(Debug, Clone)]
pub enum AcquiredContent {
    /// A usable text layer.
    Text(String),
    /// Page images for a recognition fallback, in page order.
    Pages(Vec<PageImage>),
}

/// Count the characters that actually carry signal.
pub fn signal_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// True when extracted text is too thin to trust and recognition should run.
pub fn below_signal_threshold(text: &str, threshold: usize) -> bool {
    signal_chars(text) < threshold
}

/// Turn raw document bytes into extracted text or page images.
///
/// Total failure to read the document is fatal for the invocation; per-page
/// problems inside a PDF degrade to a partial result instead.
pub fn acquire(
    bytes: &[u8],
    kind: DocumentKind,
    config: &PdfConfig,
) -> Result<AcquiredContent, AcquireError> {
    match kind {
        DocumentKind::PlainText => Ok(AcquiredContent::Text(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        DocumentKind::Docx => docx::extract_text(bytes).map(AcquiredContent::Text),
        DocumentKind::Image => {
            let image = image::load_from_memory(bytes)
                .map_err(|e| AcquireError::ImageDecode(e.to_string()))?;
            Ok(AcquiredContent::Pages(vec![PageImage { number: 1, image }]))
        }
        DocumentKind::Pdf => acquire_pdf(bytes, config),
    }
}

fn acquire_pdf(bytes: &[u8], config: &PdfConfig) -> Result<AcquiredContent, AcquireError> {
    let pdf = StatementPdf::load(bytes)?;

    let text = pdf.extract_text(config.max_text_pages).unwrap_or_else(|e| {
        debug!("text-layer extraction failed: {e}");
        String::new()
    });

    if !below_signal_threshold(&text, config.signal_threshold) {
        return Ok(AcquiredContent::Text(text));
    }

    debug!(
        "text layer carries {} non-whitespace chars, collecting page images",
        signal_chars(&text)
    );

    let pages = pdf.page_images(config.max_ocr_pages);
    if pages.is_empty() {
        // Nothing to recognize; hand back whatever thin text there was.
        return Ok(AcquiredContent::Text(text));
    }
    Ok(AcquiredContent::Pages(pages))
}
