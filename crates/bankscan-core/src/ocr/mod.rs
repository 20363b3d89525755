//! Optical character recognition over rasterized statement pages.
//!
//! The recognition engine itself is an external capability behind
//! [`OcrBackend`]; this module owns page ordering, progress reporting, and
//! cancellation. OCR is the slowest stage of the pipeline (tens of seconds
//! per page), which is why it reports per-page progress and is only chosen
//! when the text layer carries too little signal.

#[cfg(feature = "native")]
mod onnx;

#[cfg(feature = "native")]
pub use onnx::PaddleBackend;

use std::sync::Arc;

use image::DynamicImage;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::acquire::PageImage;
use crate::error::{OcrError, ScanError};
use crate::pipeline::ProgressEvent;

/// Callback for within-page recognition progress, 0.0 to 1.0.
pub type ProgressFn<'a> = &'a (dyn Fn(f32) + Send + Sync);

/// An external recognition capability.
///
/// Implementations are configured for the statement language set (simplified
/// Chinese, traditional Chinese, and English at minimum) and may report
/// within-page progress at whatever granularity they have.
pub trait OcrBackend: Send + Sync {
    fn recognize_page(
        &self,
        image: &DynamicImage,
        progress: ProgressFn<'_>,
    ) -> Result<String, OcrError>;
}

/// Drives an [`OcrBackend`] across a page deck.
pub struct OcrAdapter {
    backend: Arc<dyn OcrBackend>,
}

impl OcrAdapter {
    pub fn new(backend: Arc<dyn OcrBackend>) -> Self {
        Self { backend }
    }

    /// Recognize every page, concatenating results strictly in page order.
    ///
    /// Each page runs on the blocking pool; cancellation is honored between
    /// pages and while a page is in flight (the page buffers are simply
    /// dropped). A page that fails is skipped; if no page yields text the
    /// whole call is an upstream failure.
    pub async fn recognize_pages(
        &self,
        pages: &[PageImage],
        progress: Option<&UnboundedSender<ProgressEvent>>,
        cancel: &CancellationToken,
    ) -> Result<String, ScanError> {
        let total = pages.len();
        let mut texts: Vec<String> = Vec::with_capacity(total);
        let mut failures = 0usize;

        for (index, page) in pages.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }

            let backend = Arc::clone(&self.backend);
            let image = page.image.clone();
            let page_progress = progress.cloned();
            let handle = tokio::task::spawn_blocking(move || {
                let report = move |fraction: f32| {
                    if let Some(tx) = &page_progress {
                        let _ = tx.send(ProgressEvent::OcrPage {
                            page: index + 1,
                            total,
                            percent: (fraction.clamp(0.0, 1.0) * 100.0) as u8,
                        });
                    }
                };
                backend.recognize_page(&image, &report)
            });

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ScanError::Cancelled),
                joined = handle => joined,
            };

            match outcome {
                Ok(Ok(text)) => {
                    debug!(
                        "page {}/{} recognized, {} chars",
                        index + 1,
                        total,
                        text.len()
                    );
                    texts.push(text);
                }
                Ok(Err(e)) => {
                    warn!("OCR failed on page {}: {e}", index + 1);
                    failures += 1;
                }
                Err(e) => {
                    warn!("OCR task failed on page {}: {e}", index + 1);
                    failures += 1;
                }
            }
        }

        if texts.is_empty() && failures > 0 {
            return Err(OcrError::Recognition(format!("all {failures} pages failed")).into());
        }

        Ok(texts.join("\n"))
    }
}
