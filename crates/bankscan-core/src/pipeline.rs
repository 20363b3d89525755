//! Extraction orchestrator: strategy selection, fallback, progress, and
//! cancellation.
//!
//! The orchestrator walks a small state machine per document:
//! `Start -> TextExtracted -> {OcrNeeded | OcrSkipped} -> StrategyChosen ->
//! Completed`, with an `AiFallback` branch taken when a cheaper strategy
//! produced nothing or the caller asked for the model up front. Model calls
//! are costly, so at most one is made per document and there is no general
//! retry loop across strategies.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acquire::{self, AcquiredContent, DocumentKind, PageImage};
use crate::error::{OcrError, Result, ScanError};
use crate::heuristic::HeuristicExtractor;
use crate::llm::{AiExtractor, AiInput, ModelClient};
use crate::models::config::ScanConfig;
use crate::models::transaction::ParseResult;
use crate::normalize::Normalizer;
use crate::ocr::{OcrAdapter, OcrBackend};

/// Which strategy the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyPreference {
    /// Heuristic first, model-assisted fallback when it finds nothing.
    #[default]
    Auto,
    /// Never call the model (offline mode; lower precision).
    HeuristicOnly,
    /// Go straight to the model-assisted extractor.
    AiPreferred,
}

/// Which extractor produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Heuristic,
    AiAssisted,
}

/// Events on the progress side channel. OCR is the slow stage and reports
/// per page with a within-page percentage.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    AcquisitionStarted,
    TextExtracted { chars: usize },
    OcrStarted { pages: usize },
    OcrPage { page: usize, total: usize, percent: u8 },
    OcrCompleted,
    StrategySelected(StrategyKind),
    ModelRequestStarted,
    Completed { transactions: usize },
}

/// Orchestrator states; `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Start,
    TextExtracted,
    OcrNeeded,
    OcrSkipped,
    StrategyChosen,
    AiFallback,
    Completed,
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    debug!("pipeline state {:?} -> {:?}", state, next);
    *state = next;
}

/// Per-invocation options.
#[derive(Default)]
pub struct ProcessOptions {
    pub strategy: StrategyPreference,

    /// Cancellation signal, honored at every suspension point. A cancelled
    /// run never returns a partial result.
    pub cancel: CancellationToken,

    /// Progress side channel.
    pub progress: Option<UnboundedSender<ProgressEvent>>,
}

/// The document-processing pipeline.
///
/// Holds read-only configuration and the external capabilities. Every
/// `process` call is independent and owns all of its intermediate state, so
/// one pipeline may serve concurrent invocations.
pub struct Pipeline {
    config: ScanConfig,
    ocr: Option<Arc<dyn OcrBackend>>,
    model: Option<ModelClient>,
}

impl Pipeline {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            ocr: None,
            model: None,
        }
    }

    pub fn with_ocr_backend(mut self, backend: Arc<dyn OcrBackend>) -> Self {
        self.ocr = Some(backend);
        self
    }

    pub fn with_model_client(mut self, client: ModelClient) -> Self {
        self.model = Some(client);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Process one document.
    ///
    /// Every outcome short of cancellation is a `ParseResult`; total
    /// failures come back with an error message and zero rows rather than
    /// as an `Err`.
    pub async fn process(
        &self,
        bytes: &[u8],
        kind: DocumentKind,
        options: &ProcessOptions,
    ) -> Result<ParseResult> {
        let mut state = PipelineState::Start;
        let normalizer = Normalizer::new(self.config.default_source);
        let progress = options.progress.as_ref();
        let cancel = &options.cancel;

        send(progress, ProgressEvent::AcquisitionStarted);

        // Acquisition can chew through a large scanned PDF; keep it off the
        // async threads and cancellable.
        let acquired = {
            let bytes_owned = bytes.to_vec();
            let pdf_config = self.config.pdf.clone();
            let handle = tokio::task::spawn_blocking(move || {
                acquire::acquire(&bytes_owned, kind, &pdf_config)
            });
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ScanError::Cancelled),
                joined = handle => joined,
            };
            match joined {
                Ok(Ok(content)) => content,
                Ok(Err(e)) => {
                    warn!("acquisition failed: {e}");
                    return Ok(finish(
                        ParseResult::failure(format!("failed to read document: {e}")),
                        progress,
                    ));
                }
                Err(e) => {
                    return Ok(finish(
                        ParseResult::failure(format!("acquisition task failed: {e}")),
                        progress,
                    ));
                }
            }
        };

        // AI-preferred mode skips recognition entirely; the capability takes
        // the document or its pages natively.
        if options.strategy == StrategyPreference::AiPreferred {
            transition(&mut state, PipelineState::StrategyChosen);
            let result = self
                .run_ai(bytes, kind, &acquired, &normalizer, options)
                .await?;
            transition(&mut state, PipelineState::Completed);
            return Ok(finish(result, progress));
        }

        let text = match &acquired {
            AcquiredContent::Text(text) => {
                transition(&mut state, PipelineState::TextExtracted);
                send(
                    progress,
                    ProgressEvent::TextExtracted {
                        chars: acquire::signal_chars(text),
                    },
                );
                transition(&mut state, PipelineState::OcrSkipped);
                text.clone()
            }
            AcquiredContent::Pages(pages) => {
                transition(&mut state, PipelineState::OcrNeeded);
                match self.run_ocr(pages, options).await {
                    Ok(text) => text,
                    Err(ScanError::Cancelled) => return Err(ScanError::Cancelled),
                    Err(e) => {
                        // Recognition capability is down; the model path can
                        // still look at the pages directly.
                        warn!("OCR unavailable: {e}");
                        if self.can_fall_back(options.strategy) {
                            transition(&mut state, PipelineState::AiFallback);
                            let result = self
                                .run_ai(bytes, kind, &acquired, &normalizer, options)
                                .await?;
                            transition(&mut state, PipelineState::Completed);
                            return Ok(finish(result, progress));
                        }
                        return Ok(finish(
                            ParseResult::failure(format!("recognition failed: {e}")),
                            progress,
                        ));
                    }
                }
            }
        };

        if acquire::below_signal_threshold(&text, self.config.pdf.signal_threshold) {
            // Too little signal even after the recognition step.
            if self.can_fall_back(options.strategy) {
                transition(&mut state, PipelineState::AiFallback);
                let result = self
                    .run_ai(bytes, kind, &acquired, &normalizer, options)
                    .await?;
                transition(&mut state, PipelineState::Completed);
                return Ok(finish(result, progress));
            }
            return Ok(finish(
                ParseResult::failure("recognized text is below the usable signal threshold"),
                progress,
            ));
        }

        transition(&mut state, PipelineState::StrategyChosen);
        send(
            progress,
            ProgressEvent::StrategySelected(StrategyKind::Heuristic),
        );

        let extractor = HeuristicExtractor::new(self.config.heuristic.clone());
        let result = extractor.extract(&text, &normalizer);
        info!("heuristic pass found {} transactions", result.total_processed);

        if result.is_empty() && self.can_fall_back(options.strategy) {
            debug!("heuristic pass found nothing, escalating to the model");
            transition(&mut state, PipelineState::AiFallback);
            let result = self
                .run_ai(bytes, kind, &acquired, &normalizer, options)
                .await?;
            transition(&mut state, PipelineState::Completed);
            return Ok(finish(result, progress));
        }

        transition(&mut state, PipelineState::Completed);
        Ok(finish(result, progress))
    }

    fn can_fall_back(&self, strategy: StrategyPreference) -> bool {
        strategy != StrategyPreference::HeuristicOnly && self.model.is_some()
    }

    async fn run_ocr(&self, pages: &[PageImage], options: &ProcessOptions) -> Result<String> {
        let Some(backend) = self.ocr.clone() else {
            return Err(OcrError::NoBackend.into());
        };

        send(
            options.progress.as_ref(),
            ProgressEvent::OcrStarted { pages: pages.len() },
        );

        let adapter = OcrAdapter::new(backend);
        let text = adapter
            .recognize_pages(pages, options.progress.as_ref(), &options.cancel)
            .await?;

        send(options.progress.as_ref(), ProgressEvent::OcrCompleted);
        info!(
            "OCR produced {} chars across {} pages",
            text.len(),
            pages.len()
        );
        Ok(text)
    }

    async fn run_ai(
        &self,
        bytes: &[u8],
        kind: DocumentKind,
        acquired: &AcquiredContent,
        normalizer: &Normalizer,
        options: &ProcessOptions,
    ) -> Result<ParseResult> {
        let Some(client) = &self.model else {
            return Ok(ParseResult::failure(
                "model-assisted extraction requested but no model client is configured",
            ));
        };

        send(
            options.progress.as_ref(),
            ProgressEvent::StrategySelected(StrategyKind::AiAssisted),
        );
        send(options.progress.as_ref(), ProgressEvent::ModelRequestStarted);

        // PDFs go to the capability natively; other formats fall back to
        // their pages or recognized text.
        let input = match (kind, acquired) {
            (DocumentKind::Pdf, _) => AiInput::Document {
                bytes,
                media_type: "application/pdf",
            },
            (_, AcquiredContent::Pages(pages)) => AiInput::Pages(pages),
            (_, AcquiredContent::Text(text)) => AiInput::Text(text),
        };

        let extractor = AiExtractor::new(client);
        extractor.extract(input, normalizer, &options.cancel).await
    }
}

fn finish(result: ParseResult, progress: Option<&UnboundedSender<ProgressEvent>>) -> ParseResult {
    send(
        progress,
        ProgressEvent::Completed {
            transactions: result.total_processed,
        },
    );
    result
}

fn send(progress: Option<&UnboundedSender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = progress {
        let _ = tx.send(event);
    }
}
