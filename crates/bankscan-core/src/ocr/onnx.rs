//! Bundled recognition backend using `pure-onnx-ocr` (pure Rust, no external
//! ONNX Runtime).

use image::DynamicImage;
use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, info};

use super::{OcrBackend, ProgressFn};
use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// PaddleOCR-style detection + recognition backend.
///
/// Script coverage comes from the model set on disk; statement processing
/// expects a recognition model and dictionary spanning the languages listed
/// in [`OcrConfig::languages`].
pub struct PaddleBackend {
    engine: pure_onnx_ocr::engine::OcrEngine,
}

impl PaddleBackend {
    /// Load models from the configured directory.
    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        let det_path = config.model_dir.join(&config.detection_model);
        let rec_path = config.model_dir.join(&config.recognition_model);
        let dict_path = config.model_dir.join(&config.dictionary);

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(OcrError::ModelLoad(format!(
                    "model file not found: {}",
                    path.display()
                )));
            }
        }

        Self::from_paths(&det_path, &rec_path, &dict_path)
    }

    fn from_paths(det: &Path, rec: &Path, dict: &Path) -> Result<Self, OcrError> {
        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(det)
            .rec_model_path(rec)
            .dictionary_path(dict)
            .build()
            .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {e}")))?;

        info!("loaded OCR models ({})", det.display());
        Ok(Self { engine })
    }
}

impl OcrBackend for PaddleBackend {
    fn recognize_page(
        &self,
        image: &DynamicImage,
        progress: ProgressFn<'_>,
    ) -> Result<String, OcrError> {
        progress(0.0);

        let regions = self
            .engine
            .run_from_image(image)
            .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {e}")))?;

        debug!("recognized {} text regions", regions.len());

        // Reading order: group regions into rows by approximate vertical
        // position, left to right within a row. Regions on one visual row
        // are joined with spaces so a statement row stays one text line.
        let mut placed: Vec<(i32, f64, String)> = regions
            .iter()
            .map(|r| {
                let (x, y) = top_left(&r.bounding_box);
                ((y / 20.0) as i32, x, r.text.clone())
            })
            .collect();
        placed.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        });

        let mut text = String::new();
        let mut current_row: Option<i32> = None;
        for (row, _, fragment) in placed {
            match current_row {
                Some(r) if r == row => text.push(' '),
                Some(_) => text.push('\n'),
                None => {}
            }
            current_row = Some(row);
            text.push_str(&fragment);
        }

        progress(1.0);
        Ok(text)
    }
}

fn top_left(polygon: &pure_onnx_ocr::Polygon<f64>) -> (f64, f64) {
    polygon
        .exterior()
        .coords()
        .next()
        .map(|c| (c.x, c.y))
        .unwrap_or((0.0, 0.0))
}
