//! Recognition engine abstraction.
//!
//! Defines the [`OcrEngine`] trait and unified types so the pipeline never
//! talks to a specific OCR backend directly. The default backend drives the
//! Tesseract CLI; tests substitute a scripted engine.

pub mod tesseract;

pub use tesseract::TesseractEngine;

use std::path::Path;

use crate::error::PipelineError;

/// Raw output of one engine run over a single image.
#[derive(Debug, Clone)]
pub struct Recognition {
    /// Recognized text, untrimmed.
    pub text: String,
    /// Per-token confidence values as emitted by the engine, including the
    /// -1/0 markers for non-text regions. Filtering happens during scoring.
    pub token_confidences: Vec<f64>,
}

/// Parameters for one engine invocation.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    /// `+`-joined language codes, e.g. `eng+deu`.
    pub language: String,
    /// Page segmentation mode.
    pub psm: u32,
    /// Engine mode.
    pub oem: u32,
}

/// Async trait implemented by each recognition backend.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Run recognition on a single raster image.
    async fn recognize(
        &self,
        image: &Path,
        request: &EngineRequest,
    ) -> Result<Recognition, PipelineError>;

    /// Engine version banner, used by the health probe.
    async fn version(&self) -> Result<String, PipelineError>;

    /// Sorted language codes the engine has data for.
    async fn list_languages(&self) -> Result<Vec<String>, PipelineError>;
}
