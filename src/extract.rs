//! Single-image text extraction with confidence scoring.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::engine::{EngineRequest, OcrEngine};
use crate::error::PipelineError;
use crate::preprocess::Preprocessor;
use crate::schema::{round2, ExtractionResult, OcrOptions};

/// Runs the recognition engine over one image and scores the output.
pub struct Extractor {
    engine: Arc<dyn OcrEngine>,
    preprocessor: Preprocessor,
}

impl Extractor {
    pub fn new(engine: Arc<dyn OcrEngine>, config: Arc<ServiceConfig>) -> Self {
        Self {
            preprocessor: Preprocessor::new(config),
            engine,
        }
    }

    /// Extract text from a single image. Engine failures never escape:
    /// they come back as a result with an error field and zero confidence.
    pub async fn extract(&self, image: &Path, opts: &OcrOptions) -> ExtractionResult {
        match self.try_extract(image, opts).await {
            Ok(result) => result,
            Err(err) => {
                warn!("extraction failed for {:?}: {}", image, err);
                ExtractionResult::failure(err.to_string(), opts)
            }
        }
    }

    async fn try_extract(
        &self,
        image: &Path,
        opts: &OcrOptions,
    ) -> Result<ExtractionResult, PipelineError> {
        // The enhanced copy lives in a scratch guard for the duration of
        // the engine call; preprocessing failure falls back to the
        // original image.
        let enhanced = if opts.preprocess {
            match self.preprocessor.enhance(image).await {
                Ok(scratch) => Some(scratch),
                Err(err) => {
                    warn!("preprocessing failed for {:?}, using original: {}", image, err);
                    None
                }
            }
        } else {
            None
        };
        let target = enhanced.as_ref().map(|s| s.path()).unwrap_or(image);

        let request = EngineRequest {
            language: opts.language_arg(),
            psm: opts.psm,
            oem: opts.oem,
        };
        let recognition = self.engine.recognize(target, &request).await?;

        let confidence = score_confidence(&recognition.token_confidences);
        let result = ExtractionResult::from_recognition(&recognition.text, confidence, opts);
        debug!(
            "extracted {} words at {:.2} confidence from {:?}",
            result.word_count, result.confidence, image
        );
        Ok(result)
        // `enhanced` drops here, removing the processed copy.
    }
}

/// Mean of strictly-positive token confidences, rounded to two decimals.
/// The engine emits -1/0 for non-text regions; those never count.
pub fn score_confidence(tokens: &[f64]) -> f64 {
    let positive: Vec<f64> = tokens.iter().copied().filter(|c| *c > 0.0).collect();
    if positive.is_empty() {
        return 0.0;
    }
    round2(positive.iter().sum::<f64>() / positive.len() as f64)
}
