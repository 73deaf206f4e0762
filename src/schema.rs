//! Wire types for OCR responses.
//!
//! These structs are the JSON contract of the service. Pipeline components
//! build them; the HTTP layer only attaches request metadata on top via
//! [`OcrResponse`].

use serde::Serialize;

use crate::config;

/// Recognition parameters shared by every file in a request.
#[derive(Debug, Clone)]
pub struct OcrOptions {
    pub languages: Vec<String>,
    pub psm: u32,
    pub oem: u32,
    pub preprocess: bool,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            languages: vec![config::DEFAULT_LANGUAGE.to_string()],
            psm: config::DEFAULT_PSM,
            oem: config::DEFAULT_OEM,
            preprocess: true,
        }
    }
}

impl OcrOptions {
    /// `+`-joined language argument for the engine.
    pub fn language_arg(&self) -> String {
        self.languages.join("+")
    }
}

/// Echo of the settings used for a single image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageSettings {
    pub psm: u32,
    pub oem: u32,
    pub preprocessed: bool,
}

/// Echo of the settings used for a document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSettings {
    pub psm: u32,
    pub oem: u32,
    pub dpi: u32,
}

/// Outcome of recognizing a single image.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub text: String,
    pub confidence: f64,
    pub word_count: usize,
    pub char_count: usize,
    pub languages_used: Vec<String>,
    pub processing_settings: ImageSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    /// Build a successful result from recognized text and its aggregate
    /// confidence. Counts are derived from the trimmed text.
    pub fn from_recognition(text: &str, confidence: f64, opts: &OcrOptions) -> Self {
        let text = text.trim();
        Self {
            text: text.to_string(),
            confidence,
            word_count: text.split_whitespace().count(),
            char_count: text.chars().count(),
            languages_used: opts.languages.clone(),
            processing_settings: ImageSettings {
                psm: opts.psm,
                oem: opts.oem,
                preprocessed: opts.preprocess,
            },
            error: None,
        }
    }

    /// Failed item: empty text, zero confidence, error message set.
    pub fn failure(error: impl Into<String>, opts: &OcrOptions) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            word_count: 0,
            char_count: 0,
            languages_used: opts.languages.clone(),
            processing_settings: ImageSettings {
                psm: opts.psm,
                oem: opts.oem,
                preprocessed: opts.preprocess,
            },
            error: Some(error.into()),
        }
    }
}

/// One page of a document, 1-indexed in rasterization order.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    pub page: u32,
    #[serde(flatten)]
    pub result: ExtractionResult,
}

/// Aggregated outcome of a multi-page document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResult {
    pub text: String,
    pub confidence: f64,
    pub word_count: usize,
    pub char_count: usize,
    pub page_count: usize,
    pub pages_processed: usize,
    pub languages_used: Vec<String>,
    pub processing_settings: DocumentSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentResult {
    /// Failed document: nothing extracted, error message set.
    pub fn failure(error: impl Into<String>, opts: &OcrOptions) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            word_count: 0,
            char_count: 0,
            page_count: 0,
            pages_processed: 0,
            languages_used: opts.languages.clone(),
            processing_settings: DocumentSettings {
                psm: opts.psm,
                oem: opts.oem,
                dpi: config::PDF_DPI,
            },
            error: Some(error.into()),
        }
    }
}

/// Combine per-page results into a document result.
///
/// Only pages with non-empty text contribute to the combined transcript and
/// the confidence average; `page_count` still counts every rasterized page.
pub fn assemble_document(
    pages: &[PageResult],
    page_count: usize,
    opts: &OcrOptions,
) -> DocumentResult {
    let contributing: Vec<&PageResult> = pages
        .iter()
        .filter(|page| !page.result.text.is_empty())
        .collect();

    let text = contributing
        .iter()
        .map(|page| format!("=== Page {} ===\n{}", page.page, page.result.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    let confidence = if contributing.is_empty() {
        0.0
    } else {
        round2(
            contributing.iter().map(|p| p.result.confidence).sum::<f64>()
                / contributing.len() as f64,
        )
    };

    DocumentResult {
        word_count: text.split_whitespace().count(),
        char_count: text.chars().count(),
        text,
        confidence,
        page_count,
        pages_processed: contributing.len(),
        languages_used: opts.languages.clone(),
        processing_settings: DocumentSettings {
            psm: opts.psm,
            oem: opts.oem,
            dpi: config::PDF_DPI,
        },
        error: None,
    }
}

/// Result of one file, image or document.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FileOutcome {
    Image(ExtractionResult),
    Document(DocumentResult),
}

impl FileOutcome {
    pub fn error(&self) -> Option<&str> {
        match self {
            FileOutcome::Image(result) => result.error.as_deref(),
            FileOutcome::Document(result) => result.error.as_deref(),
        }
    }
}

/// One entry in a batch response, in submission order.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchEntry {
    /// The item went through the pipeline (its result may still carry an
    /// error field).
    Processed {
        filename: String,
        #[serde(flatten)]
        outcome: FileOutcome,
    },
    /// The item was rejected before any processing.
    Rejected { filename: String, error: String },
}

impl BatchEntry {
    pub fn failed(&self) -> bool {
        match self {
            BatchEntry::Rejected { .. } => true,
            BatchEntry::Processed { outcome, .. } => outcome.error().is_some(),
        }
    }
}

/// Batch outcome plus totals.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub batch_results: Vec<BatchEntry>,
    pub total_files: usize,
    pub processed_files: usize,
    pub failed_files: usize,
}

impl BatchResult {
    pub fn from_entries(entries: Vec<BatchEntry>) -> Self {
        let failed = entries.iter().filter(|entry| entry.failed()).count();
        Self {
            total_files: entries.len(),
            processed_files: entries.len() - failed,
            failed_files: failed,
            batch_results: entries,
        }
    }
}

/// Single-file response: the pipeline outcome plus request metadata.
#[derive(Debug, Clone, Serialize)]
pub struct OcrResponse {
    #[serde(flatten)]
    pub outcome: FileOutcome,
    pub filename: String,
    pub file_size: u64,
    pub processing_time: String,
    pub service: String,
}

impl OcrResponse {
    /// Attach request metadata without touching the pipeline's own fields.
    pub fn new(outcome: FileOutcome, filename: String, file_size: u64, service: &str) -> Self {
        Self {
            outcome,
            filename,
            file_size,
            processing_time: chrono::Utc::now().to_rfc3339(),
            service: service.to_string(),
        }
    }
}

/// Round to two decimal places, the precision used for every confidence
/// value the service reports.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
