//! Batch orchestration over independent uploads.
//!
//! Items are processed one at a time in submission order. Validation
//! failures and pipeline failures are recorded per item; nothing a single
//! item does can abort its siblings.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{self, ServiceConfig};
use crate::error::{PipelineError, ValidationError};
use crate::extract::Extractor;
use crate::pdf::PageSplitter;
use crate::schema::{BatchEntry, BatchResult, FileOutcome, OcrOptions};
use crate::scratch::ScratchFile;

/// One uploaded file queued for processing.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Drives the pipeline over a collection of uploads.
pub struct BatchCoordinator {
    extractor: Arc<Extractor>,
    splitter: Arc<PageSplitter>,
    config: Arc<ServiceConfig>,
}

impl BatchCoordinator {
    pub fn new(
        extractor: Arc<Extractor>,
        splitter: Arc<PageSplitter>,
        config: Arc<ServiceConfig>,
    ) -> Self {
        Self {
            extractor,
            splitter,
            config,
        }
    }

    /// Process every item in submission order with one shared parameter
    /// set. Individual failures land in that item's entry and never stop
    /// the batch.
    pub async fn run(&self, items: Vec<UploadItem>, opts: &OcrOptions) -> BatchResult {
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            entries.push(self.process_item(item, opts).await);
        }

        let result = BatchResult::from_entries(entries);
        info!(
            "batch complete: {} ok, {} failed of {}",
            result.processed_files, result.failed_files, result.total_files
        );
        result
    }

    async fn process_item(&self, item: UploadItem, opts: &OcrOptions) -> BatchEntry {
        // Rejected items never touch the temp directory.
        if let Err(err) = validate_item(&item) {
            return BatchEntry::Rejected {
                filename: item.filename,
                error: err.to_string(),
            };
        }

        let ext = config::file_extension(&item.filename);
        match self.process_file(&item, &ext, opts).await {
            Ok(outcome) => BatchEntry::Processed {
                filename: item.filename,
                outcome,
            },
            Err(err) => {
                warn!("could not stage {}: {}", item.filename, err);
                BatchEntry::Rejected {
                    filename: item.filename,
                    error: err.to_string(),
                }
            }
        }
    }

    /// Stage one upload to a scratch file and route it to the document or
    /// image path. Shared by the batch loop and the single-file endpoint
    /// so both behave identically.
    pub async fn process_file(
        &self,
        item: &UploadItem,
        ext: &str,
        opts: &OcrOptions,
    ) -> Result<FileOutcome, PipelineError> {
        let upload =
            ScratchFile::with_bytes(&self.config.temp_dir, "upload", ext, &item.bytes).await?;

        let outcome = if ext == ".pdf" {
            FileOutcome::Document(self.splitter.process(upload.path(), opts).await)
        } else {
            FileOutcome::Image(self.extractor.extract(upload.path(), opts).await)
        };
        Ok(outcome)
        // `upload` drops here, removing the staged bytes.
    }
}

/// Per-item validation for batch entries.
fn validate_item(item: &UploadItem) -> Result<(), ValidationError> {
    if item.filename.trim().is_empty() {
        return Err(ValidationError::EmptyFilename);
    }
    let ext = config::file_extension(&item.filename);
    if !config::is_supported(&ext) {
        return Err(ValidationError::UnsupportedFormat {
            ext,
            supported: config::supported_list(),
        });
    }
    if item.bytes.len() as u64 > config::MAX_FILE_SIZE {
        return Err(ValidationError::FileTooLarge {
            max: config::MAX_FILE_SIZE,
        });
    }
    Ok(())
}
