//! PDF page fan-out.
//!
//! Rasterizes each page to a scratch PNG at a fixed resolution with
//! `pdftoppm`, feeds it through the extractor (preprocessing always on)
//! and merges the page results. Pages are strictly sequential; each page
//! raster is removed before the next page starts, so at most one page
//! image per request sits on disk.

use std::path::Path;
use std::sync::Arc;

use lopdf::Document;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{ServiceConfig, PDF_DPI};
use crate::error::PipelineError;
use crate::extract::Extractor;
use crate::schema::{assemble_document, DocumentResult, ExtractionResult, OcrOptions, PageResult};
use crate::scratch::ScratchFile;

pub struct PageSplitter {
    extractor: Arc<Extractor>,
    config: Arc<ServiceConfig>,
}

impl PageSplitter {
    pub fn new(extractor: Arc<Extractor>, config: Arc<ServiceConfig>) -> Self {
        Self { extractor, config }
    }

    /// Process a whole document. As with single-image extraction, failures
    /// are folded into the result rather than propagated.
    pub async fn process(&self, pdf: &Path, opts: &OcrOptions) -> DocumentResult {
        match self.try_process(pdf, opts).await {
            Ok(result) => result,
            Err(err) => {
                warn!("document processing failed for {:?}: {}", pdf, err);
                DocumentResult::failure(err.to_string(), opts)
            }
        }
    }

    async fn try_process(
        &self,
        pdf: &Path,
        opts: &OcrOptions,
    ) -> Result<DocumentResult, PipelineError> {
        let page_count = count_pages(pdf).await?;
        debug!(
            "rasterizing {} pages of {:?} at {} dpi",
            page_count, pdf, PDF_DPI
        );

        // Pages always run with preprocessing on.
        let page_opts = OcrOptions {
            preprocess: true,
            ..opts.clone()
        };

        let mut pages = Vec::with_capacity(page_count);
        for page in 1..=page_count as u32 {
            let raster = ScratchFile::allocate(&self.config.temp_dir, "page", "png");
            let result = match self.rasterize(pdf, page, &raster).await {
                Ok(()) => self.extractor.extract(raster.path(), &page_opts).await,
                Err(err) => {
                    warn!("failed to rasterize page {} of {:?}: {}", page, pdf, err);
                    ExtractionResult::failure(err.to_string(), &page_opts)
                }
            };
            pages.push(PageResult { page, result });
            // `raster` drops before the next iteration.
        }

        Ok(assemble_document(&pages, page_count, opts))
    }

    /// Render one page into `raster` via pdftoppm.
    async fn rasterize(
        &self,
        pdf: &Path,
        page: u32,
        raster: &ScratchFile,
    ) -> Result<(), PipelineError> {
        // pdftoppm appends `.png` to the output root itself.
        let out_root = raster.stem_path();
        let page_arg = page.to_string();
        let dpi_arg = PDF_DPI.to_string();

        let mut command = Command::new("pdftoppm");
        command
            .arg("-f")
            .arg(&page_arg)
            .arg("-l")
            .arg(&page_arg)
            .arg("-r")
            .arg(&dpi_arg)
            .arg("-png")
            .arg("-singlefile")
            .arg(pdf)
            .arg(&out_root);

        let output = tokio::time::timeout(self.config.engine_timeout, command.output())
            .await
            .map_err(|_| PipelineError::Rasterize(format!("pdftoppm timed out on page {page}")))?
            .map_err(|err| PipelineError::Rasterize(format!("failed to spawn pdftoppm: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Rasterize(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if !raster.path().exists() {
            return Err(PipelineError::Rasterize(format!(
                "no raster produced for page {page}"
            )));
        }
        Ok(())
    }
}

/// Page inventory via lopdf. Runs on the blocking pool; documents can be
/// large.
async fn count_pages(pdf: &Path) -> Result<usize, PipelineError> {
    let path = pdf.to_path_buf();
    tokio::task::spawn_blocking(move || {
        Document::load(&path)
            .map(|doc| doc.get_pages().len())
            .map_err(|err| PipelineError::PdfParse(err.to_string()))
    })
    .await
    .map_err(|err| PipelineError::PdfParse(format!("page count task failed: {err}")))?
}
