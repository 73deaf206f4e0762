//! Tesseract CLI backend.
//!
//! Shells out to the `tesseract` binary: one run in TSV mode for per-token
//! confidence data, one in plain-text mode for the transcript. Both runs
//! are bounded by the configured engine timeout; a timeout surfaces as a
//! per-item failure, not a service failure.

use std::path::Path;
use std::process::Output;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{EngineRequest, OcrEngine, Recognition};
use crate::config::ServiceConfig;
use crate::error::PipelineError;

pub struct TesseractEngine {
    config: Arc<ServiceConfig>,
}

impl TesseractEngine {
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        Self { config }
    }

    async fn run(&self, args: &[&str]) -> Result<Output, PipelineError> {
        let timeout = self.config.engine_timeout;
        let mut command = Command::new("tesseract");
        command.args(args);

        match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(PipelineError::Engine(format!(
                "failed to spawn tesseract: {err}"
            ))),
            Err(_) => Err(PipelineError::EngineTimeout(timeout.as_secs())),
        }
    }

    async fn run_checked(&self, args: &[&str]) -> Result<Output, PipelineError> {
        let output = self.run(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Engine(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(
        &self,
        image: &Path,
        request: &EngineRequest,
    ) -> Result<Recognition, PipelineError> {
        let image = image.to_string_lossy();
        let psm = request.psm.to_string();
        let oem = request.oem.to_string();

        // TSV run for per-token confidences.
        let tsv = self
            .run_checked(&[
                &image,
                "stdout",
                "-l",
                &request.language,
                "--psm",
                &psm,
                "--oem",
                &oem,
                "tsv",
            ])
            .await?;
        let token_confidences = parse_tsv_confidences(&String::from_utf8_lossy(&tsv.stdout));

        // Plain run for the transcript itself.
        let plain = self
            .run_checked(&[
                &image,
                "stdout",
                "-l",
                &request.language,
                "--psm",
                &psm,
                "--oem",
                &oem,
            ])
            .await?;
        let text = String::from_utf8_lossy(&plain.stdout).into_owned();

        debug!(
            "tesseract: {} tokens scored, {} bytes of text from {}",
            token_confidences.len(),
            text.len(),
            image
        );

        Ok(Recognition {
            text,
            token_confidences,
        })
    }

    async fn version(&self) -> Result<String, PipelineError> {
        let output = self.run_checked(&["--version"]).await?;
        let banner = merge_streams(&output);
        banner
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Engine("empty version banner".into()))
    }

    async fn list_languages(&self) -> Result<Vec<String>, PipelineError> {
        let output = self.run_checked(&["--list-langs"]).await?;
        Ok(parse_language_list(&merge_streams(&output)))
    }
}

/// Tesseract prints banners to stderr on older releases and stdout on
/// newer ones; read both.
fn merge_streams(output: &Output) -> String {
    format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

/// Pull the confidence column out of tesseract TSV output. Word rows carry
/// a real score; structural rows (page/block/par/line) carry -1 and are
/// kept here as-is, to be filtered during scoring.
fn parse_tsv_confidences(tsv: &str) -> Vec<f64> {
    tsv.lines()
        .skip(1) // header row
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 {
                return None;
            }
            cols[10].parse::<f64>().ok()
        })
        .collect()
}

/// Parse `tesseract --list-langs` output: a banner line followed by one
/// language code per line.
fn parse_language_list(raw: &str) -> Vec<String> {
    let mut languages: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(' ') && !line.ends_with(':'))
        .map(str::to_string)
        .collect();
    languages.sort();
    languages.dedup();
    languages
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t\n\
2\t1\t1\t0\t0\t0\t32\t40\t200\t60\t-1\t\n\
4\t1\t1\t1\t1\t0\t32\t40\t200\t24\t-1\t\n\
5\t1\t1\t1\t1\t1\t32\t40\t90\t24\t96.5\tInvoice\n\
5\t1\t1\t1\t1\t2\t130\t40\t40\t24\t88.25\t42\n\
5\t1\t1\t1\t1\t3\t180\t40\t10\t24\t0\t \n";

    #[test]
    fn test_parse_tsv_confidences() {
        let confidences = parse_tsv_confidences(SAMPLE_TSV);
        assert_eq!(confidences, vec![-1.0, -1.0, -1.0, 96.5, 88.25, 0.0]);
    }

    #[test]
    fn test_parse_tsv_ignores_short_rows() {
        assert!(parse_tsv_confidences("conf\ttext\n90\thello\n").is_empty());
        assert!(parse_tsv_confidences("").is_empty());
    }

    #[test]
    fn test_parse_language_list() {
        let raw = "List of available languages in /usr/share/tessdata/ (3):\nosd\neng\ndeu\n";
        assert_eq!(parse_language_list(raw), vec!["deu", "eng", "osd"]);
    }

    #[test]
    fn test_parse_language_list_deduplicates_streams() {
        // Both streams merged can repeat the same codes.
        let raw = "eng\nosd\n\neng\nosd\n";
        assert_eq!(parse_language_list(raw), vec!["eng", "osd"]);
    }
}
