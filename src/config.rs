//! Service configuration.
//!
//! Built once at startup from environment variables (`.env` supported via
//! dotenvy) and passed by `Arc` into every pipeline component. Nothing here
//! mutates at runtime; limits and format lists are fixed for the process
//! lifetime.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Maximum accepted upload size in bytes (50 MiB).
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// File extensions the pipeline knows how to handle.
pub const SUPPORTED_FORMATS: &[&str] = &[".png", ".jpg", ".jpeg", ".tiff", ".bmp", ".pdf"];

/// Resolution used when rasterizing PDF pages.
pub const PDF_DPI: u32 = 300;

pub const DEFAULT_LANGUAGE: &str = "eng";
pub const DEFAULT_PSM: u32 = 3;
pub const DEFAULT_OEM: u32 = 3;

/// Immutable service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
    pub version: String,
    pub bind_addr: String,
    /// Directory for request-scoped temporary files (staged uploads, page
    /// rasters, preprocessed images). Created at startup if missing.
    pub temp_dir: PathBuf,
    /// Upper bound for a single engine or rasterizer invocation.
    pub engine_timeout: Duration,
}

impl ServiceConfig {
    /// Load configuration from the environment, with defaults for anything
    /// unset.
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            std::env::var("OCR_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let temp_dir = match std::env::var("OCR_TEMP_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::temp_dir().join("ocr-server"),
        };

        let timeout_secs: u64 = std::env::var("OCR_ENGINE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "120".to_string())
            .parse()
            .context("OCR_ENGINE_TIMEOUT_SECS must be an integer number of seconds")?;

        Ok(Self {
            service_name: "OCR Server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            bind_addr,
            temp_dir,
            engine_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Lowercased extension of `filename` including the leading dot, or an
/// empty string if there is none.
pub fn file_extension(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn is_supported(ext: &str) -> bool {
    SUPPORTED_FORMATS.contains(&ext)
}

/// Human-readable format list for error messages.
pub fn supported_list() -> String {
    SUPPORTED_FORMATS.join(", ")
}

#[cfg(test)]
pub fn test_config(temp_dir: &std::path::Path) -> ServiceConfig {
    ServiceConfig {
        service_name: "OCR Server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        temp_dir: temp_dir.to_path_buf(),
        engine_timeout: Duration::from_secs(5),
    }
}
