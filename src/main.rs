//! OCR Server - HTTP service for document and image text extraction.

mod batch;
mod config;
mod engine;
mod error;
mod extract;
mod pdf;
mod preprocess;
mod schema;
mod scratch;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use batch::{BatchCoordinator, UploadItem};
use config::ServiceConfig;
use engine::{OcrEngine, TesseractEngine};
use error::{ApiError, ValidationError};
use extract::Extractor;
use pdf::PageSplitter;
use schema::{BatchResult, OcrOptions, OcrResponse};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<ServiceConfig>,
    engine: Arc<dyn OcrEngine>,
    batch: Arc<BatchCoordinator>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ocr_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(ServiceConfig::from_env()?);
    std::fs::create_dir_all(&config.temp_dir)?;
    info!("Temp directory: {:?}", config.temp_dir);

    let engine: Arc<dyn OcrEngine> = Arc::new(TesseractEngine::new(config.clone()));
    let app = build_router(config.clone(), engine);

    // Run server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(
        "{} v{} listening on http://{}",
        config.service_name, config.version, config.bind_addr
    );
    axum::serve(listener, app).await?;

    Ok(())
}

/// Assemble the router and state around a recognition engine.
fn build_router(config: Arc<ServiceConfig>, engine: Arc<dyn OcrEngine>) -> Router {
    let extractor = Arc::new(Extractor::new(engine.clone(), config.clone()));
    let splitter = Arc::new(PageSplitter::new(extractor.clone(), config.clone()));
    let batch = Arc::new(BatchCoordinator::new(extractor, splitter, config.clone()));

    let state = AppState {
        config,
        engine,
        batch,
    };

    Router::new()
        .route("/health", get(health))
        .route("/languages", get(languages))
        .route("/info", get(service_info))
        .route("/ocr", post(process_ocr))
        .route("/ocr/batch", post(process_batch))
        // Sized for batches of several near-limit files; the 50 MiB
        // per-file cap is enforced in the handlers.
        .layer(DefaultBodyLimit::max(256 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Engine availability probe.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.list_languages().await {
        Ok(langs) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": state.config.service_name,
                "version": state.config.version,
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "engine": state.engine.name(),
                "engine_available": true,
                "language_count": langs.len(),
                "capabilities": [
                    "image_ocr",
                    "pdf_ocr",
                    "image_preprocessing",
                    "batch_processing",
                    "confidence_scoring"
                ],
            })),
        ),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "unhealthy",
                "error": err.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })),
        ),
    }
}

/// Available recognition languages.
async fn languages(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let langs = state
        .engine
        .list_languages()
        .await
        .map_err(|err| ApiError::Internal(anyhow::anyhow!(err)))?;

    Ok(Json(json!({
        "languages": langs,
        "count": langs.len(),
        "default": [config::DEFAULT_LANGUAGE],
    })))
}

/// Static capability and configuration description.
async fn service_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": state.config.service_name,
        "version": state.config.version,
        "max_file_size": config::MAX_FILE_SIZE,
        "supported_formats": config::SUPPORTED_FORMATS,
        "pdf_dpi": config::PDF_DPI,
        "default_settings": {
            "languages": [config::DEFAULT_LANGUAGE],
            "psm": config::DEFAULT_PSM,
            "oem": config::DEFAULT_OEM,
        },
        "endpoints": {
            "/ocr": "POST - Single file OCR processing",
            "/ocr/batch": "POST - Batch file OCR processing",
            "/health": "GET - Service health check",
            "/languages": "GET - Available OCR languages",
            "/info": "GET - Service information",
        },
    }))
}

/// Process a single uploaded file.
async fn process_ocr(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<OcrResponse>, ApiError> {
    let form = read_multipart(multipart, &["file", "image"]).await?;
    let opts = form.options()?;
    let item = form
        .files
        .into_iter()
        .next()
        .ok_or(ValidationError::MissingFile)?;

    if item.filename.trim().is_empty() {
        return Err(ValidationError::EmptyFilename.into());
    }
    let file_size = item.bytes.len() as u64;
    if file_size > config::MAX_FILE_SIZE {
        return Err(ValidationError::FileTooLarge {
            max: config::MAX_FILE_SIZE,
        }
        .into());
    }
    let ext = config::file_extension(&item.filename);
    if !config::is_supported(&ext) {
        return Err(ValidationError::UnsupportedFormat {
            ext,
            supported: config::supported_list(),
        }
        .into());
    }

    info!(
        "Received {} ({} bytes), languages={}, psm={}, oem={}",
        item.filename,
        file_size,
        opts.language_arg(),
        opts.psm,
        opts.oem
    );

    let outcome = state
        .batch
        .process_file(&item, &ext, &opts)
        .await
        .map_err(|err| ApiError::Internal(anyhow::anyhow!(err)))?;

    Ok(Json(OcrResponse::new(
        outcome,
        item.filename,
        file_size,
        &state.config.service_name,
    )))
}

/// Process multiple files with one shared parameter set.
async fn process_batch(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<BatchResult>, ApiError> {
    let form = read_multipart(multipart, &["files"]).await?;
    if form.files.is_empty() {
        return Err(ValidationError::NoFilesInBatch.into());
    }

    // Batch images always run with preprocessing on.
    let opts = OcrOptions {
        preprocess: true,
        ..form.options()?
    };

    info!(
        "Batch of {} files, languages={}",
        form.files.len(),
        opts.language_arg()
    );
    Ok(Json(state.batch.run(form.files, &opts).await))
}

// ============================================================================
// Multipart parsing
// ============================================================================

/// Collected multipart form: uploaded files plus shared parameter fields.
struct OcrForm {
    files: Vec<UploadItem>,
    languages: Option<String>,
    psm: Option<String>,
    oem: Option<String>,
    preprocess: Option<String>,
}

impl OcrForm {
    /// Resolve raw form fields into recognition options.
    fn options(&self) -> Result<OcrOptions, ValidationError> {
        let languages: Vec<String> = self
            .languages
            .as_deref()
            .unwrap_or(config::DEFAULT_LANGUAGE)
            .split('+')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect();
        let languages = if languages.is_empty() {
            vec![config::DEFAULT_LANGUAGE.to_string()]
        } else {
            languages
        };

        Ok(OcrOptions {
            languages,
            psm: parse_mode("psm", self.psm.as_deref(), config::DEFAULT_PSM)?,
            oem: parse_mode("oem", self.oem.as_deref(), config::DEFAULT_OEM)?,
            preprocess: match self.preprocess.as_deref() {
                None => true,
                Some(value) => value.trim().eq_ignore_ascii_case("true"),
            },
        })
    }
}

fn parse_mode(name: &str, value: Option<&str>, default: u32) -> Result<u32, ValidationError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ValidationError::InvalidParameter {
                field: name.to_string(),
                value: raw.to_string(),
            }),
    }
}

/// Drain a multipart body, keeping files from the named fields plus the
/// shared parameter fields.
async fn read_multipart(
    mut multipart: Multipart,
    file_fields: &[&str],
) -> Result<OcrForm, ValidationError> {
    let mut form = OcrForm {
        files: Vec::new(),
        languages: None,
        psm: None,
        oem: None,
        preprocess: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ValidationError::Multipart(err.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if file_fields.contains(&name.as_str()) {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ValidationError::Multipart(err.to_string()))?;
            form.files.push(UploadItem {
                filename,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|err| ValidationError::Multipart(err.to_string()))?;
            match name.as_str() {
                "languages" => form.languages = Some(value),
                "psm" => form.psm = Some(value),
                "oem" => form.oem = Some(value),
                "preprocess" => form.preprocess = Some(value),
                _ => {}
            }
        }
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use crate::engine::testing::ScriptedEngine;

    fn test_server(engine: ScriptedEngine) -> TestServer {
        let dir = std::env::temp_dir().join("ocr-server-http-tests");
        std::fs::create_dir_all(&dir).unwrap();
        let config = Arc::new(config::test_config(&dir));
        TestServer::new(build_router(config, Arc::new(engine))).unwrap()
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::GrayImage::from_pixel(16, 16, image::Luma([255u8]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn file_part(bytes: Vec<u8>, filename: &str) -> Part {
        Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_type("application/octet-stream")
    }

    #[tokio::test]
    async fn test_info_lists_capabilities() {
        let server = test_server(ScriptedEngine::new(vec![]));
        let response = server.get("/info").await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["max_file_size"], config::MAX_FILE_SIZE);
        assert!(body["supported_formats"]
            .as_array()
            .unwrap()
            .contains(&json!(".pdf")));
        assert_eq!(body["default_settings"]["psm"], 3);
    }

    #[tokio::test]
    async fn test_health_reports_engine() {
        let server = test_server(ScriptedEngine::new(vec![]));
        let response = server.get("/health").await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["engine_available"], true);
        assert_eq!(body["language_count"], 2);
    }

    #[tokio::test]
    async fn test_health_unhealthy_without_engine() {
        let server = test_server(ScriptedEngine::unavailable());
        let response = server.get("/health").await;

        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_languages_endpoint() {
        let server = test_server(ScriptedEngine::new(vec![]));
        let response = server.get("/languages").await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["count"], 2);
        assert_eq!(body["languages"][0], "eng");
    }

    #[tokio::test]
    async fn test_ocr_rejects_missing_file() {
        let server = test_server(ScriptedEngine::new(vec![]));
        let form = MultipartForm::new().add_text("languages", "eng");
        let response = server.post("/ocr").multipart(form).await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert!(body["error"].as_str().unwrap().contains("No file provided"));
    }

    #[tokio::test]
    async fn test_ocr_rejects_unsupported_extension() {
        let server = test_server(ScriptedEngine::new(vec![]));
        let form =
            MultipartForm::new().add_part("file", file_part(b"hello".to_vec(), "notes.txt"));
        let response = server.post("/ocr").multipart(form).await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        let message = body["error"].as_str().unwrap();
        assert!(message.contains(".txt"));
        assert!(message.contains(".png"));
    }

    #[tokio::test]
    async fn test_ocr_rejects_oversized_upload() {
        let server = test_server(ScriptedEngine::new(vec![]));
        let oversized = vec![0u8; (config::MAX_FILE_SIZE + 1) as usize];
        let form = MultipartForm::new().add_part("file", file_part(oversized, "huge.png"));
        let response = server.post("/ocr").multipart(form).await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert!(body["error"].as_str().unwrap().contains("File too large"));
    }

    #[tokio::test]
    async fn test_ocr_rejects_bad_psm() {
        let server = test_server(ScriptedEngine::new(vec![]));
        let form = MultipartForm::new()
            .add_text("psm", "automatic")
            .add_part("file", file_part(png_bytes(), "scan.png"));
        let response = server.post("/ocr").multipart(form).await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_single_image_roundtrip() {
        let engine =
            ScriptedEngine::new(vec![ScriptedEngine::ok("Invoice 42\n", &[-1.0, 91.0, 93.0])]);
        let server = test_server(engine);

        let form = MultipartForm::new()
            .add_text("preprocess", "false")
            .add_part("file", file_part(png_bytes(), "invoice.png"));
        let response = server.post("/ocr").multipart(form).await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["text"], "Invoice 42");
        assert_eq!(body["confidence"], 92.0);
        assert_eq!(body["word_count"], 2);
        assert_eq!(body["filename"], "invoice.png");
        assert_eq!(body["service"], "OCR Server");
        assert!(body["processing_time"].as_str().is_some());
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_image_field_name_is_accepted() {
        let engine = ScriptedEngine::new(vec![ScriptedEngine::ok("via image field", &[80.0])]);
        let server = test_server(engine);

        let form = MultipartForm::new()
            .add_text("preprocess", "false")
            .add_part("image", file_part(png_bytes(), "scan.png"));
        let response = server.post("/ocr").multipart(form).await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["text"], "via image field");
    }

    #[tokio::test]
    async fn test_batch_requires_files() {
        let server = test_server(ScriptedEngine::new(vec![]));
        let form = MultipartForm::new().add_text("languages", "eng");
        let response = server.post("/ocr/batch").multipart(form).await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert!(body["error"].as_str().unwrap().contains("No files"));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        // The scripted engine only answers for the png; the txt is
        // rejected up front.
        let engine = ScriptedEngine::new(vec![ScriptedEngine::ok("page text", &[85.0])]);
        let server = test_server(engine);

        let form = MultipartForm::new()
            .add_part("files", file_part(png_bytes(), "good.png"))
            .add_part("files", file_part(b"plain".to_vec(), "bad.txt"));
        let response = server.post("/ocr/batch").multipart(form).await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["total_files"], 2);
        assert_eq!(body["processed_files"], 1);
        assert_eq!(body["failed_files"], 1);

        let results = body["batch_results"].as_array().unwrap();
        assert_eq!(results[0]["filename"], "good.png");
        assert_eq!(results[0]["text"], "page text");
        assert_eq!(results[1]["filename"], "bad.txt");
        assert!(results[1]["error"]
            .as_str()
            .unwrap()
            .contains("Unsupported format"));
    }
}
