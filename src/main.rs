//! Medical Assistant - turns uploaded medical images and PDFs into
//! patient-readable text, entities, vitals, a plain-language summary and a
//! translation.

mod binaries;
mod chain;
mod config;
mod entities;
mod error;
mod ner;
mod normalize;
mod ocr;
mod openrouter;
mod pipeline;
mod schema;
mod services;
mod simplify;
mod summarize;
mod translate;
mod vitals;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use config::{PipelineConfig, ServerConfig};
use error::AppError;
use ocr::{Document, DocumentKind};
use pipeline::{Pipeline, Upload};
use schema::ProcessResult;
use services::{Capabilities, Readiness};
use sha2::{Digest, Sha256};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    upload_dir: Arc<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "medical_assistant=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::from_env();
    let server = ServerConfig::from_env();

    // Probe models, sidecars and credentials once; fallbacks are fixed from here on.
    let capabilities = Capabilities::from_env(&config).await;
    let pipeline = Pipeline::new(capabilities, config);

    let ready = pipeline.readiness();
    info!(
        entity_model = ready.entity_model_loaded,
        summarizer = ready.summarizer_loaded,
        "OCR backends: {:?}, translators: {:?}, binaries: {:?}",
        ready.ocr_backends,
        ready.translation_backends,
        ready.binaries
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
        upload_dir: Arc::new(server.upload_dir.clone()),
    };

    let listener = tokio::net::TcpListener::bind(&server.bind_addr).await?;
    info!("Server listening on http://{}", server.bind_addr);
    axum::serve(listener, app(state, server.max_upload_bytes)).await?;

    Ok(())
}

fn app(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/process", post(process_document))
        .route("/analyze", post(process_document))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn index() -> Html<&'static str> {
    Html(
        "<h1>AI Medical Assistant</h1>\
         <p>POST an image or PDF as <code>file</code> (optionally <code>translate_to</code>) \
         to <code>/process</code>. Check readiness at <code>/healthz</code>.</p>",
    )
}

async fn healthz(State(state): State<AppState>) -> Json<Readiness> {
    Json(state.pipeline.readiness())
}

/// Upload a document and run the full pipeline on it.
async fn process_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> error::Result<Json<ProcessResult>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut target: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file: {}", e)))?;
                file = Some((filename, data.to_vec()));
            }
            "translate_to" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid translate_to: {}", e)))?;
                target = Some(value);
            }
            _ => {}
        }
    }

    let (filename, data) = file.ok_or_else(|| AppError::BadRequest("no file provided".into()))?;
    if filename.is_empty() {
        return Err(AppError::BadRequest("empty filename".into()));
    }
    let kind = DocumentKind::from_filename(&filename).ok_or_else(|| {
        AppError::BadRequest(format!("unsupported file type: {}", filename))
    })?;

    let content_hash = {
        let mut hasher = Sha256::new();
        hasher.update(&data);
        format!("{:x}", hasher.finalize())
    };

    info!("Received file: {} ({} bytes, {:?})", filename, data.len(), kind);

    // Removed when `scratch` drops, on every return path.
    let scratch = tempfile::Builder::new()
        .prefix("medical-upload-")
        .tempdir_in(state.upload_dir.as_path())?;
    let ext = Path::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let path = scratch.path().join(format!("upload.{}", ext));
    tokio::fs::write(&path, &data).await?;

    let upload = Upload {
        document: Document { path, kind },
        filename,
        content_hash,
    };
    let target = target.filter(|t| !t.trim().is_empty());

    // A panicking stage surfaces as a JoinError instead of a dropped connection.
    let pipeline = Arc::clone(&state.pipeline);
    let result = tokio::spawn(async move { pipeline.process(&upload, target.as_deref()).await })
        .await
        .map_err(|e| AppError::Internal(format!("pipeline task failed: {}", e)))??;

    info!("Processing complete: {}", result.id);
    Ok(Json(result))
}
