//! Capability handles built once at startup.
//!
//! Each optional backend is probed or configured here; what is missing
//! decides which fallbacks the pipeline runs for the process lifetime.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::binaries::is_available;
use crate::config::{AcquisitionConfig, PipelineConfig};
use crate::entities::EntityModel;
use crate::ner::NerSidecar;
use crate::ocr::pdf::{LopdfTextLayer, PageRasterizer, PdfTextLayer, PopplerRasterizer};
use crate::ocr::sidecar::LocalOcrSidecar;
use crate::ocr::tesseract::TesseractOcr;
use crate::ocr::vision::VisionOcr;
use crate::ocr::TextExtractor;
use crate::openrouter::OpenRouterClient;
use crate::summarize::{OpenRouterSummarizer, SummaryModel};
use crate::translate::azure::AzureTranslator;
use crate::translate::libre::LibreTranslator;
use crate::translate::marian::{MarianSidecar, MarianTranslator};
use crate::translate::Translator;

pub struct Capabilities {
    /// Image OCR backends in priority order.
    pub image_ocr: Vec<Arc<dyn TextExtractor>>,
    pub pdf_text: Arc<dyn PdfTextLayer>,
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub entity_model: Option<Arc<dyn EntityModel>>,
    pub summary_model: Option<Arc<dyn SummaryModel>>,
    /// Translation backends in priority order.
    pub translators: Vec<Arc<dyn Translator>>,
}

impl Capabilities {
    /// Configure every backend the environment provides.
    pub async fn from_env(config: &PipelineConfig) -> Self {
        let client = reqwest::Client::new();
        let acq = &config.acquisition;

        let mut image_ocr: Vec<Arc<dyn TextExtractor>> = vec![Arc::new(TesseractOcr::new(acq))];
        if let Some(vision) = VisionOcr::from_env(client.clone(), acq.cloud_timeout) {
            image_ocr.push(Arc::new(vision));
        }
        if let Some(sidecar) = LocalOcrSidecar::from_env(client.clone()) {
            image_ocr.push(Arc::new(sidecar));
        }

        let entity_model = NerSidecar::connect(client.clone())
            .await
            .map(|ner| Arc::new(ner) as Arc<dyn EntityModel>);

        let summary_model = match OpenRouterClient::from_env(config.summary.model_timeout) {
            Ok(client) => {
                info!("Summarization model: {}", client.model());
                Some(Arc::new(OpenRouterSummarizer::new(client)) as Arc<dyn SummaryModel>)
            }
            Err(e) => {
                info!("No summarization model ({}), extractive summaries active", e);
                None
            }
        };

        let tr = &config.translation;
        let mut translators: Vec<Arc<dyn Translator>> = Vec::new();
        if let Some(azure) = AzureTranslator::from_env(client.clone(), tr.cloud_timeout) {
            translators.push(Arc::new(azure));
        }
        if let Some(sidecar) = MarianSidecar::from_env(client.clone()) {
            translators.push(Arc::new(MarianTranslator::new(Arc::new(sidecar))));
        }
        if let Some(libre) = LibreTranslator::from_env(client, tr.cloud_timeout) {
            translators.push(Arc::new(libre));
        }

        Self {
            image_ocr,
            pdf_text: Arc::new(LopdfTextLayer),
            rasterizer: Arc::new(PopplerRasterizer::new(acq)),
            entity_model,
            summary_model,
            translators,
        }
    }
}

/// Readiness report served on `/healthz`.
#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub entity_model_loaded: bool,
    pub summarizer_loaded: bool,
    pub local_translation_configured: bool,
    pub cloud_ocr_configured: bool,
    pub cloud_translation_configured: bool,
    pub ocr_backends: Vec<String>,
    pub translation_backends: Vec<String>,
    /// Discoverability of each external tool on PATH.
    pub binaries: BTreeMap<&'static str, bool>,
}

/// Probe the external tools the acquisition stage shells out to.
pub fn probe_binaries(config: &AcquisitionConfig) -> BTreeMap<&'static str, bool> {
    BTreeMap::from([
        ("tesseract", is_available(&config.tesseract_bin)),
        ("pdftoppm", is_available(&config.pdftoppm_bin)),
        ("pdfinfo", is_available(&config.pdfinfo_bin)),
    ])
}
