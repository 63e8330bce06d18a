//! End-to-end document processing.
//!
//! acquire → normalize → {entities, vitals, summary} → translate the summary.
//! Only text acquisition can fail the request; every later stage degrades
//! to a fallback and records a warning instead.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::config::PipelineConfig;
use crate::entities::{truncate_chars, EntityReport, EntityStage};
use crate::normalize::normalize_text;
use crate::ocr::pdf::PdfAcquirer;
use crate::ocr::{Acquirer, AcquisitionError, Document, ImageOcr};
use crate::schema::{ProcessResult, StageBackends};
use crate::services::{probe_binaries, Capabilities, Readiness};
use crate::summarize::SummaryStage;
use crate::translate::{validate_language_code, TranslationStage};
use crate::vitals::extract_vitals;

/// An uploaded document ready for processing.
#[derive(Debug, Clone)]
pub struct Upload {
    pub document: Document,
    pub filename: String,
    pub content_hash: String,
}

pub struct Pipeline {
    acquirer: Acquirer,
    entities: EntityStage,
    summary: SummaryStage,
    translation: TranslationStage,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(caps: Capabilities, config: PipelineConfig) -> Self {
        let images = Arc::new(ImageOcr::new(caps.image_ocr));
        let pdf = PdfAcquirer::new(
            caps.pdf_text,
            caps.rasterizer,
            Arc::clone(&images),
            config.acquisition.clone(),
        );

        Self {
            acquirer: Acquirer::new(images, pdf),
            entities: EntityStage::new(caps.entity_model, config.entities.max_chars),
            summary: SummaryStage::new(caps.summary_model, &config.summary),
            translation: TranslationStage::new(caps.translators, config.translation.clone()),
            config,
        }
    }

    pub fn readiness(&self) -> Readiness {
        let ocr_backends = self.acquirer.image_backends();
        let translation_backends = self.translation.backends();
        let has = |names: &[String], name: &str| names.iter().any(|n| n == name);

        Readiness {
            status: "ok",
            entity_model_loaded: self.entities.model_loaded(),
            summarizer_loaded: self.summary.model_loaded(),
            local_translation_configured: has(&translation_backends, "marian"),
            cloud_ocr_configured: has(&ocr_backends, "google_vision"),
            cloud_translation_configured: has(&translation_backends, "azure"),
            ocr_backends,
            translation_backends,
            binaries: probe_binaries(&self.config.acquisition),
        }
    }

    /// Process one document. `target` defaults to the configured language.
    #[instrument(skip_all, fields(filename = %upload.filename))]
    pub async fn process(
        &self,
        upload: &Upload,
        target: Option<&str>,
    ) -> Result<ProcessResult, AcquisitionError> {
        let target = target.unwrap_or_else(|| self.translation.default_target());
        let mut warnings = Vec::new();

        let acquired = self.acquirer.acquire(&upload.document).await?;
        let text = normalize_text(&acquired.text);
        if text.is_empty() {
            return Err(AcquisitionError::EmptyText);
        }
        info!(backend = %acquired.backend, chars = text.len(), "Text acquired");

        let vitals = extract_vitals(&text);
        if vitals.is_empty() {
            debug!("No vitals found");
        }
        let ((entities, entity_backend), (summary, summary_backend)) =
            tokio::join!(self.entities.extract(&text), self.summary.summarize(&text));
        if let Some(groups) = entities.groups().filter(|g| !g.is_empty()) {
            debug!(categories = ?groups.categories().collect::<Vec<_>>(), "Entities grouped");
        }

        if !self.entities.model_loaded() {
            warnings.push("Entity model not loaded; keyword matching was used.".to_string());
        }
        if let EntityReport::Error { error } = &entities {
            warnings.push(error.clone());
        }
        if !self.summary.model_loaded() {
            warnings.push("Summarization model not loaded; extractive summary was used.".to_string());
        } else if summary_backend.as_deref() == Some("snippet") {
            warnings.push("Summarization model failed; summary is a simplified excerpt.".to_string());
        }

        let (translation, translation_backend) = self.translation.translate(&summary, target).await;
        if translation_backend.is_none() && target != self.config.translation.source_lang {
            if validate_language_code(target) {
                warnings.push(format!(
                    "Translation to '{}' unavailable; original summary returned.",
                    target
                ));
            } else {
                warnings.push(format!("Invalid target language code '{}'.", target));
            }
        }

        let text_length = text.chars().count();
        let limit = self.config.response_text_limit;
        let text_truncated = text_length > limit;
        if text_truncated {
            warnings.push(format!("Text truncated to {} characters for transport.", limit));
        }

        Ok(ProcessResult {
            id: uuid::Uuid::new_v4().to_string(),
            filename: upload.filename.clone(),
            content_hash: upload.content_hash.clone(),
            text: truncate_chars(&text, limit).to_string(),
            text_length,
            text_truncated,
            entities_pretty: entities.pretty(),
            entities,
            vitals,
            summary,
            translation,
            target_language: target.to_string(),
            backends: StageBackends {
                acquisition: acquired.backend,
                entities: entity_backend,
                summary: summary_backend,
                translation: translation_backend,
            },
            warnings,
        })
    }
}
