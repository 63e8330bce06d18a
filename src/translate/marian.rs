//! Local MarianMT models served by a sidecar.
//!
//! One model per language pair (`Helsinki-NLP/opus-mt-<src>-<tgt>`). The
//! sidecar loads a model on `POST /load`; handles are cached for the process
//! lifetime in a [`ModelCache`].

use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cache::ModelCache;
use super::Translator;
use crate::chain::Backend;
use crate::config::env_opt;

pub fn model_id(source: &str, target: &str) -> String {
    format!("Helsinki-NLP/opus-mt-{}-{}", source, target)
}

/// A loaded translation model for one language pair.
#[async_trait::async_trait]
pub trait TranslationModel: Send + Sync {
    async fn translate(&self, text: &str) -> anyhow::Result<String>;
}

/// Loads a model by identifier. Called at most once per identifier while
/// the load keeps succeeding.
#[async_trait::async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, model_id: &str) -> anyhow::Result<Arc<dyn TranslationModel>>;
}

pub struct MarianTranslator {
    loader: Arc<dyn ModelLoader>,
    cache: ModelCache<dyn TranslationModel>,
}

impl MarianTranslator {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            cache: ModelCache::new(),
        }
    }

    #[cfg(test)]
    pub async fn loaded_models(&self) -> usize {
        self.cache.len().await
    }
}

impl Backend for MarianTranslator {
    fn name(&self) -> &str {
        "marian"
    }
}

#[async_trait::async_trait]
impl Translator for MarianTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> anyhow::Result<String> {
        let id = model_id(source, target);
        let model = self.cache.get_or_load(&id, || self.loader.load(&id)).await?;
        debug!("Running {} on {} chars", id, text.len());
        model.translate(text).await
    }
}

// ============================================================================
// Sidecar
// ============================================================================

#[derive(Serialize)]
struct LoadRequest<'a> {
    model: &'a str,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    model: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translation: String,
}

/// Marian sidecar at `MARIAN_URL`.
#[derive(Clone)]
pub struct MarianSidecar {
    url: String,
    client: reqwest::Client,
}

impl MarianSidecar {
    pub fn from_env(client: reqwest::Client) -> Option<Self> {
        env_opt("MARIAN_URL").map(|url| Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> anyhow::Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.url, path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Marian sidecar {} request failed", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Marian sidecar error ({}): {}", status, error_text);
        }
        Ok(response)
    }
}

struct SidecarModel {
    sidecar: MarianSidecar,
    model_id: String,
}

#[async_trait::async_trait]
impl ModelLoader for MarianSidecar {
    async fn load(&self, model_id: &str) -> anyhow::Result<Arc<dyn TranslationModel>> {
        self.post_json("/load", &LoadRequest { model: model_id })
            .await
            .with_context(|| format!("Failed to load {}", model_id))?;
        Ok(Arc::new(SidecarModel {
            sidecar: self.clone(),
            model_id: model_id.to_string(),
        }))
    }
}

#[async_trait::async_trait]
impl TranslationModel for SidecarModel {
    async fn translate(&self, text: &str) -> anyhow::Result<String> {
        let response = self
            .sidecar
            .post_json(
                "/translate",
                &TranslateRequest {
                    model: &self.model_id,
                    text,
                },
            )
            .await?;
        let parsed: TranslateResponse = response
            .json()
            .await
            .context("Invalid Marian sidecar response")?;
        Ok(parsed.translation)
    }
}
