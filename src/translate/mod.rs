//! Translation of the patient summary.
//!
//! Chain order: Azure Translator → local Marian model → LibreTranslate.
//! The stage never fails: exhaustion yields the original text behind a
//! marker.

pub mod azure;
pub mod cache;
pub mod libre;
pub mod marian;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chain::{Backend, FallbackChain};
use crate::config::TranslationConfig;
use crate::entities::truncate_chars;

const MAX_CODE_LEN: usize = 10;

/// Translation backend.
#[async_trait::async_trait]
pub trait Translator: Backend {
    async fn translate(&self, text: &str, source: &str, target: &str) -> anyhow::Result<String>;
}

/// Language codes are 1-10 ASCII letters (`ar`, `fr`, `zh`, `tlh`).
pub fn validate_language_code(code: &str) -> bool {
    !code.is_empty() && code.len() <= MAX_CODE_LEN && code.chars().all(|c| c.is_ascii_alphabetic())
}

pub fn invalid_code_message(code: &str) -> String {
    format!("Translation failed: invalid target language code '{}'", code)
}

pub fn unavailable_marker(code: &str, original: &str) -> String {
    format!("[Translation unavailable for '{}'] {}", code, original)
}

pub struct TranslationStage {
    chain: FallbackChain<dyn Translator>,
    config: TranslationConfig,
}

impl TranslationStage {
    pub fn new(translators: Vec<Arc<dyn Translator>>, config: TranslationConfig) -> Self {
        let mut chain = FallbackChain::new("translation");
        for t in translators {
            chain.push(t);
        }
        info!("Translation chain: {:?}", chain.names());
        Self { chain, config }
    }

    pub fn default_target(&self) -> &str {
        &self.config.default_target
    }

    pub fn backends(&self) -> Vec<String> {
        self.chain.names()
    }

    /// Translate `text` into `target`. Returns the output and the backend
    /// that produced it (`None` for the fast path and failure strings).
    pub async fn translate(&self, text: &str, target: &str) -> (String, Option<String>) {
        let source = self.config.source_lang.as_str();
        if target == source {
            debug!("Target equals source language ({}), skipping translation", source);
            return (text.to_string(), None);
        }

        if !validate_language_code(target) {
            warn!("Rejected target language code {:?}", target);
            return (invalid_code_message(target), None);
        }

        let input = truncate_chars(text, self.config.max_chars);
        if input.len() < text.len() {
            debug!("Translation input truncated to {} chars", self.config.max_chars);
        }

        let accept = |s: &String| !s.trim().is_empty();
        match self
            .chain
            .run(|t| t.translate(input, source, target), accept)
            .await
        {
            Ok(adopted) => {
                info!(backend = %adopted.backend, target, "Translation ready");
                (adopted.value, Some(adopted.backend))
            }
            Err(exhausted) => {
                warn!(
                    "No translator available for '{}':\n{}",
                    target,
                    exhausted.describe()
                );
                (unavailable_marker(target, text), None)
            }
        }
    }
}
