//! Summaries in plain language.
//!
//! Everything is simplified first. With a summarization model loaded the
//! chain is `model → snippet`; without one it is the extractive heuristic.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chain::{Backend, FallbackChain};
use crate::config::SummaryConfig;
use crate::entities::truncate_chars;
use crate::openrouter::{Message, OpenRouterClient};
use crate::simplify::simplify;

pub const PLACEHOLDER_SUMMARY: &str =
    "The document was processed, but no detailed summary could be generated from its text.";

/// Minimum trimmed length for a sentence to count in the extractive summary.
const MIN_SENTENCE_CHARS: usize = 30;
const EXTRACTIVE_SENTENCES: usize = 3;

/// A loaded abstractive summarization model.
#[async_trait::async_trait]
pub trait SummaryModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Summarize `text` in roughly `min_len..=max_len` words.
    async fn generate(&self, text: &str, min_len: usize, max_len: usize) -> anyhow::Result<String>;
}

/// Summarization backend. `original` is the normalized input,
/// `simplified` the same text after [`simplify`].
#[async_trait::async_trait]
pub trait Summarizer: Backend {
    async fn summarize(&self, original: &str, simplified: &str) -> anyhow::Result<String>;
}

// ============================================================================
// Model-backed summarizer
// ============================================================================

/// Length bounds for a summary of `input_words` words: `max = min(cap, n)`
/// and `min = min(floor, max - 1)`, so `min < max` always holds.
pub fn length_bounds(input_words: usize, floor: usize, cap: usize) -> (usize, usize) {
    let max_len = cap.min(input_words).max(2);
    let min_len = floor.min(max_len - 1).max(1);
    (min_len, max_len)
}

pub struct ModelSummarizer {
    model: Arc<dyn SummaryModel>,
    config: SummaryConfig,
}

impl ModelSummarizer {
    pub fn new(model: Arc<dyn SummaryModel>, config: SummaryConfig) -> Self {
        Self { model, config }
    }
}

impl Backend for ModelSummarizer {
    fn name(&self) -> &str {
        self.model.model_name()
    }
}

#[async_trait::async_trait]
impl Summarizer for ModelSummarizer {
    async fn summarize(&self, original: &str, simplified: &str) -> anyhow::Result<String> {
        // The threshold applies to the input as written; simplification
        // lengthens it.
        let input_words = original.split_whitespace().count();
        if input_words < self.config.min_words {
            debug!("{} words, below summary threshold; returning simplified text", input_words);
            return Ok(simplified.to_string());
        }

        let words: Vec<&str> = simplified.split_whitespace().collect();

        let capped = &words[..words.len().min(self.config.max_input_words)];
        let (min_len, max_len) =
            length_bounds(capped.len(), self.config.min_length, self.config.max_length);
        debug!(
            input_words = capped.len(),
            min_len, max_len, "Requesting model summary"
        );

        let generated = self.model.generate(&capped.join(" "), min_len, max_len).await?;
        // Model output can reintroduce clinical terms.
        Ok(simplify(generated.trim()))
    }
}

/// Adapts the OpenRouter chat client into a [`SummaryModel`].
pub struct OpenRouterSummarizer {
    client: OpenRouterClient,
}

impl OpenRouterSummarizer {
    pub fn new(client: OpenRouterClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl SummaryModel for OpenRouterSummarizer {
    fn model_name(&self) -> &str {
        self.client.model()
    }

    async fn generate(&self, text: &str, min_len: usize, max_len: usize) -> anyhow::Result<String> {
        let system = format!(
            "You summarize medical reports for patients. Write plain prose between {} and {} words. \
             Use everyday language, keep every number and medication name, and never add facts \
             that are not in the report. Reply with the summary only.",
            min_len, max_len
        );
        let max_tokens = (max_len as u32) * 2 + 32;
        self.client
            .chat(vec![Message::system(system), Message::user(text)], max_tokens)
            .await
    }
}

// ============================================================================
// Fallbacks
// ============================================================================

/// Used when the model call fails: the simplified head of the original text.
pub struct SnippetSummarizer {
    chars: usize,
}

impl SnippetSummarizer {
    pub fn new(chars: usize) -> Self {
        Self { chars }
    }
}

impl Backend for SnippetSummarizer {
    fn name(&self) -> &str {
        "snippet"
    }
}

#[async_trait::async_trait]
impl Summarizer for SnippetSummarizer {
    async fn summarize(&self, original: &str, _simplified: &str) -> anyhow::Result<String> {
        Ok(simplify(truncate_chars(original, self.chars)))
    }
}

/// First three substantial sentences of the simplified text.
pub struct ExtractiveSummarizer;

impl Backend for ExtractiveSummarizer {
    fn name(&self) -> &str {
        "extractive"
    }
}

#[async_trait::async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, _original: &str, simplified: &str) -> anyhow::Result<String> {
        Ok(extractive_summary(simplified))
    }
}

pub fn extractive_summary(simplified: &str) -> String {
    let sentences: Vec<&str> = simplified
        .split('.')
        .map(str::trim)
        .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
        .take(EXTRACTIVE_SENTENCES)
        .collect();

    if sentences.is_empty() {
        return PLACEHOLDER_SUMMARY.to_string();
    }
    let joined = format!("{}.", sentences.join(". "));
    let mut chars = joined.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Stage
// ============================================================================

pub struct SummaryStage {
    chain: FallbackChain<dyn Summarizer>,
    model_loaded: bool,
}

impl SummaryStage {
    pub fn new(model: Option<Arc<dyn SummaryModel>>, config: &SummaryConfig) -> Self {
        let model_loaded = model.is_some();
        let chain = match model {
            Some(model) => FallbackChain::new("summary")
                .with(Arc::new(ModelSummarizer::new(model, config.clone())) as Arc<dyn Summarizer>)
                .with(Arc::new(SnippetSummarizer::new(config.snippet_chars)) as Arc<dyn Summarizer>),
            None => FallbackChain::new("summary")
                .with(Arc::new(ExtractiveSummarizer) as Arc<dyn Summarizer>),
        };
        info!("Summary chain: {:?}", chain.names());
        Self { chain, model_loaded }
    }

    pub fn model_loaded(&self) -> bool {
        self.model_loaded
    }

    /// Summarize normalized text. Always returns a summary.
    pub async fn summarize(&self, text: &str) -> (String, Option<String>) {
        let simplified = simplify(text);
        let accept = |s: &String| !s.trim().is_empty();

        match self.chain.run(|b| b.summarize(text, &simplified), accept).await {
            Ok(adopted) => {
                info!(backend = %adopted.backend, chars = adopted.value.len(), "Summary ready");
                (adopted.value, Some(adopted.backend))
            }
            Err(exhausted) => {
                warn!("No summarizer produced output:\n{}", exhausted.describe());
                (PLACEHOLDER_SUMMARY.to_string(), None)
            }
        }
    }
}
