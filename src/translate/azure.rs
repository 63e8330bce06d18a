//! Azure Translator v3 backend.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Translator;
use crate::chain::Backend;
use crate::config::env_opt;

const API_VERSION: &str = "3.0";

#[derive(Serialize)]
struct TranslateItem<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResult {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

pub struct AzureTranslator {
    endpoint: String,
    key: String,
    region: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl AzureTranslator {
    /// Requires `AZURE_TRANSLATOR_KEY` and `AZURE_TRANSLATOR_ENDPOINT`;
    /// `AZURE_TRANSLATOR_REGION` is optional.
    pub fn from_env(client: reqwest::Client, timeout: Duration) -> Option<Self> {
        let key = env_opt("AZURE_TRANSLATOR_KEY")?;
        let endpoint = env_opt("AZURE_TRANSLATOR_ENDPOINT")?;
        Some(Self {
            endpoint,
            key,
            region: env_opt("AZURE_TRANSLATOR_REGION"),
            timeout,
            client,
        })
    }
}

impl Backend for AzureTranslator {
    fn name(&self) -> &str {
        "azure"
    }
}

#[async_trait::async_trait]
impl Translator for AzureTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> anyhow::Result<String> {
        let url = format!("{}/translate", self.endpoint.trim_end_matches('/'));
        let trace_id = uuid::Uuid::new_v4().to_string();
        debug!("Azure translate {} -> {} (trace {})", source, target, trace_id);

        let mut request = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .query(&[("api-version", API_VERSION), ("from", source), ("to", target)])
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("X-ClientTraceId", trace_id)
            .json(&[TranslateItem { text }]);
        if let Some(region) = &self.region {
            request = request.header("Ocp-Apim-Subscription-Region", region);
        }

        let response = request.send().await.context("Azure Translator request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Azure Translator error ({}): {}", status, error_text);
        }

        let results: Vec<TranslateResult> = response
            .json()
            .await
            .context("Failed to parse Azure Translator response")?;
        first_translation(results)
    }
}

fn first_translation(results: Vec<TranslateResult>) -> anyhow::Result<String> {
    results
        .into_iter()
        .next()
        .and_then(|r| r.translations.into_iter().next())
        .map(|t| t.text)
        .context("Azure Translator returned no translations")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let raw = r#"[{"detectedLanguage":null,"translations":[{"text":"ضغط الدم مرتفع","to":"ar"}]}]"#;
        let parsed: Vec<TranslateResult> = serde_json::from_str(raw).unwrap();
        assert_eq!(first_translation(parsed).unwrap(), "ضغط الدم مرتفع");
    }

    #[test]
    fn test_empty_response_is_error() {
        assert!(first_translation(Vec::new()).is_err());
        let parsed: Vec<TranslateResult> = serde_json::from_str(r#"[{"translations":[]}]"#).unwrap();
        assert!(first_translation(parsed).is_err());
    }
}
