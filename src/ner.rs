//! Clinical NER sidecar client.
//!
//! The sidecar serves a BC5CDR-style model (DISEASE / CHEMICAL labels).
//! It is probed once at startup; when the probe fails the pipeline runs the
//! keyword fallback for every request until restart.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::entities::{EntityModel, RecognizedEntity};

/// Startup health check only; recognition itself is not bounded.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ModelInfo {
    #[serde(default)]
    model: Option<String>,
}

#[derive(Serialize)]
struct NerRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct NerResponse {
    #[serde(default)]
    entities: Vec<RecognizedEntity>,
}

pub struct NerSidecar {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl NerSidecar {
    /// Connect to `NER_URL` and confirm a model is loaded.
    /// Returns `None` when unset or unreachable.
    pub async fn connect(client: reqwest::Client) -> Option<Self> {
        let url = crate::config::env_opt("NER_URL")?;
        match Self::probe(&client, &url, PROBE_TIMEOUT).await {
            Ok(model) => {
                info!("NER sidecar ready at {} (model={})", url, model);
                Some(Self { url, model, client })
            }
            Err(e) => {
                warn!("NER sidecar at {} unavailable, keyword fallback active: {:#}", url, e);
                None
            }
        }
    }

    async fn probe(client: &reqwest::Client, url: &str, timeout: Duration) -> anyhow::Result<String> {
        let resp = client
            .get(format!("{}/health", url.trim_end_matches('/')))
            .timeout(timeout)
            .send()
            .await
            .context("NER sidecar unreachable")?;

        if !resp.status().is_success() {
            anyhow::bail!("NER sidecar health check returned {}", resp.status());
        }

        let info: ModelInfo = resp.json().await.unwrap_or(ModelInfo { model: None });
        Ok(info.model.unwrap_or_else(|| "en_ner_bc5cdr_md".to_string()))
    }
}

#[async_trait::async_trait]
impl EntityModel for NerSidecar {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn recognize(&self, text: &str) -> anyhow::Result<Vec<RecognizedEntity>> {
        let response = self
            .client
            .post(format!("{}/ner", self.url.trim_end_matches('/')))
            .json(&NerRequest { text })
            .send()
            .await
            .context("NER request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("NER sidecar error ({}): {}", status, error_text);
        }

        let parsed: NerResponse = response.json().await.context("Invalid NER response")?;
        Ok(parsed.entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check_gives_up_on_silent_sidecar() {
        let url = crate::services::testing::silent_endpoint().await;
        let client = reqwest::Client::new();
        let check = NerSidecar::probe(&client, &url, Duration::from_millis(200));
        let result = tokio::time::timeout(Duration::from_secs(5), check)
            .await
            .expect("health check must give up on its own");
        assert!(result.is_err());
    }

    #[test]
    fn test_response_without_entities_parses() {
        let parsed: NerResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.entities.is_empty());
    }
}
