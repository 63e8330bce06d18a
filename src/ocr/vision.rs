//! Google Cloud Vision text detection.
//!
//! Authenticates with `GOOGLE_API_KEY` when set, otherwise with the
//! service-account key file in `GOOGLE_APPLICATION_CREDENTIALS`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::google_auth::{ServiceAccountAuth, CLOUD_VISION_SCOPE};
use super::TextExtractor;
use crate::chain::Backend;
use crate::config::env_opt;

const ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

enum Credentials {
    ApiKey(String),
    ServiceAccount(ServiceAccountAuth),
}

pub struct VisionOcr {
    credentials: Credentials,
    timeout: Duration,
    client: reqwest::Client,
}

impl VisionOcr {
    /// `None` when neither credential is configured or the key file is unusable.
    pub fn from_env(client: reqwest::Client, timeout: Duration) -> Option<Self> {
        let credentials = if let Some(key) = env_opt("GOOGLE_API_KEY") {
            Credentials::ApiKey(key)
        } else {
            let path = PathBuf::from(env_opt("GOOGLE_APPLICATION_CREDENTIALS")?);
            match ServiceAccountAuth::from_file(&path, CLOUD_VISION_SCOPE) {
                Ok(auth) => Credentials::ServiceAccount(auth),
                Err(e) => {
                    warn!("Google Vision disabled: {:#}", e);
                    return None;
                }
            }
        };

        Some(Self {
            credentials,
            timeout,
            client,
        })
    }
}

// ── Vision API request/response types ───────────────────────────────────────

#[derive(Serialize)]
struct AnnotateRequest {
    requests: Vec<ImageRequest>,
}

#[derive(Serialize)]
struct ImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    #[serde(default)]
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

/// The first text annotation covers the whole image.
fn full_text(response: AnnotateResponse) -> anyhow::Result<String> {
    let Some(first) = response.responses.into_iter().next() else {
        return Ok(String::new());
    };
    if let Some(status) = first.error.filter(|s| !s.message.is_empty()) {
        anyhow::bail!("Google Vision error: {}", status.message);
    }
    Ok(first
        .text_annotations
        .into_iter()
        .next()
        .map(|a| a.description)
        .unwrap_or_default())
}

impl Backend for VisionOcr {
    fn name(&self) -> &str {
        "google_vision"
    }
}

#[async_trait::async_trait]
impl TextExtractor for VisionOcr {
    async fn extract(&self, image: &Path) -> anyhow::Result<String> {
        let bytes = tokio::fs::read(image)
            .await
            .with_context(|| format!("Cannot read {}", image.display()))?;

        let body = AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent {
                    content: base64::engine::general_purpose::STANDARD.encode(&bytes),
                },
                features: vec![Feature {
                    kind: "TEXT_DETECTION",
                }],
            }],
        };

        let mut request = self.client.post(ANNOTATE_URL).timeout(self.timeout).json(&body);
        request = match &self.credentials {
            Credentials::ApiKey(key) => request.query(&[("key", key.as_str())]),
            Credentials::ServiceAccount(auth) => {
                request.bearer_auth(auth.access_token(&self.client, self.timeout).await?)
            }
        };

        debug!("Google Vision: annotating {} bytes", bytes.len());
        let response = request.send().await.context("Google Vision request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Google Vision API error ({}): {}", status, error_text);
        }

        let parsed: AnnotateResponse = response
            .json()
            .await
            .context("Failed to parse Google Vision response")?;
        full_text(parsed)
    }
}
