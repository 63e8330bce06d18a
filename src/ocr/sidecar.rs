//! Local OCR sidecar (EasyOCR-style) without a binary dependency.

use std::path::Path;

use anyhow::Context;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use super::TextExtractor;
use crate::chain::Backend;
use crate::config::env_opt;

/// Sidecar response: one entry per detected text line, in reading order.
#[derive(Debug, Deserialize)]
struct SidecarResponse {
    #[serde(default)]
    lines: Vec<String>,
}

impl SidecarResponse {
    fn joined(self) -> String {
        self.lines
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct LocalOcrSidecar {
    url: String,
    client: reqwest::Client,
}

impl LocalOcrSidecar {
    /// Only create the backend if `LOCAL_OCR_URL` is explicitly set.
    pub fn from_env(client: reqwest::Client) -> Option<Self> {
        env_opt("LOCAL_OCR_URL").map(|url| Self { url, client })
    }
}

impl Backend for LocalOcrSidecar {
    fn name(&self) -> &str {
        "local_ocr"
    }
}

#[async_trait::async_trait]
impl TextExtractor for LocalOcrSidecar {
    async fn extract(&self, image: &Path) -> anyhow::Result<String> {
        let data = tokio::fs::read(image)
            .await
            .with_context(|| format!("Cannot read {}", image.display()))?;
        let filename = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "page.png".to_string());

        debug!("Local OCR sidecar: sending {} ({} bytes)", filename, data.len());
        let form = Form::new().part("file", Part::bytes(data).file_name(filename));

        let response = self
            .client
            .post(format!("{}/ocr", self.url.trim_end_matches('/')))
            .multipart(form)
            .send()
            .await
            .context("Local OCR sidecar unreachable")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Local OCR sidecar error ({}): {}", status, error_text);
        }

        let result: SidecarResponse = response
            .json()
            .await
            .context("Invalid local OCR sidecar response")?;
        Ok(result.joined())
    }
}
