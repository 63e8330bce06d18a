//! LibreTranslate-compatible HTTP backend.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::Translator;
use crate::chain::Backend;
use crate::config::env_opt;

#[derive(Serialize)]
struct LibreRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LibreResponse {
    #[serde(default)]
    translated_text: String,
}

pub struct LibreTranslator {
    url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl LibreTranslator {
    /// Only created when `LIBRETRANSLATE_URL` is set.
    pub fn from_env(client: reqwest::Client, timeout: Duration) -> Option<Self> {
        Some(Self {
            url: env_opt("LIBRETRANSLATE_URL")?,
            api_key: env_opt("LIBRETRANSLATE_API_KEY"),
            timeout,
            client,
        })
    }
}

impl Backend for LibreTranslator {
    fn name(&self) -> &str {
        "libretranslate"
    }
}

#[async_trait::async_trait]
impl Translator for LibreTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> anyhow::Result<String> {
        let body = LibreRequest {
            q: text,
            source,
            target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/translate", self.url.trim_end_matches('/')))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("LibreTranslate request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("LibreTranslate error ({}): {}", status, error_text);
        }

        let parsed: LibreResponse = response
            .json()
            .await
            .context("Failed to parse LibreTranslate response")?;
        Ok(parsed.translated_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_missing_key() {
        let body = LibreRequest {
            q: "fever",
            source: "en",
            target: "es",
            format: "text",
            api_key: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"q": "fever", "source": "en", "target": "es", "format": "text"})
        );
    }

    #[tokio::test]
    async fn test_unresponsive_server_times_out() {
        let libre = LibreTranslator {
            url: crate::services::testing::silent_endpoint().await,
            api_key: None,
            timeout: Duration::from_millis(200),
            client: reqwest::Client::new(),
        };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            libre.translate("fever", "en", "es"),
        )
        .await
        .expect("request must give up on its own");
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("LibreTranslate request failed"));
    }

    #[test]
    fn test_response_field_name() {
        let parsed: LibreResponse = serde_json::from_str(r#"{"translatedText":"fiebre"}"#).unwrap();
        assert_eq!(parsed.translated_text, "fiebre");
    }
}
