//! Pipeline and server configuration.
//!
//! Every tunable has a default; environment variables override them.
//! Credentials and sidecar endpoints are read by the backends that need them
//! (see `services.rs`), not here.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Text acquisition tunables (OCR + PDF).
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Trimmed direct-extraction length above which a PDF counts as text-native.
    pub min_text_chars: usize,
    /// Rasterization resolution for scanned PDF pages.
    pub pdf_dpi: u32,
    /// Scanned PDFs beyond this many pages are only partially OCR'd.
    pub max_pdf_pages: usize,
    /// Grayscale / denoise / adaptive threshold before tesseract.
    pub preprocess_images: bool,
    pub tesseract_bin: String,
    pub tesseract_lang: String,
    pub pdftoppm_bin: String,
    pub pdfinfo_bin: String,
    pub cloud_timeout: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 50,
            pdf_dpi: 300,
            max_pdf_pages: 8,
            preprocess_images: true,
            tesseract_bin: "tesseract".to_string(),
            tesseract_lang: "eng".to_string(),
            pdftoppm_bin: "pdftoppm".to_string(),
            pdfinfo_bin: "pdfinfo".to_string(),
            cloud_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntityConfig {
    pub max_chars: usize,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self { max_chars: 100_000 }
    }
}

#[derive(Debug, Clone)]
pub struct SummaryConfig {
    /// Below this many words the simplified text is returned as-is.
    pub min_words: usize,
    /// Model input is capped to this many words.
    pub max_input_words: usize,
    pub max_length: usize,
    pub min_length: usize,
    /// Characters of the original text used when the model call fails.
    pub snippet_chars: usize,
    pub model_timeout: Duration,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            min_words: 40,
            max_input_words: 1000,
            max_length: 120,
            min_length: 30,
            snippet_chars: 500,
            model_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub source_lang: String,
    pub default_target: String,
    pub max_chars: usize,
    pub cloud_timeout: Duration,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            source_lang: "en".to_string(),
            default_target: "ar".to_string(),
            max_chars: 5000,
            cloud_timeout: Duration::from_secs(30),
        }
    }
}

/// Everything the pipeline stages need.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub acquisition: AcquisitionConfig,
    pub entities: EntityConfig,
    pub summary: SummaryConfig,
    pub translation: TranslationConfig,
    /// Extracted text returned to the client is cut at this many characters.
    pub response_text_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionConfig::default(),
            entities: EntityConfig::default(),
            summary: SummaryConfig::default(),
            translation: TranslationConfig::default(),
            response_text_limit: 20_000,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        let acq = &mut cfg.acquisition;
        acq.min_text_chars = env_or("PDF_MIN_TEXT_CHARS", acq.min_text_chars);
        acq.pdf_dpi = env_or("PDF_OCR_DPI", acq.pdf_dpi);
        acq.max_pdf_pages = env_or("PDF_OCR_MAX_PAGES", acq.max_pdf_pages);
        acq.preprocess_images = env_or("OCR_PREPROCESS", acq.preprocess_images);
        acq.tesseract_bin = env_string("TESSERACT_BIN", &acq.tesseract_bin);
        acq.tesseract_lang = env_string("TESSERACT_LANG", &acq.tesseract_lang);
        acq.pdftoppm_bin = env_string("PDFTOPPM_BIN", &acq.pdftoppm_bin);
        acq.pdfinfo_bin = env_string("PDFINFO_BIN", &acq.pdfinfo_bin);
        acq.cloud_timeout = env_secs("CLOUD_OCR_TIMEOUT_SECS", acq.cloud_timeout);

        cfg.entities.max_chars = env_or("ENTITY_MAX_CHARS", cfg.entities.max_chars);

        let sum = &mut cfg.summary;
        sum.min_words = env_or("SUMMARY_MIN_WORDS", sum.min_words);
        sum.max_input_words = env_or("SUMMARY_MAX_WORDS", sum.max_input_words);
        sum.model_timeout = env_secs("SUMMARY_TIMEOUT_SECS", sum.model_timeout);

        let tr = &mut cfg.translation;
        tr.source_lang = env_string("TRANSLATION_SOURCE_LANG", &tr.source_lang);
        tr.default_target = env_string("TRANSLATION_DEFAULT_TARGET", &tr.default_target);
        tr.max_chars = env_or("TRANSLATION_MAX_CHARS", tr.max_chars);
        tr.cloud_timeout = env_secs("TRANSLATION_TIMEOUT_SECS", tr.cloud_timeout);

        cfg.response_text_limit = env_or("RESPONSE_TEXT_LIMIT", cfg.response_text_limit);
        cfg
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    /// Parent of the per-request upload directories.
    pub upload_dir: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let max_upload_mb: usize = env_or("MAX_UPLOAD_MB", 25);
        Self {
            bind_addr: env_string("BIND_ADDR", "0.0.0.0:8000"),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            upload_dir: env_opt("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
        }
    }
}

/// Parse an env var, keeping `default` when unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!("Ignoring malformed {}={:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or(key, default.as_secs()))
}

/// Read an optional, non-empty env var (credentials, endpoints).
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.acquisition.pdf_dpi, 300);
        assert_eq!(cfg.acquisition.max_pdf_pages, 8);
        assert_eq!(cfg.entities.max_chars, 100_000);
        assert_eq!(cfg.summary.min_words, 40);
        assert_eq!(cfg.summary.max_input_words, 1000);
        assert_eq!(cfg.translation.max_chars, 5000);
        assert_eq!(cfg.translation.default_target, "ar");
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("MEDICAL_ASSISTANT_TEST_NUM", "not-a-number");
        assert_eq!(env_or("MEDICAL_ASSISTANT_TEST_NUM", 7usize), 7);
        std::env::set_var("MEDICAL_ASSISTANT_TEST_NUM", " 12 ");
        assert_eq!(env_or("MEDICAL_ASSISTANT_TEST_NUM", 7usize), 12);
        std::env::remove_var("MEDICAL_ASSISTANT_TEST_NUM");
    }

    #[test]
    fn test_env_opt_ignores_blank() {
        std::env::set_var("MEDICAL_ASSISTANT_TEST_OPT", "   ");
        assert_eq!(env_opt("MEDICAL_ASSISTANT_TEST_OPT"), None);
        std::env::remove_var("MEDICAL_ASSISTANT_TEST_OPT");
    }
}
