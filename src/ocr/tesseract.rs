//! Tesseract CLI backend.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::process::Command;
use tracing::debug;

use super::{OcrError, TextExtractor, TESSERACT_INSTALL_HINT};
use crate::binaries::find_on_path;
use crate::chain::Backend;
use crate::config::AcquisitionConfig;

pub struct TesseractOcr {
    binary: String,
    lang: String,
    preprocess: bool,
}

impl TesseractOcr {
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            binary: config.tesseract_bin.clone(),
            lang: config.tesseract_lang.clone(),
            preprocess: config.preprocess_images,
        }
    }

    /// Preprocessed copy of `image` inside `scratch`, or `None` when the
    /// image cannot be decoded.
    async fn prepare(&self, image: &Path, scratch: &Path) -> Option<PathBuf> {
        let src = image.to_path_buf();
        let dst = scratch.join("preprocessed.png");
        let out = dst.clone();

        match tokio::task::spawn_blocking(move || super::preprocess::preprocess_file(&src, &dst)).await {
            Ok(Ok(())) => Some(out),
            Ok(Err(e)) => {
                debug!("Preprocessing skipped, using raw image: {:#}", e);
                None
            }
            Err(e) => {
                debug!("Preprocessing task failed: {}", e);
                None
            }
        }
    }
}

impl Backend for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }
}

#[async_trait::async_trait]
impl TextExtractor for TesseractOcr {
    async fn extract(&self, image: &Path) -> anyhow::Result<String> {
        let binary = find_on_path(&self.binary).ok_or_else(|| OcrError::MissingBinary {
            binary: self.binary.clone(),
            hint: TESSERACT_INSTALL_HINT,
        })?;

        let scratch = tempfile::tempdir().context("Cannot create scratch directory")?;
        let prepared = if self.preprocess {
            self.prepare(image, scratch.path()).await
        } else {
            None
        };
        let input = prepared.as_deref().unwrap_or(image);

        debug!("Running {} on {}", binary.display(), input.display());
        let output = Command::new(&binary)
            .arg(input)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tesseract exited with {}: {}", output.status, stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
