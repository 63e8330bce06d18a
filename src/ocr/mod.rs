//! Text acquisition.
//!
//! Images go through the [`ImageOcr`] chain (tesseract → Google Vision →
//! local OCR sidecar). PDFs use their text layer when it is substantial and
//! are otherwise rasterized and OCR'd page by page (see [`pdf`]).

pub mod google_auth;
pub mod pdf;
pub mod preprocess;
pub mod sidecar;
pub mod tesseract;
pub mod vision;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::chain::{Adopted, Backend, Exhausted, FallbackChain};

pub const TESSERACT_INSTALL_HINT: &str = "Install Tesseract OCR with English language data \
(`apt-get install tesseract-ocr tesseract-ocr-eng`, `brew install tesseract` or \
`conda install -c conda-forge tesseract`) and make sure `tesseract` is on PATH.";

pub const VISION_HINT: &str = "Or configure Google Cloud Vision by setting GOOGLE_API_KEY, \
or GOOGLE_APPLICATION_CREDENTIALS to a service-account JSON file.";

pub const POPPLER_INSTALL_HINT: &str = "Install poppler (`apt-get install poppler-utils`, \
`brew install poppler` or `conda install -c conda-forge poppler`) and make sure `pdftoppm` \
and `pdfinfo` are on PATH.";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "gif", "webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Image,
}

impl DocumentKind {
    /// Classify an upload by extension. `None` for unsupported types.
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        if ext == "pdf" {
            Some(Self::Pdf)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else {
            None
        }
    }
}

/// A document on local disk with its declared type.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub kind: DocumentKind,
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("{binary} not found on PATH. {hint}")]
    MissingBinary { binary: String, hint: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    /// No backend could produce text; the message says what to install or configure.
    #[error("{0}")]
    MissingCapability(String),
    #[error("no text could be extracted from the document")]
    EmptyText,
    #[error("cannot read document: {0}")]
    Io(#[from] std::io::Error),
}

/// Image-to-text backend.
#[async_trait::async_trait]
pub trait TextExtractor: Backend {
    async fn extract(&self, image: &Path) -> anyhow::Result<String>;
}

/// Extracted text and the backend that produced it.
#[derive(Debug, Clone)]
pub struct Acquired {
    pub text: String,
    pub backend: String,
}

pub struct ImageOcr {
    chain: FallbackChain<dyn TextExtractor>,
}

impl ImageOcr {
    pub fn new(extractors: Vec<Arc<dyn TextExtractor>>) -> Self {
        let mut chain = FallbackChain::new("ocr");
        for e in extractors {
            chain.push(e);
        }
        if chain.is_empty() {
            warn!("No image OCR backend configured; image uploads will fail");
        }
        Self { chain }
    }

    pub fn backends(&self) -> Vec<String> {
        self.chain.names()
    }

    /// Run the chain, keeping the attempt log on exhaustion.
    pub async fn attempt(&self, image: &Path) -> Result<Adopted<String>, Exhausted> {
        self.chain
            .run(|e| e.extract(image), |text: &String| !text.trim().is_empty())
            .await
    }

    pub async fn recognize(&self, image: &Path) -> Result<Acquired, AcquisitionError> {
        match self.attempt(image).await {
            Ok(adopted) => {
                info!(backend = %adopted.backend, chars = adopted.value.len(), "OCR succeeded");
                Ok(Acquired {
                    text: adopted.value,
                    backend: adopted.backend,
                })
            }
            Err(exhausted) => {
                warn!("OCR exhausted for {}", image.display());
                Err(AcquisitionError::MissingCapability(image_diagnostic(&exhausted)))
            }
        }
    }
}

/// Actionable message for an image no backend could read.
pub fn image_diagnostic(exhausted: &Exhausted) -> String {
    format!(
        "OCR failed: no usable OCR method succeeded.\n- {}\n- {}\nAttempts:\n{}",
        TESSERACT_INSTALL_HINT,
        VISION_HINT,
        exhausted.describe()
    )
}

/// Routes a document to the image chain or the PDF acquirer.
pub struct Acquirer {
    images: Arc<ImageOcr>,
    pdf: pdf::PdfAcquirer,
}

impl Acquirer {
    pub fn new(images: Arc<ImageOcr>, pdf: pdf::PdfAcquirer) -> Self {
        Self { images, pdf }
    }

    pub fn image_backends(&self) -> Vec<String> {
        self.images.backends()
    }

    pub async fn acquire(&self, doc: &Document) -> Result<Acquired, AcquisitionError> {
        if !doc.path.is_file() {
            return Err(AcquisitionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a readable file", doc.path.display()),
            )));
        }
        match doc.kind {
            DocumentKind::Image => self.images.recognize(&doc.path).await,
            DocumentKind::Pdf => self.pdf.acquire(&doc.path).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by the acquisition tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns canned text keyed by file name; unknown files fail.
    pub struct ScriptedOcr {
        pub name: &'static str,
        pub replies: HashMap<String, String>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedOcr {
        pub fn new(name: &'static str, replies: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                name,
                replies: replies
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Backend for ScriptedOcr {
        fn name(&self) -> &str {
            self.name
        }
    }

    #[async_trait::async_trait]
    impl TextExtractor for ScriptedOcr {
        async fn extract(&self, image: &Path) -> anyhow::Result<String> {
            let file = image.file_name().unwrap().to_string_lossy().into_owned();
            self.calls.lock().unwrap().push(file.clone());
            self.replies
                .get(&file)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unreadable image {}", file))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedOcr;
    use super::*;
    use crate::config::AcquisitionConfig;

    fn scratch_image(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"img").unwrap();
        path
    }

    #[test]
    fn test_document_kind_from_filename() {
        assert_eq!(DocumentKind::from_filename("scan.PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_filename("photo.jpeg"), Some(DocumentKind::Image));
        assert_eq!(DocumentKind::from_filename("x-ray.Tiff"), Some(DocumentKind::Image));
        assert_eq!(DocumentKind::from_filename("notes.docx"), None);
        assert_eq!(DocumentKind::from_filename("README"), None);
    }

    #[tokio::test]
    async fn test_empty_output_falls_through_to_next_backend() {
        let dir = tempfile::tempdir().unwrap();
        let image = scratch_image(dir.path(), "label.png");

        let first = ScriptedOcr::new("tesseract", &[("label.png", "  \n ")]);
        let second = ScriptedOcr::new("google_vision", &[("label.png", "Amoxicillin 500 mg")]);
        let ocr = ImageOcr::new(vec![first.clone(), second.clone()]);

        let acquired = ocr.recognize(&image).await.unwrap();
        assert_eq!(acquired.text, "Amoxicillin 500 mg");
        assert_eq!(acquired.backend, "google_vision");
        assert_eq!(first.call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_tesseract_then_exhaustion_gives_install_guidance() {
        let dir = tempfile::tempdir().unwrap();
        let image = scratch_image(dir.path(), "scan.png");

        let config = AcquisitionConfig {
            tesseract_bin: "tesseract-absent-for-test".to_string(),
            ..AcquisitionConfig::default()
        };
        let tesseract: Arc<dyn TextExtractor> = Arc::new(tesseract::TesseractOcr::new(&config));
        let sidecar = ScriptedOcr::new("local_ocr", &[]);
        let ocr = ImageOcr::new(vec![tesseract, sidecar.clone() as Arc<dyn TextExtractor>]);

        let err = ocr.recognize(&image).await.unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, AcquisitionError::MissingCapability(_)));
        assert!(msg.contains("Install Tesseract"));
        assert!(msg.contains("GOOGLE_APPLICATION_CREDENTIALS"));
        assert!(msg.contains("- tesseract: tesseract-absent-for-test not found on PATH"));
        assert!(msg.contains("- local_ocr: unreadable image scan.png"));
        assert_eq!(sidecar.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_backends_is_missing_capability() {
        let dir = tempfile::tempdir().unwrap();
        let image = scratch_image(dir.path(), "scan.png");

        let err = ImageOcr::new(Vec::new()).recognize(&image).await.unwrap_err();
        assert!(err.to_string().contains("- no backends configured"));
    }
}
