//! PDF acquisition: text layer first, page OCR when the layer is thin.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{
    Acquired, AcquisitionError, ImageOcr, OcrError, POPPLER_INSTALL_HINT, TESSERACT_INSTALL_HINT,
    VISION_HINT,
};
use crate::binaries::{find_on_path, missing};
use crate::config::AcquisitionConfig;

pub const TEXT_LAYER_BACKEND: &str = "pdf_text_layer";
const PAGE_SEPARATOR: &str = "\n\n";

/// Per-page embedded text. Pages that fail to decode yield empty strings.
#[async_trait::async_trait]
pub trait PdfTextLayer: Send + Sync {
    async fn page_texts(&self, pdf: &Path) -> anyhow::Result<Vec<String>>;
}

/// Renders single PDF pages to image files.
#[async_trait::async_trait]
pub trait PageRasterizer: Send + Sync {
    fn name(&self) -> &str;
    async fn page_count(&self, pdf: &Path) -> anyhow::Result<usize>;
    /// Render 1-based `page` into `out_dir`, returning the image path.
    async fn render_page(&self, pdf: &Path, page: usize, out_dir: &Path) -> anyhow::Result<PathBuf>;
}

// ============================================================================
// lopdf text layer
// ============================================================================

pub struct LopdfTextLayer;

fn extract_page_texts(path: &Path) -> anyhow::Result<Vec<String>> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| anyhow::anyhow!("Failed to load PDF: {}", e))?;

    Ok(doc
        .get_pages()
        .keys()
        .map(|&page_num| match doc.extract_text(&[page_num]) {
            Ok(text) => text,
            Err(e) => {
                debug!("Page {} has no extractable text: {}", page_num, e);
                String::new()
            }
        })
        .collect())
}

#[async_trait::async_trait]
impl PdfTextLayer for LopdfTextLayer {
    async fn page_texts(&self, pdf: &Path) -> anyhow::Result<Vec<String>> {
        let path = pdf.to_path_buf();
        tokio::task::spawn_blocking(move || extract_page_texts(&path))
            .await
            .context("PDF text extraction task panicked")?
    }
}

// ============================================================================
// Poppler rasterizer
// ============================================================================

pub struct PopplerRasterizer {
    pdftoppm: String,
    pdfinfo: String,
    dpi: u32,
}

impl PopplerRasterizer {
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            pdftoppm: config.pdftoppm_bin.clone(),
            pdfinfo: config.pdfinfo_bin.clone(),
            dpi: config.pdf_dpi,
        }
    }

    fn locate(binary: &str) -> Result<PathBuf, OcrError> {
        find_on_path(binary).ok_or_else(|| OcrError::MissingBinary {
            binary: binary.to_string(),
            hint: POPPLER_INSTALL_HINT,
        })
    }
}

/// `Pages:` line of `pdfinfo` output.
fn parse_page_count(pdfinfo_output: &str) -> Option<usize> {
    pdfinfo_output
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|n| n.trim().parse().ok())
}

#[async_trait::async_trait]
impl PageRasterizer for PopplerRasterizer {
    fn name(&self) -> &str {
        "pdftoppm"
    }

    async fn page_count(&self, pdf: &Path) -> anyhow::Result<usize> {
        let binary = Self::locate(&self.pdfinfo)?;
        let output = Command::new(&binary)
            .arg(pdf)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("pdfinfo exited with {}: {}", output.status, stderr.trim());
        }
        parse_page_count(&String::from_utf8_lossy(&output.stdout))
            .context("pdfinfo output has no page count")
    }

    async fn render_page(&self, pdf: &Path, page: usize, out_dir: &Path) -> anyhow::Result<PathBuf> {
        let binary = Self::locate(&self.pdftoppm)?;
        let prefix = out_dir.join(format!("page-{}", page));
        let page_arg = page.to_string();

        let output = Command::new(&binary)
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(&page_arg)
            .arg("-l")
            .arg(&page_arg)
            .arg("-png")
            .arg("-singlefile")
            .arg(pdf)
            .arg(&prefix)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("pdftoppm exited with {}: {}", output.status, stderr.trim());
        }

        let image = prefix.with_extension("png");
        if !image.is_file() {
            anyhow::bail!("pdftoppm produced no image for page {}", page);
        }
        Ok(image)
    }
}

// ============================================================================
// Acquirer
// ============================================================================

pub struct PdfAcquirer {
    text_layer: Arc<dyn PdfTextLayer>,
    rasterizer: Arc<dyn PageRasterizer>,
    images: Arc<ImageOcr>,
    config: AcquisitionConfig,
}

impl PdfAcquirer {
    pub fn new(
        text_layer: Arc<dyn PdfTextLayer>,
        rasterizer: Arc<dyn PageRasterizer>,
        images: Arc<ImageOcr>,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            text_layer,
            rasterizer,
            images,
            config,
        }
    }

    pub async fn acquire(&self, pdf: &Path) -> Result<Acquired, AcquisitionError> {
        let pages = match self.text_layer.page_texts(pdf).await {
            Ok(pages) => pages,
            Err(e) => {
                warn!("PDF text layer unavailable: {:#}", e);
                Vec::new()
            }
        };
        let direct = pages.join(PAGE_SEPARATOR);
        let direct_len = direct.trim().chars().count();

        if direct_len > self.config.min_text_chars {
            info!(pages = pages.len(), chars = direct_len, "Using PDF text layer");
            return Ok(Acquired {
                text: direct,
                backend: TEXT_LAYER_BACKEND.to_string(),
            });
        }

        info!(
            chars = direct_len,
            "PDF text layer below {} chars, running OCR", self.config.min_text_chars
        );
        match self.ocr_pages(pdf, pages.len()).await {
            Ok(Some(acquired)) => return Ok(acquired),
            Ok(None) => warn!("OCR found no text on any PDF page"),
            Err(e) => warn!("PDF OCR unavailable: {:#}", e),
        }

        if !direct.trim().is_empty() {
            debug!("Falling back to short text layer ({} chars)", direct_len);
            return Ok(Acquired {
                text: direct,
                backend: TEXT_LAYER_BACKEND.to_string(),
            });
        }

        Err(AcquisitionError::MissingCapability(self.empty_diagnostic()))
    }

    /// OCR every page up to the cap. `Ok(None)` when no page produced text.
    async fn ocr_pages(&self, pdf: &Path, known_pages: usize) -> anyhow::Result<Option<Acquired>> {
        let total = if known_pages > 0 {
            known_pages
        } else {
            self.rasterizer.page_count(pdf).await?
        };
        let count = total.min(self.config.max_pdf_pages);
        if count < total {
            warn!("OCR limited to the first {} of {} pages", count, total);
        }

        let scratch = tempfile::Builder::new()
            .prefix("pdf-pages-")
            .tempdir()
            .context("Cannot create page directory")?;

        let mut parts = Vec::with_capacity(count);
        let mut winner: Option<String> = None;
        for page in 1..=count {
            match self.ocr_page(pdf, page, scratch.path()).await {
                Ok((text, backend)) => {
                    winner.get_or_insert(backend);
                    parts.push(text);
                }
                Err(e) => {
                    warn!("Page {} OCR failed: {}", page, e);
                    parts.push(format!("[page {} error: {}]", page, e));
                }
            }
        }

        Ok(winner.map(|backend| Acquired {
            text: parts.join(PAGE_SEPARATOR),
            backend: format!("{}+{}", self.rasterizer.name(), backend),
        }))
    }

    async fn ocr_page(&self, pdf: &Path, page: usize, dir: &Path) -> Result<(String, String), String> {
        let image = self
            .rasterizer
            .render_page(pdf, page, dir)
            .await
            .map_err(|e| format!("{:#}", e))?;

        let result = self.images.attempt(&image).await;
        if let Err(e) = tokio::fs::remove_file(&image).await {
            debug!("Could not remove {}: {}", image.display(), e);
        }

        match result {
            Ok(adopted) => Ok((adopted.value, adopted.backend)),
            Err(exhausted) => Err(format!(
                "no OCR backend produced text ({})",
                exhausted
                    .attempts
                    .iter()
                    .map(|a| format!("{}: {}", a.backend, a.outcome))
                    .collect::<Vec<_>>()
                    .join("; ")
            )),
        }
    }

    /// Explain why a PDF yielded nothing, naming the absent tools.
    fn empty_diagnostic(&self) -> String {
        let cfg = &self.config;
        let absent = missing(&[
            cfg.pdftoppm_bin.as_str(),
            cfg.pdfinfo_bin.as_str(),
            cfg.tesseract_bin.as_str(),
        ]);

        if absent.is_empty() {
            return "The PDF has no text layer and OCR found no text on any page.".to_string();
        }

        let mut msg = format!(
            "Could not extract text from the PDF: it has no usable text layer and OCR is unavailable.\n\
             Missing tools: {}.",
            absent.join(", ")
        );
        if absent.contains(&cfg.pdftoppm_bin.as_str()) || absent.contains(&cfg.pdfinfo_bin.as_str()) {
            msg.push_str(&format!("\n- {}", POPPLER_INSTALL_HINT));
        }
        if absent.contains(&cfg.tesseract_bin.as_str()) {
            msg.push_str(&format!("\n- {}\n- {}", TESSERACT_INSTALL_HINT, VISION_HINT));
        }
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::testing::ScriptedOcr;
    use crate::ocr::TextExtractor;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use std::sync::Mutex;

    struct FixedTextLayer(Vec<&'static str>);

    #[async_trait::async_trait]
    impl PdfTextLayer for FixedTextLayer {
        async fn page_texts(&self, _pdf: &Path) -> anyhow::Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    /// Writes an empty file per rendered page; fails for pages in `broken`.
    #[derive(Default)]
    struct FakeRasterizer {
        pages: usize,
        broken: Vec<usize>,
        rendered: Mutex<Vec<usize>>,
        /// Every directory and page file handed out.
        touched: Mutex<Vec<PathBuf>>,
    }

    #[async_trait::async_trait]
    impl PageRasterizer for FakeRasterizer {
        fn name(&self) -> &str {
            "fake_raster"
        }

        async fn page_count(&self, _pdf: &Path) -> anyhow::Result<usize> {
            Ok(self.pages)
        }

        async fn render_page(&self, _pdf: &Path, page: usize, out_dir: &Path) -> anyhow::Result<PathBuf> {
            self.rendered.lock().unwrap().push(page);
            self.touched.lock().unwrap().push(out_dir.to_path_buf());
            if self.broken.contains(&page) {
                anyhow::bail!("corrupt page stream");
            }
            let path = out_dir.join(format!("page-{}.png", page));
            std::fs::write(&path, b"png")?;
            self.touched.lock().unwrap().push(path.clone());
            Ok(path)
        }
    }

    fn acquirer(
        layer: Vec<&'static str>,
        raster: Arc<FakeRasterizer>,
        ocr: Arc<ScriptedOcr>,
        config: AcquisitionConfig,
    ) -> PdfAcquirer {
        let images = Arc::new(ImageOcr::new(vec![ocr as Arc<dyn TextExtractor>]));
        PdfAcquirer::new(Arc::new(FixedTextLayer(layer)), raster, images, config)
    }

    fn dummy_pdf() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.pdf");
        std::fs::write(&path, b"%PDF-1.5").unwrap();
        (dir, path)
    }

    /// One-page PDF; `text` is drawn with a standard font when given.
    fn write_pdf(path: &Path, text: Option<&str>) {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut operations = Vec::new();
        if let Some(text) = text {
            operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ];
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    const LONG_PAGE: &str =
        "Discharge summary: patient admitted with community acquired pneumonia, treated with IV antibiotics.";

    #[test]
    fn test_parse_page_count() {
        let out = "Title:          Lab report\nProducer:       Skia\nPages:          12\nEncrypted:      no\n";
        assert_eq!(parse_page_count(out), Some(12));
        assert_eq!(parse_page_count("Syntax Error"), None);
    }

    #[tokio::test]
    async fn test_text_native_pdf_skips_ocr() {
        let (_dir, pdf) = dummy_pdf();
        let raster = Arc::new(FakeRasterizer::default());
        let ocr = ScriptedOcr::new("tesseract", &[]);
        let acq = acquirer(vec![LONG_PAGE, "Page two"], raster.clone(), ocr.clone(), AcquisitionConfig::default());

        let result = acq.acquire(&pdf).await.unwrap();
        assert_eq!(result.text, format!("{}\n\nPage two", LONG_PAGE));
        assert_eq!(result.backend, TEXT_LAYER_BACKEND);
        assert!(raster.rendered.lock().unwrap().is_empty());
        assert_eq!(ocr.call_count(), 0);
    }

    #[tokio::test]
    async fn test_scanned_pdf_is_ocrd_in_page_order() {
        let (_dir, pdf) = dummy_pdf();
        let raster = Arc::new(FakeRasterizer::default());
        let ocr = ScriptedOcr::new(
            "tesseract",
            &[("page-1.png", "CBC results"), ("page-2.png", "Hemoglobin 13.2")],
        );
        let acq = acquirer(vec!["", " "], raster.clone(), ocr, AcquisitionConfig::default());

        let result = acq.acquire(&pdf).await.unwrap();
        assert_eq!(result.text, "CBC results\n\nHemoglobin 13.2");
        assert_eq!(result.backend, "fake_raster+tesseract");
        assert_eq!(raster.rendered.lock().unwrap().as_slice(), &[1, 2]);
    }

    #[tokio::test]
    async fn test_failed_page_is_marked_inline() {
        let (_dir, pdf) = dummy_pdf();
        let raster = Arc::new(FakeRasterizer {
            broken: vec![2],
            ..FakeRasterizer::default()
        });
        let ocr = ScriptedOcr::new(
            "tesseract",
            &[("page-1.png", "Page one text"), ("page-3.png", "Page three text")],
        );
        let acq = acquirer(vec!["", "", ""], raster, ocr, AcquisitionConfig::default());

        let result = acq.acquire(&pdf).await.unwrap();
        let parts: Vec<&str> = result.text.split("\n\n").collect();
        assert_eq!(parts[0], "Page one text");
        assert_eq!(parts[1], "[page 2 error: corrupt page stream]");
        assert_eq!(parts[2], "Page three text");
    }

    #[tokio::test]
    async fn test_page_rasters_removed_whatever_the_outcome() {
        let (_dir, pdf) = dummy_pdf();
        // Page 1 fails to render, page 2 is read, page 3 renders but yields nothing.
        let raster = Arc::new(FakeRasterizer {
            pages: 3,
            broken: vec![1],
            ..FakeRasterizer::default()
        });
        let ocr = ScriptedOcr::new("tesseract", &[("page-2.png", "Creatinine 1.1")]);
        let acq = acquirer(Vec::new(), raster.clone(), ocr, AcquisitionConfig::default());

        let result = acq.acquire(&pdf).await.unwrap();
        assert!(result.text.contains("Creatinine 1.1"));

        let touched = raster.touched.lock().unwrap();
        assert!(touched.len() >= 3);
        for path in touched.iter() {
            assert!(!path.exists(), "{} left behind", path.display());
        }
    }

    #[tokio::test]
    async fn test_page_rasters_removed_when_no_page_is_read() {
        let (_dir, pdf) = dummy_pdf();
        let raster = Arc::new(FakeRasterizer {
            pages: 2,
            ..FakeRasterizer::default()
        });
        let ocr = ScriptedOcr::new("tesseract", &[]);
        let acq = acquirer(Vec::new(), raster.clone(), ocr, AcquisitionConfig::default());

        assert!(acq.acquire(&pdf).await.is_err());
        let touched = raster.touched.lock().unwrap();
        assert!(!touched.is_empty());
        assert!(touched.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn test_page_cap_limits_ocr() {
        let (_dir, pdf) = dummy_pdf();
        let raster = Arc::new(FakeRasterizer {
            pages: 20,
            ..FakeRasterizer::default()
        });
        let ocr = ScriptedOcr::new("tesseract", &[("page-1.png", "first page")]);
        let config = AcquisitionConfig {
            max_pdf_pages: 3,
            ..AcquisitionConfig::default()
        };
        // Unparseable text layer: page count comes from the rasterizer.
        let acq = acquirer(Vec::new(), raster.clone(), ocr, config);

        let result = acq.acquire(&pdf).await.unwrap();
        assert!(result.text.starts_with("first page"));
        assert_eq!(raster.rendered.lock().unwrap().as_slice(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_short_text_layer_used_when_ocr_finds_nothing() {
        let (_dir, pdf) = dummy_pdf();
        let raster = Arc::new(FakeRasterizer::default());
        let ocr = ScriptedOcr::new("tesseract", &[]);
        let acq = acquirer(vec!["Rx: rest"], raster, ocr, AcquisitionConfig::default());

        let result = acq.acquire(&pdf).await.unwrap();
        assert_eq!(result.text, "Rx: rest");
        assert_eq!(result.backend, TEXT_LAYER_BACKEND);
    }

    #[tokio::test]
    async fn test_empty_pdf_without_poppler_names_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("scan.pdf");
        write_pdf(&pdf, None);

        let config = AcquisitionConfig {
            pdftoppm_bin: "pdftoppm-absent-for-test".to_string(),
            pdfinfo_bin: "pdfinfo-absent-for-test".to_string(),
            ..AcquisitionConfig::default()
        };
        let images = Arc::new(ImageOcr::new(Vec::new()));
        let acq = PdfAcquirer::new(
            Arc::new(LopdfTextLayer),
            Arc::new(PopplerRasterizer::new(&config)),
            images,
            config,
        );

        let err = acq.acquire(&pdf).await.unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, AcquisitionError::MissingCapability(_)));
        assert!(msg.contains("pdftoppm-absent-for-test"));
        assert!(msg.contains("pdfinfo-absent-for-test"));
        assert!(msg.contains("Install poppler"));
    }

    #[tokio::test]
    async fn test_lopdf_reads_text_layer() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("report.pdf");
        write_pdf(&pdf, Some("Hemoglobin 13.2 g/dL"));

        let pages = LopdfTextLayer.page_texts(&pdf).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].contains("Hemoglobin 13.2 g/dL"));
    }

    #[tokio::test]
    async fn test_lopdf_rejects_garbage() {
        let (_dir, pdf) = dummy_pdf();
        assert!(LopdfTextLayer.page_texts(&pdf).await.is_err());
    }
}
