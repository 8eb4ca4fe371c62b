use crate::error::IngestError;
use crate::models::{ImageFormat, PageImage};
use crate::traits::{DocumentLoader, PageSource};
use lopdf::Document;
use std::path::{Path, PathBuf};
use std::process::Command;

/// JPEG quality used for page rasters handed to OCR.
pub const DEFAULT_JPEG_QUALITY: u8 = 15;
pub const DEFAULT_RENDER_DPI: u32 = 300;

/// Rasterizes single pages with poppler's `pdftoppm`, writing JPEG to stdout.
#[derive(Debug, Clone)]
pub struct PopplerRenderer {
    pub binary: PathBuf,
    pub dpi: u32,
    pub jpeg_quality: u8,
}

impl Default for PopplerRenderer {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("pdftoppm"),
            dpi: DEFAULT_RENDER_DPI,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl PopplerRenderer {
    fn arguments(&self, page_number: u32) -> Vec<String> {
        vec![
            "-f".to_string(),
            page_number.to_string(),
            "-l".to_string(),
            page_number.to_string(),
            "-r".to_string(),
            self.dpi.to_string(),
            "-jpeg".to_string(),
            "-jpegopt".to_string(),
            format!("quality={}", self.jpeg_quality),
            "-singlefile".to_string(),
        ]
    }

    pub fn render(&self, path: &Path, page_number: u32) -> Result<Vec<u8>, IngestError> {
        let output = Command::new(&self.binary)
            .args(self.arguments(page_number))
            .arg(path)
            .output()?;

        if !output.status.success() {
            return Err(IngestError::RenderFailed(format!(
                "{} exited with {} for page {page_number} of {}: {}",
                self.binary.display(),
                output.status,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(IngestError::RenderFailed(format!(
                "{} produced no image for page {page_number} of {}",
                self.binary.display(),
                path.display()
            )));
        }

        Ok(output.stdout)
    }
}

/// A PDF opened with lopdf for native text, rendered through poppler for OCR.
pub struct PdfDocument {
    path: PathBuf,
    document: Document,
    page_numbers: Vec<u32>,
    renderer: PopplerRenderer,
}

impl PdfDocument {
    pub fn open(path: &Path, renderer: PopplerRenderer) -> Result<Self, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;
        let page_numbers = document.get_pages().keys().copied().collect::<Vec<_>>();

        if page_numbers.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf has no pages: {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            document,
            page_numbers,
            renderer,
        })
    }

    fn page_number(&self, index: usize) -> Result<u32, IngestError> {
        self.page_numbers.get(index).copied().ok_or_else(|| {
            IngestError::InvalidArgument(format!(
                "page index {index} out of range for {} pages",
                self.page_numbers.len()
            ))
        })
    }
}

impl PageSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_numbers.len()
    }

    fn render_page(&self, index: usize) -> Result<PageImage, IngestError> {
        let page_number = self.page_number(index)?;
        let bytes = self.renderer.render(&self.path, page_number)?;
        Ok(PageImage {
            page: index,
            format: ImageFormat::Jpeg,
            bytes,
        })
    }

    fn extract_text(&self, index: usize) -> Result<String, IngestError> {
        let page_number = self.page_number(index)?;
        self.document
            .extract_text(&[page_number])
            .map_err(|error| IngestError::PdfParse(error.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PdfLoader {
    pub renderer: PopplerRenderer,
}

impl DocumentLoader for PdfLoader {
    type Document = PdfDocument;

    fn open(&self, path: &Path) -> Result<Self::Document, IngestError> {
        PdfDocument::open(path, self.renderer.clone())
    }
}
