//! In-memory collaborators shared by the unit tests.

use crate::error::IngestError;
use crate::models::{ImageFormat, PageImage};
use crate::traits::{
    DocumentLoader, EmbeddingClient, EmbeddingProvider, OcrClient, OcrEngine, PageSource,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const TAG_DIMENSIONS: usize = 4;

/// Pages whose rendered image bytes are the text OCR will "recognize".
#[derive(Debug, Clone, Default)]
pub struct FakeDocument {
    pub native: Vec<String>,
    pub ocr: Vec<String>,
    pub fail_render: bool,
    pub fail_extraction: bool,
}

impl FakeDocument {
    pub fn uniform(pages: usize, native: &str, ocr: &str) -> Self {
        Self {
            native: vec![native.to_string(); pages],
            ocr: vec![ocr.to_string(); pages],
            ..Self::default()
        }
    }

    /// Every page carries its own index so embeddings can be traced back.
    pub fn tagged(pages: usize) -> Self {
        let texts = (0..pages)
            .map(|page| format!("page {page} of the synthetic manual"))
            .collect::<Vec<_>>();
        Self {
            native: texts.clone(),
            ocr: texts,
            ..Self::default()
        }
    }
}

impl PageSource for FakeDocument {
    fn page_count(&self) -> usize {
        self.native.len()
    }

    fn render_page(&self, index: usize) -> Result<PageImage, IngestError> {
        if self.fail_render {
            return Err(IngestError::RenderFailed(format!("cannot rasterize page {index}")));
        }
        Ok(PageImage {
            page: index,
            format: ImageFormat::Jpeg,
            bytes: self.ocr[index].as_bytes().to_vec(),
        })
    }

    fn extract_text(&self, index: usize) -> Result<String, IngestError> {
        if self.fail_extraction {
            return Err(IngestError::PdfParse(format!("no text layer on page {index}")));
        }
        Ok(self.native[index].clone())
    }
}

#[derive(Debug, Default)]
pub struct FakeOcr {
    pub fail_all: bool,
    pub fail_on: Option<usize>,
    pub fatal: bool,
    pub recognized: Arc<AtomicUsize>,
}

pub struct FakeOcrClient {
    fail_all: bool,
    fail_on: Option<usize>,
    fatal: bool,
    recognized: Arc<AtomicUsize>,
}

impl OcrEngine for FakeOcr {
    type Client = FakeOcrClient;

    fn create_client(&self) -> Result<Self::Client, IngestError> {
        Ok(FakeOcrClient {
            fail_all: self.fail_all,
            fail_on: self.fail_on,
            fatal: self.fatal,
            recognized: Arc::clone(&self.recognized),
        })
    }
}

impl OcrClient for FakeOcrClient {
    fn recognize(&mut self, image: &PageImage) -> Result<String, IngestError> {
        if self.fatal {
            return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "ocr binary missing").into());
        }
        if self.fail_all || self.fail_on == Some(image.page) {
            return Err(IngestError::OcrFailed(format!("unreadable page {}", image.page)));
        }
        self.recognized.fetch_add(1, Ordering::SeqCst);
        String::from_utf8(image.bytes.clone())
            .map_err(|error| IngestError::OcrFailed(error.to_string()))
    }
}

/// Embeds `page N ...` as `[N, N + 0.5, N + 0.5, N + 0.5]`.
#[derive(Debug, Default)]
pub struct FakeEmbedder {
    pub fail_on: Option<usize>,
    pub empty_on: Option<usize>,
    pub jitter: bool,
    pub calls: Arc<AtomicUsize>,
}

pub struct FakeEmbeddingClient {
    fail_on: Option<usize>,
    empty_on: Option<usize>,
    jitter: bool,
    calls: Arc<AtomicUsize>,
}

impl EmbeddingProvider for FakeEmbedder {
    type Client = FakeEmbeddingClient;

    fn model_id(&self) -> String {
        "fake-tagger".to_string()
    }

    fn create_client(&self) -> Result<Self::Client, IngestError> {
        Ok(FakeEmbeddingClient {
            fail_on: self.fail_on,
            empty_on: self.empty_on,
            jitter: self.jitter,
            calls: Arc::clone(&self.calls),
        })
    }
}

impl EmbeddingClient for FakeEmbeddingClient {
    fn embed(&mut self, text: &str) -> Result<Vec<f32>, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let page = text
            .split_whitespace()
            .nth(1)
            .and_then(|token| token.parse::<usize>().ok())
            .ok_or_else(|| IngestError::EmbeddingFailed(format!("untagged text: {text}")))?;

        if self.jitter {
            // scramble completion order
            thread::sleep(Duration::from_micros(((page * 7_919) % 13) as u64 * 90));
        }
        if self.fail_on == Some(page) {
            return Err(IngestError::EmbeddingFailed("synthetic failure".to_string()));
        }
        if self.empty_on == Some(page) {
            return Ok(Vec::new());
        }

        let tag = page as f32;
        let mut row = vec![tag + 0.5; TAG_DIMENSIONS];
        row[0] = tag;
        Ok(row)
    }
}

/// Hands out clones of a prepared document and counts how often it opened.
#[derive(Debug, Default)]
pub struct FakeLoader {
    pub document: FakeDocument,
    pub opened: AtomicUsize,
}

impl DocumentLoader for FakeLoader {
    type Document = FakeDocument;

    fn open(&self, _path: &Path) -> Result<Self::Document, IngestError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.document.clone())
    }
}
