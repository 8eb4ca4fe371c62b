use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How page text is obtained for a document. Decided once, then fixed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    NativeText,
    Ocr,
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMode::NativeText => f.write_str("native_text"),
            ExtractionMode::Ocr => f.write_str("ocr"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

/// An encoded raster of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub page: usize,
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

/// Per-page payload prepared before the worker pool starts.
#[derive(Debug, Clone)]
pub enum PageInput {
    Image(PageImage),
    Text(String),
}

/// Outcome of the sampling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeDecision {
    pub samples: usize,
    pub ocr_better: usize,
    pub doc_better: usize,
}

impl ModeDecision {
    pub fn from_counts(ocr_better: usize, doc_better: usize) -> Self {
        Self {
            samples: ocr_better + doc_better,
            ocr_better,
            doc_better,
        }
    }

    /// OCR has to win by at least two samples.
    pub fn use_ocr(&self) -> bool {
        self.ocr_better > self.doc_better + 1
    }

    pub fn mode(&self) -> ExtractionMode {
        if self.use_ocr() {
            ExtractionMode::Ocr
        } else {
            ExtractionMode::NativeText
        }
    }
}

/// Sidecar written next to `index.dat`. The binary matrix format carries no
/// metadata, so the extraction mode and provenance live here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub source_path: String,
    pub checksum: String,
    pub mode: ExtractionMode,
    pub pages: usize,
    pub dimensions: usize,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Worker threads for both the sampling and the processing pool.
    pub workers: usize,
    /// Share of pages sampled for the mode decision, in percent (rounded up).
    pub sample_percent: usize,
    pub sample_max: usize,
    /// Multiplier applied to the score of the longer text in a sample.
    pub length_bias: f32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: crate::workers::available_workers(),
            sample_percent: 10,
            sample_max: 16,
            length_bias: 1.2,
        }
    }
}

impl PipelineOptions {
    pub fn sample_size(&self, pages: usize) -> usize {
        (pages * self.sample_percent)
            .div_ceil(100)
            .min(self.sample_max)
    }
}
