use std::fmt;
use thiserror::Error;

/// Where in the per-page pipeline a collaborator failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStage {
    Render,
    Ocr,
    Extraction,
    Embedding,
}

impl fmt::Display for PageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PageStage::Render => "render",
            PageStage::Ocr => "ocr",
            PageStage::Extraction => "text extraction",
            PageStage::Embedding => "embedding",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("page render failed: {0}")]
    RenderFailed(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("embedding request failed: {0}")]
    EmbeddingFailed(String),

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("{stage} failed on page {page}: {source}")]
    Page {
        page: usize,
        stage: PageStage,
        #[source]
        source: Box<IngestError>,
    },

    #[error("incomplete run: {0}")]
    Incomplete(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Attaches the page index and pipeline stage to a collaborator error.
    pub fn at_page(self, page: usize, stage: PageStage) -> Self {
        IngestError::Page {
            page,
            stage,
            source: Box::new(self),
        }
    }

    pub fn page(&self) -> Option<usize> {
        match self {
            IngestError::Page { page, .. } => Some(*page),
            _ => None,
        }
    }

    /// Hard I/O or transport failures. These abort mode sampling instead of
    /// counting as evidence against one extraction path.
    pub fn is_fatal(&self) -> bool {
        match self {
            IngestError::Io(_) | IngestError::Http(_) => true,
            IngestError::Page { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store path is empty")]
    InvalidPath,

    #[error("embedding matrix is empty")]
    EmptyMatrix,

    #[error("row {row} has {found} columns, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("matrix shape {rows}x{cols} does not fit the i32 header")]
    TooLarge { rows: usize, cols: usize },

    #[error("corrupt store: {0}")]
    CorruptStore(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
