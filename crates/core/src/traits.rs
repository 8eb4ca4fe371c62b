use crate::models::PageImage;
use crate::IngestError;
use std::path::Path;

/// A paginated source document. Shared by reference across sampling workers.
pub trait PageSource: Sync {
    fn page_count(&self) -> usize;

    fn render_page(&self, index: usize) -> Result<PageImage, IngestError>;

    fn extract_text(&self, index: usize) -> Result<String, IngestError>;
}

/// Opens a [`PageSource`] for a file on disk.
pub trait DocumentLoader {
    type Document: PageSource;

    fn open(&self, path: &Path) -> Result<Self::Document, IngestError>;
}

/// Factory for per-worker OCR clients.
pub trait OcrEngine: Sync {
    type Client: OcrClient;

    fn create_client(&self) -> Result<Self::Client, IngestError>;
}

pub trait OcrClient {
    fn recognize(&mut self, image: &PageImage) -> Result<String, IngestError>;
}

/// Factory for per-worker embedding clients.
pub trait EmbeddingProvider: Sync {
    type Client: EmbeddingClient;

    /// Stable identifier recorded in the index manifest.
    fn model_id(&self) -> String;

    fn create_client(&self) -> Result<Self::Client, IngestError>;
}

pub trait EmbeddingClient {
    fn embed(&mut self, text: &str) -> Result<Vec<f32>, IngestError>;
}
