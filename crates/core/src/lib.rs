pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod ocr;
pub mod orchestrator;
pub mod pool;
pub mod quality;
pub mod selector;
pub mod store;
pub mod traits;
pub mod workers;

#[cfg(test)]
mod testing;

pub use config::{resolve_api_key, OPENAI_KEY_VAR};
pub use embeddings::{
    CharacterNgramEmbedder, EmbeddingBackend, OpenAiEmbeddings, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL,
};
pub use error::{IngestError, PageStage, StoreError};
pub use extractor::{PdfDocument, PdfLoader, PopplerRenderer};
pub use ingest::{digest_file, discover_pdf_files, IndexLayout};
pub use models::{
    ExtractionMode, ImageFormat, IndexManifest, ModeDecision, PageImage, PageInput,
    PipelineOptions,
};
pub use ocr::{HttpOcrEngine, OcrBackend, TesseractEngine};
pub use orchestrator::{DocumentIndexer, IndexOrigin, IndexedDocument, IngestionReport, SkippedPdf};
pub use pool::PageWorkerPool;
pub use quality::{DensityMetric, LetterAndDigit, LetterOrDigit, QualityScore, QualityScorer};
pub use selector::{ModeSelector, SampleVerdict};
pub use store::{EmbeddingMatrix, EmbeddingStore};
pub use traits::{
    DocumentLoader, EmbeddingClient, EmbeddingProvider, OcrClient, OcrEngine, PageSource,
};
pub use workers::available_workers;
