use crate::ingest::{digest_file, discover_pdf_files, read_manifest, write_manifest, IndexLayout};
use crate::pool::PageWorkerPool;
use crate::quality::QualityScorer;
use crate::selector::ModeSelector;
use crate::store::{EmbeddingMatrix, EmbeddingStore};
use crate::traits::{DocumentLoader, EmbeddingProvider, OcrEngine, PageSource};
use crate::{ExtractionMode, IndexManifest, IngestError, ModeDecision, PipelineOptions};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Loaded,
    Built,
}

#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub layout: IndexLayout,
    pub origin: IndexOrigin,
    /// `None` when an index was loaded without a manifest next to it.
    pub mode: Option<ExtractionMode>,
    pub matrix: EmbeddingMatrix,
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub indexed: Vec<IndexedDocument>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Opens or builds the page-embedding index of PDFs.
pub struct DocumentIndexer<L, O, E> {
    loader: L,
    ocr: O,
    embedder: E,
    scorer: QualityScorer,
    options: PipelineOptions,
}

impl<L, O, E> DocumentIndexer<L, O, E>
where
    L: DocumentLoader,
    O: OcrEngine,
    E: EmbeddingProvider,
{
    pub fn new(loader: L, ocr: O, embedder: E, options: PipelineOptions) -> Result<Self, IngestError> {
        Ok(Self {
            loader,
            ocr,
            embedder,
            scorer: QualityScorer::new()?,
            options,
        })
    }

    pub fn with_scorer(mut self, scorer: QualityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Loads the existing index of `pdf_path`, or builds and saves it. An
    /// index whose manifest no longer matches the PDF checksum or the
    /// embedding model is rebuilt.
    pub fn index_pdf(&self, pdf_path: &Path) -> Result<IndexedDocument, IngestError> {
        check_file(pdf_path)?;
        let layout = IndexLayout::for_pdf(pdf_path);
        layout.ensure_directory()?;
        let checksum = digest_file(pdf_path)?;

        if layout.data_file.exists() {
            let manifest = read_manifest(&layout.manifest_file)?;
            let model_id = self.embedder.model_id();
            let pdf_changed = manifest
                .as_ref()
                .is_some_and(|manifest| manifest.checksum != checksum);
            let model_changed = manifest
                .as_ref()
                .is_some_and(|manifest| manifest.embedding_model != model_id);

            if pdf_changed || model_changed {
                warn!(
                    path = %pdf_path.display(),
                    pdf_changed,
                    model_changed,
                    model = %model_id,
                    "index is stale, rebuilding"
                );
            } else {
                let matrix = EmbeddingStore::load(&layout.data_file)?;
                info!(
                    path = %pdf_path.display(),
                    pages = matrix.rows(),
                    dimensions = matrix.cols(),
                    "embeddings loaded"
                );
                return Ok(IndexedDocument {
                    layout,
                    origin: IndexOrigin::Loaded,
                    mode: manifest.map(|manifest| manifest.mode),
                    matrix,
                });
            }
        }

        self.build(pdf_path, layout, checksum)
    }

    /// Ignores any existing index and builds a fresh one.
    pub fn rebuild_pdf(&self, pdf_path: &Path) -> Result<IndexedDocument, IngestError> {
        check_file(pdf_path)?;
        let layout = IndexLayout::for_pdf(pdf_path);
        layout.ensure_directory()?;
        let checksum = digest_file(pdf_path)?;
        self.build(pdf_path, layout, checksum)
    }

    /// Runs only the sampling pass.
    pub fn select_mode(&self, pdf_path: &Path) -> Result<ModeDecision, IngestError> {
        check_file(pdf_path)?;
        let document = self.loader.open(pdf_path)?;
        ModeSelector::new(&self.ocr, &self.scorer, &self.options).select_mode(&document)
    }

    /// Indexes every PDF under `folder`. With `rebuild` set, existing indexes
    /// are ignored and every PDF is built again.
    pub fn index_folder_best_effort(
        &self,
        folder: &Path,
        rebuild: bool,
    ) -> Result<IngestionReport, IngestError> {
        let files = discover_pdf_files(folder);

        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }

        let mut indexed = Vec::new();
        let mut skipped_files = Vec::new();
        for path in files {
            let outcome = if rebuild {
                self.rebuild_pdf(&path)
            } else {
                self.index_pdf(&path)
            };
            match outcome {
                Ok(document) => indexed.push(document),
                Err(error) => skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                }),
            }
        }

        Ok(IngestionReport {
            indexed,
            skipped_files,
        })
    }

    fn build(
        &self,
        pdf_path: &Path,
        layout: IndexLayout,
        checksum: String,
    ) -> Result<IndexedDocument, IngestError> {
        let document = self.loader.open(pdf_path)?;
        info!(path = %pdf_path.display(), pages = document.page_count(), "building embeddings");

        let decision =
            ModeSelector::new(&self.ocr, &self.scorer, &self.options).select_mode(&document)?;
        let mode = decision.mode();

        let matrix = PageWorkerPool::new(&self.ocr, &self.embedder, self.options.workers)
            .process_all_pages(&document, mode)?;
        drop(document);

        EmbeddingStore::save(&matrix, &layout.data_file)?;
        let manifest = IndexManifest {
            source_path: pdf_path.to_string_lossy().to_string(),
            checksum,
            mode,
            pages: matrix.rows(),
            dimensions: matrix.cols(),
            embedding_model: self.embedder.model_id(),
            created_at: Utc::now(),
        };
        write_manifest(&layout.manifest_file, &manifest)?;

        info!(
            path = %pdf_path.display(),
            %mode,
            pages = matrix.rows(),
            dimensions = matrix.cols(),
            "embeddings saved"
        );
        Ok(IndexedDocument {
            layout,
            origin: IndexOrigin::Built,
            mode: Some(mode),
            matrix,
        })
    }
}

fn check_file(path: &Path) -> Result<(), IngestError> {
    if path.as_os_str().is_empty() {
        return Err(IngestError::InvalidArgument("pdf path is empty".to_string()));
    }
    if !path.is_file() {
        return Err(IngestError::InvalidArgument(format!(
            "file does not exist: {}",
            path.display()
        )));
    }
    Ok(())
}
