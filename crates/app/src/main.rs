use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use pdf_embed_core::ingest::read_manifest;
use pdf_embed_core::{
    resolve_api_key, CharacterNgramEmbedder, DocumentIndexer, EmbeddingBackend, EmbeddingStore,
    HttpOcrEngine, IndexOrigin, IndexedDocument, OcrBackend, OpenAiEmbeddings, PdfLoader,
    PipelineOptions, PopplerRenderer, TesseractEngine, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL, OPENAI_KEY_VAR,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-embed", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args)]
struct PipelineArgs {
    /// OpenAI API key; falls back to the environment, then a dotenv file.
    #[arg(long, global = true)]
    openai_key: Option<String>,

    /// Dotenv file consulted for the API key.
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    /// Embedding model name.
    #[arg(long, global = true, default_value = DEFAULT_OPENAI_MODEL)]
    model: String,

    /// OpenAI-compatible base URL.
    #[arg(long, global = true, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    base_url: String,

    /// Requested embedding dimensions.
    #[arg(long, global = true)]
    dimensions: Option<usize>,

    /// Embed locally with hashed character trigrams instead of calling the API.
    #[arg(long, global = true, default_value_t = false)]
    offline: bool,

    /// HTTP timeout in seconds for embedding and OCR requests.
    #[arg(long, global = true, default_value = "60")]
    timeout_secs: u64,

    /// Multimodal OCR endpoint; tesseract is used when neither this nor
    /// LLM_OCR_ENDPOINT is set.
    #[arg(long, global = true)]
    ocr_endpoint: Option<String>,

    /// Bearer token for the OCR endpoint.
    #[arg(long, global = true)]
    ocr_api_key: Option<String>,

    #[arg(long, global = true, default_value = "tesseract")]
    tesseract_bin: PathBuf,

    /// Tesseract language code.
    #[arg(long, global = true, default_value = "eng")]
    ocr_language: String,

    #[arg(long, global = true, default_value = "pdftoppm")]
    pdftoppm_bin: PathBuf,

    /// Render resolution for OCR page images.
    #[arg(long, global = true, default_value = "300")]
    dpi: u32,

    /// Worker threads; defaults to the number of CPUs.
    #[arg(long, global = true, env = "PDF_EMBED_WORKERS")]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Load or build the page-embedding index of one or more PDFs.
    Index {
        /// PDF file; repeat for several.
        #[arg(long, required_unless_present = "folder")]
        pdf: Vec<PathBuf>,
        /// Folder searched recursively for PDFs.
        #[arg(long, conflicts_with = "pdf")]
        folder: Option<PathBuf>,
        /// Rebuild even when an index exists.
        #[arg(long, default_value_t = false)]
        rebuild: bool,
    },
    /// Sample a PDF and report whether OCR or native text extraction wins.
    SelectMode {
        #[arg(long)]
        pdf: PathBuf,
    },
    /// Print the shape and manifest of a saved index.
    Inspect {
        /// Path to an index.dat file.
        #[arg(long)]
        index: PathBuf,
    },
}

type Indexer = DocumentIndexer<PdfLoader, OcrBackend, EmbeddingBackend>;

impl PipelineArgs {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    fn ocr_backend(&self) -> OcrBackend {
        let http = match &self.ocr_endpoint {
            Some(endpoint) => Some(HttpOcrEngine {
                endpoint: endpoint.clone(),
                api_key: self.ocr_api_key.clone(),
                timeout: self.timeout(),
            }),
            None => HttpOcrEngine::from_env(self.timeout()),
        };

        match http {
            Some(engine) => {
                info!(endpoint = %engine.endpoint, "using multimodal OCR");
                OcrBackend::Http(engine)
            }
            None => OcrBackend::Tesseract(TesseractEngine {
                binary: self.tesseract_bin.clone(),
                language: self.ocr_language.clone(),
            }),
        }
    }

    fn embedding_backend(&self) -> anyhow::Result<EmbeddingBackend> {
        if self.offline {
            return Ok(EmbeddingBackend::CharacterNgram(CharacterNgramEmbedder {
                dimensions: self.dimensions.unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS),
            }));
        }

        let api_key = resolve_api_key(
            self.openai_key.as_deref(),
            OPENAI_KEY_VAR,
            self.dotenv.as_deref(),
        )?;
        Ok(EmbeddingBackend::OpenAi(OpenAiEmbeddings {
            api_key,
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            dimensions: self.dimensions,
            timeout: self.timeout(),
        }))
    }

    fn indexer(&self, embedder: EmbeddingBackend) -> anyhow::Result<Indexer> {
        let loader = PdfLoader {
            renderer: PopplerRenderer {
                binary: self.pdftoppm_bin.clone(),
                dpi: self.dpi,
                ..PopplerRenderer::default()
            },
        };
        let mut options = PipelineOptions::default();
        if let Some(workers) = self.workers {
            options.workers = workers.max(1);
        }
        Ok(DocumentIndexer::new(loader, self.ocr_backend(), embedder, options)?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-embed boot"
    );

    // the pipeline blocks on subprocesses, HTTP and worker threads
    tokio::task::spawn_blocking(move || run(cli)).await?
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Index {
            pdf,
            folder,
            rebuild,
        } => {
            let embedder = cli.pipeline.embedding_backend()?;
            let indexer = cli.pipeline.indexer(embedder)?;

            if let Some(folder) = folder {
                let report = indexer.index_folder_best_effort(&folder, rebuild)?;
                if !report.skipped_files.is_empty() {
                    warn!(
                        "skipped_files={} for folder={}",
                        report.skipped_files.len(),
                        folder.display()
                    );
                    for skipped in &report.skipped_files {
                        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                    }
                }
                for document in &report.indexed {
                    print_indexed(document);
                }
                println!(
                    "{} of {} pdf(s) indexed at {}",
                    report.indexed.len(),
                    report.indexed.len() + report.skipped_files.len(),
                    Utc::now().to_rfc3339()
                );
            } else {
                for path in &pdf {
                    let document = if rebuild {
                        indexer.rebuild_pdf(path)?
                    } else {
                        indexer.index_pdf(path)?
                    };
                    print_indexed(&document);
                }
            }
        }
        Command::SelectMode { pdf } => {
            // sampling never embeds, so no credential is needed
            let indexer = cli
                .pipeline
                .indexer(EmbeddingBackend::CharacterNgram(CharacterNgramEmbedder::default()))?;
            let decision = indexer.select_mode(&pdf)?;
            println!(
                "mode={} samples={} ocr_better={} doc_better={}",
                decision.mode(),
                decision.samples,
                decision.ocr_better,
                decision.doc_better
            );
        }
        Command::Inspect { index } => inspect(&index)?,
    }

    Ok(())
}

fn print_indexed(document: &IndexedDocument) {
    let origin = match document.origin {
        IndexOrigin::Loaded => "loaded",
        IndexOrigin::Built => "built",
    };
    let mode = document
        .mode
        .map(|mode| mode.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "{origin} {} pages={} dimensions={} mode={mode}",
        document.layout.data_file.display(),
        document.matrix.rows(),
        document.matrix.cols()
    );
}

fn inspect(index: &Path) -> anyhow::Result<()> {
    let matrix = EmbeddingStore::load(index)?;
    println!(
        "index={} rows={} cols={}",
        index.display(),
        matrix.rows(),
        matrix.cols()
    );

    let manifest_path = index.with_extension("json");
    match read_manifest(&manifest_path)? {
        Some(manifest) => {
            println!("source={}", manifest.source_path);
            println!("mode={}", manifest.mode);
            println!("embedding_model={}", manifest.embedding_model);
            println!("checksum={}", manifest.checksum);
            println!("created_at={}", manifest.created_at.to_rfc3339());
            if manifest.pages != matrix.rows() || manifest.dimensions != matrix.cols() {
                warn!(
                    manifest_pages = manifest.pages,
                    manifest_dimensions = manifest.dimensions,
                    "manifest does not match the stored matrix"
                );
            }
        }
        None => println!("mode=unknown (no manifest)"),
    }

    Ok(())
}
