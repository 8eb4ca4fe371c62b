use crate::error::{IngestError, PageStage};
use crate::models::{ExtractionMode, PageInput};
use crate::store::EmbeddingMatrix;
use crate::traits::{EmbeddingClient, EmbeddingProvider, OcrClient, OcrEngine, PageSource};
use crate::workers::run_pool;
use std::borrow::Cow;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Embeds every page of a document on a bounded set of worker threads.
pub struct PageWorkerPool<'a, O, E> {
    ocr: &'a O,
    embedder: &'a E,
    workers: usize,
}

struct WorkerClients<C, M> {
    ocr: Option<C>,
    embedding: M,
}

impl<'a, O, E> PageWorkerPool<'a, O, E>
where
    O: OcrEngine,
    E: EmbeddingProvider,
{
    pub fn new(ocr: &'a O, embedder: &'a E, workers: usize) -> Self {
        Self {
            ocr,
            embedder,
            workers: workers.max(1),
        }
    }

    pub fn process_all_pages<D: PageSource>(
        &self,
        document: &D,
        mode: ExtractionMode,
    ) -> Result<EmbeddingMatrix, IngestError> {
        let inputs = prepare_inputs(document, mode)?;
        self.embed_inputs(&inputs, mode)
    }

    /// Embeds already prepared page inputs. Row `i` of the result always
    /// belongs to `inputs[i]`.
    pub fn embed_inputs(
        &self,
        inputs: &[PageInput],
        mode: ExtractionMode,
    ) -> Result<EmbeddingMatrix, IngestError> {
        if inputs.is_empty() {
            return Err(IngestError::InvalidArgument(
                "document has no pages to embed".to_string(),
            ));
        }

        let pages = (0..inputs.len()).collect::<Vec<_>>();
        let slots = (0..inputs.len())
            .map(|_| OnceLock::new())
            .collect::<Vec<OnceLock<Vec<f32>>>>();

        info!(pages = inputs.len(), workers = self.workers, %mode, "embedding pages");
        let statuses = run_pool(
            &pages,
            self.workers,
            |_| {
                let ocr = match mode {
                    ExtractionMode::Ocr => Some(self.ocr.create_client()?),
                    ExtractionMode::NativeText => None,
                };
                Ok(WorkerClients {
                    ocr,
                    embedding: self.embedder.create_client()?,
                })
            },
            |clients, page| {
                let row = embed_page(clients, &inputs[page], page)?;
                slots[page].set(row).map_err(|_| {
                    IngestError::Incomplete(format!("page {page} was embedded twice"))
                })
            },
        );

        for status in statuses {
            status?;
        }

        let rows = slots
            .into_iter()
            .enumerate()
            .map(|(page, slot)| match slot.into_inner() {
                Some(row) if !row.is_empty() => Ok(row),
                Some(_) => Err(IngestError::Incomplete(format!(
                    "page {page} produced an empty embedding"
                ))),
                None => Err(IngestError::Incomplete(format!(
                    "page {page} produced no embedding"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EmbeddingMatrix::from_rows(rows)?)
    }
}

/// Renders or extracts every page up front, one payload per page.
pub fn prepare_inputs<D: PageSource>(
    document: &D,
    mode: ExtractionMode,
) -> Result<Vec<PageInput>, IngestError> {
    let pages = document.page_count();
    debug!(pages, %mode, "preparing page inputs");

    (0..pages)
        .map(|page| match mode {
            ExtractionMode::Ocr => document
                .render_page(page)
                .map(PageInput::Image)
                .map_err(|error| error.at_page(page, PageStage::Render)),
            ExtractionMode::NativeText => document
                .extract_text(page)
                .map(PageInput::Text)
                .map_err(|error| error.at_page(page, PageStage::Extraction)),
        })
        .collect()
}

fn embed_page<C, M>(
    clients: &mut WorkerClients<C, M>,
    input: &PageInput,
    page: usize,
) -> Result<Vec<f32>, IngestError>
where
    C: OcrClient,
    M: EmbeddingClient,
{
    let text = match input {
        PageInput::Text(text) => Cow::Borrowed(text.as_str()),
        PageInput::Image(image) => {
            let client = clients.ocr.as_mut().ok_or_else(|| {
                IngestError::InvalidArgument("page image given to a native-text worker".to_string())
                    .at_page(page, PageStage::Ocr)
            })?;
            Cow::Owned(
                client
                    .recognize(image)
                    .map_err(|error| error.at_page(page, PageStage::Ocr))?,
            )
        }
    };

    let row = clients
        .embedding
        .embed(&text)
        .map_err(|error| error.at_page(page, PageStage::Embedding))?;
    if row.is_empty() {
        return Err(IngestError::EmbeddingFailed("empty vector returned".to_string())
            .at_page(page, PageStage::Embedding));
    }

    debug!(page, dimensions = row.len(), "page embedded");
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDocument, FakeEmbedder, FakeOcr, TAG_DIMENSIONS};
    use proptest::prelude::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn rows_follow_page_order_in_native_mode() {
        let document = FakeDocument::tagged(25);
        let embedder = FakeEmbedder::default();
        let ocr = FakeOcr::default();
        let pool = PageWorkerPool::new(&ocr, &embedder, 6);

        let matrix = pool
            .process_all_pages(&document, ExtractionMode::NativeText)
            .unwrap();

        assert_eq!(matrix.rows(), 25);
        assert_eq!(matrix.cols(), TAG_DIMENSIONS);
        for page in 0..25 {
            assert_eq!(matrix.row(page)[0], page as f32);
        }
    }

    #[test]
    fn ocr_mode_recognizes_rendered_pages() {
        let document = FakeDocument::tagged(12);
        let embedder = FakeEmbedder::default();
        let ocr = FakeOcr::default();
        let pool = PageWorkerPool::new(&ocr, &embedder, 4);

        let matrix = pool.process_all_pages(&document, ExtractionMode::Ocr).unwrap();

        assert_eq!(matrix.rows(), 12);
        for page in 0..12 {
            assert_eq!(matrix.row(page)[0], page as f32);
        }
        assert_eq!(ocr.recognized.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn failing_page_aborts_the_batch() {
        let document = FakeDocument::tagged(10);
        let embedder = FakeEmbedder {
            fail_on: Some(3),
            ..FakeEmbedder::default()
        };
        let ocr = FakeOcr::default();
        let pool = PageWorkerPool::new(&ocr, &embedder, 4);

        let error = pool
            .process_all_pages(&document, ExtractionMode::NativeText)
            .unwrap_err();

        assert_eq!(error.page(), Some(3));
        assert!(error.to_string().contains("page 3"));
    }

    #[test]
    fn first_failure_stops_remaining_pages() {
        // hardening: a fatal page must not leave the rest of the batch running
        let document = FakeDocument::tagged(10);
        let embedder = FakeEmbedder {
            fail_on: Some(0),
            ..FakeEmbedder::default()
        };
        let ocr = FakeOcr::default();
        let pool = PageWorkerPool::new(&ocr, &embedder, 1);

        assert!(pool
            .process_all_pages(&document, ExtractionMode::NativeText)
            .is_err());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn extraction_failure_is_reported_before_workers_start() {
        let mut document = FakeDocument::tagged(5);
        document.fail_extraction = true;
        let embedder = FakeEmbedder::default();
        let ocr = FakeOcr::default();
        let pool = PageWorkerPool::new(&ocr, &embedder, 2);

        let error = pool
            .process_all_pages(&document, ExtractionMode::NativeText)
            .unwrap_err();
        assert!(matches!(
            error,
            IngestError::Page {
                page: 0,
                stage: PageStage::Extraction,
                ..
            }
        ));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ocr_failure_carries_page_index() {
        let document = FakeDocument::tagged(6);
        let embedder = FakeEmbedder::default();
        let ocr = FakeOcr {
            fail_on: Some(4),
            ..FakeOcr::default()
        };
        let pool = PageWorkerPool::new(&ocr, &embedder, 3);

        let error = pool.process_all_pages(&document, ExtractionMode::Ocr).unwrap_err();
        assert!(matches!(
            error,
            IngestError::Page {
                page: 4,
                stage: PageStage::Ocr,
                ..
            }
        ));
    }

    #[test]
    fn empty_embedding_is_not_a_success() {
        let document = FakeDocument::tagged(3);
        let embedder = FakeEmbedder {
            empty_on: Some(2),
            ..FakeEmbedder::default()
        };
        let ocr = FakeOcr::default();
        let pool = PageWorkerPool::new(&ocr, &embedder, 2);

        let error = pool
            .process_all_pages(&document, ExtractionMode::NativeText)
            .unwrap_err();
        assert_eq!(error.page(), Some(2));
    }

    #[test]
    fn empty_document_is_rejected() {
        let document = FakeDocument::tagged(0);
        let embedder = FakeEmbedder::default();
        let ocr = FakeOcr::default();
        let pool = PageWorkerPool::new(&ocr, &embedder, 2);
        assert!(matches!(
            pool.process_all_pages(&document, ExtractionMode::NativeText),
            Err(IngestError::InvalidArgument(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn concurrent_writers_never_lose_rows(pages in 1usize..64, workers in 1usize..12) {
            let document = FakeDocument::tagged(pages);
            let embedder = FakeEmbedder { jitter: true, ..FakeEmbedder::default() };
            let ocr = FakeOcr::default();
            let pool = PageWorkerPool::new(&ocr, &embedder, workers);

            let matrix = pool.process_all_pages(&document, ExtractionMode::NativeText).unwrap();

            prop_assert_eq!(matrix.rows(), pages);
            for page in 0..pages {
                let row = matrix.row(page);
                prop_assert_eq!(row.len(), TAG_DIMENSIONS);
                prop_assert_eq!(row[0], page as f32);
                prop_assert!(row[1..].iter().all(|value| *value == page as f32 + 0.5));
            }
        }
    }
}
