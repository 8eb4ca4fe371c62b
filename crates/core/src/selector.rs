use crate::error::{IngestError, PageStage};
use crate::models::{ModeDecision, PipelineOptions};
use crate::quality::QualityScorer;
use crate::traits::{OcrClient, OcrEngine, PageSource};
use crate::workers::run_pool;
use rand::Rng;
use tracing::{debug, info};

/// Which extraction path won a single sampled page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleVerdict {
    Ocr,
    NativeText,
}

/// Samples pages through both extraction paths and decides whether the
/// document should be processed with OCR.
pub struct ModeSelector<'a, O> {
    ocr: &'a O,
    scorer: &'a QualityScorer,
    options: &'a PipelineOptions,
}

impl<'a, O> ModeSelector<'a, O>
where
    O: OcrEngine,
{
    pub fn new(ocr: &'a O, scorer: &'a QualityScorer, options: &'a PipelineOptions) -> Self {
        Self {
            ocr,
            scorer,
            options,
        }
    }

    pub fn select_mode<D: PageSource>(&self, document: &D) -> Result<ModeDecision, IngestError> {
        self.select_mode_with_rng(document, &mut rand::thread_rng())
    }

    pub fn select_mode_with_rng<D, R>(
        &self,
        document: &D,
        rng: &mut R,
    ) -> Result<ModeDecision, IngestError>
    where
        D: PageSource,
        R: Rng,
    {
        let pages = document.page_count();
        if pages == 0 {
            return Err(IngestError::InvalidArgument(
                "document has no pages to sample".to_string(),
            ));
        }

        // drawn with replacement; duplicates are sampled twice
        let samples = (0..self.options.sample_size(pages))
            .map(|_| rng.gen_range(0..pages))
            .collect::<Vec<_>>();
        debug!(pages, ?samples, "sampling pages for mode selection");

        let statuses = run_pool(
            &samples,
            self.options.workers,
            |_| self.ocr.create_client(),
            |client, page| judge_sample(document, client, self.scorer, page, self.options.length_bias),
        );

        let mut ocr_better = 0usize;
        let mut doc_better = 0usize;
        for status in statuses {
            let (_, verdict) = status?;
            match verdict {
                SampleVerdict::Ocr => ocr_better += 1,
                SampleVerdict::NativeText => doc_better += 1,
            }
        }

        let decision = ModeDecision {
            samples: samples.len(),
            ocr_better,
            doc_better,
        };
        info!(
            ocr_better,
            doc_better,
            mode = %decision.mode(),
            "extraction mode selected"
        );
        Ok(decision)
    }
}

fn judge_sample<D, C>(
    document: &D,
    client: &mut C,
    scorer: &QualityScorer,
    page: usize,
    length_bias: f32,
) -> Result<SampleVerdict, IngestError>
where
    D: PageSource,
    C: OcrClient,
{
    let image = document
        .render_page(page)
        .map_err(|error| error.at_page(page, PageStage::Render))?;

    let ocr_text = match client.recognize(&image) {
        Ok(text) => text,
        Err(error) if error.is_fatal() => return Err(error.at_page(page, PageStage::Ocr)),
        Err(error) => {
            debug!(page, %error, "OCR failed on sample, counting for native text");
            return Ok(SampleVerdict::NativeText);
        }
    };

    let doc_text = match document.extract_text(page) {
        Ok(text) => text,
        Err(error) if error.is_fatal() => {
            return Err(error.at_page(page, PageStage::Extraction))
        }
        Err(error) => {
            debug!(page, %error, "text extraction failed on sample, counting for OCR");
            return Ok(SampleVerdict::Ocr);
        }
    };

    Ok(compare_texts(scorer, &ocr_text, &doc_text, length_bias))
}

/// Scores both texts and boosts the longer one, since one extractor often
/// truncates output.
pub fn compare_texts(
    scorer: &QualityScorer,
    ocr_text: &str,
    doc_text: &str,
    length_bias: f32,
) -> SampleVerdict {
    let ocr = scorer.score(ocr_text);
    if !ocr.valid {
        return SampleVerdict::NativeText;
    }
    let doc = scorer.score(doc_text);
    if !doc.valid {
        return SampleVerdict::Ocr;
    }

    let mut ocr_quality = ocr.value;
    let mut doc_quality = doc.value;
    if ocr_text.len() > doc_text.len() {
        ocr_quality *= length_bias;
    } else if doc_text.len() > ocr_text.len() {
        doc_quality *= length_bias;
    }

    if ocr_quality > doc_quality {
        SampleVerdict::Ocr
    } else {
        SampleVerdict::NativeText
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionMode;
    use crate::testing::{FakeDocument, FakeOcr};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const CLEAN: &str = "Hydraulic pumps deliver steady flow under constant pressure in every cycle";
    const GARBLED: &str = "Hydr@ul1c p#mps";

    fn options() -> PipelineOptions {
        PipelineOptions {
            workers: 4,
            ..PipelineOptions::default()
        }
    }

    #[test]
    fn longer_cleaner_ocr_selects_ocr() {
        let scorer = QualityScorer::new().unwrap();
        let options = options();
        let document = FakeDocument::uniform(40, GARBLED, CLEAN);
        let ocr = FakeOcr::default();
        let selector = ModeSelector::new(&ocr, &scorer, &options);

        let decision = selector
            .select_mode_with_rng(&document, &mut StdRng::seed_from_u64(7))
            .unwrap();

        assert_eq!(decision.samples, 4);
        assert_eq!(decision.ocr_better, 4);
        assert!(decision.use_ocr());
    }

    #[test]
    fn cleaner_native_text_keeps_native_mode() {
        let scorer = QualityScorer::new().unwrap();
        let options = options();
        let document = FakeDocument::uniform(40, CLEAN, GARBLED);
        let ocr = FakeOcr::default();
        let selector = ModeSelector::new(&ocr, &scorer, &options);

        let decision = selector
            .select_mode_with_rng(&document, &mut StdRng::seed_from_u64(7))
            .unwrap();

        assert_eq!(decision.doc_better, 4);
        assert!(!decision.use_ocr());
    }

    #[test]
    fn recoverable_ocr_failures_favor_native_text() {
        let scorer = QualityScorer::new().unwrap();
        let options = options();
        let document = FakeDocument::uniform(40, GARBLED, CLEAN);
        let ocr = FakeOcr {
            fail_all: true,
            ..FakeOcr::default()
        };
        let selector = ModeSelector::new(&ocr, &scorer, &options);

        let decision = selector
            .select_mode_with_rng(&document, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(decision.doc_better, decision.samples);
        assert!(!decision.use_ocr());
    }

    #[test]
    fn native_extraction_failures_favor_ocr() {
        let scorer = QualityScorer::new().unwrap();
        let options = options();
        let mut document = FakeDocument::uniform(40, CLEAN, CLEAN);
        document.fail_extraction = true;
        let ocr = FakeOcr::default();
        let selector = ModeSelector::new(&ocr, &scorer, &options);

        let decision = selector
            .select_mode_with_rng(&document, &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert_eq!(decision.ocr_better, 4);
        assert!(decision.use_ocr());
    }

    #[test]
    fn render_failure_aborts_selection() {
        let scorer = QualityScorer::new().unwrap();
        let options = options();
        let mut document = FakeDocument::uniform(40, CLEAN, CLEAN);
        document.fail_render = true;
        let ocr = FakeOcr::default();
        let selector = ModeSelector::new(&ocr, &scorer, &options);

        let error = selector
            .select_mode_with_rng(&document, &mut StdRng::seed_from_u64(3))
            .unwrap_err();
        assert!(matches!(
            error,
            IngestError::Page {
                stage: PageStage::Render,
                ..
            }
        ));
    }

    #[test]
    fn fatal_ocr_error_aborts_selection() {
        let scorer = QualityScorer::new().unwrap();
        let options = options();
        let document = FakeDocument::uniform(40, CLEAN, CLEAN);
        let ocr = FakeOcr {
            fatal: true,
            ..FakeOcr::default()
        };
        let selector = ModeSelector::new(&ocr, &scorer, &options);

        let error = selector
            .select_mode_with_rng(&document, &mut StdRng::seed_from_u64(3))
            .unwrap_err();
        assert!(error.is_fatal());
    }

    /// Even pages favor OCR, odd pages favor native text.
    fn alternating(pages: usize) -> FakeDocument {
        let (native, ocr) = (0..pages)
            .map(|page| {
                if page % 2 == 0 {
                    (GARBLED.to_string(), CLEAN.to_string())
                } else {
                    (CLEAN.to_string(), GARBLED.to_string())
                }
            })
            .unzip();
        FakeDocument {
            native,
            ocr,
            ..FakeDocument::default()
        }
    }

    #[test]
    fn tied_samples_keep_native_text() {
        let scorer = QualityScorer::new().unwrap();
        let options = options();
        let document = alternating(40);
        let ocr = FakeOcr::default();
        let selector = ModeSelector::new(&ocr, &scorer, &options);
        let samples = options.sample_size(document.page_count());

        // replay the draws to find a seed whose samples split evenly
        let seed = (0..1_000u64)
            .find(|seed| {
                let mut rng = StdRng::seed_from_u64(*seed);
                let even = (0..samples)
                    .filter(|_| rng.gen_range(0..document.page_count()) % 2 == 0)
                    .count();
                even * 2 == samples
            })
            .expect("some seed splits the samples evenly");

        let decision = selector
            .select_mode_with_rng(&document, &mut StdRng::seed_from_u64(seed))
            .unwrap();

        assert_eq!(decision.samples, 4);
        assert_eq!(decision.ocr_better, 2);
        assert_eq!(decision.doc_better, 2);
        assert!(!decision.use_ocr());
        assert_eq!(decision.mode(), ExtractionMode::NativeText);
    }

    #[test]
    fn empty_document_is_rejected() {
        let scorer = QualityScorer::new().unwrap();
        let options = options();
        let document = FakeDocument::uniform(0, CLEAN, CLEAN);
        let ocr = FakeOcr::default();
        let selector = ModeSelector::new(&ocr, &scorer, &options);
        assert!(matches!(
            selector.select_mode(&document),
            Err(IngestError::InvalidArgument(_))
        ));
    }

    #[test]
    fn invalid_or_tied_texts_default_to_native() {
        let scorer = QualityScorer::new().unwrap();
        assert_eq!(compare_texts(&scorer, "", "", 1.2), SampleVerdict::NativeText);
        assert_eq!(compare_texts(&scorer, "", CLEAN, 1.2), SampleVerdict::NativeText);
        assert_eq!(compare_texts(&scorer, CLEAN, "", 1.2), SampleVerdict::Ocr);
        assert_eq!(compare_texts(&scorer, CLEAN, CLEAN, 1.2), SampleVerdict::NativeText);
    }

    #[test]
    fn longer_text_gets_the_length_bias() {
        let scorer = QualityScorer::new().unwrap();
        let short = "alpha beta gamma";
        let long = "alpha beta gamma delta";
        assert_eq!(compare_texts(&scorer, long, short, 1.2), SampleVerdict::Ocr);
        assert_eq!(compare_texts(&scorer, short, long, 1.2), SampleVerdict::NativeText);
        assert_eq!(compare_texts(&scorer, long, short, 1.0), SampleVerdict::Ocr);
    }
}
