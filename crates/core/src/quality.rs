//! Text well-formedness heuristic used to compare OCR output against native
//! PDF text extraction.

use crate::error::IngestError;
use regex::Regex;

const PATTERN_WEIGHT: f32 = 0.25;
const SPACING_WEIGHT: f32 = 0.25;
const DENSITY_WEIGHT: f32 = 0.4;

/// Noise checks. Every match lowers the pattern sub-score by one sixth.
/// Word and whitespace classes are ASCII-only.
const NOISE_PATTERNS: [&str; 6] = [
    r"[\x00-\x1F]",
    r"[\x{FFFD}\x{25A1}\x{2370}]",
    "\u{FFFD}",
    r"[\t\n\x0C\r ]{8,}",
    r"[^\x00-\x7F]+",
    r"[^0-9A-Za-z_\t\n\x0C\r ]",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScore {
    pub value: f32,
    pub valid: bool,
}

impl QualityScore {
    pub const INVALID: QualityScore = QualityScore {
        value: 0.0,
        valid: false,
    };
}

/// Decides which characters count towards the alphanumeric density term.
pub trait DensityMetric: Send + Sync {
    fn counts(&self, ch: char) -> bool;
}

/// Letters in the general-category sense. `char::is_alphabetic` also accepts
/// letter numbers such as `Ⅻ`, which are categorized as numbers.
fn is_letter(ch: char) -> bool {
    ch.is_alphabetic() && !ch.is_numeric()
}

/// Characters that are a letter *and* a number. The two categories are
/// disjoint, so this term is always zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct LetterAndDigit;

impl DensityMetric for LetterAndDigit {
    fn counts(&self, ch: char) -> bool {
        is_letter(ch) && ch.is_numeric()
    }
}

/// Characters that are alphabetic or numeric.
#[derive(Debug, Clone, Copy, Default)]
pub struct LetterOrDigit;

impl DensityMetric for LetterOrDigit {
    fn counts(&self, ch: char) -> bool {
        ch.is_alphabetic() || ch.is_numeric()
    }
}

pub struct QualityScorer {
    patterns: Vec<Regex>,
    metric: Box<dyn DensityMetric>,
}

impl QualityScorer {
    pub fn new() -> Result<Self, IngestError> {
        Self::with_metric(LetterAndDigit)
    }

    pub fn with_metric(metric: impl DensityMetric + 'static) -> Result<Self, IngestError> {
        let patterns = NOISE_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            metric: Box::new(metric),
        })
    }

    /// Scores raw bytes; anything that is not UTF-8 is invalid.
    pub fn score_bytes(&self, bytes: &[u8]) -> QualityScore {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.score(text),
            Err(_) => QualityScore::INVALID,
        }
    }

    pub fn score(&self, text: &str) -> QualityScore {
        if text.is_empty() {
            return QualityScore::INVALID;
        }

        let value = self.pattern_cleanliness(text) * PATTERN_WEIGHT
            + spacing_regularity(text) * SPACING_WEIGHT
            + self.density(text) * DENSITY_WEIGHT;

        QualityScore { value, valid: true }
    }

    fn pattern_cleanliness(&self, text: &str) -> f32 {
        let clean = self
            .patterns
            .iter()
            .filter(|pattern| !pattern.is_match(text))
            .count();
        clean as f32 / self.patterns.len() as f32
    }

    fn density(&self, text: &str) -> f32 {
        let mut total = 0usize;
        let mut counted = 0usize;
        for ch in text.chars() {
            total += 1;
            if self.metric.counts(ch) {
                counted += 1;
            }
        }

        if total == 0 {
            return 0.0;
        }
        counted as f32 / total as f32
    }
}

fn spacing_regularity(text: &str) -> f32 {
    let spaces = text.matches(' ').count();
    let words = text.split_whitespace().count();
    if spaces == 0 || words == 0 {
        return 0.0;
    }

    let gap = spaces.abs_diff(words) as f32;
    1.0 - gap / (spaces + words) as f32
}
