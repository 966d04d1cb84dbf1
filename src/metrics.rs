//! Training progress metrics and tokenizer evaluation figures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tokenizer::Tokenizer;

/// Reason a training run terminated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// The merge budget derived from the target vocabulary size was exhausted.
    TargetVocabReached,
    /// The configured maximum merge iterations was reached.
    MaxIterationsReached,
    /// No candidate pair reached the minimum frequency.
    NoEligiblePairs,
    /// The cancellation flag was raised.
    Cancelled,
}

/// Metrics captured for each merge iteration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationMetrics {
    /// Sequential iteration number (1-indexed).
    pub iteration: usize,
    /// Aggregate frequency of the merged pair.
    pub best_frequency: usize,
    /// Frequency-weighted number of replacements made across the corpus.
    pub merges_applied: usize,
    /// Count of distinct pairs remaining after the iteration.
    pub distinct_pairs: usize,
    /// Execution time for the iteration.
    pub elapsed_iteration: Duration,
    /// Total time elapsed since training started.
    pub elapsed_total: Duration,
    /// Resident set size sample captured from `/proc/self/status` on Linux.
    pub rss_kb: Option<usize>,
}

/// Aggregate metrics produced by a training session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingMetrics {
    /// Number of distinct units in the word frequency table.
    pub distinct_units: usize,
    /// Size of the base alphabet (distinct symbols plus the end-of-unit marker).
    pub base_vocab_size: usize,
    /// Per-iteration snapshots accrued during training.
    pub iterations: Vec<IterationMetrics>,
    /// Total duration of the training session.
    pub total_duration: Duration,
    /// Reason training terminated.
    pub stop_reason: StopReason,
}

impl TrainingMetrics {
    /// Creates an empty metrics container with pre-allocated capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            distinct_units: 0,
            base_vocab_size: 0,
            iterations: Vec::with_capacity(capacity),
            total_duration: Duration::ZERO,
            stop_reason: StopReason::TargetVocabReached,
        }
    }
}

#[cfg(target_os = "linux")]
fn current_rss_kb() -> Option<usize> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open("/proc/self/status").ok()?;
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let value = rest
                .split_whitespace()
                .find_map(|part| part.parse::<usize>().ok());
            return value;
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn current_rss_kb() -> Option<usize> {
    None
}

/// Samples the current resident set size (RSS) on supported platforms.
pub fn sample_rss_kb() -> Option<usize> {
    current_rss_kb()
}

/// Compression ratio over `texts`: total UTF-8 bytes divided by total emitted token ids.
///
/// Returns `0.0` when no ids are emitted, including for an empty slice.
pub fn compression_ratio<S: AsRef<str>>(tokenizer: &Tokenizer, texts: &[S]) -> f64 {
    let (bytes, tokens) = totals(tokenizer, texts);
    ratio(bytes, tokens)
}

fn totals<S: AsRef<str>>(tokenizer: &Tokenizer, texts: &[S]) -> (usize, usize) {
    texts.iter().fold((0, 0), |(bytes, tokens), text| {
        let text = text.as_ref();
        (bytes + text.len(), tokens + tokenizer.encode(text).len())
    })
}

fn ratio(bytes: usize, tokens: usize) -> f64 {
    if tokens == 0 {
        0.0
    } else {
        bytes as f64 / tokens as f64
    }
}

/// Evaluation figures an external driver compares against its acceptance thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationReport {
    /// Number of tokens in the vocabulary.
    pub vocab_size: usize,
    /// Number of learned merges.
    pub num_merges: usize,
    /// Vocabulary size requested at training time.
    pub target_vocab_size: usize,
    /// Bytes per emitted token over the evaluation texts.
    pub compression_ratio: f64,
    /// Number of evaluation texts.
    pub corpus_texts: usize,
    /// Total UTF-8 bytes in the evaluation texts.
    pub corpus_bytes: usize,
    /// Total token ids emitted for the evaluation texts.
    pub corpus_tokens: usize,
}

impl EvaluationReport {
    /// Encodes every text once and gathers the report.
    pub fn evaluate<S: AsRef<str>>(tokenizer: &Tokenizer, texts: &[S]) -> Self {
        let stats = tokenizer.model().stats();
        let (corpus_bytes, corpus_tokens) = totals(tokenizer, texts);
        Self {
            vocab_size: stats.vocab_size,
            num_merges: stats.num_merges,
            target_vocab_size: stats.target_vocab_size,
            compression_ratio: ratio(corpus_bytes, corpus_tokens),
            corpus_texts: texts.len(),
            corpus_bytes,
            corpus_tokens,
        }
    }
}

/// Thresholds a training driver checks a report against. The library never enforces them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AcceptanceCriteria {
    /// Exclusive ceiling on the vocabulary size.
    pub max_vocab_size: usize,
    /// Inclusive floor on the compression ratio.
    pub min_compression_ratio: f64,
}

impl Default for AcceptanceCriteria {
    fn default() -> Self {
        Self {
            max_vocab_size: 5000,
            min_compression_ratio: 3.2,
        }
    }
}

/// Result of checking a report against [`AcceptanceCriteria`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcceptanceOutcome {
    /// The vocabulary stayed below the ceiling.
    pub vocab_ok: bool,
    /// The compression ratio met the floor.
    pub compression_ok: bool,
}

impl AcceptanceOutcome {
    /// Returns `true` when every threshold was met.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.vocab_ok && self.compression_ok
    }
}

impl AcceptanceCriteria {
    /// Compares `report` against the thresholds.
    #[must_use]
    pub fn check(&self, report: &EvaluationReport) -> AcceptanceOutcome {
        AcceptanceOutcome {
            vocab_ok: report.vocab_size < self.max_vocab_size,
            compression_ok: report.compression_ratio >= self.min_compression_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(vocab_size: usize, compression_ratio: f64) -> EvaluationReport {
        EvaluationReport {
            vocab_size,
            num_merges: 0,
            target_vocab_size: vocab_size,
            compression_ratio,
            corpus_texts: 1,
            corpus_bytes: 0,
            corpus_tokens: 0,
        }
    }

    #[test]
    fn ratio_handles_zero_tokens() {
        assert_eq!(ratio(10, 0), 0.0);
        assert_eq!(ratio(12, 4), 3.0);
    }

    #[test]
    fn acceptance_uses_exclusive_vocab_ceiling() {
        let criteria = AcceptanceCriteria::default();
        assert!(criteria.check(&report(4999, 3.2)).passed());
        let outcome = criteria.check(&report(5000, 3.5));
        assert!(!outcome.vocab_ok);
        assert!(outcome.compression_ok);
        assert!(!criteria.check(&report(100, 3.19)).passed());
    }

    #[test]
    fn new_metrics_start_empty() {
        let metrics = TrainingMetrics::new(8);
        assert!(metrics.iterations.is_empty());
        assert_eq!(metrics.total_duration, Duration::ZERO);
    }
}
