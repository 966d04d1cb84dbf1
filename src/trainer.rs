//! Core training loop learning a merge table from a text corpus.

use std::cmp::Ordering;
use std::collections::{hash_map::Entry, BTreeSet, BinaryHeap};
use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;
use std::time::Instant;
use std::{fmt, path::Path};

use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::bytes::ByteCodec;
use crate::config::{IngestConfig, TrainerBuilder, TrainerConfig};
use crate::corpus::load_text_corpus;
use crate::error::{BpeError, Result};
use crate::metrics::{sample_rss_kb, IterationMetrics, StopReason, TrainingMetrics};
use crate::model::{BpeModel, MergeTable};
use crate::segment::{unit_symbols, Segmenter, SegmentationMode, END_OF_UNIT};
use crate::vocab::{Pair, TokenId, Vocabulary};
use crate::word::Word;

/// High-level façade configuring and executing BPE training runs.
#[derive(Debug, Clone)]
pub struct Trainer {
    cfg: TrainerConfig,
    cancel: Option<Arc<AtomicBool>>,
}

/// Artifacts returned after a training session completes.
#[must_use]
#[derive(Debug, Clone)]
pub struct TrainerArtifacts {
    /// Trained BPE model.
    pub model: BpeModel,
    /// Detailed metrics captured during training.
    pub metrics: TrainingMetrics,
}

impl Trainer {
    /// Creates a new trainer for the supplied configuration.
    #[must_use]
    pub fn new(cfg: TrainerConfig) -> Self {
        Self { cfg, cancel: None }
    }

    /// Returns a [`TrainerBuilder`] with default settings.
    #[must_use]
    pub fn builder() -> TrainerBuilder {
        TrainerConfig::builder()
    }

    /// Attaches a flag that stops training before the next merge round once set.
    ///
    /// A cancelled run still returns the merges learned so far, with
    /// [`StopReason::Cancelled`] recorded in the metrics.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Returns an immutable reference to the underlying configuration.
    #[must_use]
    pub fn config(&self) -> &TrainerConfig {
        &self.cfg
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(atomic::Ordering::Relaxed))
    }

    /// Trains a model from line-oriented text files discovered according to [`IngestConfig`].
    pub fn train_from_paths<P: AsRef<Path>>(
        &self,
        inputs: &[P],
        ingest: &IngestConfig,
    ) -> Result<TrainerArtifacts> {
        let texts = load_text_corpus(inputs, ingest)?;
        self.train_from_texts(&texts)
    }

    /// Trains a model from in-memory texts.
    ///
    /// An empty corpus is not an error: it yields an empty vocabulary and no merges.
    pub fn train_from_texts<S>(&self, texts: &[S]) -> Result<TrainerArtifacts>
    where
        S: AsRef<str> + Sync,
    {
        self.cfg.validate()?;
        let training_start = Instant::now();
        let codec = ByteCodec::standard();

        let unit_counts = count_units(texts, &codec, self.cfg.segmentation);
        let mut vocab = base_vocabulary(&unit_counts)?;
        let base_size = vocab.len();
        let max_new_tokens = self.cfg.target_vocab_size.saturating_sub(base_size);
        if max_new_tokens == 0 && base_size > 0 {
            warn!(
                "target vocab {} leaves no room for merges over a base alphabet of {}",
                self.cfg.target_vocab_size, base_size
            );
        }

        let mut words = Vec::with_capacity(unit_counts.len());
        let mut counts = Vec::with_capacity(unit_counts.len());
        for (unit, count) in &unit_counts {
            let tokens = unit_symbols(unit)
                .map(|symbol| {
                    vocab.symbol_id(symbol).ok_or_else(|| {
                        BpeError::Internal(format!("symbol {symbol:?} missing from base vocabulary"))
                    })
                })
                .collect::<Result<Vec<TokenId>>>()?;
            words.push(Word::from_tokens(tokens));
            counts.push(*count);
        }

        let mut merges = MergeTable::new();
        let mut pair_counts = compute_pair_counts(&words, &counts);
        let mut heap = BinaryHeap::with_capacity(pair_counts.len().max(1));
        for (&pair, &count) in &pair_counts {
            if count >= self.cfg.min_frequency {
                heap.push(PairScore::new(pair, count));
            }
        }

        let mut metrics = TrainingMetrics::new(max_new_tokens.min(16_384));
        metrics.distinct_units = words.len();
        metrics.base_vocab_size = base_size;
        if self.cfg.show_progress {
            info!(
                "training on {} distinct units; base alphabet {}; merge budget {}",
                words.len(),
                base_size,
                max_new_tokens
            );
        }

        let mut iteration = 0usize;
        while merges.len() < max_new_tokens {
            if self.is_cancelled() {
                metrics.stop_reason = StopReason::Cancelled;
                break;
            }
            if let Some(max_iters) = self.cfg.max_merge_iterations {
                if iteration >= max_iters {
                    metrics.stop_reason = StopReason::MaxIterationsReached;
                    break;
                }
            }

            let iteration_start = Instant::now();
            let Some((best_pair, frequency)) =
                pop_best_pair(&mut heap, &pair_counts, self.cfg.min_frequency, &vocab)
            else {
                metrics.stop_reason = StopReason::NoEligiblePairs;
                break;
            };

            let (left, right) = token_pair(&vocab, best_pair)?;
            let new_token_id = vocab.get_or_insert(format!("{left}{right}"))?;

            let total_merges = apply_merge(
                &mut words,
                &counts,
                best_pair,
                new_token_id,
                &mut pair_counts,
                &mut heap,
            );
            if total_merges == 0 {
                metrics.stop_reason = StopReason::NoEligiblePairs;
                break;
            }

            debug!("merge {left:?} + {right:?} -> {new_token_id} (freq {frequency})");
            merges.push(left, right);
            iteration += 1;

            if self.cfg.show_progress && iteration % self.cfg.log_interval == 0 {
                info!(
                    "iter {:>6} freq {:>8} merges {:>8} distinct_pairs {:>8} vocab {:>8}",
                    iteration,
                    frequency,
                    total_merges,
                    pair_counts.len(),
                    vocab.len()
                );
            }

            metrics.iterations.push(IterationMetrics {
                iteration,
                best_frequency: frequency,
                merges_applied: total_merges,
                distinct_pairs: pair_counts.len(),
                elapsed_iteration: iteration_start.elapsed(),
                elapsed_total: training_start.elapsed(),
                rss_kb: sample_rss_kb(),
            });
        }

        if metrics.iterations.len() == max_new_tokens {
            metrics.stop_reason = StopReason::TargetVocabReached;
        }
        let total_duration = training_start.elapsed();
        metrics.total_duration = total_duration;

        if self.cfg.show_progress {
            info!(
                "completed {} merges in {:.2?}; vocab size {}; stop reason {:?}",
                merges.len(),
                total_duration,
                vocab.len(),
                metrics.stop_reason
            );
        }

        let model = BpeModel::new(
            self.cfg.target_vocab_size,
            vocab,
            merges,
            codec,
            self.cfg.segmentation,
        );
        Ok(TrainerArtifacts { model, metrics })
    }
}

/// Builds the word frequency table, keyed by the encoded unit, in sorted unit order.
fn count_units<S>(texts: &[S], codec: &ByteCodec, mode: SegmentationMode) -> Vec<(String, usize)>
where
    S: AsRef<str> + Sync,
{
    let segmenter = Segmenter::new(mode, codec);
    let table = texts
        .par_iter()
        .map(|text| {
            let mut local: FxHashMap<String, usize> = FxHashMap::default();
            let encoded = codec.encode(text.as_ref().as_bytes());
            for unit in segmenter.split(&encoded) {
                *local.entry(unit.to_owned()).or_insert(0) += 1;
            }
            local
        })
        .reduce(FxHashMap::default, |mut acc, local| {
            for (unit, count) in local {
                *acc.entry(unit).or_insert(0) += count;
            }
            acc
        });
    let mut entries: Vec<(String, usize)> = table.into_iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// Assigns ids to every distinct symbol (and the marker) in code point order.
fn base_vocabulary(units: &[(String, usize)]) -> Result<Vocabulary> {
    let mut symbols = BTreeSet::new();
    for (unit, _) in units {
        symbols.extend(unit_symbols(unit));
    }
    debug_assert!(units.is_empty() || symbols.contains(&END_OF_UNIT));
    Vocabulary::from_tokens(symbols.into_iter().map(String::from))
}

fn token_pair(vocab: &Vocabulary, pair: Pair) -> Result<(String, String)> {
    let lookup = |id: TokenId| {
        vocab
            .token(id)
            .map(str::to_owned)
            .ok_or_else(|| BpeError::Internal(format!("token id {id} has no vocabulary entry")))
    };
    Ok((lookup(pair.0)?, lookup(pair.1)?))
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct PairScore {
    frequency: usize,
    pair: Pair,
}

impl PairScore {
    fn new(pair: Pair, frequency: usize) -> Self {
        Self { frequency, pair }
    }
}

impl Ord for PairScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.frequency
            .cmp(&other.frequency)
            .then_with(|| other.pair.cmp(&self.pair))
    }
}

impl PartialOrd for PairScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_pair_tokens(vocab: &Vocabulary, a: Pair, b: Pair) -> Ordering {
    vocab
        .token(a.0)
        .cmp(&vocab.token(b.0))
        .then_with(|| vocab.token(a.1).cmp(&vocab.token(b.1)))
}

/// Pops the most frequent live pair; equal frequencies resolve to the lexicographically smallest
/// `(left, right)` token strings. Tied runners-up are pushed back.
fn pop_best_pair(
    heap: &mut BinaryHeap<PairScore>,
    pair_counts: &FxHashMap<Pair, usize>,
    min_frequency: usize,
    vocab: &Vocabulary,
) -> Option<(Pair, usize)> {
    let is_live = |score: &PairScore| {
        score.frequency >= min_frequency
            && pair_counts.get(&score.pair).copied() == Some(score.frequency)
    };

    let first = loop {
        let score = heap.pop()?;
        if is_live(&score) {
            break score;
        }
    };

    let mut tied = vec![first.pair];
    while heap
        .peek()
        .is_some_and(|score| score.frequency == first.frequency)
    {
        if let Some(score) = heap.pop() {
            if is_live(&score) {
                tied.push(score.pair);
            }
        }
    }
    tied.sort_unstable_by(|a, b| compare_pair_tokens(vocab, *a, *b));
    tied.dedup();

    let best = tied[0];
    for &pair in &tied[1..] {
        heap.push(PairScore::new(pair, first.frequency));
    }
    Some((best, first.frequency))
}

fn compute_pair_counts(words: &[Word], counts: &[usize]) -> FxHashMap<Pair, usize> {
    words
        .par_iter()
        .zip(counts.par_iter())
        .map(|(word, &count)| {
            let mut local = FxHashMap::default();
            word.for_each_pair(|pair| {
                *local.entry(pair).or_insert(0) += count;
            });
            local
        })
        .reduce(FxHashMap::default, |mut acc, local| {
            for (pair, count) in local {
                *acc.entry(pair).or_insert(0) += count;
            }
            acc
        })
}

#[derive(Default)]
struct MergeAdjustments {
    deltas: FxHashMap<Pair, i64>,
    merges: usize,
}

fn apply_delta(
    pair_counts: &mut FxHashMap<Pair, usize>,
    heap: &mut BinaryHeap<PairScore>,
    pair: Pair,
    delta: i64,
) {
    match delta.cmp(&0) {
        Ordering::Greater => {
            let amount = usize::try_from(delta.unsigned_abs()).unwrap_or(usize::MAX);
            let count = pair_counts.entry(pair).or_insert(0);
            *count = count.saturating_add(amount);
            heap.push(PairScore::new(pair, *count));
        }
        Ordering::Less => {
            let amount = usize::try_from(delta.unsigned_abs()).unwrap_or(usize::MAX);
            if let Entry::Occupied(mut occupied) = pair_counts.entry(pair) {
                let new_value = occupied.get().saturating_sub(amount);
                if new_value == 0 {
                    occupied.remove();
                } else {
                    *occupied.get_mut() = new_value;
                    heap.push(PairScore::new(pair, new_value));
                }
            }
        }
        Ordering::Equal => {}
    }
}

/// Merges `pair` in every word and folds the frequency-weighted adjacency deltas into the counts.
///
/// Returns the frequency-weighted number of replacements.
fn apply_merge(
    words: &mut [Word],
    counts: &[usize],
    pair: Pair,
    new_token: TokenId,
    pair_counts: &mut FxHashMap<Pair, usize>,
    heap: &mut BinaryHeap<PairScore>,
) -> usize {
    let aggregate = words
        .par_iter_mut()
        .zip(counts.par_iter())
        .map(|(word, &count)| {
            let mut local = MergeAdjustments::default();
            let outcome = word.merge_tracked(pair.0, pair.1, new_token);
            if outcome.merges == 0 {
                return local;
            }
            local.merges = outcome.merges * count;
            let weight = i64::try_from(count).unwrap_or(i64::MAX);
            for (pair_key, delta) in outcome.deltas {
                *local.deltas.entry(pair_key).or_insert(0) += i64::from(delta) * weight;
            }
            local
        })
        .reduce(MergeAdjustments::default, |mut acc, mut local| {
            acc.merges += local.merges;
            for (pair_key, delta) in local.deltas.drain() {
                *acc.deltas.entry(pair_key).or_insert(0) += delta;
            }
            acc
        });

    for (pair_key, delta) in aggregate.deltas {
        apply_delta(pair_counts, heap, pair_key, delta);
    }

    aggregate.merges
}

impl fmt::Display for TrainerArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BPE model with vocab size {}", self.model.vocab_size())?;
        writeln!(f, "Merges learned: {}", self.model.merges().len())?;
        writeln!(f, "Stop reason: {:?}", self.metrics.stop_reason)?;
        writeln!(f, "Total duration: {:?}", self.metrics.total_duration)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const ODIA_SAMPLE: &[&str] = &[
        "ଓଡ଼ିଆ ଭାରତର ଏକ ପ୍ରାଚୀନ ଭାଷା ଅଟେ ।",
        "ତୁମେ କେମିତି ଅଛ ? ମୁଁ ଭଲ ଅଛି ।",
        "କମ୍ପ୍ୟୁଟର ଆଜିକାଲି ସର୍ବତ୍ର ବ୍ୟବହୃତ ହେଉଛି ।",
        "ଏକଦା ଗୋଟିଏ ଗାଁରେ ଜଣେ ଗରିବ କୃଷକ ରହୁଥିଲା ।",
        "ଓଡ଼ିଆ ଭାଷା ଓଡ଼ିଶାର ସରକାରୀ ଭାଷା ଅଟେ ।",
        "ମୁଁ ଭଲ ଅଛି, ତୁମେ କେମିତି ଅଛ ?",
    ];

    fn trainer(min_frequency: usize, vocab_size: usize) -> Trainer {
        let cfg = TrainerConfig::builder()
            .min_frequency(min_frequency)
            .target_vocab_size(vocab_size)
            .show_progress(false)
            .build()
            .unwrap();
        Trainer::new(cfg)
    }

    /// Rescans every pair each round; the incremental trainer must agree with it.
    fn rescanning_merges(texts: &[&str], mode: SegmentationMode, rounds: usize) -> Vec<(String, String)> {
        let codec = ByteCodec::standard();
        let segmenter = Segmenter::new(mode, &codec);
        let mut words: BTreeMap<Vec<String>, usize> = BTreeMap::new();
        for text in texts {
            let encoded = codec.encode(text.as_bytes());
            for unit in segmenter.split(&encoded) {
                let symbols = unit_symbols(unit).map(String::from).collect();
                *words.entry(symbols).or_insert(0) += 1;
            }
        }

        let mut merges = Vec::new();
        for _ in 0..rounds {
            let mut pairs: BTreeMap<(String, String), usize> = BTreeMap::new();
            for (word, count) in &words {
                for window in word.windows(2) {
                    *pairs
                        .entry((window[0].clone(), window[1].clone()))
                        .or_insert(0) += count;
                }
            }
            let Some((best, &frequency)) = pairs
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            else {
                break;
            };
            if frequency < 2 {
                break;
            }
            let best = best.clone();
            let mut next: BTreeMap<Vec<String>, usize> = BTreeMap::new();
            for (word, count) in words {
                let mut merged = Vec::with_capacity(word.len());
                let mut i = 0;
                while i < word.len() {
                    if i + 1 < word.len() && word[i] == best.0 && word[i + 1] == best.1 {
                        merged.push(format!("{}{}", best.0, best.1));
                        i += 2;
                    } else {
                        merged.push(word[i].clone());
                        i += 1;
                    }
                }
                *next.entry(merged).or_insert(0) += count;
            }
            words = next;
            merges.push(best);
        }
        merges
    }

    #[test]
    fn learns_most_frequent_pair() {
        // base alphabet: a, b, end-of-unit marker
        let artefacts = trainer(2, 4).train_from_texts(&["aa", "aaab"]).unwrap();
        let model = &artefacts.model;
        assert_eq!(model.base_size(), 3);
        assert_eq!(model.merges().pairs(), &[("a".to_string(), "a".to_string())]);
        assert_eq!(model.vocab().id("aa"), Some(3));
        assert_eq!(artefacts.metrics.iterations[0].best_frequency, 3);
        assert_eq!(artefacts.metrics.stop_reason, StopReason::TargetVocabReached);
    }

    #[test]
    fn base_vocabulary_is_sorted_and_includes_marker() {
        let artefacts = trainer(2, 0).train_from_texts(&["ba", "c"]).unwrap();
        let tokens = artefacts.model.vocab().tokens();
        assert_eq!(tokens, &["a", "b", "c", "\u{E000}"]);
        assert!(artefacts.model.merges().is_empty());
    }

    #[test]
    fn ties_resolve_to_smallest_pair() {
        // base alphabet: a, b, c, d, end-of-unit marker
        let artefacts = trainer(1, 7).train_from_texts(&["cd", "ab"]).unwrap();
        let merges = artefacts.model.merges();
        assert_eq!(merges.get(0), Some(("a", "b")));
        assert_eq!(merges.get(1), Some(("ab", "\u{E000}")));
    }

    #[test]
    fn incremental_counts_match_full_rescan() {
        for mode in [SegmentationMode::EncodedWhitespace, SegmentationMode::AsciiWhitespace] {
            let cfg = TrainerConfig::builder()
                .target_vocab_size(400)
                .segmentation(mode)
                .show_progress(false)
                .build()
                .unwrap();
            let artefacts = Trainer::new(cfg).train_from_texts(ODIA_SAMPLE).unwrap();
            let budget = 400 - artefacts.model.base_size();
            let expected = rescanning_merges(ODIA_SAMPLE, mode, budget);
            assert!(!expected.is_empty());
            assert_eq!(artefacts.model.merges().pairs(), expected.as_slice(), "{mode:?}");
        }
    }

    #[test]
    fn training_is_deterministic() {
        let first = trainer(2, 300).train_from_texts(ODIA_SAMPLE).unwrap();
        let second = trainer(2, 300).train_from_texts(ODIA_SAMPLE).unwrap();
        assert_eq!(first.model, second.model);
    }

    #[test]
    fn vocabulary_growth_is_bounded() {
        let target = 150;
        let artefacts = trainer(2, target).train_from_texts(ODIA_SAMPLE).unwrap();
        let model = &artefacts.model;
        let base = model.base_size();
        assert!(model.merges().len() <= target - base);
        assert!(model.vocab_size() <= base + model.merges().len());
        for (left, right) in model.merges().iter() {
            assert!(model.vocab().contains(&format!("{left}{right}")));
        }
    }

    #[test]
    fn stops_when_no_pair_repeats() {
        let artefacts = trainer(2, 100).train_from_texts(&["abc"]).unwrap();
        assert!(artefacts.model.merges().is_empty());
        assert_eq!(artefacts.metrics.stop_reason, StopReason::NoEligiblePairs);
    }

    #[test]
    fn empty_corpus_yields_empty_vocabulary() {
        let texts: [&str; 0] = [];
        let artefacts = trainer(2, 100).train_from_texts(&texts).unwrap();
        assert!(artefacts.model.vocab().is_empty());
        assert!(artefacts.model.merges().is_empty());

        let blank = trainer(2, 100).train_from_texts(&[""]).unwrap();
        assert!(blank.model.vocab().is_empty());
    }

    #[test]
    fn target_below_base_trains_no_merges() {
        let artefacts = trainer(2, 2).train_from_texts(ODIA_SAMPLE).unwrap();
        assert!(artefacts.model.merges().is_empty());
        assert!(artefacts.metrics.iterations.is_empty());
    }

    #[test]
    fn max_iterations_caps_rounds() {
        let cfg = TrainerConfig::builder()
            .target_vocab_size(1000)
            .max_merge_iterations(Some(3))
            .show_progress(false)
            .build()
            .unwrap();
        let artefacts = Trainer::new(cfg).train_from_texts(ODIA_SAMPLE).unwrap();
        assert_eq!(artefacts.model.merges().len(), 3);
        assert_eq!(artefacts.metrics.stop_reason, StopReason::MaxIterationsReached);
    }

    #[test]
    fn raised_cancel_flag_stops_before_merging() {
        let flag = Arc::new(AtomicBool::new(true));
        let artefacts = trainer(2, 1000)
            .with_cancel_flag(Arc::clone(&flag))
            .train_from_texts(ODIA_SAMPLE)
            .unwrap();
        assert!(artefacts.model.merges().is_empty());
        assert!(!artefacts.model.vocab().is_empty());
        assert_eq!(artefacts.metrics.stop_reason, StopReason::Cancelled);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = TrainerConfig {
            min_frequency: 0,
            ..TrainerConfig::default()
        };
        assert!(Trainer::new(cfg).train_from_texts(ODIA_SAMPLE).is_err());
    }

    #[test]
    fn artefacts_display_summary() {
        let artefacts = trainer(2, 4).train_from_texts(&["aa", "aaab"]).unwrap();
        let summary = artefacts.to_string();
        assert!(summary.contains("vocab size 4"));
        assert!(summary.contains("Merges learned: 1"));
    }
}
