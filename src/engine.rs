//! Priority-ordered merge application used for inference.

use rustc_hash::FxHashMap;

use crate::error::{BpeError, Result};
use crate::model::MergeTable;
use crate::vocab::{Pair, TokenId, Vocabulary};
use crate::word::Word;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MergeRule {
    rank: usize,
    merged: TokenId,
}

/// Rank lookup over a merge table, resolved to token ids once per model.
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    rules: FxHashMap<Pair, MergeRule>,
}

impl MergeEngine {
    /// Resolves every merge in `merges` against `vocab`.
    ///
    /// Both operands and the concatenation of every merge must be present in the vocabulary.
    /// When a pair was learned more than once the earliest rank wins.
    pub fn new(vocab: &Vocabulary, merges: &MergeTable) -> Result<Self> {
        let mut rules = FxHashMap::default();
        rules.reserve(merges.len());
        for (rank, (left, right)) in merges.iter().enumerate() {
            let resolve = |token: &str| {
                vocab.id(token).ok_or_else(|| {
                    BpeError::InvalidArtifact(format!(
                        "merge {rank} references {token:?} which is not in the vocabulary"
                    ))
                })
            };
            let left_id = resolve(left)?;
            let right_id = resolve(right)?;
            let merged = resolve(format!("{left}{right}").as_str())?;
            rules
                .entry((left_id, right_id))
                .or_insert(MergeRule { rank, merged });
        }
        Ok(Self { rules })
    }

    /// Returns the rank of `pair`, if it was learned.
    #[must_use]
    pub fn rank(&self, pair: Pair) -> Option<usize> {
        self.rules.get(&pair).map(|rule| rule.rank)
    }

    /// Number of distinct pairs with a rank.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` when no merges are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Reduces `word` by repeatedly merging its lowest-ranked adjacent pair.
    ///
    /// Every round merges all non-overlapping occurrences of that pair, so an early merge
    /// anywhere in the word wins over a later merge that appears further left. Returns the number
    /// of rounds, which is at most `word.len() - 1`.
    pub fn apply(&self, word: &mut Word) -> usize {
        let mut rounds = 0usize;
        while word.has_pairs() {
            let mut best: Option<(Pair, MergeRule)> = None;
            word.for_each_pair(|pair| {
                if let Some(&rule) = self.rules.get(&pair) {
                    if best.map_or(true, |(_, current)| rule.rank < current.rank) {
                        best = Some((pair, rule));
                    }
                }
            });
            let Some(((left, right), rule)) = best else {
                break;
            };
            word.merge(left, right, rule.merged);
            rounds += 1;
        }
        rounds
    }

    /// Convenience wrapper around [`MergeEngine::apply`] for owned id sequences.
    #[must_use]
    pub fn apply_merges(&self, tokens: Vec<TokenId>) -> Vec<TokenId> {
        let mut word = Word::from_tokens(tokens);
        self.apply(&mut word);
        word.into_tokens()
    }
}
