//! Symbol sequences rewritten in place by merges, shared by training and inference.

use crate::vocab::{Pair, TokenId};

/// Outcome of merging a specific pair within a [`Word`] during training.
#[derive(Debug, Default)]
pub(crate) struct MergeOutcome {
    /// Number of pair occurrences replaced inside the word.
    pub(crate) merges: usize,
    /// Pair count deltas emitted by the merge. Negative values represent removals,
    /// positive values represent newly formed adjacent pairs.
    pub(crate) deltas: Vec<(Pair, i32)>,
}

/// Ordered token ids for one segmented unit, terminated by the end-of-unit marker's id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Word {
    symbols: Vec<TokenId>,
}

impl Word {
    /// Builds a word from an owned token sequence.
    #[must_use]
    pub fn from_tokens(tokens: Vec<TokenId>) -> Self {
        Self { symbols: tokens }
    }

    /// Returns the current token ids.
    #[must_use]
    pub fn tokens(&self) -> &[TokenId] {
        &self.symbols
    }

    /// Consumes the word, returning its token ids.
    #[must_use]
    pub fn into_tokens(self) -> Vec<TokenId> {
        self.symbols
    }

    /// Number of symbols currently in the word.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns `true` when the word holds no symbols.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Returns true when the word contains at least two symbols.
    #[must_use]
    pub fn has_pairs(&self) -> bool {
        self.symbols.len() >= 2
    }

    /// Invokes the provided closure for each adjacent token pair.
    pub fn for_each_pair<F>(&self, mut f: F)
    where
        F: FnMut(Pair),
    {
        for window in self.symbols.windows(2) {
            f((window[0], window[1]));
        }
    }

    /// Replaces every non-overlapping `(left, right)` occurrence, scanning left to right.
    ///
    /// Returns the number of replacements.
    pub fn merge(&mut self, left: TokenId, right: TokenId, replacement: TokenId) -> usize {
        self.merge_with(left, right, replacement, |_, _| {})
    }

    /// Applies the selected merge and collects the adjacency deltas it produces.
    pub(crate) fn merge_tracked(
        &mut self,
        left: TokenId,
        right: TokenId,
        replacement: TokenId,
    ) -> MergeOutcome {
        let mut deltas = Vec::new();
        let merges = self.merge_with(left, right, replacement, |pair, delta| {
            deltas.push((pair, delta));
        });
        MergeOutcome { merges, deltas }
    }

    fn merge_with<F>(
        &mut self,
        left: TokenId,
        right: TokenId,
        replacement: TokenId,
        mut on_delta: F,
    ) -> usize
    where
        F: FnMut(Pair, i32),
    {
        let original_len = self.symbols.len();
        if original_len < 2 {
            return 0;
        }

        let mut read = 0usize;
        let mut write = 0usize;
        let mut merges = 0usize;

        while read < original_len {
            if read + 1 < original_len
                && self.symbols[read] == left
                && self.symbols[read + 1] == right
            {
                let prev = (write > 0).then(|| self.symbols[write - 1]);
                let next = (read + 2 < original_len).then(|| self.symbols[read + 2]);

                // Remove affected adjacency counts.
                if let Some(prev) = prev {
                    on_delta((prev, left), -1);
                }
                on_delta((left, right), -1);
                if let Some(next) = next {
                    on_delta((right, next), -1);
                }

                self.symbols[write] = replacement;
                write += 1;
                read += 2;
                merges += 1;

                // Emit adjacencies formed with the merged token.
                if let Some(prev) = prev {
                    on_delta((prev, replacement), 1);
                }
                if let Some(next) = next {
                    on_delta((replacement, next), 1);
                }
            } else {
                if write != read {
                    self.symbols[write] = self.symbols[read];
                }
                write += 1;
                read += 1;
            }
        }

        self.symbols.truncate(write);
        merges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(deltas: &[(Pair, i32)], pair: Pair) -> i32 {
        deltas
            .iter()
            .filter(|(p, _)| *p == pair)
            .map(|(_, d)| d)
            .sum()
    }

    #[test]
    fn merge_replaces_all_pairs() {
        let mut word = Word::from_tokens(vec![1, 2, 1, 2, 3]);
        assert!(word.has_pairs());
        let result = word.merge_tracked(1, 2, 99);
        assert_eq!(result.merges, 2);
        assert_eq!(word.tokens(), &[99, 99, 3]);
        assert!(result.deltas.contains(&((1, 2), -1)));
    }

    #[test]
    fn merge_is_non_overlapping_left_to_right() {
        let mut word = Word::from_tokens(vec![7, 7, 7]);
        assert_eq!(word.merge(7, 7, 8), 1);
        assert_eq!(word.tokens(), &[8, 7]);
    }

    #[test]
    fn deltas_match_recounted_pairs() {
        let mut word = Word::from_tokens(vec![1, 1, 1, 1, 2]);
        let outcome = word.merge_tracked(1, 1, 5);
        assert_eq!(word.tokens(), &[5, 5, 2]);
        assert_eq!(net(&outcome.deltas, (1, 1)), -3);
        assert_eq!(net(&outcome.deltas, (5, 1)), 0);
        assert_eq!(net(&outcome.deltas, (5, 5)), 1);
        assert_eq!(net(&outcome.deltas, (1, 2)), -1);
        assert_eq!(net(&outcome.deltas, (5, 2)), 1);
    }

    #[test]
    fn enumerate_pairs_in_order() {
        let word = Word::from_tokens(vec![1, 2, 3]);
        let mut collected = Vec::new();
        word.for_each_pair(|pair| collected.push(pair));
        assert_eq!(collected, vec![(1, 2), (2, 3)]);
    }

    #[test]
    fn short_words_are_untouched() {
        let mut word = Word::from_tokens(vec![4]);
        assert!(!word.has_pairs());
        assert_eq!(word.merge(4, 4, 9), 0);
        assert_eq!(word.len(), 1);
    }
}
