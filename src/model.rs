//! Model types and helpers for working with trained BPE vocabularies.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bytes::ByteCodec;
use crate::engine::MergeEngine;
use crate::error::Result;
use crate::segment::SegmentationMode;
use crate::serialization;
use crate::tokenizer::Tokenizer;
use crate::vocab::Vocabulary;

/// Ordered list of learned merges; a merge's position is its rank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeTable {
    pairs: Vec<(String, String)>,
}

impl MergeTable {
    /// Creates an empty merge table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a merge with the next rank.
    pub fn push(&mut self, left: String, right: String) {
        self.pairs.push((left, right));
    }

    /// Returns the merge learned at `rank`.
    #[must_use]
    pub fn get(&self, rank: usize) -> Option<(&str, &str)> {
        self.pairs
            .get(rank)
            .map(|(left, right)| (left.as_str(), right.as_str()))
    }

    /// Number of learned merges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` when no merge was learned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterates over merges in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.pairs
            .iter()
            .map(|(left, right)| (left.as_str(), right.as_str()))
    }

    /// Returns the raw pairs in rank order.
    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

impl From<Vec<(String, String)>> for MergeTable {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }
}

/// Trained BPE model: the unit that is persisted and loaded as one artifact.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpeModel {
    target_vocab_size: usize,
    vocab: Vocabulary,
    merges: MergeTable,
    byte_codec: ByteCodec,
    segmentation: SegmentationMode,
}

/// Summary figures describing a trained model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStats {
    /// Number of tokens in the vocabulary.
    pub vocab_size: usize,
    /// Number of learned merges.
    pub num_merges: usize,
    /// Vocabulary size requested at training time.
    pub target_vocab_size: usize,
}

impl BpeModel {
    /// Constructs a new model from its parts.
    pub fn new(
        target_vocab_size: usize,
        vocab: Vocabulary,
        merges: MergeTable,
        byte_codec: ByteCodec,
        segmentation: SegmentationMode,
    ) -> Self {
        Self {
            target_vocab_size,
            vocab,
            merges,
            byte_codec,
            segmentation,
        }
    }

    /// Vocabulary size requested when the model was trained.
    #[must_use]
    pub fn target_vocab_size(&self) -> usize {
        self.target_vocab_size
    }

    /// Returns the learned vocabulary.
    #[must_use]
    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Returns the merge table in rank order.
    #[must_use]
    pub fn merges(&self) -> &MergeTable {
        &self.merges
    }

    /// Returns the byte codec used to encode input text.
    #[must_use]
    pub fn byte_codec(&self) -> &ByteCodec {
        &self.byte_codec
    }

    /// Returns the segmentation mode the vocabulary was learned with.
    #[must_use]
    pub fn segmentation(&self) -> SegmentationMode {
        self.segmentation
    }

    /// Returns the total vocabulary size.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Returns the number of base symbols preceding the merge results.
    #[must_use]
    pub fn base_size(&self) -> usize {
        self.vocab.base_size()
    }

    /// Returns summary statistics for reporting.
    #[must_use]
    pub fn stats(&self) -> ModelStats {
        ModelStats {
            vocab_size: self.vocab.len(),
            num_merges: self.merges.len(),
            target_vocab_size: self.target_vocab_size,
        }
    }

    /// Builds the rank lookup used to apply merges.
    pub fn merge_engine(&self) -> Result<MergeEngine> {
        MergeEngine::new(&self.vocab, &self.merges)
    }

    /// Builds a [`Tokenizer`] serving encode and decode over this model.
    pub fn tokenizer(self) -> Result<Tokenizer> {
        Tokenizer::from_model(self)
    }

    /// Serialises the model to a JSON artifact string.
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        serialization::to_json(self, pretty)
    }

    /// Parses a model from a JSON artifact string.
    pub fn from_json(json: &str) -> Result<Self> {
        serialization::from_json(json)
    }

    /// Persists the model as a JSON artifact on disk.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        serialization::save_artifact(self, path, false)
    }

    /// Loads a model from a JSON artifact on disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        serialization::load_artifact(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model() -> BpeModel {
        let vocab = Vocabulary::from_tokens(["a", "b", "\u{E000}", "ab"]).expect("vocab");
        let merges = MergeTable::from(vec![("a".to_string(), "b".to_string())]);
        BpeModel::new(
            10,
            vocab,
            merges,
            ByteCodec::standard(),
            SegmentationMode::default(),
        )
    }

    #[test]
    fn stats_reflect_parts() {
        let model = tiny_model();
        let stats = model.stats();
        assert_eq!(stats.vocab_size, 4);
        assert_eq!(stats.num_merges, 1);
        assert_eq!(stats.target_vocab_size, 10);
        assert_eq!(model.base_size(), 3);
    }

    #[test]
    fn merge_table_preserves_rank_order() {
        let mut merges = MergeTable::new();
        merges.push("a".into(), "b".into());
        merges.push("ab".into(), "c".into());
        assert_eq!(merges.get(1), Some(("ab", "c")));
        assert_eq!(merges.iter().count(), 2);
        assert_eq!(merges.get(2), None);
    }

    #[test]
    fn model_builds_tokenizer() {
        let tokenizer = tiny_model().tokenizer().expect("tokenizer");
        assert_eq!(tokenizer.encode_ids("ab"), vec![3, 2]);
    }
}
