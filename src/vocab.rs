//! Dense token vocabulary shared by training and inference.

use std::convert::TryFrom;

use rustc_hash::FxHashMap;

use crate::error::{BpeError, Result};

/// Token identifier used throughout the crate.
pub type TokenId = u32;
/// Merge pair encoded as `(left, right)` token identifiers.
pub type Pair = (TokenId, TokenId);

/// Mapping between token strings and dense ids assigned in insertion order from zero.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    tokens: Vec<String>,
    ids: FxHashMap<String, TokenId>,
}

impl Vocabulary {
    /// Creates an empty vocabulary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a vocabulary whose ids follow the iteration order of `tokens`.
    ///
    /// Fails when a token appears twice, since ids must be unique.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::new();
        for token in tokens {
            let token = token.into();
            if vocab.contains(&token) {
                return Err(BpeError::InvalidArtifact(format!(
                    "duplicate vocabulary entry {token:?}"
                )));
            }
            vocab.get_or_insert(token)?;
        }
        Ok(vocab)
    }

    /// Returns the id of `token`, inserting it with the next free id when absent.
    pub fn get_or_insert(&mut self, token: String) -> Result<TokenId> {
        if let Some(&id) = self.ids.get(&token) {
            return Ok(id);
        }
        let id = TokenId::try_from(self.tokens.len())
            .map_err(|_| BpeError::Internal("vocabulary size exceeded u32::MAX".into()))?;
        self.ids.insert(token.clone(), id);
        self.tokens.push(token);
        Ok(id)
    }

    /// Looks up the id assigned to `token`.
    #[inline]
    #[must_use]
    pub fn id(&self, token: &str) -> Option<TokenId> {
        self.ids.get(token).copied()
    }

    /// Looks up the id of a single-symbol token.
    #[must_use]
    pub fn symbol_id(&self, symbol: char) -> Option<TokenId> {
        let mut buf = [0u8; 4];
        self.id(symbol.encode_utf8(&mut buf))
    }

    /// Returns the token string for `id`, if assigned.
    #[inline]
    #[must_use]
    pub fn token(&self, id: TokenId) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    /// Returns `true` when `token` has an id.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.ids.contains_key(token)
    }

    /// Number of tokens in the vocabulary.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` when no token has been assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of leading single-symbol tokens, i.e. the base alphabet learned from the corpus.
    ///
    /// Merge results always span at least two symbols, so the base alphabet is exactly the
    /// leading run of one-code-point tokens.
    #[must_use]
    pub fn base_size(&self) -> usize {
        self.tokens
            .iter()
            .take_while(|token| token.chars().count() == 1)
            .count()
    }

    /// Iterates over `(id, token)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (TokenId, &str)> + '_ {
        self.tokens
            .iter()
            .enumerate()
            .map(|(idx, token)| (idx as TokenId, token.as_str()))
    }

    /// Returns every token string ordered by id.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

impl PartialEq for Vocabulary {
    fn eq(&self, other: &Self) -> bool {
        self.tokens == other.tokens
    }
}

impl Eq for Vocabulary {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_insertion_order() {
        let mut vocab = Vocabulary::new();
        assert_eq!(vocab.get_or_insert("b".into()).unwrap(), 0);
        assert_eq!(vocab.get_or_insert("a".into()).unwrap(), 1);
        assert_eq!(vocab.get_or_insert("b".into()).unwrap(), 0);
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.token(1), Some("a"));
        assert_eq!(vocab.token(2), None);
    }

    #[test]
    fn from_tokens_rejects_duplicates() {
        let err = Vocabulary::from_tokens(["a", "b", "a"]).expect_err("duplicate");
        assert!(matches!(err, BpeError::InvalidArtifact(_)));
    }

    #[test]
    fn base_size_counts_leading_single_symbols() {
        let vocab = Vocabulary::from_tokens(["a", "b", "ଓ", "ab", "c"]).unwrap();
        assert_eq!(vocab.base_size(), 3);
        assert_eq!(vocab.symbol_id('ଓ'), Some(2));
        assert_eq!(vocab.symbol_id('z'), None);
    }
}
