//! Encode and decode text with a trained model.

use std::mem;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::MergeEngine;
use crate::error::Result;
use crate::metrics;
use crate::model::BpeModel;
use crate::segment::{unit_symbols, Segmenter, END_OF_UNIT};
use crate::vocab::TokenId;
use crate::word::Word;

/// Token ids produced for one text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoding {
    /// Emitted token ids in order.
    pub ids: Vec<TokenId>,
    /// Symbols skipped because the vocabulary has no entry for them.
    pub dropped_symbols: usize,
}

impl Encoding {
    /// Number of emitted ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` when no id was emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns `true` when every input symbol was covered by the vocabulary.
    #[must_use]
    pub fn is_lossless(&self) -> bool {
        self.dropped_symbols == 0
    }
}

/// Text reconstructed from token ids, with counters for anything that could not be decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoded {
    /// Reconstructed text.
    pub text: String,
    /// Ids with no vocabulary entry.
    pub skipped_ids: usize,
    /// Symbols outside the byte codec, each rendered as U+FFFD.
    pub replaced_symbols: usize,
    /// The recovered bytes were not valid UTF-8 and were repaired with U+FFFD.
    pub invalid_utf8: bool,
}

impl Decoded {
    /// Returns `true` when `text` is not an exact reconstruction of the ids.
    #[must_use]
    pub fn is_lossy(&self) -> bool {
        self.skipped_ids > 0 || self.replaced_symbols > 0 || self.invalid_utf8
    }
}

enum Piece {
    Token(TokenId),
    Unknown(char),
}

/// Immutable handle serving encode and decode over a [`BpeModel`].
///
/// Cloning is cheap and clones share the model, so one tokenizer can serve any number of
/// threads.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    model: Arc<BpeModel>,
    engine: Arc<MergeEngine>,
}

impl Tokenizer {
    /// Resolves the model's merge table and wraps the model for sharing.
    pub fn from_model(model: BpeModel) -> Result<Self> {
        let engine = model.merge_engine()?;
        Ok(Self {
            model: Arc::new(model),
            engine: Arc::new(engine),
        })
    }

    /// Returns the underlying model.
    #[must_use]
    pub fn model(&self) -> &BpeModel {
        &self.model
    }

    /// Encodes `text` into token ids.
    ///
    /// The text is byte-encoded, segmented, and every unit reduced by the merge engine. Symbols
    /// the vocabulary does not know are skipped and counted in [`Encoding::dropped_symbols`];
    /// merges never span a skipped symbol.
    #[must_use]
    pub fn encode(&self, text: &str) -> Encoding {
        let mut encoding = Encoding::default();
        self.walk(text, |piece| match piece {
            Piece::Token(id) => encoding.ids.push(id),
            Piece::Unknown(_) => encoding.dropped_symbols += 1,
        });
        encoding
    }

    /// Encodes `text`, returning only the ids.
    #[must_use]
    pub fn encode_ids(&self, text: &str) -> Vec<TokenId> {
        self.encode(text).ids
    }

    /// Returns the token strings for `text`, with unknown symbols kept as one-symbol strings.
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let vocab = self.model.vocab();
        let mut tokens = Vec::new();
        self.walk(text, |piece| match piece {
            Piece::Token(id) => {
                if let Some(token) = vocab.token(id) {
                    tokens.push(token.to_owned());
                }
            }
            Piece::Unknown(symbol) => tokens.push(symbol.to_string()),
        });
        tokens
    }

    fn walk<F: FnMut(Piece)>(&self, text: &str, mut sink: F) {
        let codec = self.model.byte_codec();
        let vocab = self.model.vocab();
        let encoded = codec.encode(text.as_bytes());
        let segmenter = Segmenter::new(self.model.segmentation(), codec);

        let mut run = Vec::new();
        for unit in segmenter.split(&encoded) {
            for symbol in unit_symbols(unit) {
                match vocab.symbol_id(symbol) {
                    Some(id) => run.push(id),
                    None => {
                        self.flush(&mut run, &mut sink);
                        sink(Piece::Unknown(symbol));
                    }
                }
            }
            self.flush(&mut run, &mut sink);
        }
    }

    fn flush<F: FnMut(Piece)>(&self, run: &mut Vec<TokenId>, sink: &mut F) {
        if run.is_empty() {
            return;
        }
        let mut word = Word::from_tokens(mem::take(run));
        self.engine.apply(&mut word);
        for id in word.into_tokens() {
            sink(Piece::Token(id));
        }
    }

    /// Decodes `ids` back into text.
    ///
    /// Unknown ids are skipped and end-of-unit markers removed. Degraded output is reported
    /// through the [`Decoded`] counters instead of an error.
    #[must_use]
    pub fn decode(&self, ids: &[TokenId]) -> Decoded {
        let codec = self.model.byte_codec();
        let vocab = self.model.vocab();
        let mut bytes = Vec::with_capacity(ids.len() * 2);
        let mut skipped_ids = 0usize;
        let mut replaced_symbols = 0usize;

        for &id in ids {
            let Some(token) = vocab.token(id) else {
                skipped_ids += 1;
                continue;
            };
            for symbol in token.chars().filter(|&symbol| symbol != END_OF_UNIT) {
                match codec.decode_symbol(symbol) {
                    Some(byte) => bytes.push(byte),
                    None => {
                        replaced_symbols += 1;
                        bytes.extend_from_slice("\u{FFFD}".as_bytes());
                    }
                }
            }
        }

        let (text, invalid_utf8) = match String::from_utf8(bytes) {
            Ok(text) => (text, false),
            Err(err) => (String::from_utf8_lossy(err.as_bytes()).into_owned(), true),
        };
        Decoded {
            text,
            skipped_ids,
            replaced_symbols,
            invalid_utf8,
        }
    }

    /// Decodes `ids`, returning only the text.
    #[must_use]
    pub fn decode_to_string(&self, ids: &[TokenId]) -> String {
        self.decode(ids).text
    }

    /// Bytes per emitted id over `texts`; see [`metrics::compression_ratio`].
    #[must_use]
    pub fn compression_ratio<S: AsRef<str>>(&self, texts: &[S]) -> f64 {
        metrics::compression_ratio(self, texts)
    }
}
