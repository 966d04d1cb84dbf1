//! Splits byte-encoded text into the units that merges operate on.

use std::iter;

use serde::{Deserialize, Serialize};

use crate::bytes::{is_ascii_whitespace, ByteCodec};

/// Reserved symbol terminating every unit.
///
/// It lies in the private-use area, outside the [`ByteCodec`] image, so merges can never cross a
/// unit boundary and no merged token can collide with it.
pub const END_OF_UNIT: char = '\u{E000}';

/// Strategy used to classify symbols as whitespace when splitting units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// Classifies the encoded symbol itself with [`char::is_whitespace`].
    ///
    /// The byte codec never produces whitespace symbols, so each text forms a single unit and
    /// merges may span the original word boundaries.
    #[default]
    EncodedWhitespace,
    /// Classifies by the raw byte behind each symbol using ASCII whitespace (space, tab, LF, CR,
    /// VT, FF), yielding alternating word and whitespace units.
    AsciiWhitespace,
}

/// Splits symbol strings into whitespace and non-whitespace runs.
#[derive(Debug, Clone, Copy)]
pub struct Segmenter<'a> {
    mode: SegmentationMode,
    codec: &'a ByteCodec,
}

impl<'a> Segmenter<'a> {
    /// Creates a segmenter that classifies symbols according to `mode`.
    #[must_use]
    pub fn new(mode: SegmentationMode, codec: &'a ByteCodec) -> Self {
        Self { mode, codec }
    }

    /// Returns the configured segmentation mode.
    #[must_use]
    pub fn mode(&self) -> SegmentationMode {
        self.mode
    }

    fn is_whitespace(&self, symbol: char) -> bool {
        match self.mode {
            SegmentationMode::EncodedWhitespace => symbol.is_whitespace(),
            SegmentationMode::AsciiWhitespace => self
                .codec
                .decode_symbol(symbol)
                .is_some_and(is_ascii_whitespace),
        }
    }

    /// Splits `encoded` into maximal runs of whitespace and non-whitespace symbols.
    ///
    /// Both run kinds are returned in input order; nothing is discarded, so concatenating the
    /// units reproduces the input.
    #[must_use]
    pub fn split<'s>(&self, encoded: &'s str) -> Vec<&'s str> {
        let mut units = Vec::new();
        let mut run_start = 0usize;
        let mut run_kind: Option<bool> = None;

        for (idx, symbol) in encoded.char_indices() {
            let kind = self.is_whitespace(symbol);
            match run_kind {
                Some(current) if current == kind => {}
                Some(_) => {
                    units.push(&encoded[run_start..idx]);
                    run_start = idx;
                    run_kind = Some(kind);
                }
                None => run_kind = Some(kind),
            }
        }

        if run_kind.is_some() {
            units.push(&encoded[run_start..]);
        }
        units
    }
}

/// Returns the symbols of `unit` followed by the end-of-unit marker.
pub fn unit_symbols(unit: &str) -> impl Iterator<Item = char> + '_ {
    unit.chars().chain(iter::once(END_OF_UNIT))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(codec: &ByteCodec, text: &str) -> String {
        codec.encode(text.as_bytes())
    }

    #[test]
    fn encoded_whitespace_keeps_text_as_single_unit() {
        let codec = ByteCodec::standard();
        let segmenter = Segmenter::new(SegmentationMode::EncodedWhitespace, &codec);
        let symbols = encoded(&codec, "foo bar\tbaz");
        assert_eq!(segmenter.split(&symbols), vec![symbols.as_str()]);
    }

    #[test]
    fn ascii_whitespace_splits_and_preserves_runs() {
        let codec = ByteCodec::standard();
        let segmenter = Segmenter::new(SegmentationMode::AsciiWhitespace, &codec);
        let symbols = encoded(&codec, "foo  bar\tbaz");
        let units: Vec<Vec<u8>> = segmenter
            .split(&symbols)
            .into_iter()
            .map(|unit| codec.decode(unit).expect("codec symbols"))
            .collect();
        assert_eq!(
            units,
            vec![
                b"foo".to_vec(),
                b"  ".to_vec(),
                b"bar".to_vec(),
                b"\t".to_vec(),
                b"baz".to_vec()
            ]
        );
    }

    #[test]
    fn ascii_whitespace_handles_multi_byte_scripts() {
        let codec = ByteCodec::standard();
        let segmenter = Segmenter::new(SegmentationMode::AsciiWhitespace, &codec);
        let text = " ଓଡ଼ିଆ ଭାଷା ";
        let symbols = encoded(&codec, text);
        let units = segmenter.split(&symbols);
        assert_eq!(units.len(), 5);
        assert_eq!(units.concat(), symbols);
    }

    #[test]
    fn empty_input_has_no_units() {
        let codec = ByteCodec::standard();
        let segmenter = Segmenter::new(SegmentationMode::AsciiWhitespace, &codec);
        assert!(segmenter.split("").is_empty());
    }

    #[test]
    fn unit_symbols_appends_marker() {
        let symbols: Vec<char> = unit_symbols("ab").collect();
        assert_eq!(symbols, vec!['a', 'b', END_OF_UNIT]);
    }

    #[test]
    fn mode_serializes_as_snake_case() {
        let json = serde_json::to_string(&SegmentationMode::AsciiWhitespace).expect("serialize");
        assert_eq!(json, "\"ascii_whitespace\"");
    }
}
