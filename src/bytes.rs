//! Bijective mapping between raw bytes and the printable symbols the BPE engine works on.

use std::fmt;
use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use crate::error::{BpeError, Result};
use crate::segment::END_OF_UNIT;

/// Byte-to-symbol table together with its derived inverse.
///
/// Printable bytes (`!`..`~`, `¡`..`¬`, `®`..`ÿ`) map to their own code point. Every other byte
/// (control characters, space, NBSP, soft hyphen) is assigned `U+0100 + n` in ascending byte
/// order, so no byte ever becomes a whitespace or control character once encoded.
#[derive(Clone)]
pub struct ByteCodec {
    forward: [char; 256],
    reverse: FxHashMap<char, u8>,
}

fn standard_table() -> &'static [char; 256] {
    static TABLE: OnceLock<[char; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut forward = ['\0'; 256];
        let mut assigned = [false; 256];
        for byte in (b'!'..=b'~').chain(b'\xA1'..=b'\xAC').chain(b'\xAE'..=b'\xFF') {
            forward[byte as usize] = char::from(byte);
            assigned[byte as usize] = true;
        }
        let mut n = 0u32;
        for byte in 0u8..=255 {
            if assigned[byte as usize] {
                continue;
            }
            // 256 + n stays below U+0144 for the 68 remaining bytes.
            forward[byte as usize] = char::from_u32(256 + n).unwrap_or(char::REPLACEMENT_CHARACTER);
            n += 1;
        }
        forward
    })
}

impl ByteCodec {
    /// Returns the standard byte-level table.
    #[must_use]
    pub fn standard() -> Self {
        let forward = *standard_table();
        let reverse = forward
            .iter()
            .enumerate()
            .map(|(byte, &ch)| (ch, byte as u8))
            .collect();
        Self { forward, reverse }
    }

    /// Rebuilds a codec from a persisted forward table, deriving the inverse mapping.
    pub fn from_table(forward: [char; 256]) -> Result<Self> {
        let mut reverse = FxHashMap::default();
        for (byte, &ch) in forward.iter().enumerate() {
            if ch == END_OF_UNIT {
                return Err(BpeError::InvalidArtifact(format!(
                    "byte {byte} maps to the reserved end-of-unit marker"
                )));
            }
            if let Some(previous) = reverse.insert(ch, byte as u8) {
                return Err(BpeError::InvalidArtifact(format!(
                    "bytes {previous} and {byte} both map to U+{:04X}",
                    ch as u32
                )));
            }
        }
        Ok(Self { forward, reverse })
    }

    /// Returns the 256 forward entries indexed by byte value.
    #[must_use]
    pub fn table(&self) -> &[char; 256] {
        &self.forward
    }

    /// Returns the symbol standing in for `byte`.
    #[inline]
    #[must_use]
    pub fn encode_byte(&self, byte: u8) -> char {
        self.forward[byte as usize]
    }

    /// Returns the byte behind `symbol`, or `None` when the symbol is outside the codec's image.
    #[inline]
    #[must_use]
    pub fn decode_symbol(&self, symbol: char) -> Option<u8> {
        self.reverse.get(&symbol).copied()
    }

    /// Converts raw bytes into their symbol string.
    #[must_use]
    pub fn encode(&self, bytes: &[u8]) -> String {
        bytes.iter().map(|&b| self.encode_byte(b)).collect()
    }

    /// Converts a symbol string back into bytes.
    ///
    /// Returns `None` if any symbol is outside the codec's image; use
    /// [`ByteCodec::decode_symbol`] to substitute instead of failing.
    #[must_use]
    pub fn decode(&self, symbols: &str) -> Option<Vec<u8>> {
        symbols.chars().map(|ch| self.decode_symbol(ch)).collect()
    }
}

impl Default for ByteCodec {
    fn default() -> Self {
        Self::standard()
    }
}

impl PartialEq for ByteCodec {
    fn eq(&self, other: &Self) -> bool {
        self.forward == other.forward
    }
}

impl Eq for ByteCodec {}

impl fmt::Debug for ByteCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identity = self
            .forward
            .iter()
            .enumerate()
            .filter(|&(b, &c)| c as usize == b)
            .count();
        f.debug_struct("ByteCodec")
            .field("identity_entries", &identity)
            .field("remapped_entries", &(256 - identity))
            .finish()
    }
}

/// Returns `true` for the ASCII whitespace bytes we treat as delimiters.
#[inline]
#[must_use]
pub fn is_ascii_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C)
}
