//! Self-describing JSON artifact holding everything needed to rebuild a tokenizer.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::bytes::ByteCodec;
use crate::engine::MergeEngine;
use crate::error::{BpeError, Result};
use crate::model::{BpeModel, MergeTable};
use crate::segment::{SegmentationMode, END_OF_UNIT};
use crate::vocab::{TokenId, Vocabulary};

/// Value of the `format` field identifying artifacts written by this crate.
pub const ARTIFACT_FORMAT: &str = "script-bpe";
/// Current artifact layout version.
pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Artifact {
    format: String,
    version: u32,
    target_vocab_size: usize,
    segmentation: SegmentationMode,
    end_of_unit: char,
    vocab: BTreeMap<String, TokenId>,
    merges: Vec<(String, String)>,
    byte_encoder: BTreeMap<u8, char>,
}

impl Artifact {
    fn from_model(model: &BpeModel) -> Self {
        Self {
            format: ARTIFACT_FORMAT.to_string(),
            version: ARTIFACT_VERSION,
            target_vocab_size: model.target_vocab_size(),
            segmentation: model.segmentation(),
            end_of_unit: END_OF_UNIT,
            vocab: model
                .vocab()
                .iter()
                .map(|(id, token)| (token.to_owned(), id))
                .collect(),
            merges: model.merges().pairs().to_vec(),
            byte_encoder: model
                .byte_codec()
                .table()
                .iter()
                .enumerate()
                .map(|(byte, &symbol)| (byte as u8, symbol))
                .collect(),
        }
    }

    fn into_model(self) -> Result<BpeModel> {
        if self.format != ARTIFACT_FORMAT {
            return Err(BpeError::InvalidArtifact(format!(
                "unexpected format {:?}",
                self.format
            )));
        }
        if self.version != ARTIFACT_VERSION {
            return Err(BpeError::InvalidArtifact(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.end_of_unit != END_OF_UNIT {
            return Err(BpeError::InvalidArtifact(format!(
                "end-of-unit marker U+{:04X} does not match U+{:04X}",
                self.end_of_unit as u32, END_OF_UNIT as u32
            )));
        }

        let byte_codec = rebuild_codec(&self.byte_encoder)?;
        let vocab = rebuild_vocab(self.vocab)?;
        let merges = MergeTable::from(self.merges);
        // Resolving the engine checks every operand and result against the vocabulary.
        let engine = MergeEngine::new(&vocab, &merges)?;
        debug!(
            "artifact validated: {} tokens, {} ranked pairs",
            vocab.len(),
            engine.len()
        );

        Ok(BpeModel::new(
            self.target_vocab_size,
            vocab,
            merges,
            byte_codec,
            self.segmentation,
        ))
    }
}

fn rebuild_codec(entries: &BTreeMap<u8, char>) -> Result<ByteCodec> {
    if entries.len() != 256 {
        return Err(BpeError::InvalidArtifact(format!(
            "byte_encoder has {} entries, expected 256",
            entries.len()
        )));
    }
    let mut forward = ['\0'; 256];
    for (&byte, &symbol) in entries {
        forward[byte as usize] = symbol;
    }
    ByteCodec::from_table(forward)
}

fn rebuild_vocab(entries: BTreeMap<String, TokenId>) -> Result<Vocabulary> {
    let mut slots: Vec<Option<String>> = vec![None; entries.len()];
    for (token, id) in entries {
        let slot = slots.get_mut(id as usize).ok_or_else(|| {
            BpeError::InvalidArtifact(format!(
                "token {token:?} has id {id} outside the dense range"
            ))
        })?;
        if slot.is_some() {
            return Err(BpeError::InvalidArtifact(format!(
                "id {id} is assigned to more than one token"
            )));
        }
        *slot = Some(token);
    }
    // With every id in range and none repeated, all slots are filled.
    Vocabulary::from_tokens(slots.into_iter().flatten())
}

/// Serialises `model` to a JSON string.
pub fn to_json(model: &BpeModel, pretty: bool) -> Result<String> {
    let artifact = Artifact::from_model(model);
    let json = if pretty {
        serde_json::to_string_pretty(&artifact)?
    } else {
        serde_json::to_string(&artifact)?
    };
    Ok(json)
}

/// Parses and validates a model from a JSON string.
pub fn from_json(json: &str) -> Result<BpeModel> {
    let artifact: Artifact = serde_json::from_str(json)?;
    artifact.into_model()
}

/// Parses and validates a model from raw JSON bytes.
pub fn from_slice(bytes: &[u8]) -> Result<BpeModel> {
    let artifact: Artifact = serde_json::from_slice(bytes)?;
    artifact.into_model()
}

/// Writes `model` to `path` as a JSON artifact.
pub fn save_artifact<P: AsRef<Path>>(model: &BpeModel, path: P, pretty: bool) -> Result<()> {
    let path = path.as_ref();
    let json = to_json(model, pretty)?;
    fs::write(path, json).map_err(|err| BpeError::io(err, Some(path.to_path_buf())))?;
    debug!(
        "saved artifact with {} tokens to {}",
        model.vocab_size(),
        path.display()
    );
    Ok(())
}

/// Reads and validates a JSON artifact from `path`.
pub fn load_artifact<P: AsRef<Path>>(path: P) -> Result<BpeModel> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| BpeError::io(err, Some(path.to_path_buf())))?;
    let model = from_slice(&bytes)?;
    debug!(
        "loaded artifact with {} tokens from {}",
        model.vocab_size(),
        path.display()
    );
    Ok(model)
}
