//! Byte-level byte pair encoding (BPE) for natural-language scripts.
//!
//! The crate learns a subword vocabulary from a line-oriented text corpus and then encodes
//! text to token ids and decodes ids back to text. Text is first mapped byte by byte onto
//! printable symbols, so any UTF-8 input (Odia, Latin, mixed) round-trips through a trained
//! model. A trained [`BpeModel`] persists as one self-describing JSON artifact.
//!
//! ```no_run
//! use script_bpe::{BpeModel, IngestConfig, Trainer, TrainerConfig};
//!
//! # fn main() -> script_bpe::Result<()> {
//! let trainer_cfg = TrainerConfig::builder()
//!     .target_vocab_size(4500)
//!     .min_frequency(2)
//!     .show_progress(false)
//!     .build()?;
//! let trainer = Trainer::new(trainer_cfg);
//! let artifacts = trainer.train_from_paths(&["/path/to/odia_corpus"], &IngestConfig::default())?;
//! artifacts.model.save("odia_bpe.json")?;
//!
//! let tokenizer = BpeModel::load("odia_bpe.json")?.tokenizer()?;
//! let ids = tokenizer.encode_ids("ଓଡ଼ିଆ ଭାଷା");
//! assert_eq!(tokenizer.decode_to_string(&ids), "ଓଡ଼ିଆ ଭାଷା");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::multiple_crate_versions
)]

pub mod bytes;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod segment;
pub mod serialization;
pub mod tokenizer;
pub mod trainer;
pub mod vocab;
pub mod word;

pub use bytes::ByteCodec;
pub use config::{IngestBuilder, IngestConfig, TrainerBuilder, TrainerConfig};
pub use engine::MergeEngine;
pub use error::{BpeError, Result};
pub use metrics::{
    compression_ratio, AcceptanceCriteria, AcceptanceOutcome, EvaluationReport, IterationMetrics,
    StopReason, TrainingMetrics,
};
pub use model::{BpeModel, MergeTable, ModelStats};
pub use segment::{SegmentationMode, Segmenter, END_OF_UNIT};
pub use tokenizer::{Decoded, Encoding, Tokenizer};
pub use trainer::{Trainer, TrainerArtifacts};
pub use vocab::{Pair, TokenId, Vocabulary};
pub use word::Word;
