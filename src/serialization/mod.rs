//! Persistence of trained models as JSON artifacts.

pub mod artifact;

pub use artifact::{
    from_json, from_slice, load_artifact, save_artifact, to_json, ARTIFACT_FORMAT,
    ARTIFACT_VERSION,
};
