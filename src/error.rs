use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the dataset that callers need to tell apart.
///
/// They travel inside `anyhow::Error`; use `downcast_ref::<DatasetError>()` to inspect them.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("catalog file {path} cannot be read: {source}")]
    CatalogMissing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("catalog file {path} is malformed: {reason}")]
    CatalogMalformed { path: PathBuf, reason: String },

    #[error("catalog contains no actors")]
    EmptyCatalog,

    #[error("actor {actor} appears more than once in the catalog")]
    DuplicateActor { actor: String },

    #[error("actor {actor} has no images")]
    EmptyActor { actor: String },

    #[error("actor index {index} out of range for {len} actors")]
    ActorIndexOutOfRange { index: usize, len: usize },

    #[error("cannot sample {requested} images from actor {actor}: only {available} available")]
    NotEnoughImages {
        actor: String,
        requested: usize,
        available: usize,
    },

    #[error("parameter file {path} cannot be read: {reason}")]
    ParamsMissing { path: PathBuf, reason: String },

    #[error("parameter array `{field}` needs at least {expected} values, found {actual}")]
    ParamsShape {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid dataset configuration: {0}")]
    InvalidConfig(String),

    #[error("detector output has an unexpected shape: {0}")]
    DetectionShape(String),

    #[error("image {path} cannot be decoded")]
    ImageUnreadable { path: PathBuf },

    #[error("selected face has no keypoints and the aligner has no bounding box fallback")]
    MissingKeypoints,

    #[error("landmark model found no face in {image}")]
    NoLandmarks { image: String },

    #[error("landmark sets of a sample differ in shape: {0}")]
    LandmarkShape(String),
}
