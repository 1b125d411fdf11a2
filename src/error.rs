use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions detected while building an episode. Nothing here is raised
/// mid-tick: out-of-map samples are classified, not reported.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("unknown track '{name}' (known tracks: {known})")]
    UnknownTrack { name: String, known: String },
    #[error("could not read asset {}: {source}", path.display())]
    MissingAsset {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type SimResult<T> = Result<T, SimError>;
