use std::path::PathBuf;

use thiserror::Error;

use crate::types::SourceType;

/// Central error type for the stem-packer-core crate.
#[derive(Debug, Error)]
pub enum PackError {
    // Generic fallback (wraps anyhow)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),

    // Domain-specific variants
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Track `{0}` not found in catalog")]
    TrackNotFound(String),

    #[error("Track `{track}` has no `{stem}` stem")]
    StemNotFound { track: String, stem: SourceType },

    #[error("Track `{track}` is missing required stem `{stem}`")]
    MissingRequiredStem { track: String, stem: SourceType },

    #[error("Resampling failed: {0}")]
    Transform(String),

    #[error("Failed to decode {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Track `{track}`: `{stem}` has shape {got:?}, expected {expected:?}")]
    InconsistentShape {
        track: String,
        stem: SourceType,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record {path:?}: {reason}")]
    Container { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Packing `{track}` failed: {reason}")]
    TrackFailed { track: String, reason: String },
}

impl PackError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn container(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PackError::Container {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for the one error a track may tolerate: an absent optional stem.
    pub fn is_stem_not_found(&self) -> bool {
        matches!(self, PackError::StemNotFound { .. })
    }
}

// --- Implement From conversions for common errors ---
impl From<std::io::Error> for PackError {
    fn from(e: std::io::Error) -> Self {
        PackError::Anyhow(e.into())
    }
}

impl From<serde_json::Error> for PackError {
    fn from(e: serde_json::Error) -> Self {
        PackError::Anyhow(e.into())
    }
}

impl From<hound::Error> for PackError {
    fn from(e: hound::Error) -> Self {
        PackError::Anyhow(e.into())
    }
}

impl From<rubato::ResampleError> for PackError {
    fn from(e: rubato::ResampleError) -> Self {
        PackError::Transform(e.to_string())
    }
}

impl From<rubato::ResamplerConstructionError> for PackError {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        PackError::Transform(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PackError>;
