use std::path::PathBuf;

use thiserror::Error;

use crate::types::Stem;

/// Central error type for the stembler-core crate.
#[derive(Debug, Error)]
pub enum StemError {
    // Generic fallback (wraps anyhow)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),

    // Stage-specific variants
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Separation(#[from] SeparationError),

    #[error(transparent)]
    Enhance(#[from] EnhanceError),

    #[error(transparent)]
    Organize(#[from] OrganizeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not determine the platform configuration directory")]
    ConfigDirUnavailable,

    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Problems with the raw input string or the local file it names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Input path is empty")]
    Empty,

    #[error("File does not exist: {0}")]
    NotFound(PathBuf),

    #[error("Path is not a file: {0}")]
    NotAFile(PathBuf),

    #[error("Unsupported format: {extension}. Supported: {supported}")]
    UnsupportedFormat {
        extension: String,
        supported: String,
    },

    #[error("File is not readable: {0}")]
    Unreadable(PathBuf),

    #[error("Invalid or unsupported input: {0}")]
    InvalidReference(String),
}

/// Failures while turning a remote or streaming reference into a local file.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Spotify credentials not configured: {0}")]
    MissingCredentials(String),

    #[error("Spotify credentials were rejected: {0}")]
    InvalidCredentials(String),

    #[error(
        "Song with track ID '{track_id}' is not available for download due to copyright \
         restrictions or is blocked on all audio platforms. Try a different song or use a \
         local file instead."
    )]
    ContentUnavailable { track_id: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("URL does not appear to be an audio file: {0}")]
    NotAudio(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the external separation engine.
#[derive(Debug, Error)]
pub enum SeparationError {
    #[error("Audio file not found: {0}")]
    MissingInput(PathBuf),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch separation engine `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Demucs separation failed (exit code {code:?}): {stderr}")]
    EngineFailed { code: Option<i32>, stderr: String },

    #[error("Separation engine did not produce stems: {}", join_stems(.missing))]
    MissingStems { missing: Vec<Stem> },
}

/// Per-stem enhancement failures. Never fatal to a pipeline run.
#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Invalid audio data: {0}")]
    InvalidAudio(String),

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// Output directory and metadata failures.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Coarse error families a presentation layer maps to user-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Input,
    Credentials,
    ContentUnavailable,
    Network,
    Disk,
    Engine,
    Memory,
    Unexpected,
}

impl StemError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StemError::Input(_) => ErrorCategory::Input,
            StemError::Acquisition(e) => match e {
                AcquisitionError::MissingCredentials(_) | AcquisitionError::InvalidCredentials(_) => {
                    ErrorCategory::Credentials
                }
                AcquisitionError::ContentUnavailable { .. } => ErrorCategory::ContentUnavailable,
                AcquisitionError::Network(_) => ErrorCategory::Network,
                AcquisitionError::NotAudio(_) => ErrorCategory::Input,
                AcquisitionError::Download(_) => ErrorCategory::Network,
                AcquisitionError::Launch { .. } => ErrorCategory::Engine,
            },
            StemError::Separation(e) => match e {
                SeparationError::MissingInput(_) | SeparationError::UnsupportedFormat(_) => {
                    ErrorCategory::Input
                }
                SeparationError::OutputDir { .. } => ErrorCategory::Disk,
                SeparationError::EngineFailed { stderr, .. } if mentions_memory(stderr) => {
                    ErrorCategory::Memory
                }
                _ => ErrorCategory::Engine,
            },
            StemError::Enhance(_) => ErrorCategory::Unexpected,
            StemError::Organize(_)
            | StemError::Io(_)
            | StemError::ConfigDirUnavailable
            | StemError::Settings(_) => ErrorCategory::Disk,
            StemError::Anyhow(_) => ErrorCategory::Unexpected,
        }
    }
}

fn mentions_memory(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("out of memory") || lower.contains("memoryerror")
}

fn join_stems(stems: &[Stem]) -> String {
    stems
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, StemError>;
