use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single pipeline stage or collaborator call.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("story generation failed: {0}")]
    Generation(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("video composition failed: {0}")]
    Composition(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("channel {channel} is not configured: {reason}")]
    Configuration { channel: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the durable upload-counter storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("counter file {path} holds unreadable contents {contents:?}")]
    Corrupt { path: PathBuf, contents: String },

    #[error("counter key {0:?} cannot be used as a file name")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("'{0}' is not a valid IANA timezone")]
    InvalidTimezone(String),

    #[error("channel key '{0}' is configured more than once")]
    DuplicateChannel(String),
}
