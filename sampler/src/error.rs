use std::path::PathBuf;

/// Failures of the decode capability. Reported to the control context only;
/// the currently published sample is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported audio in {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    #[error("codec error in {path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: symphonia::core::errors::Error,
    },

    #[error("no sample rate reported for {0}")]
    MissingSampleRate(PathBuf),
}

/// Returned by `Voice::start` when the bound recording has no frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("recording has no frames")]
pub struct EmptySampleError;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A newer load request published before this one finished.
    #[error("load of {0} was superseded by a newer request")]
    Superseded(PathBuf),
}

/// Errors pushing messages from the control context to the render path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("render queue is full")]
    QueueFull,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
