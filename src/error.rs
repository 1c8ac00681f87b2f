use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RefgetError {
    #[error("input flatfile could not be located at the path: {0}")]
    MissingInput(String),

    #[error("incorrectly processed seq(s) in loader table: {0}")]
    IncompleteConversion(String),

    #[error("search request failed: {0}")]
    Transport(String),

    #[error("search endpoint returned status {status}: {message}")]
    TransportStatus { status: u16, message: String },

    #[error("malformed metadata record: {0}")]
    MalformedRecord(String),

    #[error("missing config file refget-loader.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("invalid window: {0}")]
    InvalidWindow(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("failed to parse status file: {0}")]
    StatusParse(String),

    #[error("status file changed on disk since it was loaded: {0}")]
    StatusConflict(String),

    #[error("command failed: {0}")]
    Subprocess(String),

    #[error("unsupported destination type: {0}")]
    UnsupportedDestination(String),
}
