use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a [`DocumentSource`](crate::parse::DocumentSource) backend.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to load document {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("page {index} is out of range (document has {count} pages)")]
    PageOutOfRange { index: usize, count: usize },

    #[error("failed to read page {index}: {source}")]
    Page {
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize block: {0}")]
    Serialize(#[source] io::Error),
}

/// Per-block failures. These never abort the document run.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("destination {dir} is unavailable: {source}")]
    DestinationUnavailable {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Serialize(#[from] SourceError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures that end a document run and surface to the caller.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("document {path} is unreadable after {attempts} attempt(s): {source}")]
    UnreadableDocument {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: SourceError,
    },

    #[error("overlay image {path} is unreadable: {source}")]
    OverlayUnreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to archive {path} into {target}: {source}")]
    ArchiveFailure {
        path: PathBuf,
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to expand path {value:?}: {reason}")]
    Expand { value: String, reason: String },

    #[error("invalid identifier pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
