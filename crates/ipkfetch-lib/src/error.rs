use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IpkFetchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation failed: {details}")]
    ConfigValidation { details: String },

    #[error("Invalid command line arguments: {details}")]
    CliArgumentValidation { details: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Package index error: {0}")]
    Index(#[from] crate::index::IndexError),

    #[error("Failed to fetch package index from {url}: {reason}")]
    IndexFetch { url: String, reason: String },

    #[error("Download directory creation failed at {path}: {reason}")]
    DownloadDirectoryCreation { path: PathBuf, reason: String },

    #[error("Failed to prepare destination {path}: {reason}")]
    DestinationSetup { path: PathBuf, reason: String },

    #[error("Failed to write report to {path}: {reason}")]
    ReportWrite { path: PathBuf, reason: String },

    #[error("{} package(s) failed: {}", .failed.len(), .failed.join(", "))]
    PartialFailure { failed: Vec<String> },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(#[from] eyre::Report),
}
