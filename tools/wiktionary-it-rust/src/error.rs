//! Error types for the extractor.
//!
//! Markup problems inside a page never surface here: a malformed field just
//! stays empty. These variants cover the host side (files, lookup tables,
//! serialization) and the one fatal per-page condition.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of the lexicon failed.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML config or lookup file could not be parsed.
    #[error("YAML parsing failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A language table file had no usable header or columns.
    #[error("Invalid language table {}: {reason}", .path.display())]
    LangTable { path: PathBuf, reason: String },

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The line loop of a single page failed unexpectedly.
    #[error("Failed to parse page '{title}': {message}")]
    PageFailed { title: String, message: String },
}

pub type Result<T> = std::result::Result<T, ExtractError>;
