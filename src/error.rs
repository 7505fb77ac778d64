//! Error types for loading the district and market sources

use std::path::PathBuf;

use thiserror::Error;

/// Why the startup load could not produce a dataset.
///
/// Every variant is recovered by [`crate::data::load`], which logs it and
/// falls back to an empty dataset.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file is missing or unreadable.
    #[error("source unavailable: {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file was read but could not be parsed, or lacks a required field.
    #[error("malformed source: {path}: {reason}")]
    MalformedSource { path: PathBuf, reason: String },

    /// Two boundary features normalize to the same district name.
    #[error("duplicate district in geometry source: {district}")]
    DuplicateDistrict { district: String },
}

impl LoadError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::MalformedSource {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
