//! Error taxonomy.
//!
//! None of these are fatal to the host: catalog failures degrade to an empty
//! contribution, persistence failures to an empty (or unsaved) store.

use std::path::PathBuf;

use thiserror::Error;

/// A catalog source misbehaved while being queried.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("source `{source_name}` failed during {operation}: {message}")]
    Failed {
        source_name: String,
        operation: &'static str,
        message: String,
    },

    #[error("source `{source_name}` panicked during {operation}")]
    Panicked {
        source_name: String,
        operation: &'static str,
    },
}

/// Reading or writing the relevance snapshot failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("relevance file {} does not exist", path.display())]
    Missing { path: PathBuf },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoding relevance snapshot: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decoding relevance snapshot: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}
