//! I/O error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// The input file lacks a branch the configuration maps.
    #[error("{}: missing branch `{branch}`", .path.display())]
    MissingBranch { path: PathBuf, branch: String },

    /// The file extension names no supported container.
    #[error("unsupported container `{0}`")]
    UnsupportedContainer(String),

    /// Worker pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(String),

    /// Available memory could not be determined.
    #[error("memory sizing error: {0}")]
    Memory(String),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] g4post_core::Error),

    /// Pipeline error.
    #[error(transparent)]
    Pipeline(#[from] g4post_pipeline::Error),

    /// JSON container error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HDF5 container error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl Error {
    /// True for errors caused by the configuration rather than a file's data.
    #[must_use]
    pub fn is_config(&self) -> bool {
        match self {
            Self::Pipeline(e) => e.is_config(),
            Self::UnsupportedContainer(_) | Self::ThreadPool(_) => true,
            _ => false,
        }
    }
}
