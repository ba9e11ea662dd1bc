//! Pipeline error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline configuration, resource and execution errors.
#[derive(Error, Debug)]
pub enum Error {
    /// The module kind is not part of the registry.
    #[error("module `{module}`: unknown module kind `{kind}`")]
    UnknownModule { module: String, kind: String },

    /// A required input, output or parameter key is absent.
    #[error("module `{module}`: missing {section} key `{key}`")]
    MissingKey {
        module: String,
        section: &'static str,
        key: String,
    },

    /// Parameters or key sets are present but unusable.
    #[error("module `{module}`: {message}")]
    InvalidModule { module: String, message: String },

    /// A module reads a variable that nothing has produced.
    #[error("module `{module}` reads `{variable}`, which no earlier step produces")]
    UndefinedVariable { module: String, variable: String },

    /// A module needs the run registry but none was provided.
    #[error("module `{module}` needs a run registry, but none was provided")]
    MissingRegistry { module: String },

    /// Top-level configuration problem.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A transform rejected its data.
    #[error("module `{module}` failed: {source}")]
    Module {
        module: String,
        #[source]
        source: g4post_core::Error,
    },

    /// A geometry table or run registry could not be used.
    #[error("resource {}: {message}", .path.display())]
    Resource { path: PathBuf, message: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid(module: &str, message: impl Into<String>) -> Self {
        Self::InvalidModule {
            module: module.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn resource(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Resource {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Attaches the module name to a transform error.
    pub(crate) fn in_module(module: &str, source: g4post_core::Error) -> Self {
        match source {
            g4post_core::Error::MissingVariable(variable) => Self::UndefinedVariable {
                module: module.to_string(),
                variable,
            },
            source => Self::Module {
                module: module.to_string(),
                source,
            },
        }
    }

    /// True for errors caused by the configuration rather than the data.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::UnknownModule { .. }
                | Self::MissingKey { .. }
                | Self::InvalidModule { .. }
                | Self::UndefinedVariable { .. }
                | Self::MissingRegistry { .. }
                | Self::Config(_)
        )
    }
}
