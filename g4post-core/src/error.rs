//! Error types for g4post-core.

use thiserror::Error;

/// Result type alias for g4post operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for ragged-array operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Co-indexed arrays disagree in length at some nesting level.
    #[error("length mismatch in {context}: {left} vs {right}")]
    LengthMismatch {
        context: &'static str,
        left: usize,
        right: usize,
    },

    /// Co-indexed arrays disagree in nesting structure.
    #[error("misaligned arrays: {0}")]
    Misaligned(String),

    /// A column has the wrong element type for the requested operation.
    #[error("expected a {expected} column, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A float value cannot be used as an integer id.
    #[error("non-integral value {0} in an integer column")]
    NonIntegral(f64),

    /// A named variable is not present in the processing context.
    #[error("variable `{0}` not found in processing context")]
    MissingVariable(String),
}

impl Error {
    /// Builds a [`Error::Misaligned`] from anything printable.
    pub fn misaligned(message: impl Into<String>) -> Self {
        Self::Misaligned(message.into())
    }
}

/// Returns an error unless two lengths agree.
///
/// # Errors
/// Returns [`Error::LengthMismatch`] when `left != right`.
pub fn ensure_same_len(context: &'static str, left: usize, right: usize) -> Result<()> {
    if left == right {
        Ok(())
    } else {
        Err(Error::LengthMismatch {
            context,
            left,
            right,
        })
    }
}
