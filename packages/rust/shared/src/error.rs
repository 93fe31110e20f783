//! Error types for Filesmith.
//!
//! Library crates use [`FilesmithError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Boxed error raised by a plugin. Kept opaque so callers can downcast to
/// whatever the plugin produced.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all Filesmith operations.
#[derive(Debug, thiserror::Error)]
pub enum FilesmithError {
    /// Invalid configuration value (accessor argument or config document).
    #[error("{message}")]
    Config { message: String },

    /// Malformed front-matter block in a source file.
    #[error("invalid front matter in the file at {path:?}: {message}")]
    FrontMatter { path: PathBuf, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Whatever a plugin raised, rejected with, or signalled. Displayed
    /// and sourced exactly as the plugin produced it.
    #[error(transparent)]
    Plugin(BoxError),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FilesmithError>;

impl FilesmithError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a front-matter error for the file at `path`.
    pub fn front_matter(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::FrontMatter {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a plugin error without altering it.
    pub fn plugin(err: impl Into<BoxError>) -> Self {
        Self::Plugin(err.into())
    }

    /// Borrow the original plugin error, if this is one.
    pub fn as_plugin(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Plugin(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
