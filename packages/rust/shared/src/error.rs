//! Error types for Kiln.
//!
//! Library crates use [`KilnError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::process::ExitStatus;

/// Top-level error type for all Kiln operations.
#[derive(Debug, thiserror::Error)]
pub enum KilnError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An external tool could not be located before spawning.
    #[error("{tool} not found at {path:?}")]
    ToolNotFound { tool: String, path: PathBuf },

    /// A pipeline stage failed to start.
    #[error("failed to start stage {stage} ({program}): {source}")]
    Spawn {
        stage: usize,
        program: String,
        source: std::io::Error,
    },

    /// A pipeline stage exited unsuccessfully.
    #[error("stage {stage} ({program}) failed: {status}")]
    StageFailed {
        stage: usize,
        program: String,
        status: ExitStatus,
    },

    /// Reading from or writing to a pipeline stream failed.
    #[error("pipe I/O error: {0}")]
    PipeIo(std::io::Error),

    /// Bundle manifest could not be read or decoded.
    #[error("bad manifest {path:?}: {message}")]
    Manifest { path: PathBuf, message: String },

    /// Malformed or unknown source directive.
    #[error("directive error in {path:?}: {message}")]
    Directive { path: PathBuf, message: String },

    /// A source kind reached a builder that has no recipe for it.
    #[error("no build recipe for {kind} ({path:?})")]
    UnsupportedKind { kind: String, path: PathBuf },

    /// Data validation error (bad level name, bad path, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The content root lock was poisoned by a panicking holder.
    #[error("content roots lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KilnError>;

/// Coarse failure class, used to keep failure kinds distinct in logs
/// even when they map to the same HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Failed before any process was spawned.
    Construction,
    /// A stage failed or a pipe broke while running.
    Execution,
    /// Directive expansion failed.
    Directive,
    /// Configuration or filesystem trouble outside a pipeline.
    Environment,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Construction => "construction",
            Self::Execution => "execution",
            Self::Directive => "directive",
            Self::Environment => "environment",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl KilnError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
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

    /// Create a manifest error for the given manifest file.
    pub fn manifest(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a directive error for the given source file.
    pub fn directive(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Directive {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Which failure class this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ToolNotFound { .. }
            | Self::Spawn { .. }
            | Self::Manifest { .. }
            | Self::UnsupportedKind { .. } => ErrorClass::Construction,
            Self::StageFailed { .. } | Self::PipeIo(_) => ErrorClass::Execution,
            Self::Directive { .. } => ErrorClass::Directive,
            Self::Config { .. } | Self::Io { .. } | Self::Validation { .. } | Self::LockPoisoned => {
                ErrorClass::Environment
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = KilnError::config("missing [tools] section");
        assert_eq!(err.to_string(), "config error: missing [tools] section");

        let err = KilnError::directive("app.main.js", "undefined directive: bundle");
        assert!(err.to_string().contains("undefined directive: bundle"));
    }

    #[test]
    fn errors_are_classified() {
        let spawn = KilnError::Spawn {
            stage: 1,
            program: "jsx".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "nope"),
        };
        assert_eq!(spawn.class(), ErrorClass::Construction);
        assert_eq!(
            KilnError::PipeIo(std::io::Error::other("broken")).class(),
            ErrorClass::Execution
        );
        assert_eq!(
            KilnError::directive("a.js", "bad").class(),
            ErrorClass::Directive
        );
        assert_eq!(KilnError::LockPoisoned.class(), ErrorClass::Environment);
    }
}
