//! Error types for definition compilation and version management

use thiserror::Error;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Library errors.
///
/// Validation problems are never reported through this type; they are
/// collected as [`crate::diagnostics::Diagnostic`]s instead.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Malformed placeholder '{token}' at {path}: {reason}")]
    Syntax {
        token: String,
        path: String,
        reason: String,
    },

    #[error("Cannot compile definition at {path}: {reason}")]
    Compilation { path: String, reason: String },

    #[error("Version {version} already exists and is immutable")]
    VersionConflict { version: String },

    #[error("Version {version} is being written by another process (lock file {lock})")]
    Locked { version: String, lock: String },

    #[error("Project for '{name}' is already registered")]
    AlreadyRegistered { name: String },

    #[error("Not found: {name} version {version}")]
    NotFound { name: String, version: String },

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),
}

impl SchemaError {
    pub(crate) fn compilation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Compilation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised while turning a definition into a schema tree
    pub fn is_compilation_error(&self) -> bool {
        matches!(self, Self::Syntax { .. } | Self::Compilation { .. })
    }
}
