//! Error types for content loading, packaging and validation

use std::path::PathBuf;
use thiserror::Error;

/// Result type for content operations
pub type Result<T> = std::result::Result<T, ContentError>;

/// Coarse grouping of [`ContentError`] variants.
///
/// Callers that only care about "what went wrong" (a CLI deciding its exit
/// message, a batch dump deciding whether to continue) match on this rather
/// than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A user path could not be turned into a content item file
    Resolve,
    /// A YAML or JSON file could not be loaded
    Parse,
    /// Writing, copying or unifying an output failed
    Serialize,
    /// Invalid user input or configuration
    Usage,
    /// Something that should not happen
    Internal,
    /// Plain filesystem or repository failure
    Io,
}

/// Content SDK errors
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("No file matching {expected} found in {}", path.display())]
    NotFound { path: PathBuf, expected: String },

    #[error("Multiple candidate files in {}: {}", path.display(), candidates.join(", "))]
    Ambiguous {
        path: PathBuf,
        candidates: Vec<String>,
    },

    #[error("{} is not a {expected} file", path.display())]
    WrongKind { path: PathBuf, expected: String },

    #[error("Cannot infer content kind for {}", path.display())]
    UnknownKind { path: PathBuf },

    #[error("Failed to parse YAML in {}: {source}", path.display())]
    YamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to parse JSON in {}: {source}", path.display())]
    JsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Top level of {} is not a mapping", path.display())]
    NotAMapping { path: PathBuf },

    #[error("Invalid version '{value}': {source}")]
    InvalidVersion {
        value: String,
        #[source]
        source: semver::Error,
    },

    #[error("Failed to write {}: {reason}", path.display())]
    Serialize { path: PathBuf, reason: String },

    #[error("Cannot unify {}: {reason}", path.display())]
    Unify { path: PathBuf, reason: String },

    #[error("{0}")]
    Usage(String),

    #[error("Duplicate validator error code: {0}")]
    DuplicateErrorCode(String),

    #[error("Invalid validator error code '{0}', expected two capital letters and three digits")]
    InvalidErrorCode(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("Deadline exceeded after {elapsed_ms} ms")]
    DeadlineExceeded { elapsed_ms: u128 },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

impl ContentError {
    /// The taxonomy bucket this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. }
            | Self::Ambiguous { .. }
            | Self::WrongKind { .. }
            | Self::UnknownKind { .. } => ErrorKind::Resolve,
            Self::YamlParse { .. }
            | Self::JsonParse { .. }
            | Self::NotAMapping { .. }
            | Self::InvalidVersion { .. } => ErrorKind::Parse,
            Self::Serialize { .. } | Self::Unify { .. } => ErrorKind::Serialize,
            Self::Usage(_)
            | Self::DuplicateErrorCode(_)
            | Self::InvalidErrorCode(_)
            | Self::Config(_) => ErrorKind::Usage,
            Self::DeadlineExceeded { .. } | Self::Internal(_) => ErrorKind::Internal,
            Self::Io(_) | Self::Git(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn serialize(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Serialize {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unify(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Unify {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let err = ContentError::NotFound {
            path: PathBuf::from("Packs/Acme"),
            expected: "*.yml".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Resolve);
        assert!(err.to_string().contains("Packs/Acme"));

        assert_eq!(ContentError::Usage("bad".into()).kind(), ErrorKind::Usage);
        assert_eq!(
            ContentError::serialize("out/a.yml", "disk full").kind(),
            ErrorKind::Serialize
        );
    }
}
