//! Error types for agenda-cache
//!
//! All modules use `AgendaResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for agenda-cache operations
pub type AgendaResult<T> = Result<T, AgendaError>;

/// All errors that can occur in agenda-cache
#[derive(Error, Debug)]
pub enum AgendaError {
    // Construction errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Fetch errors
    #[error("Fetch failed for {resource}: {reason}")]
    Fetch { resource: String, reason: String },

    #[error("Resource not configured: {0}")]
    ResourceNotFound(String),

    // Cache errors
    #[error("Cache entry {key} is corrupt: {reason}")]
    CacheCorrupt { key: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgendaError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a fetch failure for a resource
    pub fn fetch(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ResourceNotFound(_) => {
                Some("Add it under [[download.resources]] or pass a full URL")
            }
            Self::ConfigInvalid { .. } => {
                Some("Fix the file, or reset it with: agenda-cache config init --force")
            }
            Self::Fetch { .. } => Some("Check connectivity and run the command again"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = AgendaError::fetch("keynote.pdf", "connection reset");
        assert_eq!(
            err.to_string(),
            "Fetch failed for keynote.pdf: connection reset"
        );
    }

    #[test]
    fn error_hint() {
        let err = AgendaError::ResourceNotFound("slides".to_string());
        assert!(err.hint().unwrap().contains("download.resources"));
        assert!(AgendaError::Internal("x".to_string()).hint().is_none());
    }
}
