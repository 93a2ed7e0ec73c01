//! Error types for Holdings
//!
//! All modules use `HoldingsResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Holdings operations
pub type HoldingsResult<T> = Result<T, HoldingsError>;

/// All errors that can occur in Holdings
#[derive(Error, Debug)]
pub enum HoldingsError {
    // Collection errors
    #[error("no collection for profile {profile}")]
    CollectionNotFound { profile: String },

    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("no dataset in collection with init ID {init_id:?}")]
    DatasetNotFound { init_id: String },

    // Event bus errors
    #[error("event bus is closed")]
    BusClosed,

    #[error("unexpected payload for topic {topic:?}")]
    UnexpectedPayload { topic: &'static str },

    #[error("event handler failed: {0}")]
    Handler(String),

    // Identity errors
    #[error("invalid profile ID {value:?}: {reason}")]
    InvalidProfileId { value: String, reason: String },

    // Snapshot decode errors
    #[error("malformed cache record: {reason}")]
    MalformedRecord { reason: String },

    #[error("malformed snapshot {path}: {reason}")]
    MalformedSnapshot { path: PathBuf, reason: String },

    #[error("collection path is not a directory: {0}")]
    NotADirectory(PathBuf),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

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
}

impl HoldingsError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check if error indicates a missing collection or dataset
    ///
    /// Callers may treat these as "start from empty" rather than failing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CollectionNotFound { .. } | Self::DatasetNotFound { .. }
        )
    }
}
