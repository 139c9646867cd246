//! Error types for the decision engine.
//!
//! Only the fallible edges of this crate surface [`DecisionError`]: loading
//! configuration from a store and building a classifier from a custom rule
//! table.  The decision path itself is total and degrades instead of failing.

/// Unified error type for the decision crate.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    // -- Configuration store -------------------------------------------------
    /// The persistent configuration store could not be reached.
    #[error("config store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    /// A stored configuration value could not be interpreted.
    #[error("invalid config value for `{key}`: {value}")]
    InvalidConfigValue { key: String, value: String },

    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),

    // -- Classifier ----------------------------------------------------------
    /// A regex pattern supplied to the classifier is invalid.
    #[error("invalid classifier pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Convenience alias used throughout the decision crate.
pub type Result<T> = std::result::Result<T, DecisionError>;

impl From<tokio::task::JoinError> for DecisionError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
