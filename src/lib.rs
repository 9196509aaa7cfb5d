//! Rolling Index
//!
//! Time-partitioned index series for search clusters: every rotation creates a
//! new `<prefix>_<timestamp>` index, re-points the feed/search/roll aliases and
//! retires the oldest generations by closing, deleting or marking them.

pub mod api;
pub mod config;
pub mod cron;
pub mod model;
pub mod pattern;
pub mod ranker;
pub mod roller;
pub mod scheduler;
pub mod store;

pub use model::*;
pub use roller::IndexRoller;
pub use store::{IndexStore, StoreError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    pub const DEFAULT_TIMESTAMP_PATTERN: &str = "yyyy-MM-dd-HH-mm";
    pub const DEFAULT_ROLL_INDICES: usize = 1;
    pub const DEFAULT_SEARCH_INDICES: usize = 1;
    pub const DEFAULT_SHARDS: u32 = 2;
    pub const DEFAULT_REPLICAS: u32 = 1;
    pub const DEFAULT_REFRESH: &str = "10s";
}

/// Error types for index rotation
pub mod errors {
    use crate::model::RotationResult;
    use crate::store::StoreError;

    pub type Result<T> = std::result::Result<T, RollError>;

    #[derive(Debug, thiserror::Error)]
    pub enum RollError {
        #[error("Invalid retention config: {0}")]
        InvalidRetentionConfig(String),

        #[error("Invalid timestamp pattern '{pattern}': {reason}")]
        InvalidTimestampPattern { pattern: String, reason: String },

        #[error("Invalid cron schedule '{expr}': {reason}")]
        InvalidSchedule { expr: String, reason: String },

        #[error("Indices with the identical date are not supported! {first} vs. {second}")]
        DuplicateGenerationTime { first: String, second: String },

        #[error("Index store unavailable: {message}")]
        StoreUnavailable {
            message: String,
            partial: Box<RotationResult>,
        },

        #[error("Index store rejected request: {message}")]
        StoreRejected {
            message: String,
            partial: Box<RotationResult>,
        },
    }

    impl RollError {
        /// Wraps a failed store call together with the mutations already applied.
        pub fn from_store(err: StoreError, partial: &RotationResult) -> Self {
            let partial = Box::new(partial.clone());
            match err {
                StoreError::Unavailable(message) => RollError::StoreUnavailable { message, partial },
                other => RollError::StoreRejected {
                    message: other.to_string(),
                    partial,
                },
            }
        }

        /// The partially applied result, if the failure happened mid-rotation.
        pub fn partial(&self) -> Option<&RotationResult> {
            match self {
                RollError::StoreUnavailable { partial, .. }
                | RollError::StoreRejected { partial, .. } => Some(partial),
                _ => None,
            }
        }
    }
}
