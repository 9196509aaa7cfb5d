use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::defaults::DEFAULT_TIMESTAMP_PATTERN;
use crate::errors::{Result, RollError};
use crate::ranker::RankKey;

pub const FEED_SUFFIX: &str = "feed";
pub const SEARCH_SUFFIX: &str = "search";
pub const ROLL_SUFFIX: &str = "roll";
pub const CLOSED_SUFFIX: &str = "closed";

/// Characters a cluster refuses in index names, plus the ones that break URLs.
const FORBIDDEN_PREFIX_CHARS: &str = "\\/*?\"<>|,#: ";

/// One rotation of an index series.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationRequest {
    pub index_prefix: String,
    pub max_roll_indices: usize,
    pub max_search_indices: usize,
    #[serde(default)]
    pub delete_after_roll: bool,
    #[serde(default = "default_close_after_roll")]
    pub close_after_roll: bool,
    #[serde(default = "default_timestamp_pattern")]
    pub timestamp_pattern: String,
    /// Creation payload handed to the store untouched (settings, mappings...).
    #[serde(default)]
    pub new_index_spec: Value,
}

fn default_close_after_roll() -> bool {
    true
}

fn default_timestamp_pattern() -> String {
    DEFAULT_TIMESTAMP_PATTERN.to_string()
}

impl RotationRequest {
    pub fn new(index_prefix: impl Into<String>, max_roll_indices: usize, max_search_indices: usize) -> Self {
        Self {
            index_prefix: index_prefix.into(),
            max_roll_indices,
            max_search_indices,
            delete_after_roll: false,
            close_after_roll: default_close_after_roll(),
            timestamp_pattern: default_timestamp_pattern(),
            new_index_spec: Value::Object(Default::default()),
        }
    }

    pub fn delete_after_roll(mut self, delete: bool) -> Self {
        self.delete_after_roll = delete;
        self
    }

    pub fn close_after_roll(mut self, close: bool) -> Self {
        self.close_after_roll = close;
        self
    }

    pub fn timestamp_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.timestamp_pattern = pattern.into();
        self
    }

    pub fn new_index_spec(mut self, spec: Value) -> Self {
        self.new_index_spec = spec;
        self
    }

    /// Checks the prefix and the retention counts. Must pass before any store call is made.
    pub fn validate(&self) -> Result<()> {
        if self.index_prefix.is_empty() {
            return Err(RollError::InvalidRetentionConfig("indexPrefix missing".to_string()));
        }
        if let Some(bad) = self.index_prefix.chars().find(|c| FORBIDDEN_PREFIX_CHARS.contains(*c)) {
            return Err(RollError::InvalidRetentionConfig(format!(
                "indexPrefix '{}' must not contain '{}'",
                self.index_prefix, bad
            )));
        }
        if self.index_prefix.starts_with(['_', '-', '+']) {
            return Err(RollError::InvalidRetentionConfig(format!(
                "indexPrefix '{}' must not start with '_', '-' or '+'",
                self.index_prefix
            )));
        }
        if self.max_roll_indices < 1 || self.max_search_indices < 1 {
            return Err(RollError::InvalidRetentionConfig(
                "remaining indices, search indices and feeding indices must be at least 1".to_string(),
            ));
        }
        if self.max_search_indices > self.max_roll_indices {
            return Err(RollError::InvalidRetentionConfig(format!(
                "rollIndices ({}) must be higher or equal to searchIndices ({})",
                self.max_roll_indices, self.max_search_indices
            )));
        }
        Ok(())
    }

    pub fn aliases(&self) -> AliasNames {
        AliasNames::for_prefix(&self.index_prefix)
    }
}

/// The four alias names derived from an index prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasNames {
    pub feed: String,
    pub search: String,
    pub roll: String,
    pub closed: String,
}

impl AliasNames {
    pub fn for_prefix(prefix: &str) -> Self {
        Self {
            feed: format!("{}_{}", prefix, FEED_SUFFIX),
            search: format!("{}_{}", prefix, SEARCH_SUFFIX),
            roll: format!("{}_{}", prefix, ROLL_SUFFIX),
            closed: format!("{}_{}", prefix, CLOSED_SUFFIX),
        }
    }
}

/// An existing member of the series, as discovered through the roll alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub name: String,
    pub rank_key: RankKey,
}

/// Report of what a rotation did. On failure this holds what was applied so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationResult {
    pub created_index: String,
    pub deleted_indices: Vec<String>,
    pub closed_indices: Vec<String>,
    pub alias_removed_indices: Vec<String>,
}
