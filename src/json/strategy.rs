//! Comparison strategies that turn message content into a similarity key.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::config::DEFAULT_EXCLUDE_FIELDS;
use crate::json::canonical::{looks_like_json, normalize_excluding_fields};
use crate::json::key_cache::KeyCache;

/// Policy turning content into a similarity key. Two contents with equal
/// keys are eligible to be condensed into one envelope.
pub trait ComparisonStrategy: Send + Sync {
    fn comparison_key(&self, content: &str) -> String;
}

impl<F> ComparisonStrategy for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn comparison_key(&self, content: &str) -> String {
        self(content)
    }
}

/// JSON comparison strategy that ignores the configured fields, typically
/// timestamps. Keeps a bounded key cache to avoid re-parsing identical
/// content.
pub struct FieldExclusionStrategy {
    exclude_fields: HashSet<String>,
    key_cache: Mutex<KeyCache>,
}

impl FieldExclusionStrategy {
    pub fn new(exclude_fields: HashSet<String>) -> Self {
        Self {
            exclude_fields,
            key_cache: Mutex::new(KeyCache::default()),
        }
    }

    /// Strategy that excludes the common timestamp field spellings.
    pub fn excluding_timestamps() -> Self {
        Self::new(DEFAULT_EXCLUDE_FIELDS.iter().map(|s| s.to_string()).collect())
    }

    pub fn builder() -> FieldExclusionStrategyBuilder {
        FieldExclusionStrategyBuilder::default()
    }
}

impl ComparisonStrategy for FieldExclusionStrategy {
    fn comparison_key(&self, content: &str) -> String {
        let hash = KeyCache::content_hash(content);
        if let Some(cached) = self
            .key_cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(hash)
        {
            return cached;
        }

        if !looks_like_json(content) {
            return content.to_string();
        }

        let key = normalize_excluding_fields(content, &self.exclude_fields);
        self.key_cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(hash, key.clone());
        key
    }
}

/// Builder collecting fields to exclude from comparison.
#[derive(Default)]
pub struct FieldExclusionStrategyBuilder {
    exclude_fields: HashSet<String>,
}

impl FieldExclusionStrategyBuilder {
    pub fn exclude_field(mut self, field: impl Into<String>) -> Self {
        self.exclude_fields.insert(field.into());
        self
    }

    pub fn exclude_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> FieldExclusionStrategy {
        FieldExclusionStrategy::new(self.exclude_fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_exclusion_groups_similar_content() {
        let strategy = FieldExclusionStrategy::excluding_timestamps();
        let a = strategy.comparison_key(r#"{"v":42,"timestamp":1000}"#);
        let b = strategy.comparison_key(r#"{"v":42,"timestamp":1001}"#);
        let c = strategy.comparison_key(r#"{"v":43,"timestamp":1000}"#);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_non_json_content_is_its_own_key() {
        let strategy = FieldExclusionStrategy::excluding_timestamps();
        assert_eq!(strategy.comparison_key("plain text"), "plain text");
    }

    #[test]
    fn test_cache_hit_returns_same_key() {
        let strategy = FieldExclusionStrategy::excluding_timestamps();
        let content = r#"{"v":1,"ts":5}"#;
        let first = strategy.comparison_key(content);
        let second = strategy.comparison_key(content);
        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_exclusion_builder() {
        let strategy = FieldExclusionStrategy::builder()
            .exclude_field("seq")
            .exclude_fields(["shard"])
            .build();
        let a = strategy.comparison_key(r#"{"v":1,"seq":1,"shard":"a"}"#);
        let b = strategy.comparison_key(r#"{"v":1,"seq":2,"shard":"b"}"#);
        assert_eq!(a, b);
    }

    #[test]
    fn test_closure_strategy() {
        let strategy = |content: &str| content.len().to_string();
        assert_eq!(strategy.comparison_key("abc"), "3");
    }
}
