//! Structured-content handling: canonicalization, key caching, and
//! comparison strategies.

pub mod canonical;
pub mod key_cache;
pub mod strategy;

pub use canonical::{canonical_string, extract_field, is_valid_json, looks_like_json};
pub use key_cache::KeyCache;
pub use strategy::{ComparisonStrategy, FieldExclusionStrategy};
