//! Send criteria: pluggable predicates deciding whether an outbound message
//! is passed on at all.
//!
//! Criteria are evaluated in registration order; the first `false` blocks
//! the message silently. Closures implement [`SendCriteria`] directly, and
//! [`CompositeCriteria`] combines criteria with all/any/none logic.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use crate::json::canonical::{extract_field, is_valid_json};
use crate::message::{now_millis, Destination, Message};

/// Predicate over an outbound message: `true` to send, `false` to block.
pub trait SendCriteria: Send + Sync {
    fn evaluate(&self, message: &Message) -> bool;
}

impl<F> SendCriteria for F
where
    F: Fn(&Message) -> bool + Send + Sync,
{
    fn evaluate(&self, message: &Message) -> bool {
        self(message)
    }
}

/// Criteria that always allows sending.
pub fn always_allow() -> Arc<dyn SendCriteria> {
    Arc::new(|_: &Message| true)
}

/// Criteria that always blocks sending.
pub fn always_block() -> Arc<dyn SendCriteria> {
    Arc::new(|_: &Message| false)
}

/// Negate another criteria.
pub fn negate(criteria: Arc<dyn SendCriteria>) -> Arc<dyn SendCriteria> {
    Arc::new(move |message: &Message| !criteria.evaluate(message))
}

type PropertyMatcher = Box<dyn Fn(Option<String>) -> bool + Send + Sync>;

/// Criteria based on a named message property.
pub struct PropertyCriteria {
    property_name: String,
    matcher: PropertyMatcher,
}

impl PropertyCriteria {
    fn new(property_name: impl Into<String>, matcher: PropertyMatcher) -> Self {
        Self {
            property_name: property_name.into(),
            matcher,
        }
    }

    /// Property must exist.
    pub fn exists(property_name: impl Into<String>) -> Self {
        Self::new(property_name, Box::new(|value| value.is_some()))
    }

    /// Property's textual form must equal the expected value.
    pub fn equals(property_name: impl Into<String>, expected: impl Into<String>) -> Self {
        let expected = expected.into();
        Self::new(
            property_name,
            Box::new(move |value| value.as_deref() == Some(expected.as_str())),
        )
    }

    /// Property's textual form must be one of the given values.
    pub fn is_in<I, S>(property_name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: HashSet<String> = values.into_iter().map(Into::into).collect();
        Self::new(
            property_name,
            Box::new(move |value| value.map(|v| values.contains(&v)).unwrap_or(false)),
        )
    }

    /// Property's textual form must start with the prefix.
    pub fn starts_with(property_name: impl Into<String>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self::new(
            property_name,
            Box::new(move |value| value.map(|v| v.starts_with(&prefix)).unwrap_or(false)),
        )
    }

    /// Property's textual form must contain the substring.
    pub fn contains(property_name: impl Into<String>, substring: impl Into<String>) -> Self {
        let substring = substring.into();
        Self::new(
            property_name,
            Box::new(move |value| value.map(|v| v.contains(&substring)).unwrap_or(false)),
        )
    }
}

impl SendCriteria for PropertyCriteria {
    fn evaluate(&self, message: &Message) -> bool {
        (self.matcher)(message.string_property(&self.property_name))
    }
}

type ContentPredicate = Box<dyn Fn(Option<&str>) -> bool + Send + Sync>;

/// Criteria based on the message body.
pub struct ContentCriteria {
    predicate: ContentPredicate,
}

impl ContentCriteria {
    fn new(predicate: ContentPredicate) -> Self {
        Self { predicate }
    }

    /// Body must contain the substring.
    pub fn contains(substring: impl Into<String>) -> Self {
        let substring = substring.into();
        Self::new(Box::new(move |content| {
            content.map(|c| c.contains(&substring)).unwrap_or(false)
        }))
    }

    /// Body must be valid JSON.
    pub fn valid_json() -> Self {
        Self::new(Box::new(|content| {
            content.map(is_valid_json).unwrap_or(false)
        }))
    }

    /// Top-level JSON field's textual form must equal the expected value.
    pub fn json_field_equals(field_name: impl Into<String>, expected: impl Into<String>) -> Self {
        let field_name = field_name.into();
        let expected = expected.into();
        Self::new(Box::new(move |content| {
            content
                .and_then(|c| extract_field(c, &field_name))
                .map(|v| v == expected)
                .unwrap_or(false)
        }))
    }

    /// Top-level JSON field must exist.
    pub fn json_field_exists(field_name: impl Into<String>) -> Self {
        let field_name = field_name.into();
        Self::new(Box::new(move |content| {
            content.and_then(|c| extract_field(c, &field_name)).is_some()
        }))
    }

    /// Body length must be at least `min_length`.
    pub fn min_length(min_length: usize) -> Self {
        Self::new(Box::new(move |content| {
            content.map(|c| c.len() >= min_length).unwrap_or(false)
        }))
    }

    /// Body length must be at most `max_length`.
    pub fn max_length(max_length: usize) -> Self {
        Self::new(Box::new(move |content| {
            content.map(|c| c.len() <= max_length).unwrap_or(false)
        }))
    }

    /// Arbitrary predicate over the body.
    pub fn custom(predicate: impl Fn(Option<&str>) -> bool + Send + Sync + 'static) -> Self {
        Self::new(Box::new(predicate))
    }
}

impl SendCriteria for ContentCriteria {
    fn evaluate(&self, message: &Message) -> bool {
        (self.predicate)(message.text_content())
    }
}

/// Criteria based on message priority.
pub struct PriorityCriteria {
    min_priority: u8,
    max_priority: u8,
}

impl PriorityCriteria {
    pub fn at_least(min_priority: u8) -> Self {
        Self {
            min_priority,
            max_priority: 9,
        }
    }

    pub fn at_most(max_priority: u8) -> Self {
        Self {
            min_priority: 0,
            max_priority,
        }
    }

    pub fn exactly(priority: u8) -> Self {
        Self {
            min_priority: priority,
            max_priority: priority,
        }
    }

    pub fn range(min_priority: u8, max_priority: u8) -> Self {
        Self {
            min_priority,
            max_priority,
        }
    }
}

impl SendCriteria for PriorityCriteria {
    fn evaluate(&self, message: &Message) -> bool {
        let priority = message.priority();
        priority >= self.min_priority && priority <= self.max_priority
    }
}

type DestinationMatcher = Box<dyn Fn(Option<&Destination>) -> bool + Send + Sync>;

/// Criteria based on the message's destination header.
pub struct DestinationCriteria {
    matcher: DestinationMatcher,
}

impl DestinationCriteria {
    fn new(matcher: DestinationMatcher) -> Self {
        Self { matcher }
    }

    /// Destination must be a queue; with names given, one of them.
    pub fn queues_only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: HashSet<String> = names.into_iter().map(Into::into).collect();
        Self::new(Box::new(move |destination| match destination {
            Some(Destination::Queue(name)) => names.is_empty() || names.contains(name),
            _ => false,
        }))
    }

    /// Destination must be a topic; with names given, one of them.
    pub fn topics_only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: HashSet<String> = names.into_iter().map(Into::into).collect();
        Self::new(Box::new(move |destination| match destination {
            Some(Destination::Topic(name)) => names.is_empty() || names.contains(name),
            _ => false,
        }))
    }

    /// Destination name must start with the prefix.
    pub fn name_starts_with(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self::new(Box::new(move |destination| {
            destination
                .map(|d| d.name().starts_with(&prefix))
                .unwrap_or(false)
        }))
    }

    /// Destination name must not be one of the given names. Messages without
    /// a destination header pass.
    pub fn exclude<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: HashSet<String> = names.into_iter().map(Into::into).collect();
        Self::new(Box::new(move |destination| {
            destination.map(|d| !names.contains(d.name())).unwrap_or(true)
        }))
    }
}

impl SendCriteria for DestinationCriteria {
    fn evaluate(&self, message: &Message) -> bool {
        (self.matcher)(message.destination())
    }
}

/// Logical combination of sub-criteria.
pub struct CompositeCriteria {
    criteria: Vec<Arc<dyn SendCriteria>>,
    operator: LogicalOperator,
}

#[derive(Debug, Clone, Copy)]
enum LogicalOperator {
    All,
    Any,
    None,
}

impl CompositeCriteria {
    /// Every sub-criteria must pass.
    pub fn all(criteria: Vec<Arc<dyn SendCriteria>>) -> Self {
        Self {
            criteria,
            operator: LogicalOperator::All,
        }
    }

    /// At least one sub-criteria must pass.
    pub fn any(criteria: Vec<Arc<dyn SendCriteria>>) -> Self {
        Self {
            criteria,
            operator: LogicalOperator::Any,
        }
    }

    /// No sub-criteria may pass.
    pub fn none(criteria: Vec<Arc<dyn SendCriteria>>) -> Self {
        Self {
            criteria,
            operator: LogicalOperator::None,
        }
    }
}

impl SendCriteria for CompositeCriteria {
    fn evaluate(&self, message: &Message) -> bool {
        match self.operator {
            LogicalOperator::All => self.criteria.iter().all(|c| c.evaluate(message)),
            LogicalOperator::Any => self.criteria.iter().any(|c| c.evaluate(message)),
            LogicalOperator::None => !self.criteria.iter().any(|c| c.evaluate(message)),
        }
    }
}

/// Sliding-window rate limiter: at most `max_messages` per `window_ms`.
pub struct RateLimitCriteria {
    max_messages: u32,
    window_ms: i64,
    count: AtomicU32,
    window_start: AtomicI64,
}

impl RateLimitCriteria {
    pub fn per_second(max_messages: u32) -> Self {
        Self::new(max_messages, 1000)
    }

    pub fn new(max_messages: u32, window_ms: i64) -> Self {
        Self {
            max_messages,
            window_ms,
            count: AtomicU32::new(0),
            window_start: AtomicI64::new(now_millis()),
        }
    }
}

impl SendCriteria for RateLimitCriteria {
    fn evaluate(&self, _message: &Message) -> bool {
        let now = now_millis();
        let start = self.window_start.load(Ordering::Relaxed);

        if now - start >= self.window_ms {
            self.window_start.store(now, Ordering::Relaxed);
            self.count.store(1, Ordering::Relaxed);
            return true;
        }

        self.count.fetch_add(1, Ordering::Relaxed) + 1 <= self.max_messages
    }
}

/// Throttle allowing one message per `min_interval_ms`.
pub struct ThrottleCriteria {
    min_interval_ms: i64,
    last_sent: AtomicI64,
}

impl ThrottleCriteria {
    pub fn new(min_interval_ms: i64) -> Self {
        Self {
            min_interval_ms,
            last_sent: AtomicI64::new(0),
        }
    }
}

impl SendCriteria for ThrottleCriteria {
    fn evaluate(&self, _message: &Message) -> bool {
        let now = now_millis();
        let last = self.last_sent.load(Ordering::Relaxed);

        if now - last >= self.min_interval_ms {
            self.last_sent.store(now, Ordering::Relaxed);
            return true;
        }
        false
    }
}
