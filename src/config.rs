//! Proxy configuration with tunable condensing and filtering knobs.

use std::collections::HashSet;

/// Field names excluded from content comparison by default. All are common
/// spellings of per-message timestamps.
pub const DEFAULT_EXCLUDE_FIELDS: [&str; 11] = [
    "timestamp",
    "time",
    "datetime",
    "date",
    "ts",
    "createdAt",
    "created_at",
    "updatedAt",
    "updated_at",
    "eventTime",
    "event_time",
];

/// Field names probed, in order, for each buffered original's numeric
/// timestamp when building a condensed envelope.
pub const DEFAULT_EXTRACT_FIELDS: [&str; 8] = [
    "timestamp",
    "time",
    "datetime",
    "ts",
    "createdAt",
    "created_at",
    "eventTime",
    "event_time",
];

/// Configuration for the proxy producer and its condenser. Immutable after
/// build.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Enable the condensing branch of the send path (default: true)
    pub condenser_enabled: bool,
    /// Enable the send-criteria gate (default: true)
    pub criteria_enabled: bool,
    /// Max retention per similarity key before forced emit (default: 1000 ms)
    pub condenser_window_ms: u64,
    /// Max batch length per similarity key before forced emit (default: 100)
    pub condenser_max_batch_size: usize,
    /// One-shot delay of the background flush task (default: 500 ms)
    pub flush_interval_ms: u64,
    /// Reserved. When false, implementations may reorder across keys.
    pub preserve_message_order: bool,
    /// Expose input/output counters (default: false)
    pub enable_metrics: bool,
    /// Reserved for hosts that process sends on a worker pool.
    pub async_processing: bool,
    /// Pool size used when `async_processing` is set.
    pub async_thread_pool_size: usize,
    /// Fields removed from content before comparison.
    pub timestamp_fields_exclude: HashSet<String>,
    /// Fields probed, in declared order, for per-original timestamps.
    pub timestamp_fields_extract: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            condenser_enabled: true,
            criteria_enabled: true,
            condenser_window_ms: 1000,
            condenser_max_batch_size: 100,
            flush_interval_ms: 500,
            preserve_message_order: true,
            enable_metrics: false,
            async_processing: false,
            async_thread_pool_size: 4,
            timestamp_fields_exclude: DEFAULT_EXCLUDE_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timestamp_fields_extract: DEFAULT_EXTRACT_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ProxyConfig {
    /// Create a new config builder.
    pub fn builder() -> ProxyConfigBuilder {
        ProxyConfigBuilder::default()
    }

    /// Sensible defaults: condensing on with a 1 s window of at most 100
    /// messages per batch, criteria on, 500 ms flush interval.
    pub fn defaults() -> Self {
        Self::default()
    }

    /// Pass-through mode: no condensing, no criteria. Useful for debugging
    /// or selectively disabling proxy features.
    pub fn pass_through() -> Self {
        Self {
            condenser_enabled: false,
            criteria_enabled: false,
            ..Default::default()
        }
    }

    /// Tuned for high-throughput workloads: shorter window, larger batches,
    /// faster flushing.
    pub fn high_throughput() -> Self {
        Self {
            condenser_window_ms: 500,
            condenser_max_batch_size: 500,
            flush_interval_ms: 250,
            async_processing: true,
            async_thread_pool_size: 8,
            ..Default::default()
        }
    }
}

/// Builder pattern for ProxyConfig.
#[derive(Default)]
pub struct ProxyConfigBuilder {
    config: ProxyConfig,
}

impl ProxyConfigBuilder {
    /// Enable or disable the condensing branch.
    pub fn condenser_enabled(mut self, enabled: bool) -> Self {
        self.config.condenser_enabled = enabled;
        self
    }

    /// Enable or disable the send-criteria gate.
    pub fn criteria_enabled(mut self, enabled: bool) -> Self {
        self.config.criteria_enabled = enabled;
        self
    }

    /// Set the per-key retention window in milliseconds.
    pub fn condenser_window_ms(mut self, window_ms: u64) -> Self {
        self.config.condenser_window_ms = window_ms;
        self
    }

    /// Set the per-key maximum batch length.
    pub fn condenser_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.config.condenser_max_batch_size = max_batch_size;
        self
    }

    /// Set the one-shot flush task delay in milliseconds.
    pub fn flush_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.flush_interval_ms = interval_ms;
        self
    }

    /// Reserved ordering flag.
    pub fn preserve_message_order(mut self, preserve: bool) -> Self {
        self.config.preserve_message_order = preserve;
        self
    }

    /// Expose input/output counters.
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.config.enable_metrics = enable;
        self
    }

    /// Reserved worker-pool flag.
    pub fn async_processing(mut self, enable: bool) -> Self {
        self.config.async_processing = enable;
        self
    }

    /// Reserved worker-pool size.
    pub fn async_thread_pool_size(mut self, size: usize) -> Self {
        self.config.async_thread_pool_size = size;
        self
    }

    /// Replace the comparison exclusion field set.
    pub fn timestamp_fields_exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.timestamp_fields_exclude = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the ordered timestamp-extraction field list.
    pub fn timestamp_fields_extract<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.timestamp_fields_extract = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert!(config.condenser_enabled);
        assert!(config.criteria_enabled);
        assert_eq!(config.condenser_window_ms, 1000);
        assert_eq!(config.condenser_max_batch_size, 100);
        assert_eq!(config.flush_interval_ms, 500);
        assert!(config.timestamp_fields_exclude.contains("updated_at"));
        assert_eq!(config.timestamp_fields_extract[0], "timestamp");
    }

    #[test]
    fn test_builder() {
        let config = ProxyConfig::builder()
            .condenser_window_ms(250)
            .condenser_max_batch_size(10)
            .criteria_enabled(false)
            .build();

        assert_eq!(config.condenser_window_ms, 250);
        assert_eq!(config.condenser_max_batch_size, 10);
        assert!(!config.criteria_enabled);
        assert!(config.condenser_enabled);
    }

    #[test]
    fn test_presets() {
        let pass = ProxyConfig::pass_through();
        assert!(!pass.condenser_enabled);
        assert!(!pass.criteria_enabled);

        let fast = ProxyConfig::high_throughput();
        assert!(fast.condenser_window_ms < ProxyConfig::default().condenser_window_ms);
        assert!(fast.condenser_max_batch_size > ProxyConfig::default().condenser_max_batch_size);
    }

    #[test]
    fn test_custom_field_sets() {
        let config = ProxyConfig::builder()
            .timestamp_fields_exclude(["when"])
            .timestamp_fields_extract(["when"])
            .build();
        assert!(config.timestamp_fields_exclude.contains("when"));
        assert_eq!(config.timestamp_fields_extract, vec!["when"]);
    }
}
