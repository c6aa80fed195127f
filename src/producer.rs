//! Proxy producer: transparent interception of the send path.
//!
//! Sends run through the criteria gate, then the condensation branch, and
//! only then reach the delegate. Buffered messages are emitted by an
//! adaptive one-shot flush task that re-arms itself only while work
//! remains, so an idle producer costs nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broker::{CompletionListener, ProducerDelegate, SendOptions};
use crate::condenser::{
    CondenserStatsSnapshot, CondensedEnvelope, JsonCondenser, CONDENSED_COUNT, CONDENSED_MARKER,
    CONDENSED_TIMESTAMPS,
};
use crate::config::ProxyConfig;
use crate::criteria::SendCriteria;
use crate::error::ProxyError;
use crate::message::{Destination, Message, Session, SystemSession};

/// How long `close` waits for the in-flight flush task before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Producer proxy wrapping a delegate producer with criteria filtering and
/// message condensing. Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct ProxyProducer {
    inner: Arc<ProducerInner>,
}

struct ProducerInner {
    delegate: Arc<dyn ProducerDelegate>,
    session: Arc<dyn Session>,
    config: ProxyConfig,
    condenser: Option<JsonCondenser>,
    criteria: Vec<Arc<dyn SendCriteria>>,
    flush_interval: Duration,
    send_defaults: Mutex<SendOptions>,
    flush_armed: AtomicBool,
    flush_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ProxyProducer {
    pub fn builder(delegate: Arc<dyn ProducerDelegate>) -> ProxyProducerBuilder {
        ProxyProducerBuilder::new(delegate)
    }

    /// Wrap a delegate producer with default settings. The simplest way to
    /// add proxy capabilities to an existing producer.
    pub fn wrap(delegate: Arc<dyn ProducerDelegate>) -> Self {
        Self::builder(delegate).build()
    }

    /// Wrap with JSON condensing using the given window and batch size.
    pub fn wrap_with_condenser(
        delegate: Arc<dyn ProducerDelegate>,
        window_ms: u64,
        max_batch_size: usize,
    ) -> Self {
        Self::builder(delegate)
            .configuration(
                ProxyConfig::builder()
                    .condenser_window_ms(window_ms)
                    .condenser_max_batch_size(max_batch_size)
                    .build(),
            )
            .build()
    }

    /// Wrap in pass-through mode: no condensing, no criteria.
    pub fn wrap_pass_through(delegate: Arc<dyn ProducerDelegate>) -> Self {
        Self::builder(delegate)
            .configuration(ProxyConfig::pass_through())
            .build()
    }

    /// Send with the producer's current delivery defaults to its preset
    /// destination.
    pub async fn send(&self, message: Message) -> Result<(), ProxyError> {
        let options = self.send_options();
        self.send_with(None, message, options).await
    }

    /// Send to an explicit destination with the current delivery defaults.
    pub async fn send_to(
        &self,
        destination: &Destination,
        message: Message,
    ) -> Result<(), ProxyError> {
        let options = self.send_options();
        self.send_with(Some(destination), message, options).await
    }

    /// Full send: explicit destination and per-send delivery options.
    pub async fn send_with(
        &self,
        destination: Option<&Destination>,
        message: Message,
        options: SendOptions,
    ) -> Result<(), ProxyError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return Err(ProxyError::ProducerClosed);
        }

        if inner.config.criteria_enabled && !inner.evaluate_criteria(&message) {
            debug!("Message blocked by criteria");
            return Ok(());
        }

        if inner.config.condenser_enabled {
            if let Some(condenser) = &inner.condenser {
                if let Some(admission) = condenser.should_admit(&message) {
                    condenser.admit(message, admission);
                    ProducerInner::arm_flush(inner);
                    return Ok(());
                }
            }
        }

        inner.send_direct(destination, message, options).await
    }

    /// Send variant reporting the outcome through a completion listener.
    /// For symmetry with the plain overloads, a message blocked by criteria
    /// or swallowed into the condenser buffer still completes exactly once
    /// with the original input.
    pub async fn send_with_completion(
        &self,
        destination: Option<&Destination>,
        message: Message,
        options: SendOptions,
        listener: Arc<dyn CompletionListener>,
    ) -> Result<(), ProxyError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return Err(ProxyError::ProducerClosed);
        }

        if inner.config.criteria_enabled && !inner.evaluate_criteria(&message) {
            debug!("Message blocked by criteria");
            listener.on_completion(&message);
            return Ok(());
        }

        if inner.config.condenser_enabled {
            if let Some(condenser) = &inner.condenser {
                if let Some(admission) = condenser.should_admit(&message) {
                    let buffered = message.clone();
                    condenser.admit(message, admission);
                    ProducerInner::arm_flush(inner);
                    listener.on_completion(&buffered);
                    return Ok(());
                }
            }
        }

        match inner
            .send_direct(destination, message.clone(), options)
            .await
        {
            Ok(()) => listener.on_completion(&message),
            Err(e) => listener.on_exception(&message, &e),
        }
        Ok(())
    }

    /// Force an immediate flush of all buffered messages, regardless of
    /// readiness. Delegate failures are logged per envelope; the number of
    /// envelopes actually sent is returned.
    pub async fn flush(&self) -> usize {
        let Some(condenser) = &self.inner.condenser else {
            return 0;
        };
        let envelopes = condenser.drain();
        self.inner.emit_envelopes(envelopes).await
    }

    /// Flush remaining messages, stop the flush worker (up to 5 s grace,
    /// then abort), and close the delegate. No send may be initiated after
    /// this returns.
    pub async fn close(&self) -> Result<(), ProxyError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let flushed = self.flush().await;
        if flushed > 0 {
            debug!("Flushed {} condensed messages on close", flushed);
        }

        let task = self.inner.lock_flush_task().take();
        if let Some(mut task) = task {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!(
                    "Flush worker did not stop within {:?}, aborting",
                    SHUTDOWN_GRACE
                );
                task.abort();
            }
        }

        self.inner.delegate.close().await
    }

    /// Number of messages currently buffered in the condenser.
    pub fn buffered_count(&self) -> usize {
        self.inner
            .condenser
            .as_ref()
            .map_or(0, JsonCondenser::buffered_count)
    }

    /// Condenser counters, when a condenser is attached.
    pub fn condenser_stats(&self) -> Option<CondenserStatsSnapshot> {
        self.inner.condenser.as_ref().map(JsonCondenser::stats)
    }

    /// The delegate's preset destination, if any.
    pub fn destination(&self) -> Option<Destination> {
        self.inner.delegate.destination()
    }

    pub fn send_options(&self) -> SendOptions {
        *self.inner.lock_send_defaults()
    }

    pub fn set_delivery_mode(&self, delivery_mode: crate::broker::DeliveryMode) {
        self.inner.lock_send_defaults().delivery_mode = delivery_mode;
    }

    pub fn set_priority(&self, priority: u8) {
        self.inner.lock_send_defaults().priority = priority.min(9);
    }

    pub fn set_time_to_live(&self, time_to_live: i64) {
        self.inner.lock_send_defaults().time_to_live = time_to_live;
    }
}

impl ProducerInner {
    fn evaluate_criteria(&self, message: &Message) -> bool {
        self.criteria.iter().all(|criterion| criterion.evaluate(message))
    }

    /// Direct branch: prefer the destination-less overload whenever the
    /// delegate is bound to a destination and the caller did not ask for a
    /// different one. Some hosts reject re-specifying a destination on a
    /// bound producer.
    async fn send_direct(
        &self,
        destination: Option<&Destination>,
        message: Message,
        options: SendOptions,
    ) -> Result<(), ProxyError> {
        match (self.delegate.destination(), destination) {
            (Some(_), None) | (None, None) => self.delegate.send(message, options).await,
            (Some(preset), Some(requested)) if *requested == preset => {
                self.delegate.send(message, options).await
            }
            (_, Some(requested)) => self.delegate.send_to(requested, message, options).await,
        }
    }

    /// Arm the one-shot flush task unless one is already pending. Arming is
    /// compare-and-set, so concurrent admissions schedule at most one task.
    fn arm_flush(inner: &Arc<ProducerInner>) {
        if inner.condenser.is_none() || inner.closed.load(Ordering::Acquire) {
            return;
        }
        if inner
            .flush_armed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let worker = Arc::clone(inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(worker.flush_interval).await;
            worker.run_flush_pass().await;
            worker.flush_armed.store(false, Ordering::Release);

            let buffered = worker
                .condenser
                .as_ref()
                .map_or(0, JsonCondenser::buffered_count);
            if buffered > 0 {
                ProducerInner::arm_flush(&worker);
            }
        });
        *inner.lock_flush_task() = Some(task);
    }

    async fn run_flush_pass(&self) {
        let Some(condenser) = &self.condenser else {
            return;
        };
        if !condenser.flush_due() {
            return;
        }

        let envelopes = condenser.flush_ready();
        let sent = self.emit_envelopes(envelopes).await;
        if sent > 0 {
            debug!("Background flush sent {} condensed messages", sent);
        }
    }

    /// Materialize and send envelopes. Runs outside the buffer latch; a
    /// failed send is logged and the next envelope is still attempted.
    async fn emit_envelopes(&self, envelopes: Vec<CondensedEnvelope>) -> usize {
        let options = *self.lock_send_defaults();
        let mut sent = 0;

        for mut envelope in envelopes {
            let body = envelope.aggregated_content();
            let mut message = self.session.create_text_message(&body);
            message.set_bool_property(CONDENSED_MARKER, true);
            message.set_int_property(CONDENSED_COUNT, envelope.message_count() as i32);
            message.set_long_property(CONDENSED_TIMESTAMPS, envelope.first_timestamp());

            match self.delegate.send(message, options).await {
                Ok(()) => {
                    sent += 1;
                    debug!(
                        "Sent condensed message containing {} originals",
                        envelope.message_count()
                    );
                }
                Err(e) => error!("Failed to send condensed message: {}", e),
            }
        }
        sent
    }

    fn lock_send_defaults(&self) -> MutexGuard<'_, SendOptions> {
        self.send_defaults
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_flush_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.flush_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Builder for ProxyProducer.
pub struct ProxyProducerBuilder {
    delegate: Arc<dyn ProducerDelegate>,
    session: Arc<dyn Session>,
    config: ProxyConfig,
    condenser: Option<JsonCondenser>,
    criteria: Vec<Arc<dyn SendCriteria>>,
}

impl ProxyProducerBuilder {
    fn new(delegate: Arc<dyn ProducerDelegate>) -> Self {
        Self {
            delegate,
            session: Arc::new(SystemSession::new()),
            config: ProxyConfig::default(),
            condenser: None,
            criteria: Vec::new(),
        }
    }

    /// Replace the default session used to build condensed envelopes.
    pub fn session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = session;
        self
    }

    pub fn configuration(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a pre-built condenser instead of the config-derived default.
    pub fn condenser(mut self, condenser: JsonCondenser) -> Self {
        self.condenser = Some(condenser);
        self
    }

    pub fn add_criteria(mut self, criteria: Arc<dyn SendCriteria>) -> Self {
        self.criteria.push(criteria);
        self
    }

    pub fn build(self) -> ProxyProducer {
        let condenser = match (self.config.condenser_enabled, self.condenser) {
            (true, None) => Some(JsonCondenser::from_config(&self.config)),
            (_, condenser) => condenser,
        };

        info!(
            "Proxy producer created with condenser={}, criteria={}",
            self.config.condenser_enabled,
            self.criteria.len()
        );

        ProxyProducer {
            inner: Arc::new(ProducerInner {
                delegate: self.delegate,
                session: self.session,
                flush_interval: Duration::from_millis(self.config.flush_interval_ms),
                config: self.config,
                condenser,
                criteria: self.criteria,
                send_defaults: Mutex::new(SendOptions::default()),
                flush_armed: AtomicBool::new(false),
                flush_task: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condenser::CONDENSED_META_FIELD;
    use crate::criteria::PropertyCriteria;
    use async_trait::async_trait;
    use serde_json::Value;

    #[derive(Default)]
    struct RecordingDelegate {
        sent: Mutex<Vec<(Option<Destination>, Message)>>,
        preset: Option<Destination>,
        closed: AtomicBool,
    }

    impl RecordingDelegate {
        fn with_preset(preset: Destination) -> Self {
            Self {
                preset: Some(preset),
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<(Option<Destination>, Message)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProducerDelegate for RecordingDelegate {
        async fn send(&self, message: Message, _options: SendOptions) -> Result<(), ProxyError> {
            self.sent.lock().unwrap().push((None, message));
            Ok(())
        }

        async fn send_to(
            &self,
            destination: &Destination,
            message: Message,
            _options: SendOptions,
        ) -> Result<(), ProxyError> {
            self.sent
                .lock()
                .unwrap()
                .push((Some(destination.clone()), message));
            Ok(())
        }

        fn destination(&self) -> Option<Destination> {
            self.preset.clone()
        }

        async fn close(&self) -> Result<(), ProxyError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(window_ms: u64, max_batch: usize, flush_interval_ms: u64) -> ProxyConfig {
        ProxyConfig::builder()
            .condenser_window_ms(window_ms)
            .condenser_max_batch_size(max_batch)
            .flush_interval_ms(flush_interval_ms)
            .build()
    }

    #[tokio::test]
    async fn test_pass_through_sends_each_message() {
        let delegate = Arc::new(RecordingDelegate::default());
        let producer = ProxyProducer::wrap_pass_through(delegate.clone());

        for _ in 0..3 {
            producer.send(Message::text(r#"{"a":1}"#)).await.unwrap();
        }

        let sent = delegate.sent();
        assert_eq!(sent.len(), 3);
        for (_, message) in sent {
            assert_eq!(message.text_content(), Some(r#"{"a":1}"#));
            assert!(!message.has_property(CONDENSED_MARKER));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_similar_messages_coalesce_into_one_envelope() {
        let delegate = Arc::new(RecordingDelegate::default());
        let producer = ProxyProducer::builder(delegate.clone())
            .configuration(config(1000, 5, 500))
            .build();

        producer
            .send(Message::text(r#"{"v":42,"timestamp":1000}"#))
            .await
            .unwrap();
        producer
            .send(Message::text(r#"{"v":42,"timestamp":1001}"#))
            .await
            .unwrap();
        producer
            .send(Message::text(r#"{"v":42,"timestamp":1002}"#))
            .await
            .unwrap();
        assert_eq!(producer.buffered_count(), 3);

        // Liveness: everything is emitted within window + flush interval.
        tokio::time::sleep(Duration::from_millis(1600)).await;

        let sent = delegate.sent();
        assert_eq!(sent.len(), 1);
        let message = &sent[0].1;
        assert!(message.bool_property(CONDENSED_MARKER, false));
        assert_eq!(message.int_property(CONDENSED_COUNT, 0), 3);
        assert!(message.has_property(CONDENSED_TIMESTAMPS));

        let value: Value = serde_json::from_str(message.text_content().unwrap()).unwrap();
        assert_eq!(value["v"], 42);
        assert!(value.get("timestamp").is_none());
        let meta = &value[CONDENSED_META_FIELD];
        assert_eq!(meta["count"], 3);
        assert_eq!(meta["originalTimestamps"], serde_json::json!([1000, 1001, 1002]));
        assert_eq!(meta["firstTimestamp"], 1000);
        assert_eq!(meta["lastTimestamp"], 1002);

        assert_eq!(producer.buffered_count(), 0);
        let stats = producer.condenser_stats().unwrap();
        assert_eq!(stats.input_messages, 3);
        assert_eq!(stats.output_batches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_batch_emits_before_window_expiry() {
        let delegate = Arc::new(RecordingDelegate::default());
        let producer = ProxyProducer::builder(delegate.clone())
            .configuration(config(10_000, 2, 100))
            .build();

        producer.send(Message::text(r#"{"x":1}"#)).await.unwrap();
        producer.send(Message::text(r#"{"x":1}"#)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        let sent = delegate.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.int_property(CONDENSED_COUNT, 0), 2);
    }

    #[tokio::test]
    async fn test_criteria_block_high_priority_only() {
        let delegate = Arc::new(RecordingDelegate::default());
        let producer = ProxyProducer::builder(delegate.clone())
            .configuration(
                ProxyConfig::builder().condenser_enabled(false).build(),
            )
            .add_criteria(Arc::new(PropertyCriteria::equals("priority", "high")))
            .build();

        let mut high = Message::text(r#"{"x":1}"#);
        high.set_string_property("priority", "high");
        let mut low = Message::text(r#"{"x":1}"#);
        low.set_string_property("priority", "low");

        producer.send(high).await.unwrap();
        producer.send(low).await.unwrap();

        let sent = delegate.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.string_property("priority").as_deref(), Some("high"));
    }

    #[tokio::test]
    async fn test_non_json_body_bypasses_condenser() {
        let delegate = Arc::new(RecordingDelegate::default());
        let producer = ProxyProducer::builder(delegate.clone())
            .configuration(config(60_000, 100, 500))
            .build();

        producer.send(Message::text("plain text")).await.unwrap();

        assert_eq!(producer.buffered_count(), 0);
        assert_eq!(delegate.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_destination_overload_selection() {
        let delegate = Arc::new(RecordingDelegate::with_preset(Destination::queue("orders")));
        let producer = ProxyProducer::wrap_pass_through(delegate.clone());

        producer.send(Message::text("a")).await.unwrap();
        producer
            .send_to(&Destination::queue("orders"), Message::text("b"))
            .await
            .unwrap();
        producer
            .send_to(&Destination::queue("audit"), Message::text("c"))
            .await
            .unwrap();

        let sent = delegate.sent();
        assert_eq!(sent[0].0, None);
        assert_eq!(sent[1].0, None);
        assert_eq!(sent[2].0, Some(Destination::queue("audit")));
    }

    #[tokio::test]
    async fn test_force_flush_conserves_all_admitted_messages() {
        let delegate = Arc::new(RecordingDelegate::default());
        let producer = ProxyProducer::builder(delegate.clone())
            .configuration(config(60_000, 1000, 60_000))
            .build();

        let admitted = 9;
        for i in 0..admitted {
            producer
                .send(Message::text(format!(r#"{{"group":{},"ts":{}}}"#, i % 3, i)))
                .await
                .unwrap();
        }

        let flushed = producer.flush().await;
        assert_eq!(flushed, 3);
        assert_eq!(producer.buffered_count(), 0);

        let total: i32 = delegate
            .sent()
            .iter()
            .map(|(_, message)| message.int_property(CONDENSED_COUNT, 0))
            .sum();
        assert_eq!(total, admitted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_drains_buffer_before_returning() {
        let delegate = Arc::new(RecordingDelegate::default());
        let producer = ProxyProducer::builder(delegate.clone())
            .configuration(config(60_000, 100, 500))
            .build();

        for i in 0..3 {
            producer
                .send(Message::text(format!(r#"{{"v":1,"ts":{}}}"#, i)))
                .await
                .unwrap();
        }

        producer.close().await.unwrap();

        let sent = delegate.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.int_property(CONDENSED_COUNT, 0), 3);
        assert_eq!(producer.buffered_count(), 0);
        assert!(delegate.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_send_after_close_is_rejected() {
        let delegate = Arc::new(RecordingDelegate::default());
        let producer = ProxyProducer::wrap_pass_through(delegate.clone());

        producer.close().await.unwrap();
        let result = producer.send(Message::text("x")).await;
        assert!(matches!(result, Err(ProxyError::ProducerClosed)));
    }

    struct CompletionRecorder {
        completions: Mutex<Vec<Option<String>>>,
        exceptions: Mutex<Vec<String>>,
    }

    impl CompletionRecorder {
        fn new() -> Self {
            Self {
                completions: Mutex::new(Vec::new()),
                exceptions: Mutex::new(Vec::new()),
            }
        }
    }

    impl CompletionListener for CompletionRecorder {
        fn on_completion(&self, message: &Message) {
            self.completions
                .lock()
                .unwrap()
                .push(message.text_content().map(str::to_string));
        }

        fn on_exception(&self, _message: &Message, error: &ProxyError) {
            self.exceptions.lock().unwrap().push(error.to_string());
        }
    }

    #[tokio::test]
    async fn test_completion_fires_once_for_blocked_and_buffered_sends() {
        let delegate = Arc::new(RecordingDelegate::default());
        let producer = ProxyProducer::builder(delegate.clone())
            .configuration(config(60_000, 100, 500))
            .add_criteria(Arc::new(PropertyCriteria::exists("keep")))
            .build();
        let recorder = Arc::new(CompletionRecorder::new());

        // Blocked by criteria: still completes with the original input.
        let blocked = Message::text(r#"{"v":1}"#);
        producer
            .send_with_completion(None, blocked, SendOptions::default(), recorder.clone())
            .await
            .unwrap();

        // Buffered by the condenser: completes as well.
        let mut kept = Message::text(r#"{"v":1}"#);
        kept.set_bool_property("keep", true);
        producer
            .send_with_completion(None, kept, SendOptions::default(), recorder.clone())
            .await
            .unwrap();

        let completions = recorder.completions.lock().unwrap();
        assert_eq!(completions.len(), 2);
        assert!(recorder.exceptions.lock().unwrap().is_empty());
        assert_eq!(delegate.sent().len(), 0);
    }

    struct FailingDelegate;

    #[async_trait]
    impl ProducerDelegate for FailingDelegate {
        async fn send(&self, _message: Message, _options: SendOptions) -> Result<(), ProxyError> {
            Err(ProxyError::SendFailed("broker unavailable".into()))
        }

        async fn send_to(
            &self,
            _destination: &Destination,
            _message: Message,
            _options: SendOptions,
        ) -> Result<(), ProxyError> {
            Err(ProxyError::SendFailed("broker unavailable".into()))
        }

        fn destination(&self) -> Option<Destination> {
            None
        }

        async fn close(&self) -> Result<(), ProxyError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_direct_send_failure_propagates() {
        let producer = ProxyProducer::wrap_pass_through(Arc::new(FailingDelegate));
        let result = producer.send(Message::text("x")).await;
        assert!(matches!(result, Err(ProxyError::SendFailed(_))));
    }

    #[tokio::test]
    async fn test_flush_failure_is_swallowed_per_envelope() {
        let producer = ProxyProducer::builder(Arc::new(FailingDelegate))
            .configuration(config(60_000, 100, 500))
            .build();

        producer.send(Message::text(r#"{"v":1}"#)).await.unwrap();
        producer.send(Message::text(r#"{"v":2}"#)).await.unwrap();

        // Both envelope sends fail; flush still completes without error.
        let flushed = producer.flush().await;
        assert_eq!(flushed, 0);
        assert_eq!(producer.buffered_count(), 0);
    }
}
