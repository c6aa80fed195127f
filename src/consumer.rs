//! Buffered proxy consumer: adapts the N-messages-per-envelope pattern back
//! onto a one-message-at-a-time consumer interface.
//!
//! Pull-style receives are satisfied from an internal queue of pre-expanded
//! messages before touching the delegate. Push-style listeners are wrapped
//! so a condensed envelope is delivered as N calls in expansion order. When
//! the internal queue is full, overflowing expanded messages are dropped
//! with a warning to preserve the single-receiver contract.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::broker::{ConsumerDelegate, MessageListener};
use crate::condenser::JsonExpander;
use crate::error::ProxyError;
use crate::message::{Message, Session, SystemSession};

/// Default capacity of the expanded-message queue.
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Consumer proxy wrapping a delegate consumer with transparent expansion of
/// condensed envelopes.
pub struct BufferedProxyConsumer {
    delegate: Arc<dyn ConsumerDelegate>,
    expander: JsonExpander,
    queue: Mutex<VecDeque<Message>>,
    capacity: usize,
    listener: Mutex<Option<Arc<dyn MessageListener>>>,
    closed: AtomicBool,
}

impl BufferedProxyConsumer {
    pub fn builder(delegate: Arc<dyn ConsumerDelegate>) -> BufferedProxyConsumerBuilder {
        BufferedProxyConsumerBuilder::new(delegate)
    }

    /// Wrap a delegate consumer with default settings.
    pub fn wrap(delegate: Arc<dyn ConsumerDelegate>) -> Self {
        Self::builder(delegate).build()
    }

    /// Wrap with a custom expanded-message queue capacity.
    pub fn wrap_with_buffer(delegate: Arc<dyn ConsumerDelegate>, capacity: usize) -> Self {
        Self::builder(delegate).buffer_size(capacity).build()
    }

    /// Block until a message is available: the head of the internal queue,
    /// or the next (possibly expanded) delegate message.
    pub async fn receive(&self) -> Result<Option<Message>, ProxyError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProxyError::ConsumerClosed);
        }
        if let Some(queued) = self.pop_queued() {
            return Ok(Some(queued));
        }

        let received = self.delegate.receive().await?;
        Ok(self.process_and_queue_remaining(received))
    }

    /// Like [`receive`](Self::receive), but the timeout bounds only the
    /// delegate receive; a queued message returns immediately and expansion
    /// time is not counted.
    pub async fn receive_timeout(&self, timeout: Duration) -> Result<Option<Message>, ProxyError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProxyError::ConsumerClosed);
        }
        if let Some(queued) = self.pop_queued() {
            return Ok(Some(queued));
        }

        let received = self.delegate.receive_timeout(timeout).await?;
        Ok(self.process_and_queue_remaining(received))
    }

    /// Return a message only if one is already queued or immediately
    /// available from the delegate.
    pub async fn receive_no_wait(&self) -> Result<Option<Message>, ProxyError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProxyError::ConsumerClosed);
        }
        if let Some(queued) = self.pop_queued() {
            return Ok(Some(queued));
        }

        let received = self.delegate.receive_no_wait().await?;
        Ok(self.process_and_queue_remaining(received))
    }

    /// Install a push-style listener. Each condensed envelope is delivered
    /// as N listener calls in expansion order, on the delivery thread; a
    /// listener error on one expanded message does not suppress the rest.
    pub async fn set_listener(
        &self,
        listener: Option<Arc<dyn MessageListener>>,
    ) -> Result<(), ProxyError> {
        *self.lock_listener() = listener.clone();

        match listener {
            Some(listener) => {
                let expanding = Arc::new(ExpandingListener {
                    expander: self.expander.clone(),
                    inner: listener,
                });
                self.delegate.set_listener(Some(expanding)).await
            }
            None => self.delegate.set_listener(None).await,
        }
    }

    /// The listener originally registered, without the expansion wrapper.
    pub fn listener(&self) -> Option<Arc<dyn MessageListener>> {
        self.lock_listener().clone()
    }

    /// Number of expanded messages waiting in the internal queue.
    pub fn queued_count(&self) -> usize {
        self.lock_queue().len()
    }

    /// Discard the internal queue and close the delegate.
    pub async fn close(&self) -> Result<(), ProxyError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.lock_queue().clear();
        self.delegate.close().await
    }

    fn pop_queued(&self) -> Option<Message> {
        self.lock_queue().pop_front()
    }

    fn process_and_queue_remaining(&self, received: Option<Message>) -> Option<Message> {
        let message = received?;
        if !self.expander.is_condensed(&message) {
            return Some(message);
        }

        let mut expanded = self.expander.expand(&message).into_iter();
        let first = expanded.next();

        let mut queue = self.lock_queue();
        for message in expanded {
            if queue.len() >= self.capacity {
                warn!("Expanded message queue full, dropping message");
                continue;
            }
            queue.push_back(message);
        }
        first
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_listener(&self) -> MutexGuard<'_, Option<Arc<dyn MessageListener>>> {
        self.listener
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Listener wrapper delivering condensed envelopes as N ordered calls.
struct ExpandingListener {
    expander: JsonExpander,
    inner: Arc<dyn MessageListener>,
}

impl MessageListener for ExpandingListener {
    fn on_message(&self, message: Message) -> Result<(), ProxyError> {
        if !self.expander.is_condensed(&message) {
            return self.inner.on_message(message);
        }

        let expanded = self.expander.expand(&message);
        debug!(
            "Expanding condensed message to {} individual messages for listener",
            expanded.len()
        );
        for message in expanded {
            if let Err(e) = self.inner.on_message(message) {
                error!("Listener failed on expanded message: {}", e);
            }
        }
        Ok(())
    }
}

/// Builder for BufferedProxyConsumer.
pub struct BufferedProxyConsumerBuilder {
    delegate: Arc<dyn ConsumerDelegate>,
    session: Arc<dyn Session>,
    timestamp_field: String,
    buffer_size: usize,
}

impl BufferedProxyConsumerBuilder {
    fn new(delegate: Arc<dyn ConsumerDelegate>) -> Self {
        Self {
            delegate,
            session: Arc::new(SystemSession::new()),
            timestamp_field: "timestamp".to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Replace the session used to build reconstructed messages.
    pub fn session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = session;
        self
    }

    /// Field name used when restoring per-original timestamps.
    pub fn timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    /// Capacity of the expanded-message queue.
    pub fn buffer_size(mut self, capacity: usize) -> Self {
        self.buffer_size = capacity.max(1);
        self
    }

    pub fn build(self) -> BufferedProxyConsumer {
        BufferedProxyConsumer {
            delegate: self.delegate,
            expander: JsonExpander::with_timestamp_field(self.session, self.timestamp_field),
            queue: Mutex::new(VecDeque::new()),
            capacity: self.buffer_size,
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }
}
