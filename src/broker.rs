//! Delegate seams for the wrapped broker client.
//!
//! The proxy wraps a producer and a consumer it does not own. These traits
//! are the only surface it needs from the host client library: send with
//! delivery options, pull or push receive, and close. An in-memory
//! channel-backed pair is provided for demos and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

use crate::error::ProxyError;
use crate::message::{now_millis, Destination, Message, DEFAULT_PRIORITY};

/// Broker delivery mode for outgoing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    #[default]
    Persistent,
    NonPersistent,
}

/// Per-send delivery options: mode, priority, and time-to-live in
/// milliseconds (0 meaning "no expiry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub delivery_mode: DeliveryMode,
    pub priority: u8,
    pub time_to_live: i64,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            delivery_mode: DeliveryMode::Persistent,
            priority: DEFAULT_PRIORITY,
            time_to_live: 0,
        }
    }
}

/// The wrapped producer side of the host client.
#[async_trait]
pub trait ProducerDelegate: Send + Sync {
    /// Send to the producer's preset destination.
    async fn send(&self, message: Message, options: SendOptions) -> Result<(), ProxyError>;

    /// Send to an explicit destination. Hosts bound to a preset destination
    /// may reject this variant.
    async fn send_to(
        &self,
        destination: &Destination,
        message: Message,
        options: SendOptions,
    ) -> Result<(), ProxyError>;

    /// The preset destination this producer is bound to, if any.
    fn destination(&self) -> Option<Destination>;

    async fn close(&self) -> Result<(), ProxyError>;
}

/// Push-style message callback.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, message: Message) -> Result<(), ProxyError>;
}

impl<F> MessageListener for F
where
    F: Fn(Message) -> Result<(), ProxyError> + Send + Sync,
{
    fn on_message(&self, message: Message) -> Result<(), ProxyError> {
        self(message)
    }
}

/// Completion callback for the asynchronous send variant.
pub trait CompletionListener: Send + Sync {
    fn on_completion(&self, message: &Message);
    fn on_exception(&self, message: &Message, error: &ProxyError);
}

/// The wrapped consumer side of the host client.
#[async_trait]
pub trait ConsumerDelegate: Send + Sync {
    /// Block until a message arrives or the source is closed.
    async fn receive(&self) -> Result<Option<Message>, ProxyError>;

    /// Block up to `timeout` for a message.
    async fn receive_timeout(&self, timeout: Duration) -> Result<Option<Message>, ProxyError>;

    /// Return a message only if one is already available.
    async fn receive_no_wait(&self) -> Result<Option<Message>, ProxyError>;

    /// Install or remove a push-style listener.
    async fn set_listener(
        &self,
        listener: Option<Arc<dyn MessageListener>>,
    ) -> Result<(), ProxyError>;

    async fn close(&self) -> Result<(), ProxyError>;
}

/// Create a connected in-memory producer/consumer pair backed by a bounded
/// channel. `destination` becomes the producer's preset destination.
pub fn in_memory_channel(
    capacity: usize,
    destination: Option<Destination>,
) -> (InMemoryProducer, InMemoryConsumer) {
    let (sender, receiver) = mpsc::channel(capacity);
    let producer = InMemoryProducer {
        sender,
        destination,
    };
    let consumer = InMemoryConsumer {
        receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
        listener_task: std::sync::Mutex::new(None),
        closed: AtomicBool::new(false),
    };
    (producer, consumer)
}

/// Producer delegate that writes into an in-memory channel.
#[derive(Debug, Clone)]
pub struct InMemoryProducer {
    sender: mpsc::Sender<Message>,
    destination: Option<Destination>,
}

#[async_trait]
impl ProducerDelegate for InMemoryProducer {
    async fn send(&self, mut message: Message, _options: SendOptions) -> Result<(), ProxyError> {
        if message.sent_at() == 0 {
            message.set_sent_at(now_millis());
        }
        if message.destination().is_none() {
            if let Some(destination) = &self.destination {
                message.set_destination(destination.clone());
            }
        }
        self.sender
            .send(message)
            .await
            .map_err(|_| ProxyError::ChannelClosed)
    }

    async fn send_to(
        &self,
        destination: &Destination,
        mut message: Message,
        options: SendOptions,
    ) -> Result<(), ProxyError> {
        message.set_destination(destination.clone());
        self.send(message, options).await
    }

    fn destination(&self) -> Option<Destination> {
        self.destination.clone()
    }

    async fn close(&self) -> Result<(), ProxyError> {
        Ok(())
    }
}

/// Consumer delegate that reads from an in-memory channel.
///
/// Installing a listener spawns a drain task that holds the receive side,
/// so pull-style `receive` must not be mixed with a listener.
pub struct InMemoryConsumer {
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Message>>>,
    listener_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

#[async_trait]
impl ConsumerDelegate for InMemoryConsumer {
    async fn receive(&self) -> Result<Option<Message>, ProxyError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(ProxyError::ConsumerClosed);
        }
        Ok(self.receiver.lock().await.recv().await)
    }

    async fn receive_timeout(&self, timeout: Duration) -> Result<Option<Message>, ProxyError> {
        match tokio::time::timeout(timeout, self.receive()).await {
            Ok(result) => result,
            Err(_) => Ok(None),
        }
    }

    async fn receive_no_wait(&self) -> Result<Option<Message>, ProxyError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(ProxyError::ConsumerClosed);
        }
        Ok(self.receiver.lock().await.try_recv().ok())
    }

    async fn set_listener(
        &self,
        listener: Option<Arc<dyn MessageListener>>,
    ) -> Result<(), ProxyError> {
        let previous = self
            .listener_task
            .lock()
            .map_err(|_| ProxyError::ListenerError("listener slot poisoned".into()))?
            .take();
        if let Some(task) = previous {
            task.abort();
        }

        if let Some(listener) = listener {
            let receiver = Arc::clone(&self.receiver);
            let task = tokio::spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    match next {
                        Some(message) => {
                            if let Err(e) = listener.on_message(message) {
                                error!("Listener failed to handle message: {}", e);
                            }
                        }
                        None => break,
                    }
                }
            });
            *self
                .listener_task
                .lock()
                .map_err(|_| ProxyError::ListenerError("listener slot poisoned".into()))? =
                Some(task);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ProxyError> {
        self.closed.store(true, Ordering::Relaxed);
        if let Ok(mut slot) = self.listener_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
        self.receiver.lock().await.close();
        Ok(())
    }
}
