use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Failed to parse JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Delegate send failed: {0}")]
    SendFailed(String),

    #[error("Delegate receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Internal channel closed")]
    ChannelClosed,

    #[error("Producer is closed")]
    ProducerClosed,

    #[error("Consumer is closed")]
    ConsumerClosed,

    #[error("Listener error: {0}")]
    ListenerError(String),
}
