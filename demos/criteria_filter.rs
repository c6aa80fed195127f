//! Criteria filtering demo.
//!
//! Registers property and content criteria on the proxy producer and shows
//! which messages make it through to the delegate.

use std::sync::Arc;
use std::time::Duration;

use mq_proxy::broker::in_memory_channel;
use mq_proxy::criteria::{ContentCriteria, PropertyCriteria};
use mq_proxy::message::Message;
use mq_proxy::{BufferedProxyConsumer, ProxyConfig, ProxyProducer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info,mq_proxy=debug"))
        .init();

    let (producer_delegate, consumer_delegate) = in_memory_channel(64, None);

    // Condensing off so the filtering effect is easy to see.
    let producer = ProxyProducer::builder(Arc::new(producer_delegate))
        .configuration(ProxyConfig::builder().condenser_enabled(false).build())
        .add_criteria(Arc::new(PropertyCriteria::equals("priority", "high")))
        .add_criteria(Arc::new(ContentCriteria::valid_json()))
        .build();
    let consumer = BufferedProxyConsumer::wrap(Arc::new(consumer_delegate));

    let mut important = Message::text(r#"{"event":"disk-full","host":"db-3"}"#);
    important.set_string_property("priority", "high");

    let mut noise = Message::text(r#"{"event":"heartbeat","host":"db-3"}"#);
    noise.set_string_property("priority", "low");

    let mut broken = Message::text("not json at all");
    broken.set_string_property("priority", "high");

    producer.send(important).await?;
    producer.send(noise).await?;
    producer.send(broken).await?;

    println!("Sent 3 messages; only high-priority valid JSON passes:");
    while let Some(message) = consumer.receive_timeout(Duration::from_millis(100)).await? {
        println!("  delivered: {}", message.text_content().unwrap_or(""));
    }

    producer.close().await?;
    consumer.close().await?;
    Ok(())
}
