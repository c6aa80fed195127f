//! Condense round-trip demo.
//!
//! Wraps an in-memory producer/consumer pair with the proxy, sends a burst
//! of near-identical JSON messages, and shows one condensed envelope going
//! over the wire while the consumer still observes every original.

use std::sync::Arc;
use std::time::Duration;

use mq_proxy::broker::in_memory_channel;
use mq_proxy::message::{Destination, Message};
use mq_proxy::{BufferedProxyConsumer, ProxyConfig, ProxyProducer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info,mq_proxy=debug"))
        .init();

    let (producer_delegate, consumer_delegate) =
        in_memory_channel(64, Some(Destination::queue("sensor-readings")));

    let producer = ProxyProducer::builder(Arc::new(producer_delegate))
        .configuration(
            ProxyConfig::builder()
                .condenser_window_ms(500)
                .condenser_max_batch_size(50)
                .flush_interval_ms(250)
                .build(),
        )
        .build();
    let consumer = BufferedProxyConsumer::wrap(Arc::new(consumer_delegate));

    // A burst of readings identical apart from their timestamps.
    println!("Sending 5 near-identical readings...");
    for i in 0..5 {
        let body = format!(
            r#"{{"sensor":"temp-1","celsius":21.5,"timestamp":{}}}"#,
            1_700_000_000_000_i64 + i
        );
        producer.send(Message::text(body)).await?;
    }
    println!("Buffered on the send side: {}", producer.buffered_count());

    // Let the window expire and the background flush run.
    tokio::time::sleep(Duration::from_millis(900)).await;

    // The consumer sees the originals one at a time, timestamps restored.
    for _ in 0..5 {
        if let Some(message) = consumer.receive_timeout(Duration::from_millis(100)).await? {
            println!("Received: {}", message.text_content().unwrap_or(""));
        }
    }

    if let Some(stats) = producer.condenser_stats() {
        println!(
            "Condenser stats: {} messages in, {} batches out",
            stats.input_messages, stats.output_batches
        );
    }

    producer.close().await?;
    consumer.close().await?;
    Ok(())
}
