//! ezmq sample binary.
//!
//! `ezmq publish` starts a publisher and sends a sample event (or byte blob)
//! at a fixed interval; `ezmq subscribe` connects to a publisher and prints
//! what it receives until interrupted.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use ezmq_socket::{Context, Subscriber, SubscriberHandler};
use ezmq_wire::{ByteData, Envelope, Event, Topic};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::EzmqConfig;
use logging::EzmqLogFormatter;

/// Topic-addressed publish/subscribe over TCP
#[derive(Parser, Debug)]
#[command(name = "ezmq", version, about = "Topic-addressed publish/subscribe over TCP")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, global = true, default_value = "ezmq.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish sample messages
    Publish {
        /// Port to listen on (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,

        /// Topic to publish on (repeatable); no topic publishes untopiced
        #[arg(short, long)]
        topic: Vec<String>,

        /// Number of messages to send
        #[arg(long, default_value_t = 15)]
        count: u32,

        /// Delay between messages, e.g. 2s
        #[arg(long, default_value = "2s")]
        interval: humantime::Duration,

        /// Send a byte blob instead of an event
        #[arg(long)]
        bytes: bool,
    },

    /// Receive and print messages
    Subscribe {
        /// Publisher host (defaults to the configured ip)
        #[arg(long)]
        ip: Option<String>,

        /// Publisher port (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,

        /// Topic to subscribe to (repeatable); no topic subscribes untopiced
        #[arg(short, long)]
        topic: Vec<String>,

        /// Print events as JSON lines on stdout
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("ezmq={}", args.log_level).parse()?)
        .add_directive(format!("ezmq_socket={}", args.log_level).parse()?)
        .add_directive(format!("ezmq_wire={}", args.log_level).parse()?);

    let formatter = EzmqLogFormatter::new("ezmq".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(true)
        .event_format(formatter)
        .init();

    info!("Starting ezmq v{}", env!("CARGO_PKG_VERSION"));

    let config = EzmqConfig::load_from_file(&args.config)?;

    let context = Context::new(config.endpoint.clone());
    context.initialize()?;

    let result = match args.command {
        Command::Publish {
            port,
            topic,
            count,
            interval,
            bytes,
        } => {
            let port = port.unwrap_or(config.port);
            run_publisher(&context, port, &topic, count, interval.into(), bytes).await
        }
        Command::Subscribe {
            ip,
            port,
            topic,
            json,
        } => {
            let ip = ip.unwrap_or_else(|| config.ip.clone());
            let port = port.unwrap_or(config.port);
            run_subscriber(&context, &ip, port, &topic, json).await
        }
    };

    context.terminate()?;
    result
}

async fn run_publisher(
    context: &Context,
    port: u16,
    topics: &[String],
    count: u32,
    interval: std::time::Duration,
    bytes: bool,
) -> anyhow::Result<()> {
    let publisher = context.publisher(port)?;
    publisher
        .start()
        .await
        .with_context(|| format!("failed to start publisher on port {}", port))?;
    component_info!("publisher", "Publishing {} message(s) every {:?}", count, interval);

    let envelope = if bytes {
        Envelope::from(sample_bytes())
    } else {
        Envelope::from(sample_event())
    };

    for sequence in 1..=count {
        let published = match topics {
            [] => publisher.publish(&envelope).await,
            [topic] => publisher.publish_on_topic(topic, &envelope).await,
            topics => publisher.publish_on_topic_list(topics, &envelope).await,
        };
        if let Err(e) = published {
            component_warn!("publisher", "Publish failed ({:?}): {}", e.code(), e);
        } else {
            component_info!(
                "publisher",
                "Published {:?} #{} to {} subscriber(s)",
                envelope.content_type(),
                sequence,
                publisher.peer_count().await
            );
        }

        if sequence == count {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    publisher.stop().await?;
    Ok(())
}

async fn run_subscriber(
    context: &Context,
    ip: &str,
    port: u16,
    topics: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let handler = Arc::new(PrintHandler { json });
    let subscriber = context.subscriber(ip, port, handler)?;
    subscriber.start().await?;

    if let Err(e) = subscribe(&subscriber, topics).await {
        subscriber.stop().await?;
        return Err(e.into());
    }
    component_info!("subscriber", "Listening to {}:{}, Ctrl-C to quit", ip, port);

    tokio::signal::ctrl_c().await?;
    info!("Interrupted");

    subscriber.stop().await?;
    Ok(())
}

async fn subscribe(subscriber: &Subscriber, topics: &[String]) -> Result<(), ezmq_socket::EzmqError> {
    match topics {
        [] => subscriber.subscribe().await,
        [topic] => subscriber.subscribe_for_topic(topic).await,
        topics => subscriber.subscribe_for_topic_list(topics).await,
    }
}

/// Prints received messages
struct PrintHandler {
    json: bool,
}

impl PrintHandler {
    fn print(&self, topic: Option<&Topic>, envelope: &Envelope) {
        let topic = topic.map(Topic::as_str).unwrap_or("-");
        match envelope {
            Envelope::Event(event) if self.json => match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => component_warn!("subscriber", "Cannot render event as JSON: {}", e),
            },
            Envelope::Event(event) => {
                component_info!(
                    "subscriber",
                    "[{}] event id={} device={} readings={}",
                    topic,
                    event.id,
                    event.device,
                    event.reading_count()
                );
                for reading in event.readings() {
                    component_info!(
                        "subscriber",
                        "    {} = {} (device={}, created={})",
                        reading.name,
                        reading.value,
                        reading.device,
                        reading.created
                    );
                }
            }
            Envelope::ByteData(data) => {
                component_info!(
                    "subscriber",
                    "[{}] {} byte(s): {:02x?}",
                    topic,
                    data.len(),
                    data.as_bytes()
                );
            }
        }
    }
}

impl SubscriberHandler for PrintHandler {
    fn on_message(&self, envelope: &Envelope) {
        debug!("Untopiced message received");
        self.print(None, envelope);
    }

    fn on_topic_message(&self, topic: &Topic, envelope: &Envelope) {
        self.print(Some(topic), envelope);
    }
}

fn sample_event() -> Event {
    let mut event = Event::new("id", "device");
    event.created = 10;
    event.modified = 20;
    event.origin = 20;
    event.pushed = 10;

    let reading = event.add_reading();
    reading.id = "id1".to_string();
    reading.name = "reading1".to_string();
    reading.value = "25".to_string();
    reading.device = "device".to_string();
    reading.created = 25;
    reading.modified = 20;
    reading.origin = 25;
    reading.pushed = 1;

    let reading = event.add_reading();
    reading.id = "id2".to_string();
    reading.name = "reading2".to_string();
    reading.value = "20".to_string();
    reading.device = "device".to_string();
    reading.created = 30;
    reading.modified = 20;
    reading.origin = 25;
    reading.pushed = 1;

    event
}

fn sample_bytes() -> ByteData {
    ByteData::from(&[0x40u8, 0x05, 0x10, 0x11, 0x12][..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "ezmq", "--log-level", "debug", "publish", "--port", "6000", "-t", "t1", "-t", "t2",
            "--interval", "500ms", "--bytes",
        ]);
        assert_eq!(args.log_level, "debug");
        match args.command {
            Command::Publish {
                port,
                topic,
                count,
                interval,
                bytes,
            } => {
                assert_eq!(port, Some(6000));
                assert_eq!(topic, vec!["t1", "t2"]);
                assert_eq!(count, 15);
                assert_eq!(
                    std::time::Duration::from(interval),
                    std::time::Duration::from_millis(500)
                );
                assert!(bytes);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let args = Args::parse_from(["ezmq", "subscribe", "--json"]);
        assert!(matches!(
            args.command,
            Command::Subscribe { ip: None, port: None, json: true, .. }
        ));
    }

    #[test]
    fn test_sample_event() {
        let event = sample_event();
        assert_eq!(event.reading_count(), 2);
        assert_eq!(event.get_reading(0).map(|r| r.value.as_str()), Some("25"));
        assert_eq!(event.get_reading(1).map(|r| r.name.as_str()), Some("reading2"));
        assert_eq!(sample_bytes().len(), 5);
    }
}
