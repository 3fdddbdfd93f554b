//! Publisher and subscriber endpoints for ezmq.
//!
//! A [`Context`] creates [`Publisher`]s and [`Subscriber`]s. Publishers
//! listen on a TCP port and fan frames out to every connected subscriber;
//! subscribers connect (and reconnect) to one or more publishers, filter by
//! topic and deliver decoded [`Envelope`](ezmq_wire::Envelope)s to a
//! [`SubscriberHandler`].
//!
//! ```no_run
//! use ezmq_socket::{Context, EndpointConfig};
//! use ezmq_wire::{ByteData, Envelope};
//!
//! # async fn run() -> Result<(), ezmq_socket::EzmqError> {
//! let context = Context::new(EndpointConfig::default());
//! context.initialize()?;
//!
//! let publisher = context.publisher(5562)?;
//! publisher.start().await?;
//! publisher
//!     .publish_on_topic("home/livingroom", &Envelope::from(ByteData::from(&b"on"[..])))
//!     .await?;
//! publisher.stop().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod publisher;
pub mod registry;
pub mod subscriber;
pub mod transport;

pub use config::EndpointConfig;
pub use context::{Context, ContextStatus};
pub use endpoint::{EndpointState, Role};
pub use error::{result_code, ErrorCode, EzmqError, RegistryError};
pub use publisher::Publisher;
pub use registry::TopicRegistry;
pub use subscriber::{PeerAddr, Subscriber, SubscriberHandler};
