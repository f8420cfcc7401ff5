//! MQTT 3.1 / 3.1.1 client with QoS 0/1/2 delivery.
//!
//! The client keeps every unacknowledged exchange in a pending store, resends
//! it with DUP set after the retry timeout, pings the broker on a keepalive
//! schedule, and reconnects when the connection goes away. Subscriptions are
//! renewed after every reconnect.
//!
//! ## Components
//!
//! - [`Client`]: session engine, driven by [`Client::step`] / [`Client::run`]
//! - [`protocol`]: wire codec for the 14 control packets
//! - [`Handler`]: callbacks for inbound packets
//!
//! ## Example
//!
//! ```no_run
//! use giztoy_mqttc::{Client, ClientConfig, QoS, on_publish};
//!
//! #[tokio::main]
//! async fn main() -> giztoy_mqttc::Result<()> {
//!     let config = ClientConfig::new("127.0.0.1:1883", "client-1").with_keep_alive(30);
//!     let mut client = Client::new(config)?.with_handler(on_publish(|_, msg| {
//!         println!("{}: {:?}", msg.topic, msg.payload);
//!     }));
//!     client.connect().await?;
//!
//!     client.subscribe(&[("sensors/#", QoS::AtLeastOnce)])?;
//!     client.publish_sync("sensors/temp", "21.5", QoS::ExactlyOnce, false).await?;
//!
//!     // Process inbound traffic until the subscriptions go away.
//!     client.run().await
//! }
//! ```

mod client;
mod config;
mod error;
mod handler;
mod pid;
pub mod protocol;
mod session;
mod store;
pub mod topic;
pub mod transport;
mod types;

pub use client::{Client, ConnectionState};
pub use config::{ClientConfig, DEFAULT_CONNECT_ATTEMPTS, DEFAULT_RETRY_TIMEOUT, generate_client_id};
pub use error::{Error, ProtocolError, Result};
pub use handler::{Handler, PublishFn, on_publish};
pub use pid::PacketIdGenerator;
pub use session::{Session, SubscriptionState};
pub use store::{PendingAck, PendingStore};
pub use transport::{Connector, TcpConnector, TransportType};
pub use types::{Message, ProtocolVersion, QoS, Will};

#[cfg(feature = "tls")]
pub use transport::tls::TlsConnector;

#[cfg(test)]
mod tests;
