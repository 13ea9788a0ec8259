//! Minimal QoS 0 MQTT 3.1.1 subscriber client.
//!
//! Establishes a session with a broker over a single TCP connection,
//! subscribes to one topic filter and decodes broker-pushed messages,
//! handing JSON payloads of matching topics to a callback.
//!
//! ## Components
//!
//! - [`protocol::codec`]: remaining-length codec and primitive encoders
//! - [`protocol::v4`]: message model, per-type encode/decode and the inbound factory
//! - [`reader`]: exact-count reads and frame reads over partial chunks
//! - [`Client`]: handshake sequencing and the keepalive receive loop
//!
//! ## Example
//!
//! ```no_run
//! use mqttlite::{Client, ClientConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mqttlite::Result<()> {
//!     let mut client = Client::open(ClientConfig::new("192.168.1.10:1883")).await?;
//!     client.connect().await?;
//!     client.subscribe().await?;
//!
//!     let cancel = CancellationToken::new();
//!     client
//!         .run("/SENSOR", &cancel, |value| {
//!             println!("{}", value["BME280"]["Temperature"]);
//!             Ok(())
//!         })
//!         .await?;
//!
//!     client.disconnect().await
//! }
//! ```

mod client;
mod error;
pub mod protocol;
pub mod reader;
mod types;

pub use client::{Client, ClientConfig};
pub use error::{BoxError, Error, Result};
pub use protocol::v4::{Message, Publish};
pub use types::{FixedHeader, MessageType, QoS, SessionState};
