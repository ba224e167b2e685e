//! relay-rs: media source sniffing and live fragmented MP4 over HTTP
//!
//! Two halves share one [`StreamRegistry`]:
//!
//! ```text
//!   inbound                                   outbound
//!
//!   locator ──► Sniffer ──► Producer          GET /api/stream.mp4 ──► FragmentedConsumer
//!                              │              GET /api/frame.mp4  ──► KeyframeConsumer
//!                              ▼                                          │
//!                    StreamRegistry::attach_producer     Stream::add_consumer
//!                              │                                          │
//!                              └──────────► Stream ◄──────────────────────┘
//!                                    publish(sample) fan-out
//! ```
//!
//! # Example
//!
//! ```no_run
//! use relay_rs::{RelayServer, ServerConfig, Sniffer, SnifferConfig};
//!
//! # async fn run() -> relay_rs::Result<()> {
//! let server = RelayServer::new(ServerConfig::default());
//!
//! let sniffer = Sniffer::new(SnifferConfig::default())?;
//! let producer = sniffer.resolve("http://cam.local/video.flv").await?;
//! server.registry().attach_producer("cam1", producer)?;
//!
//! server.run().await
//! # }
//! ```

pub mod consumer;
pub mod error;
pub mod fmp4;
pub mod media;
pub mod registry;
pub mod server;
pub mod source;

pub use consumer::{Consumer, ConsumerInfo, FragmentedConsumer, KeyframeConsumer};
pub use error::{Error, MediaError, Result};
pub use fmp4::Muxer;
pub use media::{Codec, Media, MediaKind, MediaSelection, Sample};
pub use registry::{RegistryError, Stream, StreamRegistry};
pub use server::{RelayServer, ServerConfig};
pub use source::{Locator, Producer, Sniffer, SnifferConfig};
