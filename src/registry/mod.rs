//! Stream registry for producer/consumer routing
//!
//! The registry maps stream names to [`Stream`] entries. A stream owns at
//! most one producer and fans published samples out to its consumers.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<StreamRegistry>
//!                  ┌──────────────────────────┐
//!                  │ streams: HashMap<String, │
//!                  │   Arc<Stream> {          │
//!                  │     medias,              │
//!                  │     producer,            │
//!                  │     consumers: Vec<Arc<  │
//!                  │       dyn Consumer>>,    │
//!                  │   }                      │
//!                  │ >                        │
//!                  └────────────┬─────────────┘
//!                               │
//!        ┌──────────────────────┼──────────────────────┐
//!        │                      │                      │
//!        ▼                      ▼                      ▼
//!   [Producer]            [Consumer]             [Consumer]
//!   publish(sample) ──►   on_sample().await ──►  on_sample().await
//! ```
//!
//! # Zero-Copy Design
//!
//! `Sample::data` is `bytes::Bytes`; every consumer borrows the same sample
//! and muxes from the shared allocation.

pub mod error;
pub mod store;
pub mod stream;

pub use error::RegistryError;
pub use store::StreamRegistry;
pub use stream::Stream;
