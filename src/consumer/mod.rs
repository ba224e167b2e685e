//! Stream consumers
//!
//! A consumer is a sink the registry attaches to a stream. The stream
//! negotiates tracks through [`Consumer::add_track`] and then awaits
//! [`Consumer::on_sample`] once per outbound sample.
//!
//! ```text
//!   Stream::publish(sample)
//!        │
//!        ├──► FragmentedConsumer::on_sample ──► Muxer ──► OutputChannel ──► HTTP body
//!        │
//!        └──► KeyframeConsumer::on_sample ──► oneshot (first keyframe only)
//! ```
//!
//! Session wiring (registration guard, exit signal, deadline timer) lives in
//! [`lifecycle`].

pub mod exit;
pub mod fragmented;
pub mod keyframe;
pub mod lifecycle;

use async_trait::async_trait;

use crate::error::Result;
use crate::media::{Media, MediaSelection, Sample};

pub use exit::{exit_signal, ExitReceiver, ExitSender};
pub use fragmented::FragmentedConsumer;
pub use keyframe::KeyframeConsumer;
pub use lifecycle::{
    capture_keyframe, open_fragmented, DeadlineTimer, FragmentedRequest, FragmentedSession,
    OutputChannel, Registration, SessionStart, Snapshot,
};

/// Remote endpoint metadata for logging and listings
#[derive(Debug, Clone, Default)]
pub struct ConsumerInfo {
    /// Human-readable consumer kind, e.g. `MP4/HTTP`
    pub desc: String,
    /// Peer address, followed by `X-Forwarded-For` when present
    pub remote_addr: String,
    pub user_agent: String,
}

impl ConsumerInfo {
    pub fn new(desc: impl Into<String>) -> Self {
        Self {
            desc: desc.into(),
            ..Default::default()
        }
    }

    pub fn remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = addr.into();
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }
}

/// A sink attached to a stream
#[async_trait]
pub trait Consumer: Send + Sync {
    fn info(&self) -> &ConsumerInfo;

    /// Codecs this consumer accepts, per kind, in preference order
    fn selection(&self) -> &MediaSelection;

    /// Accept a negotiated track. `media_index` is the track's position in
    /// the stream's media list, as carried by [`Sample::media`].
    fn add_track(&self, media_index: usize, media: &Media) -> Result<()>;

    /// Deliver one sample. Delivery failures are reported through the
    /// consumer's own exit path, never back to the stream.
    async fn on_sample(&self, sample: &Sample);

    /// The stream is closing; end the session cleanly
    fn stop(&self) {}
}

/// Stream track index to muxer track index
#[derive(Debug, Default)]
pub(crate) struct TrackMap {
    entries: Vec<usize>,
}

impl TrackMap {
    pub(crate) fn push(&mut self, media_index: usize) -> usize {
        self.entries.push(media_index);
        self.entries.len() - 1
    }

    pub(crate) fn get(&self, media_index: usize) -> Option<usize> {
        self.entries.iter().position(|&i| i == media_index)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
