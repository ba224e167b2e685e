//! Keyframe snapshot consumer
//!
//! Accepts video only. The first keyframe is muxed into a self-contained
//! init segment + fragment and delivered once; every later sample is a
//! no-op.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::{Consumer, ConsumerInfo, TrackMap};
use crate::error::Result;
use crate::fmp4::Muxer;
use crate::media::{Media, MediaSelection, Sample};

#[derive(Debug)]
struct SnapshotState {
    muxer: Muxer,
    tracks: TrackMap,
    tx: Option<oneshot::Sender<Result<Bytes>>>,
}

/// Single-keyframe sink
pub struct KeyframeConsumer {
    info: ConsumerInfo,
    selection: MediaSelection,
    state: Mutex<SnapshotState>,
}

impl KeyframeConsumer {
    /// Create a consumer delivering its snapshot through `tx`
    pub fn new(info: ConsumerInfo, tx: oneshot::Sender<Result<Bytes>>) -> Self {
        Self {
            info,
            selection: MediaSelection::mp4().video_only(),
            state: Mutex::new(SnapshotState {
                muxer: Muxer::new(Vec::new()),
                tracks: TrackMap::default(),
                tx: Some(tx),
            }),
        }
    }

    pub fn mime_type(&self) -> String {
        self.state.lock().muxer.mime_type()
    }

    /// Whether the snapshot has been delivered (or abandoned)
    pub fn is_done(&self) -> bool {
        self.state.lock().tx.is_none()
    }
}

#[async_trait]
impl Consumer for KeyframeConsumer {
    fn info(&self) -> &ConsumerInfo {
        &self.info
    }

    fn selection(&self) -> &MediaSelection {
        &self.selection
    }

    fn add_track(&self, media_index: usize, media: &Media) -> Result<()> {
        let mut state = self.state.lock();
        state.muxer.add_track(media.clone());
        state.tracks.push(media_index);
        Ok(())
    }

    async fn on_sample(&self, sample: &Sample) {
        if !sample.keyframe {
            return;
        }

        let mut state = self.state.lock();
        let Some(track) = state.tracks.get(sample.media) else {
            return;
        };
        let Some(tx) = state.tx.take() else {
            return;
        };

        let snapshot = state.muxer.init_segment().map(|init| {
            let mut buf = BytesMut::from(&init[..]);
            if let Some(fragment) = state.muxer.fragment(track, sample) {
                buf.extend_from_slice(&fragment);
            }
            buf.freeze()
        });

        if tx.send(snapshot).is_err() {
            tracing::debug!("Snapshot receiver gone");
        }
    }

    fn stop(&self) {
        self.state.lock().tx.take();
    }
}
