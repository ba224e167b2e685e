//! Fragmented MP4 consumer
//!
//! Muxes every negotiated track into one fMP4 stream. Nothing is written
//! until [`FragmentedConsumer::start`]; after that, samples are dropped
//! until the first video keyframe when a video track was negotiated.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;

use super::lifecycle::OutputChannel;
use super::{Consumer, ConsumerInfo, TrackMap};
use crate::error::Result;
use crate::fmp4::Muxer;
use crate::media::{Media, MediaKind, MediaSelection, Sample};

#[derive(Debug)]
struct MuxState {
    muxer: Muxer,
    tracks: TrackMap,
    has_video: bool,
    keyframe_seen: bool,
}

/// fMP4 sink writing to an [`OutputChannel`]
pub struct FragmentedConsumer {
    info: ConsumerInfo,
    selection: MediaSelection,
    state: Mutex<MuxState>,
    started: AtomicBool,
    output: OutputChannel,
}

impl FragmentedConsumer {
    pub fn new(info: ConsumerInfo, selection: MediaSelection, output: OutputChannel) -> Self {
        Self {
            info,
            selection,
            state: Mutex::new(MuxState {
                muxer: Muxer::new(Vec::new()),
                tracks: TrackMap::default(),
                has_video: false,
                keyframe_seen: false,
            }),
            started: AtomicBool::new(false),
            output,
        }
    }

    /// Build the init segment for the negotiated tracks
    pub fn init(&self) -> Result<BytesMut> {
        self.state.lock().muxer.init_segment()
    }

    pub fn mime_type(&self) -> String {
        self.state.lock().muxer.mime_type()
    }

    /// Begin forwarding samples
    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn output(&self) -> &OutputChannel {
        &self.output
    }
}

#[async_trait]
impl Consumer for FragmentedConsumer {
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
        if media.kind() == MediaKind::Video {
            state.has_video = true;
        }
        Ok(())
    }

    async fn on_sample(&self, sample: &Sample) {
        if !self.is_started() {
            return;
        }

        let fragment = {
            let mut state = self.state.lock();
            let Some(track) = state.tracks.get(sample.media) else {
                return;
            };

            if state.has_video && !state.keyframe_seen {
                let is_video = state
                    .muxer
                    .media(track)
                    .is_some_and(|m| m.kind() == MediaKind::Video);
                if !(is_video && sample.keyframe) {
                    return;
                }
                state.keyframe_seen = true;
            }

            state.muxer.fragment(track, sample)
        };

        if let Some(data) = fragment {
            self.output.write(data).await;
        }
    }

    fn stop(&self) {
        self.output.close();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::consumer::exit_signal;
    use crate::media::Codec;

    fn consumer(depth: usize) -> (FragmentedConsumer, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(depth);
        let (exit, _) = exit_signal();
        let consumer = FragmentedConsumer::new(
            ConsumerInfo::new("MP4/HTTP"),
            MediaSelection::mp4(),
            OutputChannel::new(tx, exit),
        );
        (consumer, rx)
    }

    fn negotiate(consumer: &FragmentedConsumer) {
        let video = Media::video(Codec::H264, Bytes::from_static(&[1, 0x64, 0, 0x1F]), 640, 480);
        let audio = Media::audio(Codec::Aac, 44100, 2, Bytes::from_static(&[0x12, 0x10]));
        consumer.add_track(4, &video).unwrap();
        consumer.add_track(7, &audio).unwrap();
    }

    #[tokio::test]
    async fn test_samples_dropped_before_start() {
        let (consumer, mut rx) = consumer(8);
        negotiate(&consumer);

        consumer
            .on_sample(&Sample::video(4, 0, Bytes::from_static(b"k"), true))
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_waits_for_first_keyframe() {
        let (consumer, mut rx) = consumer(8);
        negotiate(&consumer);
        consumer.start();

        consumer
            .on_sample(&Sample::audio(7, 0, Bytes::from_static(b"a")))
            .await;
        consumer
            .on_sample(&Sample::video(4, 0, Bytes::from_static(b"p"), false))
            .await;
        assert!(rx.try_recv().is_err());

        consumer
            .on_sample(&Sample::video(4, 3000, Bytes::from_static(b"k"), true))
            .await;
        consumer
            .on_sample(&Sample::audio(7, 1024, Bytes::from_static(b"a")))
            .await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_track_ignored() {
        let (consumer, mut rx) = consumer(8);
        negotiate(&consumer);
        consumer.start();

        consumer
            .on_sample(&Sample::video(0, 0, Bytes::from_static(b"k"), true))
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_init_requires_tracks() {
        let (consumer, _rx) = consumer(1);
        assert!(consumer.init().is_err());

        negotiate(&consumer);
        assert!(consumer.init().is_ok());
        assert_eq!(
            consumer.mime_type(),
            "video/mp4; codecs=\"avc1.64001F,mp4a.40.2\""
        );
    }
}
