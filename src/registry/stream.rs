//! A named stream: one producer, many consumers
//!
//! Consumers are negotiated against the stream's media list when added and
//! receive every published sample in registration order.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::error::RegistryError;
use crate::consumer::Consumer;
use crate::media::{Media, MediaKind, Sample};
use crate::source::Producer;

/// One stream entry in the registry
pub struct Stream {
    name: String,
    medias: RwLock<Vec<Media>>,
    producer: Mutex<Option<Producer>>,
    consumers: RwLock<Vec<Arc<dyn Consumer>>>,
}

impl Stream {
    pub(crate) fn new(name: impl Into<String>, medias: Vec<Media>) -> Self {
        Self {
            name: name.into(),
            medias: RwLock::new(medias),
            producer: Mutex::new(None),
            consumers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the announced tracks
    pub fn medias(&self) -> Vec<Media> {
        self.medias.read().clone()
    }

    pub fn has_producer(&self) -> bool {
        self.producer.lock().is_some()
    }

    /// Description and URL of the attached producer
    pub fn producer_info(&self) -> Option<(String, String)> {
        self.producer
            .lock()
            .as_ref()
            .map(|p| (p.desc().to_string(), p.url().to_string()))
    }

    /// Attach a producer. Its media list replaces the stream's when the
    /// producer announced any tracks.
    pub(crate) fn set_producer(&self, producer: Producer) -> Result<(), RegistryError> {
        let mut slot = self.producer.lock();
        if slot.is_some() {
            return Err(RegistryError::ProducerAlreadyAttached(self.name.clone()));
        }

        if !producer.medias().is_empty() {
            *self.medias.write() = producer.medias().to_vec();
        }

        tracing::info!(
            stream = %self.name,
            producer = producer.desc(),
            url = producer.url(),
            tracks = producer.medias().len(),
            "Producer attached"
        );
        *slot = Some(producer);
        Ok(())
    }

    /// Detach and return the producer
    pub fn take_producer(&self) -> Option<Producer> {
        self.producer.lock().take()
    }

    /// Negotiate tracks with a consumer and start delivering samples to it.
    ///
    /// For each kind, the first codec in the consumer's preference order
    /// that the stream offers is handed to [`Consumer::add_track`]. Fails
    /// with [`RegistryError::CodecsNotMatched`] when nothing matches.
    pub fn add_consumer(&self, consumer: Arc<dyn Consumer>) -> Result<(), RegistryError> {
        let medias = self.medias.read().clone();
        let selection = consumer.selection();

        let mut matched = 0;
        for kind in [MediaKind::Video, MediaKind::Audio] {
            let codecs = match kind {
                MediaKind::Video => &selection.video,
                MediaKind::Audio => &selection.audio,
            };

            let found = codecs
                .iter()
                .find_map(|codec| medias.iter().position(|m| m.codec == *codec));

            if let Some(index) = found {
                consumer
                    .add_track(index, &medias[index])
                    .map_err(|e| RegistryError::TrackRejected {
                        stream: self.name.clone(),
                        reason: e.to_string(),
                    })?;
                matched += 1;
            }
        }

        if matched == 0 {
            let offered: Vec<&str> = medias.iter().map(|m| m.codec.name()).collect();
            return Err(RegistryError::CodecsNotMatched {
                stream: self.name.clone(),
                offered: offered.join(", "),
            });
        }

        let mut consumers = self.consumers.write();
        consumers.push(consumer);

        tracing::info!(
            stream = %self.name,
            tracks = matched,
            consumers = consumers.len(),
            "Consumer added"
        );
        Ok(())
    }

    /// Remove a consumer by identity. Returns whether it was attached.
    pub fn remove_consumer(&self, consumer: &Arc<dyn Consumer>) -> bool {
        let target = Arc::as_ptr(consumer).cast::<()>();

        let mut consumers = self.consumers.write();
        let before = consumers.len();
        consumers.retain(|c| Arc::as_ptr(c).cast::<()>() != target);
        let removed = consumers.len() != before;

        if removed {
            tracing::debug!(
                stream = %self.name,
                consumers = consumers.len(),
                "Consumer removed"
            );
        }
        removed
    }

    /// Ask every attached consumer to stop. Consumers deregister
    /// themselves as their sessions end.
    pub fn close(&self) {
        let consumers: Vec<Arc<dyn Consumer>> = self.consumers.read().clone();
        for consumer in &consumers {
            consumer.stop();
        }
        tracing::debug!(stream = %self.name, consumers = consumers.len(), "Stream closed");
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.read().len()
    }

    /// Fan a sample out to every consumer, awaiting each in turn
    pub async fn publish(&self, sample: &Sample) {
        let consumers: Vec<Arc<dyn Consumer>> = self.consumers.read().clone();
        for consumer in consumers {
            consumer.on_sample(sample).await;
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("name", &self.name)
            .field("medias", &self.medias.read().len())
            .field("consumers", &self.consumer_count())
            .finish()
    }
}
