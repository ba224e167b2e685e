//! Stream registry implementation
//!
//! The central registry that maps stream names to [`Stream`] entries.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::error::RegistryError;
use super::stream::Stream;
use crate::media::{Media, Sample};
use crate::source::Producer;

/// Central registry for all streams
///
/// Thread-safe via `RwLock`. Lookups from request handlers take the read
/// lock; the lock is never held across an await point.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: RwLock<HashMap<String, Arc<Stream>>>,
}

impl StreamRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a stream by name
    pub fn get(&self, name: &str) -> Option<Arc<Stream>> {
        self.streams.read().get(name).cloned()
    }

    /// Look up a stream, failing with [`RegistryError::StreamNotFound`]
    pub fn require(&self, name: &str) -> Result<Arc<Stream>, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::StreamNotFound(name.to_string()))
    }

    /// Register an empty stream with a known media list
    pub fn register(&self, name: &str, medias: Vec<Media>) -> Result<Arc<Stream>, RegistryError> {
        let mut streams = self.streams.write();
        if streams.contains_key(name) {
            return Err(RegistryError::StreamAlreadyExists(name.to_string()));
        }

        let stream = Arc::new(Stream::new(name, medias));
        streams.insert(name.to_string(), Arc::clone(&stream));

        tracing::info!(stream = %name, "Stream registered");
        Ok(stream)
    }

    /// Attach a resolved producer as the source of `name`, creating the
    /// stream when it does not exist yet
    pub fn attach_producer(
        &self,
        name: &str,
        producer: Producer,
    ) -> Result<Arc<Stream>, RegistryError> {
        let stream = {
            let mut streams = self.streams.write();
            Arc::clone(
                streams
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(Stream::new(name, Vec::new()))),
            )
        };

        stream.set_producer(producer)?;
        Ok(stream)
    }

    /// Remove a stream and stop its consumers. They keep their `Arc`
    /// until they deregister.
    pub fn remove(&self, name: &str) -> Option<Arc<Stream>> {
        let removed = self.streams.write().remove(name);
        if let Some(stream) = &removed {
            stream.close();
            tracing::info!(stream = %name, "Stream removed");
        }
        removed
    }

    /// Publish a sample to a stream's consumers. Returns `false` when the
    /// stream does not exist.
    pub async fn publish(&self, name: &str, sample: &Sample) -> bool {
        match self.get(name) {
            Some(stream) => {
                stream.publish(sample).await;
                true
            }
            None => false,
        }
    }

    /// Get total number of streams
    pub fn stream_count(&self) -> usize {
        self.streams.read().len()
    }

    /// Registered stream names, sorted
    pub fn stream_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.streams.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use bytes::Bytes;

    use super::*;
    use crate::media::MediaSelection;
    use crate::registry::stream::tests::{camera_medias, RecordingConsumer};

    #[test]
    fn test_register_stream() {
        let registry = StreamRegistry::new();

        registry.register("cam1", camera_medias()).unwrap();
        assert!(registry.get("cam1").is_some());
        assert_eq!(registry.stream_count(), 1);

        // Can't register the same name twice
        let result = registry.register("cam1", Vec::new());
        assert!(matches!(result, Err(RegistryError::StreamAlreadyExists(_))));
    }

    #[test]
    fn test_missing_stream() {
        let registry = StreamRegistry::new();
        assert!(registry.get("nope").is_none());

        let err = registry.require("nope").unwrap_err();
        assert_eq!(err, RegistryError::StreamNotFound("nope".into()));
        assert_eq!(err.to_string(), "stream not found");
    }

    #[test]
    fn test_remove_stream() {
        let registry = StreamRegistry::new();
        registry.register("b", Vec::new()).unwrap();
        registry.register("a", Vec::new()).unwrap();
        assert_eq!(registry.stream_names(), vec!["a", "b"]);

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert_eq!(registry.stream_count(), 1);
    }

    #[test]
    fn test_remove_stops_consumers() {
        let registry = StreamRegistry::new();
        let stream = registry.register("cam1", camera_medias()).unwrap();
        let consumer = RecordingConsumer::new(MediaSelection::mp4());
        stream.add_consumer(consumer.clone()).unwrap();

        registry.remove("cam1").unwrap();
        assert!(consumer.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_publish_by_name() {
        let registry = StreamRegistry::new();
        let stream = registry.register("cam1", camera_medias()).unwrap();
        let consumer = RecordingConsumer::new(MediaSelection::mp4());
        stream.add_consumer(consumer.clone()).unwrap();

        let sample = Sample::video(1, 0, Bytes::from_static(b"frame"), true);
        assert!(registry.publish("cam1", &sample).await);
        assert!(!registry.publish("cam2", &sample).await);
        assert_eq!(consumer.samples.load(Ordering::SeqCst), 1);
    }
}
