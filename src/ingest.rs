//! Ingestion: validate an inbound reading, store it, then optionally publish it.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::IngestError;
use crate::models::{InboundReading, SensorKind};
use crate::normalize::normalize_reading;
use crate::publisher::Publisher;
use crate::store::SensorStore;

// ---

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ingested {
    pub id: i64,
    pub kind: SensorKind,
    pub published: bool,
}

/// Routes readings to storage and, when a publisher is wired in, to the bus.
///
/// Running without a publisher is a normal mode, not a degraded one: the
/// write path is identical and only the final publish step is skipped.
pub struct SensorIngestor {
    store: Arc<dyn SensorStore>,
    publisher: Option<Arc<dyn Publisher>>,
}

impl SensorIngestor {
    // ---
    pub fn new(store: Arc<dyn SensorStore>, publisher: Option<Arc<dyn Publisher>>) -> Self {
        Self { store, publisher }
    }

    pub fn has_publisher(&self) -> bool {
        self.publisher.is_some()
    }

    /// Store one reading and publish it.
    ///
    /// Nothing is written when the kind is unknown or `estado` cannot be
    /// normalized. A publish failure is reported as
    /// [`IngestError::Publish`], but the row is already committed by then.
    #[tracing::instrument(
        name = "ingest",
        skip_all,
        fields(sensor = %reading.sensor, serial = %reading.numero_serie)
    )]
    pub async fn ingest(&self, reading: InboundReading) -> Result<Ingested, IngestError> {
        // ---
        let kind: SensorKind = reading.sensor.parse()?;
        let normalized = normalize_reading(kind, reading)?;

        let id = self.store.create_reading(&normalized).await?;
        debug!("Stored {} reading with id {}", kind, id);

        let Some(publisher) = &self.publisher else {
            return Ok(Ingested {
                id,
                kind,
                published: false,
            });
        };

        if let Err(source) = publisher.publish(&normalized).await {
            warn!("Reading {} stored but publish failed: {}", id, source);
            return Err(IngestError::Publish {
                stored_id: id,
                source,
            });
        }

        Ok(Ingested {
            id,
            kind,
            published: true,
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{RawState, SensorState};
    use crate::testing::{MemoryStore, RecordingPublisher};

    fn reading(sensor: &str, estado: RawState) -> InboundReading {
        // ---
        InboundReading {
            numero_serie: "ESP32-1".to_string(),
            sensor: sensor.to_string(),
            fecha_activacion: "2024-01-01T00:00:00Z".to_string(),
            fecha_desactivacion: "2024-01-01T00:05:00Z".to_string(),
            estado,
        }
    }

    #[tokio::test]
    async fn test_unknown_kind_never_touches_storage() {
        // ---
        let store = Arc::new(MemoryStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let ingestor = SensorIngestor::new(store.clone(), Some(publisher.clone()));

        let err = ingestor
            .ingest(reading("UNKNOWN", RawState::Integer(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::UnsupportedKind(ref e) if e.kind == "UNKNOWN"));
        assert!(err.is_client_error());
        assert_eq!(store.write_count(), 0);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_bad_state_never_touches_storage() {
        // ---
        let store = Arc::new(MemoryStore::default());
        let ingestor = SensorIngestor::new(store.clone(), None);

        let err = ingestor
            .ingest(reading("MQ_135", RawState::Text("abc".to_string())))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Normalization(ref e) if e.kind == SensorKind::Mq135));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_without_publisher_writes_once() {
        // ---
        let store = Arc::new(MemoryStore::default());
        let ingestor = SensorIngestor::new(store.clone(), None);

        let outcome = ingestor
            .ingest(reading("MQ_2", RawState::Text("1".to_string())))
            .await
            .unwrap();

        assert_eq!(outcome.kind, SensorKind::Mq2);
        assert!(!outcome.published);
        assert!(!ingestor.has_publisher());

        let rows = store.rows(SensorKind::Mq2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, outcome.id);
        assert_eq!(rows[0].estado, SensorState::Integer(1));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_publishes_normalized_reading_after_write() {
        // ---
        let store = Arc::new(MemoryStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let ingestor = SensorIngestor::new(store.clone(), Some(publisher.clone()));

        let outcome = ingestor
            .ingest(reading("DHT_22", RawState::Number(23.5)))
            .await
            .unwrap();

        assert!(outcome.published);
        assert_eq!(store.rows(SensorKind::Dht22).len(), 1);

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].kind, SensorKind::Dht22);
        assert_eq!(published[0].estado, SensorState::Text("23.5".to_string()));
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_committed_write() {
        // ---
        let store = Arc::new(MemoryStore::default());
        let publisher = Arc::new(RecordingPublisher::failing());
        let ingestor = SensorIngestor::new(store.clone(), Some(publisher.clone()));

        let err = ingestor
            .ingest(reading("KY_026", RawState::Integer(0)))
            .await
            .unwrap_err();

        assert!(!err.is_client_error());
        let IngestError::Publish { stored_id, .. } = err else {
            panic!("expected publish error, got {err:?}");
        };

        let rows = store.rows(SensorKind::Ky026);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, stored_id);
        assert_eq!(publisher.attempts(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_skips_publish() {
        // ---
        let store = Arc::new(MemoryStore::failing_writes());
        let publisher = Arc::new(RecordingPublisher::default());
        let ingestor = SensorIngestor::new(store.clone(), Some(publisher.clone()));

        let err = ingestor
            .ingest(reading("MQ_2", RawState::Integer(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Storage(_)));
        assert_eq!(publisher.attempts(), 0);
    }
}
