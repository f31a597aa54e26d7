//! In-memory storage and publisher doubles for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;

use crate::alerts::AlertAggregator;
use crate::error::{PublishError, StorageError};
use crate::ingest::SensorIngestor;
use crate::models::{NormalizedReading, SensorKind, StoredReading};
use crate::publisher::Publisher;
use crate::routes::{self, AppState};
use crate::store::SensorStore;

// ---

#[derive(Default)]
struct Tables {
    rows: HashMap<SensorKind, Vec<StoredReading>>,
    owners: Vec<(i64, String)>,
    next_id: i64,
}

/// [`SensorStore`] kept in memory, with switchable failures.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    writes: AtomicUsize,
    fail_writes: bool,
    fail_reads_for: Option<SensorKind>,
}

impl MemoryStore {
    // ---
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn failing_reads_for(kind: SensorKind) -> Self {
        Self {
            fail_reads_for: Some(kind),
            ..Self::default()
        }
    }

    pub fn own_device(&self, user_id: i64, serial: &str) {
        self.tables
            .lock()
            .unwrap()
            .owners
            .push((user_id, serial.to_string()));
    }

    /// Seed a row directly, bypassing the write counter. The id is reassigned.
    pub fn insert(&self, kind: SensorKind, mut reading: StoredReading) -> i64 {
        // ---
        let mut tables = self.tables.lock().unwrap();
        tables.next_id += 1;
        reading.id = tables.next_id;
        tables.rows.entry(kind).or_default().push(reading);
        tables.next_id
    }

    pub fn rows(&self, kind: SensorKind) -> Vec<StoredReading> {
        self.tables
            .lock()
            .unwrap()
            .rows
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SensorStore for MemoryStore {
    // ---
    async fn create_reading(&self, reading: &NormalizedReading) -> Result<i64, StorageError> {
        // ---
        if self.fail_writes {
            return Err(StorageError::Unavailable("write rejected".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        let stored = StoredReading {
            id: 0,
            fecha_activacion: reading.fecha_activacion.clone(),
            fecha_desactivacion: reading.fecha_desactivacion.clone(),
            estado: reading.estado.clone(),
            numero_serie: reading.numero_serie.clone(),
        };
        Ok(self.insert(reading.kind, stored))
    }

    async fn owned_device_serials(&self, user_id: i64) -> Result<Vec<String>, StorageError> {
        // ---
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .owners
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, serial)| serial.clone())
            .collect())
    }

    async fn readings_for_devices(
        &self,
        kind: SensorKind,
        serials: &[String],
    ) -> Result<Vec<StoredReading>, StorageError> {
        // ---
        if self.fail_reads_for == Some(kind) {
            return Err(StorageError::Unavailable(format!("{kind} table offline")));
        }

        let mut readings: Vec<_> = self
            .rows(kind)
            .into_iter()
            .filter(|r| serials.contains(&r.numero_serie))
            .collect();
        readings.sort_by(|a, b| b.fecha_activacion.cmp(&a.fecha_activacion));
        Ok(readings)
    }
}

/// [`Publisher`] that records what it was asked to publish.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<NormalizedReading>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingPublisher {
    // ---
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<NormalizedReading> {
        self.published.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    // ---
    async fn publish(&self, reading: &NormalizedReading) -> Result<(), PublishError> {
        // ---
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PublishError::Nacked {
                routing_key: reading.kind.as_str().to_string(),
            });
        }
        self.published.lock().unwrap().push(reading.clone());
        Ok(())
    }
}

/// Full HTTP router over in-memory doubles.
pub fn app(
    store: Arc<MemoryStore>,
    publisher: Option<Arc<RecordingPublisher>>,
    publish_failure_is_error: bool,
) -> Router {
    build_app(store, publisher, publish_failure_is_error, false)
}

/// Router that answers validation failures with 400.
pub fn app_with_bad_request(store: Arc<MemoryStore>) -> Router {
    build_app(store, None, true, true)
}

fn build_app(
    store: Arc<MemoryStore>,
    publisher: Option<Arc<RecordingPublisher>>,
    publish_failure_is_error: bool,
    validation_failure_is_bad_request: bool,
) -> Router {
    // ---
    let store: Arc<dyn SensorStore> = store;
    let publisher = publisher.map(|p| p as Arc<dyn Publisher>);

    routes::router(AppState {
        ingestor: Arc::new(SensorIngestor::new(store.clone(), publisher)),
        alerts: Arc::new(AlertAggregator::new(store)),
        publish_failure_is_error,
        validation_failure_is_bad_request,
    })
}
