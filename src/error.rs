//! Error types for ingestion, storage, publishing and alert aggregation.

use std::time::Duration;

use thiserror::Error;

use crate::models::SensorKind;

// ---

/// The `sensor` tag is not one of the supported kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("sensor type not supported: {kind}")]
pub struct UnsupportedSensorKind {
    pub kind: String,
}

/// `estado` could not be coerced into the representation its kind requires.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid state value for {kind}: {reason}")]
pub struct NormalizationError {
    pub kind: SensorKind,
    pub reason: String,
}

/// Backing store unavailable or a query failed.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        // ---
        if matches!(
            e,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
        ) {
            StorageError::Unavailable(e.to_string())
        } else {
            StorageError::Database(e)
        }
    }
}

/// Broker unavailable or the message was not accepted.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("broker error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("broker {step} timed out after {after:?}")]
    Timeout { step: &'static str, after: Duration },

    #[error("message with routing key {routing_key} was not routed to any queue")]
    Unroutable { routing_key: String },

    #[error("broker refused message with routing key {routing_key}")]
    Nacked { routing_key: String },
}

/// Failure while ingesting one reading.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    UnsupportedKind(#[from] UnsupportedSensorKind),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The reading is already committed under `stored_id`.
    #[error("reading {stored_id} stored but not published: {source}")]
    Publish {
        stored_id: i64,
        #[source]
        source: PublishError,
    },
}

impl IngestError {
    // ---
    /// True for errors caused by the request content rather than a backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IngestError::UnsupportedKind(_) | IngestError::Normalization(_)
        )
    }
}

/// Failure while building a user's alert bundle.
#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("failed to fetch alerts: {0}")]
    Storage(#[from] StorageError),
}
