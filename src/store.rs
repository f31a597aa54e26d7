//! Storage port and its PostgreSQL adapter.
//!
//! Every sensor kind has its own table with the same column layout; only the
//! table name and the SQL type of `estado` differ. Those differences live in
//! a [`TableSpec`] so a single write path and a single read path serve all
//! kinds.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::error::StorageError;
use crate::models::{NormalizedReading, SensorKind, SensorState, StateRepr, StoredReading};

// ---

/// Persistence capability consumed by the ingestor and the alert aggregator.
#[async_trait]
pub trait SensorStore: Send + Sync {
    // ---
    /// Insert a reading into its kind's table and return the assigned id.
    async fn create_reading(&self, reading: &NormalizedReading) -> Result<i64, StorageError>;

    /// Serial numbers of the devices owned by `user_id`.
    async fn owned_device_serials(&self, user_id: i64) -> Result<Vec<String>, StorageError>;

    /// Readings of `kind` for the given serials, most recent activation first.
    async fn readings_for_devices(
        &self,
        kind: SensorKind,
        serials: &[String],
    ) -> Result<Vec<StoredReading>, StorageError>;
}

/// Table name and state column type for one sensor kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub table: &'static str,
    pub state: StateRepr,
}

pub fn table_for(kind: SensorKind) -> TableSpec {
    // ---
    let table = match kind {
        SensorKind::Ky026 => "ky_026",
        SensorKind::Mq2 => "mq_2",
        SensorKind::Mq135 => "mq_135",
        SensorKind::Dht22 => "dht_22",
    };
    TableSpec {
        table,
        state: kind.state_repr(),
    }
}

impl TableSpec {
    // ---
    fn state_sql_type(&self) -> &'static str {
        match self.state {
            StateRepr::Integer => "BIGINT",
            StateRepr::Text => "TEXT",
        }
    }

    pub fn create_table_sql(&self) -> String {
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id                  BIGSERIAL PRIMARY KEY,
                fecha_activacion    TEXT NOT NULL,
                fecha_desactivacion TEXT NOT NULL,
                estado              {state} NOT NULL,
                numero_serie        TEXT NOT NULL
            );
            "#,
            table = self.table,
            state = self.state_sql_type(),
        )
    }

    pub fn create_index_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_numero_serie ON {table} (numero_serie);",
            table = self.table
        )
    }

    fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (fecha_activacion, fecha_desactivacion, estado, numero_serie) \
             VALUES ($1, $2, $3, $4) RETURNING id",
            self.table
        )
    }

    fn select_for_devices_sql(&self) -> String {
        format!(
            "SELECT id, fecha_activacion, fecha_desactivacion, estado, numero_serie \
             FROM {} WHERE numero_serie = ANY($1) \
             ORDER BY fecha_activacion COLLATE \"C\" DESC",
            self.table
        )
    }

    fn stored_from_row(&self, row: &PgRow) -> Result<StoredReading, sqlx::Error> {
        // ---
        let estado = match self.state {
            StateRepr::Integer => SensorState::Integer(row.try_get("estado")?),
            StateRepr::Text => SensorState::Text(row.try_get("estado")?),
        };

        Ok(StoredReading {
            id: row.try_get("id")?,
            fecha_activacion: row.try_get("fecha_activacion")?,
            fecha_desactivacion: row.try_get("fecha_desactivacion")?,
            estado,
            numero_serie: row.try_get("numero_serie")?,
        })
    }
}

/// [`SensorStore`] backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgSensorStore {
    pool: PgPool,
}

impl PgSensorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SensorStore for PgSensorStore {
    // ---
    async fn create_reading(&self, reading: &NormalizedReading) -> Result<i64, StorageError> {
        // ---
        let sql = table_for(reading.kind).insert_sql();

        let query = sqlx::query_scalar::<_, i64>(&sql)
            .bind(&reading.fecha_activacion)
            .bind(&reading.fecha_desactivacion);
        let query = match &reading.estado {
            SensorState::Integer(value) => query.bind(*value),
            SensorState::Text(value) => query.bind(value),
        };

        let id = query
            .bind(&reading.numero_serie)
            .fetch_one(&self.pool)
            .await?;

        Ok(id)
    }

    async fn owned_device_serials(&self, user_id: i64) -> Result<Vec<String>, StorageError> {
        // ---
        let serials = sqlx::query_scalar::<_, String>(
            "SELECT numero_serie FROM esp32 WHERE id_user = $1 ORDER BY numero_serie",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!("Found {} devices for user {}", serials.len(), user_id);
        Ok(serials)
    }

    async fn readings_for_devices(
        &self,
        kind: SensorKind,
        serials: &[String],
    ) -> Result<Vec<StoredReading>, StorageError> {
        // ---
        let table_spec = table_for(kind);
        let sql = table_spec.select_for_devices_sql();

        let rows = sqlx::query(&sql)
            .bind(serials)
            .fetch_all(&self.pool)
            .await?;

        let readings = rows
            .iter()
            .map(|row| table_spec.stored_from_row(row))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Fetched {} {} readings", readings.len(), kind);
        Ok(readings)
    }
}
