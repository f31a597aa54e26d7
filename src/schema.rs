//! Database schema management for `stopfire-sensors`.
//!
//! Ensures the per-kind sensor tables, the device ownership table and their
//! indexes exist before serving requests. Applied once on startup from
//! `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

use crate::models::SensorKind;
use crate::store::table_for;

// ---

/// Create the database schema if it is missing (idempotent).
///
/// One table per sensor kind, laid out by its [`crate::store::TableSpec`],
/// plus `esp32`, which maps device serial numbers to their owning user.
/// Safe to call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    for kind in SensorKind::ALL {
        let table_spec = table_for(kind);

        sqlx::query(&table_spec.create_table_sql())
            .execute(&mut *tx)
            .await?;
        sqlx::query(&table_spec.create_index_sql())
            .execute(&mut *tx)
            .await?;
    }

    // Device ownership, read by the alerts endpoint
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS esp32 (
            numero_serie TEXT   PRIMARY KEY,
            id_user      BIGINT NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_esp32_id_user
            ON esp32 (id_user);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!("Schema ready for {} sensor tables", SensorKind::ALL.len());
    Ok(())
}
