//! Persistence seam for programmed applications and per-partition sync bookkeeping.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use campo_core::{NormalizedRecord, SyncState};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Rejected(String),
}

#[async_trait]
pub trait ProgramStore: Send + Sync {
    /// Insert-or-overwrite every record by `sync_key`. A batch either lands
    /// completely or fails as a whole; no per-row insert/update split is reported.
    async fn upsert_applications(&self, batch: &[NormalizedRecord]) -> Result<(), StoreError>;

    async fn record_sync(
        &self,
        partition_id: &str,
        synced_at: DateTime<Utc>,
        rows: u64,
    ) -> Result<(), StoreError>;

    async fn load_sync_state(&self, partition_id: &str) -> Result<Option<SyncState>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgProgramStore {
    pool: PgPool,
}

impl PgProgramStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Builds a pool that connects on first use, so constructing the store
    /// never touches the network.
    pub fn connect_lazy(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .context("configuring postgres pool")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .context("running campo-storage migrations")
    }
}

#[async_trait]
impl ProgramStore for PgProgramStore {
    async fn upsert_applications(&self, batch: &[NormalizedRecord]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO programmed_applications \
             (sync_key, partition_id, week, application_date, variety, sectors, product_name, \
              dose_per_200l, drum_count, method, objective, status, source_range, synced_at) ",
        );
        qb.push_values(batch, |mut row, record| {
            row.push_bind(record.sync_key.clone())
                .push_bind(record.partition_id.clone())
                .push_bind(i32::try_from(record.week).unwrap_or(i32::MAX))
                .push_bind(record.date)
                .push_bind(record.variety.clone())
                .push_bind(record.derived_sectors.clone())
                .push_bind(record.product_name.clone())
                .push_bind(record.dose_per_200l)
                .push_bind(i32::try_from(record.drum_count).unwrap_or(i32::MAX))
                .push_bind(record.method.clone())
                .push_bind(record.objective.clone())
                .push_bind(record.status.clone())
                .push_bind(record.source_range.clone())
                .push_bind(record.synced_at);
        });
        qb.push(
            " ON CONFLICT (sync_key) DO UPDATE SET \
             partition_id = EXCLUDED.partition_id, \
             week = EXCLUDED.week, \
             application_date = EXCLUDED.application_date, \
             variety = EXCLUDED.variety, \
             sectors = EXCLUDED.sectors, \
             product_name = EXCLUDED.product_name, \
             dose_per_200l = EXCLUDED.dose_per_200l, \
             drum_count = EXCLUDED.drum_count, \
             method = EXCLUDED.method, \
             objective = EXCLUDED.objective, \
             status = EXCLUDED.status, \
             source_range = EXCLUDED.source_range, \
             synced_at = EXCLUDED.synced_at",
        );

        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn record_sync(
        &self,
        partition_id: &str,
        synced_at: DateTime<Utc>,
        rows: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sheet_sync_configs (partition_id, last_synced_at, last_synced_rows)
            VALUES ($1, $2, $3)
            ON CONFLICT (partition_id)
            DO UPDATE SET
                last_synced_at = EXCLUDED.last_synced_at,
                last_synced_rows = EXCLUDED.last_synced_rows,
                updated_at = NOW()
            "#,
        )
        .bind(partition_id)
        .bind(synced_at)
        .bind(i64::try_from(rows).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_sync_state(&self, partition_id: &str) -> Result<Option<SyncState>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT partition_id, last_synced_at, last_synced_rows
              FROM sheet_sync_configs
             WHERE partition_id = $1
            "#,
        )
        .bind(partition_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let rows: i64 = row.try_get("last_synced_rows")?;
        Ok(Some(SyncState {
            partition_id: row.try_get("partition_id")?,
            last_synced_at: row.try_get("last_synced_at")?,
            last_synced_rows: u64::try_from(rows).unwrap_or_default(),
        }))
    }
}

/// In-process store with the same upsert semantics, used by tests and by
/// local runs without a database.
#[derive(Debug, Default)]
pub struct MemoryProgramStore {
    records: Mutex<BTreeMap<String, NormalizedRecord>>,
    states: Mutex<BTreeMap<String, SyncState>>,
    write_calls: AtomicUsize,
}

impl MemoryProgramStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored records ordered by `sync_key`.
    pub async fn records(&self) -> Vec<NormalizedRecord> {
        self.records.lock().await.values().cloned().collect()
    }

    /// Number of mutating calls received (upserts and bookkeeping updates).
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgramStore for MemoryProgramStore {
    async fn upsert_applications(&self, batch: &[NormalizedRecord]) -> Result<(), StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().await;
        for record in batch {
            records.insert(record.sync_key.clone(), record.clone());
        }
        Ok(())
    }

    async fn record_sync(
        &self,
        partition_id: &str,
        synced_at: DateTime<Utc>,
        rows: u64,
    ) -> Result<(), StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.states.lock().await.insert(
            partition_id.to_string(),
            SyncState {
                partition_id: partition_id.to_string(),
                last_synced_at: Some(synced_at),
                last_synced_rows: rows,
            },
        );
        Ok(())
    }

    async fn load_sync_state(&self, partition_id: &str) -> Result<Option<SyncState>, StoreError> {
        Ok(self.states.lock().await.get(partition_id).cloned())
    }
}
