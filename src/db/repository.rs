use crate::db::models::{CityBatch, StoredObservation};
use crate::db::Sink;
use crate::error::{LoadError, Result};
use sqlx::{Connection, PgPool};
use tracing::{debug, info};

/// DDL shared by the startup migration and the per-load schema check.
const CREATE_TABLE_SQL: &str = include_str!("../../migrations/0001_create_data_weather.sql");

pub struct Repository {
    pool: PgPool,
}

impl Repository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Insert a batch with insert-or-skip semantics on `id`.
    ///
    /// One connection is checked out for the whole call and returned to the
    /// pool when the guard drops, on success and on every error path. Rows go
    /// in within a single transaction, chunked to stay under the bind limit.
    ///
    /// # Returns
    /// The number of rows actually inserted. Records whose id already exists
    /// are skipped and not counted.
    pub async fn insert_records(&self, batch: &CityBatch) -> std::result::Result<u64, LoadError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.acquire().await.map_err(LoadError::Connect)?;

        sqlx::query(CREATE_TABLE_SQL)
            .execute(&mut *conn)
            .await
            .map_err(LoadError::Write)?;

        let mut tx = conn.begin().await.map_err(LoadError::Write)?;
        let mut rows_written = 0;

        // 12 binds per row; Postgres caps a statement at 65535 parameters
        const BATCH_SIZE: usize = 1000;

        for (batch_idx, chunk) in batch.records().chunks(BATCH_SIZE).enumerate() {
            debug!(
                "Inserting chunk {}/{} ({} records)",
                batch_idx + 1,
                batch.len().div_ceil(BATCH_SIZE),
                chunk.len()
            );

            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT INTO data_weather (
                    city, temperature, wind_speed, \"condition\",
                    precipitation, humidity, feels_like_temp,
                    pressure, visibility, is_day, \"timestamp\", id
                ) ",
            );

            query_builder.push_values(chunk, |mut b, record| {
                b.push_bind(&record.city)
                    .push_bind(record.temperature_c)
                    .push_bind(record.wind_kph)
                    .push_bind(&record.condition_text)
                    .push_bind(record.precipitation_mm)
                    .push_bind(record.humidity_pct)
                    .push_bind(record.feels_like_c)
                    .push_bind(record.pressure_mb)
                    .push_bind(record.visibility_km)
                    .push_bind(record.is_day)
                    .push_bind(record.observed_at)
                    .push_bind(&record.id);
            });

            query_builder.push(" ON CONFLICT (id) DO NOTHING");

            let result = query_builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(LoadError::Write)?;

            rows_written += result.rows_affected();
        }

        tx.commit().await.map_err(LoadError::Write)?;

        debug!(
            "Loaded {} of {} records ({} duplicates skipped)",
            rows_written,
            batch.len(),
            batch.len() as u64 - rows_written
        );

        Ok(rows_written)
    }

    pub async fn count_records(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM data_weather")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    pub async fn get_record(&self, id: &str) -> Result<Option<StoredObservation>> {
        let result = sqlx::query_as::<_, StoredObservation>(
            r#"
            SELECT id, city, temperature, wind_speed, "condition", precipitation,
                   humidity, feels_like_temp, pressure, visibility, is_day, "timestamp"
            FROM data_weather
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }
}

impl Sink for Repository {
    async fn load(&self, batch: &CityBatch) -> std::result::Result<u64, LoadError> {
        self.insert_records(batch).await
    }
}
