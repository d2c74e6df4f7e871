use crate::errors::{Error, Result};
use crate::model::{Alert, AlertReason, Metric, ThresholdConfig, Timeframe};
use crate::repo::{Page, PageCursor, PageOptions, Repository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub async fn make_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// Postgres-backed [`Repository`]. Paginated reads use a keyset scan over
/// a composite (device_id, ts DESC, id DESC) index.
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ConfigRow {
    temperature_threshold: f64,
    battery_threshold: i32,
}

#[derive(sqlx::FromRow)]
struct MetricRow {
    id: i64,
    temperature: f64,
    battery: i32,
    ts: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: i64,
    reason: String,
    description: String,
    ts: DateTime<Utc>,
}

#[async_trait]
impl Repository for PgRepository {
    async fn upsert_device_config(&self, device_id: &str, config: ThresholdConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO device_configs (device_id, temperature_threshold, battery_threshold)
            VALUES ($1, $2, $3)
            ON CONFLICT (device_id) DO UPDATE
            SET temperature_threshold = EXCLUDED.temperature_threshold,
                battery_threshold = EXCLUDED.battery_threshold,
                updated_at = now()
            "#,
        )
        .bind(device_id)
        .bind(config.temperature_threshold)
        .bind(config.battery_threshold)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_device_config(&self, device_id: &str) -> Result<ThresholdConfig> {
        let row = sqlx::query_as::<_, ConfigRow>(
            "SELECT temperature_threshold, battery_threshold FROM device_configs WHERE device_id = $1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(ThresholdConfig {
                temperature_threshold: row.temperature_threshold,
                battery_threshold: row.battery_threshold,
            }),
            None => Err(Error::NotFound),
        }
    }

    async fn save_device_metric(&self, device_id: &str, metric: Metric) -> Result<()> {
        sqlx::query("INSERT INTO metrics (device_id, temperature, battery, ts) VALUES ($1, $2, $3, $4)")
            .bind(device_id)
            .bind(metric.temperature)
            .bind(metric.battery)
            .bind(metric.time)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_device_metrics(
        &self,
        device_id: &str,
        timeframe: Timeframe,
        page: PageOptions,
    ) -> Result<Page<Metric>> {
        let limit = i64::from(page.size) + 1;
        let rows = sqlx::query_as::<_, MetricRow>(
            r#"
            SELECT id, temperature, battery, ts FROM metrics
            WHERE device_id = $1
              AND ($2::timestamptz IS NULL OR ts >= $2)
              AND ($3::timestamptz IS NULL OR ts <= $3)
              AND ($4::timestamptz IS NULL OR (ts, id) < ($4, $5::bigint))
            ORDER BY ts DESC, id DESC
            LIMIT $6
            "#,
        )
        .bind(device_id)
        .bind(timeframe.start)
        .bind(timeframe.end)
        .bind(page.cursor.map(|c| c.last_time))
        .bind(page.cursor.map(|c| c.last_id))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let (rows, next_cursor) = split_page(rows, limit, |row: &MetricRow| PageCursor {
            last_time: row.ts,
            last_id: row.id,
        });

        let items = rows
            .into_iter()
            .map(|row| Metric {
                temperature: row.temperature,
                battery: row.battery,
                time: row.ts,
            })
            .collect();

        Ok(Page { items, next_cursor })
    }

    async fn save_device_alert(&self, device_id: &str, alert: Alert) -> Result<()> {
        sqlx::query("INSERT INTO alerts (device_id, reason, description, ts) VALUES ($1, $2, $3, $4)")
            .bind(device_id)
            .bind(alert.reason.as_str())
            .bind(&alert.description)
            .bind(alert.time)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_device_alerts(
        &self,
        device_id: &str,
        timeframe: Timeframe,
        page: PageOptions,
    ) -> Result<Page<Alert>> {
        let limit = i64::from(page.size) + 1;
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT id, reason, description, ts FROM alerts
            WHERE device_id = $1
              AND ($2::timestamptz IS NULL OR ts >= $2)
              AND ($3::timestamptz IS NULL OR ts <= $3)
              AND ($4::timestamptz IS NULL OR (ts, id) < ($4, $5::bigint))
            ORDER BY ts DESC, id DESC
            LIMIT $6
            "#,
        )
        .bind(device_id)
        .bind(timeframe.start)
        .bind(timeframe.end)
        .bind(page.cursor.map(|c| c.last_time))
        .bind(page.cursor.map(|c| c.last_id))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let (rows, next_cursor) = split_page(rows, limit, |row: &AlertRow| PageCursor {
            last_time: row.ts,
            last_id: row.id,
        });

        let items = rows
            .into_iter()
            .map(|row| {
                let reason = AlertReason::from_str(&row.reason)
                    .map_err(|e| Error::Database(sqlx::Error::Decode(e.into())))?;
                Ok(Alert {
                    reason,
                    description: row.description,
                    time: row.ts,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Page { items, next_cursor })
    }
}

// A full `limit` (= size + 1) result means another page exists: drop the
// peeked row and derive the next cursor from the new last row.
fn split_page<R>(
    mut rows: Vec<R>,
    limit: i64,
    cursor_of: impl Fn(&R) -> PageCursor,
) -> (Vec<R>, Option<PageCursor>) {
    let mut next_cursor = None;
    if rows.len() as i64 == limit {
        rows.pop();
        if let Some(last) = rows.last() {
            next_cursor = Some(cursor_of(last));
        }
    }
    (rows, next_cursor)
}
