//! Postgres 漂移趋势存储实现
//!
//! 依赖部分唯一索引 `uq_drift_trends_open (device_id, path) where resolved = false`，
//! upsert 由单条 `insert ... on conflict` 完成。

use super::ms_param;
use crate::error::StorageError;
use crate::models::{TrendObservation, TrendQuery, TrendRecord};
use crate::traits::TrendStore;
use domain::{Category, Severity};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const TREND_COLUMNS: &str = "id, device_id, path, \
     (extract(epoch from first_seen) * 1000)::bigint as first_seen_ms, \
     (extract(epoch from last_seen) * 1000)::bigint as last_seen_ms, \
     occurrences, severity, category, resolved, \
     (extract(epoch from resolved_at) * 1000)::bigint as resolved_at_ms";

pub struct PgTrendStore {
    pub pool: PgPool,
}

impl PgTrendStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn trend_from_row(row: &PgRow) -> Result<TrendRecord, StorageError> {
    let severity: String = row.try_get("severity")?;
    let category: String = row.try_get("category")?;
    Ok(TrendRecord {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        path: row.try_get("path")?,
        first_seen_ms: row.try_get("first_seen_ms")?,
        last_seen_ms: row.try_get("last_seen_ms")?,
        occurrences: row.try_get("occurrences")?,
        severity: Severity::parse(&severity)
            .ok_or_else(|| StorageError::decode("severity", &severity))?,
        category: Category::parse(&category)
            .ok_or_else(|| StorageError::decode("category", &category))?,
        resolved: row.try_get("resolved")?,
        resolved_at_ms: row.try_get("resolved_at_ms")?,
    })
}

#[async_trait::async_trait]
impl TrendStore for PgTrendStore {
    async fn record_observation(
        &self,
        observation: TrendObservation,
    ) -> Result<TrendRecord, StorageError> {
        let sql = format!(
            "insert into drift_trends \
             (device_id, path, first_seen, last_seen, occurrences, severity, category) \
             values ($1, $2, to_timestamp($3 / 1000.0), to_timestamp($3 / 1000.0), 1, $4, $5) \
             on conflict (device_id, path) where resolved = false do update set \
             last_seen = excluded.last_seen, \
             occurrences = drift_trends.occurrences + 1, \
             severity = excluded.severity, \
             category = excluded.category \
             returning {}",
            TREND_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(observation.device_id)
            .bind(&observation.path)
            .bind(ms_param(observation.observed_at_ms))
            .bind(observation.severity.as_str())
            .bind(observation.category.as_str())
            .fetch_one(&self.pool)
            .await?;
        trend_from_row(&row)
    }

    async fn list_trends(&self, query: &TrendQuery) -> Result<Vec<TrendRecord>, StorageError> {
        let sql = format!(
            "select {} from drift_trends \
             where ($1::bigint is null or device_id = $1) \
             and ($2 or resolved = false) \
             order by last_seen desc, id desc \
             limit case when $3 > 0 then $3 else null end",
            TREND_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(query.device_id)
            .bind(query.include_resolved)
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(trend_from_row).collect()
    }

    async fn resolve_trend(&self, trend_id: i64, resolved_at_ms: i64) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "update drift_trends set resolved = true, resolved_at = to_timestamp($1 / 1000.0) \
             where id = $2 and resolved = false",
        )
        .bind(ms_param(resolved_at_ms))
        .bind(trend_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
