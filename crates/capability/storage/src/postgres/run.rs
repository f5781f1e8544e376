//! Postgres 执行记录存储实现

use super::ms_param;
use crate::error::StorageError;
use crate::models::{RunRecord, RunStatus};
use crate::traits::RunStore;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const RUN_COLUMNS: &str = "id, schedule_id, status, \
     (extract(epoch from started_at) * 1000)::bigint as started_at_ms, \
     (extract(epoch from completed_at) * 1000)::bigint as completed_at_ms, \
     duration_ms, result::text as result, error";

pub struct PgRunStore {
    pub pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn run_from_row(row: &PgRow) -> Result<RunRecord, StorageError> {
    let status: String = row.try_get("status")?;
    let status = RunStatus::parse(&status).ok_or_else(|| StorageError::decode("status", &status))?;
    let result: Option<String> = row.try_get("result")?;
    let result = result
        .map(|value| serde_json::from_str(&value))
        .transpose()?;
    Ok(RunRecord {
        id: row.try_get("id")?,
        schedule_id: row.try_get("schedule_id")?,
        status,
        started_at_ms: row.try_get("started_at_ms")?,
        completed_at_ms: row.try_get("completed_at_ms")?,
        duration_ms: row.try_get("duration_ms")?,
        result,
        error: row.try_get("error")?,
    })
}

fn result_text(record: &RunRecord) -> Result<Option<String>, StorageError> {
    record
        .result
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(StorageError::from)
}

#[async_trait::async_trait]
impl RunStore for PgRunStore {
    async fn create_run(&self, record: RunRecord) -> Result<RunRecord, StorageError> {
        let sql = format!(
            "insert into drift_runs \
             (schedule_id, status, started_at, completed_at, duration_ms, result, error) \
             values ($1, $2, to_timestamp($3 / 1000.0), to_timestamp($4 / 1000.0), $5, $6::jsonb, $7) \
             returning {}",
            RUN_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(record.schedule_id)
            .bind(record.status.as_str())
            .bind(ms_param(record.started_at_ms))
            .bind(record.completed_at_ms.map(ms_param))
            .bind(record.duration_ms)
            .bind(result_text(&record)?)
            .bind(&record.error)
            .fetch_one(&self.pool)
            .await?;
        run_from_row(&row)
    }

    async fn update_run(&self, record: RunRecord) -> Result<Option<RunRecord>, StorageError> {
        let sql = format!(
            "update drift_runs set \
             status = $1, completed_at = to_timestamp($2 / 1000.0), duration_ms = $3, \
             result = $4::jsonb, error = $5 \
             where id = $6 \
             returning {}",
            RUN_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(record.status.as_str())
            .bind(record.completed_at_ms.map(ms_param))
            .bind(record.duration_ms)
            .bind(result_text(&record)?)
            .bind(&record.error)
            .bind(record.id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn list_runs(
        &self,
        schedule_id: i64,
        limit: i64,
    ) -> Result<Vec<RunRecord>, StorageError> {
        let sql = format!(
            "select {} from drift_runs \
             where schedule_id = $1 \
             order by started_at desc, id desc \
             limit case when $2 > 0 then $2 else null end",
            RUN_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(schedule_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(run_from_row).collect()
    }

    async fn find_run(&self, run_id: i64) -> Result<Option<RunRecord>, StorageError> {
        let sql = format!("select {} from drift_runs where id = $1", RUN_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(run_from_row).transpose()
    }
}
