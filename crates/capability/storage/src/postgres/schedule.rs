//! Postgres 漂移检测计划存储实现

use super::ms_param;
use crate::error::StorageError;
use crate::models::{DeviceSelection, ScheduleRecord, ScheduleUpdate};
use crate::traits::ScheduleStore;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const SCHEDULE_COLUMNS: &str = "id, name, description, cron_spec, enabled, \
     selection::text as selection, \
     (extract(epoch from last_run_at) * 1000)::bigint as last_run_ms, \
     (extract(epoch from next_run_at) * 1000)::bigint as next_run_ms, \
     run_count, \
     (extract(epoch from created_at) * 1000)::bigint as created_at_ms, \
     (extract(epoch from updated_at) * 1000)::bigint as updated_at_ms";

pub struct PgScheduleStore {
    pub pool: PgPool,
}

impl PgScheduleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn list_where(&self, enabled_only: bool) -> Result<Vec<ScheduleRecord>, StorageError> {
        let sql = format!(
            "select {} from drift_schedules where ($1 = false or enabled) order by id",
            SCHEDULE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(enabled_only)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(schedule_from_row).collect()
    }
}

fn schedule_from_row(row: &PgRow) -> Result<ScheduleRecord, StorageError> {
    let selection: String = row.try_get("selection")?;
    let selection: DeviceSelection = serde_json::from_str(&selection)?;
    Ok(ScheduleRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        cron_spec: row.try_get("cron_spec")?,
        enabled: row.try_get("enabled")?,
        selection,
        last_run_ms: row.try_get("last_run_ms")?,
        next_run_ms: row.try_get("next_run_ms")?,
        run_count: row.try_get("run_count")?,
        created_at_ms: row.try_get("created_at_ms")?,
        updated_at_ms: row.try_get("updated_at_ms")?,
    })
}

#[async_trait::async_trait]
impl ScheduleStore for PgScheduleStore {
    async fn create_schedule(
        &self,
        record: ScheduleRecord,
    ) -> Result<ScheduleRecord, StorageError> {
        let selection = serde_json::to_string(&record.selection)?;
        let sql = format!(
            "insert into drift_schedules (name, description, cron_spec, enabled, selection) \
             values ($1, $2, $3, $4, $5::jsonb) \
             returning {}",
            SCHEDULE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&record.name)
            .bind(&record.description)
            .bind(&record.cron_spec)
            .bind(record.enabled)
            .bind(selection)
            .fetch_one(&self.pool)
            .await?;
        schedule_from_row(&row)
    }

    async fn find_schedule(
        &self,
        schedule_id: i64,
    ) -> Result<Option<ScheduleRecord>, StorageError> {
        let sql = format!("select {} from drift_schedules where id = $1", SCHEDULE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(schedule_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(schedule_from_row).transpose()
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduleRecord>, StorageError> {
        self.list_where(false).await
    }

    async fn list_enabled_schedules(&self) -> Result<Vec<ScheduleRecord>, StorageError> {
        self.list_where(true).await
    }

    async fn update_schedule(
        &self,
        schedule_id: i64,
        update: ScheduleUpdate,
    ) -> Result<Option<ScheduleRecord>, StorageError> {
        let selection = update
            .selection
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let sql = format!(
            "update drift_schedules set \
             name = coalesce($1, name), \
             description = coalesce($2, description), \
             cron_spec = coalesce($3, cron_spec), \
             enabled = coalesce($4, enabled), \
             selection = coalesce($5::jsonb, selection), \
             updated_at = now() \
             where id = $6 \
             returning {}",
            SCHEDULE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(update.name)
            .bind(update.description)
            .bind(update.cron_spec)
            .bind(update.enabled)
            .bind(selection)
            .bind(schedule_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(schedule_from_row).transpose()
    }

    async fn delete_schedule(&self, schedule_id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from drift_schedules where id = $1")
            .bind(schedule_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_schedule_run(
        &self,
        schedule_id: i64,
        last_run_ms: i64,
        next_run_ms: Option<i64>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "update drift_schedules set \
             last_run_at = to_timestamp($1 / 1000.0), \
             next_run_at = to_timestamp($2 / 1000.0), \
             run_count = run_count + 1 \
             where id = $3",
        )
        .bind(ms_param(last_run_ms))
        .bind(next_run_ms.map(ms_param))
        .bind(schedule_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
