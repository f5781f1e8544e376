//! Postgres 漂移报告存储实现
//!
//! 报告的各个子对象作为同一行的 jsonb 列一次插入。

use super::ms_param;
use crate::error::StorageError;
use crate::models::{ReportQuery, ReportRecord};
use crate::traits::ReportStore;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const REPORT_COLUMNS: &str = "id, report_type, device_id, schedule_id, \
     (extract(epoch from generated_at) * 1000)::bigint as generated_at_ms, \
     summary::text as summary, devices::text as devices, \
     recommendations::text as recommendations";

pub struct PgReportStore {
    pub pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn report_from_row(row: &PgRow) -> Result<ReportRecord, StorageError> {
    Ok(ReportRecord {
        id: row.try_get("id")?,
        report_type: row.try_get("report_type")?,
        device_id: row.try_get("device_id")?,
        schedule_id: row.try_get("schedule_id")?,
        generated_at_ms: row.try_get("generated_at_ms")?,
        summary: row.try_get("summary")?,
        devices: row.try_get("devices")?,
        recommendations: row.try_get("recommendations")?,
    })
}

#[async_trait::async_trait]
impl ReportStore for PgReportStore {
    async fn create_report(&self, record: ReportRecord) -> Result<ReportRecord, StorageError> {
        let sql = format!(
            "insert into drift_reports \
             (report_type, device_id, schedule_id, generated_at, summary, devices, recommendations) \
             values ($1, $2, $3, to_timestamp($4 / 1000.0), $5::jsonb, $6::jsonb, $7::jsonb) \
             returning {}",
            REPORT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&record.report_type)
            .bind(record.device_id)
            .bind(record.schedule_id)
            .bind(ms_param(record.generated_at_ms))
            .bind(&record.summary)
            .bind(&record.devices)
            .bind(&record.recommendations)
            .fetch_one(&self.pool)
            .await?;
        report_from_row(&row)
    }

    async fn find_report(&self, report_id: i64) -> Result<Option<ReportRecord>, StorageError> {
        let sql = format!("select {} from drift_reports where id = $1", REPORT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(report_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(report_from_row).transpose()
    }

    async fn list_reports(&self, query: &ReportQuery) -> Result<Vec<ReportRecord>, StorageError> {
        let sql = format!(
            "select {} from drift_reports \
             where ($1::text is null or report_type = $1) \
             and ($2::bigint is null or device_id = $2) \
             and ($3::bigint is null or schedule_id = $3) \
             order by generated_at desc, id desc \
             limit case when $4 > 0 then $4 else null end",
            REPORT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(&query.report_type)
            .bind(query.device_id)
            .bind(query.schedule_id)
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(report_from_row).collect()
    }

    async fn delete_reports_before(&self, before_ms: i64) -> Result<u64, StorageError> {
        let result = sqlx::query("delete from drift_reports where generated_at < to_timestamp($1 / 1000.0)")
            .bind(ms_param(before_ms))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
