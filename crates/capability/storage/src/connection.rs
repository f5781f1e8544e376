//! 数据库连接管理
//!
//! - connect_pool：建立 Postgres 连接池（最大连接数 8）
//! - apply_schema：执行内置建表脚本（幂等）
//! - Stores：按数据库地址选择 Postgres 或内存后端

use crate::error::StorageError;
use crate::in_memory::{
    InMemoryDeviceStore, InMemoryReportStore, InMemoryRunStore, InMemoryScheduleStore,
    InMemoryTrendStore,
};
use crate::postgres::{PgDeviceStore, PgReportStore, PgRunStore, PgScheduleStore, PgTrendStore};
use crate::traits::{DeviceStore, ReportStore, RunStore, ScheduleStore, TrendStore};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

/// 内置建表脚本。
pub const SCHEMA_SQL: &str = include_str!("../migrations/0001_drift.sql");

/// 建立 Postgres 连接池
pub async fn connect_pool(database_url: &str) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// 执行建表脚本；所有语句均为 `if not exists`，可重复执行。
pub async fn apply_schema(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    tracing::info!(target: "fleet.storage", "schema_applied");
    Ok(())
}

/// 一组存储后端，按是否配置数据库地址二选一。
#[derive(Clone)]
pub struct Stores {
    pub devices: Arc<dyn DeviceStore>,
    pub schedules: Arc<dyn ScheduleStore>,
    pub runs: Arc<dyn RunStore>,
    pub reports: Arc<dyn ReportStore>,
    pub trends: Arc<dyn TrendStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            devices: Arc::new(InMemoryDeviceStore::new()),
            schedules: Arc::new(InMemoryScheduleStore::new()),
            runs: Arc::new(InMemoryRunStore::new()),
            reports: Arc::new(InMemoryReportStore::new()),
            trends: Arc::new(InMemoryTrendStore::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            devices: Arc::new(PgDeviceStore::new(pool.clone())),
            schedules: Arc::new(PgScheduleStore::new(pool.clone())),
            runs: Arc::new(PgRunStore::new(pool.clone())),
            reports: Arc::new(PgReportStore::new(pool.clone())),
            trends: Arc::new(PgTrendStore::new(pool)),
        }
    }

    /// `database_url` 为空时使用内存存储；否则连接 Postgres 并执行建表脚本。
    pub async fn connect(database_url: Option<&str>) -> Result<Self, StorageError> {
        match database_url.filter(|url| !url.trim().is_empty()) {
            Some(url) => {
                let pool = connect_pool(url).await?;
                apply_schema(&pool).await?;
                tracing::info!(target: "fleet.storage", backend = "postgres", "stores_ready");
                Ok(Self::postgres(pool))
            }
            None => {
                tracing::info!(target: "fleet.storage", backend = "memory", "stores_ready");
                Ok(Self::in_memory())
            }
        }
    }
}
