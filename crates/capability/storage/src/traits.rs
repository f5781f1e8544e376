//! 存储接口 Trait 定义
//!
//! - DeviceStore：设备
//! - ScheduleStore：漂移检测计划
//! - RunStore：计划执行记录
//! - ReportStore：漂移报告
//! - TrendStore：漂移趋势
//!
//! 所有接口返回 StorageError；记录不存在时返回 `Ok(None)` / `Ok(false)`。

use crate::error::StorageError;
use crate::models::{
    DeviceFilter, DeviceRecord, ReportQuery, ReportRecord, RunRecord, ScheduleRecord,
    ScheduleUpdate, TrendObservation, TrendQuery, TrendRecord,
};
use async_trait::async_trait;

/// 设备存储接口
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn create_device(&self, record: DeviceRecord) -> Result<DeviceRecord, StorageError>;

    async fn find_device(&self, device_id: i64) -> Result<Option<DeviceRecord>, StorageError>;

    /// 按 ID 升序列出设备；`filter` 为空时返回全部。
    async fn list_devices(
        &self,
        filter: Option<&DeviceFilter>,
    ) -> Result<Vec<DeviceRecord>, StorageError>;
}

/// 漂移检测计划存储接口
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create_schedule(&self, record: ScheduleRecord)
    -> Result<ScheduleRecord, StorageError>;

    async fn find_schedule(&self, schedule_id: i64)
    -> Result<Option<ScheduleRecord>, StorageError>;

    async fn list_schedules(&self) -> Result<Vec<ScheduleRecord>, StorageError>;

    async fn list_enabled_schedules(&self) -> Result<Vec<ScheduleRecord>, StorageError>;

    async fn update_schedule(
        &self,
        schedule_id: i64,
        update: ScheduleUpdate,
    ) -> Result<Option<ScheduleRecord>, StorageError>;

    async fn delete_schedule(&self, schedule_id: i64) -> Result<bool, StorageError>;

    /// 记录一次执行：写入 last_run / next_run，并原子地 `run_count += 1`。
    async fn record_schedule_run(
        &self,
        schedule_id: i64,
        last_run_ms: i64,
        next_run_ms: Option<i64>,
    ) -> Result<bool, StorageError>;
}

/// 执行记录存储接口（按计划追加）
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_run(&self, record: RunRecord) -> Result<RunRecord, StorageError>;

    /// 按 `record.id` 覆盖状态、完成时间、结果与错误。
    async fn update_run(&self, record: RunRecord) -> Result<Option<RunRecord>, StorageError>;

    /// 按开始时间倒序列出；`limit <= 0` 表示不限制。
    async fn list_runs(&self, schedule_id: i64, limit: i64)
    -> Result<Vec<RunRecord>, StorageError>;

    async fn find_run(&self, run_id: i64) -> Result<Option<RunRecord>, StorageError>;
}

/// 漂移报告存储接口
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn create_report(&self, record: ReportRecord) -> Result<ReportRecord, StorageError>;

    async fn find_report(&self, report_id: i64) -> Result<Option<ReportRecord>, StorageError>;

    /// 按生成时间倒序列出。
    async fn list_reports(&self, query: &ReportQuery) -> Result<Vec<ReportRecord>, StorageError>;

    /// 删除生成时间早于 `before_ms` 的报告，返回删除数量。
    async fn delete_reports_before(&self, before_ms: i64) -> Result<u64, StorageError>;
}

/// 漂移趋势存储接口
#[async_trait]
pub trait TrendStore: Send + Sync {
    /// 原子 upsert 未解决的 (device_id, path) 趋势：不存在则创建（occurrences = 1），
    /// 存在则刷新 last_seen / severity / category 并 `occurrences += 1`。
    async fn record_observation(
        &self,
        observation: TrendObservation,
    ) -> Result<TrendRecord, StorageError>;

    /// 按最近出现时间倒序列出。
    async fn list_trends(&self, query: &TrendQuery) -> Result<Vec<TrendRecord>, StorageError>;

    /// 标记趋势为已解决；已解决或不存在时返回 false。
    async fn resolve_trend(&self, trend_id: i64, resolved_at_ms: i64)
    -> Result<bool, StorageError>;
}
