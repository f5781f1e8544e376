//! 漂移检测调度
//!
//! - [`DriftScheduler`]：计划注册表、启停、计划增删改、触发执行与执行历史
//! - [`PeriodicTrigger`] / [`CronTrigger`]：周期触发抽象及 tokio-cron-scheduler 实现
//! - [`BulkDriftDetector`] / [`DriftDetector`]：按设备集合批量检测漂移
//! - [`validate_cron_expression`]：同步校验 5/6 段 cron 表达式

mod cron_expr;
mod detector;
mod scheduler;
mod trigger;

pub use cron_expr::{normalize_cron_expression, parse_cron_expression, validate_cron_expression};
pub use detector::{BulkDriftDetector, DriftDetector};
pub use scheduler::{DriftScheduler, SchedulerStatus};
pub use trigger::{CronTrigger, JobCallback, JobHandle, PeriodicTrigger};

use fleet_config::AppConfig;
use std::time::Duration;

/// 调度器错误。
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },
    #[error("schedule not found: {0}")]
    NotFound(i64),
    #[error("scheduler is already running")]
    AlreadyRunning,
    #[error("trigger error: {0}")]
    Trigger(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("failed to resolve devices: {0}")]
    Selection(String),
    #[error("drift detection failed: {0}")]
    Detection(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// 调度器参数。
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 为 false 时 `start_if_enabled` 不启动调度器。
    pub enabled: bool,
    /// `stop` 等待执行中任务结束的上限。
    pub drain_timeout: Duration,
    pub run_history_limit: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            drain_timeout: Duration::from_secs(30),
            run_history_limit: 50,
        }
    }
}

impl From<&AppConfig> for SchedulerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            enabled: config.scheduler_enabled,
            drain_timeout: Duration::from_secs(config.scheduler_drain_timeout_seconds),
            run_history_limit: config.run_history_limit,
        }
    }
}
