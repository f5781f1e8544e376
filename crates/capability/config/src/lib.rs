//! 应用运行配置加载。
//!
//! 各能力模块从 [`AppConfig`] 派生自己的参数：
//! - `database_url` -> `fleet_storage::Stores::connect`（未设置时使用内存存储）
//! - `scheduler_enabled` / `scheduler_drain_timeout_seconds` / `run_history_limit`
//!   -> `fleet_scheduler::SchedulerConfig`（`DriftScheduler::start_if_enabled`）
//! - `reboot_*` -> `fleet_apply::ApplierConfig`
//! - `report_retention_days` -> `fleet_report::ReporterConfig`

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 未设置时使用内存存储。
    pub database_url: Option<String>,
    pub scheduler_enabled: bool,
    pub scheduler_drain_timeout_seconds: u64,
    pub reboot_grace_seconds: u64,
    pub reboot_poll_interval_seconds: u64,
    pub reboot_timeout_seconds: u64,
    pub run_history_limit: i64,
    pub report_retention_days: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            scheduler_enabled: true,
            scheduler_drain_timeout_seconds: 30,
            reboot_grace_seconds: 10,
            reboot_poll_interval_seconds: 5,
            reboot_timeout_seconds: 120,
            run_history_limit: 50,
            report_retention_days: 90,
        }
    }
}

impl AppConfig {
    /// 先加载本地 .env（如存在），再从环境变量读取配置。
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let database_url = read_optional("FLEET_DATABASE_URL");
        let scheduler_enabled =
            read_bool_with_default("FLEET_SCHEDULER_ENABLED", defaults.scheduler_enabled);
        let scheduler_drain_timeout_seconds = read_u64_with_default(
            "FLEET_SCHEDULER_DRAIN_TIMEOUT_SECONDS",
            defaults.scheduler_drain_timeout_seconds,
        )?;
        let reboot_grace_seconds =
            read_u64_with_default("FLEET_REBOOT_GRACE_SECONDS", defaults.reboot_grace_seconds)?;
        let reboot_poll_interval_seconds = read_u64_with_default(
            "FLEET_REBOOT_POLL_INTERVAL_SECONDS",
            defaults.reboot_poll_interval_seconds,
        )?;
        if reboot_poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "FLEET_REBOOT_POLL_INTERVAL_SECONDS".to_string(),
                "0".to_string(),
            ));
        }
        let reboot_timeout_seconds = read_u64_with_default(
            "FLEET_REBOOT_TIMEOUT_SECONDS",
            defaults.reboot_timeout_seconds,
        )?;
        let run_history_limit =
            read_u64_with_default("FLEET_RUN_HISTORY_LIMIT", defaults.run_history_limit as u64)?
                as i64;
        let report_retention_days = read_u64_with_default(
            "FLEET_REPORT_RETENTION_DAYS",
            defaults.report_retention_days,
        )?;

        Ok(Self {
            database_url,
            scheduler_enabled,
            scheduler_drain_timeout_seconds,
            reboot_grace_seconds,
            reboot_poll_interval_seconds,
            reboot_timeout_seconds,
            run_history_limit,
            report_retention_days,
        })
    }

    /// 报告保留期（毫秒）。
    pub fn report_retention_ms(&self) -> i64 {
        (self.report_retention_days as i64).saturating_mul(24 * 60 * 60 * 1000)
    }
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
