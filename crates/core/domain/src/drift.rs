//! 漂移检测结果模型（调度器产出，报告模块消费）。

use crate::difference::ConfigDifference;
use serde::{Deserialize, Serialize};

/// 单台设备的检测状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftStatus {
    Synced,
    Drift,
    Error,
}

impl DriftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftStatus::Synced => "synced",
            DriftStatus::Drift => "drift",
            DriftStatus::Error => "error",
        }
    }
}

/// 单台设备的漂移检测结果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDriftResult {
    pub device_id: i64,
    pub device_name: String,
    pub status: DriftStatus,
    #[serde(default)]
    pub differences: Vec<ConfigDifference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at_ms: i64,
}

impl DeviceDriftResult {
    /// 由差异列表构造结果：无差异即为 synced。
    pub fn from_differences(
        device_id: i64,
        device_name: impl Into<String>,
        differences: Vec<ConfigDifference>,
        checked_at_ms: i64,
    ) -> Self {
        let status = if differences.is_empty() {
            DriftStatus::Synced
        } else {
            DriftStatus::Drift
        };
        Self {
            device_id,
            device_name: device_name.into(),
            status,
            differences,
            error: None,
            checked_at_ms,
        }
    }

    /// 构造检测失败的结果。
    pub fn failed(
        device_id: i64,
        device_name: impl Into<String>,
        error: impl Into<String>,
        checked_at_ms: i64,
    ) -> Self {
        Self {
            device_id,
            device_name: device_name.into(),
            status: DriftStatus::Error,
            differences: Vec::new(),
            error: Some(error.into()),
            checked_at_ms,
        }
    }
}

/// 批量漂移检测结果。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkDriftResult {
    pub total: usize,
    pub in_sync: usize,
    pub drifted: usize,
    pub errors: usize,
    pub results: Vec<DeviceDriftResult>,
    pub started_at_ms: i64,
    pub duration_ms: i64,
}

impl BulkDriftResult {
    /// 按结果汇总计数。
    pub fn from_results(results: Vec<DeviceDriftResult>, started_at_ms: i64, duration_ms: i64) -> Self {
        let mut summary = Self {
            total: results.len(),
            started_at_ms,
            duration_ms,
            ..Self::default()
        };
        for result in &results {
            match result.status {
                DriftStatus::Synced => summary.in_sync += 1,
                DriftStatus::Drift => summary.drifted += 1,
                DriftStatus::Error => summary.errors += 1,
            }
        }
        summary.results = results;
        summary
    }
}
