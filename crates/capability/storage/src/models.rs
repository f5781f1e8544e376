//! 数据模型
//!
//! 定义所有存储相关的数据模型和更新结构：
//! - 设备模型：DeviceRecord, DeviceFilter
//! - 检测计划：ScheduleRecord, ScheduleUpdate, DeviceSelection
//! - 执行记录：RunRecord, RunStatus
//! - 漂移报告：ReportRecord, ReportQuery（子对象以序列化文本保存）
//! - 漂移趋势：TrendRecord, TrendObservation, TrendQuery
//!
//! 所有记录 ID 由存储在创建时分配；传入的 `id` 字段会被忽略。

use domain::{Category, ConfigDocument, Severity};
use serde::{Deserialize, Serialize};

/// 设备记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub device_type: String,
    pub generation: i32,
    pub enabled: bool,
}

/// 设备筛选条件；空列表表示不限制该维度。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceFilter {
    #[serde(default)]
    pub device_types: Vec<String>,
    #[serde(default)]
    pub generations: Vec<i32>,
    #[serde(default)]
    pub enabled_only: bool,
}

impl DeviceFilter {
    pub fn matches(&self, device: &DeviceRecord) -> bool {
        if self.enabled_only && !device.enabled {
            return false;
        }
        if !self.device_types.is_empty()
            && !self
                .device_types
                .iter()
                .any(|device_type| device_type == &device.device_type)
        {
            return false;
        }
        if !self.generations.is_empty() && !self.generations.contains(&device.generation) {
            return false;
        }
        true
    }
}

/// 计划的设备选择：显式 ID 列表、筛选条件或全部设备（三选一）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeviceSelection {
    #[default]
    All,
    Devices { device_ids: Vec<i64> },
    Filter(DeviceFilter),
}

/// 漂移检测计划。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub cron_spec: String,
    pub enabled: bool,
    pub selection: DeviceSelection,
    pub last_run_ms: Option<i64>,
    pub next_run_ms: Option<i64>,
    pub run_count: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl ScheduleRecord {
    /// 构造待创建的计划（ID 与时间戳由存储填充）。
    pub fn new(name: impl Into<String>, cron_spec: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            description: None,
            cron_spec: cron_spec.into(),
            enabled: true,
            selection: DeviceSelection::All,
            last_run_ms: None,
            next_run_ms: None,
            run_count: 0,
            created_at_ms: 0,
            updated_at_ms: 0,
        }
    }
}

/// 计划更新；`None` 表示保持不变。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cron_spec: Option<String>,
    pub enabled: Option<bool>,
    pub selection: Option<DeviceSelection>,
}

impl ScheduleUpdate {
    pub fn apply_to(&self, record: &mut ScheduleRecord) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(description) = &self.description {
            record.description = Some(description.clone());
        }
        if let Some(cron_spec) = &self.cron_spec {
            record.cron_spec = cron_spec.clone();
        }
        if let Some(enabled) = self.enabled {
            record.enabled = enabled;
        }
        if let Some(selection) = &self.selection {
            record.selection = selection.clone();
        }
    }
}

/// 执行状态：running -> completed | failed。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// 计划执行记录（按计划追加）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: i64,
    pub schedule_id: i64,
    pub status: RunStatus,
    pub started_at_ms: i64,
    pub completed_at_ms: Option<i64>,
    pub duration_ms: Option<i64>,
    pub result: Option<ConfigDocument>,
    pub error: Option<String>,
}

impl RunRecord {
    /// 构造一条 running 状态的执行记录。
    pub fn started(schedule_id: i64, started_at_ms: i64) -> Self {
        Self {
            id: 0,
            schedule_id,
            status: RunStatus::Running,
            started_at_ms,
            completed_at_ms: None,
            duration_ms: None,
            result: None,
            error: None,
        }
    }

    pub fn complete(&mut self, completed_at_ms: i64, result: ConfigDocument) {
        self.status = RunStatus::Completed;
        self.completed_at_ms = Some(completed_at_ms);
        self.duration_ms = Some(completed_at_ms - self.started_at_ms);
        self.result = Some(result);
        self.error = None;
    }

    pub fn fail(&mut self, completed_at_ms: i64, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.completed_at_ms = Some(completed_at_ms);
        self.duration_ms = Some(completed_at_ms - self.started_at_ms);
        self.error = Some(error.into());
    }
}

/// 报告记录；汇总、设备分析、建议以 JSON 文本保存，整体一次写入。
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRecord {
    pub id: i64,
    pub report_type: String,
    pub device_id: Option<i64>,
    pub schedule_id: Option<i64>,
    pub generated_at_ms: i64,
    pub summary: String,
    pub devices: String,
    pub recommendations: String,
}

/// 报告查询条件。
#[derive(Debug, Clone, Default)]
pub struct ReportQuery {
    pub report_type: Option<String>,
    pub device_id: Option<i64>,
    pub schedule_id: Option<i64>,
    /// `<= 0` 表示不限制。
    pub limit: i64,
}

impl ReportQuery {
    pub fn matches(&self, record: &ReportRecord) -> bool {
        self.report_type
            .as_ref()
            .is_none_or(|report_type| report_type == &record.report_type)
            && self
                .device_id
                .is_none_or(|device_id| record.device_id == Some(device_id))
            && self
                .schedule_id
                .is_none_or(|schedule_id| record.schedule_id == Some(schedule_id))
    }
}

/// 漂移趋势：未解决状态下 (device_id, path) 唯一。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRecord {
    pub id: i64,
    pub device_id: i64,
    pub path: String,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
    pub occurrences: i64,
    pub severity: Severity,
    pub category: Category,
    pub resolved: bool,
    pub resolved_at_ms: Option<i64>,
}

/// 一次漂移观测，用于趋势 upsert。
#[derive(Debug, Clone, PartialEq)]
pub struct TrendObservation {
    pub device_id: i64,
    pub path: String,
    pub severity: Severity,
    pub category: Category,
    pub observed_at_ms: i64,
}

/// 趋势查询条件。
#[derive(Debug, Clone, Default)]
pub struct TrendQuery {
    pub device_id: Option<i64>,
    pub include_resolved: bool,
    /// `<= 0` 表示不限制。
    pub limit: i64,
}

impl TrendQuery {
    pub fn matches(&self, record: &TrendRecord) -> bool {
        (self.include_resolved || !record.resolved)
            && self
                .device_id
                .is_none_or(|device_id| record.device_id == device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selection_serializes_with_mode_tag() {
        let selection = DeviceSelection::Devices {
            device_ids: vec![3, 5],
        };
        assert_eq!(
            serde_json::to_value(&selection).expect("encode"),
            json!({ "mode": "devices", "device_ids": [3, 5] })
        );
        let filter: DeviceSelection =
            serde_json::from_value(json!({ "mode": "filter", "generations": [2] }))
                .expect("decode");
        assert_eq!(
            filter,
            DeviceSelection::Filter(DeviceFilter {
                generations: vec![2],
                ..DeviceFilter::default()
            })
        );
        let all: DeviceSelection = serde_json::from_value(json!({ "mode": "all" })).expect("decode");
        assert_eq!(all, DeviceSelection::All);
    }

    #[test]
    fn update_keeps_unset_fields() {
        let mut record = ScheduleRecord::new("hourly", "0 * * * *");
        ScheduleUpdate {
            cron_spec: Some("*/5 * * * *".to_string()),
            ..ScheduleUpdate::default()
        }
        .apply_to(&mut record);
        assert_eq!(record.cron_spec, "*/5 * * * *");
        assert_eq!(record.name, "hourly");
        assert!(record.enabled);
    }
}
