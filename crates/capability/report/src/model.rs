//! 报告数据模型

use domain::{Category, ConfigDifference, DiffType, DriftStatus, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 报告类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Scheduled,
    Manual,
    Device,
    Fleet,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::Device => "device",
            Self::Fleet => "fleet",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "manual" => Some(Self::Manual),
            "device" => Some(Self::Device),
            "fleet" => Some(Self::Fleet),
            _ => None,
        }
    }
}

/// 设备风险等级。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// 设备漂移程度分档。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftSeverity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// 按严重程度的差异计数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

impl SeverityCounts {
    pub fn from_differences(differences: &[ConfigDifference]) -> Self {
        let mut counts = Self::default();
        for difference in differences {
            counts.add(difference.severity);
        }
        counts
    }

    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::Warning => self.warning += 1,
            Severity::Info => self.info += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.warning + self.info
    }
}

/// 单台设备的分析结果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDriftAnalysis {
    pub device_id: i64,
    pub device_name: String,
    pub device_type: Option<String>,
    pub generation: Option<i32>,
    pub status: DriftStatus,
    pub differences: Vec<ConfigDifference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub counts: SeverityCounts,
    pub health_score: u32,
    pub risk_level: RiskLevel,
    pub drift_severity: DriftSeverity,
    pub checked_at_ms: i64,
}

/// 跨设备的常见漂移模式，按 (path, type) 聚合。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonDrift {
    pub path: String,
    #[serde(rename = "type")]
    pub diff_type: DiffType,
    pub count: usize,
    pub percentage_of_drifted_devices: f64,
    pub severity: Severity,
    pub category: Category,
    pub description: String,
}

/// 车队级汇总。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftSummary {
    pub total_devices: usize,
    pub devices_in_sync: usize,
    pub devices_drifted: usize,
    pub devices_errored: usize,
    pub total_differences: usize,
    pub severities: SeverityCounts,
    pub categories: BTreeMap<Category, usize>,
    pub security_changes: usize,
    pub network_changes: usize,
    pub common_drifts: Vec<CommonDrift>,
}

/// 建议优先级。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// 建议中的一个动作。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub description: String,
    pub automatable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// 处置建议。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftRecommendation {
    pub priority: Priority,
    pub category: String,
    pub title: String,
    pub description: String,
    pub affected_device_ids: Vec<i64>,
    pub actions: Vec<RecommendationAction>,
    pub impact: String,
}

/// 漂移报告。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub id: i64,
    pub report_type: ReportType,
    pub device_id: Option<i64>,
    pub schedule_id: Option<i64>,
    pub generated_at_ms: i64,
    pub summary: DriftSummary,
    pub devices: Vec<DeviceDriftAnalysis>,
    pub recommendations: Vec<DriftRecommendation>,
}

impl DriftReport {
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn total_differences(&self) -> usize {
        self.devices
            .iter()
            .map(|device| device.differences.len())
            .sum()
    }

    /// 按设备 ID 查找分析结果。
    pub fn device(&self, device_id: i64) -> Option<&DeviceDriftAnalysis> {
        self.devices
            .iter()
            .find(|device| device.device_id == device_id)
    }
}
