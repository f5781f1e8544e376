//! 配置差异模型
//!
//! 差异引擎产出的是"裸"差异（路径、期望值、实际值、类型、严重级别、类别），
//! 报告模块在此基础上补充描述、影响与建议。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 差异类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffType {
    Added,
    Removed,
    Modified,
}

impl DiffType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffType::Added => "added",
            DiffType::Removed => "removed",
            DiffType::Modified => "modified",
        }
    }
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 差异严重级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// 排序权重：critical > warning > info。
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 3,
            Severity::Warning => 2,
            Severity::Info => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "warning" => Some(Severity::Warning),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 差异类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Security,
    Network,
    Device,
    System,
    Metadata,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Security => "security",
            Category::Network => "network",
            Category::Device => "device",
            Category::System => "system",
            Category::Metadata => "metadata",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "security" => Some(Category::Security),
            "network" => Some(Category::Network),
            "device" => Some(Category::Device),
            "system" => Some(Category::System),
            "metadata" => Some(Category::Metadata),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条配置差异。
///
/// `path` 为点分路径（字段名或列表下标），顶层整体不一致时为空串。
/// `expected`/`actual` 缺失时为 `Value::Null`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDifference {
    pub path: String,
    #[serde(default)]
    pub expected: Value,
    #[serde(default)]
    pub actual: Value,
    #[serde(rename = "type")]
    pub diff_type: DiffType,
    pub severity: Severity,
    pub category: Category,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub impact: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suggestion: String,
}

impl ConfigDifference {
    /// 构造未补充描述信息的差异。
    pub fn new(
        path: impl Into<String>,
        expected: Value,
        actual: Value,
        diff_type: DiffType,
        severity: Severity,
        category: Category,
    ) -> Self {
        Self {
            path: path.into(),
            expected,
            actual,
            diff_type,
            severity,
            category,
            description: String::new(),
            impact: String::new(),
            suggestion: String::new(),
        }
    }
}

/// 一次比较的结果；`matched` 当且仅当差异列表为空。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareResult {
    #[serde(rename = "match")]
    pub matched: bool,
    pub differences: Vec<ConfigDifference>,
}

impl CompareResult {
    pub fn from_differences(differences: Vec<ConfigDifference>) -> Self {
        Self {
            matched: differences.is_empty(),
            differences,
        }
    }
}
