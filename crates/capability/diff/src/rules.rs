//! 字段比较规则与路径匹配。

use domain::{Category, Severity};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// 比较前对两侧标量做的归一化（例如大小写、去空白）。
pub type NormalizeFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// 按路径匹配的比较策略。
///
/// `path_pattern` 按 `.` 分段，`*` 匹配任意单段，段数必须一致。
#[derive(Clone, Default)]
pub struct FieldCompareRule {
    pub path_pattern: String,
    pub skip_compare: bool,
    pub tolerance: Option<f64>,
    pub severity: Option<Severity>,
    pub category: Option<Category>,
    pub normalize: Option<NormalizeFn>,
}

impl FieldCompareRule {
    pub fn new(path_pattern: impl Into<String>) -> Self {
        Self {
            path_pattern: path_pattern.into(),
            ..Self::default()
        }
    }

    /// 跳过该路径（及其子树）的比较。
    pub fn skip(mut self) -> Self {
        self.skip_compare = true;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_normalizer(
        mut self,
        normalize: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.normalize = Some(Arc::new(normalize));
        self
    }
}

impl fmt::Debug for FieldCompareRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCompareRule")
            .field("path_pattern", &self.path_pattern)
            .field("skip_compare", &self.skip_compare)
            .field("tolerance", &self.tolerance)
            .field("severity", &self.severity)
            .field("category", &self.category)
            .field("normalize", &self.normalize.is_some())
            .finish()
    }
}

/// 路径匹配：完全相等，或段数相同且逐段相等/为 `*`。
pub fn path_matches(pattern: &str, path: &str) -> bool {
    if pattern == path {
        return true;
    }
    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let path_segments: Vec<&str> = path.split('.').collect();
    if pattern_segments.len() != path_segments.len() {
        return false;
    }
    pattern_segments
        .iter()
        .zip(path_segments.iter())
        .all(|(pattern, segment)| *pattern == "*" || pattern == segment)
}

/// 内置默认规则集。
///
/// - 经纬度允许 0.0001 的浮动
/// - `metadata` 子树为模板/记账信息，不比较
/// - `updated_at` 时间戳（顶层或一级分组下）不比较
/// - 认证口令差异固定为 security/critical
pub fn default_rules() -> Vec<FieldCompareRule> {
    vec![
        FieldCompareRule::new("metadata").skip(),
        FieldCompareRule::new("updated_at").skip(),
        FieldCompareRule::new("*.updated_at").skip(),
        FieldCompareRule::new("location.lat")
            .with_tolerance(0.0001)
            .with_severity(Severity::Info)
            .with_category(Category::System),
        FieldCompareRule::new("location.lng")
            .with_tolerance(0.0001)
            .with_severity(Severity::Info)
            .with_category(Category::System),
        FieldCompareRule::new("auth.pass")
            .with_severity(Severity::Critical)
            .with_category(Category::Security),
    ]
}
