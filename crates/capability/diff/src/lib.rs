//! 配置差异引擎
//!
//! 以期望文档（规范配置）的结构为准递归比较实际文档：
//! - 期望值缺失/为 null 的字段不参与比较（继承语义），无论实际值为何
//! - 列表按下标逐项比较，期望多出的元素记为 `removed`
//! - 数值可按规则容差比较，其余标量精确比较
//!
//! 规则按顺序线性扫描，**首个**匹配的规则生效（不是最具体匹配），
//! 规则的先后顺序由调用方负责。

mod rules;

pub use rules::{FieldCompareRule, NormalizeFn, default_rules, path_matches};

use domain::{Category, CompareResult, ConfigDifference, ConfigDocument, DiffType, Severity};
use serde_json::{Map, Value};

/// 规则驱动的配置比较器。
#[derive(Debug, Clone, Default)]
pub struct ConfigComparator {
    rules: Vec<FieldCompareRule>,
}

impl ConfigComparator {
    pub fn new(rules: Vec<FieldCompareRule>) -> Self {
        Self { rules }
    }

    /// 使用内置默认规则集。
    pub fn with_default_rules() -> Self {
        Self::new(default_rules())
    }

    pub fn rules(&self) -> &[FieldCompareRule] {
        &self.rules
    }

    /// 比较期望文档与实际文档。纯函数，不会失败。
    pub fn compare(&self, expected: &ConfigDocument, actual: &ConfigDocument) -> CompareResult {
        let mut differences = Vec::new();
        match (expected, actual) {
            (Value::Null, Value::Null) => {}
            (Value::Null, _) | (_, Value::Null) => {
                differences.push(self.difference("", expected, actual, DiffType::Modified, None));
            }
            (Value::Object(expected), Value::Object(actual)) => {
                self.walk_object("", expected, actual, &mut differences);
            }
            _ => {
                let rule = self.find_rule("");
                if !rule.is_some_and(|rule| rule.skip_compare) {
                    self.compare_field("", expected, actual, rule, &mut differences);
                }
            }
        }
        CompareResult::from_differences(differences)
    }

    /// 允许两侧缺失的便捷入口：`None` 与 `Some(Value::Null)` 等价。
    pub fn compare_documents(
        &self,
        expected: Option<&ConfigDocument>,
        actual: Option<&ConfigDocument>,
    ) -> CompareResult {
        self.compare(
            expected.unwrap_or(&Value::Null),
            actual.unwrap_or(&Value::Null),
        )
    }

    /// 顺序扫描规则，返回首个匹配项。
    pub fn find_rule(&self, path: &str) -> Option<&FieldCompareRule> {
        self.rules
            .iter()
            .find(|rule| path_matches(&rule.path_pattern, path))
    }

    fn walk_object(
        &self,
        prefix: &str,
        expected: &Map<String, Value>,
        actual: &Map<String, Value>,
        out: &mut Vec<ConfigDifference>,
    ) {
        for (key, expected_value) in expected {
            // 继承语义：先于任何值比较
            if expected_value.is_null() {
                continue;
            }
            let path = join_path(prefix, key);
            let rule = self.find_rule(&path);
            if rule.is_some_and(|rule| rule.skip_compare) {
                continue;
            }
            let actual_value = actual.get(key).unwrap_or(&Value::Null);
            self.compare_field(&path, expected_value, actual_value, rule, out);
        }
    }

    fn walk_array(
        &self,
        prefix: &str,
        expected: &[Value],
        actual: &[Value],
        out: &mut Vec<ConfigDifference>,
    ) {
        let shared = expected.len().min(actual.len());
        for (index, expected_value) in expected.iter().enumerate() {
            if expected_value.is_null() {
                continue;
            }
            let path = join_path(prefix, &index.to_string());
            let rule = self.find_rule(&path);
            if rule.is_some_and(|rule| rule.skip_compare) {
                continue;
            }
            if index < shared {
                self.compare_field(&path, expected_value, &actual[index], rule, out);
            } else {
                out.push(self.difference(&path, expected_value, &Value::Null, DiffType::Removed, rule));
            }
        }
        // 实际列表多出的元素目前不报告。
    }

    fn compare_field(
        &self,
        path: &str,
        expected: &Value,
        actual: &Value,
        rule: Option<&FieldCompareRule>,
        out: &mut Vec<ConfigDifference>,
    ) {
        match (expected, actual) {
            (Value::Object(expected), Value::Object(actual)) => {
                self.walk_object(path, expected, actual, out);
            }
            (Value::Array(expected), Value::Array(actual)) => {
                self.walk_array(path, expected, actual, out);
            }
            (_, Value::Null) => {
                out.push(self.difference(path, expected, actual, DiffType::Removed, rule));
            }
            (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => {
                out.push(self.difference(path, expected, actual, DiffType::Modified, rule));
            }
            _ => {
                if !scalars_equal(expected, actual, rule) {
                    out.push(self.difference(path, expected, actual, DiffType::Modified, rule));
                }
            }
        }
    }

    fn difference(
        &self,
        path: &str,
        expected: &Value,
        actual: &Value,
        diff_type: DiffType,
        rule: Option<&FieldCompareRule>,
    ) -> ConfigDifference {
        let severity = rule
            .and_then(|rule| rule.severity)
            .unwrap_or(Severity::Critical);
        let category = rule
            .and_then(|rule| rule.category)
            .unwrap_or_else(|| infer_category(path));
        ConfigDifference::new(
            path,
            expected.clone(),
            actual.clone(),
            diff_type,
            severity,
            category,
        )
    }
}

/// 按路径前缀推断差异类别。
pub fn infer_category(path: &str) -> Category {
    let path = path.to_ascii_lowercase();
    let starts = |prefixes: &[&str]| prefixes.iter().any(|prefix| path.starts_with(prefix));
    if starts(&["wifi", "mqtt", "cloud", "coiot"]) {
        Category::Network
    } else if starts(&["auth"]) {
        Category::Security
    } else if starts(&["system", "location"]) {
        Category::System
    } else {
        Category::Device
    }
}

fn scalars_equal(expected: &Value, actual: &Value, rule: Option<&FieldCompareRule>) -> bool {
    let normalized;
    let (expected, actual) = match rule.and_then(|rule| rule.normalize.as_ref()) {
        Some(normalize) => {
            normalized = (normalize(expected), normalize(actual));
            (&normalized.0, &normalized.1)
        }
        None => (expected, actual),
    };
    match (expected, actual) {
        (Value::String(expected), Value::String(actual)) => expected == actual,
        (Value::Number(expected), Value::Number(actual)) => {
            let tolerance = rule.and_then(|rule| rule.tolerance).unwrap_or(0.0);
            if tolerance > 0.0 {
                match (expected.as_f64(), actual.as_f64()) {
                    (Some(expected), Some(actual)) => within_tolerance(expected, actual, tolerance),
                    _ => false,
                }
            } else if let (Some(expected), Some(actual)) = (expected.as_i64(), actual.as_i64()) {
                expected == actual
            } else {
                expected.as_f64() == actual.as_f64()
            }
        }
        _ => expected == actual,
    }
}

/// 容差比较，边界包含在内；按量级放宽若干 ULP 以吸收十进制小数的表示误差。
fn within_tolerance(expected: f64, actual: f64, tolerance: f64) -> bool {
    let scale = expected.abs().max(actual.abs()).max(1.0);
    (expected - actual).abs() <= tolerance + f64::EPSILON * scale * 4.0
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}
