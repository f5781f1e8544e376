//! 单台设备的差异富化与评分
//!
//! 报告按路径重新归类差异（比差异引擎的前缀推断更细），并补充描述、影响与建议。

use crate::model::{DeviceDriftAnalysis, DriftSeverity, RiskLevel, SeverityCounts};
use domain::{Category, ConfigDifference, DeviceDriftResult, DiffType, Severity};
use fleet_storage::models::DeviceRecord;

const CRITICAL_WEIGHT: usize = 20;
const WARNING_WEIGHT: usize = 10;
const INFO_WEIGHT: usize = 2;
const MAX_PENALTY: usize = 100;

/// 路径关键字匹配：按 `.` 与 `_` 切分后逐段比较。
fn tokens(path: &str) -> Vec<String> {
    path.to_ascii_lowercase()
        .split(['.', '_'])
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn any_token(tokens: &[String], keywords: &[&str]) -> bool {
    tokens
        .iter()
        .any(|token| keywords.iter().any(|keyword| token.starts_with(keyword)))
}

/// 按路径归类差异的类别与严重程度。
pub fn classify(path: &str, diff_type: DiffType) -> (Category, Severity) {
    let tokens = tokens(path);

    if any_token(&tokens, &["auth", "password", "pass", "login"]) {
        return (Category::Security, Severity::Critical);
    }
    if any_token(&tokens, &["wifi", "ip", "mqtt", "cloud", "coiot"]) {
        let ip_change = tokens
            .iter()
            .any(|token| token == "ip" || token.starts_with("ipv"));
        let station_ssid = tokens.iter().any(|token| token == "sta")
            && tokens.iter().any(|token| token == "ssid");
        let severity = if ip_change || station_ssid {
            Severity::Warning
        } else {
            Severity::Info
        };
        return (Category::Network, severity);
    }
    if any_token(
        &tokens,
        &["relay", "switch", "dimmer", "light", "roller", "component"],
    ) {
        return (Category::Device, Severity::Warning);
    }
    if any_token(&tokens, &["sys", "name", "timezone", "tz", "debug"]) {
        return (Category::System, Severity::Info);
    }
    match diff_type {
        DiffType::Removed => (Category::System, Severity::Warning),
        _ => (Category::System, Severity::Info),
    }
}

fn describe(difference: &ConfigDifference) -> String {
    let path = if difference.path.is_empty() {
        "<document>"
    } else {
        difference.path.as_str()
    };
    match difference.diff_type {
        DiffType::Added => format!(
            "Setting '{}' is present on the device but not in the stored configuration",
            path
        ),
        DiffType::Removed => format!(
            "Setting '{}' is missing from the device configuration (expected {})",
            path, difference.expected
        ),
        DiffType::Modified => format!(
            "Setting '{}' differs: expected {}, found {}",
            path, difference.expected, difference.actual
        ),
    }
}

fn impact(severity: Severity, category: Category) -> String {
    match (severity, category) {
        (Severity::Critical, Category::Security) => {
            "Device access control no longer matches policy".to_string()
        }
        (Severity::Critical, _) => "Device may not operate as intended".to_string(),
        (Severity::Warning, Category::Network) => {
            "Device connectivity may be affected".to_string()
        }
        (Severity::Warning, _) => "Device behaviour may differ from the expected setup".to_string(),
        (Severity::Info, _) => "Minor difference with limited operational impact".to_string(),
    }
}

fn suggestion(severity: Severity) -> String {
    match severity {
        Severity::Critical => "Review immediately and restore the stored configuration",
        Severity::Warning => "Review and update the stored configuration if the change was intended",
        Severity::Info => "Monitor for consistency",
    }
    .to_string()
}

/// 富化一条差异：重新归类并补充描述、影响与建议。
pub fn enrich(difference: &ConfigDifference) -> ConfigDifference {
    let (category, severity) = classify(&difference.path, difference.diff_type);
    let mut enriched = difference.clone();
    enriched.category = category;
    enriched.severity = severity;
    enriched.description = describe(&enriched);
    enriched.impact = impact(severity, category);
    enriched.suggestion = suggestion(severity);
    enriched
}

/// 健康分：100 减去加权扣分，扣分上限 100。
pub fn health_score(counts: &SeverityCounts) -> u32 {
    let penalty = counts.critical * CRITICAL_WEIGHT
        + counts.warning * WARNING_WEIGHT
        + counts.info * INFO_WEIGHT;
    (MAX_PENALTY - penalty.min(MAX_PENALTY)) as u32
}

pub fn risk_level(counts: &SeverityCounts, health_score: u32) -> RiskLevel {
    if counts.critical > 0 {
        RiskLevel::Critical
    } else if health_score < 50 {
        RiskLevel::High
    } else if counts.warning > 0 || health_score < 80 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn drift_severity(counts: &SeverityCounts) -> DriftSeverity {
    if counts.critical > 0 {
        DriftSeverity::Critical
    } else if counts.warning > 3 {
        DriftSeverity::High
    } else if counts.warning > 0 {
        DriftSeverity::Medium
    } else if counts.info > 5 || counts.total() > 0 {
        DriftSeverity::Low
    } else {
        DriftSeverity::None
    }
}

/// 分析单台设备的检测结果；`device` 为存储中的设备记录（可能缺失）。
pub fn analyze_device(
    result: &DeviceDriftResult,
    device: Option<&DeviceRecord>,
) -> DeviceDriftAnalysis {
    let differences: Vec<ConfigDifference> = result.differences.iter().map(enrich).collect();
    let counts = SeverityCounts::from_differences(&differences);
    let health_score = health_score(&counts);
    let device_name = match device {
        Some(device) if result.device_name.is_empty() => device.name.clone(),
        _ => result.device_name.clone(),
    };
    DeviceDriftAnalysis {
        device_id: result.device_id,
        device_name,
        device_type: device.map(|device| device.device_type.clone()),
        generation: device.map(|device| device.generation),
        status: result.status,
        differences,
        error: result.error.clone(),
        counts,
        health_score,
        risk_level: risk_level(&counts, health_score),
        drift_severity: drift_severity(&counts),
        checked_at_ms: result.checked_at_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counts(critical: usize, warning: usize, info: usize) -> SeverityCounts {
        SeverityCounts {
            critical,
            warning,
            info,
        }
    }

    #[test]
    fn classifies_paths_by_keyword() {
        assert_eq!(
            classify("auth.pass", DiffType::Modified),
            (Category::Security, Severity::Critical)
        );
        assert_eq!(
            classify("login.enabled", DiffType::Modified),
            (Category::Security, Severity::Critical)
        );
        assert_eq!(
            classify("wifi_sta.ssid", DiffType::Modified),
            (Category::Network, Severity::Warning)
        );
        assert_eq!(
            classify("wifi_sta.ip", DiffType::Modified),
            (Category::Network, Severity::Warning)
        );
        assert_eq!(
            classify("mqtt.server", DiffType::Modified),
            (Category::Network, Severity::Info)
        );
        assert_eq!(
            classify("relays.0.default_state", DiffType::Modified),
            (Category::Device, Severity::Warning)
        );
        assert_eq!(
            classify("timezone", DiffType::Modified),
            (Category::System, Severity::Info)
        );
        assert_eq!(
            classify("led_status_disable", DiffType::Removed),
            (Category::System, Severity::Warning)
        );
        assert_eq!(
            classify("led_status_disable", DiffType::Modified),
            (Category::System, Severity::Info)
        );
    }

    #[test]
    fn description_does_not_trigger_ip_keyword() {
        assert_eq!(
            classify("description", DiffType::Modified),
            (Category::System, Severity::Info)
        );
    }

    #[test]
    fn health_score_is_weighted_and_floored() {
        assert_eq!(health_score(&counts(0, 0, 0)), 100);
        assert_eq!(health_score(&counts(1, 0, 0)), 80);
        assert_eq!(health_score(&counts(0, 4, 0)), 60);
        assert_eq!(health_score(&counts(0, 1, 3)), 84);
        assert_eq!(health_score(&counts(3, 5, 0)), 0);
    }

    #[test]
    fn risk_and_severity_buckets() {
        assert_eq!(risk_level(&counts(1, 0, 0), 80), RiskLevel::Critical);
        assert_eq!(risk_level(&counts(0, 6, 0), 40), RiskLevel::High);
        assert_eq!(risk_level(&counts(0, 1, 0), 90), RiskLevel::Medium);
        assert_eq!(risk_level(&counts(0, 0, 11), 78), RiskLevel::Medium);
        assert_eq!(risk_level(&counts(0, 0, 2), 96), RiskLevel::Low);

        assert_eq!(drift_severity(&counts(1, 0, 0)), DriftSeverity::Critical);
        assert_eq!(drift_severity(&counts(0, 4, 0)), DriftSeverity::High);
        assert_eq!(drift_severity(&counts(0, 3, 0)), DriftSeverity::Medium);
        assert_eq!(drift_severity(&counts(0, 0, 1)), DriftSeverity::Low);
        assert_eq!(drift_severity(&counts(0, 0, 0)), DriftSeverity::None);
    }

    #[test]
    fn enrich_fills_text_fields() {
        let raw = ConfigDifference::new(
            "auth.enable",
            json!(true),
            json!(false),
            DiffType::Modified,
            Severity::Info,
            Category::Device,
        );
        let enriched = enrich(&raw);
        assert_eq!(enriched.category, Category::Security);
        assert_eq!(enriched.severity, Severity::Critical);
        assert!(enriched.description.contains("auth.enable"));
        assert!(enriched.suggestion.starts_with("Review immediately"));
        assert!(!enriched.impact.is_empty());
    }
}
