//! 车队级汇总与常见漂移模式

use crate::model::{CommonDrift, DeviceDriftAnalysis, DriftSummary};
use domain::{Category, DiffType, DriftStatus};
use std::collections::HashMap;

/// 保留的常见漂移模式数量。
pub const COMMON_DRIFT_LIMIT: usize = 10;

pub fn build_summary(devices: &[DeviceDriftAnalysis]) -> DriftSummary {
    let mut summary = DriftSummary {
        total_devices: devices.len(),
        ..DriftSummary::default()
    };
    let mut patterns: HashMap<(String, DiffType), CommonDrift> = HashMap::new();

    for device in devices {
        match device.status {
            DriftStatus::Synced => summary.devices_in_sync += 1,
            DriftStatus::Drift => summary.devices_drifted += 1,
            DriftStatus::Error => summary.devices_errored += 1,
        }
        for difference in &device.differences {
            summary.total_differences += 1;
            summary.severities.add(difference.severity);
            *summary.categories.entry(difference.category).or_insert(0) += 1;
            match difference.category {
                Category::Security => summary.security_changes += 1,
                Category::Network => summary.network_changes += 1,
                _ => {}
            }

            let pattern = patterns
                .entry((difference.path.clone(), difference.diff_type))
                .or_insert_with(|| CommonDrift {
                    path: difference.path.clone(),
                    diff_type: difference.diff_type,
                    count: 0,
                    percentage_of_drifted_devices: 0.0,
                    severity: difference.severity,
                    category: difference.category,
                    description: difference.description.clone(),
                });
            pattern.count += 1;
            if difference.severity.rank() > pattern.severity.rank() {
                pattern.severity = difference.severity;
                pattern.category = difference.category;
            }
        }
    }

    let drifted = summary.devices_drifted;
    let mut common: Vec<CommonDrift> = patterns
        .into_values()
        .map(|mut pattern| {
            if drifted > 0 {
                pattern.percentage_of_drifted_devices =
                    pattern.count as f64 / drifted as f64 * 100.0;
            }
            pattern
        })
        .collect();
    common.sort_by(|left, right| {
        right
            .count
            .cmp(&left.count)
            .then_with(|| right.severity.rank().cmp(&left.severity.rank()))
            .then_with(|| left.path.cmp(&right.path))
            .then_with(|| left.diff_type.as_str().cmp(right.diff_type.as_str()))
    });
    common.truncate(COMMON_DRIFT_LIMIT);
    summary.common_drifts = common;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze_device;
    use domain::{ConfigDifference, DeviceDriftResult, Severity};
    use serde_json::json;

    fn drifted(device_id: i64, paths: &[&str]) -> DeviceDriftAnalysis {
        let differences = paths
            .iter()
            .map(|path| {
                ConfigDifference::new(
                    *path,
                    json!(1),
                    json!(2),
                    DiffType::Modified,
                    Severity::Critical,
                    Category::Device,
                )
            })
            .collect();
        let result =
            DeviceDriftResult::from_differences(device_id, format!("dev-{}", device_id), differences, 0);
        analyze_device(&result, None)
    }

    #[test]
    fn common_drifts_rank_by_count_then_severity() {
        let devices = vec![
            drifted(1, &["mqtt.server", "auth.enable"]),
            drifted(2, &["mqtt.server", "relays.0.name"]),
            drifted(3, &["mqtt.server", "relays.0.name"]),
            drifted(4, &["auth.enable"]),
        ];
        let summary = build_summary(&devices);

        assert_eq!(summary.devices_drifted, 4);
        assert_eq!(summary.total_differences, 7);
        assert_eq!(summary.security_changes, 2);
        assert_eq!(summary.network_changes, 3);

        let order: Vec<&str> = summary
            .common_drifts
            .iter()
            .map(|drift| drift.path.as_str())
            .collect();
        assert_eq!(order, vec!["mqtt.server", "auth.enable", "relays.0.name"]);
        assert_eq!(summary.common_drifts[0].count, 3);
        assert!((summary.common_drifts[0].percentage_of_drifted_devices - 75.0).abs() < 1e-9);
    }

    #[test]
    fn keeps_only_top_patterns() {
        let paths: Vec<String> = (0..15).map(|index| format!("relays.{}.name", index)).collect();
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        let summary = build_summary(&[drifted(1, &refs)]);
        assert_eq!(summary.common_drifts.len(), COMMON_DRIFT_LIMIT);
        assert_eq!(summary.total_differences, 15);
    }
}
