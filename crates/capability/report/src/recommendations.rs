//! 处置建议
//!
//! 各条规则相互独立，输出顺序即优先顺序。

use crate::model::{
    DeviceDriftAnalysis, DriftRecommendation, DriftSummary, Priority, RecommendationAction,
    RiskLevel,
};
use domain::{Category, DriftStatus};

/// 漂移设备超过该数量时建议批量同步。
const BULK_SYNC_THRESHOLD: usize = 3;

fn device_ids_with(devices: &[DeviceDriftAnalysis], category: Category) -> Vec<i64> {
    devices
        .iter()
        .filter(|device| {
            device
                .differences
                .iter()
                .any(|difference| difference.category == category)
        })
        .map(|device| device.device_id)
        .collect()
}

fn device_names(devices: &[DeviceDriftAnalysis], ids: &[i64]) -> String {
    devices
        .iter()
        .filter(|device| ids.contains(&device.device_id))
        .map(|device| {
            if device.device_name.is_empty() {
                format!("#{}", device.device_id)
            } else {
                device.device_name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn id_list(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn action(action_type: &str, description: &str, command: Option<String>) -> RecommendationAction {
    RecommendationAction {
        action_type: action_type.to_string(),
        description: description.to_string(),
        automatable: command.is_some(),
        command,
    }
}

pub fn generate(
    devices: &[DeviceDriftAnalysis],
    summary: &DriftSummary,
) -> Vec<DriftRecommendation> {
    let mut recommendations = Vec::new();

    if summary.security_changes > 0 {
        let affected = device_ids_with(devices, Category::Security);
        recommendations.push(DriftRecommendation {
            priority: Priority::High,
            category: Category::Security.as_str().to_string(),
            title: "Security configuration drift".to_string(),
            description: format!(
                "{} security setting(s) differ from the stored configuration on: {}",
                summary.security_changes,
                device_names(devices, &affected)
            ),
            affected_device_ids: affected,
            actions: vec![
                action(
                    "review",
                    "Verify whether the authentication changes were authorised",
                    None,
                ),
                action(
                    "manual",
                    "Restore credentials and access settings on each affected device",
                    None,
                ),
            ],
            impact: "Unauthorised access to devices".to_string(),
        });
    }

    if summary.network_changes > 0 {
        let affected = device_ids_with(devices, Category::Network);
        recommendations.push(DriftRecommendation {
            priority: Priority::Medium,
            category: Category::Network.as_str().to_string(),
            title: "Network configuration drift".to_string(),
            description: format!(
                "{} network setting(s) differ from the stored configuration",
                summary.network_changes
            ),
            actions: vec![action(
                "sync",
                "Sync network settings from the stored configuration",
                Some(format!("apply-config --section network --devices {}", id_list(&affected))),
            )],
            affected_device_ids: affected,
            impact: "Devices may lose connectivity or report to the wrong broker".to_string(),
        });
    }

    let critical: Vec<i64> = devices
        .iter()
        .filter(|device| device.risk_level == RiskLevel::Critical)
        .map(|device| device.device_id)
        .collect();
    if !critical.is_empty() {
        recommendations.push(DriftRecommendation {
            priority: Priority::High,
            category: "risk".to_string(),
            title: "Devices at critical risk".to_string(),
            description: format!(
                "Critical differences found on: {}",
                device_names(devices, &critical)
            ),
            affected_device_ids: critical,
            actions: vec![
                action("review", "Review every critical difference on the device", None),
                action(
                    "restore",
                    "Restore the stored configuration once the review is complete",
                    None,
                ),
            ],
            impact: "Device security or availability is at risk".to_string(),
        });
    }

    if summary.devices_drifted > BULK_SYNC_THRESHOLD {
        let drifted: Vec<i64> = devices
            .iter()
            .filter(|device| device.status == DriftStatus::Drift)
            .map(|device| device.device_id)
            .collect();
        recommendations.push(DriftRecommendation {
            priority: Priority::Medium,
            category: "synchronization".to_string(),
            title: "Bulk synchronization".to_string(),
            description: format!(
                "{} devices have drifted; synchronize them in one pass",
                summary.devices_drifted
            ),
            actions: vec![action(
                "export",
                "Export the stored configuration to all drifted devices",
                Some(format!("apply-config --devices {}", id_list(&drifted))),
            )],
            affected_device_ids: drifted,
            impact: "Reduces manual effort for fleet-wide drift".to_string(),
        });
    }

    recommendations
}
