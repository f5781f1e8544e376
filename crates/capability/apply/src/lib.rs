//! 配置下发
//!
//! 将规范配置转换为设备线上格式后，按协议固定分组逐组写入设备：
//! 基础信息（名称/时区/位置/功耗/LED）、`wifi_sta`、`wifi_ap`、`mqtt`、
//! `cloud`、`coiot`、`relays`。各组独立写入，某组失败只记录失败项，
//! 不影响后续分组（允许部分下发）。

use domain::ConfigDocument;
use fleet_config::AppConfig;
use fleet_device::{ConfigConverter, DeviceClient, DeviceError};
use fleet_telemetry::{record_reboot_wait, record_settings_applied};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 基础信息分组中的顶层键。
const IDENTITY_KEYS: &[&str] = &[
    "name",
    "timezone",
    "tzautodetect",
    "lat",
    "lng",
    "eco_mode_enabled",
    "max_power",
    "discoverable",
    "led_status_disable",
    "led_power_disable",
];

/// 以独立文档写入的嵌套分组，按写入顺序排列。
const NESTED_GROUPS: &[&str] = &["wifi_sta", "wifi_ap", "mqtt", "cloud", "coiot", "relays"];

/// 变更后需要重启才能生效的线上字段。
const REBOOT_SENSITIVE_FIELDS: &[&str] = &[
    "wifi_sta.ssid",
    "wifi_sta.key",
    "wifi_sta.enabled",
    "login.enabled",
    "login.username",
    "login.password",
];

/// 配置下发错误。
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("conversion error: {0}")]
    Conversion(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("device did not come back online within {elapsed:?}")]
    Timeout { elapsed: Duration },
    #[error("wait cancelled")]
    Cancelled,
}

/// 单项下发失败。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyFailure {
    pub path: String,
    pub value: Value,
    pub error: String,
}

/// 一次下发的结果；部分失败也会返回结果而非错误。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyResult {
    pub success: bool,
    pub settings_count: usize,
    pub applied_count: usize,
    pub failed_count: usize,
    pub failures: Vec<ApplyFailure>,
    pub requires_reboot: bool,
    pub warnings: Vec<String>,
    pub duration_ms: i64,
}

/// 下发参数。
#[derive(Debug, Clone)]
pub struct ApplierConfig {
    pub reboot_grace: Duration,
    pub poll_interval: Duration,
    pub reboot_timeout: Duration,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            reboot_grace: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            reboot_timeout: Duration::from_secs(120),
        }
    }
}

impl From<&AppConfig> for ApplierConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            reboot_grace: Duration::from_secs(config.reboot_grace_seconds),
            poll_interval: Duration::from_secs(config.reboot_poll_interval_seconds.max(1)),
            reboot_timeout: Duration::from_secs(config.reboot_timeout_seconds),
        }
    }
}

/// 面向单台设备的配置下发器。
#[derive(Clone)]
pub struct ConfigApplier {
    client: Arc<dyn DeviceClient>,
    converter: Arc<dyn ConfigConverter>,
    config: ApplierConfig,
}

impl ConfigApplier {
    pub fn new(client: Arc<dyn DeviceClient>, converter: Arc<dyn ConfigConverter>) -> Self {
        Self::new_with_config(client, converter, ApplierConfig::default())
    }

    pub fn new_with_config(
        client: Arc<dyn DeviceClient>,
        converter: Arc<dyn ConfigConverter>,
        config: ApplierConfig,
    ) -> Self {
        Self {
            client,
            converter,
            config,
        }
    }

    pub fn config(&self) -> &ApplierConfig {
        &self.config
    }

    /// 下发规范配置。
    ///
    /// 仅在任何设备写入之前的转换失败时返回错误；分组写入失败体现在
    /// `ApplyResult.failures` 中。
    pub async fn apply_config(
        &self,
        desired: &ConfigDocument,
        device_type: &str,
    ) -> Result<ApplyResult, ApplyError> {
        let started_at = Instant::now();
        let current = match self.client.get_config().await {
            Ok(current) => Some(current),
            Err(err) => {
                warn!(
                    target: "fleet.apply",
                    device_type = %device_type,
                    error = %err,
                    "apply_current_config_unavailable"
                );
                None
            }
        };

        let wire = self
            .converter
            .to_wire(desired, device_type)
            .map_err(|err| ApplyError::Conversion(err.to_string()))?;
        let Some(settings) = wire.as_object() else {
            return Err(ApplyError::Conversion(
                "wire configuration must be an object".to_string(),
            ));
        };

        let mut result = ApplyResult {
            settings_count: count_settings(&wire),
            ..ApplyResult::default()
        };

        let mut identity = Map::new();
        for (key, value) in settings {
            if value.is_null() {
                continue;
            }
            if IDENTITY_KEYS.contains(&key.as_str()) {
                identity.insert(key.clone(), value.clone());
            } else if !NESTED_GROUPS.contains(&key.as_str()) {
                result
                    .warnings
                    .push(format!("setting '{}' is not supported and was not applied", key));
            }
        }

        if !identity.is_empty() {
            let document = Value::Object(identity.clone());
            match self.write_group(&document).await {
                Ok(()) => {
                    result.applied_count += identity.values().map(count_setting).sum::<usize>();
                }
                Err(err) => {
                    warn!(target: "fleet.apply", group = "identity", error = %err, "apply_group_failed");
                    for (key, value) in identity {
                        result.failed_count += count_setting(&value);
                        result.failures.push(ApplyFailure {
                            path: key,
                            value,
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        for group in NESTED_GROUPS {
            let Some(value) = settings.get(*group) else {
                continue;
            };
            let count = count_setting(value);
            if count == 0 {
                continue;
            }
            let mut document = Map::new();
            document.insert((*group).to_string(), value.clone());
            match self.write_group(&Value::Object(document)).await {
                Ok(()) => result.applied_count += count,
                Err(err) => {
                    warn!(target: "fleet.apply", group = %group, error = %err, "apply_group_failed");
                    result.failed_count += count;
                    result.failures.push(ApplyFailure {
                        path: (*group).to_string(),
                        value: value.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        result.requires_reboot =
            requires_reboot(current.as_ref(), &wire, desired, &mut result.warnings);
        result.success = result.failed_count == 0;
        result.duration_ms = started_at.elapsed().as_millis() as i64;
        record_settings_applied(result.applied_count as u64, result.failed_count as u64);
        info!(
            target: "fleet.apply",
            device_type = %device_type,
            settings = result.settings_count,
            applied = result.applied_count,
            failed = result.failed_count,
            requires_reboot = result.requires_reboot,
            duration_ms = result.duration_ms,
            "apply_completed"
        );
        Ok(result)
    }

    /// 重启设备并等待其恢复连通。
    ///
    /// 重启后先等待固定宽限期，再按固定间隔探测，直到探测成功或超时。
    /// `cancel` 触发时立即返回 `ApplyError::Cancelled`。
    pub async fn reboot_and_wait(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ApplyError> {
        let started_at = Instant::now();
        let deadline = started_at + timeout;
        self.client
            .reboot()
            .await
            .map_err(|err| ApplyError::Device(err.to_string()))?;
        info!(target: "fleet.apply", timeout_ms = timeout.as_millis() as u64, "reboot_issued");

        let grace_until = (Instant::now() + self.config.reboot_grace).min(deadline);
        tokio::select! {
            _ = cancel.cancelled() => return Err(ApplyError::Cancelled),
            _ = sleep_until(grace_until) => {}
        }

        loop {
            let poll = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApplyError::Cancelled),
                result = self.client.test_connection() => Some(result),
                _ = sleep_until(deadline) => None,
            };
            if let Some(Ok(())) = poll {
                record_reboot_wait(false);
                info!(
                    target: "fleet.apply",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "reboot_device_online"
                );
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                let elapsed = now.duration_since(started_at);
                record_reboot_wait(true);
                warn!(
                    target: "fleet.apply",
                    elapsed_ms = elapsed.as_millis() as u64,
                    "reboot_wait_timeout"
                );
                return Err(ApplyError::Timeout { elapsed });
            }
            let next_poll = (now + self.config.poll_interval).min(deadline);
            tokio::select! {
                _ = cancel.cancelled() => return Err(ApplyError::Cancelled),
                _ = sleep_until(next_poll) => {}
            }
        }
    }

    /// 每组只发起一次写调用，失败由调用方按组记录。
    async fn write_group(&self, document: &Value) -> Result<(), DeviceError> {
        self.client.set_config(document).await
    }
}

/// 统计顶层设置项数量：对象按键数、列表按元素数、标量计 1。
pub fn count_settings(document: &Value) -> usize {
    match document {
        Value::Object(map) => map.values().map(count_setting).sum(),
        other => count_setting(other),
    }
}

fn count_setting(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Object(map) => map.len(),
        Value::Array(items) => items.len(),
        _ => 1,
    }
}

fn requires_reboot(
    current: Option<&Value>,
    wire: &Value,
    desired: &Value,
    warnings: &mut Vec<String>,
) -> bool {
    let auth_enabled = ["enable", "enabled"]
        .iter()
        .any(|key| desired.get("auth").and_then(|auth| auth.get(*key)) == Some(&Value::Bool(true)));
    if auth_enabled {
        return true;
    }
    for path in REBOOT_SENSITIVE_FIELDS {
        let Some(after) = lookup(wire, path).filter(|value| !value.is_null()) else {
            continue;
        };
        match current {
            Some(current) => {
                if lookup(current, path) != Some(after) {
                    return true;
                }
            }
            None => {
                warnings.push(
                    "current configuration unavailable, assuming reboot is required".to_string(),
                );
                return true;
            }
        }
    }
    false
}

fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |node, segment| node.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn count_settings_uses_top_level_shape() {
        let doc = json!({
            "name": "plug",
            "wifi_sta": { "enabled": true, "ssid": "home" },
            "relays": [{ "name": "a" }, { "name": "b" }, { "name": "c" }],
            "cloud": null
        });
        assert_eq!(count_settings(&doc), 1 + 2 + 3);
    }

    #[test]
    fn lookup_walks_nested_objects() {
        let doc = json!({ "wifi_sta": { "ssid": "home" } });
        assert_eq!(lookup(&doc, "wifi_sta.ssid"), Some(&json!("home")));
        assert_eq!(lookup(&doc, "login.enabled"), None);
    }

    #[test]
    fn ssid_change_requires_reboot() {
        let mut warnings = Vec::new();
        let current = json!({ "wifi_sta": { "ssid": "old" } });
        let wire = json!({ "wifi_sta": { "ssid": "new" } });
        assert!(requires_reboot(Some(&current), &wire, &json!({}), &mut warnings));
        assert!(!requires_reboot(Some(&wire), &wire, &json!({}), &mut warnings));
        assert!(warnings.is_empty());
    }

    #[test]
    fn enabled_auth_always_requires_reboot() {
        let mut warnings = Vec::new();
        let desired = json!({ "auth": { "enable": true } });
        assert!(requires_reboot(Some(&json!({})), &json!({}), &desired, &mut warnings));
    }

    #[test]
    fn unknown_current_config_assumes_reboot() {
        let mut warnings = Vec::new();
        let wire = json!({ "login": { "enabled": false } });
        assert!(requires_reboot(None, &wire, &json!({}), &mut warnings));
        assert_eq!(warnings.len(), 1);
    }
}
