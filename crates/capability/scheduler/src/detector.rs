//! 批量漂移检测
//!
//! 逐台设备：读取设备记录 -> 获取规范配置 -> 构造客户端 -> 读取实际配置 -> 比较。
//! 单台设备的任何失败只记为该设备的 `error` 结果，不影响其它设备。

use crate::SchedulerError;
use async_trait::async_trait;
use domain::{BulkDriftResult, DeviceDriftResult, DriftStatus, now_epoch_ms};
use fleet_device::{DesiredConfigSource, DeviceClientFactory, DeviceTarget};
use fleet_diff::ConfigComparator;
use fleet_storage::DeviceStore;
use fleet_telemetry::record_device_checked;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// 批量漂移检测能力。
#[async_trait]
pub trait BulkDriftDetector: Send + Sync {
    async fn detect(&self, device_ids: &[i64]) -> Result<BulkDriftResult, SchedulerError>;
}

/// 默认的顺序检测实现。
pub struct DriftDetector {
    devices: Arc<dyn DeviceStore>,
    clients: Arc<dyn DeviceClientFactory>,
    desired: Arc<dyn DesiredConfigSource>,
    comparator: ConfigComparator,
}

impl DriftDetector {
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        clients: Arc<dyn DeviceClientFactory>,
        desired: Arc<dyn DesiredConfigSource>,
        comparator: ConfigComparator,
    ) -> Self {
        Self {
            devices,
            clients,
            desired,
            comparator,
        }
    }

    async fn check_device(&self, device_id: i64) -> DeviceDriftResult {
        let device = match self.devices.find_device(device_id).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                return DeviceDriftResult::failed(
                    device_id,
                    "",
                    format!("device {} not found", device_id),
                    now_epoch_ms(),
                );
            }
            Err(err) => {
                return DeviceDriftResult::failed(device_id, "", err.to_string(), now_epoch_ms());
            }
        };
        let failed = |error: String| {
            DeviceDriftResult::failed(device.id, device.name.clone(), error, now_epoch_ms())
        };

        let desired = match self.desired.desired_config(device.id).await {
            Ok(Some(desired)) => desired,
            Ok(None) => return failed("no canonical configuration for device".to_string()),
            Err(err) => return failed(err.to_string()),
        };
        let target = DeviceTarget {
            device_id: device.id,
            address: device.address.clone(),
            device_type: device.device_type.clone(),
            generation: device.generation,
        };
        let client = match self.clients.client_for(&target) {
            Ok(client) => client,
            Err(err) => return failed(err.to_string()),
        };
        let actual = match client.get_config().await {
            Ok(actual) => actual,
            Err(err) => return failed(err.to_string()),
        };

        let compared = self.comparator.compare(&desired, &actual);
        DeviceDriftResult::from_differences(
            device.id,
            device.name.clone(),
            compared.differences,
            now_epoch_ms(),
        )
    }
}

#[async_trait]
impl BulkDriftDetector for DriftDetector {
    async fn detect(&self, device_ids: &[i64]) -> Result<BulkDriftResult, SchedulerError> {
        let started_at_ms = now_epoch_ms();
        let started = Instant::now();
        let mut results = Vec::with_capacity(device_ids.len());
        for device_id in device_ids {
            let result = self.check_device(*device_id).await;
            match result.status {
                DriftStatus::Error => warn!(
                    target: "fleet.scheduler",
                    device_id = *device_id,
                    error = result.error.as_deref().unwrap_or_default(),
                    "drift_device_check_failed"
                ),
                status => debug!(
                    target: "fleet.scheduler",
                    device_id = *device_id,
                    status = status.as_str(),
                    differences = result.differences.len(),
                    "drift_device_checked"
                ),
            }
            record_device_checked(
                result.status == DriftStatus::Drift,
                result.status == DriftStatus::Error,
            );
            results.push(result);
        }
        Ok(BulkDriftResult::from_results(
            results,
            started_at_ms,
            started.elapsed().as_millis() as i64,
        ))
    }
}
