//! 设备侧能力抽象
//!
//! 实际的网络传输、模板渲染不在本 workspace 内实现，这里只定义接缝：
//! - `DeviceClient`：读写设备配置、重启、连通性探测
//! - `DeviceClientFactory`：按设备构造客户端
//! - `DesiredConfigSource`：提供设备的规范（期望）配置
//! - `ConfigConverter`：规范配置 -> 设备线上表示

use async_trait::async_trait;
use domain::ConfigDocument;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// 设备通信错误。
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("device unreachable: {0}")]
    Unreachable(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("conversion error: {0}")]
    Conversion(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// 设备基础信息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_type: String,
    pub generation: i32,
    pub firmware: Option<String>,
    pub mac: Option<String>,
}

/// 构造客户端所需的设备寻址信息。
#[derive(Debug, Clone)]
pub struct DeviceTarget {
    pub device_id: i64,
    pub address: String,
    pub device_type: String,
    pub generation: i32,
}

/// 设备客户端抽象。
#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn get_config(&self) -> Result<ConfigDocument, DeviceError>;

    /// 写入一组设置（一次独立的写调用）。
    async fn set_config(&self, group: &ConfigDocument) -> Result<(), DeviceError>;

    async fn get_info(&self) -> Result<DeviceInfo, DeviceError>;

    async fn reboot(&self) -> Result<(), DeviceError>;

    async fn test_connection(&self) -> Result<(), DeviceError>;
}

/// 设备客户端工厂。
pub trait DeviceClientFactory: Send + Sync {
    fn client_for(&self, target: &DeviceTarget) -> Result<Arc<dyn DeviceClient>, DeviceError>;
}

/// 规范配置来源（通常由模板引擎物化）。
#[async_trait]
pub trait DesiredConfigSource: Send + Sync {
    /// 返回 `None` 表示该设备没有规范配置。
    async fn desired_config(&self, device_id: i64) -> Result<Option<ConfigDocument>, DeviceError>;
}

/// 静态规范配置表（用于接线与测试）。
#[derive(Default)]
pub struct StaticDesiredConfigs {
    configs: RwLock<HashMap<i64, ConfigDocument>>,
}

impl StaticDesiredConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, device_id: i64, config: ConfigDocument) {
        if let Ok(mut configs) = self.configs.write() {
            configs.insert(device_id, config);
        }
    }
}

#[async_trait]
impl DesiredConfigSource for StaticDesiredConfigs {
    async fn desired_config(&self, device_id: i64) -> Result<Option<ConfigDocument>, DeviceError> {
        let configs = self
            .configs
            .read()
            .map_err(|_| DeviceError::Request("lock failed".to_string()))?;
        Ok(configs.get(&device_id).cloned())
    }
}

/// 规范配置到设备线上格式的转换器。
pub trait ConfigConverter: Send + Sync {
    fn to_wire(
        &self,
        canonical: &ConfigDocument,
        device_type: &str,
    ) -> Result<ConfigDocument, DeviceError>;
}

/// 直通转换：规范配置已是线上格式，仅要求为对象。
#[derive(Debug, Default)]
pub struct PassthroughConverter;

impl ConfigConverter for PassthroughConverter {
    fn to_wire(
        &self,
        canonical: &ConfigDocument,
        device_type: &str,
    ) -> Result<ConfigDocument, DeviceError> {
        if !canonical.is_object() {
            return Err(DeviceError::Conversion(format!(
                "configuration for {} must be an object",
                device_type
            )));
        }
        Ok(canonical.clone())
    }
}
