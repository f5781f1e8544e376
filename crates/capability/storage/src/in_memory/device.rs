//! 设备内存存储实现

use super::IdSequence;
use crate::error::StorageError;
use crate::models::{DeviceFilter, DeviceRecord};
use crate::traits::DeviceStore;
use std::collections::HashMap;
use std::sync::RwLock;

/// 设备内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储。
pub struct InMemoryDeviceStore {
    devices: RwLock<HashMap<i64, DeviceRecord>>,
    ids: IdSequence,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            ids: IdSequence::new(),
        }
    }
}

impl Default for InMemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn create_device(&self, mut record: DeviceRecord) -> Result<DeviceRecord, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        record.id = self.ids.next();
        devices.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_device(&self, device_id: i64) -> Result<Option<DeviceRecord>, StorageError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(devices.get(&device_id).cloned())
    }

    async fn list_devices(
        &self,
        filter: Option<&DeviceFilter>,
    ) -> Result<Vec<DeviceRecord>, StorageError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<DeviceRecord> = devices
            .values()
            .filter(|device| filter.is_none_or(|filter| filter.matches(device)))
            .cloned()
            .collect();
        items.sort_by_key(|device| device.id);
        Ok(items)
    }
}
