//! 漂移检测计划内存存储实现

use super::IdSequence;
use crate::error::StorageError;
use crate::models::{ScheduleRecord, ScheduleUpdate};
use crate::traits::ScheduleStore;
use domain::now_epoch_ms;
use std::collections::HashMap;
use std::sync::RwLock;

pub struct InMemoryScheduleStore {
    schedules: RwLock<HashMap<i64, ScheduleRecord>>,
    ids: IdSequence,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self {
            schedules: RwLock::new(HashMap::new()),
            ids: IdSequence::new(),
        }
    }

    fn sorted(&self, enabled_only: bool) -> Result<Vec<ScheduleRecord>, StorageError> {
        let schedules = self
            .schedules
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<ScheduleRecord> = schedules
            .values()
            .filter(|item| !enabled_only || item.enabled)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.id);
        Ok(items)
    }
}

impl Default for InMemoryScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn create_schedule(
        &self,
        mut record: ScheduleRecord,
    ) -> Result<ScheduleRecord, StorageError> {
        let mut schedules = self
            .schedules
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let now = now_epoch_ms();
        record.id = self.ids.next();
        record.created_at_ms = now;
        record.updated_at_ms = now;
        schedules.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_schedule(
        &self,
        schedule_id: i64,
    ) -> Result<Option<ScheduleRecord>, StorageError> {
        let schedules = self
            .schedules
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(schedules.get(&schedule_id).cloned())
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduleRecord>, StorageError> {
        self.sorted(false)
    }

    async fn list_enabled_schedules(&self) -> Result<Vec<ScheduleRecord>, StorageError> {
        self.sorted(true)
    }

    async fn update_schedule(
        &self,
        schedule_id: i64,
        update: ScheduleUpdate,
    ) -> Result<Option<ScheduleRecord>, StorageError> {
        let mut schedules = self
            .schedules
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(record) = schedules.get_mut(&schedule_id) else {
            return Ok(None);
        };
        update.apply_to(record);
        record.updated_at_ms = now_epoch_ms();
        Ok(Some(record.clone()))
    }

    async fn delete_schedule(&self, schedule_id: i64) -> Result<bool, StorageError> {
        let mut schedules = self
            .schedules
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(schedules.remove(&schedule_id).is_some())
    }

    async fn record_schedule_run(
        &self,
        schedule_id: i64,
        last_run_ms: i64,
        next_run_ms: Option<i64>,
    ) -> Result<bool, StorageError> {
        let mut schedules = self
            .schedules
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(record) = schedules.get_mut(&schedule_id) else {
            return Ok(false);
        };
        record.last_run_ms = Some(last_run_ms);
        record.next_run_ms = next_run_ms;
        record.run_count += 1;
        Ok(true)
    }
}
