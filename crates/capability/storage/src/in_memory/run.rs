//! 执行记录内存存储实现

use super::{IdSequence, apply_limit};
use crate::error::StorageError;
use crate::models::RunRecord;
use crate::traits::RunStore;
use std::sync::RwLock;

pub struct InMemoryRunStore {
    runs: RwLock<Vec<RunRecord>>,
    ids: IdSequence,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(Vec::new()),
            ids: IdSequence::new(),
        }
    }
}

impl Default for InMemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RunStore for InMemoryRunStore {
    async fn create_run(&self, mut record: RunRecord) -> Result<RunRecord, StorageError> {
        let mut runs = self
            .runs
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        record.id = self.ids.next();
        runs.push(record.clone());
        Ok(record)
    }

    async fn update_run(&self, record: RunRecord) -> Result<Option<RunRecord>, StorageError> {
        let mut runs = self
            .runs
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for run in runs.iter_mut() {
            if run.id == record.id {
                run.status = record.status;
                run.completed_at_ms = record.completed_at_ms;
                run.duration_ms = record.duration_ms;
                run.result = record.result;
                run.error = record.error;
                return Ok(Some(run.clone()));
            }
        }
        Ok(None)
    }

    async fn list_runs(
        &self,
        schedule_id: i64,
        limit: i64,
    ) -> Result<Vec<RunRecord>, StorageError> {
        let runs = self
            .runs
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<RunRecord> = runs
            .iter()
            .filter(|item| item.schedule_id == schedule_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.started_at_ms
                .cmp(&a.started_at_ms)
                .then_with(|| b.id.cmp(&a.id))
        });
        apply_limit(&mut items, limit);
        Ok(items)
    }

    async fn find_run(&self, run_id: i64) -> Result<Option<RunRecord>, StorageError> {
        let runs = self
            .runs
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(runs.iter().find(|item| item.id == run_id).cloned())
    }
}
