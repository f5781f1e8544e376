//! 漂移报告内存存储实现

use super::{IdSequence, apply_limit};
use crate::error::StorageError;
use crate::models::{ReportQuery, ReportRecord};
use crate::traits::ReportStore;
use std::sync::RwLock;

pub struct InMemoryReportStore {
    reports: RwLock<Vec<ReportRecord>>,
    ids: IdSequence,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self {
            reports: RwLock::new(Vec::new()),
            ids: IdSequence::new(),
        }
    }
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ReportStore for InMemoryReportStore {
    async fn create_report(&self, mut record: ReportRecord) -> Result<ReportRecord, StorageError> {
        let mut reports = self
            .reports
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        record.id = self.ids.next();
        reports.push(record.clone());
        Ok(record)
    }

    async fn find_report(&self, report_id: i64) -> Result<Option<ReportRecord>, StorageError> {
        let reports = self
            .reports
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(reports.iter().find(|item| item.id == report_id).cloned())
    }

    async fn list_reports(&self, query: &ReportQuery) -> Result<Vec<ReportRecord>, StorageError> {
        let reports = self
            .reports
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<ReportRecord> = reports
            .iter()
            .filter(|item| query.matches(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.generated_at_ms
                .cmp(&a.generated_at_ms)
                .then_with(|| b.id.cmp(&a.id))
        });
        apply_limit(&mut items, query.limit);
        Ok(items)
    }

    async fn delete_reports_before(&self, before_ms: i64) -> Result<u64, StorageError> {
        let mut reports = self
            .reports
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let before = reports.len();
        reports.retain(|item| item.generated_at_ms >= before_ms);
        Ok((before - reports.len()) as u64)
    }
}
