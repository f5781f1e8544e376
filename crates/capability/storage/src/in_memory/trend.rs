//! 漂移趋势内存存储实现
//!
//! upsert 在同一把写锁内完成查找与更新，保证未解决的 (device_id, path) 唯一。

use super::{IdSequence, apply_limit};
use crate::error::StorageError;
use crate::models::{TrendObservation, TrendQuery, TrendRecord};
use crate::traits::TrendStore;
use std::sync::RwLock;

pub struct InMemoryTrendStore {
    trends: RwLock<Vec<TrendRecord>>,
    ids: IdSequence,
}

impl InMemoryTrendStore {
    pub fn new() -> Self {
        Self {
            trends: RwLock::new(Vec::new()),
            ids: IdSequence::new(),
        }
    }
}

impl Default for InMemoryTrendStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TrendStore for InMemoryTrendStore {
    async fn record_observation(
        &self,
        observation: TrendObservation,
    ) -> Result<TrendRecord, StorageError> {
        let mut trends = self
            .trends
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if let Some(trend) = trends.iter_mut().find(|item| {
            !item.resolved && item.device_id == observation.device_id && item.path == observation.path
        }) {
            trend.last_seen_ms = observation.observed_at_ms;
            trend.occurrences += 1;
            trend.severity = observation.severity;
            trend.category = observation.category;
            return Ok(trend.clone());
        }
        let trend = TrendRecord {
            id: self.ids.next(),
            device_id: observation.device_id,
            path: observation.path,
            first_seen_ms: observation.observed_at_ms,
            last_seen_ms: observation.observed_at_ms,
            occurrences: 1,
            severity: observation.severity,
            category: observation.category,
            resolved: false,
            resolved_at_ms: None,
        };
        trends.push(trend.clone());
        Ok(trend)
    }

    async fn list_trends(&self, query: &TrendQuery) -> Result<Vec<TrendRecord>, StorageError> {
        let trends = self
            .trends
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<TrendRecord> = trends
            .iter()
            .filter(|item| query.matches(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.last_seen_ms
                .cmp(&a.last_seen_ms)
                .then_with(|| b.id.cmp(&a.id))
        });
        apply_limit(&mut items, query.limit);
        Ok(items)
    }

    async fn resolve_trend(&self, trend_id: i64, resolved_at_ms: i64) -> Result<bool, StorageError> {
        let mut trends = self
            .trends
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        match trends
            .iter_mut()
            .find(|item| item.id == trend_id && !item.resolved)
        {
            Some(trend) => {
                trend.resolved = true;
                trend.resolved_at_ms = Some(resolved_at_ms);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
