//! 内存存储实现模块
//!
//! 用于测试和未配置数据库时的本地运行。ID 由存储自增分配（从 1 开始）。
//!
//! - DeviceStore: InMemoryDeviceStore
//! - ScheduleStore: InMemoryScheduleStore
//! - RunStore: InMemoryRunStore
//! - ReportStore: InMemoryReportStore
//! - TrendStore: InMemoryTrendStore

pub mod device;
pub mod report;
pub mod run;
pub mod schedule;
pub mod trend;

pub use device::*;
pub use report::*;
pub use run::*;
pub use schedule::*;
pub use trend::*;

use std::sync::atomic::{AtomicI64, Ordering};

/// 自增 ID 分配器。
#[derive(Debug)]
pub(crate) struct IdSequence(AtomicI64);

impl IdSequence {
    pub(crate) fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    pub(crate) fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

fn apply_limit<T>(items: &mut Vec<T>, limit: i64) {
    let limit = limit.max(0) as usize;
    if limit > 0 && items.len() > limit {
        items.truncate(limit);
    }
}
