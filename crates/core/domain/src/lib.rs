pub mod difference;
pub mod drift;

pub use difference::{Category, CompareResult, ConfigDifference, DiffType, Severity};
pub use drift::{BulkDriftResult, DeviceDriftResult, DriftStatus};

/// 配置文档：设备上报/规范存储的自由结构 JSON（map/list/scalar 树）。
pub type ConfigDocument = serde_json::Value;

/// 当前 Unix 毫秒时间戳。
pub fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
