//! PostgreSQL 存储实现模块
//!
//! 表结构见 `migrations/0001_drift.sql`。时间列为 `timestamptz`，
//! 读写时与 Unix 毫秒互转：写入 `to_timestamp($n / 1000.0)`，
//! 读取 `(extract(epoch from col) * 1000)::bigint`。
//! JSON 列以文本绑定（`$n::jsonb`）并以 `col::text` 读出。

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

fn ms_param(value: i64) -> f64 {
    value as f64
}
