//! 日志初始化与进程级计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub drift_runs_started: u64,
    pub drift_runs_completed: u64,
    pub drift_runs_failed: u64,
    pub run_latency_ms_total: u64,
    pub run_latency_ms_count: u64,
    pub devices_checked: u64,
    pub devices_drifted: u64,
    pub device_check_errors: u64,
    pub settings_applied: u64,
    pub settings_failed: u64,
    pub reboots_waited: u64,
    pub reboot_timeouts: u64,
    pub reports_generated: u64,
    pub trend_write_failures: u64,
    pub audit_write_failures: u64,
}

/// 进程级计数指标。
pub struct TelemetryMetrics {
    drift_runs_started: AtomicU64,
    drift_runs_completed: AtomicU64,
    drift_runs_failed: AtomicU64,
    run_latency_ms_total: AtomicU64,
    run_latency_ms_count: AtomicU64,
    devices_checked: AtomicU64,
    devices_drifted: AtomicU64,
    device_check_errors: AtomicU64,
    settings_applied: AtomicU64,
    settings_failed: AtomicU64,
    reboots_waited: AtomicU64,
    reboot_timeouts: AtomicU64,
    reports_generated: AtomicU64,
    trend_write_failures: AtomicU64,
    audit_write_failures: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            drift_runs_started: AtomicU64::new(0),
            drift_runs_completed: AtomicU64::new(0),
            drift_runs_failed: AtomicU64::new(0),
            run_latency_ms_total: AtomicU64::new(0),
            run_latency_ms_count: AtomicU64::new(0),
            devices_checked: AtomicU64::new(0),
            devices_drifted: AtomicU64::new(0),
            device_check_errors: AtomicU64::new(0),
            settings_applied: AtomicU64::new(0),
            settings_failed: AtomicU64::new(0),
            reboots_waited: AtomicU64::new(0),
            reboot_timeouts: AtomicU64::new(0),
            reports_generated: AtomicU64::new(0),
            trend_write_failures: AtomicU64::new(0),
            audit_write_failures: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            drift_runs_started: self.drift_runs_started.load(Ordering::Relaxed),
            drift_runs_completed: self.drift_runs_completed.load(Ordering::Relaxed),
            drift_runs_failed: self.drift_runs_failed.load(Ordering::Relaxed),
            run_latency_ms_total: self.run_latency_ms_total.load(Ordering::Relaxed),
            run_latency_ms_count: self.run_latency_ms_count.load(Ordering::Relaxed),
            devices_checked: self.devices_checked.load(Ordering::Relaxed),
            devices_drifted: self.devices_drifted.load(Ordering::Relaxed),
            device_check_errors: self.device_check_errors.load(Ordering::Relaxed),
            settings_applied: self.settings_applied.load(Ordering::Relaxed),
            settings_failed: self.settings_failed.load(Ordering::Relaxed),
            reboots_waited: self.reboots_waited.load(Ordering::Relaxed),
            reboot_timeouts: self.reboot_timeouts.load(Ordering::Relaxed),
            reports_generated: self.reports_generated.load(Ordering::Relaxed),
            trend_write_failures: self.trend_write_failures.load(Ordering::Relaxed),
            audit_write_failures: self.audit_write_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info，`RUST_LOG` 覆盖）。可重复调用。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录漂移检测执行开始。
pub fn record_drift_run_started() {
    metrics().drift_runs_started.fetch_add(1, Ordering::Relaxed);
}

/// 记录漂移检测执行完成及耗时（毫秒）。
pub fn record_drift_run_completed(latency_ms: u64) {
    let metrics = metrics();
    metrics.drift_runs_completed.fetch_add(1, Ordering::Relaxed);
    metrics
        .run_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics.run_latency_ms_count.fetch_add(1, Ordering::Relaxed);
}

/// 记录漂移检测执行失败。
pub fn record_drift_run_failed() {
    metrics().drift_runs_failed.fetch_add(1, Ordering::Relaxed);
}

/// 记录单台设备检测结果。
pub fn record_device_checked(drifted: bool, errored: bool) {
    let metrics = metrics();
    metrics.devices_checked.fetch_add(1, Ordering::Relaxed);
    if drifted {
        metrics.devices_drifted.fetch_add(1, Ordering::Relaxed);
    }
    if errored {
        metrics.device_check_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// 记录配置下发的成功/失败设置项数量。
pub fn record_settings_applied(applied: u64, failed: u64) {
    let metrics = metrics();
    metrics.settings_applied.fetch_add(applied, Ordering::Relaxed);
    metrics.settings_failed.fetch_add(failed, Ordering::Relaxed);
}

/// 记录一次重启等待及是否超时。
pub fn record_reboot_wait(timed_out: bool) {
    let metrics = metrics();
    metrics.reboots_waited.fetch_add(1, Ordering::Relaxed);
    if timed_out {
        metrics.reboot_timeouts.fetch_add(1, Ordering::Relaxed);
    }
}

/// 记录报告生成次数。
pub fn record_report_generated() {
    metrics().reports_generated.fetch_add(1, Ordering::Relaxed);
}

/// 记录趋势写入失败次数。
pub fn record_trend_write_failure() {
    metrics()
        .trend_write_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录执行记录/统计写入失败次数。
pub fn record_audit_write_failure() {
    metrics()
        .audit_write_failures
        .fetch_add(1, Ordering::Relaxed);
}
