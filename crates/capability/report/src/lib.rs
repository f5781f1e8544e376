//! # Fleet Report 模块
//!
//! 将一批设备漂移结果整理为可持久化的综合报告：
//!
//! - [`analysis`]：差异重新归类、描述补充、健康分 / 风险等级 / 漂移程度
//! - [`summary`]：按状态、严重程度、类别汇总，统计常见漂移模式
//! - [`recommendations`]：基于汇总生成处置建议
//!
//! 每次生成报告时对每条差异 upsert 一条漂移趋势；趋势写入失败只记录日志。
//! 报告以一条记录（汇总、设备分析、建议三个 JSON 块）写入存储，读取时
//! 单个块解码失败会记录告警并回退为空值。

pub mod analysis;
pub mod model;
pub mod recommendations;
pub mod summary;

pub use model::*;

use domain::{DeviceDriftResult, now_epoch_ms};
use fleet_config::AppConfig;
use fleet_storage::{
    DeviceStore, ReportQuery, ReportRecord, ReportStore, TrendObservation, TrendQuery,
    TrendRecord, TrendStore,
};
use fleet_telemetry::{record_report_generated, record_trend_write_failure};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{info, warn};

/// 报告模块错误。
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report {0} not found")]
    NotFound(i64),
    #[error("trend {0} not found or already resolved")]
    TrendNotFound(i64),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ReportError {
    fn from(err: serde_json::Error) -> Self {
        ReportError::Serialization(err.to_string())
    }
}

/// 报告模块配置。
#[derive(Debug, Clone, Copy)]
pub struct ReporterConfig {
    /// 报告保留时长（毫秒）。
    pub retention_ms: i64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            retention_ms: 90 * 24 * 60 * 60 * 1000,
        }
    }
}

impl From<&AppConfig> for ReporterConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            retention_ms: config.report_retention_ms(),
        }
    }
}

/// 漂移报告生成与查询。
#[derive(Clone)]
pub struct DriftReporter {
    devices: Arc<dyn DeviceStore>,
    reports: Arc<dyn ReportStore>,
    trends: Arc<dyn TrendStore>,
    config: ReporterConfig,
}

impl DriftReporter {
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        reports: Arc<dyn ReportStore>,
        trends: Arc<dyn TrendStore>,
    ) -> Self {
        Self::with_config(devices, reports, trends, ReporterConfig::default())
    }

    pub fn with_config(
        devices: Arc<dyn DeviceStore>,
        reports: Arc<dyn ReportStore>,
        trends: Arc<dyn TrendStore>,
        config: ReporterConfig,
    ) -> Self {
        Self {
            devices,
            reports,
            trends,
            config,
        }
    }

    /// 生成并持久化综合报告。
    pub async fn generate_comprehensive_report(
        &self,
        report_type: ReportType,
        device_id: Option<i64>,
        schedule_id: Option<i64>,
        results: &[DeviceDriftResult],
    ) -> Result<DriftReport, ReportError> {
        let generated_at_ms = now_epoch_ms();

        let mut devices = Vec::with_capacity(results.len());
        for result in results {
            let record = match self.devices.find_device(result.device_id).await {
                Ok(record) => record,
                Err(err) => {
                    warn!(
                        target: "fleet.report",
                        device_id = result.device_id,
                        error = %err,
                        "report_device_lookup_failed"
                    );
                    None
                }
            };
            devices.push(analysis::analyze_device(result, record.as_ref()));
        }

        let summary = summary::build_summary(&devices);
        let recommendations = recommendations::generate(&devices, &summary);

        self.record_trends(&devices, generated_at_ms).await;

        let record = ReportRecord {
            id: 0,
            report_type: report_type.as_str().to_string(),
            device_id,
            schedule_id,
            generated_at_ms,
            summary: serde_json::to_string(&summary)?,
            devices: serde_json::to_string(&devices)?,
            recommendations: serde_json::to_string(&recommendations)?,
        };
        let stored = self
            .reports
            .create_report(record)
            .await
            .map_err(|err| ReportError::Storage(err.to_string()))?;

        record_report_generated();
        info!(
            target: "fleet.report",
            report_id = stored.id,
            report_type = report_type.as_str(),
            devices = summary.total_devices,
            drifted = summary.devices_drifted,
            differences = summary.total_differences,
            recommendations = recommendations.len(),
            "drift_report_generated"
        );

        Ok(DriftReport {
            id: stored.id,
            report_type,
            device_id,
            schedule_id,
            generated_at_ms,
            summary,
            devices,
            recommendations,
        })
    }

    async fn record_trends(&self, devices: &[DeviceDriftAnalysis], observed_at_ms: i64) {
        for device in devices {
            for difference in &device.differences {
                let observation = TrendObservation {
                    device_id: device.device_id,
                    path: difference.path.clone(),
                    severity: difference.severity,
                    category: difference.category,
                    observed_at_ms,
                };
                if let Err(err) = self.trends.record_observation(observation).await {
                    record_trend_write_failure();
                    warn!(
                        target: "fleet.report",
                        device_id = device.device_id,
                        path = %difference.path,
                        error = %err,
                        "drift_trend_write_failed"
                    );
                }
            }
        }
    }

    pub async fn get_report(&self, report_id: i64) -> Result<DriftReport, ReportError> {
        let record = self
            .reports
            .find_report(report_id)
            .await
            .map_err(|err| ReportError::Storage(err.to_string()))?
            .ok_or(ReportError::NotFound(report_id))?;
        Ok(decode_report(record))
    }

    /// 按生成时间倒序列出报告。
    pub async fn list_reports(&self, query: &ReportQuery) -> Result<Vec<DriftReport>, ReportError> {
        let records = self
            .reports
            .list_reports(query)
            .await
            .map_err(|err| ReportError::Storage(err.to_string()))?;
        Ok(records.into_iter().map(decode_report).collect())
    }

    pub async fn list_trends(&self, query: &TrendQuery) -> Result<Vec<TrendRecord>, ReportError> {
        self.trends
            .list_trends(query)
            .await
            .map_err(|err| ReportError::Storage(err.to_string()))
    }

    /// 人工确认趋势已解决；之后再次出现同一漂移会新建趋势。
    pub async fn resolve_trend(&self, trend_id: i64) -> Result<(), ReportError> {
        let resolved = self
            .trends
            .resolve_trend(trend_id, now_epoch_ms())
            .await
            .map_err(|err| ReportError::Storage(err.to_string()))?;
        if !resolved {
            return Err(ReportError::TrendNotFound(trend_id));
        }
        info!(target: "fleet.report", trend_id, "drift_trend_resolved");
        Ok(())
    }

    /// 删除生成时间早于 `older_than_ms` 之前的报告，返回删除数量。
    pub async fn cleanup_reports(&self, older_than_ms: i64) -> Result<u64, ReportError> {
        let cutoff_ms = now_epoch_ms() - older_than_ms.max(0);
        let deleted = self
            .reports
            .delete_reports_before(cutoff_ms)
            .await
            .map_err(|err| ReportError::Storage(err.to_string()))?;
        info!(target: "fleet.report", cutoff_ms, deleted, "drift_reports_cleaned");
        Ok(deleted)
    }

    /// 按配置的保留时长清理报告。
    pub async fn cleanup_expired_reports(&self) -> Result<u64, ReportError> {
        self.cleanup_reports(self.config.retention_ms).await
    }
}

fn decode_blob<T: DeserializeOwned + Default>(report_id: i64, blob: &str, part: &str) -> T {
    match serde_json::from_str(blob) {
        Ok(value) => value,
        Err(err) => {
            warn!(
                target: "fleet.report",
                report_id,
                part,
                error = %err,
                "drift_report_decode_failed"
            );
            T::default()
        }
    }
}

fn decode_report(record: ReportRecord) -> DriftReport {
    let report_type = ReportType::parse(&record.report_type).unwrap_or_else(|| {
        warn!(
            target: "fleet.report",
            report_id = record.id,
            report_type = %record.report_type,
            "drift_report_unknown_type"
        );
        ReportType::Manual
    });
    DriftReport {
        id: record.id,
        report_type,
        device_id: record.device_id,
        schedule_id: record.schedule_id,
        generated_at_ms: record.generated_at_ms,
        summary: decode_blob(record.id, &record.summary, "summary"),
        devices: decode_blob(record.id, &record.devices, "devices"),
        recommendations: decode_blob(record.id, &record.recommendations, "recommendations"),
    }
}
