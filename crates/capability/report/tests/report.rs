use async_trait::async_trait;
use domain::{Category, ConfigDifference, DeviceDriftResult, DiffType, Severity};
use fleet_report::{DriftReporter, Priority, ReportError, ReportType, RiskLevel};
use fleet_storage::{
    DeviceRecord, DeviceStore, InMemoryDeviceStore, InMemoryReportStore, InMemoryTrendStore,
    ReportQuery, ReportRecord, ReportStore, StorageError, TrendObservation, TrendQuery,
    TrendRecord, TrendStore,
};
use serde_json::json;
use std::sync::Arc;

struct FailingTrendStore;

#[async_trait]
impl TrendStore for FailingTrendStore {
    async fn record_observation(
        &self,
        _observation: TrendObservation,
    ) -> Result<TrendRecord, StorageError> {
        Err(StorageError::new("trend table unavailable"))
    }

    async fn list_trends(&self, _query: &TrendQuery) -> Result<Vec<TrendRecord>, StorageError> {
        Ok(Vec::new())
    }

    async fn resolve_trend(
        &self,
        _trend_id: i64,
        _resolved_at_ms: i64,
    ) -> Result<bool, StorageError> {
        Ok(false)
    }
}

struct Harness {
    devices: Arc<InMemoryDeviceStore>,
    reports: Arc<InMemoryReportStore>,
    trends: Arc<InMemoryTrendStore>,
    reporter: DriftReporter,
}

fn harness() -> Harness {
    let devices = Arc::new(InMemoryDeviceStore::new());
    let reports = Arc::new(InMemoryReportStore::new());
    let trends = Arc::new(InMemoryTrendStore::new());
    let reporter = DriftReporter::new(devices.clone(), reports.clone(), trends.clone());
    Harness {
        devices,
        reports,
        trends,
        reporter,
    }
}

async fn add_device(store: &InMemoryDeviceStore, name: &str, device_type: &str) -> DeviceRecord {
    store
        .create_device(DeviceRecord {
            id: 0,
            name: name.to_string(),
            address: format!("{}.local", name),
            device_type: device_type.to_string(),
            generation: 1,
            enabled: true,
        })
        .await
        .expect("create device")
}

fn difference(path: &str, expected: serde_json::Value, actual: serde_json::Value) -> ConfigDifference {
    ConfigDifference::new(
        path,
        expected,
        actual,
        DiffType::Modified,
        Severity::Critical,
        Category::Device,
    )
}

/// A：一条认证差异；B：四条继电器差异；C：一致。
async fn three_device_results(devices: &InMemoryDeviceStore) -> Vec<DeviceDriftResult> {
    let a = add_device(devices, "hall", "SHSW-1").await;
    let b = add_device(devices, "kitchen", "SHSW-25").await;
    let c = add_device(devices, "garage", "SHPLG-S").await;
    vec![
        DeviceDriftResult::from_differences(
            a.id,
            a.name.clone(),
            vec![difference("auth.enable", json!(true), json!(false))],
            1_000,
        ),
        DeviceDriftResult::from_differences(
            b.id,
            b.name.clone(),
            vec![
                difference("relays.0.name", json!("lamp"), json!("light")),
                difference("relays.1.name", json!("fan"), json!("")),
                difference("relays.0.default_state", json!("off"), json!("on")),
                difference("relays.1.auto_off", json!(0), json!(60)),
            ],
            1_000,
        ),
        DeviceDriftResult::from_differences(c.id, c.name.clone(), Vec::new(), 1_000),
    ]
}

#[tokio::test]
async fn report_scores_devices_and_recommends_action() {
    let h = harness();
    let results = three_device_results(&h.devices).await;
    let (a, b, c) = (results[0].device_id, results[1].device_id, results[2].device_id);

    let report = h
        .reporter
        .generate_comprehensive_report(ReportType::Fleet, None, None, &results)
        .await
        .expect("generate");

    assert!(report.id > 0);
    assert_eq!(report.device_count(), 3);
    assert_eq!(report.total_differences(), 5);
    assert_eq!(report.summary.devices_drifted, 2);
    assert_eq!(report.summary.devices_in_sync, 1);
    assert_eq!(report.summary.devices_errored, 0);
    assert_eq!(report.summary.severities.critical, 1);
    assert_eq!(report.summary.severities.warning, 4);
    assert_eq!(report.summary.security_changes, 1);

    let device_a = report.device(a).expect("device a");
    assert_eq!(device_a.risk_level, RiskLevel::Critical);
    assert_eq!(device_a.health_score, 80);
    assert_eq!(device_a.device_type.as_deref(), Some("SHSW-1"));
    assert_eq!(device_a.differences[0].category, Category::Security);
    assert!(!device_a.differences[0].suggestion.is_empty());

    let device_b = report.device(b).expect("device b");
    assert!(device_b.risk_level >= RiskLevel::Medium);
    assert_eq!(device_b.health_score, 60);

    let device_c = report.device(c).expect("device c");
    assert_eq!(device_c.health_score, 100);
    assert_eq!(device_c.risk_level, RiskLevel::Low);

    let names_a = report
        .recommendations
        .iter()
        .filter(|recommendation| recommendation.affected_device_ids.contains(&a))
        .collect::<Vec<_>>();
    assert!(!names_a.is_empty());
    assert!(
        names_a
            .iter()
            .all(|recommendation| recommendation.priority == Priority::High)
    );
    assert!(
        !report
            .recommendations
            .iter()
            .any(|recommendation| recommendation.category == "synchronization")
    );

    let stored = h.reporter.get_report(report.id).await.expect("get");
    assert_eq!(stored, report);
}

#[tokio::test]
async fn repeated_drift_increments_trend_occurrences() {
    let h = harness();
    let results = three_device_results(&h.devices).await;
    let a = results[0].device_id;

    for _ in 0..2 {
        h.reporter
            .generate_comprehensive_report(ReportType::Scheduled, None, Some(9), &results)
            .await
            .expect("generate");
    }

    let trends = h
        .reporter
        .list_trends(&TrendQuery {
            device_id: Some(a),
            ..TrendQuery::default()
        })
        .await
        .expect("trends");
    assert_eq!(trends.len(), 1);
    assert_eq!(trends[0].path, "auth.enable");
    assert_eq!(trends[0].occurrences, 2);
    assert_eq!(trends[0].severity, Severity::Critical);

    let all = h
        .trends
        .list_trends(&TrendQuery::default())
        .await
        .expect("all trends");
    assert_eq!(all.len(), 5);

    h.reporter.resolve_trend(trends[0].id).await.expect("resolve");
    let err = h
        .reporter
        .resolve_trend(trends[0].id)
        .await
        .expect_err("already resolved");
    assert!(matches!(err, ReportError::TrendNotFound(_)));

    let reports = h
        .reporter
        .list_reports(&ReportQuery {
            schedule_id: Some(9),
            ..ReportQuery::default()
        })
        .await
        .expect("list");
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|report| report.report_type == ReportType::Scheduled));
}

#[tokio::test]
async fn trend_failures_do_not_fail_generation() {
    let devices = Arc::new(InMemoryDeviceStore::new());
    let reports = Arc::new(InMemoryReportStore::new());
    let reporter = DriftReporter::new(devices.clone(), reports.clone(), Arc::new(FailingTrendStore));
    let results = three_device_results(&devices).await;

    let report = reporter
        .generate_comprehensive_report(ReportType::Manual, None, None, &results)
        .await
        .expect("generate");
    assert_eq!(report.summary.devices_drifted, 2);
    assert!(reports.find_report(report.id).await.expect("find").is_some());
}

#[tokio::test]
async fn error_results_and_unknown_devices_are_reported() {
    let h = harness();
    let results = vec![
        DeviceDriftResult::failed(42, "", "connection refused", 1_000),
        DeviceDriftResult::from_differences(
            43,
            "orphan",
            vec![difference("wifi_sta.ssid", json!("home"), json!("guest"))],
            1_000,
        ),
    ];

    let report = h
        .reporter
        .generate_comprehensive_report(ReportType::Device, Some(43), None, &results)
        .await
        .expect("generate");
    assert_eq!(report.summary.devices_errored, 1);
    assert_eq!(report.summary.network_changes, 1);

    let errored = report.device(42).expect("errored");
    assert_eq!(errored.error.as_deref(), Some("connection refused"));
    assert!(errored.device_type.is_none());

    let orphan = report.device(43).expect("orphan");
    assert_eq!(orphan.differences[0].severity, Severity::Warning);
    assert_eq!(orphan.risk_level, RiskLevel::Medium);
    assert!(
        report
            .recommendations
            .iter()
            .any(|recommendation| recommendation.actions.iter().any(|action| action.automatable))
    );
}

#[tokio::test]
async fn missing_report_and_cleanup() {
    let h = harness();
    let err = h.reporter.get_report(99).await.expect_err("missing");
    assert!(matches!(err, ReportError::NotFound(99)));

    h.reports
        .create_report(ReportRecord {
            id: 0,
            report_type: "manual".to_string(),
            device_id: None,
            schedule_id: None,
            generated_at_ms: 1_000,
            summary: "{}".to_string(),
            devices: "[]".to_string(),
            recommendations: "[]".to_string(),
        })
        .await
        .expect("old report");
    h.reporter
        .generate_comprehensive_report(ReportType::Manual, None, None, &[])
        .await
        .expect("fresh report");

    let deleted = h
        .reporter
        .cleanup_reports(24 * 60 * 60 * 1000)
        .await
        .expect("cleanup");
    assert_eq!(deleted, 1);

    let remaining = h
        .reporter
        .list_reports(&ReportQuery::default())
        .await
        .expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].summary.total_devices, 0);
}
