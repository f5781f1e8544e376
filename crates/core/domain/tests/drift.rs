use domain::{
    BulkDriftResult, Category, CompareResult, ConfigDifference, DeviceDriftResult, DiffType,
    DriftStatus, Severity,
};
use serde_json::json;

fn difference(path: &str) -> ConfigDifference {
    ConfigDifference::new(
        path,
        json!("a"),
        json!("b"),
        DiffType::Modified,
        Severity::Warning,
        Category::Device,
    )
}

#[test]
fn compare_result_matches_only_when_empty() {
    assert!(CompareResult::from_differences(Vec::new()).matched);
    assert!(!CompareResult::from_differences(vec![difference("name")]).matched);
}

#[test]
fn bulk_result_counts_statuses() {
    let results = vec![
        DeviceDriftResult::from_differences(1, "kitchen", Vec::new(), 10),
        DeviceDriftResult::from_differences(2, "garage", vec![difference("name")], 10),
        DeviceDriftResult::failed(3, "porch", "unreachable", 10),
    ];
    let bulk = BulkDriftResult::from_results(results, 10, 5);
    assert_eq!(bulk.total, 3);
    assert_eq!(bulk.in_sync, 1);
    assert_eq!(bulk.drifted, 1);
    assert_eq!(bulk.errors, 1);
    assert_eq!(bulk.results[2].status, DriftStatus::Error);
}

#[test]
fn difference_serializes_wire_names() {
    let value = serde_json::to_value(difference("mqtt.server")).expect("serialize");
    assert_eq!(value["type"], "modified");
    assert_eq!(value["severity"], "warning");
    assert_eq!(value["category"], "device");
    assert!(value.get("description").is_none());
}

#[test]
fn severity_rank_orders_critical_first() {
    assert!(Severity::Critical.rank() > Severity::Warning.rank());
    assert!(Severity::Warning.rank() > Severity::Info.rank());
    assert_eq!(Severity::parse("WARNING"), Some(Severity::Warning));
    assert_eq!(Category::parse("metadata"), Some(Category::Metadata));
}
