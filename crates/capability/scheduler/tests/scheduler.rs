use async_trait::async_trait;
use domain::{BulkDriftResult, DeviceDriftResult, now_epoch_ms};
use fleet_scheduler::{
    BulkDriftDetector, DriftScheduler, JobCallback, JobHandle, PeriodicTrigger, SchedulerConfig,
    SchedulerError,
};
use fleet_storage::{
    DeviceFilter, DeviceRecord, DeviceSelection, DeviceStore, InMemoryDeviceStore,
    InMemoryRunStore, InMemoryScheduleStore, RunStatus, ScheduleRecord, ScheduleStore,
    ScheduleUpdate,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const NEXT_FIRE_MS: i64 = 4_102_444_800_000;

/// 手动触发器：记录注册的任务，由测试显式触发。
#[derive(Default)]
struct ManualTrigger {
    jobs: Mutex<HashMap<Uuid, (String, JobCallback)>>,
    starts: Mutex<usize>,
    stops: Mutex<usize>,
}

impl ManualTrigger {
    fn specs(&self) -> Vec<String> {
        let jobs = self.jobs.lock().expect("lock");
        let mut specs: Vec<String> = jobs.values().map(|(spec, _)| spec.clone()).collect();
        specs.sort();
        specs
    }

    async fn fire_all(&self) {
        let callbacks: Vec<JobCallback> = self
            .jobs
            .lock()
            .expect("lock")
            .values()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback().await;
        }
    }
}

#[async_trait]
impl PeriodicTrigger for ManualTrigger {
    async fn start(&self) -> Result<(), SchedulerError> {
        *self.starts.lock().expect("lock") += 1;
        Ok(())
    }

    async fn schedule(
        &self,
        cron_spec: &str,
        callback: JobCallback,
    ) -> Result<JobHandle, SchedulerError> {
        let id = Uuid::new_v4();
        self.jobs
            .lock()
            .expect("lock")
            .insert(id, (cron_spec.to_string(), callback));
        Ok(JobHandle(id))
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), SchedulerError> {
        self.jobs.lock().expect("lock").remove(&handle.0);
        Ok(())
    }

    async fn next_fire_time(&self, handle: &JobHandle) -> Option<i64> {
        self.jobs
            .lock()
            .expect("lock")
            .contains_key(&handle.0)
            .then_some(NEXT_FIRE_MS)
    }

    async fn stop(&self, _drain_timeout: Duration) -> bool {
        self.jobs.lock().expect("lock").clear();
        *self.stops.lock().expect("lock") += 1;
        true
    }
}

/// 记录收到的设备集合；`fail` 为真时返回错误。
#[derive(Default)]
struct RecordingDetector {
    calls: Mutex<Vec<Vec<i64>>>,
    fail: bool,
}

#[async_trait]
impl BulkDriftDetector for RecordingDetector {
    async fn detect(&self, device_ids: &[i64]) -> Result<BulkDriftResult, SchedulerError> {
        self.calls.lock().expect("lock").push(device_ids.to_vec());
        if self.fail {
            return Err(SchedulerError::Detection("device fleet unreachable".to_string()));
        }
        let results = device_ids
            .iter()
            .map(|id| DeviceDriftResult::from_differences(*id, format!("dev-{}", id), Vec::new(), now_epoch_ms()))
            .collect();
        Ok(BulkDriftResult::from_results(results, now_epoch_ms(), 1))
    }
}

struct Harness {
    scheduler: DriftScheduler,
    schedules: Arc<InMemoryScheduleStore>,
    trigger: Arc<ManualTrigger>,
    detector: Arc<RecordingDetector>,
}

async fn harness(fail: bool) -> Harness {
    let schedules = Arc::new(InMemoryScheduleStore::new());
    let runs = Arc::new(InMemoryRunStore::new());
    let devices = Arc::new(InMemoryDeviceStore::new());
    for (name, device_type, generation) in [("a", "SHSW-1", 1), ("b", "SHPLG-S", 2), ("c", "SHSW-1", 2)] {
        devices
            .create_device(DeviceRecord {
                id: 0,
                name: name.to_string(),
                address: format!("{}.local", name),
                device_type: device_type.to_string(),
                generation,
                enabled: true,
            })
            .await
            .expect("device");
    }
    let trigger = Arc::new(ManualTrigger::default());
    let detector = Arc::new(RecordingDetector {
        fail,
        ..RecordingDetector::default()
    });
    let scheduler = DriftScheduler::new(
        schedules.clone(),
        runs,
        devices,
        detector.clone(),
        trigger.clone(),
    );
    Harness {
        scheduler,
        schedules,
        trigger,
        detector,
    }
}

#[tokio::test]
async fn invalid_cron_is_rejected_and_not_persisted() {
    let h = harness(false).await;
    let err = h
        .scheduler
        .add_schedule(ScheduleRecord::new("broken", "not-a-cron"))
        .await
        .expect_err("invalid");
    assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    assert!(h.schedules.list_schedules().await.expect("list").is_empty());
}

#[tokio::test]
async fn start_registers_enabled_schedules_only() {
    let h = harness(false).await;
    let enabled = h
        .scheduler
        .add_schedule(ScheduleRecord::new("hourly", "0 * * * *"))
        .await
        .expect("add");
    let mut disabled = ScheduleRecord::new("paused", "0 3 * * *");
    disabled.enabled = false;
    h.scheduler.add_schedule(disabled).await.expect("add");
    assert!(h.trigger.specs().is_empty());

    h.scheduler.start().await.expect("start");
    let status = h.scheduler.status().await;
    assert!(status.running);
    assert_eq!(status.registered, vec![enabled.id]);
    assert_eq!(h.trigger.specs(), vec!["0 * * * *".to_string()]);

    let err = h.scheduler.start().await.expect_err("already running");
    assert!(matches!(err, SchedulerError::AlreadyRunning));

    h.scheduler.stop().await.expect("stop");
    assert!(!h.scheduler.is_running().await);
    assert!(h.scheduler.status().await.registered.is_empty());
    assert_eq!(*h.trigger.stops.lock().expect("lock"), 1);

    h.scheduler.start().await.expect("restart");
    assert_eq!(*h.trigger.starts.lock().expect("lock"), 2);
}

#[tokio::test]
async fn triggered_run_is_recorded_with_statistics() {
    let h = harness(false).await;
    let schedule = h
        .scheduler
        .add_schedule(ScheduleRecord::new("every-minute", "* * * * *"))
        .await
        .expect("add");
    h.scheduler.start().await.expect("start");
    h.trigger.fire_all().await;

    let runs = h.scheduler.run_history(schedule.id, 0).await.expect("history");
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.completed_at_ms.is_some());
    let result: BulkDriftResult =
        serde_json::from_value(run.result.clone().expect("result")).expect("decode");
    assert_eq!(result.total, 3);

    let stored = h.scheduler.get_schedule(schedule.id).await.expect("schedule");
    assert_eq!(stored.run_count, 1);
    assert!(stored.last_run_ms.is_some());
    assert_eq!(stored.next_run_ms, Some(NEXT_FIRE_MS));
}

#[tokio::test]
async fn detection_failure_marks_run_failed() {
    let h = harness(true).await;
    let schedule = h
        .scheduler
        .add_schedule(ScheduleRecord::new("nightly", "0 2 * * *"))
        .await
        .expect("add");

    let run = h.scheduler.run_now(schedule.id).await.expect("run");
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.as_deref().unwrap_or_default().contains("unreachable"));

    let history = h.scheduler.run_history(schedule.id, 10).await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, RunStatus::Failed);
    assert_eq!(
        h.scheduler.get_schedule(schedule.id).await.expect("schedule").run_count,
        1
    );
}

#[tokio::test]
async fn device_selection_is_resolved_per_schedule() {
    let h = harness(false).await;
    let mut explicit = ScheduleRecord::new("explicit", "0 * * * *");
    explicit.selection = DeviceSelection::Devices {
        device_ids: vec![3, 1],
    };
    let explicit = h.scheduler.add_schedule(explicit).await.expect("add");

    let mut filtered = ScheduleRecord::new("filtered", "0 * * * *");
    filtered.selection = DeviceSelection::Filter(DeviceFilter {
        device_types: vec!["SHSW-1".to_string()],
        generations: vec![2],
        enabled_only: true,
    });
    let filtered = h.scheduler.add_schedule(filtered).await.expect("add");

    let all = h
        .scheduler
        .add_schedule(ScheduleRecord::new("all", "0 * * * *"))
        .await
        .expect("add");

    for id in [explicit.id, filtered.id, all.id] {
        h.scheduler.run_now(id).await.expect("run");
    }
    let calls = h.detector.calls.lock().expect("lock").clone();
    assert_eq!(calls, vec![vec![3, 1], vec![3], vec![1, 2, 3]]);
}

#[tokio::test]
async fn disabled_schedule_is_skipped_when_triggered() {
    let h = harness(false).await;
    let schedule = h
        .scheduler
        .add_schedule(ScheduleRecord::new("hourly", "0 * * * *"))
        .await
        .expect("add");
    h.scheduler.start().await.expect("start");

    // 绕过调度器直接禁用，模拟注册后过期的任务快照
    h.schedules
        .update_schedule(
            schedule.id,
            ScheduleUpdate {
                enabled: Some(false),
                ..ScheduleUpdate::default()
            },
        )
        .await
        .expect("update");
    h.trigger.fire_all().await;

    assert!(h.detector.calls.lock().expect("lock").is_empty());
    assert!(h
        .scheduler
        .run_history(schedule.id, 0)
        .await
        .expect("history")
        .is_empty());
}

#[tokio::test]
async fn update_and_delete_reregister_jobs() {
    let h = harness(false).await;
    let schedule = h
        .scheduler
        .add_schedule(ScheduleRecord::new("hourly", "0 * * * *"))
        .await
        .expect("add");
    h.scheduler.start().await.expect("start");

    let err = h
        .scheduler
        .update_schedule(
            schedule.id,
            ScheduleUpdate {
                cron_spec: Some("every tuesday".to_string()),
                ..ScheduleUpdate::default()
            },
        )
        .await
        .expect_err("invalid");
    assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    assert_eq!(h.trigger.specs(), vec!["0 * * * *".to_string()]);

    let updated = h
        .scheduler
        .update_schedule(
            schedule.id,
            ScheduleUpdate {
                cron_spec: Some("*/15 * * * *".to_string()),
                ..ScheduleUpdate::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.cron_spec, "*/15 * * * *");
    assert_eq!(h.trigger.specs(), vec!["*/15 * * * *".to_string()]);

    h.scheduler
        .update_schedule(
            schedule.id,
            ScheduleUpdate {
                enabled: Some(false),
                ..ScheduleUpdate::default()
            },
        )
        .await
        .expect("disable");
    assert!(h.trigger.specs().is_empty());
    assert!(h.scheduler.status().await.registered.is_empty());

    h.scheduler.delete_schedule(schedule.id).await.expect("delete");
    let err = h
        .scheduler
        .delete_schedule(schedule.id)
        .await
        .expect_err("missing");
    assert!(matches!(err, SchedulerError::NotFound(_)));
    let err = h.scheduler.run_now(schedule.id).await.expect_err("missing");
    assert!(matches!(err, SchedulerError::NotFound(_)));
}

#[tokio::test]
async fn start_if_enabled_follows_configuration() {
    let build = |enabled: bool, trigger: Arc<ManualTrigger>| {
        DriftScheduler::with_config(
            Arc::new(InMemoryScheduleStore::new()),
            Arc::new(InMemoryRunStore::new()),
            Arc::new(InMemoryDeviceStore::new()),
            Arc::new(RecordingDetector::default()),
            trigger,
            SchedulerConfig {
                enabled,
                ..SchedulerConfig::default()
            },
        )
    };

    let trigger = Arc::new(ManualTrigger::default());
    let disabled = build(false, trigger.clone());
    assert!(!disabled.start_if_enabled().await.expect("disabled"));
    assert!(!disabled.is_running().await);
    assert_eq!(*trigger.starts.lock().expect("lock"), 0);

    let trigger = Arc::new(ManualTrigger::default());
    let enabled = build(true, trigger.clone());
    assert!(enabled.start_if_enabled().await.expect("enabled"));
    assert!(enabled.is_running().await);
    assert_eq!(*trigger.starts.lock().expect("lock"), 1);
}
