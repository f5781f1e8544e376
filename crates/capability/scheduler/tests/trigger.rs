use async_trait::async_trait;
use domain::BulkDriftResult;
use fleet_scheduler::{
    BulkDriftDetector, CronTrigger, DriftScheduler, PeriodicTrigger, SchedulerConfig,
    SchedulerError,
};
use fleet_storage::{InMemoryDeviceStore, InMemoryRunStore, InMemoryScheduleStore, ScheduleRecord};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const EVERY_SECOND: &str = "* * * * * *";

/// 每次检测都会卡住很久的检测器。
#[derive(Default)]
struct StuckDetector {
    calls: AtomicUsize,
}

#[async_trait]
impl BulkDriftDetector for StuckDetector {
    async fn detect(&self, _device_ids: &[i64]) -> Result<BulkDriftResult, SchedulerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(20)).await;
        Ok(BulkDriftResult::default())
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cron_trigger_stop_gives_up_after_drain_timeout() {
    let trigger = CronTrigger::new();
    trigger.start().await.expect("start");
    trigger
        .schedule(
            EVERY_SECOND,
            Arc::new(|| -> Pin<Box<dyn Future<Output = ()> + Send>> {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(20)).await;
                })
            }),
        )
        .await
        .expect("schedule");

    wait_until(|| trigger.in_flight() > 0).await;

    let started = Instant::now();
    let drained = trigger.stop(Duration::from_secs(1)).await;
    let waited = started.elapsed();
    assert!(!drained);
    assert!(waited >= Duration::from_secs(1));
    assert!(waited < Duration::from_secs(3));

    trigger.start().await.expect("restart");
    let handle = trigger
        .schedule(
            "0 0 1 1 *",
            Arc::new(|| -> Pin<Box<dyn Future<Output = ()> + Send>> { Box::pin(async {}) }),
        )
        .await
        .expect("schedule after restart");
    assert!(trigger.next_fire_time(&handle).await.is_some());
    trigger.cancel(&handle).await.expect("cancel");
}

#[tokio::test(flavor = "multi_thread")]
async fn scheduler_stop_is_bounded_by_drain_timeout() {
    let schedules = Arc::new(InMemoryScheduleStore::new());
    let runs = Arc::new(InMemoryRunStore::new());
    let detector = Arc::new(StuckDetector::default());
    let scheduler = DriftScheduler::with_config(
        schedules,
        runs,
        Arc::new(InMemoryDeviceStore::new()),
        detector.clone(),
        Arc::new(CronTrigger::new()),
        SchedulerConfig {
            drain_timeout: Duration::from_secs(1),
            ..SchedulerConfig::default()
        },
    );
    scheduler
        .add_schedule(ScheduleRecord::new("every-second", EVERY_SECOND))
        .await
        .expect("add");
    scheduler.start().await.expect("start");

    wait_until(|| detector.calls.load(Ordering::SeqCst) > 0).await;

    let started = Instant::now();
    scheduler.stop().await.expect("stop");
    let waited = started.elapsed();
    assert!(waited < Duration::from_secs(3));
    assert!(!scheduler.is_running().await);
    assert!(scheduler.status().await.registered.is_empty());

    scheduler.start().await.expect("restart");
    assert!(scheduler.is_running().await);
    assert_eq!(scheduler.status().await.registered.len(), 1);
}
