//! 周期触发抽象
//!
//! `PeriodicTrigger` 隔离具体的定时机制；`CronTrigger` 基于
//! tokio-cron-scheduler 实现，并统计执行中的回调，`stop` 时在超时内等待排空。

use crate::SchedulerError;
use crate::cron_expr::{normalize_cron_expression, parse_cron_expression};
use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

/// 触发回调。
pub type JobCallback = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// 已注册任务的句柄。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle(pub Uuid);

/// 周期触发机制。
#[async_trait]
pub trait PeriodicTrigger: Send + Sync {
    async fn start(&self) -> Result<(), SchedulerError>;

    async fn schedule(
        &self,
        cron_spec: &str,
        callback: JobCallback,
    ) -> Result<JobHandle, SchedulerError>;

    async fn cancel(&self, handle: &JobHandle) -> Result<(), SchedulerError>;

    /// 下一次触发时间（Unix 毫秒）。
    async fn next_fire_time(&self, handle: &JobHandle) -> Option<i64>;

    /// 停止触发并等待执行中的回调结束；超时返回 false。
    async fn stop(&self, drain_timeout: Duration) -> bool;
}

/// 执行中回调计数。
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            in_flight: self.clone(),
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}

/// 基于 tokio-cron-scheduler 的触发器。
///
/// 底层调度器 shutdown 后不可复用，每次 `start` 都会新建一个。
pub struct CronTrigger {
    scheduler: RwLock<Option<JobScheduler>>,
    schedules: RwLock<HashMap<Uuid, Schedule>>,
    in_flight: Arc<InFlight>,
}

impl CronTrigger {
    pub fn new() -> Self {
        Self {
            scheduler: RwLock::new(None),
            schedules: RwLock::new(HashMap::new()),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// 当前执行中的回调数量。
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }
}

impl Default for CronTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeriodicTrigger for CronTrigger {
    async fn start(&self) -> Result<(), SchedulerError> {
        let mut guard = self.scheduler.write().await;
        if guard.is_some() {
            return Ok(());
        }
        let scheduler = JobScheduler::new()
            .await
            .map_err(|err| SchedulerError::Trigger(err.to_string()))?;
        scheduler
            .start()
            .await
            .map_err(|err| SchedulerError::Trigger(err.to_string()))?;
        *guard = Some(scheduler);
        info!(target: "fleet.scheduler", "cron_trigger_started");
        Ok(())
    }

    async fn schedule(
        &self,
        cron_spec: &str,
        callback: JobCallback,
    ) -> Result<JobHandle, SchedulerError> {
        let parsed = parse_cron_expression(cron_spec)?;
        let normalized = normalize_cron_expression(cron_spec);
        let in_flight = self.in_flight.clone();
        let job = Job::new_async(normalized.as_str(), move |_job_id, _scheduler| {
            let callback = callback.clone();
            let guard = in_flight.enter();
            Box::pin(async move {
                let _guard = guard;
                callback().await;
            })
        })
        .map_err(|err| SchedulerError::InvalidCron {
            expression: cron_spec.to_string(),
            reason: err.to_string(),
        })?;

        let guard = self.scheduler.read().await;
        let scheduler = guard
            .as_ref()
            .ok_or_else(|| SchedulerError::Trigger("trigger not started".to_string()))?;
        let job_id = scheduler
            .add(job)
            .await
            .map_err(|err| SchedulerError::Trigger(err.to_string()))?;
        self.schedules.write().await.insert(job_id, parsed);
        Ok(JobHandle(job_id))
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), SchedulerError> {
        self.schedules.write().await.remove(&handle.0);
        let guard = self.scheduler.read().await;
        let Some(scheduler) = guard.as_ref() else {
            return Ok(());
        };
        scheduler
            .remove(&handle.0)
            .await
            .map_err(|err| SchedulerError::Trigger(err.to_string()))
    }

    async fn next_fire_time(&self, handle: &JobHandle) -> Option<i64> {
        let schedules = self.schedules.read().await;
        schedules
            .get(&handle.0)
            .and_then(|schedule| schedule.upcoming(Utc).next())
            .map(|next| next.timestamp_millis())
    }

    async fn stop(&self, drain_timeout: Duration) -> bool {
        let scheduler = self.scheduler.write().await.take();
        self.schedules.write().await.clear();
        if let Some(mut scheduler) = scheduler {
            if let Err(err) = scheduler.shutdown().await {
                warn!(target: "fleet.scheduler", error = %err, "cron_trigger_shutdown_failed");
            }
        }
        let drained = tokio::time::timeout(drain_timeout, self.in_flight.wait_idle())
            .await
            .is_ok();
        if !drained {
            warn!(
                target: "fleet.scheduler",
                in_flight = self.in_flight(),
                timeout_ms = drain_timeout.as_millis() as u64,
                "cron_trigger_drain_timeout"
            );
        }
        drained
    }
}
