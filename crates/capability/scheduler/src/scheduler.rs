//! 漂移检测调度器
//!
//! 状态：stopped（初始）<-> running。任务注册表（schedule_id -> JobHandle）与
//! running 标志位由同一把读写锁保护：注册/注销走写锁，状态查询走读锁。
//!
//! 触发执行时重新加载计划（避免使用过期的闭包快照），计划已禁用则跳过；
//! 执行记录与统计写入失败只记录日志，不影响检测本身。

use crate::detector::BulkDriftDetector;
use crate::trigger::{JobCallback, JobHandle, PeriodicTrigger};
use crate::{SchedulerConfig, SchedulerError, validate_cron_expression};
use domain::{BulkDriftResult, now_epoch_ms};
use fleet_storage::{
    DeviceSelection, DeviceStore, RunRecord, RunStore, ScheduleRecord, ScheduleStore,
    ScheduleUpdate,
};
use fleet_telemetry::{
    record_audit_write_failure, record_drift_run_completed, record_drift_run_failed,
    record_drift_run_started,
};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 调度器状态快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub running: bool,
    /// 已注册到触发器的计划 ID（升序）。
    pub registered: Vec<i64>,
}

#[derive(Default)]
struct Registry {
    running: bool,
    jobs: HashMap<i64, JobHandle>,
}

struct SchedulerInner {
    schedules: Arc<dyn ScheduleStore>,
    runs: Arc<dyn RunStore>,
    devices: Arc<dyn DeviceStore>,
    detector: Arc<dyn BulkDriftDetector>,
    trigger: Arc<dyn PeriodicTrigger>,
    config: SchedulerConfig,
    registry: RwLock<Registry>,
}

/// 漂移检测调度器入口。
#[derive(Clone)]
pub struct DriftScheduler {
    inner: Arc<SchedulerInner>,
}

impl DriftScheduler {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        runs: Arc<dyn RunStore>,
        devices: Arc<dyn DeviceStore>,
        detector: Arc<dyn BulkDriftDetector>,
        trigger: Arc<dyn PeriodicTrigger>,
    ) -> Self {
        Self::with_config(
            schedules,
            runs,
            devices,
            detector,
            trigger,
            SchedulerConfig::default(),
        )
    }

    pub fn with_config(
        schedules: Arc<dyn ScheduleStore>,
        runs: Arc<dyn RunStore>,
        devices: Arc<dyn DeviceStore>,
        detector: Arc<dyn BulkDriftDetector>,
        trigger: Arc<dyn PeriodicTrigger>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                schedules,
                runs,
                devices,
                detector,
                trigger,
                config,
                registry: RwLock::new(Registry::default()),
            }),
        }
    }

    /// 加载所有启用的计划并注册为周期任务。已在运行时返回错误。
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut registry = self.inner.registry.write().await;
        if registry.running {
            return Err(SchedulerError::AlreadyRunning);
        }
        let schedules = self
            .inner
            .schedules
            .list_enabled_schedules()
            .await
            .map_err(|err| SchedulerError::Storage(err.to_string()))?;
        self.inner.trigger.start().await?;

        for schedule in &schedules {
            match self.register(schedule).await {
                Ok(handle) => {
                    registry.jobs.insert(schedule.id, handle);
                }
                Err(err) => warn!(
                    target: "fleet.scheduler",
                    schedule_id = schedule.id,
                    error = %err,
                    "drift_schedule_register_failed"
                ),
            }
        }
        registry.running = true;
        info!(
            target: "fleet.scheduler",
            schedules = registry.jobs.len(),
            "drift_scheduler_started"
        );
        Ok(())
    }

    /// 按配置决定是否启动；返回是否已启动。
    pub async fn start_if_enabled(&self) -> Result<bool, SchedulerError> {
        if !self.inner.config.enabled {
            info!(target: "fleet.scheduler", "drift_scheduler_disabled");
            return Ok(false);
        }
        self.start().await?;
        Ok(true)
    }

    /// 停止触发并在超时内等待执行中的任务结束；超时后照常停止。
    ///
    /// 排空等待期间不持有注册表锁，执行中的任务仍可读取注册表。
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        {
            let mut registry = self.inner.registry.write().await;
            if !registry.running {
                return Ok(());
            }
            registry.running = false;
            registry.jobs.clear();
        }
        let drained = self
            .inner
            .trigger
            .stop(self.inner.config.drain_timeout)
            .await;
        info!(target: "fleet.scheduler", drained, "drift_scheduler_stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.inner.registry.read().await.running
    }

    pub async fn status(&self) -> SchedulerStatus {
        let registry = self.inner.registry.read().await;
        let mut registered: Vec<i64> = registry.jobs.keys().copied().collect();
        registered.sort_unstable();
        SchedulerStatus {
            running: registry.running,
            registered,
        }
    }

    /// 新增计划：先校验 cron 表达式再持久化；运行中且启用时立即注册。
    pub async fn add_schedule(
        &self,
        record: ScheduleRecord,
    ) -> Result<ScheduleRecord, SchedulerError> {
        validate_cron_expression(&record.cron_spec)?;
        let mut registry = self.inner.registry.write().await;
        let created = self
            .inner
            .schedules
            .create_schedule(record)
            .await
            .map_err(|err| SchedulerError::Storage(err.to_string()))?;
        if registry.running && created.enabled {
            let handle = self.register(&created).await?;
            registry.jobs.insert(created.id, handle);
        }
        info!(
            target: "fleet.scheduler",
            schedule_id = created.id,
            cron = %created.cron_spec,
            enabled = created.enabled,
            "drift_schedule_added"
        );
        Ok(created)
    }

    /// 更新计划：注销旧任务 -> 持久化 -> 运行中且启用时按新字段重新注册。
    pub async fn update_schedule(
        &self,
        schedule_id: i64,
        update: ScheduleUpdate,
    ) -> Result<ScheduleRecord, SchedulerError> {
        if let Some(cron_spec) = &update.cron_spec {
            validate_cron_expression(cron_spec)?;
        }
        let mut registry = self.inner.registry.write().await;
        if let Some(handle) = registry.jobs.remove(&schedule_id) {
            self.deregister(schedule_id, &handle).await;
        }
        let updated = self
            .inner
            .schedules
            .update_schedule(schedule_id, update)
            .await
            .map_err(|err| SchedulerError::Storage(err.to_string()))?
            .ok_or(SchedulerError::NotFound(schedule_id))?;
        if registry.running && updated.enabled {
            let handle = self.register(&updated).await?;
            registry.jobs.insert(updated.id, handle);
        }
        info!(
            target: "fleet.scheduler",
            schedule_id,
            cron = %updated.cron_spec,
            enabled = updated.enabled,
            "drift_schedule_updated"
        );
        Ok(updated)
    }

    /// 删除计划：先注销任务，再删除持久化记录。
    pub async fn delete_schedule(&self, schedule_id: i64) -> Result<(), SchedulerError> {
        let mut registry = self.inner.registry.write().await;
        if let Some(handle) = registry.jobs.remove(&schedule_id) {
            self.deregister(schedule_id, &handle).await;
        }
        let deleted = self
            .inner
            .schedules
            .delete_schedule(schedule_id)
            .await
            .map_err(|err| SchedulerError::Storage(err.to_string()))?;
        if !deleted {
            return Err(SchedulerError::NotFound(schedule_id));
        }
        info!(target: "fleet.scheduler", schedule_id, "drift_schedule_deleted");
        Ok(())
    }

    pub async fn get_schedule(&self, schedule_id: i64) -> Result<ScheduleRecord, SchedulerError> {
        self.inner
            .schedules
            .find_schedule(schedule_id)
            .await
            .map_err(|err| SchedulerError::Storage(err.to_string()))?
            .ok_or(SchedulerError::NotFound(schedule_id))
    }

    pub async fn list_schedules(&self) -> Result<Vec<ScheduleRecord>, SchedulerError> {
        self.inner
            .schedules
            .list_schedules()
            .await
            .map_err(|err| SchedulerError::Storage(err.to_string()))
    }

    /// 执行历史（新到旧）；`limit <= 0` 时使用配置的默认条数。
    pub async fn run_history(
        &self,
        schedule_id: i64,
        limit: i64,
    ) -> Result<Vec<RunRecord>, SchedulerError> {
        let limit = if limit > 0 {
            limit
        } else {
            self.inner.config.run_history_limit
        };
        self.inner
            .runs
            .list_runs(schedule_id, limit)
            .await
            .map_err(|err| SchedulerError::Storage(err.to_string()))
    }

    /// 立即执行一次计划（不论是否启用），返回最终的执行记录。
    pub async fn run_now(&self, schedule_id: i64) -> Result<RunRecord, SchedulerError> {
        let schedule = self.get_schedule(schedule_id).await?;
        Ok(self.run_schedule(schedule).await)
    }

    async fn register(&self, schedule: &ScheduleRecord) -> Result<JobHandle, SchedulerError> {
        let handle = self
            .inner
            .trigger
            .schedule(&schedule.cron_spec, self.job_callback(schedule.id))
            .await?;
        debug!(
            target: "fleet.scheduler",
            schedule_id = schedule.id,
            job = %handle.0,
            "drift_schedule_registered"
        );
        Ok(handle)
    }

    async fn deregister(&self, schedule_id: i64, handle: &JobHandle) {
        if let Err(err) = self.inner.trigger.cancel(handle).await {
            warn!(
                target: "fleet.scheduler",
                schedule_id,
                error = %err,
                "drift_schedule_deregister_failed"
            );
        }
    }

    fn job_callback(&self, schedule_id: i64) -> JobCallback {
        let inner: Weak<SchedulerInner> = Arc::downgrade(&self.inner);
        Arc::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> {
            let inner = inner.clone();
            Box::pin(async move {
                if let Some(inner) = inner.upgrade() {
                    DriftScheduler { inner }.execute(schedule_id).await;
                }
            })
        })
    }

    /// 触发执行入口；所有失败都落在执行记录或日志中，不向触发器传播。
    async fn execute(&self, schedule_id: i64) {
        let schedule = match self.inner.schedules.find_schedule(schedule_id).await {
            Ok(Some(schedule)) => schedule,
            Ok(None) => {
                warn!(target: "fleet.scheduler", schedule_id, "drift_schedule_missing");
                return;
            }
            Err(err) => {
                warn!(
                    target: "fleet.scheduler",
                    schedule_id,
                    error = %err,
                    "drift_schedule_load_failed"
                );
                return;
            }
        };
        if !schedule.enabled {
            debug!(target: "fleet.scheduler", schedule_id, "drift_schedule_disabled_skip");
            return;
        }
        self.run_schedule(schedule).await;
    }

    async fn run_schedule(&self, schedule: ScheduleRecord) -> RunRecord {
        record_drift_run_started();
        let started = Instant::now();
        let started_at_ms = now_epoch_ms();
        let mut run = RunRecord::started(schedule.id, started_at_ms);
        let persisted = match self.inner.runs.create_run(run.clone()).await {
            Ok(created) => {
                run.id = created.id;
                true
            }
            Err(err) => {
                record_audit_write_failure();
                warn!(
                    target: "fleet.scheduler",
                    schedule_id = schedule.id,
                    error = %err,
                    "drift_run_create_failed"
                );
                false
            }
        };

        let outcome = self.detect(&schedule).await.and_then(|result| {
            serde_json::to_value(&result)
                .map(|value| (result, value))
                .map_err(|err| SchedulerError::Serialization(err.to_string()))
        });
        let completed_at_ms = now_epoch_ms();
        match outcome {
            Ok((result, value)) => {
                run.complete(completed_at_ms, value);
                record_drift_run_completed(started.elapsed().as_millis() as u64);
                info!(
                    target: "fleet.scheduler",
                    schedule_id = schedule.id,
                    total = result.total,
                    drifted = result.drifted,
                    errors = result.errors,
                    duration_ms = run.duration_ms.unwrap_or_default(),
                    "drift_run_completed"
                );
            }
            Err(err) => {
                run.fail(completed_at_ms, err.to_string());
                record_drift_run_failed();
                warn!(
                    target: "fleet.scheduler",
                    schedule_id = schedule.id,
                    error = %err,
                    "drift_run_failed"
                );
            }
        }

        self.persist_run(&mut run, persisted).await;
        self.record_statistics(schedule.id, started_at_ms).await;
        run
    }

    async fn detect(&self, schedule: &ScheduleRecord) -> Result<BulkDriftResult, SchedulerError> {
        let device_ids = self.resolve_devices(&schedule.selection).await?;
        self.inner.detector.detect(&device_ids).await
    }

    /// 显式 ID 列表 > 筛选条件 > 全部设备；空 ID 列表视为全部设备。
    async fn resolve_devices(&self, selection: &DeviceSelection) -> Result<Vec<i64>, SchedulerError> {
        let filter = match selection {
            DeviceSelection::Devices { device_ids } if !device_ids.is_empty() => {
                return Ok(device_ids.clone());
            }
            DeviceSelection::Filter(filter) => Some(filter),
            _ => None,
        };
        let devices = self
            .inner
            .devices
            .list_devices(filter)
            .await
            .map_err(|err| SchedulerError::Selection(err.to_string()))?;
        Ok(devices.into_iter().map(|device| device.id).collect())
    }

    async fn persist_run(&self, run: &mut RunRecord, persisted: bool) {
        let saved = if persisted {
            self.inner.runs.update_run(run.clone()).await.map(|_| ())
        } else {
            self.inner
                .runs
                .create_run(run.clone())
                .await
                .map(|created| run.id = created.id)
        };
        if let Err(err) = saved {
            record_audit_write_failure();
            warn!(
                target: "fleet.scheduler",
                schedule_id = run.schedule_id,
                run_id = run.id,
                error = %err,
                "drift_run_persist_failed"
            );
        }
    }

    async fn record_statistics(&self, schedule_id: i64, last_run_ms: i64) {
        let handle = self.inner.registry.read().await.jobs.get(&schedule_id).copied();
        let next_run_ms = match handle {
            Some(handle) => self.inner.trigger.next_fire_time(&handle).await,
            None => None,
        };
        match self
            .inner
            .schedules
            .record_schedule_run(schedule_id, last_run_ms, next_run_ms)
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(
                target: "fleet.scheduler",
                schedule_id,
                "drift_schedule_stats_skipped"
            ),
            Err(err) => {
                record_audit_write_failure();
                warn!(
                    target: "fleet.scheduler",
                    schedule_id,
                    error = %err,
                    "drift_schedule_stats_failed"
                );
            }
        }
    }
}
