//! Scheduler façade
//!
//! Owns storage, the timer store, dispatch, fire handling and the status cache, plus the
//! background tasks that feed them (fire delivery loop and reachability poll).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::db::entities::{DeviceModel, ScheduleModel};
use crate::db::Database;
use crate::dispatch::{DispatchReport, WakeDispatcher};
use crate::fire::{FireHandler, FireOutcome, ProcessWakeLock, WakeLock};
use crate::magic_packet::{PacketSender, UdpPacketSender};
use crate::notify::{Notifier, TracingNotifier};
use crate::probe::ReachabilityProber;
use crate::recurrence::{validate_time, DayMask, ScheduleZone};
use crate::status::{StatusEntry, StatusMonitor};
use crate::storage::{DeviceInput, Storage};
use crate::timer::{ArmedTimer, FirePayload, TimerStore, TokioWakePlatform, WakePlatform};
use crate::transfer::{self, ImportSummary};
use crate::WolError;

/// Result of re-arming persisted schedules after a restart
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub armed: usize,
    /// Enabled schedules whose device no longer exists
    pub skipped_orphans: usize,
    pub failed: usize,
}

/// Collaborators a scheduler is assembled from
#[derive(Debug, Clone)]
pub struct SchedulerParts {
    pub storage: Storage,
    pub platform: Arc<dyn WakePlatform>,
    pub sender: Arc<dyn PacketSender>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub wake_lock: Arc<dyn WakeLock>,
    pub prober: ReachabilityProber,
    pub timezone: ScheduleZone,
    pub fire_deadline: Duration,
}

/// Run database migrations to create required tables
pub async fn run_migrations(database: &Database) -> Result<(), WolError> {
    crate::debug!("Running database migrations");
    database.run_migrations().await.map_err(|e| {
        crate::error!("Database migrations failed: {}", e);
        WolError::Database(format!("Migration failed: {}", e))
    })?;
    crate::debug!("Database migrations completed successfully");
    Ok(())
}

/// Open a database connection and run migrations
async fn open(database_url: &str) -> Result<Database, WolError> {
    crate::debug!("Connecting to database: {}", database_url);
    let database = Database::new(database_url).await.map_err(|e| {
        crate::error!("Database connection failed: {}", e);
        WolError::Database(format!("Database connection failed: {}", e))
    })?;
    run_migrations(&database).await?;
    Ok(database)
}

/// Fire delivery loop and the signal that stops it
#[derive(Debug)]
struct FireLoop {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[derive(Debug)]
pub struct WolScheduler {
    tasks: JoinSet<()>,
    fire_loop: Option<FireLoop>,
    storage: Storage,
    timers: TimerStore,
    dispatcher: WakeDispatcher,
    fire_handler: FireHandler,
    status: StatusMonitor,
    clock: Arc<dyn Clock>,
}

impl WolScheduler {
    /// Open the configured database and start the fire loop and status poll
    pub async fn new(config: &SchedulerConfig) -> Result<Self, WolError> {
        crate::info!("[SCHEDULER] Initializing with {}", config.database_url);
        let database = open(&config.database_url).await?;

        let (platform, fire_rx) = TokioWakePlatform::new(config.exact_timers);
        let mut scheduler = Self::from_parts(SchedulerParts {
            storage: Storage::new(database),
            platform: Arc::new(platform),
            sender: Arc::new(UdpPacketSender::new(config.send_timeout)),
            clock: Arc::new(SystemClock),
            notifier: Arc::new(TracingNotifier),
            wake_lock: Arc::new(ProcessWakeLock::default()),
            prober: ReachabilityProber::new(config.probe_timeout),
            timezone: config.timezone,
            fire_deadline: config.fire_deadline,
        });
        scheduler.attach_fire_receiver(fire_rx);
        scheduler.start_status_poll(config.status_poll_interval);

        crate::info!("[SCHEDULER] Initialized successfully");
        Ok(scheduler)
    }

    /// Assemble a scheduler without starting any background task
    pub fn from_parts(parts: SchedulerParts) -> Self {
        let timers = TimerStore::new(parts.platform, parts.clock.clone(), parts.timezone);
        let dispatcher = WakeDispatcher::new(parts.storage.clone(), parts.sender);
        let fire_handler = FireHandler::new(
            parts.storage.clone(),
            dispatcher.clone(),
            timers.clone(),
            parts.notifier,
            parts.clock.clone(),
            parts.wake_lock,
            parts.fire_deadline,
        );
        let status = StatusMonitor::new(parts.storage.clone(), parts.prober, parts.clock.clone());

        Self {
            tasks: JoinSet::new(),
            fire_loop: None,
            storage: parts.storage,
            timers,
            dispatcher,
            fire_handler,
            status,
            clock: parts.clock,
        }
    }

    /// Handle every payload arriving on `fire_rx`, each in its own tracked task
    ///
    /// Fires still running when the loop is stopped are aborted and awaited, so none of
    /// them can re-arm a timer after `shutdown` has cancelled the armed set.
    pub fn attach_fire_receiver(&mut self, mut fire_rx: mpsc::UnboundedReceiver<FirePayload>) {
        let handler = self.fire_handler.clone();
        let (stop, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut in_flight = JoinSet::new();
            let mut open = true;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        crate::info!("[SCHEDULER] Fire loop received shutdown signal");
                        break;
                    }
                    payload = fire_rx.recv(), if open => match payload {
                        Some(payload) => {
                            let handler = handler.clone();
                            in_flight.spawn(async move {
                                let outcome = handler.handle(payload).await;
                                crate::debug!("[SCHEDULER] Fire finished: {:?}", outcome);
                            });
                        }
                        None => {
                            crate::info!("[SCHEDULER] Fire channel closed");
                            open = false;
                        }
                    },
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(e) = joined {
                            crate::error!("[SCHEDULER] Fire task failed: {}", e);
                        }
                    }
                }
            }

            let pending = in_flight.len();
            in_flight.shutdown().await;
            crate::debug!("[SCHEDULER] Fire loop stopped, {} fires aborted", pending);
        });

        if let Some(previous) = self.fire_loop.replace(FireLoop { stop, task }) {
            let _ = previous.stop.send(());
        }
    }

    pub fn start_status_poll(&mut self, interval: Duration) {
        let status = self.status.clone();
        self.tasks.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = status.refresh_all().await {
                    crate::warn!("[SCHEDULER] Status refresh failed: {}", e);
                }
            }
        });
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn timers(&self) -> &TimerStore {
        &self.timers
    }

    // ---- devices ----

    /// Send a wake packet now and record `last_seen_at` on success
    pub async fn wake_now(&self, device_id: &str) -> Result<DispatchReport, WolError> {
        let report = self.dispatcher.wake_device(device_id).await?;
        if let Err(e) = self.storage.update_last_seen(device_id, self.clock.now()).await {
            crate::warn!("[SCHEDULER] Could not record last seen for {}: {}", device_id, e);
        }
        Ok(report)
    }

    pub async fn create_device(&self, input: &DeviceInput) -> Result<DeviceModel, WolError> {
        let device = input.validate()?;
        let model = self.storage.insert_device(&device).await?;
        crate::info!("[SCHEDULER] Created device {} ({})", model.id, model.name);
        Ok(model)
    }

    pub async fn update_device(
        &self,
        id: &str,
        input: &DeviceInput,
    ) -> Result<DeviceModel, WolError> {
        let device = input.validate()?;
        self.storage.update_device(id, &device).await
    }

    pub async fn get_device(&self, id: &str) -> Result<DeviceModel, WolError> {
        self.storage
            .get_device(id)
            .await?
            .ok_or_else(|| WolError::NotFound(format!("Device {} not found", id)))
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceModel>, WolError> {
        self.storage.list_devices().await
    }

    /// Cancel the device's timers, then delete its schedules, then the device itself
    pub async fn delete_device(&self, id: &str) -> Result<(), WolError> {
        let device = self.get_device(id).await?;
        let schedules = self.storage.list_schedules_for_device(id).await?;

        let ids: Vec<&str> = schedules.iter().map(|s| s.id.as_str()).collect();
        let cancelled = self.timers.cancel_all(&ids);
        for schedule in &schedules {
            if let Ok((hour, minute)) = validate_time(schedule.hour as i64, schedule.minute as i64) {
                self.timers.cancel_legacy(id, hour, minute);
            }
        }

        let removed = self.storage.delete_schedules_for_device(id).await?;
        self.storage.delete_device(id).await?;
        self.status.forget(id);

        crate::info!(
            "[SCHEDULER] Deleted device {} ({}), {} schedules, {} live timers",
            id,
            device.name,
            removed,
            cancelled
        );
        Ok(())
    }

    // ---- schedules ----

    pub async fn list_schedules_for_device(
        &self,
        device_id: &str,
    ) -> Result<Vec<ScheduleModel>, WolError> {
        self.storage.list_schedules_for_device(device_id).await
    }

    pub async fn get_schedule(&self, id: &str) -> Result<ScheduleModel, WolError> {
        self.storage
            .get_schedule(id)
            .await?
            .ok_or_else(|| WolError::NotFound(format!("Schedule {} not found", id)))
    }

    /// Persist a new enabled schedule and arm its first occurrence.
    ///
    /// An all-zero day mask is stored as Monday.
    pub async fn create_schedule(
        &self,
        device_id: &str,
        hour: i64,
        minute: i64,
        days_bitmap: i64,
    ) -> Result<ScheduleModel, WolError> {
        let (hour, minute) = validate_time(hour, minute)?;
        let days = DayMask::from_bits(days_bitmap)?.normalized();
        self.get_device(device_id).await?;

        let schedule = self
            .storage
            .insert_schedule(device_id, hour, minute, days, true)
            .await?;
        if let Err(e) = self.arm(&schedule) {
            if let Err(cleanup) = self.storage.delete_schedule(&schedule.id).await {
                crate::error!(
                    "[SCHEDULER] Could not roll back unarmed schedule {}: {}",
                    schedule.id,
                    cleanup
                );
            }
            return Err(e);
        }
        Ok(schedule)
    }

    /// Replace time and days; the schedule comes back enabled and armed.
    pub async fn update_schedule(
        &self,
        id: &str,
        hour: i64,
        minute: i64,
        days_bitmap: i64,
    ) -> Result<ScheduleModel, WolError> {
        let (hour, minute) = validate_time(hour, minute)?;
        let days = DayMask::from_bits(days_bitmap)?.normalized();
        let previous = self.get_schedule(id).await?;

        self.timers.cancel(id);
        if let Ok((old_hour, old_minute)) =
            validate_time(previous.hour as i64, previous.minute as i64)
        {
            self.timers
                .cancel_legacy(&previous.device_id, old_hour, old_minute);
        }

        let schedule = self
            .storage
            .update_schedule_time(id, hour, minute, days)
            .await?;
        self.arm(&schedule)?;
        Ok(schedule)
    }

    /// Flip `enabled`; disabling cancels the timer, enabling recomputes and arms.
    pub async fn toggle_schedule(&self, id: &str) -> Result<ScheduleModel, WolError> {
        let current = self.get_schedule(id).await?;
        let schedule = self
            .storage
            .set_schedule_enabled(id, !current.enabled)
            .await?;

        if schedule.enabled {
            self.arm(&schedule)?;
        } else {
            self.timers.cancel(id);
        }
        crate::info!("[SCHEDULER] Schedule {} enabled={}", id, schedule.enabled);
        Ok(schedule)
    }

    pub async fn delete_schedule(&self, id: &str) -> Result<(), WolError> {
        let schedule = self.get_schedule(id).await?;
        self.timers.cancel(id);
        if let Ok((hour, minute)) = validate_time(schedule.hour as i64, schedule.minute as i64) {
            self.timers.cancel_legacy(&schedule.device_id, hour, minute);
        }
        self.storage.delete_schedule(id).await?;
        crate::info!("[SCHEDULER] Deleted schedule {}", id);
        Ok(())
    }

    fn arm(&self, schedule: &ScheduleModel) -> Result<ArmedTimer, WolError> {
        self.timers.arm(&schedule.job()?)
    }

    /// Re-arm every enabled schedule from storage. Orphans and bad rows are logged, not fatal.
    pub async fn reconcile_after_boot(&self) -> Result<ReconcileReport, WolError> {
        let mut report = ReconcileReport::default();
        for schedule in self.storage.list_enabled_schedules().await? {
            match self.storage.get_device(&schedule.device_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    crate::warn!(
                        "[SCHEDULER] Schedule {} belongs to missing device {}, skipped",
                        schedule.id,
                        schedule.device_id
                    );
                    report.skipped_orphans += 1;
                    continue;
                }
                Err(e) => {
                    crate::warn!("[SCHEDULER] Device lookup for {} failed: {}", schedule.id, e);
                    report.failed += 1;
                    continue;
                }
            }

            match self.arm(&schedule) {
                Ok(_) => report.armed += 1,
                Err(e) => {
                    crate::error!("[SCHEDULER] Could not re-arm {}: {}", schedule.id, e);
                    report.failed += 1;
                }
            }
        }

        crate::info!(
            "[SCHEDULER] Reconciled: {} armed, {} orphaned, {} failed",
            report.armed,
            report.skipped_orphans,
            report.failed
        );
        Ok(report)
    }

    pub async fn handle_fire(&self, payload: FirePayload) -> FireOutcome {
        self.fire_handler.handle(payload).await
    }

    // ---- status ----

    pub fn device_status(&self, device_id: &str) -> StatusEntry {
        self.status.status(device_id)
    }

    pub async fn refresh_statuses(&self) -> Result<usize, WolError> {
        self.status.refresh_all().await
    }

    // ---- export / import ----

    pub async fn export_json(&self) -> Result<String, WolError> {
        let bundle = transfer::export_bundle(&self.storage).await?;
        serde_json::to_string_pretty(&bundle)
            .map_err(|e| WolError::Internal(format!("Export serialization failed: {}", e)))
    }

    /// Import devices and schedules, then bring armed timers in line with the result
    pub async fn import_json(
        &self,
        json: &str,
    ) -> Result<(ImportSummary, ReconcileReport), WolError> {
        let bundle = transfer::parse_import(json)?;
        let summary = transfer::apply_import(&self.storage, &bundle).await?;

        let disabled: Vec<&str> = bundle
            .schedules
            .iter()
            .filter(|s| !s.enabled)
            .map(|s| s.id.as_str())
            .collect();
        self.timers.cancel_all(&disabled);

        let report = self.reconcile_after_boot().await?;
        Ok((summary, report))
    }

    /// Stop background tasks and cancel every armed timer
    pub async fn shutdown(&mut self) {
        if let Some(fire_loop) = self.fire_loop.take() {
            let _ = fire_loop.stop.send(());
            if let Err(e) = fire_loop.task.await {
                crate::warn!("[SCHEDULER] Fire loop ended abnormally: {}", e);
            }
        }
        self.tasks.shutdown().await;

        let ids = self.timers.armed_ids();
        let cancelled = self.timers.cancel_all(&ids);
        crate::info!("[SCHEDULER] Shut down, {} timers cancelled", cancelled);
    }
}
