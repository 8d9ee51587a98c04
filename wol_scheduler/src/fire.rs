//! Fire handling: what happens when an armed timer goes off
//!
//! Dispatch, last-seen update, schedule resolution and re-arm each run regardless of how
//! the previous step went. The fire deadline bounds only the dispatch and last-seen step;
//! resolution and re-arm always follow. A single fire produces at most one
//! `TimerStore::arm` call.

use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::dispatch::WakeDispatcher;
use crate::notify::{notify_wake_sent, Notifier};
use crate::storage::Storage;
use crate::timer::{ArmedTimer, FirePayload, ScheduleJob, TimerStore};

/// Something that keeps the host awake while held
pub trait WakeLock: Send + Sync + Debug {
    fn acquire(&self);
    fn release(&self);
}

/// Releases its lease on drop, whatever path the holder leaves by.
#[derive(Debug)]
pub struct WakeLockGuard {
    lock: Arc<dyn WakeLock>,
}

impl WakeLockGuard {
    pub fn acquire(lock: Arc<dyn WakeLock>) -> Self {
        lock.acquire();
        Self { lock }
    }
}

impl Drop for WakeLockGuard {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Counts leases held inside this process
#[derive(Debug, Default)]
pub struct ProcessWakeLock {
    held: AtomicUsize,
}

impl ProcessWakeLock {
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }
}

impl WakeLock for ProcessWakeLock {
    fn acquire(&self) {
        self.held.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        let _ = self
            .held
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RearmStatus {
    Rearmed(ArmedTimer),
    /// Legacy payload with no matching schedule
    SkippedUnresolved,
    /// Schedule deleted or disabled while the timer was pending
    SkippedInactive,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireOutcome {
    pub dispatched: bool,
    /// Dispatch was abandoned at the fire deadline
    pub dispatch_timed_out: bool,
    pub schedule_id: Option<String>,
    pub rearm: RearmStatus,
}

#[derive(Debug, Clone)]
pub struct FireHandler {
    storage: Storage,
    dispatcher: WakeDispatcher,
    timers: TimerStore,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    wake_lock: Arc<dyn WakeLock>,
    deadline: Duration,
}

impl FireHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Storage,
        dispatcher: WakeDispatcher,
        timers: TimerStore,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        wake_lock: Arc<dyn WakeLock>,
        deadline: Duration,
    ) -> Self {
        Self {
            storage,
            dispatcher,
            timers,
            notifier,
            clock,
            wake_lock,
            deadline,
        }
    }

    pub async fn handle(&self, payload: FirePayload) -> FireOutcome {
        let _lease = WakeLockGuard::acquire(self.wake_lock.clone());
        crate::info!(
            "[FIRE] Timer fired for device {} ({:?} {:02}:{:02})",
            payload.device_id,
            payload.schedule_id,
            payload.hour,
            payload.minute
        );

        let (dispatched, dispatch_timed_out) =
            match tokio::time::timeout(self.deadline, self.dispatch(&payload.device_id)).await {
                Ok(dispatched) => (dispatched, false),
                Err(_) => {
                    crate::error!(
                        "[FIRE] Dispatch for device {} exceeded {:?}, abandoned",
                        payload.device_id,
                        self.deadline
                    );
                    (false, true)
                }
            };

        let schedule_id = match &payload.schedule_id {
            Some(id) => Some(id.clone()),
            None => self.resolve_legacy(&payload).await,
        };
        let Some(schedule_id) = schedule_id else {
            crate::warn!(
                "[FIRE] No schedule of {} matches {:02}:{:02} {}, not re-arming",
                payload.device_id,
                payload.hour,
                payload.minute,
                payload.days
            );
            return FireOutcome {
                dispatched,
                dispatch_timed_out,
                schedule_id: None,
                rearm: RearmStatus::SkippedUnresolved,
            };
        };

        self.timers.mark_fired(&schedule_id);
        let rearm = self.rearm(&schedule_id, &payload).await;
        FireOutcome {
            dispatched,
            dispatch_timed_out,
            schedule_id: Some(schedule_id),
            rearm,
        }
    }

    async fn dispatch(&self, device_id: &str) -> bool {
        let report = match self.dispatcher.wake_device(device_id).await {
            Ok(report) => report,
            Err(e) => {
                crate::warn!("[FIRE] Dispatch for {} failed: {}", device_id, e);
                return false;
            }
        };

        if let Err(e) = self.storage.update_last_seen(device_id, self.clock.now()).await {
            crate::warn!("[FIRE] Could not record last seen for {}: {}", device_id, e);
        }
        notify_wake_sent(self.notifier.as_ref(), &report.device_name);
        true
    }

    async fn resolve_legacy(&self, payload: &FirePayload) -> Option<String> {
        match self.storage.list_schedules_for_device(&payload.device_id).await {
            Ok(schedules) => schedules
                .into_iter()
                .find(|s| s.matches(payload.hour, payload.minute, payload.days))
                .map(|s| s.id),
            Err(e) => {
                crate::warn!("[FIRE] Schedule lookup for {} failed: {}", payload.device_id, e);
                None
            }
        }
    }

    /// Re-arm from the payload's own time and days; only the enabled flag is re-read.
    async fn rearm(&self, schedule_id: &str, payload: &FirePayload) -> RearmStatus {
        match self.storage.get_schedule(schedule_id).await {
            Ok(Some(schedule)) if schedule.enabled => {}
            Ok(_) => {
                crate::info!("[FIRE] Schedule {} is gone or disabled, not re-arming", schedule_id);
                return RearmStatus::SkippedInactive;
            }
            Err(e) => {
                crate::warn!("[FIRE] Could not re-read schedule {}: {}", schedule_id, e);
                return RearmStatus::Failed(e.to_string());
            }
        }

        let job = ScheduleJob {
            schedule_id: schedule_id.to_string(),
            device_id: payload.device_id.clone(),
            hour: payload.hour,
            minute: payload.minute,
            days: payload.days,
        };
        match self.timers.arm(&job) {
            Ok(armed) => RearmStatus::Rearmed(armed),
            Err(e) => {
                crate::error!("[FIRE] Re-arm of {} failed: {}", schedule_id, e);
                RearmStatus::Failed(e.to_string())
            }
        }
    }
}
