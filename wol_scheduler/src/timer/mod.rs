//! Schedule timer store
//!
//! Arms, re-arms and cancels wake timers on a [`WakePlatform`], keyed by a request id
//! derived deterministically from the schedule id. The store owns the map of currently
//! armed timers, so "one live timer per schedule" is enforced in one place.

pub mod tokio_platform;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::recurrence::{DayMask, ScheduleZone};
use crate::WolError;

pub use tokio_platform::TokioWakePlatform;

const SCHEDULE_NAMESPACE: Uuid = Uuid::from_u128(0x3f6c_2a1e_8b44_4d0e_9a57_c1d2_e3f4_a5b6);
const LEGACY_NAMESPACE: Uuid = Uuid::from_u128(0x7d1e_90b3_52aa_4c61_b8f0_0e2d_4c6a_1b39);

/// Identifier under which a timer is registered with the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Current scheme: one id per schedule.
    pub fn for_schedule(schedule_id: &str) -> Self {
        Self(Uuid::new_v5(&SCHEDULE_NAMESPACE, schedule_id.as_bytes()))
    }

    /// Superseded scheme keyed by device and time of day. Only used to sweep old registrations.
    pub fn legacy(device_id: &str, hour: u32, minute: u32) -> Self {
        let key = format!("{}:{}:{}", device_id, hour, minute);
        Self(Uuid::new_v5(&LEGACY_NAMESPACE, key.as_bytes()))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Data carried by a timer back to the fire handler.
///
/// `schedule_id` is absent for timers registered before schedules had stable ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirePayload {
    pub device_id: String,
    #[serde(default)]
    pub schedule_id: Option<String>,
    pub hour: u32,
    pub minute: u32,
    pub days: DayMask,
}

/// Everything needed to arm one schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleJob {
    pub schedule_id: String,
    pub device_id: String,
    pub hour: u32,
    pub minute: u32,
    pub days: DayMask,
}

impl ScheduleJob {
    pub fn payload(&self) -> FirePayload {
        FirePayload {
            device_id: self.device_id.clone(),
            schedule_id: Some(self.schedule_id.clone()),
            hour: self.hour,
            minute: self.minute,
            days: self.days,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Exact,
    /// Exact timers were not permitted; the platform may defer delivery.
    Inexact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedTimer {
    pub schedule_id: String,
    pub request: RequestId,
    pub fire_at: DateTime<Utc>,
    pub precision: Precision,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("exact timer permission denied")]
    ExactDenied,
    #[error("timer service unavailable: {0}")]
    Unavailable(String),
}

/// Platform timer facility.
///
/// Registering under a request id that is already live replaces the earlier registration.
pub trait WakePlatform: Send + Sync + fmt::Debug {
    fn can_schedule_exact(&self) -> bool;

    fn arm_exact(
        &self,
        request: RequestId,
        at: DateTime<Utc>,
        payload: FirePayload,
    ) -> Result<(), PlatformError>;

    fn arm_inexact(
        &self,
        request: RequestId,
        at: DateTime<Utc>,
        payload: FirePayload,
    ) -> Result<(), PlatformError>;

    /// Returns whether a registration existed.
    fn cancel(&self, request: RequestId) -> Result<bool, PlatformError>;
}

#[derive(Debug)]
struct TimerStoreInner {
    platform: Arc<dyn WakePlatform>,
    clock: Arc<dyn Clock>,
    timezone: ScheduleZone,
    armed: DashMap<String, ArmedTimer>,
    legacy_swept: DashMap<RequestId, ()>,
}

#[derive(Debug, Clone)]
pub struct TimerStore(Arc<TimerStoreInner>);

impl TimerStore {
    pub fn new(
        platform: Arc<dyn WakePlatform>,
        clock: Arc<dyn Clock>,
        timezone: ScheduleZone,
    ) -> Self {
        TimerStore(Arc::new(TimerStoreInner {
            platform,
            clock,
            timezone,
            armed: DashMap::new(),
            legacy_swept: DashMap::new(),
        }))
    }

    pub fn timezone(&self) -> ScheduleZone {
        self.0.timezone
    }

    /// Compute the next occurrence of `job` and register it.
    ///
    /// A computation failure returns an error before anything is touched, so a previously
    /// armed timer for the same schedule stays in place.
    pub fn arm(&self, job: &ScheduleJob) -> Result<ArmedTimer, WolError> {
        let fire_at = self
            .0
            .timezone
            .next_fire_utc(job.hour, job.minute, job.days, self.0.clock.now())
            .ok_or_else(|| {
                WolError::Scheduling(format!(
                    "No next occurrence for schedule {} ({:02}:{:02} on {})",
                    job.schedule_id, job.hour, job.minute, job.days
                ))
            })?;

        self.sweep_legacy(&job.device_id, job.hour, job.minute);

        let request = RequestId::for_schedule(&job.schedule_id);
        if let Err(e) = self.0.platform.cancel(request) {
            crate::warn!("[TIMER_STORE] Pre-arm cancel of {} failed: {}", job.schedule_id, e);
        }

        let precision = self.register(request, fire_at, job).inspect_err(|_| {
            self.0.armed.remove(&job.schedule_id);
        })?;

        let armed = ArmedTimer {
            schedule_id: job.schedule_id.clone(),
            request,
            fire_at,
            precision,
        };
        self.0.armed.insert(job.schedule_id.clone(), armed.clone());

        crate::info!(
            "[TIMER_STORE] Armed {} for {} ({:?})",
            job.schedule_id,
            self.0.timezone.wall_clock(fire_at),
            precision
        );
        Ok(armed)
    }

    fn register(
        &self,
        request: RequestId,
        fire_at: DateTime<Utc>,
        job: &ScheduleJob,
    ) -> Result<Precision, WolError> {
        let platform = &self.0.platform;
        if platform.can_schedule_exact() {
            match platform.arm_exact(request, fire_at, job.payload()) {
                Ok(()) => return Ok(Precision::Exact),
                Err(PlatformError::ExactDenied) => {}
                Err(e) => return Err(WolError::Scheduling(e.to_string())),
            }
        }

        crate::warn!(
            "[TIMER_STORE] Exact timers not permitted, {} armed with degraded precision",
            job.schedule_id
        );
        platform
            .arm_inexact(request, fire_at, job.payload())
            .map(|_| Precision::Inexact)
            .map_err(|e| WolError::Scheduling(e.to_string()))
    }

    /// One best-effort cancel per legacy id per process lifetime.
    fn sweep_legacy(&self, device_id: &str, hour: u32, minute: u32) {
        let legacy = RequestId::legacy(device_id, hour, minute);
        if self.0.legacy_swept.insert(legacy, ()).is_some() {
            return;
        }
        match self.0.platform.cancel(legacy) {
            Ok(true) => crate::info!(
                "[TIMER_STORE] Removed legacy timer for {} at {:02}:{:02}",
                device_id,
                hour,
                minute
            ),
            Ok(false) => {}
            Err(e) => crate::debug!("[TIMER_STORE] Legacy sweep for {} failed: {}", device_id, e),
        }
    }

    /// Best-effort cancel. Cancelling a schedule with no live timer is a no-op.
    pub fn cancel(&self, schedule_id: &str) -> bool {
        let had_entry = self.0.armed.remove(schedule_id).is_some();
        let existed = match self.0.platform.cancel(RequestId::for_schedule(schedule_id)) {
            Ok(existed) => existed,
            Err(e) => {
                crate::warn!("[TIMER_STORE] Cancel of {} failed: {}", schedule_id, e);
                false
            }
        };
        if existed || had_entry {
            crate::info!("[TIMER_STORE] Cancelled {}", schedule_id);
        }
        existed || had_entry
    }

    /// Cancel each id independently; returns how many had a live timer.
    pub fn cancel_all<S: AsRef<str>>(&self, schedule_ids: &[S]) -> usize {
        schedule_ids
            .iter()
            .filter(|id| self.cancel(id.as_ref()))
            .count()
    }

    /// Unconditional cancel under the superseded id scheme
    pub fn cancel_legacy(&self, device_id: &str, hour: u32, minute: u32) -> bool {
        match self.0.platform.cancel(RequestId::legacy(device_id, hour, minute)) {
            Ok(existed) => existed,
            Err(e) => {
                crate::debug!(
                    "[TIMER_STORE] Legacy cancel for {} at {:02}:{:02} failed: {}",
                    device_id,
                    hour,
                    minute,
                    e
                );
                false
            }
        }
    }

    /// Forget the bookkeeping for a timer the platform has just delivered.
    pub fn mark_fired(&self, schedule_id: &str) {
        self.0.armed.remove(schedule_id);
    }

    pub fn armed(&self, schedule_id: &str) -> Option<ArmedTimer> {
        self.0.armed.get(schedule_id).map(|entry| entry.value().clone())
    }

    pub fn armed_count(&self) -> usize {
        self.0.armed.len()
    }

    pub fn armed_ids(&self) -> Vec<String> {
        self.0.armed.iter().map(|entry| entry.key().clone()).collect()
    }
}
