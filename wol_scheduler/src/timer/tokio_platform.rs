//! In-process wake platform backed by tokio timers
//!
//! Each registration is a task sleeping until its instant that then delivers the
//! payload on an mpsc channel. Registrations do not outlive the process; persisted
//! schedules are re-armed by boot reconciliation instead.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{FirePayload, PlatformError, Precision, RequestId, WakePlatform};

#[derive(Debug)]
struct ScheduledTimer {
    generation: u64,
    fire_at: DateTime<Utc>,
    precision: Precision,
    task: JoinHandle<()>,
}

#[derive(Debug)]
struct PlatformInner {
    timers: DashMap<RequestId, ScheduledTimer>,
    fire_tx: mpsc::UnboundedSender<FirePayload>,
    exact_permitted: AtomicBool,
    generation: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct TokioWakePlatform {
    inner: Arc<PlatformInner>,
}

impl TokioWakePlatform {
    pub fn new(exact_permitted: bool) -> (Self, mpsc::UnboundedReceiver<FirePayload>) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        let platform = Self {
            inner: Arc::new(PlatformInner {
                timers: DashMap::new(),
                fire_tx,
                exact_permitted: AtomicBool::new(exact_permitted),
                generation: AtomicU64::new(0),
            }),
        };
        (platform, fire_rx)
    }

    pub fn set_exact_permitted(&self, permitted: bool) {
        self.inner.exact_permitted.store(permitted, Ordering::SeqCst);
    }

    pub fn pending_count(&self) -> usize {
        self.inner.timers.len()
    }

    pub fn pending(&self, request: RequestId) -> Option<(DateTime<Utc>, Precision)> {
        self.inner
            .timers
            .get(&request)
            .map(|timer| (timer.fire_at, timer.precision))
    }

    /// Abort every pending registration
    pub fn clear(&self) -> usize {
        let requests: Vec<RequestId> = self.inner.timers.iter().map(|t| *t.key()).collect();
        requests
            .into_iter()
            .filter(|request| matches!(self.cancel(*request), Ok(true)))
            .count()
    }

    fn schedule(
        &self,
        request: RequestId,
        at: DateTime<Utc>,
        payload: FirePayload,
        precision: Precision,
    ) -> Result<(), PlatformError> {
        let handle = Handle::try_current().map_err(|e| PlatformError::Unavailable(e.to_string()))?;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let delay = (at - Utc::now()).to_std().unwrap_or_default();

        // The task waits for its own map entry before sleeping, so a zero delay cannot
        // fire ahead of the insert below.
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let weak: Weak<PlatformInner> = Arc::downgrade(&self.inner);
        let task = handle.spawn(async move {
            if registered_rx.await.is_err() {
                return;
            }
            tokio::time::sleep(delay).await;

            let Some(inner) = weak.upgrade() else {
                return;
            };
            let current = inner
                .timers
                .remove_if(&request, |_, timer| timer.generation == generation)
                .is_some();
            if current && inner.fire_tx.send(payload).is_err() {
                crate::warn!("[TIMER] Fire receiver dropped, timer {} lost", request);
            }
        });

        let timer = ScheduledTimer {
            generation,
            fire_at: at,
            precision,
            task,
        };
        if let Some(previous) = self.inner.timers.insert(request, timer) {
            previous.task.abort();
        }
        let _ = registered_tx.send(());

        crate::debug!("[TIMER] Registered {} at {} ({:?})", request, at, precision);
        Ok(())
    }
}

impl WakePlatform for TokioWakePlatform {
    fn can_schedule_exact(&self) -> bool {
        self.inner.exact_permitted.load(Ordering::SeqCst)
    }

    fn arm_exact(
        &self,
        request: RequestId,
        at: DateTime<Utc>,
        payload: FirePayload,
    ) -> Result<(), PlatformError> {
        if !self.can_schedule_exact() {
            return Err(PlatformError::ExactDenied);
        }
        self.schedule(request, at, payload, Precision::Exact)
    }

    fn arm_inexact(
        &self,
        request: RequestId,
        at: DateTime<Utc>,
        payload: FirePayload,
    ) -> Result<(), PlatformError> {
        self.schedule(request, at, payload, Precision::Inexact)
    }

    fn cancel(&self, request: RequestId) -> Result<bool, PlatformError> {
        match self.inner.timers.remove(&request) {
            Some((_, timer)) => {
                timer.task.abort();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
