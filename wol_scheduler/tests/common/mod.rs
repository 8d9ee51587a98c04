//! Shared test utilities
//!
//! Every test gets its own in-memory SQLite database with migrations applied, plus fake
//! collaborators: a recording wake platform, a scripted packet sender, a fixed clock and
//! a recording notifier.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use wol_scheduler::db::Database;
use wol_scheduler::fire::ProcessWakeLock;
use wol_scheduler::magic_packet::{PacketSender, WakeTarget};
use wol_scheduler::notify::Notifier;
use wol_scheduler::probe::ReachabilityProber;
use wol_scheduler::timer::{FirePayload, PlatformError, Precision, RequestId, WakePlatform};
use wol_scheduler::{
    Clock, DeviceInput, MacAddress, ScheduleZone, SchedulerParts, Storage, TimerStore,
    WolScheduler,
};

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("wol_scheduler=debug")
            .with_test_writer()
            .try_init();
    });
}

/// Fresh in-memory database with all migrations applied
pub async fn get_test_database(test_function_name: &str) -> Database {
    init_tracing();
    let db = Database::new_for_test("sqlite::memory:")
        .await
        .unwrap_or_else(|e| panic!("{}: test database unavailable: {}", test_function_name, e));
    db.run_migrations()
        .await
        .unwrap_or_else(|e| panic!("{}: migrations failed: {}", test_function_name, e));
    db
}

/// Tuesday 2025-06-03 10:00:00 UTC
pub fn tuesday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 3, 10, 0, 0).unwrap()
}

pub fn utc() -> ScheduleZone {
    ScheduleZone::Fixed(FixedOffset::east_opt(0).unwrap())
}

// ---- clock ----

#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

// ---- wake platform ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTimer {
    pub at: DateTime<Utc>,
    pub payload: FirePayload,
    pub precision: Precision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Arm(RequestId, Precision),
    Cancel(RequestId),
}

/// Keeps registrations in a map and logs every call
#[derive(Debug)]
pub struct RecordingPlatform {
    live: Mutex<HashMap<RequestId, LiveTimer>>,
    calls: Mutex<Vec<PlatformCall>>,
    exact_permitted: AtomicBool,
    failing_cancels: Mutex<HashSet<RequestId>>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self {
            live: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            exact_permitted: AtomicBool::new(true),
            failing_cancels: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_exact_permitted(&self, permitted: bool) {
        self.exact_permitted.store(permitted, Ordering::SeqCst);
    }

    pub fn fail_cancel_for(&self, request: RequestId) {
        self.failing_cancels.lock().unwrap().insert(request);
    }

    /// Register a timer behind the store's back, e.g. one left over from an older release
    pub fn seed(&self, request: RequestId, at: DateTime<Utc>, payload: FirePayload) {
        self.live.lock().unwrap().insert(
            request,
            LiveTimer {
                at,
                payload,
                precision: Precision::Exact,
            },
        );
    }

    pub fn live(&self, request: RequestId) -> Option<LiveTimer> {
        self.live.lock().unwrap().get(&request).cloned()
    }

    pub fn live_for_schedule(&self, schedule_id: &str) -> Option<LiveTimer> {
        self.live(RequestId::for_schedule(schedule_id))
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn arm_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, PlatformCall::Arm(..)))
            .count()
    }

    pub fn arm_calls_for(&self, schedule_id: &str) -> usize {
        let request = RequestId::for_schedule(schedule_id);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, PlatformCall::Arm(r, _) if *r == request))
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn register(
        &self,
        request: RequestId,
        at: DateTime<Utc>,
        payload: FirePayload,
        precision: Precision,
    ) {
        self.calls
            .lock()
            .unwrap()
            .push(PlatformCall::Arm(request, precision));
        self.live.lock().unwrap().insert(
            request,
            LiveTimer {
                at,
                payload,
                precision,
            },
        );
    }
}

impl WakePlatform for RecordingPlatform {
    fn can_schedule_exact(&self) -> bool {
        self.exact_permitted.load(Ordering::SeqCst)
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
        self.register(request, at, payload, Precision::Exact);
        Ok(())
    }

    fn arm_inexact(
        &self,
        request: RequestId,
        at: DateTime<Utc>,
        payload: FirePayload,
    ) -> Result<(), PlatformError> {
        self.register(request, at, payload, Precision::Inexact);
        Ok(())
    }

    fn cancel(&self, request: RequestId) -> Result<bool, PlatformError> {
        self.calls.lock().unwrap().push(PlatformCall::Cancel(request));
        if self.failing_cancels.lock().unwrap().contains(&request) {
            return Err(PlatformError::Unavailable("scripted failure".to_string()));
        }
        Ok(self.live.lock().unwrap().remove(&request).is_some())
    }
}

// ---- packet sender ----

/// Succeeds for every host unless told otherwise
#[derive(Debug, Default)]
pub struct ScriptedSender {
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    sent: Mutex<Vec<(MacAddress, WakeTarget)>>,
}

impl ScriptedSender {
    pub fn fail_host(&self, host: &str) {
        self.failing.lock().unwrap().insert(host.to_string());
    }

    pub fn panic_on_host(&self, host: &str) {
        self.panicking.lock().unwrap().insert(host.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn sent_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.host.clone())
            .collect();
        hosts.sort();
        hosts
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl PacketSender for ScriptedSender {
    async fn send(&self, mac: MacAddress, target: &WakeTarget) -> bool {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.panicking.lock().unwrap().contains(&target.host) {
            panic!("scripted panic for {}", target.host);
        }
        self.sent.lock().unwrap().push((mac, target.clone()));
        !self.failing.lock().unwrap().contains(&target.host)
    }
}

// ---- notifier ----

#[derive(Debug)]
pub struct RecordingNotifier {
    permitted: AtomicBool,
    sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            permitted: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_permitted(&self, permitted: bool) {
        self.permitted.store(permitted, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn is_permitted(&self) -> bool {
        self.permitted.load(Ordering::SeqCst)
    }

    fn wake_sent(&self, device_name: &str) {
        self.sent.lock().unwrap().push(device_name.to_string());
    }
}

// ---- fixtures ----

pub fn device_input(name: &str) -> DeviceInput {
    DeviceInput {
        name: name.to_string(),
        mac: "00:11:22:33:44:55".to_string(),
        internal_host: Some("192.168.1.20".to_string()),
        internal_port: None,
        external_host: None,
        external_port: None,
        status_probe_port: None,
    }
}

pub fn timer_store(platform: Arc<RecordingPlatform>, clock: Arc<FixedClock>) -> TimerStore {
    TimerStore::new(platform, clock, utc())
}

pub struct Harness {
    pub scheduler: WolScheduler,
    pub storage: Storage,
    pub platform: Arc<RecordingPlatform>,
    pub sender: Arc<ScriptedSender>,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub wake_lock: Arc<ProcessWakeLock>,
}

pub async fn harness(test_function_name: &str) -> Harness {
    harness_with_deadline(test_function_name, Duration::from_secs(180)).await
}

pub async fn harness_with_deadline(test_function_name: &str, fire_deadline: Duration) -> Harness {
    let storage = Storage::new(get_test_database(test_function_name).await);
    let platform = Arc::new(RecordingPlatform::new());
    let sender = Arc::new(ScriptedSender::default());
    let clock = Arc::new(FixedClock::new(tuesday_morning()));
    let notifier = Arc::new(RecordingNotifier::new());
    let wake_lock = Arc::new(ProcessWakeLock::default());

    let scheduler = WolScheduler::from_parts(SchedulerParts {
        storage: storage.clone(),
        platform: platform.clone(),
        sender: sender.clone(),
        clock: clock.clone(),
        notifier: notifier.clone(),
        wake_lock: wake_lock.clone(),
        prober: ReachabilityProber::new(Duration::from_millis(100)),
        timezone: utc(),
        fire_deadline,
    });

    Harness {
        scheduler,
        storage,
        platform,
        sender,
        clock,
        notifier,
        wake_lock,
    }
}
