//! wol_scheduler
//!
//! Recurring Wake-on-LAN scheduler and magic-packet dispatch engine.
//! Devices and weekly schedules are persisted with SeaORM; each enabled schedule
//! keeps exactly one armed timer, and every fire dispatches a fan-out wake and
//! re-arms the next occurrence.

pub mod clock;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod fire;
pub mod mac;
pub mod magic_packet;
pub mod notify;
pub mod probe;
pub mod recurrence;
pub mod scheduler;
pub mod status;
pub mod storage;
pub mod timer;
pub mod transfer;

pub use clock::{Clock, SystemClock};
pub use config::SchedulerConfig;
pub use db::Database;
pub use dispatch::{DispatchError, DispatchReport, WakeDispatcher};
pub use fire::{FireHandler, FireOutcome, RearmStatus};
pub use mac::MacAddress;
pub use magic_packet::{send_magic_packet, PacketSender, UdpPacketSender, WakeTarget};
pub use recurrence::{next_fire_instant, DayMask, ScheduleZone};
pub use scheduler::{ReconcileReport, SchedulerParts, WolScheduler};
pub use status::{DeviceStatus, StatusEntry};
pub use storage::{DeviceInput, Storage};
pub use timer::{FirePayload, RequestId, ScheduleJob, TimerStore, WakePlatform};

// Re-export common utilities
pub use wol_common::*;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
