//! Time source abstraction

use std::fmt::Debug;

use chrono::{DateTime, Utc};

/// Supplies "now" to arming and fire handling so both can run against a fixed instant in tests.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
