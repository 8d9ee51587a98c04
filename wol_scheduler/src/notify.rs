//! User-visible notifications

use std::fmt::Debug;

pub trait Notifier: Send + Sync + Debug {
    /// Whether the user allows notifications at all
    fn is_permitted(&self) -> bool {
        true
    }

    fn wake_sent(&self, device_name: &str);
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn wake_sent(&self, device_name: &str) {
        crate::info!("[NOTIFY] wake packet sent to {}", device_name);
    }
}

/// Fire-and-forget; silently skipped without permission.
pub fn notify_wake_sent(notifier: &dyn Notifier, device_name: &str) {
    if notifier.is_permitted() {
        notifier.wake_sent(device_name);
    }
}
