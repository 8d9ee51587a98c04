//! Wake dispatch: fan a magic packet out to every target of a device

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::magic_packet::{PacketSender, WakeTarget};
use crate::storage::Storage;
use crate::WolError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub target: WakeTarget,
    pub success: bool,
}

/// Per-target results of one dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub device_id: String,
    pub device_name: String,
    pub outcomes: Vec<TargetOutcome>,
}

impl DispatchReport {
    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(|o| o.success)
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }
}

impl fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} targets reached",
            self.device_name,
            self.succeeded(),
            self.outcomes.len()
        )
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("device {0} not found")]
    NotFound(String),
    #[error("device {device_id} has an unusable MAC address: {reason}")]
    InvalidMac { device_id: String, reason: String },
    #[error("failed to send wake packet ({0})")]
    AllTargetsFailed(DispatchReport),
    #[error("device lookup failed: {0}")]
    Storage(String),
}

impl From<DispatchError> for WolError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::NotFound(id) => WolError::NotFound(format!("Device {} not found", id)),
            DispatchError::InvalidMac { .. } => WolError::Validation(e.to_string()),
            DispatchError::AllTargetsFailed(_) => WolError::Network(e.to_string()),
            DispatchError::Storage(msg) => WolError::Database(msg),
        }
    }
}

/// Resolves a device's targets and sends to all of them concurrently.
///
/// Side-effect free apart from the packets: `last_seen_at` is the caller's business.
#[derive(Debug, Clone)]
pub struct WakeDispatcher {
    storage: Storage,
    sender: Arc<dyn PacketSender>,
}

impl WakeDispatcher {
    pub fn new(storage: Storage, sender: Arc<dyn PacketSender>) -> Self {
        Self { storage, sender }
    }

    pub async fn wake_device(&self, device_id: &str) -> Result<DispatchReport, DispatchError> {
        let device = self
            .storage
            .get_device(device_id)
            .await
            .map_err(|e| DispatchError::Storage(e.to_string()))?
            .ok_or_else(|| DispatchError::NotFound(device_id.to_string()))?;

        let mac = device
            .mac_address()
            .map_err(|e| DispatchError::InvalidMac {
                device_id: device.id.clone(),
                reason: e.to_string(),
            })?;

        let targets = device.wake_targets();
        let mut sends = JoinSet::new();
        for (index, target) in targets.iter().cloned().enumerate() {
            let sender = self.sender.clone();
            sends.spawn(async move { (index, sender.send(mac, &target).await) });
        }

        // Every send runs to completion; a panicking task only costs its own target
        let mut results = vec![false; targets.len()];
        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((index, success)) => results[index] = success,
                Err(e) => crate::error!("[DISPATCH] Send task for {} aborted: {}", device.id, e),
            }
        }

        let report = DispatchReport {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            outcomes: targets
                .into_iter()
                .zip(results)
                .map(|(target, success)| TargetOutcome { target, success })
                .collect(),
        };

        if report.any_succeeded() {
            crate::info!("[DISPATCH] Wake sent to {}", report);
            Ok(report)
        } else {
            crate::warn!("[DISPATCH] Wake failed for {}", report);
            Err(DispatchError::AllTargetsFailed(report))
        }
    }
}
