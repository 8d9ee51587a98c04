//! Reachability status cache refreshed by periodic probing

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::clock::Clock;
use crate::probe::ReachabilityProber;
use crate::storage::Storage;
use crate::WolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Not probed yet
    Unknown,
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: DeviceStatus,
    pub checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct StatusMonitorInner {
    storage: Storage,
    prober: ReachabilityProber,
    clock: Arc<dyn Clock>,
    entries: DashMap<String, StatusEntry>,
}

#[derive(Debug, Clone)]
pub struct StatusMonitor(Arc<StatusMonitorInner>);

impl StatusMonitor {
    pub fn new(storage: Storage, prober: ReachabilityProber, clock: Arc<dyn Clock>) -> Self {
        StatusMonitor(Arc::new(StatusMonitorInner {
            storage,
            prober,
            clock,
            entries: DashMap::new(),
        }))
    }

    pub fn status(&self, device_id: &str) -> StatusEntry {
        self.0
            .entries
            .get(device_id)
            .map(|entry| entry.value().clone())
            .unwrap_or(StatusEntry {
                status: DeviceStatus::Unknown,
                checked_at: None,
            })
    }

    pub fn forget(&self, device_id: &str) {
        self.0.entries.remove(device_id);
    }

    /// Probe every device in parallel and record the results. Returns how many are online.
    pub async fn refresh_all(&self) -> Result<usize, WolError> {
        let devices = self.0.storage.list_devices().await?;
        let mut probes = JoinSet::new();
        for device in devices {
            let prober = self.0.prober.clone();
            probes.spawn(async move {
                let reachable = prober.probe(&device).await;
                (device.id, reachable)
            });
        }

        let mut online = 0;
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((device_id, reachable)) => {
                    if reachable {
                        online += 1;
                    }
                    self.0.entries.insert(
                        device_id,
                        StatusEntry {
                            status: if reachable {
                                DeviceStatus::Online
                            } else {
                                DeviceStatus::Offline
                            },
                            checked_at: Some(self.0.clock.now()),
                        },
                    );
                }
                Err(e) => crate::warn!("[STATUS] Probe task failed: {}", e),
            }
        }

        crate::debug!("[STATUS] Refresh complete, {} online", online);
        Ok(online)
    }
}
