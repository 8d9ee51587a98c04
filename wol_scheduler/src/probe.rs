//! Best-effort TCP reachability probing

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinSet;

use crate::db::entities::DeviceModel;

/// Ports tried when the device has no explicit probe port: HTTP, RDP, SSH, HTTPS, SMB
pub const FALLBACK_PROBE_PORTS: [u16; 5] = [80, 3389, 22, 443, 445];

#[derive(Debug, Clone)]
pub struct ReachabilityProber {
    timeout: Duration,
}

impl Default for ReachabilityProber {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

impl ReachabilityProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Hosts worth probing: configured targets minus anything that looks like a broadcast address.
    pub fn candidate_hosts(device: &DeviceModel) -> Vec<String> {
        [device.internal_host.as_deref(), device.external_host.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|host| !host.is_empty() && !host.ends_with(".255"))
            .map(str::to_string)
            .collect()
    }

    pub fn candidate_ports(device: &DeviceModel) -> Vec<u16> {
        match device.status_probe_port.and_then(|p| u16::try_from(p).ok()) {
            Some(port) if port != 0 => vec![port],
            _ => FALLBACK_PROBE_PORTS.to_vec(),
        }
    }

    /// True as soon as any (host, port) pair accepts a TCP connection.
    pub async fn probe(&self, device: &DeviceModel) -> bool {
        let hosts = Self::candidate_hosts(device);
        if hosts.is_empty() {
            crate::trace!("[PROBE] {} has no probeable host", device.id);
            return false;
        }
        let reachable = self
            .probe_endpoints(&hosts, &Self::candidate_ports(device))
            .await;
        crate::trace!("[PROBE] {} reachable={}", device.id, reachable);
        reachable
    }

    pub async fn probe_endpoints(&self, hosts: &[String], ports: &[u16]) -> bool {
        let mut attempts = JoinSet::new();
        for host in hosts {
            for &port in ports {
                let host = host.clone();
                let timeout = self.timeout;
                attempts.spawn(async move {
                    matches!(
                        tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await,
                        Ok(Ok(_))
                    )
                });
            }
        }

        while let Some(result) = attempts.join_next().await {
            if let Ok(true) = result {
                attempts.abort_all();
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::net::TcpListener;

    fn device(internal: Option<&str>, external: Option<&str>, port: Option<i32>) -> DeviceModel {
        DeviceModel {
            id: "dev-1".to_string(),
            name: "Workstation".to_string(),
            mac: "001122334455".to_string(),
            internal_host: internal.map(str::to_string),
            internal_port: 9,
            external_host: external.map(str::to_string),
            external_port: 9,
            status_probe_port: port,
            last_seen_at: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_broadcast_hosts_are_excluded() {
        let d = device(Some("192.168.1.255"), Some("wan.example.org"), None);
        assert_eq!(ReachabilityProber::candidate_hosts(&d), vec!["wan.example.org"]);

        let d = device(Some("  "), None, None);
        assert!(ReachabilityProber::candidate_hosts(&d).is_empty());
    }

    #[test]
    fn test_explicit_port_overrides_fallback() {
        assert_eq!(
            ReachabilityProber::candidate_ports(&device(None, None, Some(8080))),
            vec![8080]
        );
        assert_eq!(
            ReachabilityProber::candidate_ports(&device(None, None, None)),
            FALLBACK_PROBE_PORTS.to_vec()
        );
    }

    #[tokio::test]
    async fn test_probe_detects_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let d = device(Some("127.0.0.1"), None, Some(port as i32));

        assert!(ReachabilityProber::default().probe(&d).await);
    }

    #[tokio::test]
    async fn test_probe_without_hosts_is_false() {
        let d = device(Some("10.0.0.255"), None, None);
        assert!(!ReachabilityProber::default().probe(&d).await);
    }

    #[tokio::test]
    async fn test_probe_closed_port_is_false() {
        // Bind then drop to get a port that is very likely closed
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let prober = ReachabilityProber::new(Duration::from_millis(200));
        assert!(!prober.probe_endpoints(&["127.0.0.1".to_string()], &[port]).await);
    }
}
