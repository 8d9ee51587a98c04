//! Wake-on-LAN magic packet codec and UDP sender

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

use crate::mac::MacAddress;
use crate::WolError;

/// Conventional Wake-on-LAN port
pub const DEFAULT_WOL_PORT: u16 = 9;

/// Global broadcast address, always included as a safety-net target
pub const GLOBAL_BROADCAST: &str = "255.255.255.255";

pub const MAGIC_PACKET_LEN: usize = 6 + 16 * 6;

/// Build the 102-byte payload: 6 x 0xFF then the MAC repeated 16 times.
pub fn build_packet(mac: &MacAddress) -> [u8; MAGIC_PACKET_LEN] {
    let mut packet = [0xFFu8; MAGIC_PACKET_LEN];
    let bytes = mac.bytes();
    for chunk in packet[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&bytes);
    }
    packet
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Internal,
    Broadcast,
    External,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Internal => write!(f, "internal"),
            TargetKind::Broadcast => write!(f, "broadcast"),
            TargetKind::External => write!(f, "external"),
        }
    }
}

/// One network destination for a magic packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeTarget {
    pub kind: TargetKind,
    pub host: String,
    pub port: u16,
}

impl WakeTarget {
    pub fn new(kind: TargetKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for WakeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.kind, self.host, self.port)
    }
}

/// Transmits a magic packet to one target.
///
/// Implementations never fail loudly: every I/O problem or timeout is reported as `false`
/// for that target only. Retries are not the sender's business.
#[async_trait]
pub trait PacketSender: Send + Sync + fmt::Debug {
    async fn send(&self, mac: MacAddress, target: &WakeTarget) -> bool;
}

/// UDP broadcast sender bounded by a per-attempt timeout (resolution included)
#[derive(Debug, Clone)]
pub struct UdpPacketSender {
    timeout: Duration,
}

impl UdpPacketSender {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn transmit(mac: &MacAddress, host: &str, port: u16) -> Result<usize, WolError> {
        let addr: SocketAddr = tokio::net::lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| WolError::Network(format!("No address resolved for {}", host)))?;

        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.set_broadcast(true)?;

        let packet = build_packet(mac);
        let sent = socket.send_to(&packet, addr).await?;
        if sent != packet.len() {
            return Err(WolError::Network(format!(
                "Short datagram to {}: {} of {} bytes",
                addr,
                sent,
                packet.len()
            )));
        }
        Ok(sent)
    }
}

impl Default for UdpPacketSender {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

#[async_trait]
impl PacketSender for UdpPacketSender {
    async fn send(&self, mac: MacAddress, target: &WakeTarget) -> bool {
        match tokio::time::timeout(self.timeout, Self::transmit(&mac, &target.host, target.port))
            .await
        {
            Ok(Ok(_)) => {
                crate::debug!("[MAGIC_PACKET] Dispatched to {} for {}", target, mac);
                true
            }
            Ok(Err(e)) => {
                crate::warn!("[MAGIC_PACKET] Dispatch failed for {}: {}", target, e);
                false
            }
            Err(_) => {
                crate::warn!(
                    "[MAGIC_PACKET] Dispatch to {} timed out after {:?}",
                    target,
                    self.timeout
                );
                false
            }
        }
    }
}

/// Parse `mac` and send one packet to `host:port`.
///
/// A malformed MAC is a hard input error; network failures fold into `Ok(false)`.
pub async fn send_magic_packet(
    mac: &str,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<bool, WolError> {
    let mac = MacAddress::parse_delimited(mac)?;
    let target = WakeTarget::new(TargetKind::Internal, host, port);
    Ok(UdpPacketSender::new(timeout).send(mac, &target).await)
}
