//! One-shot readiness announcement to the operator.

use crate::error::{CollectorError, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

/// Prefix of the discovery payload.
pub const DISCOVERY_PREFIX: &str = "SensorCollector:";

/// `SensorCollector:<ip>`.
pub fn discovery_message(local_ip: Ipv4Addr) -> String {
    format!("{}{}", DISCOVERY_PREFIX, local_ip)
}

/// IPv4 address of the interface that routes to `target`.
///
/// Connecting a UDP socket sends nothing; it only asks the kernel for a
/// route. Falls back to loopback when no non-loopback IPv4 route exists.
pub async fn local_ipv4(target: SocketAddr) -> Ipv4Addr {
    match route_source(target).await {
        Ok(SocketAddr::V4(addr)) if !addr.ip().is_loopback() && !addr.ip().is_unspecified() => {
            *addr.ip()
        }
        Ok(addr) => {
            tracing::debug!("No routable IPv4 toward {} (got {}), using loopback", target, addr);
            Ipv4Addr::LOCALHOST
        }
        Err(e) => {
            tracing::debug!("Route lookup toward {} failed: {}, using loopback", target, e);
            Ipv4Addr::LOCALHOST
        }
    }
}

async fn route_source(target: SocketAddr) -> std::io::Result<SocketAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.connect(target).await?;
    socket.local_addr()
}

/// Send the discovery datagram once.
pub async fn announce(operator: SocketAddr, local_ip: Ipv4Addr) -> Result<()> {
    let bind: SocketAddr = match operator.ip() {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let message = discovery_message(local_ip);
    let socket = UdpSocket::bind(bind)
        .await
        .map_err(|source| CollectorError::Discovery {
            addr: operator,
            source,
        })?;
    socket
        .send_to(message.as_bytes(), operator)
        .await
        .map_err(|source| CollectorError::Discovery {
            addr: operator,
            source,
        })?;
    tracing::info!("Announced \"{}\" to {}", message, operator);
    Ok(())
}
