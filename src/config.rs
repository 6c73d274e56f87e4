//! Collector configuration.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

/// Default UDP port of the command listener.
pub const CONTROL_PORT: u16 = 11111;
/// Default UDP port the operator listens on for discovery.
pub const OPERATOR_PORT: u16 = 6666;
/// Default operator host.
pub const OPERATOR_HOST: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 108);

/// Infrared stream format requested from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfraredProfile {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for InfraredProfile {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Runtime settings for one collector process.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Address the command listener binds.
    pub control_addr: SocketAddr,
    /// Where the discovery datagram goes.
    pub operator_addr: SocketAddr,
    /// Recording root; archived on stop.
    pub data_dir: PathBuf,
    /// Sleep between command polls.
    pub poll_interval: Duration,
    /// Delay between pipeline start and the discovery announcement.
    pub settle_delay: Duration,
    pub infrared: InfraredProfile,
    /// Gyro and accelerometer rate, Hz.
    pub motion_hz: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            control_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, CONTROL_PORT).into(),
            operator_addr: SocketAddrV4::new(OPERATOR_HOST, OPERATOR_PORT).into(),
            data_dir: PathBuf::from("./data"),
            poll_interval: Duration::from_millis(100),
            settle_delay: Duration::from_secs(3),
            infrared: InfraredProfile::default(),
            motion_hz: 200,
        }
    }
}

impl CollectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the command port (listens on all interfaces).
    pub fn control_port(mut self, port: u16) -> Self {
        self.control_addr.set_port(port);
        self
    }

    /// Set the full command listener address.
    pub fn control_addr(mut self, addr: SocketAddr) -> Self {
        self.control_addr = addr;
        self
    }

    /// Set the operator endpoint.
    pub fn operator(mut self, addr: SocketAddr) -> Self {
        self.operator_addr = addr;
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn infrared(mut self, width: u32, height: u32, fps: u32) -> Self {
        self.infrared = InfraredProfile { width, height, fps };
        self
    }

    pub fn motion_hz(mut self, hz: u32) -> Self {
        self.motion_hz = hz.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CollectorConfig::default();
        assert_eq!(config.control_addr, "0.0.0.0:11111".parse().unwrap());
        assert_eq!(config.operator_addr, "192.168.0.108:6666".parse().unwrap());
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.settle_delay, Duration::from_secs(3));
        assert_eq!(config.infrared, InfraredProfile { width: 640, height: 480, fps: 30 });
        assert_eq!(config.motion_hz, 200);
    }

    #[test]
    fn test_setters() {
        let config = CollectorConfig::new()
            .control_port(12000)
            .operator("10.0.0.2:7000".parse().unwrap())
            .data_dir("/tmp/run")
            .poll_interval(Duration::from_millis(20))
            .settle_delay(Duration::ZERO)
            .motion_hz(0);
        assert_eq!(config.control_addr, "0.0.0.0:12000".parse().unwrap());
        assert_eq!(config.operator_addr, "10.0.0.2:7000".parse().unwrap());
        assert_eq!(config.data_dir, PathBuf::from("/tmp/run"));
        assert_eq!(config.settle_delay, Duration::ZERO);
        assert_eq!(config.motion_hz, 1);
    }
}
