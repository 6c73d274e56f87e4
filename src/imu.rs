//! Gyro/accelerometer pairing.
//!
//! Gyro and accelerometer samples arrive on independent streams. They are
//! joined through a single-slot rendezvous: the latest gyro meets the latest
//! accel. A sample that arrives while its own slot is still waiting for a
//! partner replaces the waiting one; those replacements are counted so the
//! loss is visible in the session summary.

use crate::stream::{MotionKind, Vector3};

/// A combined gyro + accel sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuRecord {
    /// Seconds, taken from the accelerometer sample of the pair.
    pub timestamp: f64,
    pub gyro: Vector3,
    pub accel: Vector3,
}

impl ImuRecord {
    /// `ts,gx,gy,gz,ax,ay,az` with 6 decimals, no trailing newline.
    pub fn to_csv_line(&self) -> String {
        format!(
            "{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            self.timestamp,
            self.gyro.x,
            self.gyro.y,
            self.gyro.z,
            self.accel.x,
            self.accel.y,
            self.accel.z
        )
    }
}

/// Pending half of an IMU pair.
#[derive(Debug, Clone, Default)]
pub struct PendingImu {
    timestamp: f64,
    gyro: Vector3,
    accel: Vector3,
    gyro_ready: bool,
    accel_ready: bool,
    overwritten_gyro: u64,
    overwritten_accel: u64,
}

impl PendingImu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer one sample. Returns a record once both halves are present.
    pub fn offer(
        &mut self,
        kind: MotionKind,
        timestamp: f64,
        value: Vector3,
    ) -> Option<ImuRecord> {
        match kind {
            MotionKind::Gyro => {
                if self.gyro_ready {
                    self.overwritten_gyro += 1;
                }
                self.gyro = value;
                self.gyro_ready = true;
            }
            MotionKind::Accel => {
                if self.accel_ready {
                    self.overwritten_accel += 1;
                }
                self.timestamp = timestamp;
                self.accel = value;
                self.accel_ready = true;
            }
        }

        if self.gyro_ready && self.accel_ready {
            self.gyro_ready = false;
            self.accel_ready = false;
            Some(ImuRecord {
                timestamp: self.timestamp,
                gyro: self.gyro,
                accel: self.accel,
            })
        } else {
            None
        }
    }

    /// True while one half is waiting for its partner.
    pub fn is_waiting(&self) -> bool {
        self.gyro_ready || self.accel_ready
    }

    /// Drop any waiting half.
    pub fn clear(&mut self) {
        self.gyro_ready = false;
        self.accel_ready = false;
    }

    /// Samples replaced before they were paired, as `(gyro, accel)`.
    pub fn overwritten(&self) -> (u64, u64) {
        (self.overwritten_gyro, self.overwritten_accel)
    }
}
