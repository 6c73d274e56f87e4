//! Sensor stream identities and the frames a frame source delivers.
//!
//! The device hands out opaque stream ids. They are bound to a
//! [`StreamRole`] once, when the pipeline starts, and the resulting
//! [`StreamMap`] is immutable for the rest of the session.

use crate::error::{CollectorError, Result};
use std::collections::HashMap;
use std::fmt;

/// Role a hardware stream plays in a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamRole {
    /// Left infrared imager (written to `cam0`).
    LeftInfrared,
    /// Right infrared imager (written to `cam1`).
    RightInfrared,
    /// Angular velocity, rad/s.
    Gyro,
    /// Linear acceleration, m/s^2.
    Accel,
}

impl StreamRole {
    pub const ALL: [StreamRole; 4] = [
        StreamRole::LeftInfrared,
        StreamRole::RightInfrared,
        StreamRole::Gyro,
        StreamRole::Accel,
    ];

    /// Directory / index name for video roles.
    pub fn camera_name(self) -> Option<&'static str> {
        match self {
            StreamRole::LeftInfrared => Some("cam0"),
            StreamRole::RightInfrared => Some("cam1"),
            StreamRole::Gyro | StreamRole::Accel => None,
        }
    }

    pub fn is_video(self) -> bool {
        self.camera_name().is_some()
    }

    /// Motion kind for IMU roles.
    pub fn motion_kind(self) -> Option<MotionKind> {
        match self {
            StreamRole::Gyro => Some(MotionKind::Gyro),
            StreamRole::Accel => Some(MotionKind::Accel),
            StreamRole::LeftInfrared | StreamRole::RightInfrared => None,
        }
    }
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamRole::LeftInfrared => "left infrared",
            StreamRole::RightInfrared => "right infrared",
            StreamRole::Gyro => "gyro",
            StreamRole::Accel => "accel",
        };
        f.write_str(name)
    }
}

/// The two halves of an IMU record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionKind {
    Gyro,
    Accel,
}

/// 3-axis motion sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Vector3 {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Binding from hardware stream id to [`StreamRole`].
#[derive(Debug, Clone, Default)]
pub struct StreamMap {
    roles: HashMap<i32, StreamRole>,
}

impl StreamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `stream_id` to `role`. Returns the role it was previously bound to.
    pub fn bind(&mut self, stream_id: i32, role: StreamRole) -> Option<StreamRole> {
        self.roles.insert(stream_id, role)
    }

    /// Role bound to `stream_id`, if any.
    pub fn role(&self, stream_id: i32) -> Option<StreamRole> {
        self.roles.get(&stream_id).copied()
    }

    /// Stream id bound to `role`, if any.
    pub fn stream_id(&self, role: StreamRole) -> Option<i32> {
        self.roles
            .iter()
            .find(|(_, r)| **r == role)
            .map(|(id, _)| *id)
    }

    /// Fail unless every role has a stream.
    pub fn require_all(&self) -> Result<()> {
        for role in StreamRole::ALL {
            if self.stream_id(role).is_none() {
                return Err(CollectorError::MissingStream(role));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Payload carried by a [`SensorFrame`].
#[derive(Debug, Clone, Copy)]
pub enum FramePayload<'a> {
    /// Single-channel 8-bit image, row-major, no padding.
    Video {
        width: u32,
        height: u32,
        pixels: &'a [u8],
    },
    /// Gyro or accelerometer reading.
    Motion(Vector3),
}

/// One frame as produced by the hardware pipeline.
///
/// Borrowed from the device buffer; it must not outlive the callback.
#[derive(Debug, Clone, Copy)]
pub struct SensorFrame<'a> {
    pub stream_id: i32,
    /// Hardware clock, milliseconds.
    pub timestamp_ms: f64,
    pub payload: FramePayload<'a>,
}

impl<'a> SensorFrame<'a> {
    pub fn video(
        stream_id: i32,
        timestamp_ms: f64,
        width: u32,
        height: u32,
        pixels: &'a [u8],
    ) -> Self {
        Self {
            stream_id,
            timestamp_ms,
            payload: FramePayload::Video {
                width,
                height,
                pixels,
            },
        }
    }

    pub fn motion(stream_id: i32, timestamp_ms: f64, value: Vector3) -> Self {
        Self {
            stream_id,
            timestamp_ms,
            payload: FramePayload::Motion(value),
        }
    }

    /// Timestamp in seconds.
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp_ms / 1000.0
    }
}
