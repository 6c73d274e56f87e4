//! Synthetic frame source - simulates the stereo infrared + IMU device.
//!
//! Drop-in replacement for the RealSense source that needs no hardware.
//! Emits both infrared streams at the configured frame rate (a moving
//! gradient) and gyro/accel samples at the motion rate, with a little noise
//! on top of gravity. Timestamps follow a simulated device clock in
//! milliseconds starting at zero.

use crate::config::CollectorConfig;
use crate::router::FrameRouter;
use crate::source::{ActiveSource, FrameSource};
use crate::stream::{SensorFrame, StreamMap, StreamRole, Vector3};
use anyhow::Result;
use rand::Rng;
use std::time::{Duration, Instant};

const LEFT_ID: i32 = 1;
const RIGHT_ID: i32 = 2;
const ACCEL_ID: i32 = 3;
const GYRO_ID: i32 = 4;

const GRAVITY: f32 = 9.80665;

/// Hardware-free [`FrameSource`].
pub struct SyntheticSource {
    width: u32,
    height: u32,
    fps: u32,
    motion_hz: u32,
    realtime: bool,
}

impl SyntheticSource {
    pub fn new(config: &CollectorConfig) -> Self {
        Self {
            width: config.infrared.width,
            height: config.infrared.height,
            fps: config.infrared.fps.max(1),
            motion_hz: config.motion_hz.max(1),
            realtime: true,
        }
    }

    /// Produce ticks back-to-back instead of pacing them to the wall clock.
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn start(self: Box<Self>) -> Result<(StreamMap, Box<dyn ActiveSource>)> {
        let mut streams = StreamMap::new();
        streams.bind(LEFT_ID, StreamRole::LeftInfrared);
        streams.bind(RIGHT_ID, StreamRole::RightInfrared);
        streams.bind(ACCEL_ID, StreamRole::Accel);
        streams.bind(GYRO_ID, StreamRole::Gyro);

        tracing::info!(
            "Synthetic infrared {}x{}@{}fps, motion @{}Hz",
            self.width,
            self.height,
            self.fps,
            self.motion_hz
        );

        let active = SyntheticStream {
            pixels: vec![0; self.width as usize * self.height as usize],
            width: self.width,
            height: self.height,
            fps: self.fps,
            motion_hz: self.motion_hz,
            realtime: self.realtime,
            tick: 0,
            started: Instant::now(),
        };
        Ok((streams, Box::new(active)))
    }
}

struct SyntheticStream {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    fps: u32,
    motion_hz: u32,
    realtime: bool,
    tick: u64,
    started: Instant,
}

impl SyntheticStream {
    /// Wall-clock offset of `tick` from the start of the stream.
    fn tick_offset(&self, tick: u64) -> Duration {
        Duration::from_secs_f64(tick as f64 / self.motion_hz as f64)
    }

    /// True when a video frame falls inside the current motion tick.
    fn video_due(&self) -> bool {
        let fps = self.fps as u64;
        let hz = self.motion_hz as u64;
        self.tick == 0 || (self.tick * fps) / hz != ((self.tick - 1) * fps) / hz
    }

    fn render(&mut self, frame_index: u64) {
        let width = self.width as usize;
        let shift = frame_index as usize;
        for (i, px) in self.pixels.iter_mut().enumerate() {
            let (x, y) = (i % width, i / width);
            *px = ((x + y + shift) % 256) as u8;
        }
    }
}

impl ActiveSource for SyntheticStream {
    fn pump(&mut self, router: &FrameRouter) -> Result<()> {
        if self.realtime {
            let due = self.started + self.tick_offset(self.tick);
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }

        let timestamp_ms = self.tick as f64 * 1000.0 / self.motion_hz as f64;

        if self.video_due() {
            let frame_index = self.tick * self.fps as u64 / self.motion_hz as u64;
            self.render(frame_index);
            router.on_frameset([
                SensorFrame::video(LEFT_ID, timestamp_ms, self.width, self.height, &self.pixels),
                SensorFrame::video(RIGHT_ID, timestamp_ms, self.width, self.height, &self.pixels),
            ]);
        }

        let mut rng = rand::rng();
        let accel = Vector3::new(
            rng.random_range(-0.05..0.05),
            -GRAVITY + rng.random_range(-0.05..0.05),
            rng.random_range(-0.05..0.05),
        );
        let gyro = Vector3::new(
            rng.random_range(-0.01..0.01),
            rng.random_range(-0.01..0.01),
            rng.random_range(-0.01..0.01),
        );
        router.on_frame(&SensorFrame::motion(ACCEL_ID, timestamp_ms, accel));
        router.on_frame(&SensorFrame::motion(GYRO_ID, timestamp_ms + 0.5, gyro));

        self.tick += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DataLayout;
    use crate::session::SessionContext;
    use crate::writer::SessionWriters;
    use std::sync::Arc;

    #[test]
    fn test_synthetic_rates() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path().join("data"));
        layout.bootstrap().unwrap();
        let session = Arc::new(SessionContext::new(SessionWriters::open(&layout).unwrap()));
        session.set_active(true);

        let config = CollectorConfig::new().infrared(8, 4, 30).motion_hz(200);
        let source = Box::new(SyntheticSource::new(&config).unpaced());
        let (streams, mut active) = source.start().unwrap();
        assert!(streams.require_all().is_ok());

        let router = FrameRouter::new(session.clone(), streams);
        // One simulated second.
        for _ in 0..200 {
            active.pump(&router).unwrap();
        }

        let stats = session.stats();
        assert_eq!(stats.imu_records, 200);
        assert_eq!(stats.left_frames, 30);
        assert_eq!(stats.right_frames, 30);
        assert_eq!(stats.write_failures, 0);

        let first = std::fs::read_to_string(layout.imu_log()).unwrap();
        assert!(first.starts_with("0.000000,"));
    }

    #[test]
    fn test_tick_offset_past_u32_range() {
        let stream = SyntheticStream {
            pixels: Vec::new(),
            width: 8,
            height: 4,
            fps: 30,
            motion_hz: 200,
            realtime: true,
            tick: 0,
            started: Instant::now(),
        };

        assert_eq!(stream.tick_offset(200), Duration::from_secs(1));
        let tick = u32::MAX as u64 + 200;
        let expected = tick as f64 / 200.0;
        assert!((stream.tick_offset(tick).as_secs_f64() - expected).abs() < 1e-3);
    }
}
