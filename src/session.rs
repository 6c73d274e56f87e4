//! Shared recording state.
//!
//! The frame-source thread and the control loop share one
//! [`SessionContext`]. A single mutex guards the `active` flag, the pending
//! IMU half and the open logs, so a frame either sees the session inactive
//! and does nothing, or sees it active and completes its writes before a
//! stop can take effect.

use crate::imu::PendingImu;
use crate::stream::{MotionKind, StreamRole, Vector3};
use crate::writer::SessionWriters;
use std::sync::{Mutex, MutexGuard};

/// Per-session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub left_frames: u64,
    pub right_frames: u64,
    pub imu_records: u64,
    /// Frames or records that could not be persisted.
    pub write_failures: u64,
    /// Motion samples replaced before they were paired.
    pub overwritten_gyro: u64,
    pub overwritten_accel: u64,
}

impl SessionStats {
    pub fn log_summary(&self) {
        tracing::info!(
            "Session summary: cam0={} cam1={} imu={} write_failures={} unpaired gyro={} accel={}",
            self.left_frames,
            self.right_frames,
            self.imu_records,
            self.write_failures,
            self.overwritten_gyro,
            self.overwritten_accel
        );
    }
}

struct SessionState {
    active: bool,
    pending: PendingImu,
    writers: Option<SessionWriters>,
    stats: SessionStats,
}

/// Recording state shared between capture and control.
pub struct SessionContext {
    state: Mutex<SessionState>,
}

impl SessionContext {
    /// New, inactive session writing to `writers`.
    pub fn new(writers: SessionWriters) -> Self {
        Self {
            state: Mutex::new(SessionState {
                active: false,
                pending: PendingImu::new(),
                writers: Some(writers),
                stats: SessionStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Recover from a panicked holder.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Set the recording flag. Returns the previous value.
    ///
    /// Has no effect once the session is closed.
    pub fn set_active(&self, active: bool) -> bool {
        let mut state = self.lock();
        let previous = state.active;
        state.active = active && state.writers.is_some();
        previous
    }

    /// Persist one infrared frame if recording.
    pub fn record_video(
        &self,
        role: StreamRole,
        timestamp: f64,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.active {
            return;
        }
        let Some(writer) = state.writers.as_mut().and_then(|w| w.image(role)) else {
            return;
        };
        match writer.write(timestamp, width, height, pixels) {
            Ok(_) => match role {
                StreamRole::LeftInfrared => state.stats.left_frames += 1,
                _ => state.stats.right_frames += 1,
            },
            Err(e) => {
                state.stats.write_failures += 1;
                tracing::warn!("Dropping {} frame at {:.6}: {}", role, timestamp, e);
            }
        }
    }

    /// Feed one motion sample to the IMU pairing; persists completed pairs.
    pub fn record_motion(&self, kind: MotionKind, timestamp: f64, value: Vector3) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.active {
            return;
        }
        let Some(record) = state.pending.offer(kind, timestamp, value) else {
            return;
        };
        let Some(writers) = state.writers.as_mut() else {
            return;
        };
        match writers.imu.append(&record) {
            Ok(()) => state.stats.imu_records += 1,
            Err(e) => {
                state.stats.write_failures += 1;
                tracing::warn!("Dropping IMU record at {:.6}: {}", record.timestamp, e);
            }
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> SessionStats {
        let state = self.lock();
        let (overwritten_gyro, overwritten_accel) = state.pending.overwritten();
        SessionStats {
            overwritten_gyro,
            overwritten_accel,
            ..state.stats
        }
    }

    /// Stop recording, flush and release the logs. Later frames are ignored.
    pub fn close(&self) -> SessionStats {
        let mut state = self.lock();
        state.active = false;
        state.pending.clear();
        if let Some(mut writers) = state.writers.take() {
            if let Err(e) = writers.flush() {
                tracing::warn!("Failed to flush session logs: {}", e);
            }
        }
        let (overwritten_gyro, overwritten_accel) = state.pending.overwritten();
        SessionStats {
            overwritten_gyro,
            overwritten_accel,
            ..state.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DataLayout;
    use std::fs;

    fn session_in(tmp: &tempfile::TempDir) -> (DataLayout, SessionContext) {
        let layout = DataLayout::new(tmp.path().join("data"));
        layout.bootstrap().unwrap();
        let writers = SessionWriters::open(&layout).unwrap();
        (layout, SessionContext::new(writers))
    }

    fn count_files(dir: &std::path::Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_inactive_session_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let (layout, session) = session_in(&tmp);
        let pixels = vec![7u8; 16];

        for i in 0..10 {
            let ts = i as f64 * 0.01;
            session.record_video(StreamRole::LeftInfrared, ts, 4, 4, &pixels);
            session.record_motion(MotionKind::Gyro, ts, Vector3::default());
            session.record_motion(MotionKind::Accel, ts, Vector3::default());
        }

        assert_eq!(session.stats(), SessionStats::default());
        assert_eq!(count_files(&layout.image_dir(StreamRole::LeftInfrared).unwrap()), 0);
        assert!(fs::read_to_string(layout.imu_log()).unwrap().is_empty());
    }

    #[test]
    fn test_active_session_records() {
        let tmp = tempfile::tempdir().unwrap();
        let (layout, session) = session_in(&tmp);
        assert!(!session.set_active(true));
        assert!(session.is_active());

        let pixels = vec![1u8; 16];
        session.record_video(StreamRole::LeftInfrared, 1.0, 4, 4, &pixels);
        session.record_video(StreamRole::RightInfrared, 1.0, 4, 4, &pixels);
        session.record_video(StreamRole::RightInfrared, 1.033, 4, 4, &pixels);
        session.record_motion(MotionKind::Accel, 1.0, Vector3::new(0.0, -9.8, 0.0));
        session.record_motion(MotionKind::Gyro, 1.001, Vector3::new(0.1, 0.0, 0.0));

        let stats = session.stats();
        assert_eq!(stats.left_frames, 1);
        assert_eq!(stats.right_frames, 2);
        assert_eq!(stats.imu_records, 1);
        assert_eq!(count_files(&layout.image_dir(StreamRole::RightInfrared).unwrap()), 2);

        let imu = fs::read_to_string(layout.imu_log()).unwrap();
        assert_eq!(
            imu,
            "1.000000,0.100000,0.000000,0.000000,0.000000,-9.800000,0.000000\n"
        );
    }

    #[test]
    fn test_bad_frame_does_not_stop_session() {
        let tmp = tempfile::tempdir().unwrap();
        let (_layout, session) = session_in(&tmp);
        session.set_active(true);

        session.record_video(StreamRole::LeftInfrared, 1.0, 4, 4, &[0u8; 3]);
        session.record_video(StreamRole::LeftInfrared, 1.1, 4, 4, &[0u8; 16]);

        let stats = session.stats();
        assert_eq!(stats.write_failures, 1);
        assert_eq!(stats.left_frames, 1);
        assert!(session.is_active());
    }

    #[test]
    fn test_pending_half_dropped_while_inactive() {
        let tmp = tempfile::tempdir().unwrap();
        let (layout, session) = session_in(&tmp);
        session.record_motion(MotionKind::Accel, 0.5, Vector3::default());
        session.set_active(true);
        session.record_motion(MotionKind::Gyro, 0.6, Vector3::default());
        assert_eq!(session.stats().imu_records, 0);
        session.record_motion(MotionKind::Accel, 0.7, Vector3::default());
        assert_eq!(session.stats().imu_records, 1);

        let imu = fs::read_to_string(layout.imu_log()).unwrap();
        assert!(imu.starts_with("0.700000,"));
    }

    #[test]
    fn test_close_stops_all_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let (layout, session) = session_in(&tmp);
        session.set_active(true);
        session.record_motion(MotionKind::Gyro, 0.0, Vector3::default());
        session.record_motion(MotionKind::Gyro, 0.1, Vector3::default());

        let stats = session.close();
        assert_eq!(stats.overwritten_gyro, 1);
        assert!(!session.is_active());

        // Cannot be restarted once closed.
        session.set_active(true);
        assert!(!session.is_active());
        session.record_video(StreamRole::LeftInfrared, 2.0, 4, 4, &[0u8; 16]);
        session.record_motion(MotionKind::Accel, 2.0, Vector3::default());
        assert_eq!(count_files(&layout.image_dir(StreamRole::LeftInfrared).unwrap()), 0);
        assert!(fs::read_to_string(layout.imu_log()).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_capture_and_control() {
        use std::sync::Arc;

        let tmp = tempfile::tempdir().unwrap();
        let (layout, session) = session_in(&tmp);
        let session = Arc::new(session);
        session.set_active(true);

        let capture = {
            let session = session.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    let ts = i as f64 * 0.005;
                    session.record_motion(MotionKind::Accel, ts, Vector3::default());
                    session.record_motion(MotionKind::Gyro, ts, Vector3::default());
                }
            })
        };
        for _ in 0..50 {
            session.set_active(true);
            std::thread::yield_now();
        }
        capture.join().unwrap();

        let stats = session.close();
        let lines = fs::read_to_string(layout.imu_log()).unwrap().lines().count() as u64;
        assert_eq!(stats.imu_records, 500);
        assert_eq!(lines, stats.imu_records);
    }
}
