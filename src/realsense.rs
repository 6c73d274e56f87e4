//! Intel RealSense stereo infrared + IMU capture.
//!
//! Configures a D4xx-class device for the two infrared imagers (Y8) plus the
//! gyro and accelerometer (MotionXyz32F), resolves the hardware stream ids
//! once from the active profile, and routes the members of each composite to
//! the [`FrameRouter`] in the order the device delivered them.

use crate::config::CollectorConfig;
use crate::router::{FrameRouter, FrameSetMember};
use crate::source::{ActiveSource, FrameSource};
use crate::stream::{SensorFrame, StreamMap, StreamRole, Vector3};
use anyhow::Result;
use realsense_rust::{
    config::Config,
    context::Context,
    frame::CompositeFrame,
    kind::{Rs2CameraInfo, Rs2Format, Rs2Option, Rs2StreamKind},
    pipeline::{ActivePipeline, InactivePipeline},
};
use realsense_sys as sys;
use std::ptr::NonNull;
use std::time::Duration;

const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// RealSense-backed [`FrameSource`].
pub struct RealSenseSource {
    width: u32,
    height: u32,
    fps: u32,
    motion_hz: u32,
}

impl RealSenseSource {
    pub fn new(config: &CollectorConfig) -> Self {
        Self {
            width: config.infrared.width,
            height: config.infrared.height,
            fps: config.infrared.fps,
            motion_hz: config.motion_hz,
        }
    }

    fn pipeline_config(&self) -> Result<Config> {
        let mut config = Config::new();
        config.disable_all_streams()?;
        config.enable_stream(
            Rs2StreamKind::Gyro,
            None,
            0,
            0,
            Rs2Format::MotionXyz32F,
            self.motion_hz as usize,
        )?;
        config.enable_stream(
            Rs2StreamKind::Accel,
            None,
            0,
            0,
            Rs2Format::MotionXyz32F,
            self.motion_hz as usize,
        )?;
        for index in [1, 2] {
            config.enable_stream(
                Rs2StreamKind::Infrared,
                Some(index),
                self.width as usize,
                self.height as usize,
                Rs2Format::Y8,
                self.fps as usize,
            )?;
        }
        Ok(config)
    }
}

impl FrameSource for RealSenseSource {
    fn name(&self) -> &str {
        "realsense"
    }

    fn start(self: Box<Self>) -> Result<(StreamMap, Box<dyn ActiveSource>)> {
        let context = Context::new()?;
        let pipeline = InactivePipeline::try_from(&context)?;
        let pipeline = pipeline.start(Some(self.pipeline_config()?))?;

        let streams = resolve_streams(&pipeline)?;
        configure_sensors(&pipeline);

        Ok((streams, Box::new(RealSenseStream { pipeline: Some(pipeline) })))
    }
}

/// Bind each enabled stream profile's unique id to its role.
fn resolve_streams(pipeline: &ActivePipeline) -> Result<StreamMap> {
    let mut streams = StreamMap::new();
    for profile in pipeline.profile().streams() {
        tracing::info!(
            "Stream profile {:?}[{}] index {}, format {:?} at {} fps",
            profile.kind(),
            profile.unique_id(),
            profile.index(),
            profile.format(),
            profile.framerate()
        );
        let role = match (profile.kind(), profile.index()) {
            (Rs2StreamKind::Infrared, 1) => StreamRole::LeftInfrared,
            (Rs2StreamKind::Infrared, 2) => StreamRole::RightInfrared,
            (Rs2StreamKind::Gyro, _) => StreamRole::Gyro,
            (Rs2StreamKind::Accel, _) => StreamRole::Accel,
            _ => continue,
        };
        streams.bind(profile.unique_id(), role);
    }
    streams.require_all()?;
    Ok(streams)
}

/// Apply the per-sensor options used for stereo recordings.
///
/// Sensors are configured in enumeration order: stereo module (auto exposure,
/// emitter off), RGB module (fixed exposure), motion module (raw samples).
/// Options a sensor rejects are only logged.
fn configure_sensors(pipeline: &ActivePipeline) {
    let device = pipeline.profile().device();
    let named = device
        .sensors()
        .into_iter()
        .filter_map(|sensor| {
            let name = sensor.info(Rs2CameraInfo::Name)?.to_string_lossy().to_string();
            Some((name, sensor))
        });

    for (position, (name, mut sensor)) in named.enumerate() {
        let options: &[(Rs2Option, f32)] = match position {
            0 => &[
                (Rs2Option::EnableAutoExposure, 1.0),
                (Rs2Option::AutoExposureLimit, 5000.0),
                (Rs2Option::EmitterEnabled, 0.0),
            ],
            1 => &[(Rs2Option::Exposure, 100.0)],
            2 => &[(Rs2Option::EnableMotionCorrection, 0.0)],
            _ => &[],
        };
        tracing::info!("Configuring sensor {}", name);
        for &(option, value) in options {
            if let Err(e) = sensor.set_option(option, value) {
                tracing::warn!("[{}] Failed to set {:?}={}: {}", name, option, value, e);
            }
        }
    }
}

struct RealSenseStream {
    pipeline: Option<ActivePipeline>,
}

impl ActiveSource for RealSenseStream {
    fn pump(&mut self, router: &FrameRouter) -> Result<()> {
        let pipeline = self
            .pipeline
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("pipeline already stopped"))?;
        let composite: CompositeFrame = pipeline.wait(Some(FRAME_TIMEOUT))?;
        let members = composite_members(&composite)?;
        router.on_members(&members);
        Ok(())
    }

    fn stop(mut self: Box<Self>) {
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.stop();
        }
    }
}

/// Borrow the raw `rs2_frame` behind a composite.
/// `CompositeFrame` has a single `NonNull<rs2_frame>` field.
/// The returned pointer stays owned by `composite`; do NOT release it.
unsafe fn raw_composite(composite: &CompositeFrame) -> *mut sys::rs2_frame {
    std::mem::transmute_copy::<CompositeFrame, *mut sys::rs2_frame>(composite)
}

/// Members of a composite in delivery order. Each holds its own reference.
fn composite_members(composite: &CompositeFrame) -> Result<Vec<MemberFrame>> {
    unsafe {
        let raw = raw_composite(composite);
        let mut err: *mut sys::rs2_error = std::ptr::null_mut();
        let count = sys::rs2_embedded_frames_count(raw, &mut err);
        check(err, "count composite members")?;

        let mut members = Vec::with_capacity(count.max(0) as usize);
        for index in 0..count {
            let frame = sys::rs2_extract_frame(raw, index, &mut err);
            check(err, "extract composite member")?;
            if let Some(frame) = NonNull::new(frame) {
                members.push(MemberFrame(frame));
            }
        }
        Ok(members)
    }
}

/// One member extracted from a composite.
struct MemberFrame(NonNull<sys::rs2_frame>);

impl Drop for MemberFrame {
    fn drop(&mut self) {
        unsafe { sys::rs2_release_frame(self.0.as_ptr()) }
    }
}

impl MemberFrame {
    /// Decode by stream kind. Streams and formats that are not recorded give `None`.
    unsafe fn read(&self) -> Result<Option<SensorFrame<'_>>> {
        let frame = self.0.as_ptr();
        let mut err: *mut sys::rs2_error = std::ptr::null_mut();

        let profile = sys::rs2_get_frame_stream_profile(frame, &mut err);
        check(err, "read frame profile")?;
        let mut stream = sys::rs2_stream_RS2_STREAM_ANY;
        let mut format = sys::rs2_format_RS2_FORMAT_ANY;
        let (mut index, mut unique_id, mut framerate) = (0, 0, 0);
        sys::rs2_get_stream_profile_data(
            profile,
            &mut stream,
            &mut format,
            &mut index,
            &mut unique_id,
            &mut framerate,
            &mut err,
        );
        check(err, "read stream profile")?;

        let timestamp_ms = sys::rs2_get_frame_timestamp(frame, &mut err);
        check(err, "read frame timestamp")?;
        let data = sys::rs2_get_frame_data(frame, &mut err) as *const u8;
        check(err, "read frame data")?;
        let size = sys::rs2_get_frame_data_size(frame, &mut err);
        check(err, "read frame size")?;
        if data.is_null() || size <= 0 {
            return Ok(None);
        }
        // Borrowed for as long as this member holds its reference.
        let bytes = std::slice::from_raw_parts(data, size as usize);

        let decoded = match (stream, format) {
            (sys::rs2_stream_RS2_STREAM_INFRARED, sys::rs2_format_RS2_FORMAT_Y8) => {
                let width = sys::rs2_get_frame_width(frame, &mut err);
                check(err, "read frame width")?;
                let height = sys::rs2_get_frame_height(frame, &mut err);
                check(err, "read frame height")?;
                Some(SensorFrame::video(
                    unique_id,
                    timestamp_ms,
                    width.max(0) as u32,
                    height.max(0) as u32,
                    bytes,
                ))
            }
            (
                sys::rs2_stream_RS2_STREAM_GYRO | sys::rs2_stream_RS2_STREAM_ACCEL,
                sys::rs2_format_RS2_FORMAT_MOTION_XYZ32F,
            ) if bytes.len() >= 12 => Some(SensorFrame::motion(
                unique_id,
                timestamp_ms,
                motion_vector(bytes),
            )),
            _ => None,
        };
        Ok(decoded)
    }
}

impl FrameSetMember for MemberFrame {
    fn decode(&self) -> Option<SensorFrame<'_>> {
        match unsafe { self.read() } {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Skipping composite member: {}", e);
                None
            }
        }
    }
}

/// Three native-endian `f32`s.
fn motion_vector(bytes: &[u8]) -> Vector3 {
    let mut axes = [0f32; 3];
    for (axis, chunk) in axes.iter_mut().zip(bytes.chunks_exact(4)) {
        *axis = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Vector3::from(axes)
}

/// Turn a pending `rs2_error` into an `Err`, freeing it.
unsafe fn check(err: *mut sys::rs2_error, what: &str) -> Result<()> {
    if err.is_null() {
        return Ok(());
    }
    let msg = rs2_error_message(err);
    sys::rs2_free_error(err);
    Err(anyhow::anyhow!("Failed to {}: {}", what, msg))
}

unsafe fn rs2_error_message(err: *const sys::rs2_error) -> String {
    let ptr = sys::rs2_get_error_message(err);
    if ptr.is_null() {
        "unknown error".to_string()
    } else {
        std::ffi::CStr::from_ptr(ptr).to_string_lossy().to_string()
    }
}
