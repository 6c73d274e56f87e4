//! Sensor collector - network-controlled stereo infrared + IMU recorder.
//!
//! Captures the two infrared imagers and the gyro/accelerometer of a depth
//! camera, pairs the motion samples into IMU records and writes everything
//! under `data/`. Recording is started and stopped remotely over UDP; on
//! start-up the collector announces itself to the operator.
//!
//! # Example
//!
//! ```rust,no_run
//! use sensor_collector::{CollectorConfig, DataLayout, SessionContext, SessionWriters};
//!
//! let config = CollectorConfig::default();
//! let layout = DataLayout::new(&config.data_dir);
//! layout.bootstrap().unwrap();
//! let session = SessionContext::new(SessionWriters::open(&layout).unwrap());
//! session.set_active(true);
//! ```

pub mod config;
pub mod control;
pub mod discovery;
pub mod error;
pub mod imu;
pub mod layout;
pub mod router;
pub mod session;
pub mod source;
pub mod stream;
pub mod synthetic;
pub mod writer;

#[cfg(feature = "realsense")]
pub mod realsense;

pub use config::CollectorConfig;
pub use control::{ControlChannel, ControlCommand, ControlOutcome, ControlState};
pub use error::CollectorError;
pub use imu::{ImuRecord, PendingImu};
pub use layout::DataLayout;
pub use router::{FrameRouter, FrameSetMember};
pub use session::{SessionContext, SessionStats};
pub use source::{spawn_capture, ActiveSource, CaptureHandle, FrameSource};
pub use stream::{SensorFrame, StreamMap, StreamRole, Vector3};
pub use synthetic::SyntheticSource;
pub use writer::SessionWriters;

#[cfg(feature = "realsense")]
pub use realsense::RealSenseSource;
