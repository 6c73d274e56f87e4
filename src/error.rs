//! Error types for the capture engine.

use crate::stream::StreamRole;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the capture, persistence and control layers.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The control socket could not be bound.
    #[error("failed to bind control socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// An output directory could not be created.
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An index or IMU log could not be opened.
    #[error("failed to open log {}: {source}", .path.display())]
    OpenLog {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A line could not be appended to a log.
    #[error("failed to append to {}: {source}", .path.display())]
    Append {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Image serialization failed.
    #[error("failed to write image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    /// Pixel buffer does not match the advertised frame size.
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// The finished session directory could not be renamed.
    #[error("failed to archive {} to {}: {source}", .from.display(), .to.display())]
    Archive {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    /// The discovery datagram could not be sent.
    #[error("failed to announce to {addr}: {source}")]
    Discovery {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The device did not expose a stream the session needs.
    #[error("device did not provide a {0} stream")]
    MissingStream(StreamRole),
}

/// Result alias for [`CollectorError`].
pub type Result<T> = std::result::Result<T, CollectorError>;
