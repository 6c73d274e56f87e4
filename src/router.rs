//! Frame demultiplexing on the capture thread.

use crate::session::SessionContext;
use crate::stream::{FramePayload, SensorFrame, StreamMap};
use std::sync::Arc;

/// A member of a device frame set, decoded on demand.
pub trait FrameSetMember {
    /// Routable view of the member, or `None` for a stream that is not recorded.
    fn decode(&self) -> Option<SensorFrame<'_>>;
}

/// Routes each hardware frame to its writer or to the IMU pairing.
///
/// Cheap to clone; clones share the session and the stream map.
#[derive(Clone)]
pub struct FrameRouter {
    session: Arc<SessionContext>,
    streams: Arc<StreamMap>,
}

impl FrameRouter {
    pub fn new(session: Arc<SessionContext>, streams: StreamMap) -> Self {
        Self {
            session,
            streams: Arc::new(streams),
        }
    }

    pub fn streams(&self) -> &StreamMap {
        &self.streams
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Route a single frame.
    pub fn on_frame(&self, frame: &SensorFrame<'_>) {
        let Some(role) = self.streams.role(frame.stream_id) else {
            tracing::trace!("Ignoring frame from unbound stream {}", frame.stream_id);
            return;
        };
        let timestamp = frame.timestamp_secs();

        match frame.payload {
            FramePayload::Video {
                width,
                height,
                pixels,
            } if role.is_video() => {
                self.session
                    .record_video(role, timestamp, width, height, pixels);
            }
            FramePayload::Motion(value) => match role.motion_kind() {
                Some(kind) => self.session.record_motion(kind, timestamp, value),
                None => tracing::debug!("Motion payload on {} stream, dropped", role),
            },
            FramePayload::Video { .. } => {
                tracing::debug!("Video payload on {} stream, dropped", role);
            }
        }
    }

    /// Route every member of a frame set, in order.
    pub fn on_frameset<'a, I>(&self, frames: I)
    where
        I: IntoIterator<Item = SensorFrame<'a>>,
    {
        for frame in frames {
            self.on_frame(&frame);
        }
    }

    /// Route the members of a device frame set in delivery order.
    ///
    /// Returns how many members decoded into a frame.
    pub fn on_members<M: FrameSetMember>(&self, members: &[M]) -> usize {
        let mut routed = 0;
        for member in members {
            if let Some(frame) = member.decode() {
                self.on_frame(&frame);
                routed += 1;
            }
        }
        routed
    }
}
