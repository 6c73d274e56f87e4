//! Frame sources and the capture thread that drives them.
//!
//! A [`FrameSource`] is opened on its own OS thread (device handles are
//! not `Send`), reports its stream bindings, then delivers frames to a
//! [`FrameRouter`] until cancelled. That thread is the hardware callback
//! context; the control loop runs concurrently on the tokio runtime.

use crate::router::FrameRouter;
use crate::session::SessionContext;
use crate::stream::StreamMap;
use anyhow::Result;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// A device (or simulation) that can be started.
pub trait FrameSource: Send + 'static {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Bring the device up. Stream ids are resolved here, once per session.
    fn start(self: Box<Self>) -> Result<(StreamMap, Box<dyn ActiveSource>)>;
}

/// A started source.
pub trait ActiveSource {
    /// Block until the next frame or frame set and route it.
    fn pump(&mut self, router: &FrameRouter) -> Result<()>;

    /// Release the device.
    fn stop(self: Box<Self>) {}
}

/// Handle to the capture thread.
pub struct CaptureHandle {
    ready: Option<oneshot::Receiver<StreamMap>>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl CaptureHandle {
    /// Wait until the source is started. Returns its stream bindings, or the
    /// error that kept it from starting.
    pub async fn wait_ready(&mut self) -> Result<StreamMap> {
        let ready = self
            .ready
            .take()
            .ok_or_else(|| anyhow::anyhow!("capture readiness already consumed"))?;
        match ready.await {
            Ok(streams) => Ok(streams),
            Err(_) => {
                // The thread exited before reporting; surface its error.
                self.join_inner()?;
                Err(anyhow::anyhow!("frame source exited during startup"))
            }
        }
    }

    /// Join the capture thread.
    pub fn join(mut self) -> Result<()> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| anyhow::anyhow!("capture thread panicked"))?,
            None => Ok(()),
        }
    }
}

/// Start `source` on a dedicated thread feeding `session`.
///
/// The thread stops when `cancel` fires. A source error cancels `cancel`
/// so the control loop winds down too.
pub fn spawn_capture(
    source: Box<dyn FrameSource>,
    session: Arc<SessionContext>,
    cancel: CancellationToken,
) -> Result<CaptureHandle> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let name = source.name().to_string();

    let thread = std::thread::Builder::new()
        .name(format!("capture-{}", name))
        .spawn(move || {
            let result = capture_loop(source, session, ready_tx, &cancel);
            if let Err(e) = &result {
                tracing::error!("[{}] Frame source failed: {:#}", name, e);
                cancel.cancel();
            }
            result
        })?;

    Ok(CaptureHandle {
        ready: Some(ready_rx),
        thread: Some(thread),
    })
}

fn capture_loop(
    source: Box<dyn FrameSource>,
    session: Arc<SessionContext>,
    ready_tx: oneshot::Sender<StreamMap>,
    cancel: &CancellationToken,
) -> Result<()> {
    let name = source.name().to_string();
    let (streams, mut active) = source.start()?;
    tracing::info!("[{}] Frame source started ({} streams)", name, streams.len());

    let router = FrameRouter::new(session, streams.clone());
    // Receiver gone means startup was abandoned; keep going until cancelled.
    let _ = ready_tx.send(streams);

    let result = loop {
        if cancel.is_cancelled() {
            break Ok(());
        }
        if let Err(e) = active.pump(&router) {
            break Err(e);
        }
    };

    active.stop();
    tracing::info!("[{}] Frame source stopped", name);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DataLayout;
    use crate::stream::{SensorFrame, StreamRole, Vector3};
    use crate::writer::SessionWriters;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct Scripted {
        fail_start: bool,
        fail_after: Option<usize>,
        stopped: Arc<AtomicBool>,
    }

    struct ScriptedActive {
        pumped: usize,
        fail_after: Option<usize>,
        stopped: Arc<AtomicBool>,
    }

    impl FrameSource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn start(self: Box<Self>) -> Result<(StreamMap, Box<dyn ActiveSource>)> {
            if self.fail_start {
                anyhow::bail!("no device");
            }
            let mut streams = StreamMap::new();
            streams.bind(7, StreamRole::Accel);
            streams.bind(8, StreamRole::Gyro);
            Ok((
                streams,
                Box::new(ScriptedActive {
                    pumped: 0,
                    fail_after: self.fail_after,
                    stopped: self.stopped,
                }),
            ))
        }
    }

    impl ActiveSource for ScriptedActive {
        fn pump(&mut self, router: &FrameRouter) -> Result<()> {
            if Some(self.pumped) == self.fail_after {
                anyhow::bail!("device disconnected");
            }
            let ts = self.pumped as f64 * 5.0;
            router.on_frameset(vec![
                SensorFrame::motion(7, ts, Vector3::default()),
                SensorFrame::motion(8, ts, Vector3::default()),
            ]);
            self.pumped += 1;
            std::thread::sleep(Duration::from_millis(1));
            Ok(())
        }

        fn stop(self: Box<Self>) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    fn session_in(tmp: &tempfile::TempDir) -> Arc<SessionContext> {
        let layout = DataLayout::new(tmp.path().join("data"));
        layout.bootstrap().unwrap();
        Arc::new(SessionContext::new(SessionWriters::open(&layout).unwrap()))
    }

    #[tokio::test]
    async fn test_capture_runs_until_cancelled() {
        let tmp = tempfile::tempdir().unwrap();
        let session = session_in(&tmp);
        session.set_active(true);
        let cancel = CancellationToken::new();
        let stopped = Arc::new(AtomicBool::new(false));

        let source = Box::new(Scripted {
            fail_start: false,
            fail_after: None,
            stopped: stopped.clone(),
        });
        let mut handle = spawn_capture(source, session.clone(), cancel.clone()).unwrap();
        let streams = handle.wait_ready().await.unwrap();
        assert_eq!(streams.role(8), Some(StreamRole::Gyro));

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.join().unwrap();

        assert!(stopped.load(Ordering::SeqCst));
        assert!(session.stats().imu_records > 0);
    }

    #[tokio::test]
    async fn test_start_failure_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let source = Box::new(Scripted {
            fail_start: true,
            fail_after: None,
            stopped: Arc::new(AtomicBool::new(false)),
        });
        let mut handle = spawn_capture(source, session_in(&tmp), cancel.clone()).unwrap();
        let err = handle.wait_ready().await.unwrap_err();
        assert!(err.to_string().contains("no device"));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_runtime_failure_cancels() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let stopped = Arc::new(AtomicBool::new(false));
        let source = Box::new(Scripted {
            fail_start: false,
            fail_after: Some(3),
            stopped: stopped.clone(),
        });
        let mut handle = spawn_capture(source, session_in(&tmp), cancel.clone()).unwrap();
        handle.wait_ready().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
            .await
            .unwrap();
        let err = handle.join().unwrap_err();
        assert!(err.to_string().contains("device disconnected"));
        assert!(stopped.load(Ordering::SeqCst));
    }
}
