#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod dispatcher;
pub mod metadata;
pub mod overlay;
pub mod raster;
#[cfg(feature = "camera-nokhwa")]
pub mod rgba_converter;
pub mod state;
pub mod transform;

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, unbounded};

// Re-exports for convenience
#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraStream, available_cameras, start_camera_stream};
pub use dispatcher::{DetectionBackend, DetectionCompleted, DetectionDispatcher, DetectionRequest};
pub use metadata::FrameMetadataChannel;
pub use overlay::{DrawCommand, OverlayRenderer, StreamStyle};
pub use state::{LandmarkStreamState, StreamSnapshot};
pub use transform::{transform_landmarks, transform_point};

use crate::{
    detector::{LandmarkEngine, WorkerBackend},
    types::{DetectorKind, Facing, Frame, Viewport, ViewportCell},
};

/// The assembled core: one worker and one completion thread per detector, a shared
/// metadata channel and the landmark state the renderer reads from.
pub struct OverlayPipeline {
    dispatcher: Arc<DetectionDispatcher>,
    redraw_rx: Receiver<()>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl OverlayPipeline {
    /// Starts every detector. `make_engine` runs once per detector on that detector's
    /// worker thread.
    pub fn start<E, F>(metadata_capacity: usize, facing: Facing, make_engine: F) -> Self
    where
        E: LandmarkEngine,
        F: Fn(DetectorKind) -> anyhow::Result<E> + Clone + Send + 'static,
    {
        let metadata = Arc::new(FrameMetadataChannel::new(metadata_capacity));
        let (state, redraw_rx) = LandmarkStreamState::with_redraw_channel();
        let state = Arc::new(state);
        let viewport = Arc::new(ViewportCell::default());

        let mut dispatcher = DetectionDispatcher::new(metadata, state, viewport, facing);
        let mut threads = Vec::new();
        let mut completions = Vec::new();
        for detector in DetectorKind::ALL {
            let (completion_tx, completion_rx) = unbounded();
            let make_engine = make_engine.clone();
            let (backend, handle) =
                WorkerBackend::spawn(detector, move || make_engine(detector), completion_tx);
            dispatcher = dispatcher.with_backend(Box::new(backend));
            threads.push(handle);
            completions.push((detector, completion_rx));
        }

        let dispatcher = Arc::new(dispatcher);
        for (detector, completion_rx) in completions {
            threads.push(dispatcher::spawn_completion_worker(
                Arc::downgrade(&dispatcher),
                detector,
                completion_rx,
            ));
        }

        Self {
            dispatcher,
            redraw_rx,
            threads,
        }
    }

    /// Borrowed only: the pipeline holds the sole strong reference, which `shutdown`
    /// relies on to stop the workers.
    pub fn dispatcher(&self) -> &DetectionDispatcher {
        &self.dispatcher
    }

    pub fn dispatch(&self, frame: Arc<Frame>, rotation_degrees: i32, timestamp: Instant) {
        self.dispatcher.dispatch(frame, rotation_degrees, timestamp);
    }

    pub fn switch_facing(&self, facing: Facing) {
        self.dispatcher.switch_facing(facing);
    }

    /// Size landmarks are projected into from now on.
    pub fn set_viewport(&self, viewport: Viewport) {
        self.dispatcher.viewport().set(viewport);
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        self.dispatcher.state().snapshot()
    }

    /// Waits up to `timeout` for a landmark update.
    pub fn wait_redraw(&self, timeout: Duration) -> bool {
        self.redraw_rx.recv_timeout(timeout).is_ok()
    }

    /// Consumes a pending redraw request without waiting.
    pub fn take_redraw(&self) -> bool {
        self.redraw_rx.try_recv().is_ok()
    }

    /// Stops every worker and waits for them to exit. Dropping the dispatcher closes the
    /// request channels; the completion threads follow once their workers hang up.
    pub fn shutdown(self) {
        let Self {
            dispatcher,
            threads,
            ..
        } = self;
        drop(dispatcher);
        for handle in threads {
            let _ = handle.join();
        }
    }
}
