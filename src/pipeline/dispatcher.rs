use std::{
    sync::{
        Arc, PoisonError, RwLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::Instant,
};

use crossbeam_channel::Receiver;

use super::{
    metadata::FrameMetadataChannel, state::LandmarkStreamState, transform::transform_landmarks,
};
use crate::types::{
    DetectorKind, Facing, Frame, FrameMetadata, NormalizedPoint, Rotation, StreamKind,
    ViewportCell,
};

/// Work handed to a detection backend. The frame is shared between all backends.
#[derive(Clone, Debug)]
pub struct DetectionRequest {
    pub frame: Arc<Frame>,
    pub timestamp: Instant,
    pub session: u64,
}

/// A backend's result for one request: zero or more landmark lists in normalized
/// coordinates.
#[derive(Clone, Debug)]
pub struct DetectionCompleted {
    pub detector: DetectorKind,
    pub timestamp: Instant,
    pub session: u64,
    pub landmarks: Vec<Vec<NormalizedPoint>>,
}

/// A detector that accepts frames without blocking and reports back later through
/// its own completion channel.
pub trait DetectionBackend: Send + Sync {
    fn detector(&self) -> DetectorKind;

    fn submit(&self, request: DetectionRequest);
}

#[derive(Debug)]
struct Session {
    id: u64,
    facing: Facing,
}

/// Fans each frame out to the detection backends and folds their completions back into
/// the landmark state.
///
/// Dispatch and completion hold the session lock for reading; a facing switch takes it
/// for writing, so no completion can straddle a switch.
pub struct DetectionDispatcher {
    metadata: Arc<FrameMetadataChannel>,
    state: Arc<LandmarkStreamState>,
    viewport: Arc<ViewportCell>,
    backends: Vec<Box<dyn DetectionBackend>>,
    session: RwLock<Session>,
    dispatched: AtomicU64,
    applied: AtomicU64,
}

impl DetectionDispatcher {
    pub fn new(
        metadata: Arc<FrameMetadataChannel>,
        state: Arc<LandmarkStreamState>,
        viewport: Arc<ViewportCell>,
        facing: Facing,
    ) -> Self {
        Self {
            metadata,
            state,
            viewport,
            backends: Vec::new(),
            session: RwLock::new(Session { id: 0, facing }),
            dispatched: AtomicU64::new(0),
            applied: AtomicU64::new(0),
        }
    }

    pub fn with_backend(mut self, backend: Box<dyn DetectionBackend>) -> Self {
        log::debug!("registered {} detection backend", backend.detector());
        self.backends.push(backend);
        self
    }

    /// Records the frame's rotation once, then submits it to every backend without
    /// waiting for any of them.
    pub fn dispatch(&self, frame: Arc<Frame>, rotation_degrees: i32, timestamp: Instant) {
        let session = self.session.read().unwrap_or_else(PoisonError::into_inner);

        let rotation = Rotation::from_degrees_or_upright(rotation_degrees);
        self.metadata.push(FrameMetadata::new(rotation));

        for backend in &self.backends {
            backend.submit(DetectionRequest {
                frame: frame.clone(),
                timestamp,
                session: session.id,
            });
        }
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Applies one backend result: pops exactly one metadata entry, projects the
    /// landmarks and replaces the backend's stream(s). Results from before the latest
    /// facing switch are dropped untouched. Returns whether the result was applied.
    pub fn complete(&self, completion: DetectionCompleted) -> bool {
        let session = self.session.read().unwrap_or_else(PoisonError::into_inner);
        if completion.session != session.id {
            log::debug!(
                "discarding stale {} result from session {} (current {})",
                completion.detector,
                completion.session,
                session.id
            );
            return false;
        }

        let metadata = self.metadata.pop_or_default();
        let viewport = self.viewport.get();
        let mirror = session.facing.is_mirrored();
        let project = |points: &[NormalizedPoint]| {
            transform_landmarks(points, viewport, metadata.rotation, mirror)
        };

        let DetectionCompleted {
            detector,
            landmarks,
            ..
        } = completion;
        match detector {
            DetectorKind::Face | DetectorKind::Pose => {
                let flattened: Vec<NormalizedPoint> = landmarks.into_iter().flatten().collect();
                let kind = if detector == DetectorKind::Face {
                    StreamKind::Face
                } else {
                    StreamKind::Pose
                };
                self.state.update(kind, project(flattened.as_slice()));
            }
            DetectorKind::Hand => {
                let hand = |idx: usize| {
                    landmarks
                        .get(idx)
                        .map(|points| project(points.as_slice()))
                        .unwrap_or_default()
                };
                self.state.update(StreamKind::LeftHand, hand(0));
                self.state.update(StreamKind::RightHand, hand(1));
            }
        }

        self.applied.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Starts a new session for `facing`: in-flight metadata and every landmark set are
    /// discarded, and results for frames dispatched before the switch are ignored.
    pub fn switch_facing(&self, facing: Facing) {
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        session.id += 1;
        session.facing = facing;
        self.metadata.clear();
        self.state.clear();
        log::info!("switched to {} camera (session {})", facing.label(), session.id);
    }

    pub fn facing(&self) -> Facing {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .facing
    }

    pub fn session(&self) -> u64 {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .id
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Completions that reached the landmark state.
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> &Arc<LandmarkStreamState> {
        &self.state
    }

    pub fn viewport(&self) -> &Arc<ViewportCell> {
        &self.viewport
    }
}

/// Drains one backend's completions on a dedicated thread until the backend hangs up or
/// the dispatcher is dropped. Holds the dispatcher weakly: the dispatcher owns the
/// backends that feed this thread.
pub fn spawn_completion_worker(
    dispatcher: Weak<DetectionDispatcher>,
    detector: DetectorKind,
    completion_rx: Receiver<DetectionCompleted>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(completion) = completion_rx.recv() {
            let Some(dispatcher) = dispatcher.upgrade() else {
                break;
            };
            dispatcher.complete(completion);
        }
        log::debug!("{detector} completion worker stopped");
    })
}
