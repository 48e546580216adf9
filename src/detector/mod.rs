mod onnx;

use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::{
    pipeline::dispatcher::{DetectionBackend, DetectionCompleted, DetectionRequest},
    types::{DetectorKind, Frame, NormalizedPoint},
};

pub use onnx::{OnnxLandmarkEngine, decode_landmark_lists, prepare_square_input};

/// Requests held while the worker is busy; frames arriving on a full queue are dropped.
const PENDING_REQUESTS: usize = 1;

/// A landmark model: given an image, zero or more landmark lists in coordinates
/// normalized to that image.
pub trait LandmarkEngine: Send + 'static {
    fn infer(&mut self, frame: &Frame) -> anyhow::Result<Vec<Vec<NormalizedPoint>>>;
}

/// Detection backend running its engine on a dedicated thread.
///
/// `submit` never blocks: while the worker is busy, surplus requests are dropped. Each
/// finished inference is sent on the completion channel; failed inferences are logged
/// and produce no completion.
pub struct WorkerBackend {
    detector: DetectorKind,
    request_tx: Sender<DetectionRequest>,
}

impl WorkerBackend {
    /// Spawns the worker. The engine is built on the worker thread so slow model loading
    /// does not hold up the caller; if that fails the worker exits and requests are
    /// silently dropped.
    pub fn spawn<E, F>(
        detector: DetectorKind,
        make_engine: F,
        completion_tx: Sender<DetectionCompleted>,
    ) -> (Self, thread::JoinHandle<()>)
    where
        E: LandmarkEngine,
        F: FnOnce() -> anyhow::Result<E> + Send + 'static,
    {
        let (request_tx, request_rx) = bounded(PENDING_REQUESTS);

        let handle = thread::spawn(move || {
            let engine = match make_engine() {
                Ok(engine) => {
                    log::info!("{detector} landmark backend ready");
                    engine
                }
                Err(err) => {
                    log::error!("failed to start {detector} landmark backend: {err:?}");
                    return;
                }
            };

            run_worker_loop(detector, engine, request_rx, completion_tx);
        });

        (
            Self {
                detector,
                request_tx,
            },
            handle,
        )
    }
}

impl DetectionBackend for WorkerBackend {
    fn detector(&self) -> DetectorKind {
        self.detector
    }

    fn submit(&self, request: DetectionRequest) {
        // Full or disconnected: the frame is skipped for this detector.
        let _ = self.request_tx.try_send(request);
    }
}

fn run_worker_loop<E: LandmarkEngine>(
    detector: DetectorKind,
    mut engine: E,
    request_rx: Receiver<DetectionRequest>,
    completion_tx: Sender<DetectionCompleted>,
) {
    while let Some(request) = recv_latest_request(&request_rx) {
        match engine.infer(&request.frame) {
            Ok(landmarks) => {
                let completion = DetectionCompleted {
                    detector,
                    timestamp: request.timestamp,
                    session: request.session,
                    landmarks,
                };
                if completion_tx.send(completion).is_err() {
                    break;
                }
            }
            Err(err) => {
                log::warn!("{detector} inference failed: {err:?}");
            }
        }
    }
    log::debug!("{detector} landmark worker stopped");
}

fn recv_latest_request(request_rx: &Receiver<DetectionRequest>) -> Option<DetectionRequest> {
    let mut request = request_rx.recv().ok()?;
    while let Ok(newer) = request_rx.try_recv() {
        request = newer;
    }
    Some(request)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };

    use anyhow::anyhow;
    use crossbeam_channel::unbounded;

    use super::*;

    struct WidthEngine;

    impl LandmarkEngine for WidthEngine {
        fn infer(&mut self, frame: &Frame) -> anyhow::Result<Vec<Vec<NormalizedPoint>>> {
            if frame.width == 0 {
                return Err(anyhow!("empty frame"));
            }
            Ok(vec![vec![NormalizedPoint::new(frame.width as f32, 0.0)]])
        }
    }

    fn request(width: u32, session: u64) -> DetectionRequest {
        DetectionRequest {
            frame: Arc::new(Frame {
                rgba: Vec::new(),
                width,
                height: 1,
            }),
            timestamp: Instant::now(),
            session,
        }
    }

    #[test]
    fn completions_carry_request_identity() {
        let (completion_tx, completion_rx) = unbounded();
        let (backend, _handle) =
            WorkerBackend::spawn(DetectorKind::Pose, || Ok(WidthEngine), completion_tx);
        assert_eq!(backend.detector(), DetectorKind::Pose);

        let sent = request(7, 3);
        let timestamp = sent.timestamp;
        backend.submit(sent);

        let completion = completion_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("completion");
        assert_eq!(completion.detector, DetectorKind::Pose);
        assert_eq!(completion.session, 3);
        assert_eq!(completion.timestamp, timestamp);
        assert_eq!(completion.landmarks, vec![vec![NormalizedPoint::new(7.0, 0.0)]]);
    }

    #[test]
    fn failed_inference_produces_no_completion() {
        let (completion_tx, completion_rx) = unbounded();
        let (backend, _handle) =
            WorkerBackend::spawn(DetectorKind::Face, || Ok(WidthEngine), completion_tx);

        backend.submit(request(0, 0));
        assert!(completion_rx.recv_timeout(Duration::from_millis(100)).is_err());
        backend.submit(request(5, 0));

        let completion = completion_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("completion");
        assert_eq!(completion.landmarks[0][0].x, 5.0);
        assert!(completion_rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn worker_stops_when_backend_is_dropped() {
        let (completion_tx, _completion_rx) = unbounded();
        let (backend, handle) =
            WorkerBackend::spawn(DetectorKind::Hand, || Ok(WidthEngine), completion_tx);
        drop(backend);
        handle.join().expect("worker exits cleanly");
    }

    #[test]
    fn engine_startup_failure_ends_worker() {
        let (completion_tx, completion_rx) = unbounded();
        let (backend, handle) = WorkerBackend::spawn(
            DetectorKind::Hand,
            || Err::<WidthEngine, _>(anyhow!("model missing")),
            completion_tx,
        );
        handle.join().expect("worker exits cleanly");
        backend.submit(request(1, 0));
        assert!(completion_rx.try_recv().is_err());
    }
}
