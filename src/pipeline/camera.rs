use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use anyhow::{Result, anyhow};
use crossbeam_channel::Sender;
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
};

use super::rgba_converter;
use crate::types::CapturedFrame;

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

/// Running capture thread. Stops when dropped.
#[derive(Debug)]
pub struct CameraStream {
    index: u32,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            log::info!("camera {} stopped", self.index);
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Human-readable names of the cameras the platform reports, by index.
pub fn available_cameras() -> Result<Vec<(u32, String)>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .filter_map(|info| {
            let index = info.index().as_index().ok()?;
            Some((index, info.human_name()))
        })
        .collect())
}

fn build_camera(index: u32) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(CameraIndex::Index(index), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

/// Captures from camera `index` on a background thread, tagging every frame with
/// `rotation_degrees`. Frames are offered with `try_send`, so a busy consumer simply
/// misses them; a frame that fails to read or decode is skipped.
pub fn start_camera_stream(
    index: u32,
    rotation_degrees: i32,
    frame_tx: Sender<CapturedFrame>,
) -> Result<CameraStream> {
    // Fail fast before spawning the capture thread.
    build_camera(index)?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        let mut camera = match build_camera(index) {
            Ok(cam) => cam,
            Err(err) => {
                log::error!("failed to open camera {index}: {err:?}");
                return;
            }
        };
        log::info!("camera {index} streaming");

        while !stop_flag.load(Ordering::Relaxed) {
            let read_start = Instant::now();
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(err) => {
                    log::warn!(
                        "camera frame read failed (after {:?}): {err:?}",
                        read_start.elapsed()
                    );
                    continue;
                }
            };

            let frame = match rgba_converter::decode_camera_buffer(&buffer) {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("failed to decode camera frame {err:?}");
                    continue;
                }
            };

            let _ = frame_tx.try_send(CapturedFrame {
                frame,
                rotation_degrees,
                timestamp: Instant::now(),
            });
        }
    });

    Ok(CameraStream {
        index,
        stop,
        handle: Some(handle),
    })
}
