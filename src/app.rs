use std::{
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use landmark_overlay::{
    OverlayConfig, OverlayPipeline,
    detector::OnnxLandmarkEngine,
    model_download::ensure_model_ready,
    pipeline::{OverlayRenderer, raster},
    types::{DetectorKind, Frame, StreamKind, Viewport},
};

const STILL_TIMEOUT: Duration = Duration::from_secs(30);

fn start_pipeline(config: &OverlayConfig) -> OverlayPipeline {
    let models = config.models.clone();
    OverlayPipeline::start(
        config.pipeline.metadata_capacity,
        config.camera.initial_facing,
        move |detector| {
            let model = models.get(detector);
            ensure_model_ready(detector, model, |_evt| {})?;
            OnnxLandmarkEngine::new(model)
        },
    )
}

fn write_snapshot(
    pipeline: &OverlayPipeline,
    renderer: &OverlayRenderer,
    frame: &Frame,
    path: &Path,
) -> Result<()> {
    let commands = renderer.render(&pipeline.snapshot());
    let composed = raster::compose(frame, &commands)?;
    raster::save_png(&composed, path)
}

/// Runs one image through every detector and writes the overlay.
pub fn run_still(config: &OverlayConfig, image_path: &Path) -> Result<()> {
    let rgba = image::open(image_path)
        .with_context(|| format!("failed to read {}", image_path.display()))?
        .to_rgba8();
    let frame = Arc::new(Frame {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    });

    let pipeline = start_pipeline(config);
    pipeline.set_viewport(Viewport::new(frame.width, frame.height));
    let facing = config.camera.initial_facing;
    pipeline.dispatch(
        frame.clone(),
        config.camera.rotation_degrees(facing),
        Instant::now(),
    );

    let expected = DetectorKind::ALL.len() as u64;
    let deadline = Instant::now() + STILL_TIMEOUT;
    while pipeline.dispatcher().applied() < expected && Instant::now() < deadline {
        pipeline.wait_redraw(Duration::from_millis(100));
    }
    let applied = pipeline.dispatcher().applied();
    if applied < expected {
        log::warn!("only {applied} of {expected} detectors reported before the timeout");
    }

    let renderer = OverlayRenderer::new();
    let output = &config.output.snapshot_path;
    write_snapshot(&pipeline, &renderer, &frame, output)?;
    let snapshot = pipeline.snapshot();
    for kind in StreamKind::ALL {
        println!("{:>10}: {} landmarks", kind.label(), snapshot.get(kind).len());
    }
    println!("wrote {} landmarks to {}", snapshot.total_points(), output.display());

    pipeline.shutdown();
    Ok(())
}

#[cfg(feature = "camera-nokhwa")]
pub fn run_live(config: &OverlayConfig) -> Result<()> {
    use std::{io::BufRead, thread};

    use crossbeam_channel::{RecvTimeoutError, bounded, unbounded};
    use landmark_overlay::pipeline::{available_cameras, start_camera_stream};

    enum Command {
        Switch,
        Quit,
    }

    match available_cameras() {
        Ok(cameras) => {
            for (index, name) in cameras {
                log::info!("camera {index}: {name}");
            }
        }
        Err(err) => log::warn!("failed to list cameras: {err:?}"),
    }

    let pipeline = start_pipeline(config);
    let renderer = OverlayRenderer::new();
    let snapshot_path = config.output.snapshot_path.as_path();
    let snapshot_interval = config.output.snapshot_interval();

    let (command_tx, command_rx) = unbounded();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim() {
                "switch" => Command::Switch,
                "quit" | "exit" => Command::Quit,
                "" => continue,
                other => {
                    eprintln!("unknown command {other:?} (try switch or quit)");
                    continue;
                }
            };
            if command_tx.send(command).is_err() {
                break;
            }
        }
    });

    let (frame_tx, frame_rx) = bounded(1);
    let mut facing = config.camera.initial_facing;
    let mut camera = Some(start_camera_stream(
        config.camera.index(facing),
        config.camera.rotation_degrees(facing),
        frame_tx.clone(),
    )?);
    println!("streaming; type `switch` to change camera or `quit` to exit");

    let mut latest: Option<Arc<Frame>> = None;
    let mut last_snapshot: Option<Instant> = None;
    let mut redraw_pending = false;

    loop {
        match frame_rx.recv_timeout(Duration::from_millis(30)) {
            Ok(captured) => {
                let frame = Arc::new(captured.frame);
                pipeline.set_viewport(Viewport::new(frame.width, frame.height));
                pipeline.dispatch(frame.clone(), captured.rotation_degrees, captured.timestamp);
                latest = Some(frame);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        match command_rx.try_recv() {
            Ok(Command::Quit) => break,
            Ok(Command::Switch) => {
                // The old stream must be gone before the state is cleared, or its last
                // frames would be dispatched into the new session.
                if let Some(stream) = camera.take() {
                    stream.stop();
                }
                while frame_rx.try_recv().is_ok() {}
                latest = None;

                facing = facing.toggled();
                pipeline.switch_facing(facing);
                match start_camera_stream(
                    config.camera.index(facing),
                    config.camera.rotation_degrees(facing),
                    frame_tx.clone(),
                ) {
                    Ok(stream) => camera = Some(stream),
                    Err(err) => {
                        log::error!("failed to start {} camera: {err:?}", facing.label())
                    }
                }
            }
            Err(_) => {}
        }

        redraw_pending |= pipeline.take_redraw();
        let due = last_snapshot.is_none_or(|at| at.elapsed() >= snapshot_interval);
        if let (true, true, Some(frame)) = (redraw_pending, due, latest.as_ref()) {
            match write_snapshot(&pipeline, &renderer, frame, snapshot_path) {
                Ok(()) => log::debug!("overlay written to {}", snapshot_path.display()),
                Err(err) => log::warn!("failed to write overlay snapshot: {err:?}"),
            }
            redraw_pending = false;
            last_snapshot = Some(Instant::now());
        }
    }

    if let Some(stream) = camera.take() {
        stream.stop();
    }
    pipeline.shutdown();
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
pub fn run_live(_config: &OverlayConfig) -> Result<()> {
    anyhow::bail!("built without camera support; enable the camera-nokhwa feature or pass --image")
}
