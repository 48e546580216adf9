use std::path::Path;

use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use rayon::prelude::*;

use super::LandmarkEngine;
use crate::{
    config::ModelConfig,
    types::{Frame, NormalizedPoint},
};

/// Landmark model served by ONNX Runtime.
///
/// The frame is stretched to a square `input_size` image, so the model's pixel
/// coordinates divided by `input_size` are already normalized to the frame.
pub struct OnnxLandmarkEngine {
    session: Session,
    input_size: u32,
    landmark_count: usize,
    values_per_landmark: usize,
    max_results: usize,
    min_presence: f32,
}

impl OnnxLandmarkEngine {
    pub fn new(model: &ModelConfig) -> Result<Self> {
        let session = load_session(&model.path)?;
        Ok(Self {
            session,
            input_size: model.input_size,
            landmark_count: model.landmark_count,
            values_per_landmark: model.values_per_landmark,
            max_results: model.max_results,
            min_presence: model.min_presence,
        })
    }
}

fn load_session(model_path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ORT session from {}", model_path.display()))
}

impl LandmarkEngine for OnnxLandmarkEngine {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Vec<NormalizedPoint>>> {
        let input = prepare_square_input(frame, self.input_size)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        // Models with a presence head report it as the second output.
        if outputs.len() > 1 {
            let presence = outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(1.0);
            if presence < self.min_presence {
                return Ok(Vec::new());
            }
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        decode_landmark_lists(
            &flattened,
            self.landmark_count,
            self.values_per_landmark,
            self.max_results,
            self.input_size as f32,
        )
    }
}

/// Resizes `frame` to `size`x`size` and lays it out as a `[1, size, size, 3]` tensor of
/// RGB values in `[0, 1]`.
pub fn prepare_square_input(frame: &Frame, size: u32) -> Result<Array4<f32>> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(size, size, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;

    let resized = dst_image.into_vec();

    let normalized: Vec<f32> = resized
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();

    Array4::<f32>::from_shape_vec((1, size as usize, size as usize, 3), normalized)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))
}

/// Splits a flat model output into up to `max_results` landmark lists.
///
/// Each landmark occupies `stride` floats starting with x and y in input pixels; these
/// are divided by `scale`. Trailing values that do not fill a whole list are ignored.
pub fn decode_landmark_lists(
    flat: &[f32],
    landmark_count: usize,
    stride: usize,
    max_results: usize,
    scale: f32,
) -> Result<Vec<Vec<NormalizedPoint>>> {
    if stride < 2 {
        return Err(anyhow!("landmark stride must be at least 2, got {stride}"));
    }
    let per_result = landmark_count * stride;
    if per_result == 0 || flat.len() < per_result {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            per_result
        ));
    }

    Ok(flat
        .chunks_exact(per_result)
        .take(max_results)
        .map(|result| {
            result
                .chunks_exact(stride)
                .map(|lm| NormalizedPoint::new(lm[0] / scale, lm[1] / scale))
                .collect()
        })
        .collect())
}
