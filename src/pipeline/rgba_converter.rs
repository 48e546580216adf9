use anyhow::{Result, anyhow};
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

/// Byte order of the packed formats expanded to RGBA by hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PackedLayout {
    Rgb,
    Bgr,
    Gray,
}

impl PackedLayout {
    fn bytes_per_pixel(self) -> usize {
        match self {
            PackedLayout::Rgb | PackedLayout::Bgr => 3,
            PackedLayout::Gray => 1,
        }
    }
}

/// Decodes one camera buffer into an RGBA frame.
pub fn decode_camera_buffer(buffer: &Buffer) -> Result<Frame> {
    let resolution = buffer.resolution();
    let (width, height) = (resolution.width_x, resolution.height_y);
    let data = buffer.buffer();

    let (rgba, width, height) = match buffer.source_frame_format() {
        FrameFormat::NV12 => (nv12_to_rgba(data, width, height)?, width, height),
        FrameFormat::YUYV => (yuyv_to_rgba(data, width, height)?, width, height),
        FrameFormat::MJPEG => mjpeg_to_rgba(data)?,
        FrameFormat::RAWRGB => (
            expand_packed(data, width, height, PackedLayout::Rgb)?,
            width,
            height,
        ),
        FrameFormat::RAWBGR => (
            expand_packed(data, width, height, PackedLayout::Bgr)?,
            width,
            height,
        ),
        FrameFormat::GRAY => (
            expand_packed(data, width, height, PackedLayout::Gray)?,
            width,
            height,
        ),
    };

    Ok(Frame {
        rgba,
        width,
        height,
    })
}

fn ensure_len(format: &str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(anyhow!(
            "{format} buffer too small: got {}, expected {expected}",
            data.len()
        ));
    }
    Ok(())
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_plane_len = width as usize * height as usize;
    let uv_plane_len = y_plane_len / 2;
    ensure_len("NV12", data, y_plane_len + uv_plane_len)?;

    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride: width,
        width,
        height,
    };

    let mut rgba = vec![0u8; y_plane_len * 4];
    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    ensure_len("YUYV", data, pixels * 2)?;

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    let mut rgba = vec![0u8; pixels * 4];
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

/// MJPEG carries its own dimensions, which win over the negotiated resolution.
fn mjpeg_to_rgba(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder reported no image info"))?;
    let width = u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width does not fit u32"))?;
    let height =
        u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height does not fit u32"))?;
    let expected_len = width as usize * height as usize * 4;
    if rgba.len() < expected_len {
        return Err(anyhow!(
            "MJPEG decode produced too few bytes: got {}, expected {}",
            rgba.len(),
            expected_len
        ));
    }

    Ok((rgba, width, height))
}

fn expand_packed(data: &[u8], width: u32, height: u32, layout: PackedLayout) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    let bpp = layout.bytes_per_pixel();
    ensure_len(&format!("{layout:?}"), data, pixels * bpp)?;

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(bpp))
        .for_each(|(dst, src)| {
            let [r, g, b] = match layout {
                PackedLayout::Rgb => [src[0], src[1], src[2]],
                PackedLayout::Bgr => [src[2], src[1], src[0]],
                PackedLayout::Gray => [src[0]; 3],
            };
            dst.copy_from_slice(&[r, g, b, 255]);
        });

    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_is_swapped_into_rgba() {
        let rgba = expand_packed(&[1, 2, 3, 4, 5, 6], 2, 1, PackedLayout::Bgr).expect("expands");
        assert_eq!(rgba, vec![3, 2, 1, 255, 6, 5, 4, 255]);
    }

    #[test]
    fn gray_is_replicated() {
        let rgba = expand_packed(&[9, 200], 1, 2, PackedLayout::Gray).expect("expands");
        assert_eq!(rgba, vec![9, 9, 9, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(expand_packed(&[1, 2], 1, 1, PackedLayout::Rgb).is_err());
        assert!(nv12_to_rgba(&[0; 5], 2, 2).is_err());
        assert!(yuyv_to_rgba(&[0; 7], 2, 2).is_err());
    }
}
