use std::path::Path;

use anyhow::{Context, Result, anyhow};
use image::RgbaImage;

use super::overlay::DrawCommand;
use crate::types::{Frame, ScreenPoint};

/// RGBA8 pixel buffer that overlay commands are painted onto.
pub struct RasterCanvas<'a> {
    buffer: &'a mut [u8],
    width: u32,
    height: u32,
}

impl<'a> RasterCanvas<'a> {
    pub fn new(buffer: &'a mut [u8], width: u32, height: u32) -> Result<Self> {
        let expected_len = (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4);
        if buffer.len() != expected_len {
            return Err(anyhow!(
                "canvas buffer size mismatch: got {}, expected {}",
                buffer.len(),
                expected_len
            ));
        }
        Ok(Self {
            buffer,
            width,
            height,
        })
    }

    pub fn paint(&mut self, commands: &[DrawCommand]) {
        for command in commands {
            match command {
                DrawCommand::Line {
                    from, to, style, ..
                } => {
                    self.draw_line(*from, *to, style.color, style.line_width.round() as i32);
                }
                DrawCommand::Point { center, style, .. } => {
                    self.draw_circle(*center, style.point_radius.round() as i32, style.color);
                }
            }
        }
    }

    fn draw_line(&mut self, p0: ScreenPoint, p1: ScreenPoint, color: [u8; 4], thickness: i32) {
        let (mut x0, mut y0) = (p0.x as i32, p0.y as i32);
        let (x1, y1) = (p1.x as i32, p1.y as i32);
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let radius = (thickness.max(1) - 1) / 2;

        loop {
            self.stamp(x0, y0, radius, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    /// Diamond-shaped brush used to give lines their thickness.
    fn stamp(&mut self, x: i32, y: i32, radius: i32, color: [u8; 4]) {
        for ox in -radius..=radius {
            for oy in -radius..=radius {
                if ox.abs() + oy.abs() <= radius {
                    self.put_pixel(x + ox, y + oy, color);
                }
            }
        }
    }

    fn draw_circle(&mut self, center: ScreenPoint, radius: i32, color: [u8; 4]) {
        let (cx, cy) = (center.x as i32, center.y as i32);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn put_pixel(&mut self, x: i32, y: i32, color: [u8; 4]) {
        if x < 0 || y < 0 {
            return;
        }
        let (ux, uy) = (x as u32, y as u32);
        if ux >= self.width || uy >= self.height {
            return;
        }
        let idx = (uy as usize * self.width as usize + ux as usize) * 4;
        self.buffer[idx..idx + 4].copy_from_slice(&color);
    }
}

/// Copy of `frame` with the overlay painted on top.
pub fn compose(frame: &Frame, commands: &[DrawCommand]) -> Result<Frame> {
    let mut rgba = frame.rgba.clone();
    RasterCanvas::new(&mut rgba, frame.width, frame.height)?.paint(commands);
    Ok(Frame {
        rgba,
        width: frame.width,
        height: frame.height,
    })
}

pub fn save_png(frame: &Frame, path: &Path) -> Result<()> {
    let image = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
    image
        .save(path)
        .with_context(|| format!("failed to write overlay image {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::overlay::StreamStyle;
    use crate::types::StreamKind;

    fn blank(width: u32, height: u32) -> Frame {
        Frame {
            rgba: vec![0; (width * height * 4) as usize],
            width,
            height,
        }
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * frame.width + x) * 4) as usize;
        [
            frame.rgba[idx],
            frame.rgba[idx + 1],
            frame.rgba[idx + 2],
            frame.rgba[idx + 3],
        ]
    }

    #[test]
    fn paints_points_and_lines_with_their_style() {
        let face = StreamStyle::for_kind(StreamKind::Face);
        let pose = StreamStyle::for_kind(StreamKind::Pose);
        let commands = [
            DrawCommand::Line {
                kind: StreamKind::Pose,
                from: ScreenPoint::new(2.0, 30.0),
                to: ScreenPoint::new(60.0, 30.0),
                style: pose,
            },
            DrawCommand::Point {
                kind: StreamKind::Face,
                center: ScreenPoint::new(10.0, 10.0),
                style: face,
            },
        ];

        let composed = compose(&blank(64, 64), &commands).expect("compose");
        assert_eq!(pixel(&composed, 10, 10), face.color);
        assert_eq!(pixel(&composed, 30, 30), pose.color);
        assert_eq!(pixel(&composed, 40, 5), [0, 0, 0, 0]);
    }

    #[test]
    fn off_canvas_commands_are_clipped() {
        let style = StreamStyle::for_kind(StreamKind::RightHand);
        let commands = [DrawCommand::Point {
            kind: StreamKind::RightHand,
            center: ScreenPoint::new(-500.0, 9000.0),
            style,
        }];
        let composed = compose(&blank(16, 16), &commands).expect("compose");
        assert!(composed.rgba.iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_mismatched_buffer() {
        let mut buffer = vec![0u8; 10];
        assert!(RasterCanvas::new(&mut buffer, 4, 4).is_err());
    }
}
