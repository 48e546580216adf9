use crate::types::{NormalizedPoint, Rotation, ScreenPoint, Viewport};

/// Projects a normalized landmark into viewport pixels.
///
/// The rotation is applied to the normalized coordinates rather than to the image, then
/// the x axis is flipped for mirrored (front-facing) previews. Coordinates outside
/// `[0, 1]` are carried through unclamped.
pub fn transform_point(
    point: NormalizedPoint,
    viewport: Viewport,
    rotation: Rotation,
    mirror: bool,
) -> ScreenPoint {
    let width = viewport.width as f32;
    let height = viewport.height as f32;
    let NormalizedPoint { x, y } = point;

    let (sx, sy) = match rotation {
        Rotation::Deg0 => (x * width, y * height),
        Rotation::Deg90 => ((1.0 - y) * width, x * height),
        Rotation::Deg180 => ((1.0 - x) * width, (1.0 - y) * height),
        Rotation::Deg270 => (y * width, (1.0 - x) * height),
    };

    if mirror {
        ScreenPoint::new(width - sx, sy)
    } else {
        ScreenPoint::new(sx, sy)
    }
}

/// Maps every point, keeping length and index order.
pub fn transform_landmarks(
    points: &[NormalizedPoint],
    viewport: Viewport,
    rotation: Rotation,
    mirror: bool,
) -> Vec<ScreenPoint> {
    points
        .iter()
        .map(|&point| transform_point(point, viewport, rotation, mirror))
        .collect()
}
