use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use serde::Deserialize;

/// RGBA8 image handed to the detectors.
#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// One frame as delivered by the camera, with the sensor-to-display rotation it was
/// captured at.
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    pub frame: Frame,
    pub rotation_degrees: i32,
    pub timestamp: Instant,
}

/// Landmark position relative to the square image the detector was given.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
}

impl NormalizedPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Pixel coordinate in the overlay viewport.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Index-significant landmark list; index `i` is landmark id `i`.
pub type LandmarkSet = Vec<ScreenPoint>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// Same as [`Rotation::from_degrees`], but an unsupported angle is treated as upright.
    pub fn from_degrees_or_upright(degrees: i32) -> Self {
        Self::from_degrees(degrees).unwrap_or_else(|| {
            log::warn!("unsupported rotation {degrees}°, treating frame as upright");
            Rotation::Deg0
        })
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameMetadata {
    pub rotation: Rotation,
}

impl FrameMetadata {
    pub const fn new(rotation: Rotation) -> Self {
        Self { rotation }
    }
}

/// The four independently rendered landmark layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Face,
    LeftHand,
    RightHand,
    Pose,
}

impl StreamKind {
    /// Layer order used by the renderer.
    pub const ALL: [StreamKind; 4] = [
        StreamKind::Face,
        StreamKind::LeftHand,
        StreamKind::RightHand,
        StreamKind::Pose,
    ];

    pub const fn index(self) -> usize {
        match self {
            StreamKind::Face => 0,
            StreamKind::LeftHand => 1,
            StreamKind::RightHand => 2,
            StreamKind::Pose => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StreamKind::Face => "face",
            StreamKind::LeftHand => "left hand",
            StreamKind::RightHand => "right hand",
            StreamKind::Pose => "pose",
        }
    }
}

/// The three detection backends a frame is fanned out to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetectorKind {
    Face,
    Hand,
    Pose,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 3] = [DetectorKind::Face, DetectorKind::Hand, DetectorKind::Pose];

    pub fn label(&self) -> &'static str {
        match self {
            DetectorKind::Face => "face",
            DetectorKind::Hand => "hand",
            DetectorKind::Pose => "pose",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    #[default]
    Back,
    Front,
}

impl Facing {
    /// Front-facing previews are shown mirrored, so the overlay is too.
    pub fn is_mirrored(self) -> bool {
        matches!(self, Facing::Front)
    }

    pub fn toggled(self) -> Self {
        match self {
            Facing::Back => Facing::Front,
            Facing::Front => Facing::Back,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Facing::Back => "back",
            Facing::Front => "front",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Viewport size shared between the render surface (writer) and the completion
/// threads (readers). Both dimensions live in one word so a reader never sees the
/// width of one size paired with the height of another.
#[derive(Debug, Default)]
pub struct ViewportCell(AtomicU64);

impl ViewportCell {
    pub fn new(viewport: Viewport) -> Self {
        Self(AtomicU64::new(pack(viewport)))
    }

    pub fn get(&self) -> Viewport {
        let packed = self.0.load(Ordering::Acquire);
        Viewport::new((packed >> 32) as u32, packed as u32)
    }

    pub fn set(&self, viewport: Viewport) {
        self.0.store(pack(viewport), Ordering::Release);
    }
}

fn pack(viewport: Viewport) -> u64 {
    (u64::from(viewport.width) << 32) | u64::from(viewport.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_accepts_only_quarter_turns() {
        for degrees in [0, 90, 180, 270] {
            let rotation = Rotation::from_degrees(degrees).expect("quarter turn");
            assert_eq!(rotation.degrees(), degrees);
        }
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::from_degrees(-90), None);
        assert_eq!(Rotation::from_degrees_or_upright(360), Rotation::Deg0);
    }

    #[test]
    fn viewport_cell_round_trips_both_dimensions() {
        let cell = ViewportCell::new(Viewport::new(480, 640));
        assert_eq!(cell.get(), Viewport::new(480, 640));
        cell.set(Viewport::new(u32::MAX, 1));
        assert_eq!(cell.get(), Viewport::new(u32::MAX, 1));
    }

    #[test]
    fn only_front_facing_is_mirrored() {
        assert!(Facing::Front.is_mirrored());
        assert!(!Facing::Back.is_mirrored());
        assert_eq!(Facing::Back.toggled(), Facing::Front);
    }

    #[test]
    fn stream_kinds_have_distinct_indices_and_labels() {
        for (position, kind) in StreamKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), position);
        }
        let mut labels: Vec<_> = StreamKind::ALL.iter().map(StreamKind::label).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), StreamKind::ALL.len());
    }
}
