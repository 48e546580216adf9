use super::state::StreamSnapshot;
use crate::types::{ScreenPoint, StreamKind};

/// Outline of the face mesh.
pub const FACE_CONNECTIONS: &[(usize, usize)] = &[
    (10, 338),
    (338, 297),
    (297, 332),
    (332, 284),
    (284, 251),
    (251, 389),
    (389, 356),
    (356, 454),
    (454, 323),
    (323, 361),
    (361, 288),
    (288, 397),
];

/// Shared by both hands.
pub const HAND_CONNECTIONS: &[(usize, usize)] = &[
    // thumb
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    // index
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    // middle
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    // ring
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    // pinky
    (13, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    // palm
    (0, 17),
];

pub const POSE_CONNECTIONS: &[(usize, usize)] = &[
    // arms
    (11, 13),
    (13, 15),
    (12, 14),
    (14, 16),
    // torso
    (11, 12),
    (12, 24),
    (24, 23),
    (23, 11),
    // legs
    (23, 25),
    (25, 27),
    (24, 26),
    (26, 28),
];

pub const DEFAULT_LINE_WIDTH: f32 = 4.0;

pub fn topology(kind: StreamKind) -> &'static [(usize, usize)] {
    match kind {
        StreamKind::Face => FACE_CONNECTIONS,
        StreamKind::LeftHand | StreamKind::RightHand => HAND_CONNECTIONS,
        StreamKind::Pose => POSE_CONNECTIONS,
    }
}

/// How one stream is drawn. Passed along with every command instead of being mutated
/// between layers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamStyle {
    pub color: [u8; 4],
    pub point_radius: f32,
    pub line_width: f32,
}

impl StreamStyle {
    pub const fn for_kind(kind: StreamKind) -> Self {
        let (color, point_radius) = match kind {
            StreamKind::Face => ([0, 255, 255, 255], 6.0),
            StreamKind::LeftHand => ([0, 255, 0, 255], 8.0),
            StreamKind::RightHand => ([255, 0, 0, 255], 8.0),
            StreamKind::Pose => ([0, 0, 255, 255], 10.0),
        };
        Self {
            color,
            point_radius,
            line_width: DEFAULT_LINE_WIDTH,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrawCommand {
    Line {
        kind: StreamKind,
        from: ScreenPoint,
        to: ScreenPoint,
        style: StreamStyle,
    },
    Point {
        kind: StreamKind,
        center: ScreenPoint,
        style: StreamStyle,
    },
}

impl DrawCommand {
    pub fn kind(&self) -> StreamKind {
        match self {
            DrawCommand::Line { kind, .. } | DrawCommand::Point { kind, .. } => *kind,
        }
    }

    pub fn is_line(&self) -> bool {
        matches!(self, DrawCommand::Line { .. })
    }
}

/// Turns a snapshot into a fixed drawing sequence: every stream's connections first,
/// then every stream's points, both in [`StreamKind::ALL`] order, so points always sit
/// on top of lines.
#[derive(Clone, Debug)]
pub struct OverlayRenderer {
    styles: [StreamStyle; 4],
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self {
            styles: StreamKind::ALL.map(StreamStyle::for_kind),
        }
    }

    pub fn style(&self, kind: StreamKind) -> StreamStyle {
        self.styles[kind.index()]
    }

    pub fn render(&self, snapshot: &StreamSnapshot) -> Vec<DrawCommand> {
        let mut commands = Vec::with_capacity(snapshot.total_points() * 2);
        self.render_into(snapshot, &mut commands);
        commands
    }

    pub fn render_into(&self, snapshot: &StreamSnapshot, commands: &mut Vec<DrawCommand>) {
        for kind in StreamKind::ALL {
            let style = self.style(kind);
            let points = snapshot.get(kind);
            // Indices past the end of a partial set are skipped.
            for &(a, b) in topology(kind) {
                if let (Some(&from), Some(&to)) = (points.get(a), points.get(b)) {
                    commands.push(DrawCommand::Line {
                        kind,
                        from,
                        to,
                        style,
                    });
                }
            }
        }

        for kind in StreamKind::ALL {
            let style = self.style(kind);
            commands.extend(snapshot.get(kind).iter().map(|&center| DrawCommand::Point {
                kind,
                center,
                style,
            }));
        }
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::LandmarkStreamState;
    use crate::types::LandmarkSet;

    fn points(len: usize) -> LandmarkSet {
        (0..len)
            .map(|i| ScreenPoint::new(i as f32, i as f32 * 10.0))
            .collect()
    }

    fn count(commands: &[DrawCommand], kind: StreamKind, lines: bool) -> usize {
        commands
            .iter()
            .filter(|cmd| cmd.kind() == kind && cmd.is_line() == lines)
            .count()
    }

    #[test]
    fn empty_snapshot_draws_nothing() {
        let state = LandmarkStreamState::new();
        assert!(OverlayRenderer::new().render(&state.snapshot()).is_empty());
    }

    #[test]
    fn empty_stream_emits_nothing_for_that_kind() {
        let state = LandmarkStreamState::new();
        state.update(StreamKind::LeftHand, points(21));
        let commands = OverlayRenderer::new().render(&state.snapshot());

        assert_eq!(count(&commands, StreamKind::LeftHand, true), HAND_CONNECTIONS.len());
        assert_eq!(count(&commands, StreamKind::LeftHand, false), 21);
        for kind in [StreamKind::Face, StreamKind::RightHand, StreamKind::Pose] {
            assert_eq!(count(&commands, kind, true), 0);
            assert_eq!(count(&commands, kind, false), 0);
        }
    }

    #[test]
    fn out_of_range_connections_are_skipped() {
        let state = LandmarkStreamState::new();
        // Five hand points: only thumb (0-1..3-4) connections are fully in range.
        state.update(StreamKind::RightHand, points(5));
        let commands = OverlayRenderer::new().render(&state.snapshot());

        let lines: Vec<(f32, f32)> = commands
            .iter()
            .filter_map(|cmd| match cmd {
                DrawCommand::Line { from, to, .. } => Some((from.x, to.x)),
                DrawCommand::Point { .. } => None,
            })
            .collect();
        assert_eq!(lines, vec![(0.0, 1.0), (1.0, 2.0), (2.0, 3.0), (3.0, 4.0)]);
        assert_eq!(count(&commands, StreamKind::RightHand, false), 5);
    }

    #[test]
    fn pose_index_past_end_does_not_affect_others() {
        let state = LandmarkStreamState::new();
        // 25 pose points: indices up to 24 exist, the leg connections do not.
        state.update(StreamKind::Pose, points(25));
        let commands = OverlayRenderer::new().render(&state.snapshot());
        assert_eq!(count(&commands, StreamKind::Pose, true), 8);
    }

    #[test]
    fn lines_precede_points_in_layer_order() {
        let state = LandmarkStreamState::new();
        state.update(StreamKind::Pose, points(33));
        state.update(StreamKind::Face, points(468));
        state.update(StreamKind::RightHand, points(21));
        state.update(StreamKind::LeftHand, points(21));
        let commands = OverlayRenderer::new().render(&state.snapshot());

        let first_point = commands
            .iter()
            .position(|cmd| !cmd.is_line())
            .expect("points drawn");
        assert!(commands[..first_point].iter().all(DrawCommand::is_line));
        assert!(commands[first_point..].iter().all(|cmd| !cmd.is_line()));

        let layer_order = |lines: bool| {
            let mut order: Vec<StreamKind> = Vec::new();
            for cmd in commands.iter().filter(|cmd| cmd.is_line() == lines) {
                if order.last() != Some(&cmd.kind()) {
                    order.push(cmd.kind());
                }
            }
            order
        };
        assert_eq!(layer_order(true), StreamKind::ALL.to_vec());
        assert_eq!(layer_order(false), StreamKind::ALL.to_vec());
    }

    #[test]
    fn each_kind_has_a_distinct_style() {
        let renderer = OverlayRenderer::new();
        let colors: Vec<[u8; 4]> = StreamKind::ALL
            .iter()
            .map(|kind| renderer.style(*kind).color)
            .collect();
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(renderer.style(StreamKind::Face).point_radius, 6.0);
        assert_eq!(renderer.style(StreamKind::LeftHand).point_radius, 8.0);
        assert_eq!(renderer.style(StreamKind::Pose).point_radius, 10.0);
    }
}
