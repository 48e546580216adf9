use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::types::{LandmarkSet, ScreenPoint, StreamKind};

/// Latest render-ready landmarks per stream.
///
/// Each slot is replaced wholesale under its own lock, so a reader sees either the old
/// or the new list, never a mix. Slots are independent: one snapshot can combine sets
/// that came from different camera frames.
#[derive(Debug)]
pub struct LandmarkStreamState {
    slots: [Mutex<Arc<LandmarkSet>>; 4],
    redraw_tx: Option<Sender<()>>,
}

/// The four landmark sets as read by one render pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamSnapshot {
    sets: [Arc<LandmarkSet>; 4],
}

impl StreamSnapshot {
    pub fn get(&self, kind: StreamKind) -> &[ScreenPoint] {
        &self.sets[kind.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(|set| set.is_empty())
    }

    pub fn total_points(&self) -> usize {
        self.sets.iter().map(|set| set.len()).sum()
    }
}

impl LandmarkStreamState {
    /// State without a redraw signal, for callers that poll.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Mutex::new(Arc::default())),
            redraw_tx: None,
        }
    }

    /// State that notifies the returned receiver whenever a slot changes. Pending
    /// notifications coalesce into one.
    pub fn with_redraw_channel() -> (Self, Receiver<()>) {
        let (redraw_tx, redraw_rx) = bounded(1);
        let state = Self {
            redraw_tx: Some(redraw_tx),
            ..Self::new()
        };
        (state, redraw_rx)
    }

    pub fn update(&self, kind: StreamKind, points: LandmarkSet) {
        log::trace!("{} landmarks replaced ({} points)", kind.label(), points.len());
        *self.slot(kind) = Arc::new(points);
        self.request_redraw();
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            sets: std::array::from_fn(|idx| self.slot(StreamKind::ALL[idx]).clone()),
        }
    }

    /// Empties every slot.
    pub fn clear(&self) {
        for kind in StreamKind::ALL {
            *self.slot(kind) = Arc::default();
        }
        self.request_redraw();
    }

    fn slot(&self, kind: StreamKind) -> MutexGuard<'_, Arc<LandmarkSet>> {
        self.slots[kind.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn request_redraw(&self) {
        if let Some(tx) = &self.redraw_tx {
            // Full means a redraw is already pending.
            let _ = tx.try_send(());
        }
    }
}

impl Default for LandmarkStreamState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn line(len: usize, seed: f32) -> LandmarkSet {
        (0..len)
            .map(|i| ScreenPoint::new(seed + i as f32, seed * 2.0 + i as f32))
            .collect()
    }

    #[test]
    fn starts_empty() {
        let state = LandmarkStreamState::new();
        let snapshot = state.snapshot();
        assert!(snapshot.is_empty());
        for kind in StreamKind::ALL {
            assert!(snapshot.get(kind).is_empty());
        }
    }

    #[test]
    fn update_replaces_only_its_slot() {
        let state = LandmarkStreamState::new();
        state.update(StreamKind::Pose, line(33, 1.0));
        state.update(StreamKind::LeftHand, line(21, 5.0));
        state.update(StreamKind::Pose, line(3, 9.0));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.get(StreamKind::Pose), line(3, 9.0).as_slice());
        assert_eq!(snapshot.get(StreamKind::LeftHand), line(21, 5.0).as_slice());
        assert!(snapshot.get(StreamKind::Face).is_empty());
        assert_eq!(snapshot.total_points(), 24);
    }

    #[test]
    fn concurrent_updates_are_never_torn() {
        let state = Arc::new(LandmarkStreamState::new());
        let inputs: Vec<(StreamKind, LandmarkSet)> = StreamKind::ALL
            .iter()
            .enumerate()
            .map(|(idx, kind)| (*kind, line(100 + idx * 50, idx as f32 * 1000.0)))
            .collect();

        let writers: Vec<_> = inputs
            .iter()
            .cloned()
            .map(|(kind, points)| {
                let state = state.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        state.update(kind, points.clone());
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().expect("writer panicked");
        }

        let snapshot = state.snapshot();
        for (kind, points) in &inputs {
            assert_eq!(snapshot.get(*kind), points.as_slice());
        }
    }

    #[test]
    fn redraw_requests_coalesce() {
        let (state, redraw_rx) = LandmarkStreamState::with_redraw_channel();
        state.update(StreamKind::Face, line(4, 0.0));
        state.update(StreamKind::Pose, line(4, 0.0));

        assert!(redraw_rx.try_recv().is_ok());
        assert!(redraw_rx.try_recv().is_err());
    }

    #[test]
    fn clear_resets_all_slots() {
        let (state, redraw_rx) = LandmarkStreamState::with_redraw_channel();
        for kind in StreamKind::ALL {
            state.update(kind, line(5, 1.0));
        }
        let _ = redraw_rx.try_recv();

        state.clear();
        assert!(state.snapshot().is_empty());
        assert!(redraw_rx.try_recv().is_ok());
    }
}
