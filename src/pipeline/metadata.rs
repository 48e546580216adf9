use std::{
    collections::VecDeque,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::types::FrameMetadata;

pub const DEFAULT_METADATA_CAPACITY: usize = 32;

/// FIFO of per-frame metadata shared by the producer and every detector completion.
///
/// Each frame pushes one entry; each completion pops one, whichever detector it comes
/// from. Which frame a completion actually belongs to is not observable, so pairing by
/// arrival order is an approximation: with three detectors racing for the head, one of
/// them may well read the entry of the next frame. The queue is bounded and drops the
/// oldest entry on overflow so a stalled detector cannot grow it without limit.
#[derive(Debug)]
pub struct FrameMetadataChannel {
    entries: Mutex<VecDeque<FrameMetadata>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl FrameMetadataChannel {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, metadata: FrameMetadata) {
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            log::debug!(
                "frame metadata queue full ({}), dropped oldest entry ({dropped} total)",
                self.capacity
            );
        }
        entries.push_back(metadata);
    }

    /// Never blocks; `None` when no metadata is pending.
    pub fn pop(&self) -> Option<FrameMetadata> {
        self.lock().pop_front()
    }

    /// Pops the head, falling back to an upright frame when the queue is empty.
    pub fn pop_or_default(&self) -> FrameMetadata {
        self.pop().unwrap_or_else(|| {
            log::debug!("frame metadata queue empty, assuming upright frame");
            FrameMetadata::default()
        })
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<FrameMetadata>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FrameMetadataChannel {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::types::Rotation;

    fn meta(degrees: i32) -> FrameMetadata {
        FrameMetadata::new(Rotation::from_degrees(degrees).expect("valid rotation"))
    }

    #[test]
    fn pops_in_push_order_then_falls_back() {
        let channel = FrameMetadataChannel::new(8);
        for degrees in [90, 0, 270, 180] {
            channel.push(meta(degrees));
        }

        let popped: Vec<i32> = (0..4)
            .map(|_| channel.pop().expect("entry").rotation.degrees())
            .collect();
        assert_eq!(popped, vec![90, 0, 270, 180]);

        assert_eq!(channel.pop(), None);
        assert_eq!(channel.pop_or_default(), FrameMetadata::new(Rotation::Deg0));
    }

    #[test]
    fn overflow_drops_oldest() {
        let channel = FrameMetadataChannel::new(2);
        channel.push(meta(90));
        channel.push(meta(180));
        channel.push(meta(270));

        assert_eq!(channel.len(), 2);
        assert_eq!(channel.dropped(), 1);
        assert_eq!(channel.pop(), Some(meta(180)));
        assert_eq!(channel.pop(), Some(meta(270)));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let channel = FrameMetadataChannel::new(0);
        assert_eq!(channel.capacity(), 1);
        channel.push(meta(90));
        channel.push(meta(180));
        assert_eq!(channel.pop(), Some(meta(180)));
    }

    #[test]
    fn clear_discards_pending_entries() {
        let channel = FrameMetadataChannel::default();
        channel.push(meta(90));
        channel.push(meta(90));
        channel.clear();
        assert!(channel.is_empty());
        assert_eq!(channel.pop_or_default().rotation, Rotation::Deg0);
    }

    #[test]
    fn concurrent_pops_consume_each_entry_once() {
        let channel = Arc::new(FrameMetadataChannel::new(300));
        for i in 0..300 {
            channel.push(meta([0, 90, 180, 270][i % 4]));
        }

        let workers: Vec<_> = (0..3)
            .map(|_| {
                let channel = channel.clone();
                thread::spawn(move || {
                    let mut taken = 0usize;
                    while channel.pop().is_some() {
                        taken += 1;
                    }
                    taken
                })
            })
            .collect();

        let total: usize = workers
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .sum();
        assert_eq!(total, 300);
        assert!(channel.is_empty());
    }
}
