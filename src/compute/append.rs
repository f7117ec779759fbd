//! Append buffers: growable kernel output with an atomic counter.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

/// Fixed-capacity output list filled by many lanes at once.
///
/// A producer lane claims a unique slot by atomically incrementing the counter and writes its
/// element into that slot exactly once. Element order is whatever order the claims happened in,
/// so consumers must not depend on it. The live count becomes meaningful to the host only after
/// the producing dispatch has finished; reading it is an explicit sync point
/// ([`crate::compute::Dispatcher::read_back_count`]).
pub struct AppendBuffer<T> {
    label: &'static str,
    slots: Box<[OnceLock<T>]>,
    counter: AtomicU32,
    dropped: AtomicU32,
}

impl<T: Copy + Send + Sync> AppendBuffer<T> {
    pub fn with_capacity(label: &'static str, capacity: usize) -> Self {
        Self {
            label,
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
            counter: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Claim a slot and write `item` into it. Returns `false` when the buffer is full, in which
    /// case the element is dropped and counted in [`AppendBuffer::dropped`].
    pub fn append(&self, item: T) -> bool {
        let slot = self.counter.fetch_add(1, Ordering::AcqRel) as usize;
        match self.slots.get(slot) {
            Some(cell) => {
                // Slots are claimed once per reset, so the cell is always empty here.
                let _ = cell.set(item);
                true
            }
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Set the counter back to zero. Must be called before every reuse.
    pub fn reset_counter(&mut self) {
        let live = self.live_len();
        for slot in &mut self.slots[..live] {
            slot.take();
        }
        *self.counter.get_mut() = 0;
        *self.dropped.get_mut() = 0;
    }

    /// Number of stored elements as seen from inside a kernel (no host round trip).
    pub fn live_len(&self) -> usize {
        (self.counter.load(Ordering::Acquire) as usize).min(self.slots.len())
    }

    /// Number of stored elements, read back to the host.
    pub(crate) fn read_count(&self) -> u32 {
        self.live_len() as u32
    }

    /// Elements that did not fit since the last reset.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.live_len() {
            self.slots[index].get()
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.slots[..self.live_len()].iter().filter_map(OnceLock::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn concurrent_appends_claim_unique_slots() {
        let mut buffer = AppendBuffer::<u32>::with_capacity("Test Append", 1000);
        (0..1000u32).into_par_iter().for_each(|i| {
            buffer.append(i);
        });

        assert_eq!(buffer.read_count(), 1000);
        let mut values: Vec<u32> = buffer.iter().copied().collect();
        values.sort_unstable();
        assert_eq!(values, (0..1000).collect::<Vec<_>>());

        buffer.reset_counter();
        assert_eq!(buffer.read_count(), 0);
        assert!(buffer.get(0).is_none());
    }

    #[test]
    fn overflow_is_dropped_and_counted() {
        let buffer = AppendBuffer::<u32>::with_capacity("Small Append", 4);
        for i in 0..6 {
            buffer.append(i);
        }
        assert_eq!(buffer.read_count(), 4);
        assert_eq!(buffer.dropped(), 2);
    }
}
