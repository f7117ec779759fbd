//! Bitonic sorting of the spatial lookup and of the stickiness requests.
//!
//! The network is the flip/disperse formulation: every stage starts with a flip step that
//! compares each element with its mirror inside the block, followed by disperse steps that
//! compare elements half a block apart. Every comparison sorts ascending, so no per-block
//! direction bookkeeping is needed.

use bevy::log::trace;

use super::grid::{ChunkGrid, PackedLayout};
use crate::compute::{AppendBuffer, Buffer, Dispatcher, Kernel};
use crate::resources::{Particle, SpatialEntry, StickyRequest, SENTINEL};

/// Smallest power of two `>= n` (1 for 0).
pub fn next_pow2(n: u32) -> u32 {
    n.max(1).next_power_of_two()
}

/// One compare-and-swap step of the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitonicStep {
    pub block_len: usize,
    pub flip: bool,
}

/// The steps of a bitonic sort over `len` elements, in dispatch order.
pub struct BitonicSchedule {
    len: usize,
    stage: usize,
    block_len: usize,
}

impl BitonicSchedule {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            stage: 2,
            block_len: 2,
        }
    }
}

impl Iterator for BitonicSchedule {
    type Item = BitonicStep;

    fn next(&mut self) -> Option<BitonicStep> {
        if self.stage > self.len {
            return None;
        }
        let step = BitonicStep {
            block_len: self.block_len,
            flip: self.block_len == self.stage,
        };
        self.block_len /= 2;
        if self.block_len < 2 {
            self.stage *= 2;
            self.block_len = self.stage;
        }
        Some(step)
    }
}

#[inline]
fn compare_and_swap<T, K: Ord>(a: &mut T, b: &mut T, key: &impl Fn(&T) -> K) {
    if key(b) < key(a) {
        std::mem::swap(a, b);
    }
}

/// Sort `entries` ascending by `key`, one dispatch of `kernel` per network step.
/// `entries.len()` must be a power of two.
pub fn bitonic_sort<T, K, F>(dispatcher: &mut Dispatcher, kernel: Kernel, entries: &mut [T], key: F)
where
    T: Send,
    K: Ord,
    F: Fn(&T) -> K + Sync + Send,
{
    debug_assert!(entries.is_empty() || entries.len().is_power_of_two());
    for step in BitonicSchedule::new(entries.len()) {
        let half = step.block_len / 2;
        dispatcher.map_blocks(kernel, entries, step.block_len, |block| {
            let (lo, hi) = block.split_at_mut(half);
            if step.flip {
                for (a, b) in lo.iter_mut().zip(hi.iter_mut().rev()) {
                    compare_and_swap(a, b, &key);
                }
            } else {
                for (a, b) in lo.iter_mut().zip(hi.iter_mut()) {
                    compare_and_swap(a, b, &key);
                }
            }
        });
    }
}

/// Particles bucketed by chunk: the sorted `(key, index)` lookup plus the first sorted slot of
/// every chunk.
pub struct SpatialIndex {
    lookup: Buffer<SpatialEntry>,
    start_indices: Buffer<u32>,
    particle_count: usize,
}

impl SpatialIndex {
    pub fn new(particle_count: u32, chunks_all: u32) -> Self {
        Self {
            lookup: Buffer::filled(
                "Spatial Lookup",
                next_pow2(particle_count) as usize,
                SpatialEntry::PADDING,
            ),
            start_indices: Buffer::filled("Start Indices", chunks_all as usize, SENTINEL),
            particle_count: particle_count as usize,
        }
    }

    pub fn lookup(&self) -> &[SpatialEntry] {
        self.lookup.as_slice()
    }

    pub fn start_indices(&self) -> &[u32] {
        self.start_indices.as_slice()
    }

    /// Full per-frame rebuild: keys, sort, start indices, then each particle's packed chunk key
    /// and in-chunk order.
    pub fn rebuild(
        &mut self,
        dispatcher: &mut Dispatcher,
        grid: &ChunkGrid,
        layout: &PackedLayout,
        particles: &mut Buffer<Particle>,
    ) {
        self.calculate_chunk_keys(dispatcher, grid, particles);
        bitonic_sort(
            dispatcher,
            Kernel::SortIteration,
            self.lookup.as_mut_slice(),
            |entry| entry.key,
        );
        self.populate_start_indices(dispatcher);
        self.record_chunk_orders(dispatcher, layout, particles);
    }

    fn calculate_chunk_keys(
        &mut self,
        dispatcher: &mut Dispatcher,
        grid: &ChunkGrid,
        particles: &Buffer<Particle>,
    ) {
        let count = self.particle_count;
        dispatcher.map(
            Kernel::CalculateChunkKeys,
            self.lookup.as_mut_slice(),
            |i, entry| {
                *entry = if i < count {
                    SpatialEntry {
                        key: grid.key_for(particles[i].position()),
                        index: i as u32,
                    }
                } else {
                    SpatialEntry::PADDING
                };
            },
        );
    }

    fn populate_start_indices(&mut self, dispatcher: &mut Dispatcher) {
        dispatcher.map(
            Kernel::ClearStartIndices,
            self.start_indices.as_mut_slice(),
            |_, start| *start = SENTINEL,
        );

        let lookup = self.lookup.as_slice();
        dispatcher.scatter(
            Kernel::PopulateStartIndices,
            lookup.len(),
            self.start_indices.as_mut_slice(),
            |i| {
                let key = lookup[i].key;
                let first_of_run = i == 0 || lookup[i - 1].key != key;
                (key != SENTINEL && first_of_run).then_some((key as usize, i as u32))
            },
        );
    }

    fn record_chunk_orders(
        &self,
        dispatcher: &mut Dispatcher,
        layout: &PackedLayout,
        particles: &mut Buffer<Particle>,
    ) {
        let lookup = self.lookup.as_slice();
        let starts = self.start_indices.as_slice();
        dispatcher.scatter_with(
            Kernel::RecordChunkOrders,
            self.particle_count,
            particles.as_mut_slice(),
            |i| {
                let entry = lookup[i];
                let order = i as u32 - starts[entry.key as usize];
                Some((entry.index as usize, (entry.key, order)))
            },
            |particle, (key, order)| {
                particle.packed = layout.with_key_order(particle.packed, key, order);
            },
        );
    }

    /// Sorted slots holding the particles of chunk `key`.
    pub fn chunk_range(&self, key: u32) -> std::ops::Range<usize> {
        let start = self.start_indices[key as usize];
        if start == SENTINEL {
            return 0..0;
        }
        let start = start as usize;
        let len = self.lookup.as_slice()[start..]
            .iter()
            .take_while(|entry| entry.key == key)
            .count();
        start..start + len
    }

    /// Indices of the particles in chunk `key`, in in-chunk order.
    pub fn chunk_particles(&self, key: u32) -> impl Iterator<Item = u32> + '_ {
        self.lookup.as_slice()[self.chunk_range(key)]
            .iter()
            .map(|entry| entry.index)
    }

    /// Visit every particle of the 3x3 neighbourhood of chunk `key`. The first argument is the
    /// particle's enumeration index within the neighbourhood, which is also its spring column.
    pub fn for_each_neighbour(&self, grid: &ChunkGrid, key: u32, mut visit: impl FnMut(u32, u32)) {
        let mut column = 0;
        for chunk in grid.neighbourhood(key) {
            for index in self.chunk_particles(chunk) {
                visit(column, index);
                column += 1;
            }
        }
    }
}

/// Sort the requests produced this substep by particle index into `sorted`, padding up to the
/// next power of two. Returns the number of live requests; on zero no kernel is dispatched.
pub fn sort_sticky_requests(
    dispatcher: &mut Dispatcher,
    requests: &AppendBuffer<StickyRequest>,
    sorted: &mut Buffer<StickyRequest>,
) -> usize {
    let count = dispatcher.read_back_count(requests) as usize;
    if count == 0 {
        return 0;
    }
    let len = (next_pow2(count as u32) as usize).min(sorted.len());
    let sorted = &mut sorted.as_mut_slice()[..len];

    dispatcher.map(Kernel::PopulateSortedStickyRequests, sorted, |i, slot| {
        *slot = if i < count {
            requests.get(i).copied().unwrap_or(StickyRequest::PADDING)
        } else {
            StickyRequest::PADDING
        };
    });
    bitonic_sort(dispatcher, Kernel::StickySortIteration, sorted, |request| request.particle);
    trace!("sorted {} stickiness requests into {} slots", count, len);
    count.min(len)
}
