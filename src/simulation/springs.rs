//! Spring allocation table.
//!
//! Every particle owns a window of spring slots, one slot per particle in its chunk's 3x3
//! neighbourhood. Windows are laid out chunk by chunk: chunk `c` reserves
//! `particles[c] * neighbourhood[c]` slots starting at the exclusive prefix sum of all earlier
//! reservations. The combined spring buffer holds two halves; the half named by the frame
//! parity is written this frame while the other half still holds last frame's springs.

use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};

use bevy::log::trace;

use super::grid::{ChunkGrid, PackedLayout};
use super::sort::SpatialIndex;
use crate::compute::{Buffer, Dispatcher, Kernel};
use crate::resources::{ChunkCapacity, Particle, Spring};

/// Number of Hillis-Steele passes needed to scan `len` elements: `ceil(log2(len))`.
pub fn scan_passes(len: u32) -> u32 {
    if len <= 1 {
        0
    } else {
        u32::BITS - (len - 1).leading_zeros()
    }
}

/// Spring windows of the current half, indexed by particle.
pub struct SpringWindows<'a> {
    pub windows: Vec<&'a mut [Spring]>,
    /// Spring columns past the end of the half; springs there are dropped.
    pub overflow: &'a AtomicU32,
}

pub struct SpringTable {
    chunk_sizes: Buffer<u32>,
    capacities: Buffer<ChunkCapacity>,
    /// `[parity 0 result, parity 1 result, scan support]`
    starts: [Buffer<u32>; 3],
    springs: Buffer<Spring>,
    half_len: usize,
    overflow: AtomicU32,
}

impl SpringTable {
    pub fn new(particle_count: u32, chunks_all: u32, spring_capacity_safety: u32) -> Self {
        let half_len = (particle_count as usize * spring_capacity_safety as usize / 2).max(1);
        let chunks = chunks_all as usize;
        Self {
            chunk_sizes: Buffer::zeroed("Chunk Sizes", chunks),
            capacities: Buffer::zeroed("Spring Capacities", chunks),
            starts: [
                Buffer::zeroed("Spring Start Indices A", chunks),
                Buffer::zeroed("Spring Start Indices B", chunks),
                Buffer::zeroed("Spring Start Indices Support", chunks),
            ],
            springs: Buffer::filled("Particle Springs", 2 * half_len, Spring::EMPTY),
            half_len,
            overflow: AtomicU32::new(0),
        }
    }

    /// Slots per half.
    pub fn half_len(&self) -> usize {
        self.half_len
    }

    pub fn byte_size(&self) -> u64 {
        self.springs.byte_size()
    }

    pub fn capacities(&self) -> &[ChunkCapacity] {
        self.capacities.as_slice()
    }

    /// Exclusive spring start offsets computed in the frame with the given parity.
    pub fn starts(&self, parity: usize) -> &[u32] {
        self.starts[parity].as_slice()
    }

    /// The half written in frames with the given parity.
    pub fn half(&self, parity: usize) -> &[Spring] {
        let begin = parity * self.half_len;
        &self.springs.as_slice()[begin..begin + self.half_len]
    }

    /// Springs dropped for lack of slots since the last reset.
    pub fn overflow(&self) -> u32 {
        self.overflow.load(Ordering::Relaxed)
    }

    pub fn reset_overflow(&mut self) {
        *self.overflow.get_mut() = 0;
    }

    /// Rebuild sizes, capacities and start offsets for the frame with the given parity.
    pub fn rebuild(
        &mut self,
        dispatcher: &mut Dispatcher,
        grid: &ChunkGrid,
        index: &SpatialIndex,
        parity: usize,
    ) {
        dispatcher.map(
            Kernel::PopulateChunkSizes,
            self.chunk_sizes.as_mut_slice(),
            |chunk, size| *size = index.chunk_range(chunk as u32).len() as u32,
        );

        let sizes = self.chunk_sizes.as_slice();
        dispatcher.map(
            Kernel::PopulateSpringCapacities,
            self.capacities.as_mut_slice(),
            |chunk, capacity| {
                let particles = sizes[chunk];
                let neighbourhood = grid
                    .neighbourhood(chunk as u32)
                    .map(|key| sizes[key as usize])
                    .sum();
                *capacity = ChunkCapacity {
                    particles,
                    neighbourhood,
                    springs: particles.saturating_mul(neighbourhood),
                    _padding: 0,
                };
            },
        );

        let capacities = self.capacities.as_slice();
        dispatcher.map(
            Kernel::CopySpringCapacities,
            self.starts[parity].as_mut_slice(),
            |chunk, start| *start = capacities[chunk].springs,
        );

        let chunks = capacities.len();
        let mut in_support = false;
        let mut offset = 1;
        while offset < chunks {
            let (src, dst) = scan_buffers(&mut self.starts, parity, !in_support);
            let src = src.as_slice();
            dispatcher.map(Kernel::ParallelPrefixSumScan, dst.as_mut_slice(), |i, sum| {
                *sum = if i >= offset {
                    src[i].saturating_add(src[i - offset])
                } else {
                    src[i]
                };
            });
            in_support = !in_support;
            offset *= 2;
        }

        // Inclusive sums to exclusive starts, copied back from the support buffer if the
        // last pass ended there.
        if in_support {
            let (src, dst) = scan_buffers(&mut self.starts, parity, false);
            let src = src.as_slice();
            dispatcher.map(Kernel::CopySpringStartIndices, dst.as_mut_slice(), |chunk, start| {
                *start = src[chunk].saturating_sub(capacities[chunk].springs);
            });
        } else {
            dispatcher.map(
                Kernel::CopySpringStartIndices,
                self.starts[parity].as_mut_slice(),
                |chunk, start| *start = start.saturating_sub(capacities[chunk].springs),
            );
        }
        trace!(
            "spring table: {} slots requested, {} per half",
            self.required_slots(parity),
            self.half_len
        );
    }

    /// Total slots the current layout asks for.
    pub fn required_slots(&self, parity: usize) -> u64 {
        let starts = self.starts[parity].as_slice();
        let capacities = self.capacities.as_slice();
        match (starts.last(), capacities.last()) {
            (Some(start), Some(capacity)) => *start as u64 + capacity.springs as u64,
            _ => 0,
        }
    }

    /// Spring column of the particle with in-chunk `order` in chunk `neighbour` as seen from
    /// chunk `key`: particles of all earlier neighbourhood chunks come first.
    pub fn column(&self, grid: &ChunkGrid, key: u32, neighbour: u32, order: u32) -> u32 {
        neighbour_column(grid, self.chunk_sizes.as_slice(), key, neighbour, order)
    }

    /// Slot range (within a half) of the window of the particle in chunk `key` with in-chunk
    /// `order`. May extend past the end of the half.
    pub fn window(&self, parity: usize, key: u32, order: u32) -> Range<usize> {
        let capacity = self.capacities[key as usize];
        let start = self.starts[parity][key as usize] as usize
            + order as usize * capacity.neighbourhood as usize;
        start..start + capacity.neighbourhood as usize
    }

    /// Clear this frame's half.
    pub fn prep(&mut self, dispatcher: &mut Dispatcher, parity: usize) {
        let (this_half, _) = split_halves(self.springs.as_mut_slice(), self.half_len, parity);
        dispatcher.map(Kernel::PrepSpringData, this_half, |_, spring| *spring = Spring::EMPTY);
    }

    /// Move last frame's springs into this frame's layout. A spring survives when both
    /// endpoints are still within the max influence radius of each other and the second
    /// endpoint still lies in the first one's neighbourhood.
    pub fn transfer(
        &mut self,
        dispatcher: &mut Dispatcher,
        grid: &ChunkGrid,
        layout: &PackedLayout,
        particles: &[Particle],
        parity: usize,
    ) {
        let half_len = self.half_len;
        let max_dst_sqr = grid.radius() * grid.radius();
        let (this_half, last_half) =
            split_halves(self.springs.as_mut_slice(), half_len, parity);
        let table = TableView {
            chunk_sizes: self.chunk_sizes.as_slice(),
            capacities: self.capacities.as_slice(),
            starts: self.starts[parity].as_slice(),
        };
        let overflow = &self.overflow;

        dispatcher.scatter(Kernel::TransferAllSpringData, half_len, this_half, |i| {
            let spring = last_half[i];
            if spring.is_empty() {
                return None;
            }
            let a = particles.get(spring.particle_a as usize)?;
            let b = particles.get(spring.particle_b as usize)?;
            if a.position().distance_squared(b.position()) > max_dst_sqr {
                return None;
            }
            let key_a = layout.key(a.packed);
            let key_b = layout.key(b.packed);
            if !grid.is_neighbour(key_a, key_b) {
                return None;
            }
            let column = table.column(grid, key_a, key_b, layout.order(b.packed));
            let slot = table.slot(key_a, layout.order(a.packed), column);
            if slot >= half_len {
                overflow.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some((slot, spring))
        });
    }

    /// Split this frame's half into per-particle windows. Windows are handed out in sorted
    /// order, which is also ascending slot order, so they never alias.
    pub fn windows_mut(
        &mut self,
        parity: usize,
        index: &SpatialIndex,
        particle_count: usize,
    ) -> SpringWindows<'_> {
        let half_len = self.half_len;
        let mut windows: Vec<&mut [Spring]> = Vec::new();
        windows.resize_with(particle_count, Default::default);

        let ranges: Vec<(usize, Range<usize>)> = index.lookup()[..particle_count]
            .iter()
            .enumerate()
            .map(|(slot, entry)| {
                let order = slot as u32 - index.start_indices()[entry.key as usize];
                (entry.index as usize, self.window(parity, entry.key, order))
            })
            .collect();

        let (this_half, _) = split_halves(self.springs.as_mut_slice(), half_len, parity);
        let mut rest = this_half;
        let mut consumed = 0;
        for (particle, range) in ranges {
            let start = range.start.min(half_len);
            let end = range.end.min(half_len);
            let (_, tail) = std::mem::take(&mut rest).split_at_mut(start - consumed);
            let (window, tail) = tail.split_at_mut(end - start);
            rest = tail;
            consumed = end;
            windows[particle] = window;
        }

        SpringWindows {
            windows,
            overflow: &self.overflow,
        }
    }
}

/// Read-only view of this frame's table, shareable across lanes.
struct TableView<'a> {
    chunk_sizes: &'a [u32],
    capacities: &'a [ChunkCapacity],
    starts: &'a [u32],
}

impl TableView<'_> {
    fn column(&self, grid: &ChunkGrid, key: u32, neighbour: u32, order: u32) -> u32 {
        neighbour_column(grid, self.chunk_sizes, key, neighbour, order)
    }

    fn slot(&self, key: u32, order: u32, column: u32) -> usize {
        self.starts[key as usize] as usize
            + order as usize * self.capacities[key as usize].neighbourhood as usize
            + column as usize
    }
}

fn neighbour_column(grid: &ChunkGrid, sizes: &[u32], key: u32, neighbour: u32, order: u32) -> u32 {
    grid.neighbourhood(key)
        .take_while(|chunk| *chunk != neighbour)
        .map(|chunk| sizes[chunk as usize])
        .sum::<u32>()
        + order
}

/// `(this frame's half, last frame's half)`
fn split_halves(springs: &mut [Spring], half_len: usize, parity: usize) -> (&mut [Spring], &[Spring]) {
    let (first, second) = springs.split_at_mut(half_len);
    if parity == 0 {
        (first, &*second)
    } else {
        (second, &*first)
    }
}

/// `(source, destination)` of one scan pass.
fn scan_buffers(
    starts: &mut [Buffer<u32>; 3],
    parity: usize,
    into_support: bool,
) -> (&Buffer<u32>, &mut Buffer<u32>) {
    let [first, second, support] = starts;
    let result = if parity == 0 { first } else { second };
    if into_support {
        (&*result, support)
    } else {
        (&*support, result)
    }
}
