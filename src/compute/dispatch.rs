//! Named kernels and the dispatcher that runs them.

use std::collections::BTreeMap;

use bevy::log::trace;
use rayon::prelude::*;

use super::append::AppendBuffer;

/// Shader family a kernel belongs to. Each family has its own thread-group size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelFamily {
    Sort,
    ParticleSim,
    RigidBody,
}

impl KernelFamily {
    pub const fn thread_group_size(self) -> u32 {
        match self {
            KernelFamily::Sort => 512,
            KernelFamily::ParticleSim => 512,
            KernelFamily::RigidBody => 32,
        }
    }
}

/// Every kernel of the simulation pipeline.
///
/// The doc line of each variant lists its buffer bindings (`r` = read, `w` = lane-owned write,
/// `s` = write-once scatter, `a` = atomic append/add).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kernel {
    /// particles (r), spatial lookup (w)
    CalculateChunkKeys,
    /// spatial lookup (rw pairs)
    SortIteration,
    /// start indices (w)
    ClearStartIndices,
    /// spatial lookup (r), start indices (s)
    PopulateStartIndices,
    /// spatial lookup (r), start indices (r), particles (s)
    RecordChunkOrders,
    /// spatial lookup (r), start indices (r), chunk capacities (w)
    PopulateChunkSizes,
    /// chunk capacities (rw)
    PopulateSpringCapacities,
    /// chunk capacities (r), spring starts\[parity\] (w)
    CopySpringCapacities,
    /// spring starts (ping-pong r/w)
    ParallelPrefixSumScan,
    /// spring starts\[support\] (r), spring starts\[parity\] (w)
    CopySpringStartIndices,
    /// sticky request append (r), sorted sticky requests (w)
    PopulateSortedStickyRequests,
    /// sorted sticky requests (rw pairs)
    StickySortIteration,
    /// particles (w)
    PreCalculate,
    /// particles (w), spatial lookup (r), start indices (r), particle types (r)
    CalculateDensities,
    /// springs\[this half\] (w)
    PrepSpringData,
    /// springs\[last half\] (r), springs\[this half\] (s), particles (r), tables (r)
    TransferAllSpringData,
    /// particles (w), springs\[this half\] (s), spatial lookup (r), tables (r)
    ParticleForces,
    /// sorted sticky requests (r), particles (s)
    ConsumeStickyRequests,
    /// particles (w), particle corrections (r)
    UpdatePositions,
    /// rigid bodies (r), rigid body vertices (w)
    ApplyLocalAngularRotation,
    /// rigid body vertices (r), traversed chunks (a)
    PopulateTraversedChunks,
    /// traversed chunks (r), particles (r), corrections (a), vertex impulses (a), sticky requests (a)
    ResolveLineCollisions,
    /// vertex impulses (r), rigid bodies (w), rigid body vertices (w)
    RbForces,
}

impl Kernel {
    pub const ALL: [Kernel; 23] = [
        Kernel::CalculateChunkKeys,
        Kernel::SortIteration,
        Kernel::ClearStartIndices,
        Kernel::PopulateStartIndices,
        Kernel::RecordChunkOrders,
        Kernel::PopulateChunkSizes,
        Kernel::PopulateSpringCapacities,
        Kernel::CopySpringCapacities,
        Kernel::ParallelPrefixSumScan,
        Kernel::CopySpringStartIndices,
        Kernel::PopulateSortedStickyRequests,
        Kernel::StickySortIteration,
        Kernel::PreCalculate,
        Kernel::CalculateDensities,
        Kernel::PrepSpringData,
        Kernel::TransferAllSpringData,
        Kernel::ParticleForces,
        Kernel::ConsumeStickyRequests,
        Kernel::UpdatePositions,
        Kernel::ApplyLocalAngularRotation,
        Kernel::PopulateTraversedChunks,
        Kernel::ResolveLineCollisions,
        Kernel::RbForces,
    ];

    pub const fn family(self) -> KernelFamily {
        use Kernel::*;
        match self {
            CalculateChunkKeys
            | SortIteration
            | ClearStartIndices
            | PopulateStartIndices
            | RecordChunkOrders
            | PopulateChunkSizes
            | PopulateSpringCapacities
            | CopySpringCapacities
            | ParallelPrefixSumScan
            | CopySpringStartIndices
            | PopulateSortedStickyRequests
            | StickySortIteration => KernelFamily::Sort,
            PreCalculate
            | CalculateDensities
            | PrepSpringData
            | TransferAllSpringData
            | ParticleForces
            | ConsumeStickyRequests
            | UpdatePositions => KernelFamily::ParticleSim,
            ApplyLocalAngularRotation
            | PopulateTraversedChunks
            | ResolveLineCollisions
            | RbForces => KernelFamily::RigidBody,
        }
    }

    pub const fn thread_group_size(self) -> u32 {
        self.family().thread_group_size()
    }
}

/// Number of thread groups needed to cover `threads` lanes.
pub fn thread_groups(threads: u32, group_size: u32) -> u32 {
    threads.div_ceil(group_size)
}

/// Per-kernel dispatch counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatches: u32,
    pub thread_groups: u64,
    pub lanes: u64,
}

/// Runs kernels over parallel lanes and keeps count of what ran.
///
/// Lanes past the requested thread count (padding of the last thread group) exit immediately,
/// the same way a compute shader guards on its invocation id. A dispatch with zero threads is
/// skipped entirely.
#[derive(Default)]
pub struct Dispatcher {
    stats: BTreeMap<Kernel, DispatchStats>,
    sync_points: u32,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, kernel: Kernel, threads: usize) -> bool {
        if threads == 0 {
            return false;
        }
        let groups = thread_groups(threads as u32, kernel.thread_group_size());
        let stats = self.stats.entry(kernel).or_default();
        stats.dispatches += 1;
        stats.thread_groups += groups as u64;
        stats.lanes += threads as u64;
        trace!("dispatch {:?}: {} threads in {} groups", kernel, threads, groups);
        true
    }

    /// Lanes with side effects through atomics only.
    pub fn for_each<F>(&mut self, kernel: Kernel, threads: usize, lane: F)
    where
        F: Fn(usize) + Sync + Send,
    {
        if self.record(kernel, threads) {
            (0..threads).into_par_iter().for_each(lane);
        }
    }

    /// One lane per element; each lane writes only its own element.
    pub fn map<T, F>(&mut self, kernel: Kernel, data: &mut [T], lane: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        if self.record(kernel, data.len()) {
            data.par_iter_mut()
                .enumerate()
                .for_each(|(index, item)| lane(index, item));
        }
    }

    /// Write-once scatter: every lane may emit one `(slot, value)` pair; each slot must have at
    /// most one owner. Writes become visible when the dispatch completes.
    pub fn scatter<T, F>(&mut self, kernel: Kernel, threads: usize, target: &mut [T], lane: F)
    where
        T: Send,
        F: Fn(usize) -> Option<(usize, T)> + Sync + Send,
    {
        self.scatter_with(kernel, threads, target, lane, |slot, value| *slot = value);
    }

    /// Like [`Dispatcher::scatter`], but the lane emits a partial update that `commit` folds
    /// into the owned slot (a lane writing one field of a record).
    pub fn scatter_with<T, V, F, C>(
        &mut self,
        kernel: Kernel,
        threads: usize,
        target: &mut [T],
        lane: F,
        commit: C,
    ) where
        V: Send,
        F: Fn(usize) -> Option<(usize, V)> + Sync + Send,
        C: Fn(&mut T, V),
    {
        if !self.record(kernel, threads) {
            return;
        }
        let writes: Vec<(usize, V)> = (0..threads).into_par_iter().filter_map(lane).collect();
        for (slot, value) in writes {
            commit(&mut target[slot], value);
        }
    }

    /// One lane per block of `block_len` elements; used by compare-and-swap networks where each
    /// block is an independent set of pairs. Counted as `data.len() / 2` comparison threads.
    pub fn map_blocks<T, F>(&mut self, kernel: Kernel, data: &mut [T], block_len: usize, lane: F)
    where
        T: Send,
        F: Fn(&mut [T]) + Sync + Send,
    {
        if block_len < 2 || !self.record(kernel, data.len() / 2) {
            return;
        }
        data.par_chunks_mut(block_len).for_each(lane);
    }

    /// Blocking readback of an append buffer's live count.
    pub fn read_back_count<T: Copy + Send + Sync>(&mut self, buffer: &AppendBuffer<T>) -> u32 {
        self.sync_points += 1;
        let count = buffer.read_count();
        trace!("readback {}: {}", buffer.label(), count);
        count
    }

    pub fn stats(&self, kernel: Kernel) -> DispatchStats {
        self.stats.get(&kernel).copied().unwrap_or_default()
    }

    /// Host/device synchronisation points taken so far.
    pub fn sync_points(&self) -> u32 {
        self.sync_points
    }
}
