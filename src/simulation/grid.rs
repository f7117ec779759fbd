//! Chunk grid: maps world positions to chunk keys.
//!
//! Every pass that needs a chunk for a position (sort keys, neighbour scans, spring addressing,
//! rigid-body edge walks) goes through [`ChunkGrid`], so all of them agree bit for bit.

use bevy::math::{IVec2, UVec2, Vec2};

/// Uniform grid of square chunks whose side is the max influence radius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkGrid {
    radius: f32,
    inv_radius: f32,
    chunks: UVec2,
}

impl ChunkGrid {
    /// World size is rounded up to a whole number of chunks.
    pub fn new(width: f32, height: f32, radius: f32) -> Self {
        let chunks = UVec2::new(
            (width / radius).ceil().max(1.0) as u32,
            (height / radius).ceil().max(1.0) as u32,
        );
        Self {
            radius,
            inv_radius: 1.0 / radius,
            chunks,
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn chunks(&self) -> UVec2 {
        self.chunks
    }

    /// Total number of chunks.
    pub fn chunks_all(&self) -> u32 {
        self.chunks.x * self.chunks.y
    }

    /// World extent covered by the grid.
    pub fn extent(&self) -> Vec2 {
        self.chunks.as_vec2() * self.radius
    }

    /// Chunk coordinates of a position. Positions outside the grid are clamped to the border
    /// chunks; a position exactly on a chunk boundary belongs to the higher chunk.
    #[inline]
    pub fn chunk_coords(&self, pos: Vec2) -> UVec2 {
        let scaled = (pos * self.inv_radius).floor();
        UVec2::new(
            scaled.x.clamp(0.0, (self.chunks.x - 1) as f32) as u32,
            scaled.y.clamp(0.0, (self.chunks.y - 1) as f32) as u32,
        )
    }

    #[inline]
    pub fn chunk_key(&self, coords: UVec2) -> u32 {
        coords.x + coords.y * self.chunks.x
    }

    #[inline]
    pub fn key_for(&self, pos: Vec2) -> u32 {
        self.chunk_key(self.chunk_coords(pos))
    }

    #[inline]
    pub fn coords_of(&self, key: u32) -> UVec2 {
        UVec2::new(key % self.chunks.x, key / self.chunks.x)
    }

    /// Keys of the valid chunks in the 3x3 block around `key`, in a fixed order
    /// (rows bottom to top, columns left to right). Every neighbour scan and every spring slot
    /// computation uses this order.
    pub fn neighbourhood(&self, key: u32) -> impl Iterator<Item = u32> + '_ {
        let centre = self.coords_of(key).as_ivec2();
        let chunks = self.chunks.as_ivec2();
        (-1..=1).flat_map(move |dy| {
            (-1..=1).filter_map(move |dx| {
                let cell = centre + IVec2::new(dx, dy);
                (cell.x >= 0 && cell.y >= 0 && cell.x < chunks.x && cell.y < chunks.y)
                    .then(|| cell.x as u32 + cell.y as u32 * chunks.x as u32)
            })
        })
    }

    /// Whether `other` lies in the 3x3 block around `key`.
    #[inline]
    pub fn is_neighbour(&self, key: u32, other: u32) -> bool {
        let a = self.coords_of(key).as_ivec2();
        let b = self.coords_of(other).as_ivec2();
        (a - b).abs().max_element() <= 1
    }

    /// Visit every chunk the segment `a -> b` passes through, in order, starting with the chunk
    /// of `a` and ending with the chunk of `b`.
    pub fn walk_segment(&self, a: Vec2, b: Vec2, mut visit: impl FnMut(UVec2)) {
        let start = self.chunk_coords(a).as_ivec2();
        let end = self.chunk_coords(b).as_ivec2();
        let max = self.chunks.as_ivec2() - IVec2::ONE;

        let delta = b - a;
        let step = IVec2::new(delta.x.signum() as i32, delta.y.signum() as i32);
        let next_boundary = |cell: i32, step: i32| (cell + (step > 0) as i32) as f32 * self.radius;

        let mut t_max = Vec2::INFINITY;
        let mut t_delta = Vec2::INFINITY;
        if delta.x != 0.0 {
            t_max.x = (next_boundary(start.x, step.x) - a.x) / delta.x;
            t_delta.x = self.radius / delta.x.abs();
        }
        if delta.y != 0.0 {
            t_max.y = (next_boundary(start.y, step.y) - a.y) / delta.y;
            t_delta.y = self.radius / delta.y.abs();
        }

        let mut cell = start;
        visit(cell.as_uvec2());
        let steps = (end - start).abs().element_sum();
        for _ in 0..steps {
            if cell == end {
                break;
            }
            if t_max.x < t_max.y {
                cell.x += step.x;
                t_max.x += t_delta.x;
            } else {
                cell.y += step.y;
                t_max.y += t_delta.y;
            }
            cell = cell.clamp(IVec2::ZERO, max);
            visit(cell.as_uvec2());
        }
        if cell != end {
            visit(end.as_uvec2());
        }
    }
}

/// Layout of [`crate::resources::Particle::packed`]:
/// `key + ptype * chunks_all + order * chunks_all * type_count`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedLayout {
    chunks_all: u32,
    type_count: u32,
}

impl PackedLayout {
    pub fn new(chunks_all: u32, type_count: u32) -> Self {
        Self {
            chunks_all,
            type_count,
        }
    }

    /// Whether every (key, type, order < particles) combination fits in a `u32`.
    pub fn fits(&self, particles: u32) -> bool {
        (self.chunks_all as u64) * (self.type_count as u64) * (particles.max(1) as u64)
            <= u32::MAX as u64
    }

    #[inline]
    pub fn pack(&self, key: u32, ptype: u32, order: u32) -> u32 {
        key + ptype * self.chunks_all + order * self.chunks_all * self.type_count
    }

    #[inline]
    pub fn key(&self, packed: u32) -> u32 {
        packed % self.chunks_all
    }

    #[inline]
    pub fn ptype(&self, packed: u32) -> u32 {
        (packed / self.chunks_all) % self.type_count
    }

    #[inline]
    pub fn order(&self, packed: u32) -> u32 {
        packed / (self.chunks_all * self.type_count)
    }

    #[inline]
    pub fn with_key_order(&self, packed: u32, key: u32, order: u32) -> u32 {
        self.pack(key, self.ptype(packed), order)
    }

    #[inline]
    pub fn with_type(&self, packed: u32, ptype: u32) -> u32 {
        self.pack(self.key(packed), ptype, self.order(packed))
    }
}
