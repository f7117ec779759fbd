//! GPU-compatible data structures for the particle simulation.
//!
//! All structs use `#[repr(C)]` and implement `Pod`/`Zeroable` for GPU buffer compatibility.

use bevy::math::Vec2;
use bytemuck::{Pod, Zeroable};

/// Marker for "no entry": padding keys in sorted lookups, empty chunks in start-index tables and
/// empty spring slots.
pub const SENTINEL: u32 = u32::MAX;

/// The fundamental particle in the SPH simulation.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct Particle {
    /// Position extrapolated by the look-ahead factor, used for neighbour queries
    pub pred_pos: [f32; 2],
    /// Position (x, y) in world coordinates
    pub pos: [f32; 2],
    pub vel: [f32; 2],
    /// Velocity at the end of the previous substep
    pub last_vel: [f32; 2],
    pub density: f32,
    pub near_density: f32,
    /// Temperature in Kelvin
    pub temperature: f32,
    /// Heat exchanged with neighbours this substep, applied in the position update
    pub temperature_exchange: f32,
    /// Last chunk key, particle type and in-chunk order packed into one word.
    /// See [`crate::simulation::grid::PackedLayout`].
    pub packed: u32,
    /// Padding for 16-byte alignment (64 bytes total)
    pub _padding: [u32; 3],
}

impl Particle {
    pub fn new(pos: Vec2, vel: Vec2, temperature: f32, packed: u32) -> Self {
        Self {
            pred_pos: pos.to_array(),
            pos: pos.to_array(),
            vel: vel.to_array(),
            last_vel: vel.to_array(),
            density: 0.0,
            near_density: 0.0,
            temperature,
            temperature_exchange: 0.0,
            packed,
            _padding: [0; 3],
        }
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        Vec2::from_array(self.pos)
    }

    #[inline]
    pub fn predicted(&self) -> Vec2 {
        Vec2::from_array(self.pred_pos)
    }

    #[inline]
    pub fn velocity(&self) -> Vec2 {
        Vec2::from_array(self.vel)
    }
}

/// Immutable material template shared by every particle of one type.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ParticleType {
    /// Particles only form springs with particles of the same non-zero group
    pub fluid_springs_group: u32,
    pub spring_plasticity: f32,
    pub spring_tol_deformation: f32,
    pub spring_stiffness: f32,
    pub thermal_conductivity: f32,
    pub specific_heat_capacity: f32,
    /// Kelvin
    pub freeze_threshold: f32,
    /// Kelvin
    pub vaporize_threshold: f32,
    pub pressure: f32,
    pub near_pressure: f32,
    pub mass: f32,
    pub target_density: f32,
    /// Velocity kept (and reflected) on border collisions, 0-1
    pub damping: f32,
    /// Velocity decay per second
    pub passive_damping: f32,
    pub viscosity: f32,
    pub stickiness: f32,
    /// Downward acceleration
    pub gravity: f32,
    pub influence_radius: f32,
    /// Render tint (green channel of the debug view)
    pub tint: f32,
    pub _padding: u32,
}

/// One (chunk key, particle index) pair of the spatial lookup.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq, Eq)]
pub struct SpatialEntry {
    pub key: u32,
    pub index: u32,
}

impl SpatialEntry {
    pub const PADDING: Self = Self {
        key: SENTINEL,
        index: SENTINEL,
    };
}

/// Per-chunk occupancy and spring storage requirement.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, Default, PartialEq, Eq)]
pub struct ChunkCapacity {
    /// Particles in the chunk
    pub particles: u32,
    /// Particles in the chunk's 3x3 neighbourhood (the chunk itself included)
    pub neighbourhood: u32,
    /// Spring slots reserved for the chunk: `particles * neighbourhood`
    pub springs: u32,
    pub _padding: u32,
}

/// A directed spring from `particle_a` to `particle_b`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct Spring {
    /// [`SENTINEL`] marks an empty slot
    pub particle_a: u32,
    pub particle_b: u32,
    pub rest_length: f32,
    pub _padding: u32,
}

impl Spring {
    pub const EMPTY: Self = Self {
        particle_a: SENTINEL,
        particle_b: SENTINEL,
        rest_length: 0.0,
        _padding: 0,
    };

    pub fn new(particle_a: u32, particle_b: u32, rest_length: f32) -> Self {
        Self {
            particle_a,
            particle_b,
            rest_length,
            _padding: 0,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.particle_a == SENTINEL
    }
}

/// A closed polygon rigid body. Its outline is the vertex range `line_indices[0]..=line_indices[1]`
/// of the shared vertex array; the last vertex repeats the first.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct RigidBody {
    pub pos: [f32; 2],
    pub vel: [f32; 2],
    /// Rotation in radians
    pub rot_angle: f32,
    pub angular_vel: f32,
    pub mass: f32,
    /// Moment of inertia around `pos`
    pub inertia: f32,
    pub stickiness: f32,
    pub stickiness_range: f32,
    pub stickiness_range_sqr: f32,
    /// Squared distance of the furthest vertex from `pos`
    pub max_dst_sqr: f32,
    /// 1 = never integrated (infinite mass)
    pub stationary: u32,
    /// 1 = a vertex touched the world border this substep
    pub wall_collision: u32,
    pub line_indices: [u32; 2],
}

impl RigidBody {
    #[inline]
    pub fn position(&self) -> Vec2 {
        Vec2::from_array(self.pos)
    }

    #[inline]
    pub fn velocity(&self) -> Vec2 {
        Vec2::from_array(self.vel)
    }

    #[inline]
    pub fn is_stationary(&self) -> bool {
        self.stationary != 0
    }

    /// Vertex index range of the outline (inclusive end).
    #[inline]
    pub fn vertex_range(&self) -> std::ops::RangeInclusive<usize> {
        self.line_indices[0] as usize..=self.line_indices[1] as usize
    }

    /// Velocity of a material point of the body at world position `point`.
    pub fn point_velocity(&self, point: Vec2) -> Vec2 {
        let r = point - self.position();
        self.velocity() + self.angular_vel * r.perp()
    }

    /// Broad phase: whether `point` can be within `reach` of the outline.
    #[inline]
    pub fn may_reach(&self, point: Vec2, reach: f32) -> bool {
        let bound = self.max_dst_sqr.sqrt() + reach;
        self.position().distance_squared(point) <= bound * bound
    }

    /// Recompute the quantities derived from geometry and stickiness range.
    pub fn refresh_derived(&mut self, vertices: &[RbVertex]) {
        self.stickiness_range_sqr = self.stickiness_range * self.stickiness_range;

        let outline = &vertices[self.vertex_range()];
        // The closing vertex duplicates the first one.
        let distinct = &outline[..outline.len().saturating_sub(1).max(1)];
        let mut max_dst_sqr = 0.0f32;
        let mut sum_dst_sqr = 0.0f32;
        for vertex in distinct {
            let dst_sqr = Vec2::from_array(vertex.local_pos).length_squared();
            max_dst_sqr = max_dst_sqr.max(dst_sqr);
            sum_dst_sqr += dst_sqr;
        }
        self.max_dst_sqr = max_dst_sqr;
        self.inertia = (self.mass * sum_dst_sqr / distinct.len() as f32).max(f32::EPSILON);
    }
}

/// One outline vertex of a rigid body.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct RbVertex {
    /// World position
    pub pos: [f32; 2],
    /// Position relative to the parent body at zero rotation
    pub local_pos: [f32; 2],
    /// Impulse handed to the parent this substep (x, y, angular)
    pub parent_impulse: [f32; 3],
    pub parent: u32,
    pub wall_collision: u32,
    pub _padding: [u32; 3],
}

impl RbVertex {
    #[inline]
    pub fn position(&self) -> Vec2 {
        Vec2::from_array(self.pos)
    }
}

/// A (chunk, polygon edge) pair produced by the edge chunk walk.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq, Eq)]
pub struct TraversedChunk {
    pub chunk_key: u32,
    /// Index of the edge's first vertex; the edge runs to `edge + 1`
    pub edge: u32,
}

/// A particle that entered a rigid body's stickiness range.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct StickyRequest {
    /// Sort key; [`SENTINEL`] for padding
    pub particle: u32,
    pub rigid_body: u32,
    pub dst_sqr: f32,
    pub stickiness: f32,
    /// Closest point on the body outline
    pub anchor: [f32; 2],
    pub range: f32,
    pub _padding: u32,
}

impl StickyRequest {
    pub const PADDING: Self = Self {
        particle: SENTINEL,
        rigid_body: SENTINEL,
        dst_sqr: f32::MAX,
        stickiness: 0.0,
        anchor: [0.0; 2],
        range: 0.0,
        _padding: 0,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_are_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<Particle>(), 64);
        assert_eq!(std::mem::size_of::<ParticleType>() % 16, 0);
        assert_eq!(std::mem::size_of::<ChunkCapacity>(), 16);
        assert_eq!(std::mem::size_of::<Spring>(), 16);
        assert_eq!(std::mem::size_of::<RbVertex>(), 48);
        assert_eq!(std::mem::size_of::<StickyRequest>(), 32);
    }

    #[test]
    fn rotating_body_point_velocity() {
        let body = RigidBody {
            angular_vel: 2.0,
            ..RigidBody::zeroed()
        };
        // Counter-clockwise rotation: a point on +x moves towards +y.
        assert_eq!(body.point_velocity(Vec2::new(1.0, 0.0)), Vec2::new(0.0, 2.0));
    }
}
