//! Setup errors.

use thiserror::Error;

/// Configuration or scene problems found before any buffer is built.
#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    #[error("world size must be positive and finite, got {width} x {height}")]
    InvalidDimensions { width: f32, height: f32 },

    #[error("influence radius must be positive and finite, got {0}")]
    InvalidInfluenceRadius(f32),

    #[error("spawn square of side {spawn_dims} does not fit in a {width} x {height} world")]
    SpawnRegionTooLarge {
        spawn_dims: u32,
        width: f32,
        height: f32,
    },

    #[error("scene has no particles")]
    NoParticles,

    #[error("at least one substep per frame is required")]
    NoSubsteps,

    #[error("particle type {index} out of range ({count} types defined)")]
    UnknownParticleType { index: u32, count: u32 },

    #[error("rigid body {body} has {vertices} outline vertices; a closed polygon needs at least 3")]
    DegenerateRigidBody { body: usize, vertices: usize },

    #[error("material table has {types} types; materials come in (solid, liquid, gas) triplets")]
    IncompleteMaterialTriplet { types: u32 },

    #[error("particle type {index} has influence radius {radius}, above the chunk size {max}")]
    InfluenceRadiusTooLarge { index: u32, radius: f32, max: f32 },

    #[error("particle type {index} needs a positive, finite `{field}`")]
    InvalidMaterial { index: u32, field: &'static str },

    #[error("rigid body {body} is not stationary and needs a positive, finite mass, got {mass}")]
    InvalidRigidBodyMass { body: usize, mass: f32 },

    #[error("particle {index} starts outside the world")]
    ParticleOutOfBounds { index: usize },

    #[error("{chunks} chunks x {types} types x {particles} particles overflow the packed particle field")]
    PackedFieldOverflow {
        chunks: u32,
        types: u32,
        particles: u32,
    },

    #[error("capacity setting `{name}` is out of range")]
    InvalidSafetyMargin { name: &'static str },
}
