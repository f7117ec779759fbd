//! Scenes the simulation can start from.
//!
//! A scene lists particle spawns and rigid bodies in world units; [`crate::simulation::Simulation::new`]
//! turns it into device buffers.

use bevy::math::Vec2;
use rand::Rng;

use super::physics_config::{default_particle_types, MaterialState, SimConfig};
use crate::error::SimError;
use crate::resources::ParticleType;

pub use super::physics_config::celsius_to_kelvin;

/// One particle at setup.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleSpawn {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Index into the scene's material table
    pub ptype: u32,
    /// Kelvin
    pub temperature: f32,
}

impl ParticleSpawn {
    pub fn at_rest(position: Vec2, ptype: u32, temperature: f32) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            ptype,
            temperature,
        }
    }
}

/// A rigid polygon body. The outline is given relative to `position`, without repeating the
/// first vertex; setup closes it.
#[derive(Clone, Debug, PartialEq)]
pub struct RigidBodyDesc {
    pub position: Vec2,
    pub velocity: Vec2,
    pub outline: Vec<Vec2>,
    pub mass: f32,
    pub stationary: bool,
    pub stickiness: f32,
    pub stickiness_range: f32,
}

impl RigidBodyDesc {
    /// A stationary body with no stickiness.
    pub fn fixed(position: Vec2, outline: Vec<Vec2>) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            outline,
            mass: 1.0,
            stationary: true,
            stickiness: 0.0,
            stickiness_range: 0.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SceneDescription {
    pub particles: Vec<ParticleSpawn>,
    pub rigid_bodies: Vec<RigidBodyDesc>,
    /// Material table; empty means [`default_particle_types`].
    pub particle_types: Vec<ParticleType>,
}

/// Position of particle `index` of `count` on the centred spawn grid: a square of side
/// `spawn_dims` filled row by row with `sqrt(count)` particles per row.
pub fn spawn_position(config: &SimConfig, index: u32, count: u32) -> Result<Vec2, SimError> {
    let side = config.spawn_dims as f32;
    if side > config.width || side > config.height {
        return Err(SimError::SpawnRegionTooLarge {
            spawn_dims: config.spawn_dims,
            width: config.width,
            height: config.height,
        });
    }
    let per_row = (count.max(1) as f32).sqrt();
    let spacing = side / per_row;
    let origin = Vec2::new(config.width - side, config.height - side) * 0.5;
    let i = index as f32;
    Ok(origin + Vec2::new((i % per_row).floor(), (i / per_row).floor()) * spacing)
}

/// The bucket polygon, centred on its own vertex average.
pub fn bucket_outline() -> Vec<Vec2> {
    let corners = [
        Vec2::new(10.0, 20.0),
        Vec2::new(50.0, 20.0),
        Vec2::new(50.0, 50.0),
        Vec2::new(40.0, 50.0),
        Vec2::new(39.0, 30.0),
        Vec2::new(21.0, 30.0),
        Vec2::new(20.0, 50.0),
        Vec2::new(10.0, 50.0),
    ]
    .map(|corner| corner * 1.5);
    let centre = corners.iter().copied().sum::<Vec2>() / corners.len() as f32;
    corners.iter().map(|corner| *corner - centre).collect()
}

/// Default scene: a grid of liquid, the first half water at 20 °C and the second half the
/// heavy liquid at 80 °C, above two stationary buckets.
pub fn two_buckets(config: &SimConfig) -> Result<SceneDescription, SimError> {
    let count = config.particle_count;
    let water = MaterialState::Liquid.in_triplet_of(0);
    let heavy = MaterialState::Liquid.in_triplet_of(3);

    let particles = (0..count)
        .map(|i| {
            let (ptype, celsius) = if i < count / 2 { (water, 20.0) } else { (heavy, 80.0) };
            let position = spawn_position(config, i, count)?;
            Ok(ParticleSpawn::at_rest(position, ptype, celsius_to_kelvin(celsius)))
        })
        .collect::<Result<Vec<_>, SimError>>()?;

    let rigid_bodies = vec![
        RigidBodyDesc {
            mass: 200.0,
            stickiness: 6.0,
            stickiness_range: 6.0,
            ..RigidBodyDesc::fixed(Vec2::new(140.0, 100.0), bucket_outline())
        },
        RigidBodyDesc {
            mass: 200.0,
            stickiness: 16.0,
            stickiness_range: 4.0,
            ..RigidBodyDesc::fixed(Vec2::new(50.0, 100.0), bucket_outline())
        },
    ];

    Ok(SceneDescription {
        particles,
        rigid_bodies,
        particle_types: default_particle_types(config),
    })
}

/// Water on the spawn grid with a little random motion and no bodies.
pub fn water_only(config: &SimConfig) -> Result<SceneDescription, SimError> {
    let mut rng = rand::thread_rng();
    let count = config.particle_count;
    let water = MaterialState::Liquid.in_triplet_of(0);

    let mut particles = Vec::with_capacity(count as usize);
    for i in 0..count {
        let velocity = Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
        particles.push(ParticleSpawn {
            position: spawn_position(config, i, count)?,
            velocity,
            ptype: water,
            temperature: celsius_to_kelvin(20.0),
        });
    }

    Ok(SceneDescription {
        particles,
        rigid_bodies: Vec::new(),
        particle_types: default_particle_types(config),
    })
}

pub fn single_particle(config: &SimConfig, position: Vec2, ptype: u32) -> SceneDescription {
    SceneDescription {
        particles: vec![ParticleSpawn::at_rest(position, ptype, celsius_to_kelvin(20.0))],
        rigid_bodies: Vec::new(),
        particle_types: default_particle_types(config),
    }
}
