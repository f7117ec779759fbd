//! Simulation module - SPH particle physics coupled with rigid polygon bodies.

pub mod grid;
pub mod input;
pub mod kernels;
pub mod physics_config;
pub mod pipeline;
pub mod rigid_body;
pub mod scenarios;
pub mod sort;
pub mod sph;
pub mod springs;
pub mod sticky;
mod systems;

use bevy::prelude::*;

pub use grid::{ChunkGrid, PackedLayout};
pub use input::InteractionInput;
pub use physics_config::{default_particle_types, MaterialState, SimConfig};
pub use pipeline::{FrameReport, ParticleSnapshot, Pass, Simulation};
pub use scenarios::{ParticleSpawn, RigidBodyDesc, SceneDescription};

/// Plugin that builds the simulation at startup and steps it once per rendered frame.
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SimConfig>()
            .init_resource::<InteractionInput>()
            .add_systems(Startup, systems::setup_simulation)
            .add_systems(
                Update,
                (
                    input::handle_pointer_input,
                    systems::step_simulation,
                    systems::report_capacity_overflow,
                )
                    .chain(),
            );
    }
}
