//! Fluid SPH Simulation - Main Entry
//!
//! A 2D particle fluid pouring into two buckets. Left mouse button attracts the fluid, right
//! mouse button pushes it away.

use bevy::prelude::*;
use fluidsim::render::ParticleRenderPlugin;
use fluidsim::simulation::SimulationPlugin;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Fluid SPH Sim".into(),
                resolution: (1200.0, 800.0).into(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(SimulationPlugin)
        .add_plugins(ParticleRenderPlugin)
        .insert_resource(FrameCounter(0))
        .add_systems(Update, log_frame)
        .run();
}

/// Frame counter for logging
#[derive(Resource)]
struct FrameCounter(u32);

/// Log every N frames
fn log_frame(mut counter: ResMut<FrameCounter>) {
    counter.0 += 1;
    if counter.0 % 60 == 0 {
        info!("Frame {}: Simulation running...", counter.0);
    }
}
