//! Debug view: particles and rigid body outlines drawn with gizmos.

use bevy::prelude::*;
use bevy::math::Isometry2d;
use bevy::render::camera::ScalingMode;

use crate::simulation::{SimConfig, Simulation};

/// Plugin drawing the simulation snapshots every frame.
pub struct ParticleRenderPlugin;

impl Plugin for ParticleRenderPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_camera)
            .add_systems(Update, (draw_particles, draw_rigid_bodies));
    }
}

/// Particle radius on screen, in world units.
const PARTICLE_DRAW_RADIUS: f32 = 0.6;

/// 2D camera framing the whole world.
fn spawn_camera(mut commands: Commands, config: Res<SimConfig>) {
    commands.spawn((
        Camera2d,
        OrthographicProjection {
            scaling_mode: ScalingMode::AutoMin {
                min_width: config.width,
                min_height: config.height,
            },
            ..OrthographicProjection::default_2d()
        },
        Transform::from_xyz(config.width * 0.5, config.height * 0.5, 0.0),
    ));
}

/// Colour from the material tint and temperature: cold is blue, hot is red.
pub fn particle_color(tint: f32, temperature: f32) -> Color {
    let heat = ((temperature - 273.15) / 100.0).clamp(0.0, 1.0);
    Color::srgb(heat, 0.3 + 0.5 * tint, 1.0 - heat)
}

fn draw_particles(simulation: Option<Res<Simulation>>, mut gizmos: Gizmos) {
    let Some(simulation) = simulation else {
        return;
    };
    let types = simulation.particle_types();
    for particle in simulation.particle_snapshot() {
        let tint = types
            .get(particle.ptype as usize)
            .map_or(0.0, |ptype| ptype.tint);
        gizmos
            .circle_2d(
                Isometry2d::from_translation(particle.position),
                PARTICLE_DRAW_RADIUS,
                particle_color(tint, particle.temperature),
            )
            .resolution(6);
    }
}

fn draw_rigid_bodies(simulation: Option<Res<Simulation>>, mut gizmos: Gizmos) {
    let Some(simulation) = simulation else {
        return;
    };
    for outline in simulation.rigid_body_outlines() {
        gizmos.linestrip_2d(outline, Color::WHITE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_particles_are_redder() {
        let cold = particle_color(0.0, 273.15).to_srgba();
        let hot = particle_color(0.0, 373.15).to_srgba();
        assert!(hot.red > cold.red);
        assert!(hot.blue < cold.blue);
    }
}
