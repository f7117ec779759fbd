//! Bevy systems driving the simulation.
//!
//! Startup builds the [`Simulation`] from the default scene; every frame then runs
//! `time_steps_per_render` substeps with the current pointer state.

use bevy::prelude::*;

use super::input::InteractionInput;
use super::physics_config::SimConfig;
use super::pipeline::Simulation;
use super::scenarios;

/// Frames between capacity diagnostics readbacks.
const DIAGNOSTICS_INTERVAL: u32 = 120;

/// Startup: build the simulation or shut the app down.
pub fn setup_simulation(
    mut commands: Commands,
    config: Res<SimConfig>,
    mut exit: EventWriter<AppExit>,
) {
    let built = scenarios::two_buckets(&config)
        .and_then(|scene| Simulation::new((*config).clone(), scene));
    match built {
        Ok(simulation) => commands.insert_resource(simulation),
        Err(err) => {
            error!("failed to set up the simulation: {}", err);
            exit.send(AppExit::error());
        }
    }
}

/// Run one rendered frame worth of substeps.
pub fn step_simulation(
    time: Res<Time>,
    input: Res<InteractionInput>,
    simulation: Option<ResMut<Simulation>>,
) {
    let Some(mut simulation) = simulation else {
        return;
    };
    let substeps = simulation.config().time_steps_per_render;
    let report = simulation.run_time_steps(substeps, time.delta_secs(), &input);
    debug!(
        "frame: {} substeps of {:.4}s, {} traversed chunks",
        report.substeps, report.delta_time, report.traversed_chunks
    );
}

/// Periodically read back overflow counters and warn when a capacity was exceeded.
pub fn report_capacity_overflow(
    mut frames: Local<u32>,
    simulation: Option<Res<Simulation>>,
) {
    let Some(simulation) = simulation else {
        return;
    };
    *frames += 1;
    if *frames % DIAGNOSTICS_INTERVAL != 0 {
        return;
    }
    let springs = simulation.spring_overflow();
    if springs > 0 {
        warn!(
            "{} springs dropped last frame; raise spring_capacity_safety",
            springs
        );
    }
    let sticky = simulation.sticky_overflow();
    if sticky > 0 {
        warn!(
            "{} stickiness requests dropped; raise sticky_request_capacity",
            sticky
        );
    }
    let traversed = simulation.traversed_overflow();
    if traversed > 0 {
        warn!("{} traversed chunks dropped", traversed);
    }
}
