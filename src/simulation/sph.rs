//! Particle kernels of one substep: prediction, densities, forces, stickiness and integration.
//!
//! Kernels that read neighbours do so from a snapshot of the particle buffer taken after the
//! previous dispatch, and each lane writes only its own particle.

use std::sync::atomic::Ordering;

use bevy::math::Vec2;

use super::grid::{ChunkGrid, PackedLayout};
use super::input::InteractionInput;
use super::kernels::{
    pair_radius, smooth_liquid, smooth_liquid_derivative, smooth_liquid_near,
    smooth_liquid_near_derivative, smooth_viscosity_laplacian, MIN_DISTANCE,
};
use super::physics_config::{MaterialState, SimConfig};
use super::sort::SpatialIndex;
use super::springs::SpringWindows;
use crate::compute::{Dispatcher, FixedPointAccumulator, Kernel};
use crate::resources::{Particle, ParticleType, Spring, StickyRequest};

/// Densities below this are clamped when dividing by them.
const MIN_DENSITY: f32 = 1.0e-3;

/// Read-only bindings shared by the particle kernels.
#[derive(Clone, Copy)]
pub struct ParticleBindings<'a> {
    pub config: &'a SimConfig,
    pub grid: &'a ChunkGrid,
    pub layout: &'a PackedLayout,
    pub types: &'a [ParticleType],
    pub index: &'a SpatialIndex,
}

impl ParticleBindings<'_> {
    #[inline]
    fn ptype(&self, particle: &Particle) -> &ParticleType {
        &self.types[self.layout.ptype(particle.packed) as usize]
    }
}

/// Per-substep uniforms.
#[derive(Clone, Copy, Debug, Default)]
pub struct StepUniforms {
    pub delta_time: f32,
    /// Time covered by one stickiness evaluation: `delta_time * sticky_request_interval`
    pub sticky_delta_time: f32,
    pub pointer: InteractionInput,
}

pub fn pre_calculate(dispatcher: &mut Dispatcher, particles: &mut [Particle], look_ahead: f32) {
    dispatcher.map(Kernel::PreCalculate, particles, |_, particle| {
        let predicted = particle.position() + particle.velocity() * look_ahead;
        particle.pred_pos = predicted.to_array();
    });
}

pub fn calculate_densities(
    dispatcher: &mut Dispatcher,
    bindings: ParticleBindings,
    snapshot: &[Particle],
    particles: &mut [Particle],
) {
    dispatcher.map(Kernel::CalculateDensities, particles, |i, particle| {
        let own = &snapshot[i];
        let own_radius = bindings.ptype(own).influence_radius;
        let key = bindings.layout.key(own.packed);

        let mut density = 0.0;
        let mut near_density = 0.0;
        bindings.index.for_each_neighbour(bindings.grid, key, |_, j| {
            let other = &snapshot[j as usize];
            let other_type = bindings.ptype(other);
            let radius = pair_radius(own_radius, other_type.influence_radius);
            let dst = own.predicted().distance(other.predicted());
            if dst < radius {
                density += other_type.mass * smooth_liquid(dst, radius);
                near_density += other_type.mass * smooth_liquid_near(dst, radius);
            }
        });
        particle.density = density;
        particle.near_density = near_density;
    });
}

struct ForceLane<'a> {
    particle: &'a mut Particle,
    springs: &'a mut [Spring],
}

/// Pressure, viscosity, springs, heat exchange, gravity, damping and pointer interaction.
///
/// Each lane owns its particle and its spring window. A spring slot exists for every
/// neighbour column; neighbours out of range clear their slot, neighbours in range of the same
/// non-zero spring group get a spring created at the current distance.
pub fn particle_forces(
    dispatcher: &mut Dispatcher,
    bindings: ParticleBindings,
    uniforms: &StepUniforms,
    snapshot: &[Particle],
    particles: &mut [Particle],
    springs: SpringWindows,
) {
    let SpringWindows { windows, overflow } = springs;
    let mut lanes: Vec<ForceLane> = particles
        .iter_mut()
        .zip(windows)
        .map(|(particle, springs)| ForceLane { particle, springs })
        .collect();
    let dt = uniforms.delta_time;
    let config = bindings.config;

    dispatcher.map(Kernel::ParticleForces, &mut lanes, |i, lane| {
        let own = &snapshot[i];
        let own_type = bindings.ptype(own);
        let key = bindings.layout.key(own.packed);
        let pressure = (own.density - own_type.target_density) * own_type.pressure;
        let near_pressure = own.near_density * own_type.near_pressure;

        let mut acceleration = Vec2::ZERO;
        let mut heat = 0.0;
        let springs = &mut *lane.springs;

        bindings.index.for_each_neighbour(bindings.grid, key, |column, j| {
            if j as usize == i {
                return;
            }
            let slot = springs.get_mut(column as usize);
            let other = &snapshot[j as usize];
            let other_type = bindings.ptype(other);
            let radius = pair_radius(own_type.influence_radius, other_type.influence_radius);
            let offset = other.predicted() - own.predicted();
            let dst = offset.length();
            if dst >= radius {
                if let Some(slot) = slot {
                    *slot = Spring::EMPTY;
                }
                return;
            }

            // Unit vector towards the neighbour; coincident pairs separate along x.
            let dir = if dst > MIN_DISTANCE {
                offset / dst
            } else if (i as u32) < j {
                Vec2::X
            } else {
                Vec2::NEG_X
            };
            let other_density = other.density.max(MIN_DENSITY);

            let other_pressure = (other.density - other_type.target_density) * other_type.pressure;
            let other_near_pressure = other.near_density * other_type.near_pressure;
            let shared_pressure = 0.5 * (pressure + other_pressure);
            let shared_near_pressure = 0.5 * (near_pressure + other_near_pressure);
            acceleration += dir
                * (shared_pressure * smooth_liquid_derivative(dst, radius)
                    + shared_near_pressure * smooth_liquid_near_derivative(dst, radius))
                * other_type.mass
                / other_density;

            let viscosity = 0.5 * (own_type.viscosity + other_type.viscosity);
            acceleration += (other.velocity() - own.velocity())
                * viscosity
                * smooth_viscosity_laplacian(dst, radius);

            let same_group = own_type.fluid_springs_group != 0
                && own_type.fluid_springs_group == other_type.fluid_springs_group;
            match slot {
                Some(slot) if !same_group => *slot = Spring::EMPTY,
                Some(slot) if slot.is_empty() || slot.particle_b != j => {
                    *slot = Spring::new(i as u32, j, dst);
                }
                Some(slot) => {
                    let mut rest = slot.rest_length;
                    let deformation = dst - rest;
                    let tolerance = own_type.spring_tol_deformation * rest;
                    if deformation.abs() > tolerance {
                        rest += own_type.spring_plasticity
                            * dt
                            * (deformation.abs() - tolerance)
                            * deformation.signum();
                        rest = rest.clamp(0.0, radius);
                        slot.rest_length = rest;
                    }
                    acceleration += dir * own_type.spring_stiffness * (dst - rest) / own_type.mass;
                }
                None if same_group => {
                    overflow.fetch_add(1, Ordering::Relaxed);
                }
                None => {}
            }

            let conductivity = 0.5 * (own_type.thermal_conductivity + other_type.thermal_conductivity);
            heat += (other.temperature - own.temperature)
                * conductivity
                * smooth_liquid(dst, radius);
        });

        acceleration.y -= own_type.gravity;

        let pointer = &uniforms.pointer;
        if pointer.is_active() {
            let to_pointer = pointer.position - own.position();
            let dst = to_pointer.length();
            if dst < config.max_interaction_radius {
                let falloff = 1.0 - dst / config.max_interaction_radius;
                let pull = to_pointer * config.interaction_attraction_power;
                if pointer.attract {
                    acceleration += pull;
                    heat += config.interaction_temperature_power * falloff;
                }
                if pointer.repel {
                    acceleration -= pull;
                    heat -= config.interaction_temperature_power * falloff;
                }
                acceleration.y += config.interaction_fountain_power * falloff;
            }
        }

        let damping = (1.0 - own_type.passive_damping * dt).max(0.0);
        let velocity = (own.velocity() + acceleration * dt) * damping;
        lane.particle.vel = velocity.to_array();
        lane.particle.temperature_exchange = heat;
    });
}

/// Apply the stickiness pull of the closest anchor to every particle with requests.
///
/// `sorted` holds `count` live requests sorted by particle. The lane at the first request of a
/// particle's run is the only writer for that particle.
pub fn consume_sticky_requests(
    dispatcher: &mut Dispatcher,
    uniforms: &StepUniforms,
    sorted: &[StickyRequest],
    count: usize,
    snapshot: &[Particle],
    particles: &mut [Particle],
) {
    let sorted = &sorted[..count];
    let dt = uniforms.sticky_delta_time;
    dispatcher.scatter_with(
        Kernel::ConsumeStickyRequests,
        count,
        particles,
        |i| {
            let particle = sorted[i].particle;
            if i > 0 && sorted[i - 1].particle == particle {
                return None;
            }
            let closest = sorted[i..]
                .iter()
                .take_while(|request| request.particle == particle)
                .min_by(|a, b| {
                    a.dst_sqr
                        .total_cmp(&b.dst_sqr)
                        .then(a.rigid_body.cmp(&b.rigid_body))
                })?;
            let position = snapshot.get(particle as usize)?.position();
            let to_anchor = Vec2::from_array(closest.anchor) - position;
            let dst = closest.dst_sqr.sqrt();
            if closest.range <= 0.0 {
                return None;
            }
            let strength = closest.stickiness * (1.0 - dst / closest.range).max(0.0) * dt;
            Some((particle as usize, to_anchor.normalize_or_zero() * strength))
        },
        |particle, impulse| {
            particle.vel = (particle.velocity() + impulse).to_array();
        },
    );
}

/// Integrate positions, resolve the world border and apply heat and state changes.
pub fn update_positions(
    dispatcher: &mut Dispatcher,
    bindings: ParticleBindings,
    uniforms: &StepUniforms,
    corrections: &FixedPointAccumulator,
    particles: &mut [Particle],
) {
    let dt = uniforms.delta_time;
    let config = bindings.config;
    let min = Vec2::splat(config.border_padding);
    let max = Vec2::new(config.width, config.height) - config.border_padding;

    dispatcher.map(Kernel::UpdatePositions, particles, |i, particle| {
        let ptype_index = bindings.layout.ptype(particle.packed);
        let ptype = &bindings.types[ptype_index as usize];
        let [dvx, dvy, dx, dy] = corrections.read_all::<4>(i);

        let mut velocity = particle.velocity() + Vec2::new(dvx, dvy);
        let mut position = particle.position() + Vec2::new(dx, dy) + velocity * dt;

        if position.x < min.x {
            position.x = min.x;
            velocity.x = velocity.x.abs() * ptype.damping;
        } else if position.x > max.x {
            position.x = max.x;
            velocity.x = -velocity.x.abs() * ptype.damping;
        }
        if position.y < min.y {
            position.y = min.y;
            velocity.y = velocity.y.abs() * ptype.damping;
        } else if position.y > max.y {
            position.y = max.y;
            velocity.y = -velocity.y.abs() * ptype.damping;
        }

        particle.temperature += particle.temperature_exchange / ptype.specific_heat_capacity * dt;
        let next_type = next_state(
            ptype_index,
            ptype,
            particle.temperature,
            config.state_threshold_padding,
        );
        if next_type != ptype_index {
            particle.packed = bindings.layout.with_type(particle.packed, next_type);
        }

        particle.pos = position.to_array();
        particle.vel = velocity.to_array();
        particle.last_vel = particle.vel;
    });
}

/// Type a particle of `ptype_index` moves to at `temperature`, with `padding` Kelvin of
/// hysteresis around the thresholds.
pub fn next_state(ptype_index: u32, ptype: &ParticleType, temperature: f32, padding: f32) -> u32 {
    let state = MaterialState::of(ptype_index);
    let next = match state {
        MaterialState::Solid if temperature > ptype.freeze_threshold + padding => {
            MaterialState::Liquid
        }
        MaterialState::Liquid if temperature < ptype.freeze_threshold - padding => {
            MaterialState::Solid
        }
        MaterialState::Liquid if temperature > ptype.vaporize_threshold + padding => {
            MaterialState::Gas
        }
        MaterialState::Gas if temperature < ptype.vaporize_threshold - padding => {
            MaterialState::Liquid
        }
        _ => state,
    };
    next.in_triplet_of(ptype_index)
}
