//! Simulation configuration and the particle material table.
//!
//! All tunable physics parameters live in [`SimConfig`]. The per-material records sent to the
//! kernels are derived from it by [`default_particle_types`].

use bevy::prelude::Resource;

use super::grid::ChunkGrid;
use crate::error::SimError;
use crate::resources::ParticleType;

/// Materials come in triplets of (solid, liquid, gas); a particle changes type only within its
/// triplet.
pub const TYPES_PER_TRIPLET: u32 = 3;

pub fn celsius_to_kelvin(celsius: f32) -> f32 {
    273.15 + celsius
}

/// Aggregate state of a particle type, from its position inside the triplet.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialState {
    Solid = 0,
    Liquid = 1,
    Gas = 2,
}

impl MaterialState {
    pub fn of(ptype: u32) -> Self {
        match ptype % TYPES_PER_TRIPLET {
            0 => MaterialState::Solid,
            1 => MaterialState::Liquid,
            _ => MaterialState::Gas,
        }
    }

    /// Type index of this state in the triplet `ptype` belongs to.
    pub fn in_triplet_of(self, ptype: u32) -> u32 {
        ptype - ptype % TYPES_PER_TRIPLET + self as u32
    }
}

/// Every tunable parameter of the simulation.
#[derive(Resource, Clone, Debug, PartialEq)]
pub struct SimConfig {
    // === Particles ===
    /// Particles spawned by the default scene
    pub particle_count: u32,
    /// Largest influence radius of any material; also the chunk size
    pub max_influence_radius: f32,
    pub target_density: f32,
    pub pressure_multiplier: f32,
    pub near_pressure_multiplier: f32,
    /// Velocity kept when bouncing off the world border (0-1)
    pub damping: f32,
    pub passive_damping: f32,
    pub viscosity: f32,
    pub spring_stiffness: f32,
    pub tol_deformation: f32,
    pub plasticity: f32,
    pub gravity: f32,
    /// Seconds of velocity extrapolated into the predicted position
    pub look_ahead_factor: f32,
    /// Kelvin of hysteresis around the freeze and vaporize thresholds
    pub state_threshold_padding: f32,

    // === Rigid bodies ===
    /// Restitution of particle/body collisions (0-1)
    pub rb_elasticity: f32,
    /// Particles closer than this to a body outline are pushed out
    pub rb_particle_radius: f32,
    /// Minimum chunk expansion around each walked edge cell
    pub max_chunk_search_safety: u32,
    /// Extra headroom on the measured traversed-chunk dispatch size
    pub traversed_chunk_safety: f32,
    pub sticky_request_capacity: u32,
    /// Stickiness is evaluated once every this many substeps
    pub sticky_request_interval: u32,

    // === Storage ===
    /// Spring slots per particle across both halves; each half holds
    /// `particle_count * spring_capacity_safety / 2`
    pub spring_capacity_safety: u32,

    // === World ===
    pub width: f32,
    pub height: f32,
    /// Side of the square the default scene spawns particles in
    pub spawn_dims: u32,
    pub border_padding: f32,

    // === Time ===
    pub fixed_time_step: bool,
    /// Frame duration in fixed time step mode
    pub time_step: f32,
    /// Frame duration multiplier in variable time step mode
    pub program_speed: f32,
    pub time_steps_per_render: u32,

    // === Pointer interaction ===
    pub max_interaction_radius: f32,
    pub interaction_attraction_power: f32,
    pub interaction_fountain_power: f32,
    pub interaction_temperature_power: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            particle_count: 30_000,
            max_influence_radius: 2.0,
            target_density: 2.0,
            pressure_multiplier: 3000.0,
            near_pressure_multiplier: 12.0,
            damping: 0.7,
            passive_damping: 0.0,
            viscosity: 1.5,
            spring_stiffness: 5.0,
            tol_deformation: 0.0,
            plasticity: 3.0,
            gravity: 5.0,
            look_ahead_factor: 0.017,
            state_threshold_padding: 3.0,

            rb_elasticity: 0.645,
            rb_particle_radius: 2.0,
            max_chunk_search_safety: 1,
            traversed_chunk_safety: 0.5,
            sticky_request_capacity: 4096,
            sticky_request_interval: 3,

            spring_capacity_safety: 150,

            width: 300.0,
            height: 200.0,
            spawn_dims: 160,
            border_padding: 4.0,

            fixed_time_step: true,
            time_step: 0.02,
            program_speed: 2.0,
            time_steps_per_render: 3,

            max_interaction_radius: 40.0,
            interaction_attraction_power: 3.5,
            interaction_fountain_power: 0.0,
            interaction_temperature_power: 0.0,
        }
    }
}

impl SimConfig {
    /// Reject configurations no buffer layout can be built for.
    pub fn validate(&self) -> Result<(), SimError> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !positive(self.width) || !positive(self.height) {
            return Err(SimError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if !positive(self.max_influence_radius) {
            return Err(SimError::InvalidInfluenceRadius(self.max_influence_radius));
        }
        if self.time_steps_per_render == 0 {
            return Err(SimError::NoSubsteps);
        }
        if !(self.traversed_chunk_safety.is_finite() && self.traversed_chunk_safety >= 0.0) {
            return Err(SimError::InvalidSafetyMargin {
                name: "traversed_chunk_safety",
            });
        }
        if self.spring_capacity_safety == 0 {
            return Err(SimError::InvalidSafetyMargin {
                name: "spring_capacity_safety",
            });
        }
        if self.sticky_request_interval == 0 {
            return Err(SimError::InvalidSafetyMargin {
                name: "sticky_request_interval",
            });
        }
        Ok(())
    }

    pub fn grid(&self) -> ChunkGrid {
        ChunkGrid::new(self.width, self.height, self.max_influence_radius)
    }
}

/// Reject material tables the kernels cannot run: state changes need whole triplets and the
/// 3x3 chunk search only sees neighbours within `max_influence_radius`.
pub fn validate_particle_types(
    types: &[ParticleType],
    max_influence_radius: f32,
) -> Result<(), SimError> {
    if types.len() as u32 % TYPES_PER_TRIPLET != 0 {
        return Err(SimError::IncompleteMaterialTriplet {
            types: types.len() as u32,
        });
    }
    let positive = |v: f32| v.is_finite() && v > 0.0;
    for (index, ptype) in types.iter().enumerate() {
        let index = index as u32;
        if !positive(ptype.influence_radius) {
            return Err(SimError::InvalidMaterial {
                index,
                field: "influence_radius",
            });
        }
        if ptype.influence_radius > max_influence_radius {
            return Err(SimError::InfluenceRadiusTooLarge {
                index,
                radius: ptype.influence_radius,
                max: max_influence_radius,
            });
        }
        if !positive(ptype.mass) {
            return Err(SimError::InvalidMaterial { index, field: "mass" });
        }
        if !positive(ptype.specific_heat_capacity) {
            return Err(SimError::InvalidMaterial {
                index,
                field: "specific_heat_capacity",
            });
        }
    }
    Ok(())
}

/// The material table: two triplets of (solid, liquid, gas).
///
/// The first triplet is water-like with springs only in the liquid and solid phase; the
/// second triplet is a denser, stickier, spring-bound material that never changes state.
pub fn default_particle_types(config: &SimConfig) -> Vec<ParticleType> {
    let liquid = ParticleType {
        fluid_springs_group: 1,
        spring_plasticity: config.plasticity,
        spring_tol_deformation: config.tol_deformation,
        spring_stiffness: config.spring_stiffness,
        thermal_conductivity: 1.0,
        specific_heat_capacity: 10.0,
        freeze_threshold: celsius_to_kelvin(0.0),
        vaporize_threshold: celsius_to_kelvin(100.0),
        pressure: config.pressure_multiplier,
        near_pressure: config.near_pressure_multiplier,
        mass: 1.0,
        target_density: config.target_density,
        damping: config.damping,
        passive_damping: config.passive_damping,
        viscosity: config.viscosity,
        stickiness: 2.0,
        gravity: config.gravity,
        influence_radius: config.max_influence_radius,
        tint: 0.0,
        _padding: 0,
    };
    let solid = ParticleType {
        spring_plasticity: 0.0,
        spring_tol_deformation: 0.1,
        spring_stiffness: 2000.0,
        pressure: 3000.0,
        near_pressure: 5.0,
        passive_damping: 0.0,
        viscosity: 5.0,
        tint: 0.5,
        ..liquid
    };
    let gas = ParticleType {
        fluid_springs_group: 0,
        spring_plasticity: -1.0,
        spring_tol_deformation: -1.0,
        spring_stiffness: -1.0,
        thermal_conductivity: 3.0,
        pressure: 200.0,
        near_pressure: 0.0,
        mass: 0.1,
        target_density: 0.0,
        gravity: config.gravity * 0.1,
        tint: 0.3,
        ..liquid
    };

    let heavy_liquid = ParticleType {
        fluid_springs_group: 2,
        thermal_conductivity: 7.0,
        specific_heat_capacity: 15.0,
        freeze_threshold: celsius_to_kelvin(-999.0),
        vaporize_threshold: celsius_to_kelvin(999.0),
        target_density: config.target_density * 1.5,
        stickiness: 4.0,
        tint: 1.0,
        ..liquid
    };
    let heavy_solid = ParticleType {
        freeze_threshold: celsius_to_kelvin(999.0),
        vaporize_threshold: celsius_to_kelvin(-999.0),
        tint: 0.9,
        ..heavy_liquid
    };
    let heavy_gas = ParticleType {
        tint: 0.9,
        ..heavy_liquid
    };

    vec![solid, liquid, gas, heavy_solid, heavy_liquid, heavy_gas]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SimConfig::default().validate(), Ok(()));
        let grid = SimConfig::default().grid();
        assert_eq!(grid.chunks_all(), 150 * 100);
    }

    #[test]
    fn zero_substeps_rejected() {
        let config = SimConfig {
            time_steps_per_render: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(SimError::NoSubsteps));
    }

    #[test]
    fn bad_dimensions_rejected() {
        let config = SimConfig {
            width: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimError::InvalidDimensions { .. })
        ));
        let config = SimConfig {
            max_influence_radius: 0.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(SimError::InvalidInfluenceRadius(0.0)));
    }

    #[test]
    fn negative_safety_margin_rejected() {
        let config = SimConfig {
            traversed_chunk_safety: -0.5,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(SimError::InvalidSafetyMargin {
                name: "traversed_chunk_safety"
            })
        );
    }

    #[test]
    fn material_table_is_two_triplets() {
        let types = default_particle_types(&SimConfig::default());
        assert_eq!(types.len() as u32, 2 * TYPES_PER_TRIPLET);
        assert_eq!(types[2].fluid_springs_group, 0, "gas has no springs");
        assert!(types[0].freeze_threshold < types[0].vaporize_threshold);
        assert!(types.iter().all(|t| t.influence_radius <= 2.0));
    }

    #[test]
    fn default_material_table_validates() {
        let config = SimConfig::default();
        let types = default_particle_types(&config);
        assert_eq!(validate_particle_types(&types, config.max_influence_radius), Ok(()));
    }

    #[test]
    fn broken_material_tables_rejected() {
        let config = SimConfig::default();
        let max = config.max_influence_radius;
        let types = default_particle_types(&config);

        assert_eq!(
            validate_particle_types(&types[..4], max),
            Err(SimError::IncompleteMaterialTriplet { types: 4 })
        );

        let mut wide = types.clone();
        wide[1].influence_radius = max * 1.5;
        assert_eq!(
            validate_particle_types(&wide, max),
            Err(SimError::InfluenceRadiusTooLarge {
                index: 1,
                radius: max * 1.5,
                max
            })
        );

        let mut weightless = types.clone();
        weightless[4].mass = 0.0;
        assert_eq!(
            validate_particle_types(&weightless, max),
            Err(SimError::InvalidMaterial {
                index: 4,
                field: "mass"
            })
        );

        let mut cold = types;
        cold[2].specific_heat_capacity = -1.0;
        assert_eq!(
            validate_particle_types(&cold, max),
            Err(SimError::InvalidMaterial {
                index: 2,
                field: "specific_heat_capacity"
            })
        );
    }

    #[test]
    fn states_stay_in_triplet() {
        assert_eq!(MaterialState::of(4), MaterialState::Liquid);
        assert_eq!(MaterialState::Gas.in_triplet_of(4), 5);
        assert_eq!(MaterialState::Solid.in_triplet_of(2), 0);
    }
}
