//! Physics Regression Tests
//!
//! These tests verify that physics parameters produce stable, non-explosive behavior
//! in the default scene. The "no explosion" invariant is universal.
//!
//! # Running tests
//! ```bash
//! cargo test physics_regression
//! ```

use fluidsim::resources::ParticleType;
use fluidsim::simulation::scenarios::two_buckets;
use fluidsim::simulation::{default_particle_types, InteractionInput, MaterialState, SimConfig, Simulation};

// ==================== UNIVERSAL CONSTANTS ====================

/// Maximum velocity threshold - anything above this is an "explosion"
const EXPLOSION_VELOCITY_THRESHOLD: f32 = 500.0;

// ==================== HELPER FUNCTIONS ====================

/// Assert that a material is in sane ranges.
/// This is a static analysis check - no simulation is run.
fn assert_material_stable(index: usize, ptype: &ParticleType, config: &SimConfig) {
    assert!(ptype.mass > 0.0, "{} has no mass", material_name(index));
    assert!(
        ptype.influence_radius > 0.0 && ptype.influence_radius <= config.max_influence_radius,
        "{} influence radius {} exceeds the chunk size",
        material_name(index),
        ptype.influence_radius
    );
    assert!(
        ptype.specific_heat_capacity > 0.0,
        "{} needs a positive heat capacity",
        material_name(index)
    );
    assert!(
        (0.0..=1.0).contains(&ptype.damping),
        "{} border damping must be 0-1",
        material_name(index)
    );
    assert!(ptype.passive_damping >= 0.0, "{} passive damping", material_name(index));
    assert!(ptype.viscosity >= 0.0, "{} viscosity", material_name(index));
    assert!(ptype.stickiness >= 0.0, "{} stickiness", material_name(index));
    assert!(ptype.pressure < 10_000.0, "{} pressure too high", material_name(index));

    // Springs need a positive stiffness to be stable.
    if ptype.fluid_springs_group != 0 {
        assert!(
            ptype.spring_stiffness > 0.0,
            "{} has springs without stiffness",
            material_name(index)
        );
    }
}

/// Get human-readable name for material index
fn material_name(idx: usize) -> &'static str {
    const NAMES: [&str; 6] = [
        "Ice",
        "Water",
        "Steam",
        "Heavy Solid",
        "Heavy Liquid",
        "Heavy Gas",
    ];
    NAMES[idx]
}

// ==================== TESTS ====================

#[test]
fn test_default_material_table_stability() {
    let config = SimConfig::default();
    let types = default_particle_types(&config);
    assert_eq!(types.len(), 6);
    for (index, ptype) in types.iter().enumerate() {
        assert_material_stable(index, ptype, &config);
    }
}

#[test]
fn test_water_freezes_before_it_boils() {
    let types = default_particle_types(&SimConfig::default());
    for state in [MaterialState::Solid, MaterialState::Liquid, MaterialState::Gas] {
        let ptype = &types[state.in_triplet_of(0) as usize];
        assert!(
            ptype.freeze_threshold < ptype.vaporize_threshold,
            "{} thresholds are inverted",
            material_name(state as usize)
        );
    }
}

#[test]
fn test_gas_never_forms_springs() {
    let types = default_particle_types(&SimConfig::default());
    let steam = &types[MaterialState::Gas.in_triplet_of(0) as usize];
    assert_eq!(steam.fluid_springs_group, 0, "Steam should not form springs");

    // Water and ice share a spring group so springs survive freezing.
    let water = &types[MaterialState::Liquid.in_triplet_of(0) as usize];
    let ice = &types[MaterialState::Solid.in_triplet_of(0) as usize];
    assert_eq!(water.fluid_springs_group, ice.fluid_springs_group);
}

#[test]
fn test_global_parameters_bounded() {
    let config = SimConfig::default();

    println!("SPH Parameters:");
    println!("  pressure_multiplier: {}", config.pressure_multiplier);
    println!("  near_pressure_multiplier: {}", config.near_pressure_multiplier);
    println!("  viscosity: {}", config.viscosity);
    println!("  rb_elasticity: {}", config.rb_elasticity);

    assert!(
        (0.0..=1.0).contains(&config.rb_elasticity),
        "Elasticity {} adds energy on collision",
        config.rb_elasticity
    );
    assert!(
        config.rb_particle_radius <= config.max_influence_radius,
        "Collision radius must fit the chunk search"
    );
    assert!(config.look_ahead_factor < config.time_step, "Look-ahead overshoots a frame");
}

#[test]
fn test_no_explosion_default_scene() {
    let config = SimConfig {
        particle_count: 900,
        ..Default::default()
    };
    let scene = two_buckets(&config).expect("default scene fits the world");
    let mut sim = Simulation::new(config, scene).expect("default scene is valid");

    for _ in 0..20 {
        sim.run_time_steps(3, 1.0 / 60.0, &InteractionInput::default());
    }

    let max_speed = sim
        .particle_snapshot()
        .iter()
        .map(|p| p.velocity.length())
        .fold(0.0f32, f32::max);
    assert!(
        max_speed < EXPLOSION_VELOCITY_THRESHOLD,
        "Particle speed {} exceeds explosion threshold",
        max_speed
    );
    assert!(sim
        .particle_snapshot()
        .iter()
        .all(|p| p.position.is_finite() && p.temperature.is_finite()));
}
