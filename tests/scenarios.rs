//! End-to-end scenarios run through the full frame pipeline.

use bevy::math::Vec2;
use fluidsim::simulation::scenarios::{single_particle, RigidBodyDesc, SceneDescription};
use fluidsim::simulation::{
    default_particle_types, InteractionInput, MaterialState, ParticleSpawn, SimConfig, Simulation,
};

const WATER: u32 = 1;
const STEAM: u32 = 2;

fn config(width: f32, height: f32) -> SimConfig {
    SimConfig {
        width,
        height,
        particle_count: 16,
        spawn_dims: 8,
        ..Default::default()
    }
}

fn rectangle(half: Vec2) -> Vec<Vec2> {
    vec![
        Vec2::new(-half.x, -half.y),
        Vec2::new(half.x, -half.y),
        Vec2::new(half.x, half.y),
        Vec2::new(-half.x, half.y),
    ]
}

fn frame(sim: &mut Simulation) {
    sim.run_time_steps(3, 1.0 / 60.0, &InteractionInput::default());
}

#[test]
fn lone_particle_settles_on_the_floor() {
    let config = config(40.0, 30.0);
    let start = Vec2::new(20.0, config.border_padding + 0.5);
    let mut sim = Simulation::new(config.clone(), single_particle(&config, start, WATER)).unwrap();

    for _ in 0..600 {
        frame(&mut sim);
    }

    let particle = sim.particle_snapshot()[0];
    assert_eq!(particle.position.y, config.border_padding);
    assert_eq!(particle.position.x, start.x);
    let substep_delta = sim.substep_delta(0.0, 3);
    assert!(particle.velocity.y.abs() <= config.gravity * substep_delta);
}

fn gas_pair(config: &SimConfig, separation: f32) -> Simulation {
    let centre = Vec2::new(config.width, config.height) * 0.5;
    let temperature = fluidsim::simulation::physics_config::celsius_to_kelvin(150.0);
    let scene = SceneDescription {
        particles: vec![
            ParticleSpawn::at_rest(centre, STEAM, temperature),
            ParticleSpawn::at_rest(centre + Vec2::new(separation, 0.0), STEAM, temperature),
        ],
        rigid_bodies: Vec::new(),
        particle_types: default_particle_types(config),
    };
    Simulation::new(config.clone(), scene).unwrap()
}

#[test]
fn close_pair_without_springs_separates() {
    let config = SimConfig {
        gravity: 0.0,
        ..config(40.0, 30.0)
    };
    let mut sim = gas_pair(&config, 0.5 * config.max_influence_radius);

    let mut distance = 0.5 * config.max_influence_radius;
    for _ in 0..30 {
        frame(&mut sim);
        let particles = sim.particle_snapshot();
        let now = particles[0].position.distance(particles[1].position);
        assert!(now >= distance, "pair moved closer: {now} < {distance}");
        distance = now;
    }
    assert!(distance > 0.5 * config.max_influence_radius);
    assert!(sim.springs().iter().all(|spring| spring.is_empty()));
}

fn live_springs(sim: &Simulation) -> Vec<(u32, u32)> {
    let mut pairs: Vec<(u32, u32)> = sim
        .springs()
        .iter()
        .filter(|spring| !spring.is_empty())
        .map(|spring| (spring.particle_a, spring.particle_b))
        .collect();
    pairs.sort_unstable();
    pairs
}

#[test]
fn liquid_pair_keeps_its_springs_across_frames() {
    let config = SimConfig {
        gravity: 0.0,
        ..config(40.0, 30.0)
    };
    let centre = Vec2::new(20.0, 15.0);
    let scene = SceneDescription {
        particles: vec![
            ParticleSpawn::at_rest(centre, WATER, 290.0),
            ParticleSpawn::at_rest(centre + Vec2::new(1.0, 0.0), WATER, 290.0),
        ],
        rigid_bodies: Vec::new(),
        particle_types: default_particle_types(&config),
    };
    let mut sim = Simulation::new(config.clone(), scene).unwrap();

    frame(&mut sim);
    assert_eq!(live_springs(&sim), vec![(0, 1), (1, 0)]);

    // The other half now holds the transferred springs.
    frame(&mut sim);
    assert_eq!(live_springs(&sim), vec![(0, 1), (1, 0)]);
    assert_eq!(sim.spring_overflow(), 0);
    for spring in sim.springs().iter().filter(|s| !s.is_empty()) {
        assert!(spring.rest_length > 0.0 && spring.rest_length <= config.max_influence_radius);
    }
}

#[test]
fn coincident_pair_separates() {
    let config = SimConfig {
        gravity: 0.0,
        ..config(40.0, 30.0)
    };
    let mut sim = gas_pair(&config, 0.0);
    frame(&mut sim);
    let particles = sim.particle_snapshot();
    assert!(particles[0].position.x < particles[1].position.x);
    assert_eq!(particles[0].position.y, particles[1].position.y);
}

#[test]
fn stationary_body_deflects_but_never_moves() {
    let config = config(60.0, 60.0);
    let body = RigidBodyDesc::fixed(Vec2::new(30.0, 20.0), rectangle(Vec2::splat(5.0)));
    let mut scene = single_particle(&config, Vec2::new(30.0, 28.0), WATER);
    scene.rigid_bodies.push(body);
    let mut sim = Simulation::new(config, scene).unwrap();
    let initial = sim.rigid_bodies()[0];

    for _ in 0..300 {
        frame(&mut sim);
        let particle = sim.particle_snapshot()[0];
        assert!(particle.position.y > 25.0, "particle passed through the top edge");
    }

    assert_eq!(sim.rigid_bodies()[0], initial);
    // The particle comes to rest on the body.
    let particle = sim.particle_snapshot()[0];
    assert!(particle.position.y < 27.5, "particle at {}", particle.position.y);
    assert!(particle.velocity.length() < 1.0);
}

#[test]
fn particle_at_sticky_range_gets_one_request_and_stays() {
    let config = SimConfig {
        gravity: 0.0,
        ..config(60.0, 40.0)
    };
    let body = RigidBodyDesc {
        stickiness: 5.0,
        stickiness_range: 6.0,
        ..RigidBodyDesc::fixed(Vec2::new(30.0, 15.0), rectangle(Vec2::new(10.0, 3.0)))
    };
    // Top edge runs along y = 18, so the particle is exactly 6 from its middle.
    let start = Vec2::new(30.0, 24.0);
    let mut scene = single_particle(&config, start, WATER);
    scene.rigid_bodies.push(body);
    let mut sim = Simulation::new(config, scene).unwrap();

    for _ in 0..10 {
        let report = sim.run_time_steps(3, 1.0 / 60.0, &InteractionInput::default());
        assert_eq!(report.sticky_requests, vec![None, None, Some(1)]);
    }
    let particle = sim.particle_snapshot()[0];
    assert_eq!(particle.position, start);
    assert_eq!(particle.velocity, Vec2::ZERO);
}

#[test]
fn particle_inside_sticky_range_is_pulled_towards_the_body() {
    let config = SimConfig {
        gravity: 0.0,
        ..config(60.0, 40.0)
    };
    let body = RigidBodyDesc {
        stickiness: 5.0,
        stickiness_range: 6.0,
        ..RigidBodyDesc::fixed(Vec2::new(30.0, 15.0), rectangle(Vec2::new(10.0, 3.0)))
    };
    let start = Vec2::new(30.0, 22.0);
    let mut scene = single_particle(&config, start, WATER);
    scene.rigid_bodies.push(body);
    let mut sim = Simulation::new(config, scene).unwrap();

    frame(&mut sim);
    let particle = sim.particle_snapshot()[0];
    assert!(particle.velocity.y < 0.0);
    assert_eq!(particle.velocity.x, 0.0);
}

fn impact_scene(config: &SimConfig, reversed: bool) -> SceneDescription {
    let mut particles: Vec<ParticleSpawn> = (0..4)
        .map(|i| ParticleSpawn {
            position: Vec2::new(26.0 + 2.5 * i as f32, 31.5),
            velocity: Vec2::new(0.0, -3.0),
            ptype: WATER,
            temperature: 290.0,
        })
        .collect();
    if reversed {
        particles.reverse();
    }
    SceneDescription {
        particles,
        rigid_bodies: vec![RigidBodyDesc {
            mass: 50.0,
            stationary: false,
            ..RigidBodyDesc::fixed(Vec2::new(30.0, 25.0), rectangle(Vec2::splat(5.0)))
        }],
        particle_types: default_particle_types(config),
    }
}

#[test]
fn body_impulses_do_not_depend_on_particle_order() {
    let config = SimConfig {
        gravity: 0.0,
        ..config(60.0, 60.0)
    };
    let mut forward = Simulation::new(config.clone(), impact_scene(&config, false)).unwrap();
    let mut reversed = Simulation::new(config.clone(), impact_scene(&config, true)).unwrap();
    forward.run_time_steps(1, 0.0, &InteractionInput::default());
    reversed.run_time_steps(1, 0.0, &InteractionInput::default());

    let a = forward.rigid_bodies()[0];
    let b = reversed.rigid_bodies()[0];
    assert_eq!(a.vel, b.vel);
    assert_eq!(a.angular_vel.to_bits(), b.angular_vel.to_bits());
    assert!(a.vel[1] < 0.0, "the impact pushes the body down");
}

#[test]
fn hot_water_boils_into_steam() {
    let config = SimConfig {
        gravity: 0.0,
        ..config(40.0, 30.0)
    };
    let temperature = fluidsim::simulation::physics_config::celsius_to_kelvin(150.0);
    let scene = SceneDescription {
        particles: vec![ParticleSpawn::at_rest(Vec2::splat(15.0), WATER, temperature)],
        rigid_bodies: Vec::new(),
        particle_types: default_particle_types(&config),
    };
    let mut sim = Simulation::new(config, scene).unwrap();
    frame(&mut sim);
    assert_eq!(
        sim.particle_snapshot()[0].ptype,
        MaterialState::Gas.in_triplet_of(WATER)
    );
}
