//! The simulation controller: owns every buffer and drives the kernels frame by frame.

use bevy::log::{debug, info};
use bevy::math::Vec2;
use bevy::prelude::Resource;

use super::grid::{ChunkGrid, PackedLayout};
use super::input::InteractionInput;
use super::physics_config::{default_particle_types, validate_particle_types, SimConfig};
use super::rigid_body::{CollisionBindings, RigidBodies, CORRECTION_COMPONENTS};
use super::scenarios::SceneDescription;
use super::sort::SpatialIndex;
use super::sph::{self, ParticleBindings, StepUniforms};
use super::springs::SpringTable;
use super::sticky::{is_sticky_substep, StickyQueue};
use crate::compute::{Buffer, DispatchStats, Dispatcher, FixedPointAccumulator, Kernel};
use crate::error::SimError;
use crate::resources::{
    ChunkCapacity, Particle, ParticleType, RbVertex, RigidBody, SpatialEntry, Spring,
};

/// A host-level step of the pipeline. Each pass dispatches one or more kernels in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Chunk keys, bitonic sort, start indices and in-chunk orders
    SpatialSort,
    /// Chunk sizes, spring capacities and their prefix-summed start offsets
    SpringTable,
    PreCalculate,
    CalculateDensities,
    PrepSpringData,
    TransferSpringData,
    ParticleForces,
    ApplyLocalAngularRotation,
    PopulateTraversedChunks,
    ResolveLineCollisions,
    RbForces,
    /// Sort the stickiness requests by particle, then apply them
    ConsumeStickyRequests,
    UpdatePositions,
}

impl Pass {
    pub const ALL: [Pass; 13] = [
        Pass::SpatialSort,
        Pass::SpringTable,
        Pass::PreCalculate,
        Pass::CalculateDensities,
        Pass::PrepSpringData,
        Pass::TransferSpringData,
        Pass::ParticleForces,
        Pass::ApplyLocalAngularRotation,
        Pass::PopulateTraversedChunks,
        Pass::ResolveLineCollisions,
        Pass::RbForces,
        Pass::ConsumeStickyRequests,
        Pass::UpdatePositions,
    ];

    /// Kernels the pass may dispatch, in dispatch order.
    pub const fn kernels(self) -> &'static [Kernel] {
        match self {
            Pass::SpatialSort => &[
                Kernel::CalculateChunkKeys,
                Kernel::SortIteration,
                Kernel::ClearStartIndices,
                Kernel::PopulateStartIndices,
                Kernel::RecordChunkOrders,
            ],
            Pass::SpringTable => &[
                Kernel::PopulateChunkSizes,
                Kernel::PopulateSpringCapacities,
                Kernel::CopySpringCapacities,
                Kernel::ParallelPrefixSumScan,
                Kernel::CopySpringStartIndices,
            ],
            Pass::PreCalculate => &[Kernel::PreCalculate],
            Pass::CalculateDensities => &[Kernel::CalculateDensities],
            Pass::PrepSpringData => &[Kernel::PrepSpringData],
            Pass::TransferSpringData => &[Kernel::TransferAllSpringData],
            Pass::ParticleForces => &[Kernel::ParticleForces],
            Pass::ApplyLocalAngularRotation => &[Kernel::ApplyLocalAngularRotation],
            Pass::PopulateTraversedChunks => &[Kernel::PopulateTraversedChunks],
            Pass::ResolveLineCollisions => &[Kernel::ResolveLineCollisions],
            Pass::RbForces => &[Kernel::RbForces],
            Pass::ConsumeStickyRequests => &[
                Kernel::PopulateSortedStickyRequests,
                Kernel::StickySortIteration,
                Kernel::ConsumeStickyRequests,
            ],
            Pass::UpdatePositions => &[Kernel::UpdatePositions],
        }
    }
}

/// Passes run once per frame, before the substeps.
const FRAME_PASSES: [Pass; 2] = [Pass::SpatialSort, Pass::SpringTable];

/// What one call of [`Simulation::run_time_steps`] did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub substeps: u32,
    /// Duration of each substep
    pub delta_time: f32,
    /// Traversed (chunk, edge) pairs of the last substep
    pub traversed_chunks: usize,
    /// Per substep: `Some(live requests)` on stickiness substeps, `None` otherwise
    pub sticky_requests: Vec<Option<u32>>,
}

/// Host-side copy of one particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleSnapshot {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Kelvin
    pub temperature: f32,
    pub ptype: u32,
}

#[derive(Resource)]
pub struct Simulation {
    config: SimConfig,
    grid: ChunkGrid,
    layout: PackedLayout,
    types: Vec<ParticleType>,
    particles: Buffer<Particle>,
    /// Copy of `particles` taken before kernels that read neighbours
    snapshot: Buffer<Particle>,
    index: SpatialIndex,
    springs: SpringTable,
    bodies: RigidBodies,
    sticky: StickyQueue,
    /// Collision corrections per particle: velocity (x, y), position (x, y)
    corrections: FixedPointAccumulator,
    dispatcher: Dispatcher,
    frame_parity: usize,
    global_substep: u64,
    uniforms: StepUniforms,
    sticky_substep: bool,
    sticky_count: usize,
}

impl Simulation {
    pub fn new(config: SimConfig, scene: SceneDescription) -> Result<Self, SimError> {
        config.validate()?;
        if scene.particles.is_empty() {
            return Err(SimError::NoParticles);
        }

        let types = if scene.particle_types.is_empty() {
            default_particle_types(&config)
        } else {
            scene.particle_types
        };
        validate_particle_types(&types, config.max_influence_radius)?;
        let grid = config.grid();
        let layout = PackedLayout::new(grid.chunks_all(), types.len() as u32);
        let particle_count = scene.particles.len() as u32;
        if !layout.fits(particle_count) {
            return Err(SimError::PackedFieldOverflow {
                chunks: grid.chunks_all(),
                types: types.len() as u32,
                particles: particle_count,
            });
        }

        let world = Vec2::new(config.width, config.height);
        let mut particles = Vec::with_capacity(scene.particles.len());
        for (index, spawn) in scene.particles.iter().enumerate() {
            if spawn.ptype as usize >= types.len() {
                return Err(SimError::UnknownParticleType {
                    index: spawn.ptype,
                    count: types.len() as u32,
                });
            }
            let inside = spawn.position.cmpge(Vec2::ZERO).all() && spawn.position.cmple(world).all();
            if !inside {
                return Err(SimError::ParticleOutOfBounds { index });
            }
            let packed = layout.pack(grid.key_for(spawn.position), spawn.ptype, 0);
            particles.push(Particle::new(
                spawn.position,
                spawn.velocity,
                spawn.temperature,
                packed,
            ));
        }

        let mut bodies = Vec::with_capacity(scene.rigid_bodies.len());
        let mut vertices: Vec<RbVertex> = Vec::new();
        for (body_index, desc) in scene.rigid_bodies.iter().enumerate() {
            if desc.outline.len() < 3 {
                return Err(SimError::DegenerateRigidBody {
                    body: body_index,
                    vertices: desc.outline.len(),
                });
            }
            if !desc.stationary && !(desc.mass.is_finite() && desc.mass > 0.0) {
                return Err(SimError::InvalidRigidBodyMass {
                    body: body_index,
                    mass: desc.mass,
                });
            }
            let start = vertices.len() as u32;
            for local in desc.outline.iter().chain(desc.outline.first()) {
                vertices.push(RbVertex {
                    pos: (desc.position + *local).to_array(),
                    local_pos: local.to_array(),
                    parent_impulse: [0.0; 3],
                    parent: body_index as u32,
                    wall_collision: 0,
                    _padding: [0; 3],
                });
            }
            let mut body = RigidBody {
                pos: desc.position.to_array(),
                vel: desc.velocity.to_array(),
                rot_angle: 0.0,
                angular_vel: 0.0,
                mass: desc.mass,
                inertia: 0.0,
                stickiness: desc.stickiness,
                stickiness_range: desc.stickiness_range,
                stickiness_range_sqr: 0.0,
                max_dst_sqr: 0.0,
                stationary: desc.stationary as u32,
                wall_collision: 0,
                line_indices: [start, vertices.len() as u32 - 1],
            };
            body.refresh_derived(&vertices);
            bodies.push(body);
        }

        let index = SpatialIndex::new(particle_count, grid.chunks_all());
        let springs = SpringTable::new(
            particle_count,
            grid.chunks_all(),
            config.spring_capacity_safety,
        );
        let rigid_bodies = RigidBodies::new(&config, &grid, bodies, vertices);
        let sticky = StickyQueue::new(config.sticky_request_capacity);

        info!(
            "simulation: {} particles, {} material types, {}x{} chunks of radius {}",
            particle_count,
            types.len(),
            grid.chunks().x,
            grid.chunks().y,
            grid.radius()
        );
        info!(
            "simulation: {} rigid bodies, {} spring slots per half ({} bytes), {} sticky request slots",
            rigid_bodies.bodies().len(),
            springs.half_len(),
            springs.byte_size(),
            sticky.capacity()
        );

        Ok(Self {
            snapshot: Buffer::from_slice("Particle Snapshot", &particles),
            particles: Buffer::from_slice("Particles", &particles),
            corrections: FixedPointAccumulator::new(particles.len(), CORRECTION_COMPONENTS),
            config,
            grid,
            layout,
            types,
            index,
            springs,
            bodies: rigid_bodies,
            sticky,
            dispatcher: Dispatcher::new(),
            frame_parity: 1,
            global_substep: 0,
            uniforms: StepUniforms::default(),
            sticky_substep: false,
            sticky_count: 0,
        })
    }

    /// Duration of one substep.
    pub fn substep_delta(&self, frame_delta: f32, substeps: u32) -> f32 {
        let substeps = substeps.max(1) as f32;
        if self.config.fixed_time_step {
            self.config.time_step / substeps
        } else {
            frame_delta * self.config.program_speed / substeps
        }
    }

    /// Advance the simulation by one rendered frame of `substeps` substeps.
    pub fn run_time_steps(
        &mut self,
        substeps: u32,
        frame_delta: f32,
        pointer: &InteractionInput,
    ) -> FrameReport {
        let substeps = substeps.max(1);
        let delta_time = self.substep_delta(frame_delta, substeps);
        self.frame_parity = 1 - self.frame_parity;
        self.uniforms = StepUniforms {
            delta_time,
            sticky_delta_time: delta_time * self.config.sticky_request_interval as f32,
            pointer: *pointer,
        };
        self.springs.reset_overflow();

        for pass in FRAME_PASSES {
            self.execute(pass);
        }

        let mut report = FrameReport {
            substeps,
            delta_time,
            traversed_chunks: 0,
            sticky_requests: Vec::with_capacity(substeps as usize),
        };
        for substep in 0..substeps {
            self.sticky_substep =
                is_sticky_substep(self.global_substep, self.config.sticky_request_interval);
            self.run_substep(substep);

            report.sticky_requests.push(
                self.sticky_substep
                    .then_some(self.sticky_count as u32),
            );
            self.global_substep += 1;
        }
        report.traversed_chunks = self.bodies.traversed().live_len();

        if let Some(requests) = report.sticky_requests.iter().flatten().last() {
            debug!("sticky requests on the last stickiness substep: {}", requests);
        }
        report
    }

    fn run_substep(&mut self, substep: u32) {
        self.execute(Pass::PreCalculate);
        self.execute(Pass::CalculateDensities);
        if substep == 0 {
            self.execute(Pass::PrepSpringData);
            self.execute(Pass::TransferSpringData);
        }
        self.execute(Pass::ParticleForces);

        self.corrections.clear();
        if self.sticky_substep {
            self.sticky.reset();
        }
        if self.bodies.has_edges() {
            self.execute(Pass::ApplyLocalAngularRotation);
            self.execute(Pass::PopulateTraversedChunks);
            self.execute(Pass::ResolveLineCollisions);
            self.execute(Pass::RbForces);
        }
        if self.sticky_substep {
            self.execute(Pass::ConsumeStickyRequests);
        }
        self.execute(Pass::UpdatePositions);
    }

    /// Run one pass against the current buffers and uniforms.
    pub fn execute(&mut self, pass: Pass) {
        match pass {
            Pass::SpatialSort => {
                self.index.rebuild(
                    &mut self.dispatcher,
                    &self.grid,
                    &self.layout,
                    &mut self.particles,
                );
            }
            Pass::SpringTable => {
                self.springs.rebuild(
                    &mut self.dispatcher,
                    &self.grid,
                    &self.index,
                    self.frame_parity,
                );
            }
            Pass::PreCalculate => {
                sph::pre_calculate(
                    &mut self.dispatcher,
                    self.particles.as_mut_slice(),
                    self.config.look_ahead_factor,
                );
            }
            Pass::CalculateDensities => {
                self.snapshot.copy_from(&self.particles);
                let bindings = ParticleBindings {
                    config: &self.config,
                    grid: &self.grid,
                    layout: &self.layout,
                    types: &self.types,
                    index: &self.index,
                };
                sph::calculate_densities(
                    &mut self.dispatcher,
                    bindings,
                    self.snapshot.as_slice(),
                    self.particles.as_mut_slice(),
                );
            }
            Pass::PrepSpringData => self.springs.prep(&mut self.dispatcher, self.frame_parity),
            Pass::TransferSpringData => {
                self.springs.transfer(
                    &mut self.dispatcher,
                    &self.grid,
                    &self.layout,
                    self.particles.as_slice(),
                    self.frame_parity,
                );
            }
            Pass::ParticleForces => {
                self.snapshot.copy_from(&self.particles);
                let bindings = ParticleBindings {
                    config: &self.config,
                    grid: &self.grid,
                    layout: &self.layout,
                    types: &self.types,
                    index: &self.index,
                };
                let particle_count = self.particles.len();
                let windows =
                    self.springs
                        .windows_mut(self.frame_parity, &self.index, particle_count);
                sph::particle_forces(
                    &mut self.dispatcher,
                    bindings,
                    &self.uniforms,
                    self.snapshot.as_slice(),
                    self.particles.as_mut_slice(),
                    windows,
                );
            }
            Pass::ApplyLocalAngularRotation => {
                self.bodies
                    .apply_local_angular_rotation(&mut self.dispatcher, &self.config);
            }
            Pass::PopulateTraversedChunks => {
                self.bodies
                    .populate_traversed_chunks(&mut self.dispatcher, &self.config, &self.grid);
            }
            Pass::ResolveLineCollisions => {
                self.bodies.clear_impulses();
                let dispatch = self
                    .bodies
                    .traversed_dispatch_size(&mut self.dispatcher, self.config.traversed_chunk_safety);
                let bindings = CollisionBindings {
                    config: &self.config,
                    layout: &self.layout,
                    types: &self.types,
                    index: &self.index,
                    particles: self.particles.as_slice(),
                    corrections: &self.corrections,
                    sticky_requests: self.sticky_substep.then_some(self.sticky.requests()),
                };
                self.bodies
                    .resolve_line_collisions(&mut self.dispatcher, bindings, dispatch);
            }
            Pass::RbForces => {
                self.bodies.rb_forces(
                    &mut self.dispatcher,
                    &self.config,
                    self.uniforms.delta_time,
                );
            }
            Pass::ConsumeStickyRequests => {
                self.sticky_count = self.sticky.sort(&mut self.dispatcher);
                sph::consume_sticky_requests(
                    &mut self.dispatcher,
                    &self.uniforms,
                    self.sticky.sorted(),
                    self.sticky_count,
                    self.snapshot.as_slice(),
                    self.particles.as_mut_slice(),
                );
            }
            Pass::UpdatePositions => {
                let bindings = ParticleBindings {
                    config: &self.config,
                    grid: &self.grid,
                    layout: &self.layout,
                    types: &self.types,
                    index: &self.index,
                };
                sph::update_positions(
                    &mut self.dispatcher,
                    bindings,
                    &self.uniforms,
                    &self.corrections,
                    self.particles.as_mut_slice(),
                );
            }
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn grid(&self) -> &ChunkGrid {
        &self.grid
    }

    pub fn layout(&self) -> &PackedLayout {
        &self.layout
    }

    pub fn particle_types(&self) -> &[ParticleType] {
        &self.types
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn frame_parity(&self) -> usize {
        self.frame_parity
    }

    pub fn global_substep(&self) -> u64 {
        self.global_substep
    }

    pub fn particles(&self) -> &[Particle] {
        self.particles.as_slice()
    }

    pub fn particle_snapshot(&self) -> Vec<ParticleSnapshot> {
        self.particles
            .as_slice()
            .iter()
            .map(|particle| ParticleSnapshot {
                position: particle.position(),
                velocity: particle.velocity(),
                temperature: particle.temperature,
                ptype: self.layout.ptype(particle.packed),
            })
            .collect()
    }

    /// World-space outline of every body, closing vertex included.
    pub fn rigid_body_outlines(&self) -> Vec<Vec<Vec2>> {
        let vertices = self.bodies.vertices();
        self.bodies
            .bodies()
            .iter()
            .map(|body| vertices[body.vertex_range()].iter().map(RbVertex::position).collect())
            .collect()
    }

    pub fn rigid_body_vertices(&self) -> &[RbVertex] {
        self.bodies.vertices()
    }

    pub fn rigid_bodies(&self) -> &[RigidBody] {
        self.bodies.bodies()
    }

    pub fn set_stickiness_range(&mut self, body: usize, range: f32) {
        self.bodies.set_stickiness_range(body, range);
    }

    pub fn spatial_lookup(&self) -> &[SpatialEntry] {
        self.index.lookup()
    }

    pub fn start_indices(&self) -> &[u32] {
        self.index.start_indices()
    }

    pub fn chunk_capacities(&self) -> &[ChunkCapacity] {
        self.springs.capacities()
    }

    /// Spring start offsets of the current frame.
    pub fn spring_starts(&self) -> &[u32] {
        self.springs.starts(self.frame_parity)
    }

    /// Spring slots of the current frame.
    pub fn springs(&self) -> &[Spring] {
        self.springs.half(self.frame_parity)
    }

    pub fn dispatch_stats(&self, kernel: Kernel) -> DispatchStats {
        self.dispatcher.stats(kernel)
    }

    pub fn sync_points(&self) -> u32 {
        self.dispatcher.sync_points()
    }

    /// Springs dropped for lack of slots during the last frame.
    pub fn spring_overflow(&self) -> u32 {
        self.springs.overflow()
    }

    /// Stickiness requests dropped for lack of slots on the last stickiness substep.
    pub fn sticky_overflow(&self) -> u32 {
        self.sticky.dropped()
    }

    /// Traversed (chunk, edge) pairs dropped for lack of slots on the last substep.
    pub fn traversed_overflow(&self) -> u32 {
        self.bodies.traversed().dropped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::scenarios::{single_particle, two_buckets, ParticleSpawn, RigidBodyDesc};

    fn small_config() -> SimConfig {
        SimConfig {
            width: 40.0,
            height: 30.0,
            particle_count: 64,
            spawn_dims: 16,
            ..Default::default()
        }
    }

    #[test]
    fn substep_delta_follows_time_mode() {
        let config = small_config();
        let sim = Simulation::new(config.clone(), single_particle(&config, Vec2::splat(10.0), 1))
            .unwrap();
        assert_eq!(sim.substep_delta(1.0, 4), 0.005);

        let config = SimConfig {
            fixed_time_step: false,
            ..small_config()
        };
        let sim = Simulation::new(config.clone(), single_particle(&config, Vec2::splat(10.0), 1))
            .unwrap();
        assert!((sim.substep_delta(0.03, 3) - 0.02).abs() < 1e-6);
    }

    #[test]
    fn setup_rejects_bad_scenes() {
        let config = small_config();
        assert!(matches!(
            Simulation::new(config.clone(), SceneDescription::default()),
            Err(SimError::NoParticles)
        ));
        assert!(matches!(
            Simulation::new(config.clone(), single_particle(&config, Vec2::splat(10.0), 9)),
            Err(SimError::UnknownParticleType { index: 9, count: 6 })
        ));
        assert!(matches!(
            Simulation::new(config.clone(), single_particle(&config, Vec2::new(-1.0, 5.0), 1)),
            Err(SimError::ParticleOutOfBounds { index: 0 })
        ));

        let mut scene = single_particle(&config, Vec2::splat(10.0), 1);
        scene.rigid_bodies.push(RigidBodyDesc::fixed(
            Vec2::splat(20.0),
            vec![Vec2::ZERO, Vec2::X],
        ));
        assert!(matches!(
            Simulation::new(config.clone(), scene),
            Err(SimError::DegenerateRigidBody { body: 0, vertices: 2 })
        ));

        let square = vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];
        let mut scene = single_particle(&config, Vec2::splat(10.0), 1);
        scene.rigid_bodies.push(RigidBodyDesc {
            mass: 0.0,
            stationary: false,
            ..RigidBodyDesc::fixed(Vec2::splat(20.0), square.clone())
        });
        assert!(matches!(
            Simulation::new(config.clone(), scene),
            Err(SimError::InvalidRigidBodyMass { body: 0, .. })
        ));

        // Stationary bodies never divide by their mass.
        let mut scene = single_particle(&config, Vec2::splat(10.0), 1);
        scene.rigid_bodies.push(RigidBodyDesc {
            mass: 0.0,
            ..RigidBodyDesc::fixed(Vec2::splat(20.0), square)
        });
        assert!(Simulation::new(config.clone(), scene).is_ok());
    }

    #[test]
    fn setup_rejects_bad_material_tables() {
        let config = small_config();
        let with_types = |types: Vec<ParticleType>, ptype: u32| SceneDescription {
            particle_types: types,
            ..single_particle(&config, Vec2::splat(10.0), ptype)
        };

        // A fourth type has no liquid or gas to change into.
        let mut types = default_particle_types(&config);
        types.truncate(3);
        types.push(types[0]);
        assert!(matches!(
            Simulation::new(config.clone(), with_types(types, 3)),
            Err(SimError::IncompleteMaterialTriplet { types: 4 })
        ));

        let mut types = default_particle_types(&config);
        types[1].influence_radius = config.max_influence_radius + 0.5;
        assert!(matches!(
            Simulation::new(config.clone(), with_types(types, 1)),
            Err(SimError::InfluenceRadiusTooLarge { index: 1, .. })
        ));

        let mut types = default_particle_types(&config);
        types[0].mass = 0.0;
        assert!(matches!(
            Simulation::new(config.clone(), with_types(types, 1)),
            Err(SimError::InvalidMaterial { index: 0, field: "mass" })
        ));

        let mut types = default_particle_types(&config);
        types[5].specific_heat_capacity = 0.0;
        assert!(matches!(
            Simulation::new(config.clone(), with_types(types, 1)),
            Err(SimError::InvalidMaterial {
                index: 5,
                field: "specific_heat_capacity"
            })
        ));
    }

    #[test]
    fn huge_grid_overflows_packed_field() {
        let config = SimConfig {
            width: 20_000.0,
            height: 20_000.0,
            max_influence_radius: 1.0,
            ..small_config()
        };
        let mut scene = single_particle(&config, Vec2::splat(10.0), 1);
        scene.particles = vec![ParticleSpawn::at_rest(Vec2::splat(10.0), 1, 290.0); 64];
        assert!(matches!(
            Simulation::new(config, scene),
            Err(SimError::PackedFieldOverflow { .. })
        ));
    }

    #[test]
    fn frame_flips_parity_and_counts_substeps() {
        let config = small_config();
        let mut sim = Simulation::new(config.clone(), single_particle(&config, Vec2::splat(10.0), 1))
            .unwrap();
        let parity = sim.frame_parity();
        let report = sim.run_time_steps(3, 0.016, &InteractionInput::default());
        assert_ne!(sim.frame_parity(), parity);
        assert_eq!(report.substeps, 3);
        assert_eq!(report.sticky_requests, vec![None, None, Some(0)]);
        assert_eq!(sim.global_substep(), 3);
        assert_eq!(sim.dispatch_stats(Kernel::UpdatePositions).dispatches, 3);
        assert_eq!(sim.dispatch_stats(Kernel::PrepSpringData).dispatches, 1);
        assert_eq!(sim.dispatch_stats(Kernel::CalculateChunkKeys).dispatches, 1);
        // No bodies: no rigid-body kernel ran.
        assert_eq!(sim.dispatch_stats(Kernel::RbForces).dispatches, 0);
    }

    #[test]
    fn pass_table_covers_every_kernel_once() {
        let mut owners: Vec<Kernel> = Pass::ALL
            .iter()
            .flat_map(|pass| pass.kernels().iter().copied())
            .collect();
        owners.sort();
        let mut all = Kernel::ALL.to_vec();
        all.sort();
        assert_eq!(owners, all);
    }

    #[test]
    fn executing_a_pass_dispatches_its_kernels() {
        let config = small_config();
        let mut sim = Simulation::new(config.clone(), single_particle(&config, Vec2::splat(10.0), 1))
            .unwrap();
        sim.execute(Pass::SpatialSort);
        assert_eq!(sim.dispatch_stats(Kernel::CalculateChunkKeys).dispatches, 1);
        assert_eq!(sim.dispatch_stats(Kernel::RecordChunkOrders).dispatches, 1);
        assert_eq!(sim.dispatch_stats(Kernel::PopulateChunkSizes).dispatches, 0);

        sim.execute(Pass::SpringTable);
        assert_eq!(
            sim.dispatch_stats(Kernel::ParallelPrefixSumScan).dispatches,
            crate::simulation::springs::scan_passes(sim.grid().chunks_all())
        );
        assert_eq!(sim.dispatch_stats(Kernel::CopySpringStartIndices).dispatches, 1);
    }

    #[test]
    fn default_scene_runs_a_frame() {
        let config = SimConfig {
            particle_count: 900,
            ..Default::default()
        };
        let scene = two_buckets(&config).unwrap();
        let mut sim = Simulation::new(config, scene).unwrap();
        let report = sim.run_time_steps(3, 0.016, &InteractionInput::default());
        assert!(report.traversed_chunks > 0);
        assert!(sim.particles().iter().all(|p| p.position().is_finite()));
        assert_eq!(sim.rigid_body_outlines().len(), 2);
        assert_eq!(sim.rigid_body_outlines()[0].len(), 9);

        for pass in FRAME_PASSES {
            for kernel in pass.kernels() {
                assert!(sim.dispatch_stats(*kernel).dispatches > 0, "{:?} never ran", kernel);
            }
        }

        // Stickiness range changes refresh the squared range.
        sim.set_stickiness_range(1, 5.0);
        assert_eq!(sim.rigid_bodies()[1].stickiness_range_sqr, 25.0);

        // Spring starts are an exclusive scan of the capacities.
        let starts = sim.spring_starts();
        let capacities = sim.chunk_capacities();
        for i in 1..starts.len() {
            assert_eq!(starts[i] - starts[i - 1], capacities[i - 1].springs);
        }
    }
}
