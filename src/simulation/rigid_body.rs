//! Rigid polygon bodies and their two-way coupling with the particles.
//!
//! Per substep: vertices are placed from their body's pose, every outline edge is walked
//! through the chunk grid, each (chunk, edge) pair resolves collisions against the particles
//! of that chunk, and finally every body integrates the impulses its vertices collected.

use bevy::log::debug;
use bevy::math::Vec2;

use super::grid::{ChunkGrid, PackedLayout};
use super::kernels::MIN_DISTANCE;
use super::physics_config::SimConfig;
use super::sort::SpatialIndex;
use crate::compute::{AppendBuffer, Buffer, Dispatcher, FixedPointAccumulator, Kernel};
use crate::resources::{Particle, ParticleType, RbVertex, RigidBody, StickyRequest, TraversedChunk};

/// Components of a particle correction: velocity change (x, y) then position change (x, y).
pub const CORRECTION_COMPONENTS: usize = 4;
/// Components of a vertex impulse: linear (x, y) then angular.
pub const IMPULSE_COMPONENTS: usize = 3;

/// Closest point to `p` on the segment `a -> b`.
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sqr = ab.length_squared();
    if len_sqr <= f32::EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sqr).clamp(0.0, 1.0);
    a + ab * t
}

/// Chunks each walked edge cell is widened by, in every direction.
pub fn chunk_expansion(config: &SimConfig, body: &RigidBody, radius: f32) -> i32 {
    let reach = config.rb_particle_radius.max(body.stickiness_range);
    (config.max_chunk_search_safety as i32).max((reach / radius).ceil() as i32)
}

/// Read-only bindings of the collision kernel.
#[derive(Clone, Copy)]
pub struct CollisionBindings<'a> {
    pub config: &'a SimConfig,
    pub layout: &'a PackedLayout,
    pub types: &'a [ParticleType],
    pub index: &'a SpatialIndex,
    pub particles: &'a [Particle],
    pub corrections: &'a FixedPointAccumulator,
    /// `Some` on substeps that evaluate stickiness
    pub sticky_requests: Option<&'a AppendBuffer<StickyRequest>>,
}

pub struct RigidBodies {
    bodies: Buffer<RigidBody>,
    vertices: Buffer<RbVertex>,
    impulses: FixedPointAccumulator,
    traversed: AppendBuffer<TraversedChunk>,
    /// Lanes of the collision dispatch, fixed after the first measurement.
    traversed_dispatch: Option<usize>,
}

impl RigidBodies {
    pub fn new(
        config: &SimConfig,
        grid: &ChunkGrid,
        bodies: Vec<RigidBody>,
        vertices: Vec<RbVertex>,
    ) -> Self {
        let capacity = traversed_capacity(config, grid, &bodies, &vertices);
        let vertex_count = vertices.len();
        Self {
            bodies: Buffer::from_slice("Rigid Bodies", &bodies),
            vertices: Buffer::from_slice("Rigid Body Vertices", &vertices),
            impulses: FixedPointAccumulator::new(vertex_count, IMPULSE_COMPONENTS),
            traversed: AppendBuffer::with_capacity("Traversed Chunks", capacity),
            traversed_dispatch: None,
        }
    }

    pub fn bodies(&self) -> &[RigidBody] {
        self.bodies.as_slice()
    }

    pub fn vertices(&self) -> &[RbVertex] {
        self.vertices.as_slice()
    }

    pub fn traversed(&self) -> &AppendBuffer<TraversedChunk> {
        &self.traversed
    }

    pub fn traversed_dispatch(&self) -> Option<usize> {
        self.traversed_dispatch
    }

    /// Whether there is any edge to collide with.
    pub fn has_edges(&self) -> bool {
        self.vertices.len() > 1
    }

    /// Change a body's stickiness range and refresh its derived fields.
    pub fn set_stickiness_range(&mut self, body: usize, range: f32) {
        let vertices = self.vertices.as_slice();
        if let Some(rb) = self.bodies.as_mut_slice().get_mut(body) {
            rb.stickiness_range = range;
            rb.refresh_derived(vertices);
        }
    }

    /// Place every vertex at its body's pose and flag vertices outside the padded world.
    pub fn apply_local_angular_rotation(&mut self, dispatcher: &mut Dispatcher, config: &SimConfig) {
        let bodies = self.bodies.as_slice();
        let min = Vec2::splat(config.border_padding);
        let max = Vec2::new(config.width, config.height) - config.border_padding;
        dispatcher.map(
            Kernel::ApplyLocalAngularRotation,
            self.vertices.as_mut_slice(),
            |_, vertex| {
                let body = &bodies[vertex.parent as usize];
                let rotation = Vec2::from_angle(body.rot_angle);
                let world = body.position() + rotation.rotate(Vec2::from_array(vertex.local_pos));
                vertex.pos = world.to_array();
                let outside = world.cmplt(min).any() || world.cmpgt(max).any();
                vertex.wall_collision = outside as u32;
            },
        );
    }

    /// Walk every edge through the grid and append its widened, deduplicated chunk set.
    pub fn populate_traversed_chunks(
        &mut self,
        dispatcher: &mut Dispatcher,
        config: &SimConfig,
        grid: &ChunkGrid,
    ) {
        self.traversed.reset_counter();
        let bodies = self.bodies.as_slice();
        let vertices = self.vertices.as_slice();
        let traversed = &self.traversed;
        let chunks = grid.chunks().as_ivec2();

        dispatcher.for_each(
            Kernel::PopulateTraversedChunks,
            vertices.len().saturating_sub(1),
            |edge| {
                let body = &bodies[vertices[edge].parent as usize];
                if edge >= body.line_indices[1] as usize {
                    return;
                }
                let expand = chunk_expansion(config, body, grid.radius());
                let mut keys = Vec::new();
                grid.walk_segment(
                    vertices[edge].position(),
                    vertices[edge + 1].position(),
                    |cell| {
                        let cell = cell.as_ivec2();
                        for dy in -expand..=expand {
                            for dx in -expand..=expand {
                                let x = cell.x + dx;
                                let y = cell.y + dy;
                                if x >= 0 && y >= 0 && x < chunks.x && y < chunks.y {
                                    keys.push((x + y * chunks.x) as u32);
                                }
                            }
                        }
                    },
                );
                keys.sort_unstable();
                keys.dedup();
                for chunk_key in keys {
                    traversed.append(TraversedChunk {
                        chunk_key,
                        edge: edge as u32,
                    });
                }
            },
        );
    }

    /// Collision dispatch size. The first call reads the traversed count back and fixes the
    /// size with `safety` headroom for all later substeps.
    pub fn traversed_dispatch_size(&mut self, dispatcher: &mut Dispatcher, safety: f32) -> usize {
        if let Some(size) = self.traversed_dispatch {
            return size;
        }
        let count = dispatcher.read_back_count(&self.traversed);
        let size = (count as f32 * (1.0 + safety)).ceil() as usize;
        debug!("traversed chunks measured at {}, dispatching {} lanes", count, size);
        self.traversed_dispatch = Some(size);
        size
    }

    /// Zero the vertex impulse accumulators before collisions are resolved.
    pub fn clear_impulses(&mut self) {
        self.impulses.clear();
    }

    /// Push particles out of body outlines and exchange impulses. Lanes past the live
    /// traversed count exit immediately.
    pub fn resolve_line_collisions(
        &self,
        dispatcher: &mut Dispatcher,
        bindings: CollisionBindings,
        dispatch: usize,
    ) {
        let bodies = self.bodies.as_slice();
        let vertices = self.vertices.as_slice();
        let traversed = &self.traversed;
        let impulses = &self.impulses;
        let radius = bindings.config.rb_particle_radius;
        let elasticity = bindings.config.rb_elasticity;

        dispatcher.for_each(Kernel::ResolveLineCollisions, dispatch, |lane| {
            let Some(pair) = traversed.get(lane) else {
                return;
            };
            let edge = pair.edge as usize;
            let a = vertices[edge].position();
            let b = vertices[edge + 1].position();
            let body_index = vertices[edge].parent;
            let body = &bodies[body_index as usize];
            let reach = radius.max(body.stickiness_range);

            for j in bindings.index.chunk_particles(pair.chunk_key) {
                let particle = &bindings.particles[j as usize];
                let position = particle.position();
                if !body.may_reach(position, reach) {
                    continue;
                }
                let ptype = &bindings.types[bindings.layout.ptype(particle.packed) as usize];
                let closest = closest_point_on_segment(position, a, b);
                let offset = position - closest;
                let dst_sqr = offset.length_squared();

                if let Some(requests) = bindings.sticky_requests {
                    if body.stickiness_range > 0.0 && dst_sqr <= body.stickiness_range_sqr {
                        requests.append(StickyRequest {
                            particle: j,
                            rigid_body: body_index,
                            dst_sqr,
                            stickiness: body.stickiness * ptype.stickiness,
                            anchor: closest.to_array(),
                            range: body.stickiness_range,
                            _padding: 0,
                        });
                    }
                }

                if dst_sqr >= radius * radius {
                    continue;
                }
                let dst = dst_sqr.sqrt();
                let normal = if dst > MIN_DISTANCE {
                    offset / dst
                } else {
                    (b - a).perp().normalize_or_zero()
                };
                let push = normal * (radius - dst);

                let relative = particle.velocity() - body.point_velocity(closest);
                let normal_speed = relative.dot(normal);
                let mut delta_v = Vec2::ZERO;
                if normal_speed < 0.0 {
                    let lever = closest - body.position();
                    let lever_n = lever.perp_dot(normal);
                    let inv_mass = 1.0 / ptype.mass;
                    let (body_inv_mass, body_inv_inertia) = if body.is_stationary() {
                        (0.0, 0.0)
                    } else {
                        (1.0 / body.mass, 1.0 / body.inertia)
                    };
                    let magnitude = -(1.0 + elasticity) * normal_speed
                        / (inv_mass + body_inv_mass + lever_n * lever_n * body_inv_inertia);
                    delta_v = normal * magnitude * inv_mass;

                    if !body.is_stationary() {
                        let body_impulse = -normal * magnitude;
                        impulses.add_all(
                            edge,
                            &[body_impulse.x, body_impulse.y, lever.perp_dot(body_impulse)],
                        );
                    }
                }
                bindings.corrections.add_all(
                    j as usize,
                    &[delta_v.x, delta_v.y, push.x, push.y],
                );
            }
        });
    }

    /// Store each vertex's impulse, then integrate every non-stationary body.
    pub fn rb_forces(&mut self, dispatcher: &mut Dispatcher, config: &SimConfig, delta_time: f32) {
        let impulses = &self.impulses;
        dispatcher.map(Kernel::RbForces, self.vertices.as_mut_slice(), |i, vertex| {
            vertex.parent_impulse = impulses.read_all::<IMPULSE_COMPONENTS>(i);
        });

        let vertices = self.vertices.as_slice();
        let min = Vec2::splat(config.border_padding);
        let max = Vec2::new(config.width, config.height) - config.border_padding;
        dispatcher.map(Kernel::RbForces, self.bodies.as_mut_slice(), |_, body| {
            if body.is_stationary() {
                body.wall_collision = 0;
                return;
            }
            let outline = &vertices[body.vertex_range()];
            let mut impulse = Vec2::ZERO;
            let mut angular_impulse = 0.0;
            for vertex in outline {
                impulse += Vec2::new(vertex.parent_impulse[0], vertex.parent_impulse[1]);
                angular_impulse += vertex.parent_impulse[2];
            }

            let mut velocity = body.velocity() + impulse / body.mass;
            velocity.y -= config.gravity * delta_time;
            body.angular_vel += angular_impulse / body.inertia;

            // Wall response from the vertices placed this substep.
            let mut correction = Vec2::ZERO;
            for vertex in outline.iter().filter(|v| v.wall_collision != 0) {
                let p = vertex.position();
                correction = correction.max(min - p);
                correction = correction.min(max - p);
            }
            if correction.x != 0.0 && velocity.x * correction.x < 0.0 {
                velocity.x = -velocity.x * config.rb_elasticity;
            }
            if correction.y != 0.0 && velocity.y * correction.y < 0.0 {
                velocity.y = -velocity.y * config.rb_elasticity;
            }
            body.wall_collision = (correction != Vec2::ZERO) as u32;

            let position = body.position() + correction + velocity * delta_time;
            body.pos = position.to_array();
            body.vel = velocity.to_array();
            body.rot_angle += body.angular_vel * delta_time;
        });
    }
}

/// Upper bound on traversed (chunk, edge) pairs: every edge crosses at most
/// `2 * ceil(len / radius) + 2` chunks, each widened into a square.
fn traversed_capacity(
    config: &SimConfig,
    grid: &ChunkGrid,
    bodies: &[RigidBody],
    vertices: &[RbVertex],
) -> usize {
    bodies
        .iter()
        .map(|body| {
            let expand = chunk_expansion(config, body, grid.radius()) as usize;
            let square = (2 * expand + 1) * (2 * expand + 1);
            let outline = &vertices[body.vertex_range()];
            outline
                .windows(2)
                .map(|pair| {
                    let len = Vec2::from_array(pair[0].local_pos)
                        .distance(Vec2::from_array(pair[1].local_pos));
                    (2 * (len / grid.radius()).ceil() as usize + 2) * square
                })
                .sum::<usize>()
        })
        .sum::<usize>()
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;
    use std::f32::consts::FRAC_PI_2;

    fn square_body(centre: Vec2, half: f32, stationary: bool) -> (RigidBody, Vec<RbVertex>) {
        let corners = [
            Vec2::new(-half, -half),
            Vec2::new(half, -half),
            Vec2::new(half, half),
            Vec2::new(-half, half),
            Vec2::new(-half, -half),
        ];
        let vertices: Vec<RbVertex> = corners
            .iter()
            .map(|local| RbVertex {
                pos: (centre + *local).to_array(),
                local_pos: local.to_array(),
                ..RbVertex::zeroed()
            })
            .collect();
        let mut body = RigidBody {
            pos: centre.to_array(),
            mass: 50.0,
            stationary: stationary as u32,
            line_indices: [0, 4],
            ..RigidBody::zeroed()
        };
        body.refresh_derived(&vertices);
        (body, vertices)
    }

    #[test]
    fn closest_point_is_clamped_to_segment() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert_eq!(closest_point_on_segment(Vec2::new(4.0, 3.0), a, b), Vec2::new(4.0, 0.0));
        assert_eq!(closest_point_on_segment(Vec2::new(-4.0, 3.0), a, b), a);
        assert_eq!(closest_point_on_segment(Vec2::new(14.0, -3.0), a, b), b);
        assert_eq!(closest_point_on_segment(Vec2::ONE, a, a), a);
    }

    #[test]
    fn broad_phase_keeps_everything_near_the_outline() {
        let centre = Vec2::new(50.0, 50.0);
        let (body, vertices) = square_body(centre, 5.0, false);
        let reach = 1.5;
        assert_eq!(body.max_dst_sqr, 50.0);

        // Points `reach` off every edge, and just inside `reach` past each corner.
        for edge in 0..4 {
            let a = vertices[edge].position();
            let b = vertices[edge + 1].position();
            let outward = (a + b - 2.0 * centre).normalize();
            for step in 0..=10 {
                let on_edge = a.lerp(b, step as f32 / 10.0);
                assert!(body.may_reach(on_edge + outward * reach, reach));
            }
            assert!(body.may_reach(a + (a - centre).normalize() * reach * 0.99, reach));
        }

        assert!(!body.may_reach(Vec2::new(58.0, 58.0), reach));
        assert!(!body.may_reach(Vec2::new(50.0, 62.0), reach));
    }

    #[test]
    fn rotation_places_vertices() {
        let config = SimConfig::default();
        let grid = config.grid();
        let (mut body, vertices) = square_body(Vec2::new(50.0, 50.0), 5.0, false);
        body.rot_angle = FRAC_PI_2;
        let mut bodies = RigidBodies::new(&config, &grid, vec![body], vertices);
        let mut dispatcher = Dispatcher::new();
        bodies.apply_local_angular_rotation(&mut dispatcher, &config);

        // (-5, -5) rotated a quarter turn counter-clockwise is (5, -5).
        let first = bodies.vertices()[0].position();
        assert!((first - Vec2::new(55.0, 45.0)).length() < 1e-4);
        assert!(bodies.vertices().iter().all(|v| v.wall_collision == 0));
    }

    #[test]
    fn edges_traverse_their_chunks_once() {
        let config = SimConfig::default();
        let grid = config.grid();
        let (body, vertices) = square_body(Vec2::new(50.0, 50.0), 5.0, true);
        let mut bodies = RigidBodies::new(&config, &grid, vec![body], vertices);
        let mut dispatcher = Dispatcher::new();
        bodies.apply_local_angular_rotation(&mut dispatcher, &config);
        bodies.populate_traversed_chunks(&mut dispatcher, &config, &grid);

        let pairs: Vec<TraversedChunk> = bodies.traversed().iter().copied().collect();
        assert_eq!(bodies.traversed().dropped(), 0);
        for edge in 0..4u32 {
            let mut keys: Vec<u32> = pairs
                .iter()
                .filter(|p| p.edge == edge)
                .map(|p| p.chunk_key)
                .collect();
            let a = bodies.vertices()[edge as usize].position();
            let b = bodies.vertices()[edge as usize + 1].position();
            assert!(keys.contains(&grid.key_for(a)));
            assert!(keys.contains(&grid.key_for(b)));
            let total = keys.len();
            keys.sort_unstable();
            keys.dedup();
            assert_eq!(keys.len(), total, "edge {edge} has duplicate chunks");
        }
        assert!(pairs.iter().all(|p| p.edge < 4));

        let size = bodies.traversed_dispatch_size(&mut dispatcher, 0.5);
        assert_eq!(size, (pairs.len() as f32 * 1.5).ceil() as usize);
        assert_eq!(bodies.traversed_dispatch_size(&mut dispatcher, 0.5), size);
        assert_eq!(dispatcher.sync_points(), 1);
    }

    #[test]
    fn stationary_body_never_moves() {
        let config = SimConfig::default();
        let grid = config.grid();
        let (body, vertices) = square_body(Vec2::new(50.0, 50.0), 5.0, true);
        let mut bodies = RigidBodies::new(&config, &grid, vec![body], vertices);
        let mut dispatcher = Dispatcher::new();
        for _ in 0..10 {
            bodies.apply_local_angular_rotation(&mut dispatcher, &config);
            bodies.clear_impulses();
            bodies.rb_forces(&mut dispatcher, &config, 0.01);
        }
        assert_eq!(bodies.bodies()[0], body);
    }

    #[test]
    fn free_body_falls_and_stops_at_the_floor() {
        let config = SimConfig::default();
        let grid = config.grid();
        let (body, vertices) = square_body(Vec2::new(50.0, 12.0), 5.0, false);
        let mut bodies = RigidBodies::new(&config, &grid, vec![body], vertices);
        let mut dispatcher = Dispatcher::new();
        for _ in 0..2000 {
            bodies.apply_local_angular_rotation(&mut dispatcher, &config);
            bodies.clear_impulses();
            bodies.rb_forces(&mut dispatcher, &config, 0.01);
        }
        let y = bodies.bodies()[0].position().y;
        // Bottom edge rests near the padded floor.
        assert!(y > config.border_padding + 4.0 && y < config.border_padding + 6.5, "y = {y}");
    }
}
