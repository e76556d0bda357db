//! Islands: connected groups of bodies solved together.
//!
//! The contact graph has bodies as nodes and touching, non-sensor contacts
//! as edges. [`build_islands`] splits it into connected components with an
//! iterative depth-first search seeded from every awake, non-static body.
//! Static bodies are added to each island they touch so the solver sees
//! their infinite mass, but the search never walks through them, so two
//! stacks resting on the same ground remain two islands.
//!
//! Solving runs in three phases. [`IslandState::gather`] copies the body
//! and contact data an island needs into flat arrays, [`IslandState::solve`]
//! advances those arrays by one step without touching the scene, and
//! [`IslandState::scatter`] writes the results back. Because the middle
//! phase is a pure function of the island, islands can be solved in
//! parallel.

use hashbrown::HashMap;
use nalgebra::{Matrix3, Point3, Quaternion, UnitQuaternion, Vector3};
use sim_contact::{ContactConstraintState, ContactSolver, Manifold, SolverBody, VelocityState};
use sim_types::{BodyKind, SimError, SleepConfig, SolverConfig};
use smallvec::SmallVec;

use crate::alloc::{PagedPool, StackArena};
use crate::body::{Body, ContactEdge};
use crate::contact::ContactManager;
use crate::handle::{BodyHandle, ContactHandle};

/// A connected group of bodies and the contacts joining them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Island {
    pub(crate) bodies: Vec<BodyHandle>,
    pub(crate) contacts: Vec<ContactHandle>,
}

impl Island {
    /// Member bodies, static ones included.
    #[must_use]
    pub fn bodies(&self) -> &[BodyHandle] {
        &self.bodies
    }

    /// Contacts solved with the island.
    #[must_use]
    pub fn contacts(&self) -> &[ContactHandle] {
        &self.contacts
    }

    /// Whether `body` belongs to the island.
    #[must_use]
    pub fn contains(&self, body: BodyHandle) -> bool {
        self.bodies.contains(&body)
    }
}

/// Step scratch reused by island building and solving.
#[derive(Debug, Clone, Default)]
pub(crate) struct IslandScratch {
    pub(crate) stack: StackArena<BodyHandle>,
    pub(crate) seeds: Vec<BodyHandle>,
    pub(crate) states: Vec<IslandState>,
}

/// Partition awake bodies into islands.
///
/// Every member is woken. Contacts that join the island are flagged so each
/// is solved once; statics are unflagged again after each island so they
/// can join the next one.
///
/// # Errors
///
/// Returns [`SimError::IslandCapacityExceeded`] if an island would hold
/// more than `capacity` bodies.
pub(crate) fn build_islands(
    bodies: &mut PagedPool<Body>,
    contacts: &mut ContactManager,
    stack: &mut StackArena<BodyHandle>,
    seeds: &mut Vec<BodyHandle>,
    capacity: usize,
) -> sim_types::Result<Vec<Island>> {
    for (_, body) in bodies.iter_mut() {
        body.island = false;
    }

    seeds.clear();
    seeds.extend(bodies.keys().map(BodyHandle));
    let mut islands = Vec::new();

    for &seed in seeds.iter() {
        let Some(body) = bodies.get_mut(seed.0) else {
            continue;
        };
        if body.island || !body.awake || body.is_static() {
            continue;
        }
        body.island = true;

        let mut island = Island::default();
        let mut scope = stack.scope();
        scope.push(seed);

        while let Some(handle) = scope.pop() {
            let Some(body) = bodies.get_mut(handle.0) else {
                continue;
            };
            island.bodies.push(handle);
            body.set_to_awake();

            if body.is_static() {
                continue;
            }

            let edges: SmallVec<[ContactEdge; 16]> = body.edges.iter().copied().collect();
            for edge in edges {
                let Some(contact) = contacts.get_mut(edge.contact) else {
                    continue;
                };
                if contact.island || !contact.colliding || contact.is_sensor() {
                    continue;
                }
                contact.island = true;
                island.contacts.push(edge.contact);

                let Some(other) = bodies.get_mut(edge.other.0) else {
                    continue;
                };
                if other.island {
                    continue;
                }
                let pending = island.bodies.len() + scope.len();
                if pending >= capacity {
                    return Err(SimError::IslandCapacityExceeded {
                        required: pending + 1,
                        limit: capacity,
                    });
                }
                other.island = true;
                scope.push(edge.other);
            }
        }

        for &handle in &island.bodies {
            if let Some(body) = bodies.get_mut(handle.0).filter(|b| b.is_static()) {
                body.island = false;
            }
        }
        islands.push(island);
    }

    Ok(islands)
}

/// Step-wide values every island reads.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StepParams {
    pub dt: f64,
    pub gravity: Vector3<f64>,
    pub iterations: usize,
    pub solver: SolverConfig,
    pub enable_friction: bool,
    pub allow_sleep: bool,
    pub sleep: SleepConfig,
}

/// Per-body snapshot used while an island is solved.
#[derive(Debug, Clone)]
struct IslandBody {
    handle: BodyHandle,
    kind: BodyKind,
    allow_sleep: bool,
    linear_velocity: Vector3<f64>,
    angular_velocity: Vector3<f64>,
    force: Vector3<f64>,
    torque: Vector3<f64>,
    inv_mass: f64,
    inv_inertia_world: Matrix3<f64>,
    gravity_scale: f64,
    linear_damping: f64,
    angular_damping: f64,
    world_center: Point3<f64>,
    q: UnitQuaternion<f64>,
    sleep_time: f64,
}

/// Flat, self-contained solver input and output for one island.
///
/// States are kept by the scene and refilled every step, so the buffers
/// only grow to the largest island seen.
#[derive(Debug, Clone, Default)]
pub(crate) struct IslandState {
    island: Island,
    bodies: Vec<IslandBody>,
    index: HashMap<BodyHandle, usize>,
    velocities: Vec<VelocityState>,
    constraints: Vec<ContactConstraintState>,
    manifolds: Vec<(ContactHandle, Manifold)>,
    asleep: bool,
}

fn solver_body(index: &HashMap<BodyHandle, usize>, members: &[IslandBody], handle: BodyHandle) -> Option<SolverBody> {
    let i = *index.get(&handle)?;
    let member = members.get(i)?;
    Some(SolverBody {
        center: member.world_center,
        inv_mass: member.inv_mass,
        inv_inertia: member.inv_inertia_world,
        index: i,
    })
}

impl IslandState {
    /// Copy everything `island` needs out of the scene, reusing this
    /// state's buffers.
    pub(crate) fn gather(&mut self, island: Island, bodies: &PagedPool<Body>, contacts: &ContactManager) {
        self.bodies.clear();
        self.index.clear();
        self.constraints.clear();
        self.manifolds.clear();
        self.asleep = false;

        for &handle in &island.bodies {
            let Some(b) = bodies.get(handle.0) else {
                continue;
            };
            // Statics may sit in several islands, so indices are island-local
            self.index.insert(handle, self.bodies.len());
            self.bodies.push(IslandBody {
                handle,
                kind: b.kind,
                allow_sleep: b.allow_sleep,
                linear_velocity: b.linear_velocity,
                angular_velocity: b.angular_velocity,
                force: b.force,
                torque: b.torque,
                inv_mass: b.inv_mass,
                inv_inertia_world: b.inv_inertia_world,
                gravity_scale: b.gravity_scale,
                linear_damping: b.linear_damping,
                angular_damping: b.angular_damping,
                world_center: b.world_center,
                q: b.q,
                sleep_time: b.sleep_time,
            });
        }

        for &handle in &island.contacts {
            let Some(c) = contacts.get(handle) else {
                continue;
            };
            let a = solver_body(&self.index, &self.bodies, c.body_a);
            let b = solver_body(&self.index, &self.bodies, c.body_b);
            let (Some(a), Some(b)) = (a, b) else {
                continue;
            };
            self.constraints.push(ContactConstraintState::new(
                &c.manifold,
                &a,
                &b,
                c.friction,
                c.restitution,
            ));
            self.manifolds.push((handle, c.manifold.clone()));
        }

        self.velocities.clear();
        self.velocities.resize(self.bodies.len(), VelocityState::default());
        self.island = island;
    }

    /// Advance the island by one step: integrate velocities, solve contacts,
    /// integrate positions and decide whether the island sleeps.
    pub(crate) fn solve(&mut self, params: &StepParams) {
        let dt = params.dt;

        for (body, state) in self.bodies.iter_mut().zip(self.velocities.iter_mut()) {
            if body.kind == BodyKind::Dynamic {
                // Gravity acts as an acceleration; forces are already mass-scaled
                body.linear_velocity += (params.gravity * body.gravity_scale + body.force * body.inv_mass) * dt;
                body.angular_velocity += body.inv_inertia_world * body.torque * dt;

                body.linear_velocity *= 1.0 / (1.0 + dt * body.linear_damping);
                body.angular_velocity *= 1.0 / (1.0 + dt * body.angular_damping);
            }
            *state = VelocityState {
                v: body.linear_velocity,
                w: body.angular_velocity,
            };
        }

        let mut solver = ContactSolver::initialize(
            params.solver,
            params.enable_friction,
            &mut self.constraints,
            &mut self.velocities,
        );
        solver.pre_solve(dt);
        for _ in 0..params.iterations {
            solver.solve();
        }
        solver.shut_down(self.manifolds.iter_mut().map(|(_, m)| m));

        for (body, state) in self.bodies.iter_mut().zip(&self.velocities) {
            if body.kind == BodyKind::Static {
                continue;
            }
            body.linear_velocity = state.v;
            body.angular_velocity = state.w;
            body.world_center += body.linear_velocity * dt;
            body.q = integrate_rotation(&body.q, &body.angular_velocity, dt);
        }

        if params.allow_sleep {
            self.asleep = self.update_sleep(dt, &params.sleep);
        }
    }

    fn update_sleep(&mut self, dt: f64, sleep: &SleepConfig) -> bool {
        let mut min_sleep_time = f64::MAX;
        for body in &mut self.bodies {
            if body.kind == BodyKind::Static {
                continue;
            }
            let moving = body.linear_velocity.norm_squared() > sleep.linear_tolerance
                || body.angular_velocity.norm_squared() > sleep.angular_tolerance;
            if moving || !body.allow_sleep {
                body.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                body.sleep_time += dt;
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }
        }
        min_sleep_time > sleep.time_to_sleep
    }

    /// Write the solved state back into the scene. Returns the island and
    /// whether it fell asleep.
    pub(crate) fn scatter(&mut self, bodies: &mut PagedPool<Body>, contacts: &mut ContactManager) -> (Island, bool) {
        for solved in &self.bodies {
            let Some(body) = bodies.get_mut(solved.handle.0) else {
                continue;
            };
            body.sleep_time = solved.sleep_time;
            if solved.kind != BodyKind::Static {
                body.linear_velocity = solved.linear_velocity;
                body.angular_velocity = solved.angular_velocity;
                body.world_center = solved.world_center;
                body.q = solved.q;
                body.sync_transform();
                body.update_world_inertia();
            }
            // Statics sleep too, so their contacts with sleeping bodies skip
            // the narrow phase until something wakes the island
            if self.asleep {
                body.set_to_sleep();
            }
        }

        for (handle, manifold) in self.manifolds.drain(..) {
            if let Some(c) = contacts.get_mut(handle) {
                c.manifold = manifold;
            }
        }
        (std::mem::take(&mut self.island), self.asleep)
    }

    /// Number of contact constraints in the island.
    pub(crate) fn constraint_count(&self) -> usize {
        self.constraints.len()
    }
}

/// Advance an orientation by angular velocity `w` over `dt`:
/// `q' = normalize(q + 0.5 * (0, w dt) * q)`.
#[must_use]
pub fn integrate_rotation(q: &UnitQuaternion<f64>, w: &Vector3<f64>, dt: f64) -> UnitQuaternion<f64> {
    let q = q.into_inner();
    let spin = Quaternion::from_parts(0.0, w * dt) * q * 0.5;
    UnitQuaternion::new_normalize(q + spin)
}
