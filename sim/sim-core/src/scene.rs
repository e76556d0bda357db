//! The scene: owner of every body, box and contact, and the step loop.
//!
//! One call to [`Scene::step`] advances the simulation by a fixed timestep:
//!
//! 1. Refresh broad-phase pairs if boxes were added since the last step
//! 2. Re-run the narrow phase on every live contact
//! 3. Partition awake bodies into islands over the contact graph
//! 4. Solve each island: gravity and forces, contact impulses, position
//!    integration and the sleep test
//! 5. Move broad-phase proxies of every non-static body
//! 6. Create contacts for newly overlapping proxies
//! 7. Clear accumulated forces
//!
//! # Example
//!
//! ```
//! use sim_core::Scene;
//! use sim_types::{BodyDef, BoxDef, SceneConfig, Transform};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut scene = Scene::new(SceneConfig::default()).unwrap();
//!
//! let ground = scene.create_body(&BodyDef::fixed()).unwrap();
//! scene
//!     .add_box(ground, &BoxDef::new(Transform::identity(), Vector3::new(10.0, 10.0, 0.5)))
//!     .unwrap();
//!
//! let crate_ = scene
//!     .create_body(&BodyDef::dynamic().with_position(Point3::new(0.0, 0.0, 3.0)))
//!     .unwrap();
//! scene
//!     .add_box(crate_, &BoxDef::new(Transform::identity(), Vector3::repeat(0.5)))
//!     .unwrap();
//!
//! for _ in 0..240 {
//!     scene.step().unwrap();
//! }
//!
//! // Resting on the ground, within the penetration slop
//! let z = scene.body(crate_).unwrap().position().z;
//! assert!(z > 0.9 && z < 1.1);
//! ```

use nalgebra::{Point3, Vector3};
use sim_types::{BodyDef, BoxDef, MaterialMixing, SceneConfig, SimError, Transform, axis_angle_quaternion};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::alloc::{Heap, PagedPool};
use crate::body::Body;
use crate::contact::{ContactConstraint, ContactManager};
use crate::handle::{BodyHandle, BoxHandle, ContactHandle};
use crate::island::{Island, IslandScratch, IslandState, StepParams, build_islands};
use crate::shape::BoxShape;

/// Counters from one call to [`Scene::step`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Contacts re-tested by the narrow phase.
    pub contacts_tested: usize,
    /// Contacts alive after the step.
    pub contacts: usize,
    /// Islands solved.
    pub islands: usize,
    /// Islands that fell asleep this step.
    pub islands_slept: usize,
    /// Bodies in solved islands, statics counted once per island.
    pub island_bodies: usize,
    /// Contact constraints handed to the solver.
    pub constraints_solved: usize,
}

/// A physics scene of box-shaped rigid bodies.
#[derive(Debug, Clone)]
pub struct Scene {
    config: SceneConfig,
    pub(crate) bodies: PagedPool<Body>,
    pub(crate) boxes: PagedPool<BoxShape>,
    pub(crate) contacts: ContactManager,
    heap: Heap,
    island_scratch: IslandScratch,
    islands: Vec<Island>,
    new_box: bool,
    time: f64,
    step_count: u64,
}

impl Scene {
    /// Create an empty scene.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: SceneConfig) -> sim_types::Result<Self> {
        config.validate()?;
        if config.iterations < 1 {
            warn!(iterations = config.iterations, "solver iterations clamped to 1");
        }
        Ok(Self {
            contacts: ContactManager::new(config.aabb_margin, config.contacts_per_page, config.mixing),
            heap: Heap::new(config.heap_bytes),
            bodies: PagedPool::new(),
            boxes: PagedPool::new(),
            island_scratch: IslandScratch::default(),
            islands: Vec::new(),
            new_box: false,
            time: 0.0,
            step_count: 0,
            config,
        })
    }

    /// The scene configuration.
    #[must_use]
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Simulated time in seconds.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Steps taken so far.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// The fixed timestep used by [`Scene::step`].
    #[must_use]
    pub fn timestep(&self) -> f64 {
        self.config.timestep
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Gravity acceleration.
    #[must_use]
    pub fn gravity(&self) -> Vector3<f64> {
        self.config.gravity
    }

    /// Set gravity acceleration.
    pub fn set_gravity(&mut self, gravity: Vector3<f64>) {
        self.config.gravity = gravity;
    }

    /// Set solver iterations per step; values below 1 become 1.
    pub fn set_iterations(&mut self, iterations: usize) {
        if iterations < 1 {
            warn!(iterations, "solver iterations clamped to 1");
        }
        self.config.iterations = iterations.max(1);
    }

    /// Allow or forbid sleeping. Forbidding it wakes every body.
    pub fn set_allow_sleep(&mut self, allow: bool) {
        self.config.allow_sleep = allow;
        if !allow {
            for (_, body) in self.bodies.iter_mut() {
                body.set_to_awake();
            }
        }
    }

    /// Enable or disable friction impulses.
    pub fn set_enable_friction(&mut self, enable: bool) {
        self.config.enable_friction = enable;
    }

    /// Change how materials combine. Applies to contacts created afterwards.
    pub fn set_mixing(&mut self, mixing: MaterialMixing) {
        self.config.mixing = mixing;
        self.contacts.set_mixing(mixing);
    }

    // =========================================================================
    // Bodies
    // =========================================================================

    /// Create a body with no boxes.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::OutOfMemory`] if the scene heap is exhausted.
    pub fn create_body(&mut self, def: &BodyDef) -> sim_types::Result<BodyHandle> {
        let block = self.charge(std::mem::size_of::<Body>())?;
        let mut body = Body::new(def);
        body.heap_block = Some(block);
        let handle = BodyHandle(self.bodies.insert(body));
        debug!(body = %handle, kind = def.kind.name(), "body created");
        Ok(handle)
    }

    /// Remove a body with its boxes and contacts.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBody`] for a stale handle.
    pub fn remove_body(&mut self, handle: BodyHandle) -> sim_types::Result<()> {
        if !self.bodies.contains(handle.0) {
            return Err(SimError::InvalidBody(handle.to_string()));
        }
        self.contacts.remove_contacts_from_body(handle, &mut self.bodies);

        let shapes: SmallVec<[BoxHandle; 4]> = self
            .bodies
            .get(handle.0)
            .map(|b| b.boxes.clone())
            .unwrap_or_default();
        for shape in shapes {
            self.release_box(shape);
        }

        if let Some(body) = self.bodies.remove(handle.0) {
            if let Some(block) = body.heap_block {
                self.heap.free(block);
            }
        }
        debug!(body = %handle, "body removed");
        Ok(())
    }

    /// Remove every body.
    ///
    /// # Errors
    ///
    /// Propagates the first failure from [`Scene::remove_body`].
    pub fn remove_all_bodies(&mut self) -> sim_types::Result<()> {
        let handles: Vec<BodyHandle> = self.bodies.keys().map(BodyHandle).collect();
        for handle in handles {
            self.remove_body(handle)?;
        }
        self.islands.clear();
        Ok(())
    }

    /// Look up a body.
    #[must_use]
    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle.0)
    }

    /// Look up a body mutably, to apply forces or change velocities.
    #[must_use]
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle.0)
    }

    /// Iterate over all bodies.
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter().map(|(k, b)| (BodyHandle(k), b))
    }

    /// Number of bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Teleport a body. `position` places the body origin; `rotation` is an
    /// optional `(axis, angle)`. The body is woken and its proxies moved.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBody`] for a stale handle.
    pub fn set_transform(
        &mut self,
        handle: BodyHandle,
        position: Point3<f64>,
        rotation: Option<(Vector3<f64>, f64)>,
    ) -> sim_types::Result<()> {
        let body = self
            .bodies
            .get_mut(handle.0)
            .ok_or_else(|| SimError::InvalidBody(handle.to_string()))?;

        if let Some((axis, angle)) = rotation {
            body.q = axis_angle_quaternion(axis, angle);
        }
        body.tx = Transform::from_quaternion(position, &body.q);
        body.world_center = body.tx.transform_point(&body.local_center);
        body.update_world_inertia();
        body.set_to_awake();

        self.synchronize_proxies(handle);
        Ok(())
    }

    fn synchronize_proxies(&mut self, handle: BodyHandle) {
        let Some(body) = self.bodies.get(handle.0) else {
            return;
        };
        for shape_handle in &body.boxes {
            let Some(shape) = self.boxes.get(shape_handle.0) else {
                continue;
            };
            if let Some(proxy) = shape.proxy {
                self.contacts.broad_phase.update(proxy, shape.compute_aabb(&body.tx));
            }
        }
    }

    fn update_mass(&mut self, handle: BodyHandle) {
        let Some(body) = self.bodies.get_mut(handle.0) else {
            return;
        };
        let shapes = body.boxes.clone();
        body.set_mass_data(shapes.iter().filter_map(|h| self.boxes.get(h.0)));
    }

    // =========================================================================
    // Boxes
    // =========================================================================

    /// Attach a box to a body. The body's mass is recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBody`] for a stale handle, an
    /// [`SimError::InvalidShape`] for a bad definition, or
    /// [`SimError::OutOfMemory`] if the heap is exhausted.
    pub fn add_box(&mut self, body: BodyHandle, def: &BoxDef) -> sim_types::Result<BoxHandle> {
        def.validate()?;
        let tx = self
            .bodies
            .get(body.0)
            .map(|b| b.tx)
            .ok_or_else(|| SimError::InvalidBody(body.to_string()))?;

        let block = self.charge(std::mem::size_of::<BoxShape>())?;
        let mut shape = BoxShape::from_def(def, body);
        shape.heap_block = Some(block);
        let aabb = shape.compute_aabb(&tx);
        let handle = BoxHandle(self.boxes.insert(shape));

        let proxy = self.contacts.broad_phase.insert(aabb, handle);
        if let Some(shape) = self.boxes.get_mut(handle.0) {
            shape.proxy = Some(proxy);
        }
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.boxes.push(handle);
        }
        self.update_mass(body);
        self.new_box = true;

        debug!(body = %body, shape = %handle, "box added");
        Ok(handle)
    }

    /// Detach a box from its body. The body's mass is recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBody`] or [`SimError::InvalidBox`] for
    /// stale handles, and [`SimError::ShapeNotOwned`] if `shape` belongs to
    /// another body.
    pub fn remove_box(&mut self, body: BodyHandle, shape: BoxHandle) -> sim_types::Result<()> {
        if !self.bodies.contains(body.0) {
            return Err(SimError::InvalidBody(body.to_string()));
        }
        let owner = self
            .boxes
            .get(shape.0)
            .map(|s| s.body)
            .ok_or_else(|| SimError::InvalidBox(shape.to_string()))?;
        if owner != body {
            return Err(SimError::ShapeNotOwned {
                shape: shape.to_string(),
                body: body.to_string(),
            });
        }

        self.contacts.remove_contacts_for_box(body, shape, &mut self.bodies);
        self.release_box(shape);
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.boxes.retain(|h| *h != shape);
        }
        self.update_mass(body);

        debug!(body = %body, shape = %shape, "box removed");
        Ok(())
    }

    fn release_box(&mut self, handle: BoxHandle) {
        let Some(shape) = self.boxes.remove(handle.0) else {
            return;
        };
        if let Some(proxy) = shape.proxy {
            self.contacts.broad_phase.remove(proxy);
        }
        if let Some(block) = shape.heap_block {
            self.heap.free(block);
        }
    }

    /// Look up a box.
    #[must_use]
    pub fn shape(&self, handle: BoxHandle) -> Option<&BoxShape> {
        self.boxes.get(handle.0)
    }

    /// Look up a box mutably, to change its material or user data.
    #[must_use]
    pub fn shape_mut(&mut self, handle: BoxHandle) -> Option<&mut BoxShape> {
        self.boxes.get_mut(handle.0)
    }

    /// Iterate over all boxes.
    pub fn shapes(&self) -> impl Iterator<Item = (BoxHandle, &BoxShape)> {
        self.boxes.iter().map(|(k, s)| (BoxHandle(k), s))
    }

    /// Number of boxes.
    #[must_use]
    pub fn box_count(&self) -> usize {
        self.boxes.len()
    }

    pub(crate) fn box_with_transform(&self, handle: BoxHandle) -> Option<(&BoxShape, &Transform)> {
        let shape = self.boxes.get(handle.0)?;
        let body = self.bodies.get(shape.body.0)?;
        Some((shape, &body.tx))
    }

    fn charge(&mut self, size: usize) -> sim_types::Result<crate::alloc::HeapBlock> {
        self.heap.allocate(size).ok_or_else(|| SimError::OutOfMemory {
            requested: Heap::charge_for(size),
            available: self.heap.bytes_free(),
        })
    }

    /// The heap that budgets bodies and boxes.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    // =========================================================================
    // Contacts and islands
    // =========================================================================

    /// Look up a contact.
    #[must_use]
    pub fn contact(&self, handle: ContactHandle) -> Option<&ContactConstraint> {
        self.contacts.get(handle)
    }

    /// Iterate over all contacts, touching or not.
    pub fn contacts(&self) -> impl Iterator<Item = (ContactHandle, &ContactConstraint)> {
        self.contacts.iter()
    }

    /// Number of live contacts.
    #[must_use]
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Islands solved by the last step.
    #[must_use]
    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    // =========================================================================
    // Stepping
    // =========================================================================

    /// Advance by the configured timestep.
    ///
    /// # Errors
    ///
    /// See [`Scene::step_with_dt`].
    pub fn step(&mut self) -> sim_types::Result<StepStats> {
        self.step_with_dt(self.config.timestep)
    }

    /// Advance by `dt` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidTimestep`] for a non-positive or
    /// non-finite `dt`, [`SimError::IslandCapacityExceeded`] if an island
    /// search outgrows the configured limit, and [`SimError::Diverged`] if a
    /// body ends the step with a non-finite state.
    pub fn step_with_dt(&mut self, dt: f64) -> sim_types::Result<StepStats> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimError::InvalidTimestep(dt));
        }
        let mut stats = StepStats::default();

        if self.new_box {
            self.contacts.find_new_contacts(&mut self.bodies, &self.boxes);
            self.new_box = false;
        }

        stats.contacts_tested = self.contacts.test_collisions(&mut self.bodies, &self.boxes);

        let capacity = self.config.island_capacity.unwrap_or(self.bodies.len()).max(1);
        let scratch = &mut self.island_scratch;
        let islands = build_islands(
            &mut self.bodies,
            &mut self.contacts,
            &mut scratch.stack,
            &mut scratch.seeds,
            capacity,
        )?;

        let params = StepParams {
            dt,
            gravity: self.config.gravity,
            iterations: self.config.effective_iterations(),
            solver: self.config.solver,
            enable_friction: self.config.enable_friction,
            allow_sleep: self.config.allow_sleep,
            sleep: self.config.sleep,
        };

        let count = islands.len();
        if scratch.states.len() < count {
            scratch.states.resize_with(count, IslandState::default);
        }
        for (state, island) in scratch.states.iter_mut().zip(islands) {
            state.gather(island, &self.bodies, &self.contacts);
        }
        let states = &mut scratch.states[..count];

        #[cfg(feature = "parallel")]
        states.par_iter_mut().for_each(|state| state.solve(&params));
        #[cfg(not(feature = "parallel"))]
        for state in states.iter_mut() {
            state.solve(&params);
        }

        self.islands.clear();
        for state in states.iter_mut() {
            stats.constraints_solved += state.constraint_count();
            let (island, slept) = state.scatter(&mut self.bodies, &mut self.contacts);
            stats.island_bodies += island.bodies.len();
            if slept {
                stats.islands_slept += 1;
                debug!(bodies = island.bodies.len(), "island fell asleep");
            }
            self.islands.push(island);
        }
        stats.islands = self.islands.len();

        let moving: Vec<BodyHandle> = self
            .bodies
            .iter()
            .filter(|(_, b)| !b.is_static())
            .map(|(k, _)| BodyHandle(k))
            .collect();
        for handle in moving {
            self.synchronize_proxies(handle);
        }

        self.contacts.find_new_contacts(&mut self.bodies, &self.boxes);

        for (_, body) in self.bodies.iter_mut() {
            body.clear_forces();
        }

        self.time += dt;
        self.step_count += 1;
        stats.contacts = self.contacts.len();
        trace!(
            step = self.step_count,
            islands = stats.islands,
            contacts = stats.contacts,
            "step complete"
        );

        self.check_finite()?;
        Ok(stats)
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Check every body for non-finite state.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Diverged`] naming the first offending body.
    pub fn check_finite(&self) -> sim_types::Result<()> {
        for (handle, body) in self.bodies() {
            if !body.is_finite() {
                return Err(SimError::diverged(format!("body {handle} has non-finite state")));
            }
        }
        Ok(())
    }

    /// Sum of linear momentum over dynamic bodies.
    #[must_use]
    pub fn total_linear_momentum(&self) -> Vector3<f64> {
        self.bodies()
            .filter(|(_, b)| b.is_dynamic())
            .map(|(_, b)| b.linear_momentum())
            .sum()
    }

    /// Sum of kinetic energy over dynamic bodies.
    #[must_use]
    pub fn total_kinetic_energy(&self) -> f64 {
        self.bodies()
            .filter(|(_, b)| b.is_dynamic())
            .map(|(_, b)| b.kinetic_energy())
            .sum()
    }

    /// Number of awake, non-static bodies.
    #[must_use]
    pub fn awake_body_count(&self) -> usize {
        self.bodies().filter(|(_, b)| b.is_awake() && !b.is_static()).count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cube() -> BoxDef {
        BoxDef::new(Transform::identity(), Vector3::repeat(0.5))
    }

    fn scene() -> Scene {
        Scene::new(SceneConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SceneConfig::with_timestep(-1.0);
        assert!(Scene::new(config).is_err());
    }

    #[test]
    fn test_free_fall_matches_gravity() {
        let mut scene = scene();
        let body = scene.create_body(&BodyDef::dynamic().with_damping(0.0, 0.0)).unwrap();
        scene.add_box(body, &cube()).unwrap();

        for _ in 0..60 {
            scene.step().unwrap();
        }
        let v = scene.body(body).unwrap().linear_velocity();
        assert_relative_eq!(v.z, -9.81, epsilon = 1e-9);
        assert_relative_eq!(scene.time(), 1.0, epsilon = 1e-12);
        assert_eq!(scene.step_count(), 60);
    }

    #[test]
    fn test_gravity_scale_and_kinematic_bodies() {
        let mut scene = scene();
        let floaty = scene.create_body(&BodyDef::dynamic().with_gravity_scale(0.0)).unwrap();
        scene.add_box(floaty, &cube()).unwrap();
        let mover = scene
            .create_body(
                &BodyDef::kinematic()
                    .with_position(Point3::new(10.0, 0.0, 0.0))
                    .with_linear_velocity(Vector3::new(1.0, 0.0, 0.0)),
            )
            .unwrap();
        scene.add_box(mover, &cube()).unwrap();

        for _ in 0..30 {
            scene.step().unwrap();
        }
        assert_eq!(scene.body(floaty).unwrap().position(), Point3::origin());
        assert_relative_eq!(scene.body(mover).unwrap().position().x, 10.5, epsilon = 1e-9);
        assert_eq!(scene.body(mover).unwrap().linear_velocity(), Vector3::x());
    }

    #[test]
    fn test_remove_box_checks_owner() {
        let mut scene = scene();
        let a = scene.create_body(&BodyDef::dynamic()).unwrap();
        let b = scene.create_body(&BodyDef::dynamic()).unwrap();
        let shape = scene.add_box(a, &cube()).unwrap();

        let err = scene.remove_box(b, shape).unwrap_err();
        assert!(matches!(err, SimError::ShapeNotOwned { .. }));

        scene.remove_box(a, shape).unwrap();
        assert_eq!(scene.box_count(), 0);
        assert!(matches!(scene.remove_box(a, shape), Err(SimError::InvalidBox(_))));
    }

    #[test]
    fn test_stale_body_handle_rejected() {
        let mut scene = scene();
        let body = scene.create_body(&BodyDef::dynamic()).unwrap();
        scene.remove_body(body).unwrap();
        assert!(scene.body(body).is_none());
        assert!(matches!(scene.remove_body(body), Err(SimError::InvalidBody(_))));
        assert!(scene.add_box(body, &cube()).is_err());
    }

    #[test]
    fn test_add_box_recomputes_mass() {
        let mut scene = scene();
        let body = scene.create_body(&BodyDef::dynamic()).unwrap();
        scene.add_box(body, &cube().with_density(2.0)).unwrap();
        assert_relative_eq!(scene.body(body).unwrap().mass(), 2.0);

        let second = scene
            .add_box(body, &BoxDef::new(Transform::from_position(Point3::new(2.0, 0.0, 0.0)), Vector3::repeat(0.5)))
            .unwrap();
        let b = scene.body(body).unwrap();
        assert_relative_eq!(b.mass(), 3.0);
        assert_relative_eq!(b.local_center(), Point3::new(2.0 / 3.0, 0.0, 0.0), epsilon = 1e-12);

        scene.remove_box(body, second).unwrap();
        assert_relative_eq!(scene.body(body).unwrap().mass(), 2.0);
    }

    #[test]
    fn test_heap_exhaustion_reported() {
        let config = SceneConfig::default().heap_bytes(Heap::charge_for(std::mem::size_of::<Body>()));
        let mut scene = Scene::new(config).unwrap();
        let body = scene.create_body(&BodyDef::dynamic()).unwrap();
        let err = scene.add_box(body, &cube()).unwrap_err();
        assert!(err.is_capacity_error());

        scene.remove_body(body).unwrap();
        assert!(scene.create_body(&BodyDef::dynamic()).is_ok());
    }

    #[test]
    fn test_remove_body_cleans_up() {
        let mut scene = scene();
        let ground = scene.create_body(&BodyDef::fixed()).unwrap();
        scene.add_box(ground, &cube()).unwrap();
        let top = scene
            .create_body(&BodyDef::dynamic().with_position(Point3::new(0.0, 0.0, 0.95)))
            .unwrap();
        scene.add_box(top, &cube()).unwrap();
        scene.step().unwrap();
        assert_eq!(scene.contact_count(), 1);

        scene.remove_body(top).unwrap();
        assert_eq!(scene.contact_count(), 0);
        assert_eq!(scene.box_count(), 1);
        assert!(scene.body(ground).unwrap().contact_edges().is_empty());
        assert_eq!(scene.contacts.broad_phase.proxy_count(), 1);

        scene.remove_all_bodies().unwrap();
        assert_eq!(scene.body_count(), 0);
        assert_eq!(scene.heap().bytes_used(), 0);
    }

    #[test]
    fn test_set_transform_moves_proxies() {
        let mut scene = scene();
        let body = scene.create_body(&BodyDef::fixed()).unwrap();
        scene.add_box(body, &cube()).unwrap();
        scene
            .set_transform(body, Point3::new(5.0, 0.0, 0.0), Some((Vector3::z(), 0.3)))
            .unwrap();

        assert!(scene.query_point_any(&Point3::new(5.0, 0.0, 0.0)));
        assert!(!scene.query_point_any(&Point3::origin()));
        assert_relative_eq!(scene.body(body).unwrap().quaternion().angle(), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_disallowing_sleep_wakes_everything() {
        let mut scene = scene();
        let body = scene.create_body(&BodyDef::dynamic().asleep()).unwrap();
        scene.add_box(body, &cube()).unwrap();
        assert_eq!(scene.awake_body_count(), 0);
        scene.set_allow_sleep(false);
        assert_eq!(scene.awake_body_count(), 1);
    }

    #[test]
    fn test_iterations_clamped() {
        let mut scene = scene();
        scene.set_iterations(0);
        assert_eq!(scene.config().iterations, 1);
    }

    #[test]
    fn test_island_capacity_error() {
        let mut scene = Scene::new(SceneConfig::default().island_capacity(2)).unwrap();
        // A row of touching cubes forms a single island
        for i in 0..3 {
            let body = scene
                .create_body(&BodyDef::dynamic().with_position(Point3::new(f64::from(i) * 0.95, 0.0, 0.0)))
                .unwrap();
            scene.add_box(body, &cube()).unwrap();
        }
        let err = scene.step().unwrap_err();
        assert!(matches!(
            err,
            SimError::IslandCapacityExceeded { required: 3, limit: 2 }
        ));
    }

    #[test]
    fn test_island_scratch_reused_across_steps() {
        let mut scene = Scene::new(SceneConfig::default().zero_gravity()).unwrap();
        let bodies: Vec<_> = [0.0, 5.0, 10.0]
            .into_iter()
            .map(|x| {
                let body = scene
                    .create_body(&BodyDef::dynamic().with_position(Point3::new(x, 0.0, 0.0)).never_sleep())
                    .unwrap();
                scene.add_box(body, &cube()).unwrap();
                body
            })
            .collect();

        for _ in 0..5 {
            assert_eq!(scene.step().unwrap().islands, 3);
        }
        assert_eq!(scene.island_scratch.states.len(), 3);
        assert_eq!(scene.island_scratch.seeds.len(), 3);
        assert!(scene.island_scratch.stack.high_water_mark() >= 1);
        // The DFS scope is released at the end of every island
        assert!(scene.island_scratch.stack.is_empty());

        // Fewer islands leave the spare states in place for later steps
        scene.remove_body(bodies[0]).unwrap();
        assert_eq!(scene.step().unwrap().islands, 2);
        assert_eq!(scene.islands().len(), 2);
        assert_eq!(scene.island_scratch.states.len(), 3);
    }

    #[test]
    fn test_bad_timestep() {
        let mut scene = scene();
        assert!(matches!(scene.step_with_dt(0.0), Err(SimError::InvalidTimestep(_))));
        assert!(scene.step_with_dt(f64::NAN).is_err());
    }

    #[test]
    fn test_momentum_and_energy_track_dynamic_bodies() {
        let mut scene = Scene::new(SceneConfig::default().zero_gravity()).unwrap();
        let body = scene
            .create_body(&BodyDef::dynamic().with_linear_velocity(Vector3::new(2.0, 0.0, 0.0)))
            .unwrap();
        scene.add_box(body, &cube()).unwrap();
        let wall = scene.create_body(&BodyDef::fixed().with_position(Point3::new(0.0, 5.0, 0.0))).unwrap();
        scene.add_box(wall, &cube()).unwrap();

        assert_relative_eq!(scene.total_linear_momentum(), Vector3::new(2.0, 0.0, 0.0));
        assert_relative_eq!(scene.total_kinetic_energy(), 2.0);
    }
}
