//! Sequential-impulse contact solver.
//!
//! The solver works on flat, island-local arrays: one [`VelocityState`] per
//! island body and one [`ContactConstraintState`] per colliding box pair.
//! Body indices inside a constraint state refer to the velocity array.
//!
//! A step runs in four phases:
//!
//! 1. [`ContactSolver::initialize`] borrows the arrays.
//! 2. [`ContactSolver::pre_solve`] computes effective masses and velocity
//!    bias (Baumgarte plus restitution) and applies warm-start impulses.
//! 3. [`ContactSolver::solve`] runs once per iteration: friction first,
//!    clamped to `friction * normal impulse`, then the non-negative normal
//!    impulse.
//! 4. [`ContactSolver::shut_down`] stores accumulated impulses back into the
//!    persistent manifolds for the next step.

use nalgebra::{Matrix3, Point3, Vector3};
use sim_types::SolverConfig;
use smallvec::SmallVec;

use crate::manifold::{FeaturePair, MAX_CONTACTS, Manifold};

/// Linear and angular velocity of one island body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VelocityState {
    /// Linear velocity of the center of mass.
    pub v: Vector3<f64>,
    /// Angular velocity.
    pub w: Vector3<f64>,
}

/// Mass properties of one side of a constraint, captured at step start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverBody {
    /// World center of mass.
    pub center: Point3<f64>,
    /// Inverse mass; zero for static and kinematic bodies.
    pub inv_mass: f64,
    /// Inverse inertia tensor in world space.
    pub inv_inertia: Matrix3<f64>,
    /// Index into the island velocity array.
    pub index: usize,
}

/// Per-point solver scratch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactState {
    /// Contact point relative to A's center of mass.
    pub ra: Vector3<f64>,
    /// Contact point relative to B's center of mass.
    pub rb: Vector3<f64>,
    /// Signed penetration depth.
    pub penetration: f64,
    /// Accumulated normal impulse.
    pub normal_impulse: f64,
    /// Accumulated tangent impulses.
    pub tangent_impulse: [f64; 2],
    /// Velocity bias from position error and restitution.
    pub bias: f64,
    /// Effective mass along the normal.
    pub normal_mass: f64,
    /// Effective masses along the tangents.
    pub tangent_mass: [f64; 2],
    /// Feature pair of the manifold point this state came from.
    pub feature: FeaturePair,
}

/// Solver view of one contact constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactConstraintState {
    /// Per-point state.
    pub contacts: SmallVec<[ContactState; MAX_CONTACTS]>,
    /// Contact normal from A to B.
    pub normal: Vector3<f64>,
    /// Friction directions.
    pub tangents: [Vector3<f64>; 2],
    /// Inverse mass of A.
    pub m_a: f64,
    /// Inverse mass of B.
    pub m_b: f64,
    /// World inverse inertia of A.
    pub i_a: Matrix3<f64>,
    /// World inverse inertia of B.
    pub i_b: Matrix3<f64>,
    /// Mixed restitution.
    pub restitution: f64,
    /// Mixed friction.
    pub friction: f64,
    /// Velocity index of A.
    pub index_a: usize,
    /// Velocity index of B.
    pub index_b: usize,
}

impl ContactConstraintState {
    /// Capture a manifold and both bodies' mass properties.
    #[must_use]
    pub fn new(
        manifold: &Manifold,
        a: &SolverBody,
        b: &SolverBody,
        friction: f64,
        restitution: f64,
    ) -> Self {
        let contacts = manifold
            .contacts
            .iter()
            .map(|c| ContactState {
                ra: c.position - a.center,
                rb: c.position - b.center,
                penetration: c.penetration,
                normal_impulse: c.normal_impulse,
                tangent_impulse: c.tangent_impulse,
                bias: 0.0,
                normal_mass: 0.0,
                tangent_mass: [0.0; 2],
                feature: c.feature,
            })
            .collect();

        Self {
            contacts,
            normal: manifold.normal,
            tangents: manifold.tangents,
            m_a: a.inv_mass,
            m_b: b.inv_mass,
            i_a: a.inv_inertia,
            i_b: b.inv_inertia,
            restitution,
            friction,
            index_a: a.index,
            index_b: b.index,
        }
    }

    /// Write accumulated impulses back into the manifold the state came from.
    ///
    /// Points are paired by feature key so the write-back does not depend on
    /// point order.
    pub fn store_impulses(&self, manifold: &mut Manifold) {
        for cs in &self.contacts {
            if let Some(c) = manifold
                .contacts
                .iter_mut()
                .find(|c| c.feature.key() == cs.feature.key())
            {
                c.normal_impulse = cs.normal_impulse;
                c.tangent_impulse = cs.tangent_impulse;
            }
        }
    }
}

/// `1 / x`, or zero when `x` is zero.
#[must_use]
pub fn invert_or_zero(x: f64) -> f64 {
    if x == 0.0 { 0.0 } else { 1.0 / x }
}

/// The sequential-impulse solver for one island.
///
/// # Example
///
/// ```
/// use sim_contact::{
///     Contact, ContactConstraintState, ContactSolver, FeaturePair, Manifold, SolverBody,
///     VelocityState,
/// };
/// use sim_types::SolverConfig;
/// use nalgebra::{Matrix3, Point3, Vector3};
///
/// // A unit-mass body falling onto immovable ground at 2 m/s
/// let ground = SolverBody {
///     center: Point3::new(0.0, 0.0, -0.5),
///     inv_mass: 0.0,
///     inv_inertia: Matrix3::zeros(),
///     index: 0,
/// };
/// let falling = SolverBody {
///     center: Point3::new(0.0, 0.0, 0.5),
///     inv_mass: 1.0,
///     inv_inertia: Matrix3::zeros(),
///     index: 1,
/// };
///
/// let mut manifold = Manifold::new(false);
/// manifold.normal = Vector3::z();
/// manifold.update_tangents();
/// manifold.contacts.push(Contact::new(Point3::origin(), 0.0, FeaturePair::default()));
///
/// let mut contacts = vec![ContactConstraintState::new(&manifold, &ground, &falling, 0.5, 0.0)];
/// let mut velocities = vec![
///     VelocityState::default(),
///     VelocityState { v: Vector3::new(0.0, 0.0, -2.0), w: Vector3::zeros() },
/// ];
///
/// let mut solver = ContactSolver::initialize(SolverConfig::default(), true, &mut contacts, &mut velocities);
/// solver.pre_solve(1.0 / 60.0);
/// for _ in 0..10 {
///     solver.solve();
/// }
/// solver.shut_down(std::iter::once(&mut manifold));
///
/// assert!(velocities[1].v.z.abs() < 1e-9);
/// assert!(manifold.contacts[0].normal_impulse > 0.0);
/// ```
#[derive(Debug)]
pub struct ContactSolver<'a> {
    config: SolverConfig,
    enable_friction: bool,
    contacts: &'a mut [ContactConstraintState],
    velocities: &'a mut [VelocityState],
}

impl<'a> ContactSolver<'a> {
    /// Borrow the island's constraint and velocity arrays.
    pub fn initialize(
        config: SolverConfig,
        enable_friction: bool,
        contacts: &'a mut [ContactConstraintState],
        velocities: &'a mut [VelocityState],
    ) -> Self {
        Self {
            config,
            enable_friction,
            contacts,
            velocities,
        }
    }

    /// Number of constraints in the island.
    #[must_use]
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Precompute effective masses and bias, then apply warm-start impulses.
    pub fn pre_solve(&mut self, dt: f64) {
        let inv_dt = invert_or_zero(dt);
        let baumgarte = self.config.baumgarte;
        let slop = self.config.penetration_slop;
        let threshold = self.config.restitution_threshold;

        for cs in self.contacts.iter_mut() {
            let mut va = self.velocities[cs.index_a].v;
            let mut wa = self.velocities[cs.index_a].w;
            let mut vb = self.velocities[cs.index_b].v;
            let mut wb = self.velocities[cs.index_b].w;

            for c in &mut cs.contacts {
                // Effective masses: 1 / (J M^-1 J^T)
                let ra_cn = c.ra.cross(&cs.normal);
                let rb_cn = c.rb.cross(&cs.normal);
                let linear = cs.m_a + cs.m_b;
                let nm = linear + ra_cn.dot(&(cs.i_a * ra_cn)) + rb_cn.dot(&(cs.i_b * rb_cn));
                c.normal_mass = invert_or_zero(nm);

                for (i, tangent) in cs.tangents.iter().enumerate() {
                    let ra_ct = tangent.cross(&c.ra);
                    let rb_ct = tangent.cross(&c.rb);
                    let tm = linear + ra_ct.dot(&(cs.i_a * ra_ct)) + rb_ct.dot(&(cs.i_b * rb_ct));
                    c.tangent_mass[i] = invert_or_zero(tm);
                }

                c.bias = -baumgarte * inv_dt * (c.penetration + slop).min(0.0);

                let mut p = cs.normal * c.normal_impulse;
                if self.enable_friction {
                    p += cs.tangents[0] * c.tangent_impulse[0];
                    p += cs.tangents[1] * c.tangent_impulse[1];
                }
                va -= p * cs.m_a;
                wa -= cs.i_a * c.ra.cross(&p);
                vb += p * cs.m_b;
                wb += cs.i_b * c.rb.cross(&p);

                let dv = (vb + wb.cross(&c.rb) - va - wa.cross(&c.ra)).dot(&cs.normal);
                if dv < -threshold {
                    c.bias += -cs.restitution * dv;
                }
            }

            self.velocities[cs.index_a] = VelocityState { v: va, w: wa };
            self.velocities[cs.index_b] = VelocityState { v: vb, w: wb };
        }
    }

    /// Run one Gauss-Seidel pass over every contact point.
    pub fn solve(&mut self) {
        for cs in self.contacts.iter_mut() {
            let mut va = self.velocities[cs.index_a].v;
            let mut wa = self.velocities[cs.index_a].w;
            let mut vb = self.velocities[cs.index_b].v;
            let mut wb = self.velocities[cs.index_b].w;

            for c in &mut cs.contacts {
                if self.enable_friction {
                    for i in 0..2 {
                        let tangent = cs.tangents[i];
                        let dv = vb + wb.cross(&c.rb) - va - wa.cross(&c.ra);
                        let lambda = -dv.dot(&tangent) * c.tangent_mass[i];

                        let max_lambda = cs.friction * c.normal_impulse;
                        let old = c.tangent_impulse[i];
                        c.tangent_impulse[i] = (old + lambda).clamp(-max_lambda, max_lambda);
                        let lambda = c.tangent_impulse[i] - old;

                        let impulse = tangent * lambda;
                        va -= impulse * cs.m_a;
                        wa -= cs.i_a * c.ra.cross(&impulse);
                        vb += impulse * cs.m_b;
                        wb += cs.i_b * c.rb.cross(&impulse);
                    }
                }

                let dv = vb + wb.cross(&c.rb) - va - wa.cross(&c.ra);
                let vn = dv.dot(&cs.normal);
                let lambda = c.normal_mass * (-vn + c.bias);

                let old = c.normal_impulse;
                c.normal_impulse = (old + lambda).max(0.0);
                let lambda = c.normal_impulse - old;

                let impulse = cs.normal * lambda;
                va -= impulse * cs.m_a;
                wa -= cs.i_a * c.ra.cross(&impulse);
                vb += impulse * cs.m_b;
                wb += cs.i_b * c.rb.cross(&impulse);
            }

            self.velocities[cs.index_a] = VelocityState { v: va, w: wa };
            self.velocities[cs.index_b] = VelocityState { v: vb, w: wb };
        }
    }

    /// Store accumulated impulses into the manifolds, in constraint order.
    pub fn shut_down<'m>(&self, manifolds: impl IntoIterator<Item = &'m mut Manifold>) {
        for (cs, manifold) in self.contacts.iter().zip(manifolds) {
            cs.store_impulses(manifold);
        }
    }
}
