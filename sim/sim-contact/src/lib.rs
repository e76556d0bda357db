//! Contact manifolds and the sequential-impulse contact solver.
//!
//! This crate holds the contact-level math of the box engine, independent of
//! how bodies and shapes are stored:
//!
//! - [`Manifold`], [`Contact`], [`FeaturePair`] - Narrow-phase output with
//!   persistent per-point impulses
//! - [`compute_basis`] - Tangent directions for friction
//! - [`ContactSolver`] - Sequential impulses with warm starting, Baumgarte
//!   stabilization, restitution and a decoupled friction pyramid
//!
//! # Solver Model
//!
//! Each contact point solves three velocity constraints: one along the
//! normal and two along the tangents. The normal impulse is clamped to be
//! non-negative (contacts only push):
//!
//! ```text
//! λ_n = max(λ_n + m_n (-v_n + bias), 0)
//! ```
//!
//! The friction impulses are clamped independently to the current normal
//! impulse scaled by the mixed friction coefficient `μ`:
//!
//! ```text
//! |λ_t| ≤ μ λ_n
//! ```
//!
//! The bias term combines position correction and restitution:
//!
//! ```text
//! bias = -β / dt · min(0, d + slop)  -  e · v_n   (when v_n < -threshold)
//! ```
//!
//! # Example
//!
//! ```
//! use sim_contact::{Contact, FeaturePair, Manifold};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut manifold = Manifold::new(false);
//! manifold.normal = Vector3::z();
//! manifold.update_tangents();
//! manifold.contacts.push(Contact::new(Point3::origin(), -0.01, FeaturePair::edge(6)));
//!
//! assert_eq!(manifold.len(), 1);
//! assert!(manifold.tangents[0].dot(&manifold.normal).abs() < 1e-12);
//! ```
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**. It can be used in:
//!
//! - Headless simulation loops
//! - Custom engines with their own shape storage
//! - Analysis tools

#![doc(html_root_url = "https://docs.rs/sim-contact/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::cast_possible_truncation,
    clippy::many_single_char_names
)]

mod manifold;
mod solver;

pub use manifold::{Contact, FeaturePair, MAX_CONTACTS, Manifold, compute_basis};
pub use solver::{
    ContactConstraintState, ContactSolver, ContactState, SolverBody, VelocityState,
    invert_or_zero,
};
