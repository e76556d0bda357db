//! Rigid-body physics for scenes made of boxes.
//!
//! This crate provides the scene, the step loop and every stage it runs:
//! broad phase, narrow phase, island building and the contact solver. It
//! builds on [`sim_types`] for definitions and configuration and on
//! [`sim_contact`] for manifolds and the sequential-impulse solver.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Scene                              │
//! │  Owns: bodies, boxes, contacts, heap budget, settings       │
//! │  Provides: lifecycle, step, queries, dump, debug drawing    │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌──────────────────────────────┐  ┌───────────────────────────┐
//! │       Contact manager        │  │          Islands          │
//! │  Broad phase (AABB tree)     │  │  DFS over touching pairs  │
//! │  Box-box SAT + clipping      │  │  Velocity solve, sleep    │
//! └──────────────────────────────┘  └───────────────────────────┘
//! ```
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**. It can be used in:
//!
//! - Headless training loops
//! - Game loops that render through their own pipeline
//! - Analysis tools
//!
//! # Quick Start
//!
//! ```
//! use sim_core::Scene;
//! use sim_types::{BodyDef, BoxDef, SceneConfig, Transform};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut scene = Scene::new(SceneConfig::default()).unwrap();
//!
//! // A static floor and a cube dropped onto it
//! let floor = scene.create_body(&BodyDef::fixed()).unwrap();
//! scene
//!     .add_box(floor, &BoxDef::new(Transform::identity(), Vector3::new(10.0, 10.0, 0.5)))
//!     .unwrap();
//!
//! let cube = scene
//!     .create_body(&BodyDef::dynamic().with_position(Point3::new(0.0, 0.0, 5.0)))
//!     .unwrap();
//! scene
//!     .add_box(cube, &BoxDef::new(Transform::identity(), Vector3::repeat(0.5)))
//!     .unwrap();
//!
//! for _ in 0..60 {
//!     scene.step().unwrap();
//! }
//! assert!(scene.body(cube).unwrap().position().z < 5.0);
//! ```
//!
//! # Sleeping
//!
//! Islands whose bodies all stay below the sleep tolerances for
//! `time_to_sleep` seconds are put to sleep. Sleeping bodies keep their
//! contacts but are skipped by the narrow phase and the solver until a
//! velocity change, an impulse or a new touching neighbor wakes them.
//!
//! # Diagnostics
//!
//! ```
//! use sim_core::Scene;
//! use sim_types::{BodyDef, BoxDef, SceneConfig, Transform};
//! use nalgebra::Vector3;
//!
//! let mut scene = Scene::new(SceneConfig::default().zero_gravity()).unwrap();
//! let body = scene
//!     .create_body(&BodyDef::dynamic().with_linear_velocity(Vector3::new(1.0, 0.0, 0.0)))
//!     .unwrap();
//! scene
//!     .add_box(body, &BoxDef::new(Transform::identity(), Vector3::repeat(0.5)))
//!     .unwrap();
//!
//! println!("Total kinetic energy: {} J", scene.total_kinetic_energy());
//! println!("Total momentum: {:?}", scene.total_linear_momentum());
//! ```
//!
//! # Features
//!
//! - `parallel`: solve islands on the `rayon` thread pool
//! - `serde`: serialize handles and configuration

#![doc(html_root_url = "https://docs.rs/sim-core/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

mod aabb;
pub mod alloc;
mod body;
pub mod broad_phase;
mod collide;
mod contact;
mod dump;
pub mod dynamic_tree;
mod handle;
mod island;
mod query;
mod render;
mod scene;
mod shape;
mod stepper;

pub use aabb::Aabb;
pub use body::{Body, ContactEdge};
pub use broad_phase::BroadPhase;
pub use collide::box_to_box;
pub use contact::ContactConstraint;
pub use dynamic_tree::{DynamicTree, ProxyId, TreeError};
pub use handle::{BodyHandle, BoxHandle, ContactHandle};
pub use island::{Island, integrate_rotation};
pub use query::{Ray, RaycastHit};
pub use render::{DebugRenderer, DrawCommand, LineRecorder, draw_aabb};
pub use scene::{Scene, StepStats};
pub use shape::{BOX_TRIANGLES, BoxShape, OrientedBox};
pub use stepper::{Stepper, StepperConfig};

// Re-export key types from sim-types for convenience
pub use sim_types::{
    BodyDef, BodyKind, BoxDef, MaterialMixing, MixingRule, SceneConfig, SimError, SleepConfig,
    SolverConfig, Transform,
};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::cast_lossless
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    fn cube() -> BoxDef {
        BoxDef::new(Transform::identity(), Vector3::repeat(0.5))
    }

    #[test]
    fn test_basic_simulation() {
        let mut scene = Scene::new(SceneConfig::default()).unwrap();
        let body = scene
            .create_body(&BodyDef::dynamic().with_position(Point3::new(0.0, 0.0, 10.0)))
            .unwrap();
        scene.add_box(body, &cube()).unwrap();

        let mut stepper = Stepper::new();
        let stats = stepper
            .run_for(&mut scene, 0.5)
            .expect("simulation should succeed");
        assert!(!stats.is_empty());

        let body = scene.body(body).expect("body should exist");
        assert!(body.position().z < 10.0);
    }

    #[test]
    fn test_momentum_conservation() {
        // Two equal cubes meet head on in zero gravity
        let mut scene = Scene::new(SceneConfig::default().zero_gravity()).unwrap();
        for (x, v) in [(-2.0, 1.0), (2.0, -1.0)] {
            let body = scene
                .create_body(
                    &BodyDef::dynamic()
                        .with_position(Point3::new(x, 0.0, 0.0))
                        .with_linear_velocity(Vector3::new(v, 0.0, 0.0))
                        .with_damping(0.0, 0.0),
                )
                .unwrap();
            scene.add_box(body, &cube()).unwrap();
        }

        let initial = scene.total_linear_momentum();
        Stepper::new()
            .run_for(&mut scene, 3.0)
            .expect("simulation should succeed");

        // They collided: neither passed through the other
        let xs: Vec<f64> = scene.bodies().map(|(_, b)| b.position().x).collect();
        assert!(xs[0] < xs[1]);
        assert_relative_eq!(scene.total_linear_momentum(), initial, epsilon = 1e-9);
    }

    #[test]
    fn test_energy_trend() {
        // A free-falling cube converts potential energy into kinetic energy
        let mut scene = Scene::new(SceneConfig::default()).unwrap();
        let initial_height = 10.0;
        let body = scene
            .create_body(
                &BodyDef::dynamic()
                    .with_position(Point3::new(0.0, 0.0, initial_height))
                    .with_damping(0.0, 0.0),
            )
            .unwrap();
        scene.add_box(body, &cube()).unwrap();

        let g = 9.81;
        let mass = scene.body(body).unwrap().mass();
        let initial_total = mass * g * initial_height + scene.total_kinetic_energy();

        Stepper::new()
            .run_for(&mut scene, 0.5)
            .expect("simulation should succeed");

        let final_height = scene.body(body).unwrap().position().z;
        let final_total = mass * g * final_height + scene.total_kinetic_energy();

        // Semi-implicit Euler gains a little energy under constant gravity
        let energy_drift = (final_total - initial_total).abs() / initial_total;
        assert!(
            energy_drift < 0.01,
            "Energy drift too large: {}%",
            energy_drift * 100.0
        );
    }

    #[test]
    fn test_static_ground() {
        let mut scene = Scene::new(SceneConfig::default()).unwrap();
        let ground = scene.create_body(&BodyDef::fixed()).unwrap();
        scene
            .add_box(ground, &BoxDef::new(Transform::identity(), Vector3::new(5.0, 5.0, 0.5)))
            .unwrap();
        let cube_body = scene
            .create_body(&BodyDef::dynamic().with_position(Point3::new(0.0, 0.0, 2.0)))
            .unwrap();
        scene.add_box(cube_body, &cube()).unwrap();

        Stepper::new()
            .run_for(&mut scene, 2.0)
            .expect("simulation should succeed");

        let ground = scene.body(ground).expect("should have ground");
        assert_eq!(ground.position(), Point3::origin());
        assert!(scene.body(cube_body).unwrap().position().z > 0.9);
    }
}
