//! Core types for rigid-body box simulation.
//!
//! This crate provides the foundational types shared by the collision,
//! contact and scene crates:
//!
//! - [`Transform`] - Position plus rotation matrix
//! - [`BodyDef`], [`BodyKind`] - Rigid body creation parameters
//! - [`BoxDef`], [`MassData`] - Oriented box shapes and their mass
//! - [`SceneConfig`] - Timestep, gravity, solver, sleep and memory settings
//! - [`SimError`] - Everything that can go wrong
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They have no behavior beyond validation
//! and small geometric helpers. Scene-construction code fills them in; the
//! engine copies what it needs.
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**. It can be used in:
//!
//! - Headless simulation loops
//! - Tools that generate or inspect scenes
//! - Other engines
//!
//! # Coordinate System
//!
//! Consistent with the CortenForge ecosystem:
//!
//! - X: right
//! - Y: forward
//! - Z: up
//! - Right-handed
//!
//! # Example
//!
//! ```
//! use sim_types::{BodyDef, BoxDef, SceneConfig, Transform};
//! use nalgebra::{Point3, Vector3};
//!
//! let config = SceneConfig::default();
//! assert!(config.validate().is_ok());
//!
//! let body = BodyDef::dynamic().with_position(Point3::new(0.0, 0.0, 3.0));
//! let shape = BoxDef::new(Transform::identity(), Vector3::new(0.5, 0.5, 0.5));
//!
//! assert_eq!(body.position.z, 3.0);
//! assert!(shape.validate().is_ok());
//! ```

#![doc(html_root_url = "https://docs.rs/sim-types/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
// Allow certain clippy lints that are overly pedantic for type definitions
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod error;
mod transform;

pub use body::{BodyDef, BodyKind, BoxDef, MassData, parallel_axis};
pub use config::{MaterialMixing, MixingRule, SceneConfig, SleepConfig, SolverConfig};
pub use error::SimError;
pub use transform::{Transform, axis_angle_quaternion};

// Re-export math types for convenience
pub use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
