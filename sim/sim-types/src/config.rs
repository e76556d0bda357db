//! Configuration types for simulation.
//!
//! This module provides configuration types that control how a scene
//! steps: timestep, gravity, solver tuning, sleeping and memory budgets.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Main configuration for a scene.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SceneConfig {
    /// Fixed timestep used by `Scene::step` (seconds).
    pub timestep: f64,
    /// Gravity acceleration (m/s²).
    pub gravity: Vector3<f64>,
    /// Solver iterations per step. Values below 1 are clamped to 1.
    pub iterations: usize,
    /// Whether islands may fall asleep.
    pub allow_sleep: bool,
    /// Whether friction impulses are solved.
    pub enable_friction: bool,
    /// Contact solver tuning.
    pub solver: SolverConfig,
    /// Sleep thresholds.
    pub sleep: SleepConfig,
    /// How material properties of two boxes combine into one contact.
    pub mixing: MaterialMixing,
    /// Margin added on every side of a box AABB before it enters the broad phase.
    pub aabb_margin: f64,
    /// Byte budget of the scene heap that backs bodies and boxes.
    pub heap_bytes: usize,
    /// Number of contact records allocated per pool page.
    pub contacts_per_page: usize,
    /// Upper bound on the island search stack; `None` allows one entry per body.
    pub island_capacity: Option<usize>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            timestep: 1.0 / 60.0,
            gravity: Vector3::new(0.0, 0.0, -9.81),
            iterations: 20,
            allow_sleep: true,
            enable_friction: true,
            solver: SolverConfig::default(),
            sleep: SleepConfig::default(),
            mixing: MaterialMixing::default(),
            aabb_margin: 0.5,
            heap_bytes: 20 * 1024 * 1024,
            contacts_per_page: 256,
            island_capacity: None,
        }
    }
}

impl SceneConfig {
    /// Create a configuration with the given timestep.
    #[must_use]
    pub fn with_timestep(timestep: f64) -> Self {
        Self {
            timestep,
            ..Default::default()
        }
    }

    /// Configuration for real-time games (60 Hz, 10 iterations).
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            iterations: 10,
            ..Default::default()
        }
    }

    /// Configuration for stable stacking (120 Hz, 30 iterations, no sleeping).
    #[must_use]
    pub fn high_fidelity() -> Self {
        Self {
            timestep: 1.0 / 120.0,
            iterations: 30,
            allow_sleep: false,
            ..Default::default()
        }
    }

    /// Set the gravity vector.
    #[must_use]
    pub fn gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity (zero-G environment).
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Vector3::zeros();
        self
    }

    /// Set the solver iteration count.
    #[must_use]
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Disable sleeping.
    #[must_use]
    pub fn without_sleeping(mut self) -> Self {
        self.allow_sleep = false;
        self
    }

    /// Disable friction.
    #[must_use]
    pub fn without_friction(mut self) -> Self {
        self.enable_friction = false;
        self
    }

    /// Set the material mixing policy.
    #[must_use]
    pub fn mixing(mut self, mixing: MaterialMixing) -> Self {
        self.mixing = mixing;
        self
    }

    /// Limit the island search stack.
    #[must_use]
    pub fn island_capacity(mut self, limit: usize) -> Self {
        self.island_capacity = Some(limit);
        self
    }

    /// Set the heap budget in bytes.
    #[must_use]
    pub fn heap_bytes(mut self, bytes: usize) -> Self {
        self.heap_bytes = bytes;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(crate::SimError::InvalidTimestep(self.timestep));
        }

        if self.timestep > 1.0 {
            return Err(crate::SimError::invalid_config(
                "timestep > 1 second is likely an error",
            ));
        }

        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(crate::SimError::invalid_config("gravity must be finite"));
        }

        if !self.aabb_margin.is_finite() || self.aabb_margin < 0.0 {
            return Err(crate::SimError::invalid_config(
                "aabb_margin must be non-negative",
            ));
        }

        if self.contacts_per_page == 0 {
            return Err(crate::SimError::invalid_config(
                "contacts_per_page must be at least 1",
            ));
        }

        if self.island_capacity == Some(0) {
            return Err(crate::SimError::invalid_config(
                "island_capacity must be at least 1",
            ));
        }

        self.solver.validate()?;
        self.sleep.validate()?;

        Ok(())
    }

    /// Iteration count with the lower bound applied.
    #[must_use]
    pub fn effective_iterations(&self) -> usize {
        self.iterations.max(1)
    }

    /// Get the frequency in Hz.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        1.0 / self.timestep
    }
}

/// Tuning of the sequential-impulse contact solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Fraction of penetration corrected per step through velocity bias.
    pub baumgarte: f64,
    /// Penetration depth tolerated without correction (m).
    pub penetration_slop: f64,
    /// Closing speed above which restitution is applied (m/s).
    pub restitution_threshold: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            baumgarte: 0.2,
            penetration_slop: 0.05,
            restitution_threshold: 1.0,
        }
    }
}

impl SolverConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !(0.0..=1.0).contains(&self.baumgarte) {
            return Err(crate::SimError::invalid_config(
                "baumgarte must be in [0, 1]",
            ));
        }
        if !self.penetration_slop.is_finite() || self.penetration_slop < 0.0 {
            return Err(crate::SimError::invalid_config(
                "penetration_slop must be non-negative",
            ));
        }
        if !self.restitution_threshold.is_finite() || self.restitution_threshold < 0.0 {
            return Err(crate::SimError::invalid_config(
                "restitution_threshold must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Thresholds that decide when an island may sleep.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SleepConfig {
    /// Compared against the squared linear speed.
    pub linear_tolerance: f64,
    /// Compared against the squared angular speed.
    pub angular_tolerance: f64,
    /// Seconds every body of an island must stay below both tolerances.
    pub time_to_sleep: f64,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            linear_tolerance: 0.01,
            angular_tolerance: 3.0_f64.to_radians(),
            time_to_sleep: 0.5,
        }
    }
}

impl SleepConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.linear_tolerance < 0.0
            || self.angular_tolerance < 0.0
            || !self.time_to_sleep.is_finite()
            || self.time_to_sleep < 0.0
        {
            return Err(crate::SimError::invalid_config(
                "sleep tolerances and time must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Rule for combining one material coefficient from two boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MixingRule {
    /// `sqrt(a * b)`: a low value on either side dominates.
    GeometricMean,
    /// `(a + b) / 2`.
    Average,
    /// `min(a, b)`.
    Minimum,
    /// `max(a, b)`: the livelier material wins.
    Maximum,
    /// `a * b`.
    Multiply,
}

impl MixingRule {
    /// Combine two coefficients.
    #[must_use]
    pub fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            Self::GeometricMean => (a * b).sqrt(),
            Self::Average => 0.5 * (a + b),
            Self::Minimum => a.min(b),
            Self::Maximum => a.max(b),
            Self::Multiply => a * b,
        }
    }
}

/// Friction and restitution mixing policy.
///
/// The default mixes friction with a geometric mean (anything slides on
/// ice) and restitution with a maximum (bouncy objects always bounce).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MaterialMixing {
    /// Rule for friction coefficients.
    pub friction: MixingRule,
    /// Rule for restitution coefficients.
    pub restitution: MixingRule,
}

impl Default for MaterialMixing {
    fn default() -> Self {
        Self {
            friction: MixingRule::GeometricMean,
            restitution: MixingRule::Maximum,
        }
    }
}

impl MaterialMixing {
    /// Combined friction coefficient.
    #[must_use]
    pub fn friction(&self, a: f64, b: f64) -> f64 {
        self.friction.combine(a, b)
    }

    /// Combined restitution coefficient.
    #[must_use]
    pub fn restitution(&self, a: f64, b: f64) -> f64 {
        self.restitution.combine(a, b)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SceneConfig::default().validate().is_ok());
        assert!(SceneConfig::realtime().validate().is_ok());
        assert!(SceneConfig::high_fidelity().validate().is_ok());
    }

    #[test]
    fn test_invalid_timestep() {
        let err = SceneConfig::with_timestep(0.0).validate().unwrap_err();
        assert!(err.is_config_error());
        assert!(SceneConfig::with_timestep(f64::NAN).validate().is_err());
        assert!(SceneConfig::with_timestep(2.0).validate().is_err());
    }

    #[test]
    fn test_iterations_clamped() {
        let config = SceneConfig::default().iterations(0);
        assert_eq!(config.effective_iterations(), 1);
    }

    #[test]
    fn test_zero_island_capacity_rejected() {
        assert!(SceneConfig::default().island_capacity(0).validate().is_err());
    }

    #[test]
    fn test_sleep_defaults() {
        let sleep = SleepConfig::default();
        assert_relative_eq!(sleep.angular_tolerance, 3.0 / 180.0 * std::f64::consts::PI);
        assert_eq!(sleep.time_to_sleep, 0.5);
    }

    #[test]
    fn test_default_mixing() {
        let mixing = MaterialMixing::default();
        assert_relative_eq!(mixing.friction(0.25, 1.0), 0.5);
        assert_eq!(mixing.restitution(0.2, 0.7), 0.7);
    }

    #[test]
    fn test_mixing_rules() {
        assert_eq!(MixingRule::Minimum.combine(0.3, 0.9), 0.3);
        assert_relative_eq!(MixingRule::Average.combine(0.3, 0.9), 0.6);
        assert_relative_eq!(MixingRule::Multiply.combine(0.5, 0.5), 0.25);
    }
}
