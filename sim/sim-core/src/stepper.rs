//! Fixed-timestep driving of a [`Scene`].
//!
//! The scene always advances by its configured timestep. Application loops
//! usually measure wall-clock time between frames instead; [`Stepper`]
//! accumulates that time and runs however many fixed steps it covers,
//! carrying the remainder into the next frame.
//!
//! # Example
//!
//! ```
//! use sim_core::{Scene, Stepper};
//! use sim_types::{BodyDef, BoxDef, SceneConfig, Transform};
//! use nalgebra::Vector3;
//!
//! let mut scene = Scene::new(SceneConfig::default()).unwrap();
//! let body = scene.create_body(&BodyDef::dynamic()).unwrap();
//! scene
//!     .add_box(body, &BoxDef::new(Transform::identity(), Vector3::repeat(0.5)))
//!     .unwrap();
//!
//! let mut stepper = Stepper::new();
//!
//! // A 25 ms frame covers one 1/60 s step and leaves the rest pending
//! let steps = stepper.advance(&mut scene, 0.025).unwrap();
//! assert_eq!(steps, 1);
//! assert!(stepper.alpha(&scene) > 0.0);
//! ```

use tracing::warn;

use crate::scene::{Scene, StepStats};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the stepper.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepperConfig {
    /// Most fixed steps run by one call to [`Stepper::advance`]. Time
    /// beyond that is dropped so a slow frame cannot snowball.
    pub max_steps_per_advance: usize,
    /// Frame times above this many seconds are clamped before accumulating.
    pub max_frame_time: f64,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            max_steps_per_advance: 8,
            max_frame_time: 0.25,
        }
    }
}

impl StepperConfig {
    /// Never drop time: every accumulated step is run.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_steps_per_advance: usize::MAX,
            max_frame_time: f64::INFINITY,
        }
    }

    /// Set the per-advance step cap.
    #[must_use]
    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps_per_advance = steps;
        self
    }
}

/// Turns variable frame times into fixed scene steps.
#[derive(Debug, Clone, Default)]
pub struct Stepper {
    config: StepperConfig,
    accumulator: f64,
    totals: StepStats,
}

impl Stepper {
    /// Create a new stepper with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stepper with custom configuration.
    #[must_use]
    pub fn with_config(config: StepperConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Get the stepper configuration.
    #[must_use]
    pub fn config(&self) -> &StepperConfig {
        &self.config
    }

    /// Time accumulated but not yet simulated.
    #[must_use]
    pub fn pending_time(&self) -> f64 {
        self.accumulator
    }

    /// Fraction of a step the accumulator holds, for interpolating
    /// rendered transforms between the last two steps.
    #[must_use]
    pub fn alpha(&self, scene: &Scene) -> f64 {
        (self.accumulator / scene.timestep()).clamp(0.0, 1.0)
    }

    /// Counters summed over every step this stepper has run.
    #[must_use]
    pub fn totals(&self) -> &StepStats {
        &self.totals
    }

    /// Drop any accumulated time.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }

    /// Account for `elapsed` seconds of frame time and run the fixed steps
    /// it covers. Returns the number of steps run.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`Scene::step`]. Time for the failed
    /// step and any after it stays in the accumulator.
    pub fn advance(&mut self, scene: &mut Scene, elapsed: f64) -> sim_types::Result<usize> {
        if !elapsed.is_finite() || elapsed < 0.0 {
            return Err(sim_types::SimError::InvalidTimestep(elapsed));
        }
        self.accumulator += elapsed.min(self.config.max_frame_time);

        let dt = scene.timestep();
        let mut steps = 0;
        while self.accumulator >= dt {
            if steps == self.config.max_steps_per_advance {
                warn!(
                    dropped = self.accumulator,
                    steps, "frame needed more steps than allowed, dropping time"
                );
                self.accumulator = 0.0;
                break;
            }
            let stats = scene.step()?;
            self.record(&stats);
            self.accumulator -= dt;
            steps += 1;
        }
        Ok(steps)
    }

    /// Run exactly `steps` fixed steps, ignoring the accumulator.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails.
    pub fn run(&mut self, scene: &mut Scene, steps: u64) -> sim_types::Result<Vec<StepStats>> {
        let mut out = Vec::new();
        for _ in 0..steps {
            let stats = scene.step()?;
            self.record(&stats);
            out.push(stats);
        }
        Ok(out)
    }

    /// Run for a specific duration of simulated time, rounded up to whole
    /// steps.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails.
    pub fn run_for(&mut self, scene: &mut Scene, duration: f64) -> sim_types::Result<Vec<StepStats>> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(sim_types::SimError::InvalidTimestep(duration));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let steps = (duration / scene.timestep()).ceil() as u64;
        self.run(scene, steps)
    }

    fn record(&mut self, stats: &StepStats) {
        let t = &mut self.totals;
        t.contacts_tested += stats.contacts_tested;
        t.contacts = stats.contacts;
        t.islands += stats.islands;
        t.islands_slept += stats.islands_slept;
        t.island_bodies += stats.island_bodies;
        t.constraints_solved += stats.constraints_solved;
    }
}
