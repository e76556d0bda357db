//! Error types for simulation operations.

use thiserror::Error;

/// Errors that can occur while building or stepping a scene.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// A body handle does not refer to a live body.
    #[error("invalid body handle: {0}")]
    InvalidBody(String),

    /// A box handle does not refer to a live box.
    #[error("invalid box handle: {0}")]
    InvalidBox(String),

    /// A box was passed to a body that does not own it.
    #[error("box {shape} is not owned by body {body}")]
    ShapeNotOwned {
        /// The box handle.
        shape: String,
        /// The body the caller claimed owns it.
        body: String,
    },

    /// The operation is not permitted for this kind of body.
    #[error("operation not permitted on {kind} body: {operation}")]
    InvalidBodyKind {
        /// Body kind the operation was attempted on.
        kind: &'static str,
        /// The rejected operation.
        operation: &'static str,
    },

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Simulation diverged (`NaN` or `Inf` detected).
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invalid shape definition.
    #[error("invalid shape: {reason}")]
    InvalidShape {
        /// Description of what's wrong.
        reason: String,
    },

    /// The scene heap has no free block large enough.
    #[error("out of memory: requested {requested} bytes, {available} bytes free")]
    OutOfMemory {
        /// Bytes requested, including block header.
        requested: usize,
        /// Total bytes still free (possibly fragmented).
        available: usize,
    },

    /// The island search stack outgrew its configured capacity.
    #[error("island capacity exceeded: {required} bodies on the search stack, limit is {limit}")]
    IslandCapacityExceeded {
        /// Stack depth that was needed.
        required: usize,
        /// Configured limit.
        limit: usize,
    },
}

impl SimError {
    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid shape error.
    #[must_use]
    pub fn invalid_shape(reason: impl Into<String>) -> Self {
        Self::InvalidShape {
            reason: reason.into(),
        }
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::InvalidTimestep(_))
    }

    /// Check if this error reports an exhausted fixed budget.
    #[must_use]
    pub fn is_capacity_error(&self) -> bool {
        matches!(
            self,
            Self::OutOfMemory { .. } | Self::IslandCapacityExceeded { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::InvalidTimestep(-1.0);
        assert!(err.to_string().contains("-1"));

        let err = SimError::OutOfMemory {
            requested: 512,
            available: 128,
        };
        assert!(err.to_string().contains("512"));
        assert!(err.to_string().contains("128"));

        let err = SimError::diverged("NaN in velocity");
        assert!(err.to_string().contains("NaN"));
    }

    #[test]
    fn test_error_predicates() {
        let err = SimError::diverged("test");
        assert!(err.is_diverged());
        assert!(!err.is_config_error());

        let err = SimError::invalid_config("bad value");
        assert!(err.is_config_error());
        assert!(!err.is_capacity_error());

        let err = SimError::IslandCapacityExceeded {
            required: 10,
            limit: 4,
        };
        assert!(err.is_capacity_error());
    }
}
