//! Typed handles into the scene's pools.
//!
//! Each handle wraps a generation-checked [`PoolKey`], so a handle to a
//! removed body, box or contact is rejected instead of aliasing whatever
//! reuses its slot.

use std::fmt;

use crate::alloc::PoolKey;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! pool_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(pub(crate) PoolKey);

        impl $name {
            /// The underlying pool key.
            #[must_use]
            pub fn key(self) -> PoolKey {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

pool_handle!(
    /// Handle to a rigid body owned by a [`Scene`](crate::Scene).
    BodyHandle,
    "body"
);

pool_handle!(
    /// Handle to a box shape attached to a body.
    BoxHandle,
    "box"
);

pool_handle!(
    /// Handle to a contact constraint between two boxes.
    ContactHandle,
    "contact"
);
