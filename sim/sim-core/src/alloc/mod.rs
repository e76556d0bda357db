//! Scene-lifetime memory management.
//!
//! Three arenas back the engine, each sized for one access pattern:
//!
//! - [`StackArena`] - per-step scratch with strict LIFO release enforced by
//!   scope guards
//! - [`Heap`] - first-fit byte budget for bodies and boxes
//! - [`PagedPool`] - generational, page-grown storage for fixed-size records
//!
//! Every arena belongs to one scene and is dropped with it. Nothing here is
//! process-global.

mod heap;
mod pool;
mod stack;

pub use heap::{Heap, HeapBlock};
pub use pool::{PagedPool, PoolKey};
pub use stack::{StackArena, StackScope};
