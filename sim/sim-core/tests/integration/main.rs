//! Integration tests for sim-core scenes.
//!
//! These drive whole scenes through the public API:
//! - Resting contact, stacking and sleeping
//! - Island partitioning and independent sleep
//! - Body and box lifecycle, mass and heap accounting
//! - Queries and the replay dump against simulated scenes

mod fixtures;
mod islands;
mod lifecycle;
mod queries;
mod resting;
