//! Fluid SPH Simulation Library
//!
//! Real-time 2D particle fluid with springs, heat exchange, state changes and rigid body
//! coupling. Exposes simulation components for testing and reuse.

pub mod compute;
pub mod error;
pub mod render;
pub mod resources;
pub mod simulation;
