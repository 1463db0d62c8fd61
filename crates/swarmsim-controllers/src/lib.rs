//! Reference controllers for swarmsim robots.
//!
//! Each controller is a self-contained [`Controller`] implementation that an
//! experiment boxes into a [`swarmsim_core::BasicBot`]. Controllers that need
//! randomness own a private seeded RNG, so a run stays reproducible as long
//! as every controller is constructed with an explicit seed.

pub mod beacon;
pub mod phototaxis;
pub mod random_walk;

pub use beacon::Beacon;
pub use phototaxis::Phototaxis;
pub use random_walk::RandomWalk;

pub use swarmsim_core::{Controller, ControllerInput, ControllerOutput};
