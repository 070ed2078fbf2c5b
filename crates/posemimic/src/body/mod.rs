//! Human body pose detection and landmark estimation.

pub mod detection;
pub mod landmark;
