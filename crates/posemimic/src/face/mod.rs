//! Face detection and face mesh landmark estimation.

pub mod detection;
pub mod landmark;
