//! Palm detection and hand landmark estimation.

pub mod detection;
pub mod landmark;
