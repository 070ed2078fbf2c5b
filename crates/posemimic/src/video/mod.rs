//! Video input.
//!
//! - [`webcam`]: V4L2 webcam access.

pub mod webcam;
