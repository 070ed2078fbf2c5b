//! Webcam pose mimicry.
//!
//! Captures webcam frames, detects faces, hands and bodies in them, classifies the combination
//! into one of a few poses (raising a hand, thinking, being shocked), and shows a character image
//! matching the pose next to the camera image.
//!
//! # Environment Variables
//!
//! * `POSEMIMIC_CONFIG`: Path of the TOML configuration file. Defaults to `posemimic.toml` in the
//!   working directory, if it exists.
//! * `POSEMIMIC_JPEG_BACKEND`: Configures the JPEG decoder used for webcam frames. Allowed values
//!   are `mozjpeg` (the default) and `jpeg-decoder`.
//! * `POSEMIMIC_WEBCAM_NAME`: Opens the webcam with this card name instead of the configured
//!   device number.
//! * `RUST_LOG`: Overrides the configured log level, see [`env_logger`].

pub mod app;
pub mod assets;
pub mod body;
pub mod config;
pub mod detection;
pub mod detector;
pub mod face;
pub mod filter;
pub mod gui;
pub mod hand;
pub mod i18n;
pub mod image;
pub mod iter;
pub mod landmark;
pub mod nn;
pub mod num;
pub mod overlay;
pub mod pose;
pub mod termination;
pub mod timer;
pub mod video;

use log::LevelFilter;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str, log_level: LevelFilter) {
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and this crate log at the given [`log::LevelFilter`] (*info* if omitted).
/// `wgpu` always logs at *warn* level. `RUST_LOG` overrides both.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"), ::log::LevelFilter::Info)
    };
    ($level:expr) => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"), $level)
    };
}
