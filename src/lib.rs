//! Live camera hand tracking with on-screen landmark overlays.
//!
//! The centerpiece is [`HandTrackingController`], which receives frames from a [`CameraFeed`],
//! runs them through a replaceable hand landmarker service, and hands the resulting overlay
//! geometry to a [`Presenter`]. The camera, the inference backend, and the presentation surface
//! are all traits, so the controller can be driven by real devices as well as by test fakes.
//!
//! # Coordinates
//!
//! Landmarks produced by the service are normalized to the camera image: X and Y range from 0 to
//! 1, with the origin in the top left corner and Y pointing *down*. Overlay geometry is in view
//! coordinates, as defined by the [`Viewport`] the presenter reports.
//!
//! # Environment Variables
//!
//! [`LandmarkerOptions::from_env`] reads the initial service configuration from the environment.
//! See the [`config`] module for the list of variables.
//!
//! [`HandTrackingController`]: controller::HandTrackingController
//! [`CameraFeed`]: capture::CameraFeed
//! [`Presenter`]: present::Presenter
//! [`Viewport`]: overlay::Viewport
//! [`LandmarkerOptions::from_env`]: config::LandmarkerOptions::from_env

use log::LevelFilter;

pub mod capture;
pub mod config;
pub mod controller;
pub mod drop;
pub mod inference;
pub mod landmark;
pub mod overlay;
pub mod present;
pub mod render;
pub mod resolution;
pub mod slot;
pub mod timer;
pub mod worker;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and this library will log at *trace*
/// level. Otherwise, they will log at *debug* level. `RUST_LOG` can override both.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
