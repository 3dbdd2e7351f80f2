//! rollcall-hw — Hardware abstraction for camera capture.
//!
//! Provides V4L2-based RGB capture and direct-to-buffer preview
//! annotation.

pub mod camera;
pub mod draw;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo};
pub use frame::RgbFrame;
