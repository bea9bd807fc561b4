//! Camera capture collaborator.
//!
//! The camera session itself lives outside this crate. It is driven through [`CameraFeed`] and
//! reports back through a [`CaptureListener`] registered once, when the controller is built.

use std::sync::{Arc, Weak};

use image::RgbaImage;

use crate::resolution::Resolution;

/// A captured camera frame.
///
/// Cloning a [`Frame`] is cheap; the pixel data is shared.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbaImage>,
}

impl Frame {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    /// Returns the frame's pixel data.
    #[inline]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }
}

impl From<RgbaImage> for Frame {
    fn from(image: RgbaImage) -> Self {
        Self::new(image)
    }
}

/// Physical orientation of the device, as reported by its motion sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceOrientation {
    #[default]
    Unknown,
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
    FaceUp,
    FaceDown,
}

/// Orientation of a frame's content relative to its pixel rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// Pixel rows are upright.
    #[default]
    Up,
    /// Rotated by 180°.
    Down,
    /// Rotated 90° counterclockwise.
    Left,
    /// Rotated 90° clockwise.
    Right,
}

impl Orientation {
    /// Maps the device orientation to the orientation of the frames the camera delivers.
    ///
    /// Orientations that say nothing about rotation around the viewing axis (flat, unknown)
    /// are treated as upright, as is upside-down portrait.
    pub fn from_device(orientation: DeviceOrientation) -> Self {
        match orientation {
            DeviceOrientation::Portrait => Self::Up,
            DeviceOrientation::LandscapeLeft => Self::Left,
            DeviceOrientation::LandscapeRight => Self::Right,
            _ => Self::Up,
        }
    }

    /// Returns `true` if the content is rotated by 90°, exchanging width and height.
    #[inline]
    pub fn is_transposed(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }
}

/// Outcome of starting a camera session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatus {
    /// The session is configured and running.
    Success,
    /// The camera could not be configured.
    Failed,
    /// The user denied access to the camera.
    PermissionDenied,
}

/// Receives events from a [`CameraFeed`].
///
/// Methods may be called from any thread.
pub trait CaptureListener: Send + Sync {
    /// A new frame was captured.
    fn on_frame(&self, frame: Frame, orientation: Orientation);

    /// The session was interrupted (for example, another app took over the camera).
    ///
    /// If `can_resume_manually` is `true`, the session can be restarted through
    /// [`CameraFeed::resume_interrupted`]; otherwise it stays unavailable until
    /// [`CaptureListener::on_interruption_ended`] is called.
    fn on_interrupted(&self, can_resume_manually: bool);

    /// A previous interruption ended and the session is running again.
    fn on_interruption_ended(&self);

    /// The session stopped because of a runtime error.
    fn on_runtime_error(&self);
}

/// A camera session delivering frames to a [`CaptureListener`].
pub trait CameraFeed: Send + Sync {
    /// Registers the listener that receives frames and session events.
    fn set_listener(&self, listener: Weak<dyn CaptureListener>);

    /// Configures and starts the session. `on_status` is called once, from any thread.
    fn start_session(&self, on_status: Box<dyn FnOnce(CameraStatus) + Send>);

    /// Stops the session. No frames are delivered afterwards.
    fn stop_session(&self);

    /// Attempts to restart an interrupted session. `on_resumed` receives whether it is running.
    fn resume_interrupted(&self, on_resumed: Box<dyn FnOnce(bool) + Send>);

    /// Returns the resolution of the frames the session delivers.
    fn video_resolution(&self) -> Resolution;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_orientation_mapping() {
        assert_eq!(
            Orientation::from_device(DeviceOrientation::Portrait),
            Orientation::Up
        );
        assert_eq!(
            Orientation::from_device(DeviceOrientation::LandscapeLeft),
            Orientation::Left
        );
        assert_eq!(
            Orientation::from_device(DeviceOrientation::LandscapeRight),
            Orientation::Right
        );
        for other in [
            DeviceOrientation::Unknown,
            DeviceOrientation::PortraitUpsideDown,
            DeviceOrientation::FaceUp,
            DeviceOrientation::FaceDown,
        ] {
            assert_eq!(Orientation::from_device(other), Orientation::Up);
        }
    }

    #[test]
    fn frame_shares_pixels() {
        let frame = Frame::from(RgbaImage::new(4, 3));
        let copy = frame.clone();
        assert_eq!(copy.resolution(), Resolution::new(4, 3));
        assert!(std::ptr::eq(frame.image(), copy.image()));
        assert!(Orientation::Left.is_transposed());
        assert!(!Orientation::Down.is_transposed());
    }
}
