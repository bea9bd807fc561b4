//! Presentation collaborator.

use crate::overlay::{ContentFit, HandOverlay, Size, Viewport};

/// User-facing alerts raised by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    /// Camera access was denied. The presenter should offer a way to the app's settings.
    PermissionDenied,
    /// The camera session could not be configured.
    ConfigurationFailed,
    /// The hand landmarker service could not be created from the current configuration.
    ServiceUnavailable { reason: String },
    /// A manual resume of an interrupted session failed.
    ResumeFailed,
}

impl Alert {
    pub fn title(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "Camera Permissions Denied",
            Self::ConfigurationFailed => "Configuration Failed",
            Self::ServiceUnavailable { .. } => "Hand Landmarker Unavailable",
            Self::ResumeFailed => "Unable to Resume",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::PermissionDenied => "Camera permissions have been denied for this app. \
                You can change this by going to Settings."
                .into(),
            Self::ConfigurationFailed => "There was an error while configuring camera.".into(),
            Self::ServiceUnavailable { reason } => {
                format!("The hand landmarker could not be created: {reason}")
            }
            Self::ResumeFailed => "The camera session could not be resumed.".into(),
        }
    }

    /// Returns whether the alert should offer to open the app's settings.
    pub fn offers_settings(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }
}

/// The on-screen surface the controller drives.
///
/// All methods are called on the controller's UI context.
pub trait Presenter: Send + Sync {
    /// Returns the current geometry of the overlay view.
    fn viewport(&self) -> Viewport;

    /// Replaces the drawn overlays.
    ///
    /// Only called when there is at least one hand to draw.
    fn draw_overlays(&self, overlays: &[HandOverlay], bounds: Size, fit: ContentFit);

    /// Removes any drawn overlays, after a result without hands.
    fn clear_overlays(&self);

    fn present_alert(&self, alert: Alert);

    /// Shows or hides the control that resumes an interrupted session.
    fn set_resume_visible(&self, visible: bool);

    /// Shows or hides the "camera unavailable" label.
    fn set_unavailable_visible(&self, visible: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_permission_alert_offers_settings() {
        assert!(Alert::PermissionDenied.offers_settings());
        assert!(!Alert::ConfigurationFailed.offers_settings());
        assert!(!Alert::ResumeFailed.offers_settings());
    }

    #[test]
    fn service_alert_includes_reason() {
        let alert = Alert::ServiceUnavailable {
            reason: "model not found".into(),
        };
        assert_eq!(alert.title(), "Hand Landmarker Unavailable");
        assert!(alert.message().ends_with("model not found"));
    }
}
