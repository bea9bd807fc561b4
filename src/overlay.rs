//! Overlay geometry.
//!
//! Landmarks come out of the model normalized to the camera image. To draw them on screen they
//! have to be rotated to match the device orientation, then scaled and offset the same way the
//! camera preview is scaled into its view.

use nalgebra::{Point2, Vector2};

use crate::{
    capture::Orientation,
    landmark::{Landmark, HAND_CONNECTIONS},
    resolution::Resolution,
};

/// A size in view coordinates (points or pixels, as the presenter defines them).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

impl From<Resolution> for Size {
    fn from(res: Resolution) -> Self {
        Self::new(res.width() as f32, res.height() as f32)
    }
}

/// How the camera image is fitted into the view it is displayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentFit {
    /// Scale to fit entirely inside the view, letterboxing as needed.
    #[default]
    Fit,
    /// Scale to cover the whole view, cropping as needed.
    Fill,
}

/// Everything about the on-screen view that affects overlay geometry.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub size: Size,
    pub fit: ContentFit,
    pub orientation: Orientation,
}

/// Maps image pixel coordinates into the view: `view = image * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub offset: Vector2<f32>,
    pub scale: f32,
}

impl Placement {
    /// Computes where an image of size `image` ends up when shown in a view of size `view`.
    ///
    /// Returns `None` if either size is empty.
    pub fn compute(image: Size, view: Size, fit: ContentFit) -> Option<Self> {
        if image.is_empty() || view.is_empty() {
            return None;
        }

        let width_scale = view.width / image.width;
        let height_scale = view.height / image.height;
        let scale = match fit {
            ContentFit::Fit => width_scale.min(height_scale),
            ContentFit::Fill => width_scale.max(height_scale),
        };

        let offset = Vector2::new(
            (view.width - image.width * scale) / 2.0,
            (view.height - image.height * scale) / 2.0,
        );
        Some(Self { offset, scale })
    }

    /// Maps a point in image pixel coordinates into view coordinates.
    #[inline]
    pub fn apply(&self, point: Point2<f32>) -> Point2<f32> {
        point * self.scale + self.offset
    }
}

/// A straight line between two overlay points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub from: Point2<f32>,
    pub to: Point2<f32>,
}

/// Drawable geometry for one hand, in view coordinates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandOverlay {
    /// One point per landmark, in landmark order.
    pub dots: Vec<Point2<f32>>,
    /// Skeleton lines.
    pub lines: Vec<Line>,
}

/// Rotates a normalized landmark to match the displayed orientation.
fn orient(landmark: &Landmark, orientation: Orientation) -> Point2<f32> {
    let (x, y) = (landmark.x(), landmark.y());
    match orientation {
        Orientation::Left => Point2::new(y, 1.0 - x),
        Orientation::Right => Point2::new(1.0 - y, x),
        Orientation::Up | Orientation::Down => Point2::new(x, y),
    }
}

/// Computes the overlay geometry of every hand.
///
/// `hands` holds normalized landmarks per hand, as reported by the model for an image of
/// `image_size`. Hands without landmarks produce no overlay, and nothing is produced at all if
/// the image or the viewport is empty.
pub fn hand_overlays(
    hands: &[Vec<Landmark>],
    image_size: Resolution,
    viewport: &Viewport,
) -> Vec<HandOverlay> {
    let image_size = if viewport.orientation.is_transposed() {
        image_size.transposed()
    } else {
        image_size
    };
    let image = Size::from(image_size);
    let Some(placement) = Placement::compute(image, viewport.size, viewport.fit) else {
        log::trace!(
            "cannot place {} image in {:?} viewport",
            image_size,
            viewport.size
        );
        return Vec::new();
    };

    hands
        .iter()
        .filter(|landmarks| !landmarks.is_empty())
        .map(|landmarks| {
            let dots = landmarks
                .iter()
                .map(|lm| {
                    let p = orient(lm, viewport.orientation);
                    placement.apply(Point2::new(p.x * image.width, p.y * image.height))
                })
                .collect::<Vec<_>>();
            // Partial landmark sets only get the lines whose ends are both present.
            let lines = HAND_CONNECTIONS
                .iter()
                .filter_map(|(a, b)| {
                    Some(Line {
                        from: *dots.get(a.index())?,
                        to: *dots.get(b.index())?,
                    })
                })
                .collect();
            HandOverlay { dots, lines }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::landmark::HandLandmark;

    use super::*;

    fn assert_point_eq(actual: Point2<f32>, expected: (f32, f32)) {
        assert_relative_eq!(actual.x, expected.0, epsilon = 1e-4);
        assert_relative_eq!(actual.y, expected.1, epsilon = 1e-4);
    }

    fn hand(points: &[(f32, f32)]) -> Vec<Landmark> {
        points
            .iter()
            .map(|&(x, y)| Landmark::new([x, y, 0.0]))
            .collect()
    }

    #[test]
    fn placement_fit_letterboxes() {
        // 640x480 into a 320x320 view: width-limited, scale 0.5, vertical bars.
        let p = Placement::compute(
            Size::new(640.0, 480.0),
            Size::new(320.0, 320.0),
            ContentFit::Fit,
        )
        .unwrap();
        assert_relative_eq!(p.scale, 0.5);
        assert_relative_eq!(p.offset.x, 0.0);
        assert_relative_eq!(p.offset.y, 40.0);
    }

    #[test]
    fn placement_fill_crops() {
        let p = Placement::compute(
            Size::new(640.0, 480.0),
            Size::new(320.0, 320.0),
            ContentFit::Fill,
        )
        .unwrap();
        assert_relative_eq!(p.scale, 320.0 / 480.0);
        assert_relative_eq!(p.offset.x, (320.0 - 640.0 * (320.0 / 480.0)) / 2.0);
        assert_relative_eq!(p.offset.y, 0.0);
    }

    #[test]
    fn placement_rejects_empty_sizes() {
        assert!(Placement::compute(Size::new(0.0, 10.0), Size::new(5.0, 5.0), ContentFit::Fit)
            .is_none());
        assert!(Placement::compute(Size::new(10.0, 10.0), Size::default(), ContentFit::Fill)
            .is_none());
    }

    #[test]
    fn upright_landmarks_are_scaled_and_offset() {
        let viewport = Viewport {
            size: Size::new(320.0, 320.0),
            fit: ContentFit::Fit,
            orientation: Orientation::Up,
        };
        let overlays = hand_overlays(
            &[hand(&[(0.0, 0.0), (1.0, 1.0), (0.5, 0.5)])],
            Resolution::RES_VGA,
            &viewport,
        );
        assert_eq!(overlays.len(), 1);
        let dots = &overlays[0].dots;
        assert_point_eq(dots[0], (0.0, 40.0));
        assert_point_eq(dots[1], (320.0, 280.0));
        assert_point_eq(dots[2], (160.0, 160.0));
    }

    #[test]
    fn left_orientation_rotates_and_transposes() {
        // A 640x480 image displayed rotated is 480x640, which fills a 480x640 view exactly.
        let viewport = Viewport {
            size: Size::new(480.0, 640.0),
            fit: ContentFit::Fit,
            orientation: Orientation::Left,
        };
        let overlays = hand_overlays(
            &[hand(&[(0.25, 0.75)])],
            Resolution::RES_VGA,
            &viewport,
        );
        // (x, y) -> (y, 1 - x) = (0.75, 0.75), then scaled by the transposed size.
        assert_point_eq(overlays[0].dots[0], (0.75 * 480.0, 0.75 * 640.0));

        let viewport = Viewport {
            orientation: Orientation::Right,
            ..viewport
        };
        let overlays = hand_overlays(
            &[hand(&[(0.25, 0.75)])],
            Resolution::RES_VGA,
            &viewport,
        );
        // (x, y) -> (1 - y, x) = (0.25, 0.25)
        assert_point_eq(overlays[0].dots[0], (0.25 * 480.0, 0.25 * 640.0));
    }

    #[test]
    fn full_hand_gets_skeleton_lines() {
        let points = (0..HandLandmark::COUNT)
            .map(|i| (i as f32 / 20.0, 0.5))
            .collect::<Vec<_>>();
        let viewport = Viewport {
            size: Size::new(640.0, 480.0),
            ..Default::default()
        };
        let overlays = hand_overlays(&[hand(&points)], Resolution::RES_VGA, &viewport);
        let overlay = &overlays[0];
        assert_eq!(overlay.dots.len(), HandLandmark::COUNT);
        assert_eq!(overlay.lines.len(), HAND_CONNECTIONS.len());

        let first = overlay.lines[0];
        assert_eq!(first.from, overlay.dots[HandLandmark::Wrist.index()]);
        assert_eq!(first.to, overlay.dots[HandLandmark::ThumbCmc.index()]);
    }

    #[test]
    fn partial_hand_only_gets_complete_lines() {
        let viewport = Viewport {
            size: Size::new(640.0, 480.0),
            ..Default::default()
        };
        // Wrist, ThumbCmc, ThumbMcp: two thumb lines.
        let overlays = hand_overlays(
            &[hand(&[(0.1, 0.1), (0.2, 0.2), (0.3, 0.3)])],
            Resolution::RES_VGA,
            &viewport,
        );
        assert_eq!(overlays[0].lines.len(), 2);
    }

    #[test]
    fn empty_inputs_produce_nothing() {
        let viewport = Viewport {
            size: Size::new(640.0, 480.0),
            ..Default::default()
        };
        assert!(hand_overlays(&[], Resolution::RES_VGA, &viewport).is_empty());
        assert!(hand_overlays(&[Vec::new()], Resolution::RES_VGA, &viewport).is_empty());
        assert!(
            hand_overlays(&[hand(&[(0.5, 0.5)])], Resolution::new(0, 0), &viewport).is_empty()
        );
    }
}
