//! Software rendering of hand overlays.

use std::{
    convert::Infallible,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::Context;
use embedded_graphics::{
    draw_target::DrawTarget,
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle},
};
use image::{Rgba, RgbaImage};
use nalgebra::Point2;

use crate::{
    overlay::{ContentFit, HandOverlay, Size, Viewport},
    present::{Alert, Presenter},
};

/// Colors and sizes used by [`draw_overlays`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub line_color: Rgb888,
    pub line_width: u32,
    pub dot_fill: Rgb888,
    pub dot_stroke: Rgb888,
    pub dot_diameter: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            line_color: Rgb888::new(0, 127, 139),
            line_width: 2,
            dot_fill: Rgb888::RED,
            dot_stroke: Rgb888::YELLOW,
            dot_diameter: 7,
        }
    }
}

fn to_point(p: Point2<f32>) -> Point {
    Point::new(p.x.round() as i32, p.y.round() as i32)
}

/// Draws `overlays` onto `target`: skeleton lines first, then landmark dots on top.
///
/// Coordinates outside of the image are clipped.
pub fn draw_overlays(target: &mut RgbaImage, overlays: &[HandOverlay], style: &OverlayStyle) {
    let mut target = Target(target);
    let line_style = PrimitiveStyle::with_stroke(style.line_color, style.line_width);
    let dot_style = PrimitiveStyleBuilder::new()
        .fill_color(style.dot_fill)
        .stroke_color(style.dot_stroke)
        .stroke_width(1)
        .build();

    for overlay in overlays {
        for line in &overlay.lines {
            match Line::new(to_point(line.from), to_point(line.to))
                .into_styled(line_style)
                .draw(&mut target)
            {
                Ok(_) => {}
                Err(infallible) => match infallible {},
            }
        }
        for dot in &overlay.dots {
            match Circle::with_center(to_point(*dot), style.dot_diameter)
                .into_styled(dot_style)
                .draw(&mut target)
            {
                Ok(_) => {}
                Err(infallible) => match infallible {},
            }
        }
    }
}

struct Target<'a>(&'a mut RgbaImage);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        let (width, height) = self.0.dimensions();

        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: embedded_graphics::geometry::Size { width, height },
        }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Rgb888;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(pos, color) in pixels {
            if pos.x >= 0
                && (pos.x as u32) < self.0.width()
                && pos.y >= 0
                && (pos.y as u32) < self.0.height()
            {
                self.0.put_pixel(
                    pos.x as u32,
                    pos.y as u32,
                    Rgba([color.r(), color.g(), color.b(), 255]),
                );
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
struct PresenterState {
    alerts: Vec<Alert>,
    resume_visible: bool,
    unavailable_visible: bool,
    draw_calls: usize,
    clear_calls: usize,
}

/// A [`Presenter`] that renders overlays into an in-memory canvas.
///
/// The canvas has the size of the viewport and is cleared to transparent before every draw, so
/// it can be composited over the camera preview. Alerts and control visibility are recorded for
/// inspection.
pub struct ImagePresenter {
    viewport: Mutex<Viewport>,
    style: OverlayStyle,
    canvas: Mutex<RgbaImage>,
    state: Mutex<PresenterState>,
}

impl ImagePresenter {
    pub fn new(viewport: Viewport) -> Self {
        Self::with_style(viewport, OverlayStyle::default())
    }

    pub fn with_style(viewport: Viewport, style: OverlayStyle) -> Self {
        Self {
            canvas: Mutex::new(blank_canvas(viewport.size)),
            viewport: Mutex::new(viewport),
            style,
            state: Mutex::default(),
        }
    }

    /// Changes the viewport, for example after a device rotation.
    pub fn set_viewport(&self, viewport: Viewport) {
        *lock(&self.viewport) = viewport;
    }

    /// Returns a copy of the current canvas.
    pub fn snapshot(&self) -> RgbaImage {
        lock(&self.canvas).clone()
    }

    /// Writes the current canvas to an image file. The format is chosen by the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        lock(&self.canvas)
            .save(path)
            .with_context(|| format!("failed to write overlay to {}", path.display()))
    }

    /// Returns every alert presented so far, oldest first.
    pub fn alerts(&self) -> Vec<Alert> {
        lock(&self.state).alerts.clone()
    }

    pub fn resume_visible(&self) -> bool {
        lock(&self.state).resume_visible
    }

    pub fn unavailable_visible(&self) -> bool {
        lock(&self.state).unavailable_visible
    }

    /// Returns how many times overlays were drawn.
    pub fn draw_calls(&self) -> usize {
        lock(&self.state).draw_calls
    }

    /// Returns how many times overlays were cleared.
    pub fn clear_calls(&self) -> usize {
        lock(&self.state).clear_calls
    }
}

fn blank_canvas(size: Size) -> RgbaImage {
    RgbaImage::new(size.width.max(0.0) as u32, size.height.max(0.0) as u32)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Presenter for ImagePresenter {
    fn viewport(&self) -> Viewport {
        *lock(&self.viewport)
    }

    fn draw_overlays(&self, overlays: &[HandOverlay], bounds: Size, _fit: ContentFit) {
        // Overlays are already in view coordinates; the fit mode only matters for the preview.
        let mut canvas = blank_canvas(bounds);
        draw_overlays(&mut canvas, overlays, &self.style);
        *lock(&self.canvas) = canvas;
        lock(&self.state).draw_calls += 1;
    }

    fn clear_overlays(&self) {
        let mut canvas = lock(&self.canvas);
        let (width, height) = canvas.dimensions();
        *canvas = RgbaImage::new(width, height);
        drop(canvas);
        lock(&self.state).clear_calls += 1;
    }

    fn present_alert(&self, alert: Alert) {
        log::info!("{}: {}", alert.title(), alert.message());
        lock(&self.state).alerts.push(alert);
    }

    fn set_resume_visible(&self, visible: bool) {
        lock(&self.state).resume_visible = visible;
    }

    fn set_unavailable_visible(&self, visible: bool) {
        lock(&self.state).unavailable_visible = visible;
    }
}

#[cfg(test)]
mod tests {
    use crate::{capture::Orientation, overlay::Line as OverlayLine};

    use super::*;

    fn viewport(width: f32, height: f32) -> Viewport {
        Viewport {
            size: Size::new(width, height),
            fit: ContentFit::Fit,
            orientation: Orientation::Up,
        }
    }

    #[test]
    fn draws_lines_and_dots() {
        let style = OverlayStyle {
            line_width: 1,
            ..Default::default()
        };
        let overlay = HandOverlay {
            dots: vec![Point2::new(10.0, 10.0), Point2::new(30.0, 10.0)],
            lines: vec![OverlayLine {
                from: Point2::new(10.0, 10.0),
                to: Point2::new(30.0, 10.0),
            }],
        };
        let mut canvas = RgbaImage::new(40, 20);
        draw_overlays(&mut canvas, &[overlay], &style);

        let line = style.line_color;
        assert_eq!(
            *canvas.get_pixel(20, 10),
            Rgba([line.r(), line.g(), line.b(), 255])
        );
        let fill = style.dot_fill;
        assert_eq!(
            *canvas.get_pixel(10, 10),
            Rgba([fill.r(), fill.g(), fill.b(), 255])
        );
        assert_eq!(*canvas.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn out_of_bounds_geometry_is_clipped() {
        let overlay = HandOverlay {
            dots: vec![Point2::new(-50.0, -50.0), Point2::new(500.0, 500.0)],
            lines: vec![OverlayLine {
                from: Point2::new(-50.0, 5.0),
                to: Point2::new(500.0, 5.0),
            }],
        };
        let mut canvas = RgbaImage::new(10, 10);
        draw_overlays(&mut canvas, &[overlay], &OverlayStyle::default());
        assert!(canvas.pixels().any(|p| p.0[3] != 0));
    }

    #[test]
    fn presenter_records_state() {
        let presenter = ImagePresenter::new(viewport(64.0, 48.0));
        assert_eq!(presenter.snapshot().dimensions(), (64, 48));
        assert_eq!(presenter.draw_calls(), 0);

        presenter.set_resume_visible(true);
        presenter.set_unavailable_visible(true);
        presenter.present_alert(Alert::ConfigurationFailed);
        assert!(presenter.resume_visible());
        assert!(presenter.unavailable_visible());
        assert_eq!(presenter.alerts(), [Alert::ConfigurationFailed]);

        let overlay = HandOverlay {
            dots: vec![Point2::new(4.0, 4.0)],
            lines: Vec::new(),
        };
        presenter.draw_overlays(&[overlay], Size::new(32.0, 24.0), ContentFit::Fit);
        assert_eq!(presenter.draw_calls(), 1);
        let snapshot = presenter.snapshot();
        assert_eq!(snapshot.dimensions(), (32, 24));
        assert_ne!(*snapshot.get_pixel(4, 4), Rgba([0, 0, 0, 0]));

        presenter.clear_overlays();
        assert_eq!(presenter.clear_calls(), 1);
        assert_eq!(presenter.draw_calls(), 1);
        let cleared = presenter.snapshot();
        assert_eq!(cleared.dimensions(), (32, 24));
        assert!(cleared.pixels().all(|p| p.0[3] == 0));

        presenter.set_viewport(viewport(10.0, 10.0));
        assert_eq!(presenter.viewport().size, Size::new(10.0, 10.0));
    }
}
