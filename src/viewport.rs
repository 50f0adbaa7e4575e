use crate::geometry::{Point, Rect, bounds_of};
use crate::{WHEEL_ZOOM_IN, WHEEL_ZOOM_OUT, ZOOM_MAX, ZOOM_MIN};

/// Pan offset and zoom factor for one open diagram.
///
/// World coordinates are where nodes live; screen coordinates are where the
/// pointer operates. `screen = world * zoom + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub offset_x: f32,
    pub offset_y: f32,
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn world_to_screen(&self, point: Point) -> Point {
        Point {
            x: point.x * self.zoom + self.offset_x,
            y: point.y * self.zoom + self.offset_y,
        }
    }

    pub fn screen_to_world(&self, point: Point) -> Point {
        Point {
            x: (point.x - self.offset_x) / self.zoom,
            y: (point.y - self.offset_y) / self.zoom,
        }
    }

    pub fn world_rect_to_screen(&self, rect: &Rect) -> Rect {
        let min = self.world_to_screen(Point::new(rect.min_x, rect.min_y));
        let max = self.world_to_screen(Point::new(rect.max_x, rect.max_y));
        Rect::spanning(min, max)
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    pub fn zoom_at(&mut self, factor: f32) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        self.zoom = (self.zoom * factor).clamp(ZOOM_MIN, ZOOM_MAX);
    }

    /// One wheel notch: scrolling down zooms out, scrolling up zooms in.
    pub fn wheel(&mut self, delta_y: f32) {
        if delta_y > 0.0 {
            self.zoom_at(WHEEL_ZOOM_OUT);
        } else if delta_y < 0.0 {
            self.zoom_at(WHEEL_ZOOM_IN);
        }
    }

    pub fn reset(&mut self) {
        *self = Viewport::default();
    }

    /// Pans so the bounding box of `rects` sits in the middle of a canvas of
    /// the given screen size. Zoom is left untouched; nothing happens when
    /// there is nothing to center on.
    pub fn center_on<'a>(
        &mut self,
        rects: impl IntoIterator<Item = &'a Rect>,
        canvas_width: f32,
        canvas_height: f32,
    ) {
        let Some(bounds) = bounds_of(rects) else {
            return;
        };
        let center = bounds.center();
        self.offset_x = canvas_width / 2.0 - center.x * self.zoom;
        self.offset_y = canvas_height / 2.0 - center.y * self.zoom;
    }
}
