use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub fn distance(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Which edge of a node rectangle something sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Top,
    Bottom,
    Left,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Top => "top",
            Side::Bottom => "bottom",
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    /// Unit vector pointing out of the node.
    pub fn normal(&self) -> (f32, f32) {
        match self {
            Side::Top => (0.0, -1.0),
            Side::Bottom => (0.0, 1.0),
            Side::Left => (-1.0, 0.0),
            Side::Right => (1.0, 0.0),
        }
    }

    /// Top and bottom ports leave their node vertically.
    pub fn is_vertical(&self) -> bool {
        matches!(self, Side::Top | Side::Bottom)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl Rect {
    pub fn from_origin(origin: Point, width: f32, height: f32) -> Rect {
        Rect {
            min_x: origin.x,
            max_x: origin.x + width,
            min_y: origin.y,
            max_y: origin.y + height,
        }
    }

    /// Smallest rectangle covering both points.
    pub fn spanning(a: Point, b: Point) -> Rect {
        Rect {
            min_x: a.x.min(b.x),
            max_x: a.x.max(b.x),
            min_y: a.y.min(b.y),
            max_y: a.y.max(b.y),
        }
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point {
        Point {
            x: (self.min_x + self.max_x) / 2.0,
            y: (self.min_y + self.max_y) / 2.0,
        }
    }

    pub fn inflate(self, amount: f32) -> Rect {
        Rect {
            min_x: self.min_x - amount,
            max_x: self.max_x + amount,
            min_y: self.min_y - amount,
            max_y: self.max_y + amount,
        }
    }

    /// Strict overlap: rectangles that only touch along an edge do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    pub fn contains(&self, point: Point) -> bool {
        let eps = 1e-3_f32;
        point.x >= self.min_x - eps
            && point.x <= self.max_x + eps
            && point.y >= self.min_y - eps
            && point.y <= self.max_y + eps
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            min_x: self.min_x.min(other.min_x),
            max_x: self.max_x.max(other.max_x),
            min_y: self.min_y.min(other.min_y),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

/// Bounding box of every rectangle, `None` when empty.
pub fn bounds_of<'a>(rects: impl IntoIterator<Item = &'a Rect>) -> Option<Rect> {
    rects
        .into_iter()
        .fold(None, |acc: Option<Rect>, rect| match acc {
            Some(current) => Some(current.union(rect)),
            None => Some(*rect),
        })
}

/// Does the segment `a`-`b` pass through the interior of `rect`?
///
/// Uses slab clipping, so segments grazing an edge do not count.
pub fn segment_intersects_rect(a: Point, b: Point, rect: &Rect) -> bool {
    let eps = 1e-4_f32;
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let mut t_min = 0.0_f32;
    let mut t_max = 1.0_f32;

    for (start, delta, lo, hi) in [
        (a.x, dx, rect.min_x, rect.max_x),
        (a.y, dy, rect.min_y, rect.max_y),
    ] {
        if delta.abs() <= f32::EPSILON {
            if start <= lo + eps || start >= hi - eps {
                return false;
            }
            continue;
        }
        let mut t0 = (lo - start) / delta;
        let mut t1 = (hi - start) / delta;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_min = t_min.max(t0);
        t_max = t_max.min(t1);
        if t_max - t_min <= eps {
            return false;
        }
    }

    true
}

/// Shortest distance from `point` to the segment `a`-`b`.
pub fn distance_to_segment(point: Point, a: Point, b: Point) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx * dx + dy * dy;
    if length_sq <= f32::EPSILON {
        return point.distance(a);
    }
    let t = (((point.x - a.x) * dx + (point.y - a.y) * dy) / length_sq).clamp(0.0, 1.0);
    point.distance(Point {
        x: a.x + t * dx,
        y: a.y + t * dy,
    })
}

pub fn points_close(a: Point, b: Point) -> bool {
    a.distance(b) < 1e-2_f32
}

pub fn snap_to_grid(value: f32, grid: f32) -> f32 {
    if grid <= 0.0 {
        return value;
    }
    (value / grid).round() * grid
}

pub fn is_grid_multiple(value: f32, grid: f32) -> bool {
    if grid <= 0.0 {
        return true;
    }
    (value - snap_to_grid(value, grid)).abs() < 1e-3
}
