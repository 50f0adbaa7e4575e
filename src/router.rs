//! Orthogonal connection routing.
//!
//! Every route leaves its port along the port normal, bends at right angles
//! only, and enters the destination port along its normal. A direct elbow is
//! used when its corridor is free of other nodes; otherwise the route detours
//! around the outline of the whole diagram.

use crate::diagram::{Connection, DiagramContent};
use crate::geometry::{Point, Rect, Side, bounds_of, points_close};
use crate::ports::{port_point, screen_rect};
use crate::viewport::Viewport;
use crate::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMode {
    /// Straight segments through user-placed waypoints.
    Manual,
    /// Direct path with at most one bend between the stand-off points.
    Elbow,
    /// Path around the outside of every node.
    Detour,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub points: Vec<Point>,
    pub mode: RouteMode,
}

impl Route {
    pub fn segments(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.points.windows(2).map(|pair| (pair[0], pair[1]))
    }

    pub fn is_orthogonal(&self) -> bool {
        self.segments()
            .all(|(a, b)| (a.x - b.x).abs() < 1e-3 || (a.y - b.y).abs() < 1e-3)
    }

    pub fn label_anchor(&self) -> Point {
        label_anchor(&self.points)
    }
}

/// A port position together with the side it faces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub point: Point,
    pub side: Side,
}

impl Anchor {
    fn extended(&self) -> Point {
        let (nx, ny) = self.side.normal();
        self.point.offset(nx * PORT_STANDOFF, ny * PORT_STANDOFF)
    }
}

/// Routes one connection of `content` in screen space.
///
/// Returns `None` when either endpoint references a node that does not exist.
pub fn route_connection(
    connection: &Connection,
    content: &DiagramContent,
    viewport: &Viewport,
) -> Option<Route> {
    let from_node = content.node(&connection.from)?;
    let to_node = content.node(&connection.to)?;

    let from = Anchor {
        point: port_point(from_node, connection.from_port, viewport),
        side: connection.from_port.side(),
    };
    let to = Anchor {
        point: port_point(to_node, connection.to_port, viewport),
        side: connection.to_port.side(),
    };

    if let Some(waypoints) = connection.manual_waypoints() {
        let mut points = Vec::with_capacity(waypoints.len() + 2);
        points.push(from.point);
        points.extend(waypoints.iter().map(|point| viewport.world_to_screen(*point)));
        points.push(to.point);
        return Some(Route {
            points,
            mode: RouteMode::Manual,
        });
    }

    let all_rects: Vec<Rect> = content
        .nodes
        .iter()
        .map(|node| screen_rect(node, viewport))
        .collect();
    let obstacles: Vec<Rect> = content
        .nodes
        .iter()
        .zip(&all_rects)
        .filter(|(node, _)| node.id != connection.from && node.id != connection.to)
        .map(|(_, rect)| *rect)
        .collect();

    Some(route_between(from, to, &obstacles, &all_rects))
}

/// Core routing between two anchors.
///
/// `obstacles` must not contain the source or destination node; `all_nodes`
/// is every node rectangle and defines the outline used for detours.
pub fn route_between(from: Anchor, to: Anchor, obstacles: &[Rect], all_nodes: &[Rect]) -> Route {
    let extend_from = from.extended();
    let extend_to = to.extended();

    for middle in elbow_candidates(from, to, extend_from, extend_to) {
        let points = build_path(from.point, &middle, to.point);
        if corridor_is_clear(&points, obstacles) {
            return Route {
                points,
                mode: RouteMode::Elbow,
            };
        }
    }

    let middle = detour_points(from, to, extend_from, extend_to, all_nodes);
    Route {
        points: build_path(from.point, &middle, to.point),
        mode: RouteMode::Detour,
    }
}

/// Candidate middle sections, most preferred first.
fn elbow_candidates(from: Anchor, to: Anchor, extend_from: Point, extend_to: Point) -> Vec<Vec<Point>> {
    let mut candidates = Vec::with_capacity(3);

    if faces(from, to) {
        candidates.push(Vec::new());
    }

    let horizontal_first = (extend_to.x - extend_from.x).abs() >= (extend_to.y - extend_from.y).abs();
    let horizontal = vec![
        extend_from,
        Point::new(extend_to.x, extend_from.y),
        extend_to,
    ];
    let vertical = vec![
        extend_from,
        Point::new(extend_from.x, extend_to.y),
        extend_to,
    ];

    if horizontal_first {
        candidates.push(horizontal);
        candidates.push(vertical);
    } else {
        candidates.push(vertical);
        candidates.push(horizontal);
    }
    candidates
}

/// Two ports on one line, pointing at each other with room in between.
fn faces(from: Anchor, to: Anchor) -> bool {
    let eps = 1e-3_f32;
    match (from.side, to.side) {
        (Side::Bottom, Side::Top) => (from.point.x - to.point.x).abs() < eps && to.point.y > from.point.y,
        (Side::Top, Side::Bottom) => (from.point.x - to.point.x).abs() < eps && to.point.y < from.point.y,
        (Side::Right, Side::Left) => (from.point.y - to.point.y).abs() < eps && to.point.x > from.point.x,
        (Side::Left, Side::Right) => (from.point.y - to.point.y).abs() < eps && to.point.x < from.point.x,
        _ => false,
    }
}

fn corridor_is_clear(points: &[Point], obstacles: &[Rect]) -> bool {
    points.windows(2).all(|pair| {
        let corridor = Rect::spanning(pair[0], pair[1]).inflate(ROUTE_CLEARANCE);
        obstacles.iter().all(|obstacle| !corridor.intersects(obstacle))
    })
}

fn detour_points(
    from: Anchor,
    to: Anchor,
    extend_from: Point,
    extend_to: Point,
    all_nodes: &[Rect],
) -> Vec<Point> {
    // the stand-off points count as part of the outline so no leg doubles back
    let stand_off = Rect::spanning(extend_from, extend_to);
    let outline = bounds_of(all_nodes)
        .map(|bounds| bounds.union(&stand_off))
        .unwrap_or(stand_off);
    let center = outline.center();

    let side_y = |side: Side| match side {
        Side::Top => outline.min_y - ROUTE_CLEARANCE,
        _ => outline.max_y + ROUTE_CLEARANCE,
    };

    match (from.side.is_vertical(), to.side.is_vertical()) {
        (true, true) => {
            let x = if extend_from.x <= center.x {
                outline.min_x - ROUTE_CLEARANCE
            } else {
                outline.max_x + ROUTE_CLEARANCE
            };
            vec![
                extend_from,
                Point::new(x, extend_from.y),
                Point::new(x, extend_to.y),
                extend_to,
            ]
        }
        (false, false) => {
            let y = if extend_from.y <= center.y {
                outline.min_y - ROUTE_CLEARANCE
            } else {
                outline.max_y + ROUTE_CLEARANCE
            };
            vec![
                extend_from,
                Point::new(extend_from.x, y),
                Point::new(extend_to.x, y),
                extend_to,
            ]
        }
        (true, false) | (false, true) => {
            let vertical_side = if from.side.is_vertical() {
                from.side
            } else {
                to.side
            };
            let y = side_y(vertical_side);
            vec![
                extend_from,
                Point::new(extend_from.x, y),
                Point::new(extend_to.x, y),
                extend_to,
            ]
        }
    }
}

/// Joins the port points with the middle section and drops duplicate or
/// redundant collinear points.
fn build_path(start: Point, middle: &[Point], end: Point) -> Vec<Point> {
    let mut path: Vec<Point> = Vec::with_capacity(middle.len() + 2);
    for point in std::iter::once(start)
        .chain(middle.iter().copied())
        .chain(std::iter::once(end))
    {
        if path.last().is_some_and(|last| points_close(*last, point)) {
            continue;
        }
        while path.len() >= 2 && passes_through(path[path.len() - 2], path[path.len() - 1], point) {
            path.pop();
        }
        path.push(point);
    }
    path
}

/// Is `middle` on the axis-aligned line from `a` to `b`, between them?
fn passes_through(a: Point, middle: Point, b: Point) -> bool {
    let eps = 1e-3_f32;
    let between = |lo: f32, value: f32, hi: f32| value >= lo.min(hi) - eps && value <= lo.max(hi) + eps;
    let same_x = (a.x - middle.x).abs() < eps && (middle.x - b.x).abs() < eps;
    let same_y = (a.y - middle.y).abs() < eps && (middle.y - b.y).abs() < eps;
    (same_x && between(a.y, middle.y, b.y)) || (same_y && between(a.x, middle.x, b.x))
}

/// Point halfway along the polyline, measured by length.
pub fn label_anchor(points: &[Point]) -> Point {
    match points {
        [] => Point::default(),
        [only] => *only,
        _ => {
            let total: f32 = points.windows(2).map(|pair| pair[0].distance(pair[1])).sum();
            let mut remaining = total / 2.0;
            for pair in points.windows(2) {
                let length = pair[0].distance(pair[1]);
                if length > 0.0 && remaining <= length {
                    let t = remaining / length;
                    return Point::new(
                        pair[0].x + (pair[1].x - pair[0].x) * t,
                        pair[0].y + (pair[1].y - pair[0].y) * t,
                    );
                }
                remaining -= length;
            }
            points[points.len() - 1]
        }
    }
}
