use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::diagram::Node;
use crate::geometry::{Point, Rect, Side};
use crate::viewport::Viewport;
use crate::*;

const HORIZONTAL_EDGE_FRACTIONS: [f32; 5] = [0.1, 0.3, 0.5, 0.7, 0.9];
const VERTICAL_EDGE_FRACTIONS: [f32; 3] = [0.25, 0.5, 0.75];

const HORIZONTAL_EDGE_SUFFIXES: [&str; 5] = ["-far-left", "-left", "", "-right", "-far-right"];
const VERTICAL_EDGE_SUFFIXES: [&str; 3] = ["-top", "", "-bottom"];

/// A named attachment point on a node's perimeter.
///
/// Top and bottom edges carry five slots, left and right carry three. Slots
/// count left-to-right or top-to-bottom; the middle slot is named after the
/// side alone (`"top"`, `"left"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortId {
    side: Side,
    slot: u8,
}

impl PortId {
    pub const COUNT: usize = 16;

    pub fn new(side: Side, slot: u8) -> Option<Self> {
        if (slot as usize) < Self::slot_count(side) {
            Some(Self { side, slot })
        } else {
            None
        }
    }

    pub fn center(side: Side) -> Self {
        Self {
            side,
            slot: (Self::slot_count(side) / 2) as u8,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    fn slot_count(side: Side) -> usize {
        if side.is_vertical() {
            HORIZONTAL_EDGE_FRACTIONS.len()
        } else {
            VERTICAL_EDGE_FRACTIONS.len()
        }
    }

    /// Position along the edge, 0.0 at the left/top end.
    pub fn fraction(&self) -> f32 {
        if self.side.is_vertical() {
            HORIZONTAL_EDGE_FRACTIONS[self.slot as usize]
        } else {
            VERTICAL_EDGE_FRACTIONS[self.slot as usize]
        }
    }

    /// Every port in a stable order: top, bottom, left, right.
    pub fn all() -> impl Iterator<Item = PortId> {
        [Side::Top, Side::Bottom, Side::Left, Side::Right]
            .into_iter()
            .flat_map(|side| {
                (0..Self::slot_count(side) as u8).map(move |slot| PortId { side, slot })
            })
    }

    /// Interpolates this port's point on `rect`.
    pub fn locate(&self, rect: &Rect) -> Point {
        let t = self.fraction();
        match self.side {
            Side::Top => Point::new(rect.min_x + rect.width() * t, rect.min_y),
            Side::Bottom => Point::new(rect.min_x + rect.width() * t, rect.max_y),
            Side::Left => Point::new(rect.min_x, rect.min_y + rect.height() * t),
            Side::Right => Point::new(rect.max_x, rect.min_y + rect.height() * t),
        }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = if self.side.is_vertical() {
            HORIZONTAL_EDGE_SUFFIXES[self.slot as usize]
        } else {
            VERTICAL_EDGE_SUFFIXES[self.slot as usize]
        };
        write!(f, "{}{}", self.side.as_str(), suffix)
    }
}

impl FromStr for PortId {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        PortId::all()
            .find(|port| port.to_string() == trimmed)
            .ok_or_else(|| anyhow!("unknown port '{trimmed}'"))
    }
}

impl TryFrom<String> for PortId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PortId> for String {
    fn from(port: PortId) -> Self {
        port.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortPoint {
    pub port: PortId,
    pub point: Point,
}

/// The node's rectangle in screen space under `viewport`.
pub fn screen_rect(node: &Node, viewport: &Viewport) -> Rect {
    viewport.world_rect_to_screen(&node.world_rect())
}

/// All sixteen ports of `node`, in screen space. Always derived from the
/// current node geometry and viewport; nothing is cached.
pub fn ports(node: &Node, viewport: &Viewport) -> Vec<PortPoint> {
    let rect = screen_rect(node, viewport);
    PortId::all()
        .map(|port| PortPoint {
            port,
            point: port.locate(&rect),
        })
        .collect()
}

pub fn port_point(node: &Node, port: PortId, viewport: &Viewport) -> Point {
    port.locate(&screen_rect(node, viewport))
}
