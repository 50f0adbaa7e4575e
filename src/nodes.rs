use crate::diagram::{DiagramContent, Node, NodeId, new_id};
use crate::geometry::{Point, is_grid_multiple, snap_to_grid};
use crate::utils::is_valid_color;
use crate::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Width,
    Height,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeDirection {
    Grow,
    Shrink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuideAxis {
    /// A horizontal line at a fixed y.
    Horizontal,
    /// A vertical line at a fixed x.
    Vertical,
}

/// Advisory alignment line shown while a node is dragged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Guide {
    pub axis: GuideAxis,
    pub position: f32,
}

/// Grid settings for placement operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snap {
    pub enabled: bool,
    pub grid: f32,
}

impl Default for Snap {
    fn default() -> Self {
        Self {
            enabled: true,
            grid: GRID,
        }
    }
}

impl Snap {
    fn apply(&self, value: f32) -> f32 {
        if self.enabled {
            snap_to_grid(value, self.grid)
        } else {
            value
        }
    }

    fn accepts(&self, value: f32) -> bool {
        !self.enabled || is_grid_multiple(value, self.grid)
    }
}

impl DiagramContent {
    /// Adds a default node at the next staggered slot and returns its id.
    pub fn add_node(&mut self) -> NodeId {
        let slot = (self.nodes.len() % STAGGER_SLOTS) as f32;
        let id = new_id("node");
        self.nodes.push(Node {
            id: id.clone(),
            x: STAGGER_ORIGIN + STAGGER_STEP * slot,
            y: STAGGER_ORIGIN + STAGGER_STEP * slot,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            text: DEFAULT_NODE_TEXT.to_string(),
            color: DEFAULT_NODE_COLOR.to_string(),
        });
        id
    }

    /// Moves a node so that its top-left sits at `pointer - grab_offset`,
    /// applying grid snap and alignment with every other node. Returns the
    /// guides produced by alignment, or `None` when the node does not exist.
    pub fn move_node(
        &mut self,
        id: &str,
        pointer: Point,
        grab_offset: Point,
        snap: Snap,
    ) -> Option<Vec<Guide>> {
        let node = self.node(id)?;
        let (width, height) = (node.width, node.height);

        let mut x = snap.apply(pointer.x - grab_offset.x);
        let mut y = snap.apply(pointer.y - grab_offset.y);
        let mut guides = Vec::new();

        if let Some((aligned, position)) = self.align(id, x, width, snap, Dimension::Width) {
            x = aligned;
            guides.push(Guide {
                axis: GuideAxis::Vertical,
                position,
            });
        }
        if let Some((aligned, position)) = self.align(id, y, height, snap, Dimension::Height) {
            y = aligned;
            guides.push(Guide {
                axis: GuideAxis::Horizontal,
                position,
            });
        }

        let node = self.node_mut(id)?;
        node.x = x;
        node.y = y;
        Some(guides)
    }

    /// Finds the closest edge/center alignment with another node along one
    /// axis. Returns the new start coordinate and the guide position.
    fn align(
        &self,
        id: &str,
        start: f32,
        extent: f32,
        snap: Snap,
        dimension: Dimension,
    ) -> Option<(f32, f32)> {
        let mut best: Option<(f32, f32, f32)> = None;

        for other in self.nodes.iter().filter(|other| other.id != id) {
            let (other_start, other_extent) = match dimension {
                Dimension::Width => (other.x, other.width),
                Dimension::Height => (other.y, other.height),
            };
            // start, center and end of this node against the same line of the other
            let anchors = [
                (other_start, 0.0),
                (other_start + other_extent / 2.0, extent / 2.0),
                (other_start + other_extent, extent),
            ];

            for (line, offset) in anchors {
                let distance = (start + offset - line).abs();
                if distance > ALIGN_THRESHOLD {
                    continue;
                }
                let candidate = line - offset;
                if !snap.accepts(candidate) {
                    continue;
                }
                if best.is_none_or(|(_, _, best_distance)| distance < best_distance) {
                    best = Some((candidate, line, distance));
                }
            }
        }

        best.map(|(candidate, line, _)| (candidate, line))
    }

    /// Arrow-key nudge by one step per unit of `dx`/`dy`, grid rule
    /// re-applied. Arrow keys pass -1, 0 or 1.
    pub fn nudge_node(&mut self, id: &str, dx: f32, dy: f32, snap: Snap) -> bool {
        let step = if snap.enabled { snap.grid } else { NUDGE_STEP_FREE };
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        node.x = snap.apply(node.x + dx * step);
        node.y = snap.apply(node.y + dy * step);
        true
    }

    pub fn resize_node(
        &mut self,
        id: &str,
        dimension: Dimension,
        direction: ResizeDirection,
    ) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        let delta = match direction {
            ResizeDirection::Grow => RESIZE_STEP,
            ResizeDirection::Shrink => -RESIZE_STEP,
        };
        let (value, minimum) = match dimension {
            Dimension::Width => (&mut node.width, MIN_WIDTH),
            Dimension::Height => (&mut node.height, MIN_HEIGHT),
        };
        let next = (*value + delta).max(minimum);
        if next == *value {
            return false;
        }
        *value = next;
        true
    }

    pub fn reset_node_size(&mut self, id: &str) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        if node.width == DEFAULT_WIDTH && node.height == DEFAULT_HEIGHT {
            return false;
        }
        node.width = DEFAULT_WIDTH;
        node.height = DEFAULT_HEIGHT;
        true
    }

    pub fn set_node_text(&mut self, id: &str, text: &str) -> bool {
        match self.node_mut(id) {
            Some(node) if node.text != text => {
                node.text = text.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn set_node_color(&mut self, id: &str, color: &str) -> bool {
        if !is_valid_color(color) {
            return false;
        }
        match self.node_mut(id) {
            Some(node) if node.color != color => {
                node.color = color.to_string();
                true
            }
            _ => false,
        }
    }

    /// Removes the node and every connection touching it.
    pub fn delete_node(&mut self, id: &str) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|node| node.id != id);
        if before == self.nodes.len() {
            return false;
        }
        self.connections.retain(|conn| !conn.touches(id));
        true
    }
}
