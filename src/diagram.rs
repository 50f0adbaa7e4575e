use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::geometry::{Point, Rect};
use crate::ports::PortId;
use crate::*;

pub type NodeId = String;
pub type ConnectionId = String;

/// A positioned box on the canvas. Position is the top-left corner in world
/// coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_node_color")]
    pub color: String,
}

fn default_node_color() -> String {
    DEFAULT_NODE_COLOR.to_string()
}

impl Node {
    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn world_rect(&self) -> Rect {
        Rect::from_origin(self.origin(), self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

impl LineStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineStyle::Solid => "solid",
            LineStyle::Dashed => "dashed",
            LineStyle::Dotted => "dotted",
        }
    }

    pub fn dash_array(&self) -> Option<&'static str> {
        match self {
            LineStyle::Solid => None,
            LineStyle::Dashed => Some("8 6"),
            LineStyle::Dotted => Some("2 4"),
        }
    }
}

/// One end of a connection: a node and one of its ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub node: NodeId,
    pub port: PortId,
}

impl Endpoint {
    pub fn new(node: impl Into<NodeId>, port: PortId) -> Self {
        Self {
            node: node.into(),
            port,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEnd {
    From,
    To,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub from: NodeId,
    pub from_port: PortId,
    pub to: NodeId,
    pub to_port: PortId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<LineStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waypoints: Option<Vec<Point>>,
}

impl Connection {
    pub fn endpoint(&self, end: ConnectionEnd) -> Endpoint {
        match end {
            ConnectionEnd::From => Endpoint::new(self.from.clone(), self.from_port),
            ConnectionEnd::To => Endpoint::new(self.to.clone(), self.to_port),
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.from == node_id || self.to == node_id
    }

    pub fn line_style(&self) -> LineStyle {
        self.style.unwrap_or_default()
    }

    /// Manual waypoints, when present and non-empty, replace automatic routing.
    pub fn manual_waypoints(&self) -> Option<&[Point]> {
        self.waypoints
            .as_deref()
            .filter(|points| !points.is_empty())
    }
}

/// The editable part of a diagram: every node and every connection.
///
/// This is the value the editor session owns and the autosave bridge watches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagramContent {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl DiagramContent {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    pub fn connection(&self, id: &str) -> Option<&Connection> {
        self.connections.iter().find(|conn| conn.id == id)
    }

    pub(crate) fn connection_mut(&mut self, id: &str) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|conn| conn.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    /// Checks the invariants a persisted diagram must hold. Used when a full
    /// payload arrives from outside the editor.
    pub fn validate(&self) -> Result<()> {
        let mut node_ids = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                bail!("node id must not be empty");
            }
            if !node_ids.insert(node.id.as_str()) {
                bail!("duplicate node id '{}'", node.id);
            }
            if !(node.x.is_finite() && node.y.is_finite()) {
                bail!("node '{}' has a non-finite position", node.id);
            }
            if node.width < MIN_WIDTH || node.height < MIN_HEIGHT {
                bail!(
                    "node '{}' is {}x{}, below the {}x{} minimum",
                    node.id,
                    node.width,
                    node.height,
                    MIN_WIDTH,
                    MIN_HEIGHT
                );
            }
        }

        let mut connection_ids = HashSet::new();
        for conn in &self.connections {
            if !connection_ids.insert(conn.id.as_str()) {
                bail!("duplicate connection id '{}'", conn.id);
            }
            if conn.from == conn.to {
                bail!("connection '{}' connects node '{}' to itself", conn.id, conn.from);
            }
            for endpoint in [&conn.from, &conn.to] {
                if !node_ids.contains(endpoint.as_str()) {
                    bail!(
                        "connection '{}' references unknown node '{}'",
                        conn.id,
                        endpoint
                    );
                }
            }
        }

        Ok(())
    }
}

/// The persisted unit: one named diagram owned by one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramRecord {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub content: DiagramContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramSummary {
    pub id: String,
    pub name: String,
    pub node_count: i64,
    pub connection_count: i64,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}
