use crate::diagram::{
    Connection, ConnectionEnd, ConnectionId, DiagramContent, Endpoint, LineStyle, new_id,
};
use crate::geometry::Point;
use crate::utils::is_valid_color;

impl DiagramContent {
    /// Creates a connection between two ports on two different, existing
    /// nodes. Self-loops and dangling endpoints are ignored.
    pub fn connect(&mut self, from: Endpoint, to: Endpoint) -> Option<ConnectionId> {
        if from.node == to.node {
            return None;
        }
        if !self.contains_node(&from.node) || !self.contains_node(&to.node) {
            return None;
        }

        let id = new_id("conn");
        self.connections.push(Connection {
            id: id.clone(),
            from: from.node,
            from_port: from.port,
            to: to.node,
            to_port: to.port,
            label: None,
            color: None,
            style: None,
            waypoints: None,
        });
        Some(id)
    }

    /// Rewrites one endpoint of an existing connection in place. The id,
    /// label, color and style are preserved.
    pub fn reconnect(&mut self, id: &str, end: ConnectionEnd, endpoint: Endpoint) -> bool {
        if !self.contains_node(&endpoint.node) {
            return false;
        }
        let Some(conn) = self.connection_mut(id) else {
            return false;
        };
        if conn.endpoint(end) == endpoint {
            return false;
        }
        let other = match end {
            ConnectionEnd::From => &conn.to,
            ConnectionEnd::To => &conn.from,
        };
        if *other == endpoint.node {
            return false;
        }

        match end {
            ConnectionEnd::From => {
                conn.from = endpoint.node;
                conn.from_port = endpoint.port;
            }
            ConnectionEnd::To => {
                conn.to = endpoint.node;
                conn.to_port = endpoint.port;
            }
        }
        true
    }

    pub fn delete_connection(&mut self, id: &str) -> bool {
        let before = self.connections.len();
        self.connections.retain(|conn| conn.id != id);
        before != self.connections.len()
    }

    /// Empty labels are stored as no label.
    pub fn set_connection_label(&mut self, id: &str, label: Option<&str>) -> bool {
        let label = label
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        match self.connection_mut(id) {
            Some(conn) if conn.label != label => {
                conn.label = label;
                true
            }
            _ => false,
        }
    }

    pub fn set_connection_style(&mut self, id: &str, style: LineStyle) -> bool {
        match self.connection_mut(id) {
            Some(conn) if conn.style != Some(style) => {
                conn.style = Some(style);
                true
            }
            _ => false,
        }
    }

    pub fn set_connection_color(&mut self, id: &str, color: Option<&str>) -> bool {
        if color.is_some_and(|value| !is_valid_color(value)) {
            return false;
        }
        let color = color.map(str::to_string);
        match self.connection_mut(id) {
            Some(conn) if conn.color != color => {
                conn.color = color;
                true
            }
            _ => false,
        }
    }

    /// Waypoints are world coordinates; an empty list clears them.
    pub fn set_waypoints(&mut self, id: &str, waypoints: Vec<Point>) -> bool {
        let waypoints = if waypoints.is_empty() {
            None
        } else {
            Some(waypoints)
        };
        match self.connection_mut(id) {
            Some(conn) if conn.waypoints != waypoints => {
                conn.waypoints = waypoints;
                true
            }
            _ => false,
        }
    }

    pub fn clear_waypoints(&mut self, id: &str) -> bool {
        self.set_waypoints(id, Vec::new())
    }

    pub fn connections_touching<'a>(
        &'a self,
        node_id: &'a str,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections
            .iter()
            .filter(move |conn| conn.touches(node_id))
    }
}
