//! Pointer and keyboard handling for one open diagram.
//!
//! The [`Editor`] owns the diagram content behind a `watch` channel. Every
//! mutation goes through `Editor::mutate`, which publishes only when the
//! store actually changed, so subscribers (the autosave bridge) always see
//! the current content and nothing else.

use tokio::sync::watch;

use crate::diagram::{ConnectionEnd, ConnectionId, DiagramContent, Endpoint, LineStyle, NodeId};
use crate::geometry::{Point, distance_to_segment};
use crate::nodes::{Dimension, Guide, ResizeDirection, Snap};
use crate::ports::{ports, screen_rect};
use crate::render::{Scene, render_scene};
use crate::router::route_connection;
use crate::viewport::Viewport;
use crate::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditorSettings {
    pub grid_snap: bool,
    pub grid: f32,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            grid_snap: true,
            grid: GRID,
        }
    }
}

impl EditorSettings {
    fn snap(&self) -> Snap {
        Snap {
            enabled: self.grid_snap,
            grid: self.grid,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    None,
    Node(NodeId),
    Connection(ConnectionId),
}

/// The single gesture or modal the editor is in.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum InteractionState {
    #[default]
    Idle,
    Panning {
        last: Point,
    },
    DraggingNode {
        id: NodeId,
        /// Pointer position relative to the node's top-left, world units.
        grab_offset: Point,
    },
    ConnectingFrom(Endpoint),
    Reconnecting {
        connection: ConnectionId,
        end: ConnectionEnd,
    },
    EditingNode(NodeId),
    EditingConnection(ConnectionId),
}

impl InteractionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, InteractionState::Idle)
    }

    pub fn is_modal(&self) -> bool {
        matches!(
            self,
            InteractionState::EditingNode(_) | InteractionState::EditingConnection(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitTarget {
    Port(Endpoint),
    Node(NodeId),
    Connection(ConnectionId),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Delete,
    Backspace,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
}

impl Key {
    fn arrow_delta(&self) -> Option<(f32, f32)> {
        match self {
            Key::ArrowUp => Some((0.0, -1.0)),
            Key::ArrowDown => Some((0.0, 1.0)),
            Key::ArrowLeft => Some((-1.0, 0.0)),
            Key::ArrowRight => Some((1.0, 0.0)),
            _ => None,
        }
    }
}

pub struct Editor {
    store: watch::Sender<DiagramContent>,
    viewport: Viewport,
    state: InteractionState,
    selection: Selection,
    guides: Vec<Guide>,
    settings: EditorSettings,
}

impl Editor {
    /// Opens `content` with a default viewport and nothing selected.
    pub fn new(content: DiagramContent, settings: EditorSettings) -> Self {
        let (store, _) = watch::channel(content);
        Self {
            store,
            viewport: Viewport::default(),
            state: InteractionState::Idle,
            selection: Selection::None,
            guides: Vec::new(),
            settings,
        }
    }

    /// A receiver that always reads the latest content.
    pub fn subscribe(&self) -> watch::Receiver<DiagramContent> {
        self.store.subscribe()
    }

    pub fn content(&self) -> watch::Ref<'_, DiagramContent> {
        self.store.borrow()
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Alignment guides of the drag in progress, world coordinates.
    pub fn guides(&self) -> &[Guide] {
        &self.guides
    }

    pub fn settings(&self) -> EditorSettings {
        self.settings
    }

    pub fn set_grid_snap(&mut self, enabled: bool) {
        self.settings.grid_snap = enabled;
    }

    pub fn scene(&self) -> Scene {
        render_scene(&self.store.borrow(), &self.viewport)
    }

    /// Applies `change` to the store and notifies subscribers if it
    /// reported a modification.
    fn mutate(&self, change: impl FnOnce(&mut DiagramContent) -> bool) -> bool {
        self.store.send_if_modified(change)
    }

    /// Swaps in freshly loaded content and resets the session.
    pub fn replace_content(&mut self, content: DiagramContent) {
        self.store.send_replace(content);
        self.viewport.reset();
        self.state = InteractionState::Idle;
        self.selection = Selection::None;
        self.guides.clear();
    }

    pub fn hit_test(&self, screen: Point) -> HitTarget {
        let content = self.store.borrow();

        for node in content.nodes.iter().rev() {
            for port in ports(node, &self.viewport) {
                if port.point.distance(screen) <= PORT_HIT_RADIUS {
                    return HitTarget::Port(Endpoint::new(node.id.clone(), port.port));
                }
            }
        }

        if let Some(node) = content
            .nodes
            .iter()
            .rev()
            .find(|node| screen_rect(node, &self.viewport).contains(screen))
        {
            return HitTarget::Node(node.id.clone());
        }

        for conn in content.connections.iter().rev() {
            let Some(route) = route_connection(conn, &content, &self.viewport) else {
                continue;
            };
            if route
                .segments()
                .any(|(a, b)| distance_to_segment(screen, a, b) <= EDGE_HIT_TOLERANCE)
            {
                return HitTarget::Connection(conn.id.clone());
            }
        }

        HitTarget::Empty
    }

    pub fn pointer_down(&mut self, screen: Point) {
        match self.state.clone() {
            InteractionState::EditingNode(_) | InteractionState::EditingConnection(_) => {}
            InteractionState::ConnectingFrom(source) => {
                let HitTarget::Port(target) = self.hit_test(screen) else {
                    return;
                };
                let mut created = None;
                self.mutate(|content| {
                    created = content.connect(source, target);
                    created.is_some()
                });
                if let Some(id) = created {
                    tracing::debug!(connection = %id, "connection created");
                    self.state = InteractionState::Idle;
                }
            }
            InteractionState::Reconnecting { connection, end } => {
                let HitTarget::Port(target) = self.hit_test(screen) else {
                    return;
                };
                if self.mutate(|content| content.reconnect(&connection, end, target)) {
                    tracing::debug!(connection = %connection, ?end, "connection re-targeted");
                    self.state = InteractionState::Idle;
                }
            }
            InteractionState::Idle
            | InteractionState::Panning { .. }
            | InteractionState::DraggingNode { .. } => self.begin_gesture(screen),
        }
    }

    fn begin_gesture(&mut self, screen: Point) {
        match self.hit_test(screen) {
            HitTarget::Port(endpoint) => {
                let reconnect_end = match &self.selection {
                    Selection::Connection(id) => self.store.borrow().connection(id).and_then(|conn| {
                        [ConnectionEnd::From, ConnectionEnd::To]
                            .into_iter()
                            .find(|end| conn.endpoint(*end) == endpoint)
                    }),
                    _ => None,
                };
                self.state = match (reconnect_end, &self.selection) {
                    (Some(end), Selection::Connection(id)) => InteractionState::Reconnecting {
                        connection: id.clone(),
                        end,
                    },
                    _ => InteractionState::ConnectingFrom(endpoint),
                };
            }
            HitTarget::Node(id) => {
                let world = self.viewport.screen_to_world(screen);
                let origin = self.store.borrow().node(&id).map(|node| node.origin());
                if let Some(origin) = origin {
                    self.state = InteractionState::DraggingNode {
                        id: id.clone(),
                        grab_offset: Point::new(world.x - origin.x, world.y - origin.y),
                    };
                    self.selection = Selection::Node(id);
                }
            }
            HitTarget::Connection(id) => {
                self.selection = Selection::Connection(id);
                self.state = InteractionState::Idle;
            }
            HitTarget::Empty => {
                self.selection = Selection::None;
                self.state = InteractionState::Panning { last: screen };
            }
        }
    }

    pub fn pointer_move(&mut self, screen: Point) {
        match &mut self.state {
            InteractionState::Panning { last } => {
                self.viewport.pan(screen.x - last.x, screen.y - last.y);
                *last = screen;
            }
            InteractionState::DraggingNode { id, grab_offset } => {
                let (id, grab_offset) = (id.clone(), *grab_offset);
                let world = self.viewport.screen_to_world(screen);
                let snap = self.settings.snap();
                let mut guides = Vec::new();
                self.mutate(|content| {
                    let before = content.node(&id).map(|node| node.origin());
                    guides = content
                        .move_node(&id, world, grab_offset, snap)
                        .unwrap_or_default();
                    content.node(&id).map(|node| node.origin()) != before
                });
                self.guides = guides;
            }
            _ => {}
        }
    }

    /// Ends any pan or drag. Releasing anywhere is a valid drop.
    pub fn pointer_up(&mut self) {
        if matches!(
            self.state,
            InteractionState::Panning { .. } | InteractionState::DraggingNode { .. }
        ) {
            self.state = InteractionState::Idle;
        }
        self.guides.clear();
    }

    pub fn double_click(&mut self, screen: Point) {
        if !self.state.is_idle() {
            return;
        }
        match self.hit_test(screen) {
            HitTarget::Node(id) | HitTarget::Port(Endpoint { node: id, .. }) => {
                self.selection = Selection::Node(id.clone());
                self.state = InteractionState::EditingNode(id);
            }
            HitTarget::Connection(id) => {
                self.selection = Selection::Connection(id.clone());
                self.state = InteractionState::EditingConnection(id);
            }
            HitTarget::Empty => {}
        }
    }

    /// Applies the node modal and closes it. Returns whether anything changed.
    pub fn commit_node_edit(&mut self, text: &str, color: &str) -> bool {
        let InteractionState::EditingNode(id) = &self.state else {
            return false;
        };
        let id = id.clone();
        let changed = self.mutate(|content| {
            let text_changed = content.set_node_text(&id, text);
            content.set_node_color(&id, color) | text_changed
        });
        self.state = InteractionState::Idle;
        changed
    }

    /// Applies the connection modal and closes it. `None` clears the label
    /// or color.
    pub fn commit_connection_edit(
        &mut self,
        label: Option<&str>,
        style: LineStyle,
        color: Option<&str>,
    ) -> bool {
        let InteractionState::EditingConnection(id) = &self.state else {
            return false;
        };
        let id = id.clone();
        let changed = self.mutate(|content| {
            let mut changed = content.set_connection_label(&id, label);
            changed |= content.set_connection_style(&id, style);
            changed |= content.set_connection_color(&id, color);
            changed
        });
        self.state = InteractionState::Idle;
        changed
    }

    /// Handles a key press. `in_text_field` is true while focus is inside an
    /// input, where only Escape is ours.
    pub fn key_down(&mut self, key: Key, in_text_field: bool) -> bool {
        if key == Key::Escape {
            return self.escape();
        }
        if in_text_field || !self.state.is_idle() {
            return false;
        }
        match key {
            Key::Delete | Key::Backspace => self.delete_selected(),
            _ => {
                let (Some((dx, dy)), Selection::Node(id)) = (key.arrow_delta(), &self.selection)
                else {
                    return false;
                };
                let id = id.clone();
                let snap = self.settings.snap();
                self.mutate(|content| content.nudge_node(&id, dx, dy, snap))
            }
        }
    }

    fn escape(&mut self) -> bool {
        match self.state {
            InteractionState::Idle => {
                if self.selection == Selection::None {
                    return false;
                }
                self.selection = Selection::None;
            }
            _ => {
                tracing::debug!(state = ?self.state, "gesture cancelled");
                self.state = InteractionState::Idle;
                self.guides.clear();
            }
        }
        true
    }

    pub fn wheel(&mut self, delta_y: f32) {
        self.viewport.wheel(delta_y);
    }

    pub fn reset_view(&mut self) {
        self.viewport.reset();
    }

    /// Centers every node on a canvas of the given screen size.
    pub fn center_view(&mut self, canvas_width: f32, canvas_height: f32) {
        let rects: Vec<_> = self
            .store
            .borrow()
            .nodes
            .iter()
            .map(|node| node.world_rect())
            .collect();
        self.viewport.center_on(&rects, canvas_width, canvas_height);
    }

    /// Adds a node at the next staggered slot and selects it.
    pub fn add_node(&mut self) -> NodeId {
        let mut id = NodeId::new();
        self.mutate(|content| {
            id = content.add_node();
            true
        });
        self.selection = Selection::Node(id.clone());
        id
    }

    pub fn delete_selected(&mut self) -> bool {
        let deleted = match &self.selection {
            Selection::Node(id) => self.mutate(|content| content.delete_node(id)),
            Selection::Connection(id) => self.mutate(|content| content.delete_connection(id)),
            Selection::None => false,
        };
        if deleted {
            self.selection = Selection::None;
        }
        deleted
    }

    pub fn resize_selected(&mut self, dimension: Dimension, direction: ResizeDirection) -> bool {
        let Selection::Node(id) = &self.selection else {
            return false;
        };
        self.mutate(|content| content.resize_node(id, dimension, direction))
    }

    pub fn reset_selected_size(&mut self) -> bool {
        let Selection::Node(id) = &self.selection else {
            return false;
        };
        self.mutate(|content| content.reset_node_size(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::Node;
    use crate::geometry::Side;
    use crate::ports::PortId;

    fn node(id: &str, x: f32, y: f32) -> Node {
        Node {
            id: id.to_string(),
            x,
            y,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            text: id.to_uppercase(),
            color: DEFAULT_NODE_COLOR.to_string(),
        }
    }

    // a spans (0,0)-(200,80); b spans (0,300)-(200,380)
    fn editor() -> Editor {
        Editor::new(
            DiagramContent {
                nodes: vec![node("a", 0.0, 0.0), node("b", 0.0, 300.0)],
                connections: Vec::new(),
            },
            EditorSettings::default(),
        )
    }

    const A_BOTTOM: Point = Point::new(100.0, 80.0);
    const A_TOP: Point = Point::new(100.0, 0.0);
    const B_TOP: Point = Point::new(100.0, 300.0);

    fn connect_a_to_b(editor: &mut Editor) -> ConnectionId {
        editor.pointer_down(A_BOTTOM);
        editor.pointer_down(B_TOP);
        editor.content().connections[0].id.clone()
    }

    #[test]
    fn hit_test_priority() {
        let editor = editor();
        assert_eq!(
            editor.hit_test(Point::new(103.0, 77.0)),
            HitTarget::Port(Endpoint::new("a", PortId::center(Side::Bottom)))
        );
        assert_eq!(editor.hit_test(Point::new(60.0, 40.0)), HitTarget::Node("a".into()));
        assert_eq!(editor.hit_test(Point::new(600.0, 600.0)), HitTarget::Empty);
    }

    #[test]
    fn two_port_clicks_create_a_connection() {
        let mut editor = editor();
        editor.pointer_down(A_BOTTOM);
        assert!(matches!(editor.state(), InteractionState::ConnectingFrom(_)));

        // body clicks and self-loops keep the gesture pending
        editor.pointer_down(Point::new(60.0, 40.0));
        editor.pointer_down(A_TOP);
        assert!(matches!(editor.state(), InteractionState::ConnectingFrom(_)));
        assert!(editor.content().connections.is_empty());

        editor.pointer_down(B_TOP);
        assert!(editor.state().is_idle());
        let content = editor.content();
        assert_eq!(content.connections.len(), 1);
        assert_eq!(content.connections[0].from, "a");
        assert_eq!(content.connections[0].to_port, PortId::center(Side::Top));
    }

    #[test]
    fn escape_abandons_a_pending_connection() {
        let mut editor = editor();
        editor.pointer_down(A_BOTTOM);
        assert!(editor.key_down(Key::Escape, false));
        assert!(editor.state().is_idle());
        editor.pointer_down(Point::new(600.0, 600.0));
        editor.pointer_up();
        assert!(editor.content().connections.is_empty());
    }

    #[test]
    fn selected_connection_endpoint_starts_a_reconnect() {
        let mut editor = editor();
        let id = connect_a_to_b(&mut editor);
        editor.mutate(|content| {
            content.nodes.push(node("c", 400.0, 300.0));
            true
        });

        editor.pointer_down(Point::new(100.0, 190.0));
        assert_eq!(editor.selection(), &Selection::Connection(id.clone()));

        editor.pointer_down(B_TOP);
        assert_eq!(
            editor.state(),
            &InteractionState::Reconnecting {
                connection: id.clone(),
                end: ConnectionEnd::To
            }
        );

        editor.pointer_down(Point::new(500.0, 300.0));
        assert!(editor.state().is_idle());
        let content = editor.content();
        assert_eq!(content.connections.len(), 1);
        assert_eq!(content.connections[0].id, id);
        assert_eq!(content.connections[0].to, "c");
    }

    #[test]
    fn drag_snaps_and_pointer_up_ends_it() {
        let mut editor = editor();
        editor.pointer_down(Point::new(50.0, 40.0));
        assert_eq!(editor.selection(), &Selection::Node("a".into()));
        editor.pointer_move(Point::new(357.0, 243.0));
        {
            let content = editor.content();
            let a = content.node("a").unwrap();
            assert_eq!((a.x, a.y), (300.0, 200.0));
        }
        editor.pointer_up();
        assert!(editor.state().is_idle());
        assert!(editor.guides().is_empty());
    }

    #[test]
    fn empty_canvas_drag_pans() {
        let mut editor = editor();
        editor.pointer_down(Point::new(600.0, 600.0));
        editor.pointer_move(Point::new(650.0, 580.0));
        editor.pointer_up();
        assert_eq!(editor.viewport().offset_x, 50.0);
        assert_eq!(editor.viewport().offset_y, -20.0);
        assert!(editor.state().is_idle());
    }

    #[test]
    fn delete_key_respects_text_focus() {
        let mut editor = editor();
        connect_a_to_b(&mut editor);
        editor.pointer_down(Point::new(50.0, 40.0));
        editor.pointer_up();

        assert!(!editor.key_down(Key::Delete, true));
        assert_eq!(editor.content().nodes.len(), 2);
        assert!(editor.key_down(Key::Backspace, false));
        let content = editor.content();
        assert_eq!(content.nodes.len(), 1);
        assert!(content.connections.is_empty());
    }

    #[test]
    fn arrows_nudge_the_selected_node() {
        let mut editor = editor();
        editor.pointer_down(Point::new(50.0, 40.0));
        editor.pointer_up();
        assert!(editor.key_down(Key::ArrowRight, false));
        {
            let content = editor.content();
            let a = content.node("a").unwrap();
            assert_eq!((a.x, a.y), (GRID, 0.0));
        }
        editor.set_grid_snap(false);
        assert!(editor.key_down(Key::ArrowDown, false));
        {
            let content = editor.content();
            let a = content.node("a").unwrap();
            assert_eq!((a.x, a.y), (GRID, NUDGE_STEP_FREE));
        }
        assert!(editor.key_down(Key::ArrowUp, false));
        assert_eq!(editor.content().node("a").unwrap().origin(), Point::new(GRID, 0.0));
    }

    #[test]
    fn modal_edits_apply_and_close() {
        let mut editor = editor();
        editor.double_click(Point::new(60.0, 40.0));
        assert_eq!(editor.state(), &InteractionState::EditingNode("a".into()));

        // modal ignores pointer input
        editor.pointer_down(Point::new(600.0, 600.0));
        assert!(editor.state().is_modal());

        assert!(editor.commit_node_edit("Chief Executive", "#10b981"));
        assert!(editor.state().is_idle());
        let content = editor.content();
        let a = content.node("a").unwrap();
        assert_eq!(a.text, "Chief Executive");
        assert_eq!(a.color, "#10b981");
    }

    #[test]
    fn connection_modal_edits_label_style_and_color() {
        let mut editor = editor();
        let id = connect_a_to_b(&mut editor);

        // the route runs straight down x = 100 between the two nodes
        editor.double_click(Point::new(103.0, 190.0));
        assert_eq!(editor.state(), &InteractionState::EditingConnection(id.clone()));
        assert_eq!(editor.selection(), &Selection::Connection(id.clone()));

        assert!(editor.commit_connection_edit(
            Some("reports to"),
            LineStyle::Dotted,
            Some("#ef4444")
        ));
        assert!(editor.state().is_idle());
        {
            let content = editor.content();
            let conn = content.connection(&id).unwrap();
            assert_eq!(conn.label.as_deref(), Some("reports to"));
            assert_eq!(conn.line_style(), LineStyle::Dotted);
            assert_eq!(conn.color.as_deref(), Some("#ef4444"));
        }

        // nothing to commit once the modal is closed
        assert!(!editor.commit_connection_edit(None, LineStyle::Solid, None));
    }

    #[test]
    fn escape_closes_a_modal_without_applying() {
        let mut editor = editor();
        let id = connect_a_to_b(&mut editor);
        let rx = editor.subscribe();

        editor.double_click(Point::new(97.0, 190.0));
        assert_eq!(editor.state(), &InteractionState::EditingConnection(id.clone()));
        assert!(editor.key_down(Key::Escape, true));
        assert!(editor.state().is_idle());
        assert!(!editor.commit_connection_edit(Some("ignored"), LineStyle::Dashed, None));

        assert!(!rx.has_changed().unwrap());
        let content = editor.content();
        let conn = content.connection(&id).unwrap();
        assert_eq!(conn.label, None);
        assert_eq!(conn.line_style(), LineStyle::Solid);
    }

    #[test]
    fn subscribers_only_hear_real_changes() {
        let mut editor = editor();
        let mut rx = editor.subscribe();

        editor.pointer_down(Point::new(600.0, 600.0));
        editor.pointer_up();
        assert!(!rx.has_changed().unwrap());

        editor.add_node();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().nodes.len(), 3);
    }
}
