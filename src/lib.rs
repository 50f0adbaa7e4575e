pub mod autosave;
pub mod client;
pub mod connections;
pub mod diagram;
pub mod geometry;
pub mod interaction;
pub mod nodes;
pub mod ports;
pub mod render;
pub mod router;
pub mod utils;
pub mod viewport;

#[cfg(feature = "server")]
pub mod credentials;
#[cfg(feature = "server")]
pub mod database;
#[cfg(feature = "server")]
pub mod export;
#[cfg(feature = "server")]
pub mod records;
#[cfg(feature = "server")]
pub mod serve;

pub use anyhow::{Context, Result, anyhow, bail};

pub use autosave::{AUTOSAVE_DELAY, Autosave, DiagramBackend, SaveTransport};
pub use client::{ClientError, DiagramClient};
pub use diagram::{
    Connection, ConnectionEnd, ConnectionId, DiagramContent, DiagramRecord, DiagramSummary,
    Endpoint, LineStyle, Node, NodeId,
};
pub use geometry::{Point, Rect, Side};
pub use interaction::{Editor, EditorSettings, HitTarget, InteractionState, Key, Selection};
pub use nodes::{Dimension, Guide, GuideAxis, ResizeDirection, Snap};
pub use ports::{PortId, PortPoint, ports};
pub use render::{RenderedConnection, RenderedNode, Scene, render_scene, render_svg};
pub use router::{Anchor, Route, RouteMode, label_anchor, route_between, route_connection};
pub use viewport::Viewport;

/// Grid unit in world coordinates.
pub const GRID: f32 = 20.0;
pub const MIN_WIDTH: f32 = 100.0;
pub const MIN_HEIGHT: f32 = 60.0;
pub const DEFAULT_WIDTH: f32 = 200.0;
pub const DEFAULT_HEIGHT: f32 = 80.0;
pub const RESIZE_STEP: f32 = 20.0;
/// Arrow-key step when grid snapping is off.
pub const NUDGE_STEP_FREE: f32 = 5.0;
pub const ALIGN_THRESHOLD: f32 = 8.0;

pub const ZOOM_MIN: f32 = 0.1;
pub const ZOOM_MAX: f32 = 3.0;
pub const WHEEL_ZOOM_OUT: f32 = 0.9;
pub const WHEEL_ZOOM_IN: f32 = 1.1;

/// Distance a route leaves a port along its normal before bending.
pub const PORT_STANDOFF: f32 = 30.0;
pub const ROUTE_CLEARANCE: f32 = 10.0;

pub const PORT_HIT_RADIUS: f32 = 8.0;
pub const EDGE_HIT_TOLERANCE: f32 = 6.0;

pub const DEFAULT_NODE_TEXT: &str = "New Node";
pub const DEFAULT_NODE_COLOR: &str = "#3b82f6";
pub const DEFAULT_EDGE_COLOR: &str = "#475569";

const STAGGER_ORIGIN: f32 = 100.0;
const STAGGER_STEP: f32 = 40.0;
const STAGGER_SLOTS: usize = 8;
