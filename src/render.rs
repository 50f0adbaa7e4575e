use std::fmt::Write;

use crate::diagram::{DiagramContent, LineStyle};
use crate::geometry::{Point, Rect, bounds_of};
use crate::ports::{PortPoint, ports, screen_rect};
use crate::router::{Route, route_connection};
use crate::utils::escape_xml;
use crate::viewport::Viewport;
use crate::*;

const SVG_MARGIN: f32 = 40.0;
const LABEL_CHAR_WIDTH: f32 = 7.4;
const LABEL_LINE_HEIGHT: f32 = 16.0;
const LABEL_PADDING: f32 = 12.0;
const LABEL_MIN_WIDTH: f32 = 32.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedNode {
    pub id: NodeId,
    pub rect: Rect,
    pub text: String,
    pub color: String,
    pub ports: Vec<PortPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedConnection {
    pub id: ConnectionId,
    pub route: Route,
    pub label: Option<String>,
    pub label_anchor: Point,
    pub color: String,
    pub style: LineStyle,
}

/// Everything needed to draw one frame, in screen coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub nodes: Vec<RenderedNode>,
    pub connections: Vec<RenderedConnection>,
}

impl Scene {
    /// Bounding box of every node and every route point.
    pub fn bounds(&self) -> Option<Rect> {
        let node_bounds = bounds_of(self.nodes.iter().map(|node| &node.rect));
        self.connections
            .iter()
            .flat_map(|conn| conn.route.points.iter())
            .fold(node_bounds, |acc, point| {
                let spot = Rect::spanning(*point, *point);
                Some(acc.map_or(spot, |rect| rect.union(&spot)))
            })
    }
}

/// Lays out the whole diagram under `viewport`.
///
/// Connections whose endpoints reference missing nodes are skipped.
pub fn render_scene(content: &DiagramContent, viewport: &Viewport) -> Scene {
    let nodes = content
        .nodes
        .iter()
        .map(|node| RenderedNode {
            id: node.id.clone(),
            rect: screen_rect(node, viewport),
            text: node.text.clone(),
            color: node.color.clone(),
            ports: ports(node, viewport),
        })
        .collect();

    let connections = content
        .connections
        .iter()
        .filter_map(|conn| {
            let Some(route) = route_connection(conn, content, viewport) else {
                tracing::warn!(
                    connection = %conn.id,
                    from = %conn.from,
                    to = %conn.to,
                    "skipping connection with a missing endpoint"
                );
                return None;
            };
            Some(RenderedConnection {
                id: conn.id.clone(),
                label_anchor: route.label_anchor(),
                route,
                label: conn.label.clone(),
                color: conn
                    .color
                    .clone()
                    .unwrap_or_else(|| DEFAULT_EDGE_COLOR.to_string()),
                style: conn.line_style(),
            })
        })
        .collect();

    Scene { nodes, connections }
}

/// Static SVG snapshot of a diagram at zoom 1, shifted so everything fits
/// with a margin.
pub fn render_svg(content: &DiagramContent, background: &str) -> Result<String> {
    let provisional = render_scene(content, &Viewport::default());
    let (viewport, width, height) = match provisional.bounds() {
        Some(bounds) => (
            Viewport {
                offset_x: SVG_MARGIN - bounds.min_x,
                offset_y: SVG_MARGIN - bounds.min_y,
                zoom: 1.0,
            },
            bounds.width() + SVG_MARGIN * 2.0,
            bounds.height() + SVG_MARGIN * 2.0,
        ),
        None => (Viewport::default(), SVG_MARGIN * 2.0, SVG_MARGIN * 2.0),
    };
    let scene = render_scene(content, &viewport);

    let mut svg = String::new();
    write!(
        svg,
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}" viewBox="0 0 {:.0} {:.0}" font-family="Inter, system-ui, sans-serif">
  <defs>
    <marker id="arrow-end" markerWidth="8" markerHeight="8" refX="6" refY="4" orient="auto" markerUnits="strokeWidth">
      <path d="M1,1 L6,4 L1,7 z" fill="context-stroke" />
    </marker>
  </defs>
  <rect width="100%" height="100%" fill="{}" />
"##,
        width,
        height,
        width,
        height,
        escape_xml(background)
    )?;

    for conn in &scene.connections {
        let dash_attr = conn
            .style
            .dash_array()
            .map(|dash| format!(" stroke-dasharray=\"{dash}\""))
            .unwrap_or_default();
        let points = conn
            .route
            .points
            .iter()
            .map(|p| format!("{:.1},{:.1}", p.x, p.y))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            svg,
            "  <polyline points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"2\" marker-end=\"url(#arrow-end)\"{} />",
            points,
            escape_xml(&conn.color),
            dash_attr
        )?;

        if let Some(label) = &conn.label {
            let lines: Vec<&str> = label.lines().collect();
            if lines.is_empty() {
                continue;
            }
            let longest = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);
            let box_width = (LABEL_CHAR_WIDTH * longest as f32 + LABEL_PADDING).max(LABEL_MIN_WIDTH);
            let box_height = LABEL_LINE_HEIGHT * lines.len() as f32 + LABEL_PADDING / 2.0;
            let center = conn.label_anchor;

            writeln!(
                svg,
                "  <g pointer-events=\"none\">\n    <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"6\" ry=\"6\" fill=\"white\" fill-opacity=\"0.96\" stroke=\"{}\" stroke-width=\"1\" />",
                center.x - box_width / 2.0,
                center.y - box_height / 2.0,
                box_width,
                box_height,
                escape_xml(&conn.color)
            )?;
            let start_y = center.y - LABEL_LINE_HEIGHT * (lines.len() as f32 - 1.0) / 2.0;
            for (idx, line) in lines.iter().enumerate() {
                writeln!(
                    svg,
                    "    <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#1e293b\" font-size=\"12\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>",
                    center.x,
                    start_y + LABEL_LINE_HEIGHT * idx as f32,
                    escape_xml(line)
                )?;
            }
            svg.push_str("  </g>\n");
        }
    }

    for node in &scene.nodes {
        let center = node.rect.center();
        writeln!(
            svg,
            "  <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"8\" ry=\"8\" fill=\"{}\" stroke=\"#1e293b\" stroke-width=\"1\" />",
            node.rect.min_x,
            node.rect.min_y,
            node.rect.width(),
            node.rect.height(),
            escape_xml(&node.color)
        )?;
        writeln!(
            svg,
            "  <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#ffffff\" font-size=\"14\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>",
            center.x,
            center.y,
            escape_xml(&node.text)
        )?;
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}
