//! Recognized flow options.
//!
//! Every field has a default, so a host can load a partial JSON object:
//!
//! ```ignore
//! let config = FlowConfig::from_json(r#"{ "connectionMode": "loose", "maxZoom": 4 }"#)?;
//! ```

use crate::error::{FlowError, Result};
use crate::geometry::CoordinateExtent;
use serde::{Deserialize, Serialize};

/// How handle types may be paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Source handles connect only to target handles.
    #[default]
    Strict,
    /// Any pairing except a handle with itself.
    Loose,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowConfig {
    pub connection_mode: ConnectionMode,
    /// Flow-space distance within which a handle snaps the pending connection.
    pub connection_radius: f32,
    /// Flow-space pointer travel before a press on a node becomes a drag.
    pub node_drag_threshold: f32,
    pub select_nodes_on_drag: bool,
    pub snap_to_grid: bool,
    pub snap_grid: [f32; 2],
    #[serde(skip_serializing_if = "CoordinateExtent::is_infinite")]
    pub node_extent: CoordinateExtent,
    #[serde(skip_serializing_if = "CoordinateExtent::is_infinite")]
    pub translate_extent: CoordinateExtent,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub nodes_draggable: bool,
    pub nodes_connectable: bool,
    pub elements_selectable: bool,
    pub connect_on_click: bool,
    pub auto_pan_on_node_drag: bool,
    pub auto_pan_on_connect: bool,
    pub auto_pan_speed: f32,
    /// Width of the container border region that triggers auto-pan.
    pub auto_pan_margin: f32,
    pub zoom_on_scroll: bool,
    pub pan_on_scroll: bool,
    pub pan_on_scroll_speed: f32,
    pub zoom_on_double_click: bool,
    pub elevate_nodes_on_select: bool,
    /// Store applies node changes itself (uncontrolled nodes).
    pub has_default_nodes: bool,
    /// Store appends new connections as edges itself (uncontrolled edges).
    pub has_default_edges: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            connection_mode: ConnectionMode::Strict,
            connection_radius: 20.0,
            node_drag_threshold: 1.0,
            select_nodes_on_drag: true,
            snap_to_grid: false,
            snap_grid: [15.0, 15.0],
            node_extent: CoordinateExtent::INFINITE,
            translate_extent: CoordinateExtent::INFINITE,
            min_zoom: 0.5,
            max_zoom: 2.0,
            nodes_draggable: true,
            nodes_connectable: true,
            elements_selectable: true,
            connect_on_click: true,
            auto_pan_on_node_drag: true,
            auto_pan_on_connect: true,
            auto_pan_speed: 15.0,
            auto_pan_margin: 40.0,
            zoom_on_scroll: true,
            pan_on_scroll: false,
            pan_on_scroll_speed: 0.5,
            zoom_on_double_click: true,
            elevate_nodes_on_select: true,
            has_default_nodes: true,
            has_default_edges: true,
        }
    }
}

impl FlowConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: FlowConfig =
            serde_json::from_str(json).map_err(|e| FlowError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_zoom.is_nan() || self.min_zoom <= 0.0 {
            return Err(FlowError::InvalidConfig(format!("minZoom must be positive, got {}", self.min_zoom)));
        }
        if self.min_zoom > self.max_zoom {
            return Err(FlowError::InvalidConfig(format!(
                "minZoom {} is greater than maxZoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.connection_radius < 0.0 {
            return Err(FlowError::InvalidConfig("connectionRadius must not be negative".into()));
        }
        if self.node_drag_threshold < 0.0 {
            return Err(FlowError::InvalidConfig("nodeDragThreshold must not be negative".into()));
        }
        if self.snap_grid.iter().any(|g| g.is_nan() || *g <= 0.0) {
            return Err(FlowError::InvalidConfig("snapGrid entries must be positive".into()));
        }
        Ok(())
    }

    pub fn clamp_zoom(&self, zoom: f32) -> f32 {
        crate::geometry::clamp(zoom, self.min_zoom, self.max_zoom)
    }
}
