//! Level 6: Viewport Tests
//!
//! Tests panning, wheel and double-click zoom, translate extents, auto-pan
//! and the deferred, coalesced fit_view.

mod common;

use common::harness::FlowTestHarness;
use slint_flow::{
    CoordinateExtent, FitViewOptions, FlowConfig, HandleType, Modifiers, Transform, XYPosition,
};

const EPS: f32 = 1e-3;

fn approx(a: XYPosition, b: XYPosition) -> bool {
    (a.x - b.x).abs() < EPS && (a.y - b.y).abs() < EPS
}

#[test]
fn test_pane_drag_pans() {
    let harness = FlowTestHarness::new();
    harness.drag_pane(XYPosition::new(800.0, 600.0), XYPosition::new(750.0, 630.0), Modifiers::NONE);
    assert_eq!(harness.viewport(), Transform::new(-50.0, 30.0, 1.0));
    assert_eq!(*harness.tracker.viewport_change.borrow().last().unwrap(), Transform::new(-50.0, 30.0, 1.0));
}

#[test]
fn test_wheel_zoom_keeps_cursor_point() {
    let harness = FlowTestHarness::new();
    let cursor = XYPosition::new(500.0, 400.0);
    let before = harness.ctrl.screen_to_flow(cursor);
    harness.scroll(cursor, -100.0);

    assert!(harness.viewport().zoom > 1.0);
    assert!(approx(harness.ctrl.screen_to_flow(cursor), before));
}

#[test]
fn test_zoom_clamped_to_limits() {
    let harness = FlowTestHarness::new();
    for _ in 0..50 {
        harness.scroll(XYPosition::new(100.0, 100.0), -500.0);
    }
    assert_eq!(harness.viewport().zoom, 2.0);
    for _ in 0..50 {
        harness.scroll(XYPosition::new(100.0, 100.0), 500.0);
    }
    assert_eq!(harness.viewport().zoom, 0.5);
}

#[test]
fn test_pan_on_scroll() {
    let harness = FlowTestHarness::with_config(FlowConfig { pan_on_scroll: true, ..FlowConfig::default() });
    harness.scroll(XYPosition::new(500.0, 400.0), 100.0);
    assert_eq!(harness.viewport(), Transform::new(0.0, -50.0, 1.0));
}

#[test]
fn test_double_click_zooms_in() {
    let harness = FlowTestHarness::new();
    assert!(harness.ctrl.double_click(XYPosition::new(0.0, 0.0), Modifiers::NONE));
    assert_eq!(harness.viewport(), Transform::new(0.0, 0.0, 2.0));
    assert!(harness.ctrl.double_click(XYPosition::new(0.0, 0.0), Modifiers::shift()));
    assert_eq!(harness.viewport().zoom, 1.0);
}

#[test]
fn test_zoom_helpers() {
    let harness = FlowTestHarness::new();
    let viewport = harness.ctrl.viewport();
    viewport.zoom_in();
    assert!((harness.viewport().zoom - 1.2).abs() < EPS);
    viewport.zoom_to(0.5);
    assert_eq!(harness.viewport().zoom, 0.5);

    viewport.set_center(100.0, 100.0, Some(1.0));
    assert_eq!(harness.viewport(), Transform::new(400.0, 300.0, 1.0));
}

#[test]
fn test_unchanged_viewport_is_not_reported() {
    let harness = FlowTestHarness::new();
    harness.ctrl.viewport().set_viewport(Transform::IDENTITY);
    assert!(harness.tracker.viewport_change.borrow().is_empty());
}

#[test]
fn test_translate_extent_limits_panning() {
    let config = FlowConfig {
        translate_extent: CoordinateExtent([[0.0, 0.0], [1000.0, 800.0]]),
        ..FlowConfig::default()
    };
    let harness = FlowTestHarness::with_config(config);
    assert!(!harness.ctrl.viewport().pan_by(XYPosition::new(100.0, 0.0)));
    assert_eq!(harness.viewport(), Transform::IDENTITY);
}

#[test]
fn test_container_offset() {
    let harness = FlowTestHarness::new();
    harness.ctrl.set_container_offset(XYPosition::new(200.0, 50.0));
    // node 1 center (175, 150) is drawn offset by the container position
    assert_eq!(harness.node_center("1"), XYPosition::new(375.0, 200.0));
    harness.drag_node("1", 10.0, 10.0);
    assert_eq!(harness.node_position("1"), XYPosition::new(110.0, 110.0));
}

// ============================================================================
// fit_view
// ============================================================================

#[test]
fn test_fit_view_is_deferred() {
    let harness = FlowTestHarness::new();
    let handle = harness.ctrl.viewport().fit_view(FitViewOptions::default());

    assert!(handle.is_pending());
    assert_eq!(harness.viewport(), Transform::IDENTITY);
    assert!(harness.pump_frame());
    assert_eq!(handle.result(), Some(true));
    // bounds 450x200 centered, zoom limited by max_zoom
    assert_eq!(harness.viewport(), Transform::new(-150.0, 0.0, 2.0));
}

#[test]
fn test_fit_view_coalesces() {
    let harness = FlowTestHarness::new();
    let first = harness.ctrl.viewport().fit_view(FitViewOptions::default());
    let second = harness.ctrl.viewport().fit_view(FitViewOptions {
        nodes: Some(vec!["2".into()]),
        padding: 25.0,
        ..FitViewOptions::default()
    });

    assert_eq!(first.result(), Some(false));
    assert!(second.is_pending());
    harness.pump_frame();
    assert_eq!(second.result(), Some(true));
    assert_eq!(harness.viewport(), Transform::new(-450.0, -100.0, 2.0));
    // only the surviving call moved the view
    assert_eq!(harness.tracker.viewport_change.borrow().len(), 1);
}

#[test]
fn test_fit_view_without_nodes() {
    let harness = FlowTestHarness::with_nodes_and_edges(FlowConfig::default(), vec![], vec![]);
    let handle = harness.ctrl.viewport().fit_view(FitViewOptions::default());
    harness.pump_frame();
    assert_eq!(handle.result(), Some(false));
}

// ============================================================================
// Auto-pan
// ============================================================================

#[test]
fn test_auto_pan_while_dragging() {
    let harness = FlowTestHarness::new();
    harness.mouse_down_on_node("1", harness.node_center("1"), Modifiers::NONE);
    harness.mouse_move(XYPosition::new(995.0, 400.0));
    let before = harness.node_position("1");

    assert!(harness.pump_frame());
    assert!(harness.viewport().x < 0.0);
    assert!(harness.node_position("1").x > before.x);
}

#[test]
fn test_auto_pan_disabled_for_connections() {
    let harness = FlowTestHarness::with_config(FlowConfig { auto_pan_on_connect: false, ..FlowConfig::default() });
    harness.mouse_down_on_handle("1", HandleType::Source);
    harness.mouse_move(XYPosition::new(995.0, 400.0));

    assert!(!harness.pump_frame());
    assert_eq!(harness.viewport(), Transform::IDENTITY);
}

#[test]
fn test_no_auto_pan_when_idle() {
    let harness = FlowTestHarness::new();
    harness.mouse_move(XYPosition::new(995.0, 400.0));
    assert!(!harness.pump_frame());
}
