//! Level 4: Selection Tests
//!
//! Tests click selection, edge selection, box selection and the selection
//! change events.

mod common;

use common::harness::FlowTestHarness;
use slint_flow::{FlowConfig, Modifiers, Node, PointerTarget, Rect, XYPosition};

#[test]
fn test_edge_click_selects_edge() {
    let harness = FlowTestHarness::new();
    harness.click_node("1", Modifiers::NONE);
    harness.mouse_down(PointerTarget::Edge("e1-2".into()), XYPosition::new(300.0, 200.0));

    assert_eq!(harness.selected_edge_ids(), vec!["e1-2"]);
    // a plain edge click replaces the node selection
    assert!(harness.selected_node_ids().is_empty());
}

#[test]
fn test_edge_click_with_modifier_keeps_nodes() {
    let harness = FlowTestHarness::new();
    harness.click_node("1", Modifiers::NONE);
    harness.ctrl.pointer_down(
        PointerTarget::Edge("e1-2".into()),
        XYPosition::new(300.0, 200.0),
        Modifiers { ctrl: true, ..Modifiers::NONE },
    );

    assert_eq!(harness.selected_node_ids(), vec!["1"]);
    assert_eq!(harness.selected_edge_ids(), vec!["e1-2"]);
}

#[test]
fn test_pane_click_clears_selection() {
    let harness = FlowTestHarness::new();
    harness.ctrl.store().select_nodes(["1", "2"]);
    harness.drag_pane(XYPosition::new(900.0, 700.0), XYPosition::new(900.0, 700.0), Modifiers::NONE);
    assert!(harness.selected_node_ids().is_empty());
}

#[test]
fn test_box_selection_full_containment() {
    let harness = FlowTestHarness::new();
    // covers all of node 1 and half of node 2
    harness.drag_pane(XYPosition::new(50.0, 50.0), XYPosition::new(475.0, 350.0), Modifiers::shift());

    assert_eq!(harness.selected_node_ids(), vec!["1"]);
    // edges touching selected nodes come along
    assert_eq!(harness.selected_edge_ids(), vec!["e1-2"]);
    assert_eq!(harness.ctrl.selection_rect(), None);
}

#[test]
fn test_box_selection_live_rect() {
    let harness = FlowTestHarness::new();
    harness.ctrl.pointer_down(PointerTarget::Pane, XYPosition::new(600.0, 600.0), Modifiers::shift());
    harness.mouse_move(XYPosition::new(50.0, 50.0));

    assert_eq!(harness.ctrl.selection_rect(), Some(Rect::new(50.0, 50.0, 550.0, 550.0)));
    assert_eq!(harness.selected_node_ids(), vec!["1", "2"]);
}

#[test]
fn test_box_selection_skips_hidden_nodes() {
    let harness = FlowTestHarness::new();
    harness.ctrl.store().update_node("2", |n| n.hidden = true);
    harness.drag_pane(XYPosition::new(0.0, 0.0), XYPosition::new(900.0, 700.0), Modifiers::shift());
    assert_eq!(harness.selected_node_ids(), vec!["1"]);
}

#[test]
fn test_unselectable_node_ignored() {
    let mut fixed = Node::new("fixed", XYPosition::new(0.0, 0.0));
    fixed.selectable = Some(false);
    let harness = FlowTestHarness::with_nodes_and_edges(FlowConfig::default(), vec![fixed], vec![]);
    harness.click_node("fixed", Modifiers::NONE);

    assert!(harness.selected_node_ids().is_empty());
    // it's still a click
    assert_eq!(*harness.tracker.node_click.borrow(), vec!["fixed"]);
}

#[test]
fn test_elements_not_selectable() {
    let harness = FlowTestHarness::with_config(FlowConfig { elements_selectable: false, ..FlowConfig::default() });
    harness.click_node("1", Modifiers::NONE);
    harness.mouse_down(PointerTarget::Edge("e1-2".into()), XYPosition::new(300.0, 200.0));

    assert!(harness.selected_node_ids().is_empty());
    assert!(harness.selected_edge_ids().is_empty());
}

#[test]
fn test_selection_change_events() {
    let harness = FlowTestHarness::new();
    harness.click_node("1", Modifiers::NONE);
    harness.click_node("2", Modifiers::shift());
    // re-selecting the same set does not emit
    harness.ctrl.store().select_nodes(["1", "2"]);

    let changes = harness.tracker.selection_change.borrow();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[1].nodes, vec!["1", "2"]);
}

#[test]
fn test_selected_flag_mirrors_selection() {
    let harness = FlowTestHarness::new();
    harness.click_node("2", Modifiers::NONE);

    let store = harness.ctrl.store();
    assert!(store.node("2").unwrap().selected);
    assert!(!store.node("1").unwrap().selected);
    assert!(store.get_state().selected_nodes.contains("2"));
}

#[test]
fn test_selected_node_elevated() {
    let harness = FlowTestHarness::new();
    let before = harness.ctrl.store().internal_node("1").unwrap().z;
    harness.click_node("1", Modifiers::NONE);
    assert!(harness.ctrl.store().internal_node("1").unwrap().z > before);
}
