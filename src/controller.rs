//! High-level controller for flow editor applications.
//!
//! The [`FlowController`] owns the interaction engines of one flow and routes
//! raw pointer, keyboard and wheel input to them. Exactly one gesture runs at
//! a time ([`GestureState`]): a press on a handle connects, on a node body
//! drags, on the empty pane pans (or box-selects with shift).
//!
//! All input coordinates are window (screen) space; the controller converts
//! them with the current viewport and the container offset.
//!
//! # Example
//!
//! ```ignore
//! use slint_flow::{FlowConfig, FlowController};
//!
//! slint::include_modules!();
//!
//! fn main() {
//!     let window = MainWindow::new().unwrap();
//!     let ctrl = FlowController::with_config(FlowConfig::default()).unwrap();
//!
//!     // Pointer input
//!     window.on_node_pressed(ctrl.node_pressed_callback());
//!     window.on_handle_pressed(ctrl.handle_pressed_callback());
//!     window.on_pointer_moved(ctrl.pointer_moved_callback());
//!     window.on_pointer_released(ctrl.pointer_released_callback());
//!     window.on_wheel(ctrl.wheel_callback());
//!
//!     // Auto-pan and deferred fit_view
//!     let timer = slint::Timer::default();
//!     timer.start(slint::TimerMode::Repeated, std::time::Duration::from_millis(16), ctrl.animation_frame_callback());
//!
//!     let _sub = ctrl.store().subscribe({
//!         let w = window.as_weak();
//!         move |state| {
//!             if let Some(w) = w.upgrade() {
//!                 w.set_zoom(state.transform.zoom);
//!             }
//!         }
//!     });
//!
//!     window.run().unwrap();
//! }
//! ```

use crate::config::FlowConfig;
use crate::connection::{ConnectionEngine, HandleRef};
use crate::drag::DragEngine;
use crate::error::Result;
use crate::geometry::{self, calc_auto_pan, Rect, Transform, XYPosition};
use crate::graph::{Connection, EdgeId, HandleType, NodeId};
use crate::store::FlowStore;
use crate::viewport::ViewportController;
use slint::SharedString;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// What the pointer went down on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerTarget {
    Pane,
    Node(NodeId),
    Handle(HandleRef),
    Edge(EdgeId),
    /// An interactive element inside a node that must not start a drag.
    NoDrag(NodeId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers { shift: false, ctrl: false, meta: false };

    pub fn shift() -> Self {
        Self { shift: true, ..Self::NONE }
    }

    /// Whether a click should add to / toggle the selection.
    pub fn multi_select(&self) -> bool {
        self.shift || self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Delete,
    Backspace,
}

/// The single active gesture of the flow surface.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum GestureState {
    #[default]
    Idle,
    Dragging,
    Connecting,
    /// `last` is the previous window-space pointer.
    Panning { last: XYPosition, moved: bool },
    /// Box selection, corners in flow space.
    Selecting { start: XYPosition, current: XYPosition },
}

/// Controller that routes input to the flow engines and provides callback implementations.
///
/// Clone this controller to share it across callbacks.
#[derive(Clone)]
pub struct FlowController {
    store: FlowStore,
    connection: ConnectionEngine,
    drag: DragEngine,
    viewport: ViewportController,
    gesture: Rc<Cell<GestureState>>,
    /// Last window-space pointer position.
    pointer: Rc<Cell<XYPosition>>,
    container_offset: Rc<Cell<XYPosition>>,
    /// Box selection rectangle in flow space, for drawing.
    selection_rect: Rc<RefCell<Option<Rect>>>,
}

impl FlowController {
    pub fn new(store: FlowStore) -> Self {
        Self {
            connection: ConnectionEngine::new(store.clone()),
            drag: DragEngine::new(store.clone()),
            viewport: ViewportController::new(store.clone()),
            store,
            gesture: Rc::default(),
            pointer: Rc::default(),
            container_offset: Rc::default(),
            selection_rect: Rc::default(),
        }
    }

    /// Controller over a fresh store. Fails only on an invalid `config`.
    pub fn with_config(config: FlowConfig) -> Result<Self> {
        Ok(Self::new(FlowStore::new(config)?))
    }

    pub fn store(&self) -> &FlowStore {
        &self.store
    }

    pub fn connection(&self) -> &ConnectionEngine {
        &self.connection
    }

    pub fn drag(&self) -> &DragEngine {
        &self.drag
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn gesture(&self) -> GestureState {
        self.gesture.get()
    }

    pub fn selection_rect(&self) -> Option<Rect> {
        *self.selection_rect.borrow()
    }

    /// Window-space position of the flow container's top-left corner.
    pub fn set_container_offset(&self, offset: XYPosition) {
        self.container_offset.set(offset);
    }

    pub fn screen_to_flow(&self, point: XYPosition) -> XYPosition {
        geometry::screen_to_flow(point, self.store.transform(), self.container_offset.get())
    }

    pub fn flow_to_screen(&self, point: XYPosition) -> XYPosition {
        geometry::flow_to_screen(point, self.store.transform(), self.container_offset.get())
    }

    fn to_container(&self, point: XYPosition) -> XYPosition {
        point - self.container_offset.get()
    }

    // === Pointer input ===

    /// Pointer pressed on `target`. Ignored while another gesture runs.
    pub fn pointer_down(&self, target: PointerTarget, point: XYPosition, modifiers: Modifiers) -> bool {
        if self.gesture.get() != GestureState::Idle {
            tracing::debug!(?target, "pointer down ignored, a gesture is already running");
            return false;
        }
        self.pointer.set(point);
        let flow = self.screen_to_flow(point);
        let next = match target {
            PointerTarget::Handle(handle) => {
                self.connection.start(&handle, flow).then_some(GestureState::Connecting)
            }
            PointerTarget::Node(id) => self
                .drag
                .pointer_down(&id, flow, modifiers.multi_select())
                .then_some(GestureState::Dragging),
            PointerTarget::Edge(id) => {
                if self.store.get_state().config.elements_selectable {
                    self.store.select_edge_interaction(&id, modifiers.multi_select());
                }
                None
            }
            PointerTarget::NoDrag(_) => None,
            PointerTarget::Pane if modifiers.shift => Some(GestureState::Selecting { start: flow, current: flow }),
            PointerTarget::Pane => Some(GestureState::Panning { last: point, moved: false }),
        };
        match next {
            Some(gesture) => {
                self.gesture.set(gesture);
                true
            }
            None => false,
        }
    }

    pub fn pointer_move(&self, point: XYPosition) {
        self.pointer.set(point);
        let flow = self.screen_to_flow(point);
        match self.gesture.get() {
            GestureState::Idle => {}
            GestureState::Dragging => {
                self.drag.pointer_move(flow);
            }
            GestureState::Connecting => {
                self.connection.update(flow);
            }
            GestureState::Panning { last, moved } => {
                let moved = self.viewport.pan_by(point - last) || moved;
                self.gesture.set(GestureState::Panning { last: point, moved });
            }
            GestureState::Selecting { start, .. } => {
                self.gesture.set(GestureState::Selecting { start, current: flow });
                let rect = rect_between(start, flow);
                *self.selection_rect.borrow_mut() = Some(rect);
                self.store.select_in_rect(&rect, false, false);
            }
        }
    }

    pub fn pointer_up(&self, point: XYPosition) {
        self.pointer_move(point);
        match self.gesture.replace(GestureState::Idle) {
            GestureState::Idle => {}
            GestureState::Dragging => {
                self.drag.pointer_up();
            }
            GestureState::Connecting => {
                self.connection.end();
            }
            GestureState::Panning { moved, .. } => {
                if !moved {
                    self.store.clear_selection();
                }
            }
            GestureState::Selecting { .. } => {
                self.selection_rect.borrow_mut().take();
            }
        }
    }

    /// Click on a handle (click-to-connect).
    pub fn handle_click(&self, handle: &HandleRef) -> Option<Connection> {
        if !self.store.get_state().config.connect_on_click {
            return None;
        }
        self.connection.click(handle)
    }

    pub fn double_click(&self, point: XYPosition, modifiers: Modifiers) -> bool {
        self.viewport.double_click(self.to_container(point), modifiers.shift)
    }

    pub fn wheel(&self, point: XYPosition, delta: XYPosition, modifiers: Modifiers) -> bool {
        self.viewport.wheel(self.to_container(point), delta, modifiers.ctrl)
    }

    // === Keyboard input ===

    pub fn key_down(&self, key: Key, modifiers: Modifiers) -> bool {
        let gesture = self.gesture.get();
        match key {
            Key::Escape => match gesture {
                GestureState::Connecting => {
                    self.gesture.set(GestureState::Idle);
                    self.connection.cancel()
                }
                GestureState::Dragging => {
                    self.gesture.set(GestureState::Idle);
                    self.drag.cancel()
                }
                _ if self.connection.click_start().is_some() => self.connection.cancel_click(),
                _ => {
                    self.store.clear_selection();
                    true
                }
            },
            _ if gesture != GestureState::Idle => false,
            Key::ArrowUp => self.drag.nudge(XYPosition::new(0.0, -1.0), modifiers.shift),
            Key::ArrowDown => self.drag.nudge(XYPosition::new(0.0, 1.0), modifiers.shift),
            Key::ArrowLeft => self.drag.nudge(XYPosition::new(-1.0, 0.0), modifiers.shift),
            Key::ArrowRight => self.drag.nudge(XYPosition::new(1.0, 0.0), modifiers.shift),
            Key::Delete | Key::Backspace => {
                let (nodes, edges) = {
                    let state = self.store.get_state();
                    let nodes: Vec<String> = state.selected_nodes.iter().map(str::to_owned).collect();
                    let edges: Vec<String> = state.selected_edges.iter().map(str::to_owned).collect();
                    (nodes, edges)
                };
                let (removed_nodes, removed_edges) = self
                    .store
                    .delete_elements(nodes.iter().map(String::as_str), edges.iter().map(String::as_str));
                !removed_nodes.is_empty() || !removed_edges.is_empty()
            }
        }
    }

    // === Frame tick ===

    /// Per-frame work: auto-pan while dragging or connecting near the
    /// container edge, and settling a pending `fit_view`.
    pub fn animation_frame(&self) -> bool {
        let panned = self.auto_pan();
        let fitted = self.viewport.animation_frame().is_some();
        panned || fitted
    }

    fn auto_pan(&self) -> bool {
        let gesture = self.gesture.get();
        let (enabled, size, speed, margin) = {
            let state = self.store.get_state();
            let config = &state.config;
            let enabled = match gesture {
                GestureState::Dragging => config.auto_pan_on_node_drag && self.drag.is_dragging(),
                GestureState::Connecting => config.auto_pan_on_connect,
                _ => false,
            };
            (enabled, state.container_size(), config.auto_pan_speed, config.auto_pan_margin)
        };
        if !enabled {
            return false;
        }
        let delta = calc_auto_pan(self.to_container(self.pointer.get()), size, speed, margin);
        if delta == XYPosition::default() || !self.viewport.pan_by(delta) {
            return false;
        }
        // the pointer stayed put on screen but now sits over another flow point
        let flow = self.screen_to_flow(self.pointer.get());
        match gesture {
            GestureState::Dragging => {
                self.drag.pointer_move(flow);
            }
            GestureState::Connecting => {
                self.connection.update(flow);
            }
            _ => {}
        }
        true
    }

    // === Callback factories ===

    /// Callback for `node-pressed(id, x, y)`.
    pub fn node_pressed_callback(&self) -> impl Fn(SharedString, f32, f32) + Clone {
        let ctrl = self.clone();
        move |id, x, y| {
            ctrl.pointer_down(PointerTarget::Node(id.to_string()), XYPosition::new(x, y), Modifiers::NONE);
        }
    }

    /// Callback for `handle-pressed(node_id, handle_id, type, x, y)`.
    ///
    /// An empty `handle_id` is the node's default handle; `handle_type` is 0
    /// for source and 1 for target.
    pub fn handle_pressed_callback(&self) -> impl Fn(SharedString, SharedString, i32, f32, f32) + Clone {
        let ctrl = self.clone();
        move |node_id, handle_id, handle_type, x, y| {
            let handle_type = if handle_type == 0 { HandleType::Source } else { HandleType::Target };
            let handle_id = (!handle_id.is_empty()).then_some(handle_id.as_str());
            let handle = HandleRef::new(node_id.as_str(), handle_id, handle_type);
            ctrl.pointer_down(PointerTarget::Handle(handle), XYPosition::new(x, y), Modifiers::NONE);
        }
    }

    /// Callback for `pane-pressed(x, y, shift)`.
    pub fn pane_pressed_callback(&self) -> impl Fn(f32, f32, bool) + Clone {
        let ctrl = self.clone();
        move |x, y, shift| {
            let modifiers = Modifiers { shift, ..Modifiers::NONE };
            ctrl.pointer_down(PointerTarget::Pane, XYPosition::new(x, y), modifiers);
        }
    }

    /// Callback for `pointer-moved(x, y)`.
    pub fn pointer_moved_callback(&self) -> impl Fn(f32, f32) + Clone {
        let ctrl = self.clone();
        move |x, y| ctrl.pointer_move(XYPosition::new(x, y))
    }

    /// Callback for `pointer-released(x, y)`.
    pub fn pointer_released_callback(&self) -> impl Fn(f32, f32) + Clone {
        let ctrl = self.clone();
        move |x, y| ctrl.pointer_up(XYPosition::new(x, y))
    }

    /// Callback for `wheel(x, y, delta_x, delta_y, ctrl)`.
    pub fn wheel_callback(&self) -> impl Fn(f32, f32, f32, f32, bool) + Clone {
        let ctrl = self.clone();
        move |x, y, dx, dy, pinch| {
            let modifiers = Modifiers { ctrl: pinch, ..Modifiers::NONE };
            ctrl.wheel(XYPosition::new(x, y), XYPosition::new(dx, dy), modifiers);
        }
    }

    /// Callback for a repeating frame timer.
    pub fn animation_frame_callback(&self) -> impl Fn() + Clone {
        let ctrl = self.clone();
        move || {
            ctrl.animation_frame();
        }
    }

    /// Current viewport as `(x, y, zoom)`, for binding to UI properties.
    pub fn viewport_tuple(&self) -> (f32, f32, f32) {
        let Transform { x, y, zoom } = self.store.transform();
        (x, y, zoom)
    }
}

fn rect_between(a: XYPosition, b: XYPosition) -> Rect {
    Rect::new(a.x.min(b.x), a.y.min(b.y), (a.x - b.x).abs(), (a.y - b.y).abs())
}
