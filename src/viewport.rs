//! Pan/zoom state transitions.
//!
//! The viewport is the store's [`Transform`]: a flow point `p` is drawn at
//! `p * zoom + (x, y)` in container space. Every change goes through
//! [`ViewportController::set_viewport`], which clamps the zoom to
//! `[min_zoom, max_zoom]`, keeps the view inside `translate_extent` and emits
//! `on_viewport_change`.
//!
//! `fit_view` is deferred: it returns a [`FitViewHandle`] that settles on the
//! next [`animation_frame`](ViewportController::animation_frame), once the UI
//! has had a chance to measure nodes. A newer call settles older pending ones
//! with `false`.

use crate::geometry::{clamp, CoordinateExtent, Rect, Transform, XYPosition};
use crate::graph::NodeId;
use crate::store::{FlowStore, StatePatch};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Factor applied by `zoom_in` / `zoom_out`.
pub const ZOOM_STEP: f32 = 1.2;

/// Wheel delta (pixels) to zoom exponent, base 2.
const WHEEL_ZOOM_SPEED: f32 = 0.002;
/// Pinch gestures arrive as small ctrl+wheel deltas.
const PINCH_ZOOM_MULTIPLIER: f32 = 10.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitViewOptions {
    /// Flow units added on every side of the bounds.
    pub padding: f32,
    pub include_hidden: bool,
    /// Restrict the fit to these nodes.
    pub nodes: Option<Vec<NodeId>>,
    pub min_zoom: Option<f32>,
    pub max_zoom: Option<f32>,
}

/// Deferred result of [`ViewportController::fit_view`].
#[derive(Debug, Clone, Default)]
pub struct FitViewHandle(Rc<Cell<Option<bool>>>);

impl FitViewHandle {
    /// `None` while pending; `Some(false)` if there was nothing to fit or a
    /// newer `fit_view` superseded this one.
    pub fn result(&self) -> Option<bool> {
        self.0.get()
    }

    pub fn is_pending(&self) -> bool {
        self.0.get().is_none()
    }

    fn settle(&self, value: bool) {
        self.0.set(Some(value));
    }
}

struct PendingFit {
    options: FitViewOptions,
    handle: FitViewHandle,
}

/// Viewport that shows `bounds` centered in a `width` x `height` container.
pub fn get_viewport_for_bounds(
    bounds: &Rect,
    width: f32,
    height: f32,
    min_zoom: f32,
    max_zoom: f32,
    padding: f32,
) -> Transform {
    let zoom_x = width / (bounds.width + 2.0 * padding);
    let zoom_y = height / (bounds.height + 2.0 * padding);
    let zoom = clamp(zoom_x.min(zoom_y), min_zoom, max_zoom);
    let center = bounds.center();
    Transform::new(width / 2.0 - center.x * zoom, height / 2.0 - center.y * zoom, zoom)
}

/// Keep a `width` x `height` view inside `extent` (d3-zoom's default
/// constraint): a view larger than the extent is centered on it.
pub fn constrain_transform(transform: Transform, width: f32, height: f32, extent: &CoordinateExtent) -> Transform {
    if extent.is_infinite() {
        return transform;
    }
    let zoom = transform.safe_zoom();
    let (min, max) = (extent.min(), extent.max());
    let dx0 = -transform.x / zoom - min.x;
    let dx1 = (width - transform.x) / zoom - max.x;
    let dy0 = -transform.y / zoom - min.y;
    let dy1 = (height - transform.y) / zoom - max.y;
    Transform::new(
        transform.x + zoom * constrain_axis(dx0, dx1),
        transform.y + zoom * constrain_axis(dy0, dy1),
        transform.zoom,
    )
}

fn constrain_axis(d0: f32, d1: f32) -> f32 {
    if d1 > d0 {
        (d0 + d1) / 2.0
    } else if d0 < 0.0 {
        d0
    } else {
        d1.max(0.0)
    }
}

/// Viewport operations on a [`FlowStore`]. Clone it to share it.
#[derive(Clone)]
pub struct ViewportController {
    store: FlowStore,
    pending_fit: Rc<RefCell<Option<PendingFit>>>,
}

impl ViewportController {
    pub fn new(store: FlowStore) -> Self {
        Self { store, pending_fit: Rc::default() }
    }

    pub fn get_viewport(&self) -> Transform {
        self.store.transform()
    }

    /// Apply `transform` after clamping and constraining it; returns what was applied.
    pub fn set_viewport(&self, transform: Transform) -> Transform {
        let (next, changed) = {
            let state = self.store.get_state();
            let clamped = Transform::new(transform.x, transform.y, state.config.clamp_zoom(transform.zoom));
            let next = constrain_transform(clamped, state.width, state.height, &state.config.translate_extent);
            (next, next != state.transform)
        };
        if changed {
            tracing::trace!(x = next.x, y = next.y, zoom = next.zoom, "viewport changed");
            self.store.set_state(StatePatch::transform(next));
            self.store.events().viewport_change(next);
        }
        next
    }

    /// Translate by a container-space delta. Returns whether the view moved.
    pub fn pan_by(&self, delta: XYPosition) -> bool {
        let current = self.get_viewport();
        let next = Transform::new(current.x + delta.x, current.y + delta.y, current.zoom);
        self.set_viewport(next) != current
    }

    /// Zoom to `zoom` keeping container-space `point` fixed.
    pub fn zoom_at(&self, point: XYPosition, zoom: f32) -> Transform {
        let current = self.get_viewport();
        let zoom = self.store.get_state().config.clamp_zoom(zoom);
        let k = zoom / current.safe_zoom();
        self.set_viewport(Transform::new(
            point.x - (point.x - current.x) * k,
            point.y - (point.y - current.y) * k,
            zoom,
        ))
    }

    fn center(&self) -> XYPosition {
        let size = self.store.get_state().container_size();
        XYPosition::new(size.width / 2.0, size.height / 2.0)
    }

    pub fn zoom_by(&self, factor: f32) -> Transform {
        self.zoom_at(self.center(), self.get_viewport().zoom * factor)
    }

    pub fn zoom_in(&self) -> Transform {
        self.zoom_by(ZOOM_STEP)
    }

    pub fn zoom_out(&self) -> Transform {
        self.zoom_by(1.0 / ZOOM_STEP)
    }

    pub fn zoom_to(&self, zoom: f32) -> Transform {
        self.zoom_at(self.center(), zoom)
    }

    /// Put flow point `(x, y)` at the container center. Zoom defaults to `max_zoom`.
    pub fn set_center(&self, x: f32, y: f32, zoom: Option<f32>) -> Transform {
        let (size, zoom) = {
            let state = self.store.get_state();
            (state.container_size(), state.config.clamp_zoom(zoom.unwrap_or(state.config.max_zoom)))
        };
        self.set_viewport(Transform::new(size.width / 2.0 - x * zoom, size.height / 2.0 - y * zoom, zoom))
    }

    /// Wheel at container-space `point`. Zooms towards the cursor, or pans in
    /// pan-on-scroll mode (pinch always zooms).
    pub fn wheel(&self, point: XYPosition, delta: XYPosition, pinch: bool) -> bool {
        let (zoom_on_scroll, pan_on_scroll, pan_speed) = {
            let state = self.store.get_state();
            (state.config.zoom_on_scroll, state.config.pan_on_scroll, state.config.pan_on_scroll_speed)
        };
        if pan_on_scroll && !pinch {
            return self.pan_by(XYPosition::new(-delta.x * pan_speed, -delta.y * pan_speed));
        }
        if !zoom_on_scroll && !pinch {
            return false;
        }
        let current = self.get_viewport();
        let exponent = -delta.y * WHEEL_ZOOM_SPEED * if pinch { PINCH_ZOOM_MULTIPLIER } else { 1.0 };
        self.zoom_at(point, current.zoom * exponent.exp2()) != current
    }

    /// Double-click at container-space `point`: zoom in (out with `shift`).
    pub fn double_click(&self, point: XYPosition, shift: bool) -> bool {
        if !self.store.get_state().config.zoom_on_double_click {
            return false;
        }
        let current = self.get_viewport();
        let factor = if shift { 0.5 } else { 2.0 };
        self.zoom_at(point, current.zoom * factor) != current
    }

    /// Fit `bounds` (flow space) with `padding` flow units per side.
    pub fn fit_bounds(&self, bounds: &Rect, padding: f32) -> Transform {
        let transform = {
            let state = self.store.get_state();
            get_viewport_for_bounds(
                bounds,
                state.width,
                state.height,
                state.config.min_zoom,
                state.config.max_zoom,
                padding,
            )
        };
        self.set_viewport(transform)
    }

    /// Queue a fit of the nodes' bounds for the next animation frame.
    pub fn fit_view(&self, options: FitViewOptions) -> FitViewHandle {
        let handle = FitViewHandle::default();
        let previous = self
            .pending_fit
            .borrow_mut()
            .replace(PendingFit { options, handle: handle.clone() });
        if let Some(previous) = previous {
            tracing::debug!("fit_view superseded");
            previous.handle.settle(false);
        }
        handle
    }

    pub fn has_pending_fit(&self) -> bool {
        self.pending_fit.borrow().is_some()
    }

    /// Settle a pending `fit_view`. Returns its result, `None` if none was queued.
    pub fn animation_frame(&self) -> Option<bool> {
        let pending = self.pending_fit.borrow_mut().take()?;
        let fitted = self.fit_now(&pending.options);
        pending.handle.settle(fitted);
        Some(fitted)
    }

    fn fit_now(&self, options: &FitViewOptions) -> bool {
        let target = {
            let state = self.store.get_state();
            let bounds = state.nodes_bounds(|n| {
                n.node.is_measured()
                    && (options.include_hidden || !n.node.hidden)
                    && options.nodes.as_ref().map_or(true, |ids| ids.contains(&n.node.id))
            });
            let (width, height) = (state.width, state.height);
            bounds.filter(|_| width > 0.0 && height > 0.0).map(|bounds| {
                let min_zoom = options.min_zoom.unwrap_or(state.config.min_zoom);
                let max_zoom = options.max_zoom.unwrap_or(state.config.max_zoom);
                get_viewport_for_bounds(&bounds, width, height, min_zoom, max_zoom, options.padding)
            })
        };
        match target {
            Some(transform) => {
                self.set_viewport(transform);
                true
            }
            None => {
                tracing::debug!("fit_view: nothing to fit");
                false
            }
        }
    }
}
