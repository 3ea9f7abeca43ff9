//! Coordinate spaces and rectangle math.
//!
//! Three spaces are involved:
//! - **screen**: pointer coordinates as delivered by the windowing system,
//! - **container**: screen minus the top-left corner of the flow container,
//! - **flow**: the world space nodes live in, independent of pan and zoom.
//!
//! A [`Transform`] `[x, y, zoom]` maps flow to container space:
//! `container = flow * zoom + translate`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct XYPosition {
    pub x: f32,
    pub y: f32,
}

impl XYPosition {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: XYPosition) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl std::ops::Add for XYPosition {
    type Output = XYPosition;
    fn add(self, rhs: XYPosition) -> XYPosition {
        XYPosition::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for XYPosition {
    type Output = XYPosition;
    fn sub(self, rhs: XYPosition) -> XYPosition {
        XYPosition::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f32,
    pub height: f32,
}

impl Dimensions {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle (x, y is the top-left corner).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_position(position: XYPosition, dimensions: Dimensions) -> Self {
        Self::new(position.x, position.y, dimensions.width, dimensions.height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> XYPosition {
        XYPosition::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, point: XYPosition) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }

    /// Area of the overlap between two rectangles (0 when disjoint).
    pub fn overlapping_area(&self, other: &Rect) -> f32 {
        let x_overlap = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let y_overlap = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0);
        x_overlap * y_overlap
    }
}

/// `[x, y, zoom]`: translation in screen pixels plus a scalar zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform { x: 0.0, y: 0.0, zoom: 1.0 };

    pub const fn new(x: f32, y: f32, zoom: f32) -> Self {
        Self { x, y, zoom }
    }

    /// Zoom guarded against zero so conversions never divide by it.
    pub fn safe_zoom(&self) -> f32 {
        if self.zoom > 0.0 {
            self.zoom
        } else {
            1.0
        }
    }
}

/// Side of a node a handle or edge endpoint sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    #[default]
    Top,
    Right,
    Bottom,
    Left,
}

impl Position {
    pub fn opposite(&self) -> Position {
        match self {
            Position::Top => Position::Bottom,
            Position::Right => Position::Left,
            Position::Bottom => Position::Top,
            Position::Left => Position::Right,
        }
    }
}

/// `[[min_x, min_y], [max_x, max_y]]` bounds used for node and translate extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateExtent(pub [[f32; 2]; 2]);

impl CoordinateExtent {
    pub const INFINITE: CoordinateExtent = CoordinateExtent([
        [f32::NEG_INFINITY, f32::NEG_INFINITY],
        [f32::INFINITY, f32::INFINITY],
    ]);

    pub fn from_rect(rect: &Rect) -> Self {
        CoordinateExtent([[rect.x, rect.y], [rect.right(), rect.bottom()]])
    }

    pub fn min(&self) -> XYPosition {
        XYPosition::new(self.0[0][0], self.0[0][1])
    }

    pub fn max(&self) -> XYPosition {
        XYPosition::new(self.0[1][0], self.0[1][1])
    }

    pub fn is_infinite(&self) -> bool {
        self.0.iter().flatten().all(|v| v.is_infinite())
    }
}

impl Default for CoordinateExtent {
    fn default() -> Self {
        Self::INFINITE
    }
}

pub fn screen_to_flow(point: XYPosition, transform: Transform, container_offset: XYPosition) -> XYPosition {
    let zoom = transform.safe_zoom();
    XYPosition::new(
        (point.x - container_offset.x - transform.x) / zoom,
        (point.y - container_offset.y - transform.y) / zoom,
    )
}

pub fn flow_to_screen(point: XYPosition, transform: Transform, container_offset: XYPosition) -> XYPosition {
    XYPosition::new(
        point.x * transform.zoom + transform.x + container_offset.x,
        point.y * transform.zoom + transform.y + container_offset.y,
    )
}

/// Visible flow-space rectangle of a container of the given size.
pub fn viewport_to_flow_rect(transform: Transform, width: f32, height: f32) -> Rect {
    let zoom = transform.safe_zoom();
    Rect::new(-transform.x / zoom, -transform.y / zoom, width / zoom, height / zoom)
}

pub fn snap_position(position: XYPosition, snap_grid: [f32; 2]) -> XYPosition {
    let [gx, gy] = snap_grid;
    XYPosition::new(
        if gx > 0.0 { gx * (position.x / gx).round() } else { position.x },
        if gy > 0.0 { gy * (position.y / gy).round() } else { position.y },
    )
}

/// Clamp a top-left position so a box of `dimensions` stays inside `extent`.
pub fn clamp_position(position: XYPosition, extent: &CoordinateExtent, dimensions: Dimensions) -> XYPosition {
    let min = extent.min();
    let max = extent.max();
    XYPosition::new(
        clamp(position.x, min.x, max.x - dimensions.width),
        clamp(position.y, min.y, max.y - dimensions.height),
    )
}

/// `f32::clamp` panics when `min > max`; an extent smaller than the node pins to `min`.
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    value.min(max).max(min)
}

/// Bounding box over a set of rectangles, `None` when empty.
pub fn rects_bounds<I>(rects: I) -> Option<Rect>
where
    I: IntoIterator<Item = Rect>,
{
    rects.into_iter().reduce(|acc, r| acc.union(&r))
}

/// Point on the border of `node` where the line towards the center of
/// `target` leaves it. Both rectangles are absolute.
///
/// Used for floating edges that attach to node borders rather than handles.
pub fn get_node_intersection(node: &Rect, target: &Rect) -> XYPosition {
    let w = node.width / 2.0;
    let h = node.height / 2.0;
    let center = node.center();
    let target_center = target.center();

    if w <= 0.0 || h <= 0.0 {
        return center;
    }

    let xx1 = (target_center.x - center.x) / (2.0 * w) - (target_center.y - center.y) / (2.0 * h);
    let yy1 = (target_center.x - center.x) / (2.0 * w) + (target_center.y - center.y) / (2.0 * h);
    let denom = xx1.abs() + yy1.abs();
    // coincident centers: no direction to intersect along
    if denom == 0.0 {
        return center;
    }
    let a = 1.0 / denom;
    let xx3 = a * xx1;
    let yy3 = a * yy1;

    XYPosition::new(w * (xx3 + yy3) + center.x, h * (-xx3 + yy3) + center.y)
}

/// Which side of `node` an intersection point lies on (1px tolerance, ties are `Top`).
pub fn get_edge_position(node: &Rect, point: XYPosition) -> Position {
    let nx = node.x.round();
    let ny = node.y.round();
    let px = point.x.round();
    let py = point.y.round();

    if px <= nx + 1.0 {
        return Position::Left;
    }
    if px >= nx + node.width - 1.0 {
        return Position::Right;
    }
    if py <= ny + 1.0 {
        return Position::Top;
    }
    if py >= node.y + node.height - 1.0 {
        return Position::Bottom;
    }
    Position::Top
}

/// Auto-pan velocity along one axis: positive inside the low margin, negative
/// inside the high margin, proportional to how deep the pointer is.
fn calc_auto_pan_velocity(value: f32, min: f32, max: f32) -> f32 {
    if value < min {
        clamp((value - min).abs(), 1.0, min) / min
    } else if value > max {
        -clamp((value - max).abs(), 1.0, min) / min
    } else {
        0.0
    }
}

/// Pan delta for a pointer at container-space `pos` inside a container of
/// `bounds`, `margin` pixels wide at each edge.
pub fn calc_auto_pan(pos: XYPosition, bounds: Dimensions, speed: f32, margin: f32) -> XYPosition {
    if margin <= 0.0 {
        return XYPosition::default();
    }
    XYPosition::new(
        calc_auto_pan_velocity(pos.x, margin, bounds.width - margin) * speed,
        calc_auto_pan_velocity(pos.y, margin, bounds.height - margin) * speed,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn approx(a: XYPosition, b: XYPosition) -> bool {
        (a.x - b.x).abs() < EPS && (a.y - b.y).abs() < EPS
    }

    // ========================================================================
    // screen_to_flow() / flow_to_screen()
    // ========================================================================

    #[test]
    fn test_screen_to_flow_identity() {
        let p = screen_to_flow(XYPosition::new(10.0, 20.0), Transform::IDENTITY, XYPosition::default());
        assert_eq!(p, XYPosition::new(10.0, 20.0));
    }

    #[test]
    fn test_screen_to_flow_with_pan_zoom_and_offset() {
        let t = Transform::new(100.0, 50.0, 2.0);
        let p = screen_to_flow(XYPosition::new(310.0, 160.0), t, XYPosition::new(10.0, 10.0));
        assert_eq!(p, XYPosition::new(100.0, 50.0));
    }

    #[test]
    fn test_flow_to_screen_inverts_screen_to_flow() {
        let t = Transform::new(-37.5, 12.25, 0.75);
        let offset = XYPosition::new(8.0, 64.0);
        let p = XYPosition::new(123.0, -456.0);
        let back = flow_to_screen(screen_to_flow(p, t, offset), t, offset);
        assert!(approx(back, p));
    }

    #[test]
    fn test_screen_to_flow_zero_zoom_does_not_divide_by_zero() {
        let p = screen_to_flow(XYPosition::new(10.0, 10.0), Transform::new(0.0, 0.0, 0.0), XYPosition::default());
        assert!(p.x.is_finite() && p.y.is_finite());
    }

    #[test]
    fn test_viewport_to_flow_rect() {
        let r = viewport_to_flow_rect(Transform::new(-100.0, -50.0, 2.0), 800.0, 600.0);
        assert_eq!(r, Rect::new(50.0, 25.0, 400.0, 300.0));
    }

    // ========================================================================
    // Rect helpers
    // ========================================================================

    #[test]
    fn test_union_and_bounds() {
        let a = Rect::new(0.0, 0.0, 150.0, 40.0);
        let b = Rect::new(300.0, 300.0, 150.0, 40.0);
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 450.0, 340.0));
        assert_eq!(rects_bounds(vec![a, b]), Some(Rect::new(0.0, 0.0, 450.0, 340.0)));
        assert_eq!(rects_bounds(Vec::<Rect>::new()), None);
    }

    #[test]
    fn test_overlapping_area() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(a.overlapping_area(&Rect::new(5.0, 5.0, 10.0, 10.0)), 25.0);
        assert_eq!(a.overlapping_area(&Rect::new(20.0, 20.0, 10.0, 10.0)), 0.0);
    }

    // ========================================================================
    // snap / clamp
    // ========================================================================

    #[test]
    fn test_snap_position() {
        assert_eq!(snap_position(XYPosition::new(22.0, 8.0), [15.0, 15.0]), XYPosition::new(15.0, 15.0));
        assert_eq!(snap_position(XYPosition::new(23.0, 7.0), [15.0, 15.0]), XYPosition::new(30.0, 0.0));
    }

    #[test]
    fn test_clamp_position_keeps_box_inside_extent() {
        let extent = CoordinateExtent([[0.0, 0.0], [100.0, 100.0]]);
        let p = clamp_position(XYPosition::new(95.0, -5.0), &extent, Dimensions::new(20.0, 20.0));
        assert_eq!(p, XYPosition::new(80.0, 0.0));
    }

    #[test]
    fn test_clamp_position_infinite_extent_is_noop() {
        let p = clamp_position(XYPosition::new(-1e6, 1e6), &CoordinateExtent::INFINITE, Dimensions::new(20.0, 20.0));
        assert_eq!(p, XYPosition::new(-1e6, 1e6));
    }

    #[test]
    fn test_clamp_extent_smaller_than_node_pins_to_min() {
        let extent = CoordinateExtent([[0.0, 0.0], [10.0, 10.0]]);
        let p = clamp_position(XYPosition::new(5.0, 5.0), &extent, Dimensions::new(50.0, 50.0));
        assert_eq!(p, XYPosition::new(0.0, 0.0));
    }

    // ========================================================================
    // get_node_intersection() / get_edge_position()
    // ========================================================================

    #[test]
    fn test_node_intersection_horizontal_neighbor() {
        let a = Rect::new(0.0, 0.0, 100.0, 50.0);
        let b = Rect::new(300.0, 0.0, 100.0, 50.0);
        let p = get_node_intersection(&a, &b);
        assert!(approx(p, XYPosition::new(100.0, 25.0)), "{p:?}");
        assert_eq!(get_edge_position(&a, p), Position::Right);
    }

    #[test]
    fn test_node_intersection_vertical_neighbor() {
        let a = Rect::new(0.0, 0.0, 100.0, 50.0);
        let b = Rect::new(0.0, 300.0, 100.0, 50.0);
        let p = get_node_intersection(&a, &b);
        assert!(approx(p, XYPosition::new(50.0, 50.0)), "{p:?}");
        assert_eq!(get_edge_position(&a, p), Position::Bottom);
    }

    #[test]
    fn test_node_intersection_left_and_top() {
        let a = Rect::new(100.0, 100.0, 100.0, 100.0);
        let left = Rect::new(-200.0, 100.0, 100.0, 100.0);
        let p = get_node_intersection(&a, &left);
        assert!(approx(p, XYPosition::new(100.0, 150.0)), "{p:?}");
        assert_eq!(get_edge_position(&a, p), Position::Left);

        let above = Rect::new(100.0, -300.0, 100.0, 100.0);
        let p = get_node_intersection(&a, &above);
        assert!(approx(p, XYPosition::new(150.0, 100.0)), "{p:?}");
        assert_eq!(get_edge_position(&a, p), Position::Top);
    }

    #[test]
    fn test_node_intersection_coincident_centers_returns_center() {
        let a = Rect::new(0.0, 0.0, 100.0, 50.0);
        assert_eq!(get_node_intersection(&a, &a), XYPosition::new(50.0, 25.0));
    }

    #[test]
    fn test_edge_position_interior_point_defaults_to_top() {
        let a = Rect::new(0.0, 0.0, 100.0, 50.0);
        assert_eq!(get_edge_position(&a, XYPosition::new(50.0, 25.0)), Position::Top);
    }

    // ========================================================================
    // calc_auto_pan()
    // ========================================================================

    #[test]
    fn test_auto_pan_inside_is_zero() {
        let v = calc_auto_pan(XYPosition::new(400.0, 300.0), Dimensions::new(800.0, 600.0), 15.0, 40.0);
        assert_eq!(v, XYPosition::default());
    }

    #[test]
    fn test_auto_pan_near_edges() {
        let bounds = Dimensions::new(800.0, 600.0);
        let left = calc_auto_pan(XYPosition::new(0.0, 300.0), bounds, 15.0, 40.0);
        assert_eq!(left, XYPosition::new(15.0, 0.0));
        let right = calc_auto_pan(XYPosition::new(780.0, 300.0), bounds, 15.0, 40.0);
        assert!(right.x < 0.0 && right.x > -15.0);
    }
}
