//! Transform-tool pointer interaction: hit-testing the active layer's
//! corner handles, rotate handle and interior, and turning drag deltas into
//! transform updates. Pure math over the layer transform; the session owns
//! the state machine around it.

use kurbo::{Point, Vec2};

use crate::{
    geom::{clamped_scale, LayerTransform},
    layer::Layer,
};

/// Pointer hotspot radius for the corner/rotate handles. Tuned for a
/// mouse/touch UI, not load-bearing.
pub const HANDLE_HIT_RADIUS: f64 = 12.0;
/// Screen-space distance of the rotate handle above the top-center edge.
pub const ROTATE_HANDLE_OFFSET: f64 = 30.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    pub fn opposite(self) -> Corner {
        match self {
            Self::TopLeft => Self::BottomRight,
            Self::TopRight => Self::BottomLeft,
            Self::BottomRight => Self::TopLeft,
            Self::BottomLeft => Self::TopRight,
        }
    }

    fn local(self, w: f64, h: f64) -> Point {
        match self {
            Self::TopLeft => Point::new(0.0, 0.0),
            Self::TopRight => Point::new(w, 0.0),
            Self::BottomRight => Point::new(w, h),
            Self::BottomLeft => Point::new(0.0, h),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DragMode {
    Move,
    ScaleCorner(Corner),
    Rotate,
}

/// One in-flight transform drag.
#[derive(Clone, Copy, Debug)]
pub struct TransformDrag {
    pub mode: DragMode,
    last_world: Point,
}

const CORNERS: [Corner; 4] = [
    Corner::TopLeft,
    Corner::TopRight,
    Corner::BottomRight,
    Corner::BottomLeft,
];

/// World position of the rotate handle: 30px above the top-center along the
/// layer's rotated up direction.
pub fn rotate_handle_pos(layer: &Layer) -> Point {
    let (w, _) = layer.local_size();
    let t = layer.transform;
    let top_center = t.to_world(Point::new(w / 2.0, 0.0));
    let rad = t.rotation_deg.to_radians();
    let up = Vec2::new(rad.sin(), -rad.cos());
    top_center + up * ROTATE_HANDLE_OFFSET
}

/// Decide what a pointer-down at `world` starts: a corner scale, a rotate,
/// a move, or nothing.
pub fn hit_test(layer: &Layer, world: Point) -> Option<DragMode> {
    let (w, h) = layer.local_size();
    let t = layer.transform;

    for corner in CORNERS {
        let pos = t.to_world(corner.local(w, h));
        if pos.distance(world) <= HANDLE_HIT_RADIUS {
            return Some(DragMode::ScaleCorner(corner));
        }
    }

    if rotate_handle_pos(layer).distance(world) <= HANDLE_HIT_RADIUS {
        return Some(DragMode::Rotate);
    }

    let local = t.to_local(world);
    if local.x >= 0.0 && local.y >= 0.0 && local.x <= w && local.y <= h {
        return Some(DragMode::Move);
    }
    None
}

impl TransformDrag {
    pub fn begin(layer: &Layer, world: Point) -> Option<Self> {
        hit_test(layer, world).map(|mode| Self {
            mode,
            last_world: world,
        })
    }

    /// Feed one pointer-move; mutates the layer transform in place.
    pub fn update(&mut self, layer: &mut Layer, world: Point) {
        match self.mode {
            DragMode::Move => {
                layer.transform.x += world.x - self.last_world.x;
                layer.transform.y += world.y - self.last_world.y;
            }
            DragMode::ScaleCorner(corner) => {
                let (w, h) = layer.local_size();
                let anchor_local = corner.opposite().local(w, h);
                let anchor_world = layer.transform.to_world(anchor_local);

                let before = self.last_world.distance(anchor_world);
                let after = world.distance(anchor_world);
                if before > f64::EPSILON {
                    let next = clamped_scale(layer.transform.scale * (after / before));
                    layer.transform.scale = next;
                    // Re-pin the opposite corner where it was.
                    let moved = layer.transform.to_world(anchor_local);
                    layer.transform.x += anchor_world.x - moved.x;
                    layer.transform.y += anchor_world.y - moved.y;
                }
            }
            DragMode::Rotate => {
                let (w, h) = layer.local_size();
                let center = layer.transform.to_world(Point::new(w / 2.0, h / 2.0));
                let prev = self.last_world - center;
                let cur = world - center;
                if prev.hypot() > f64::EPSILON && cur.hypot() > f64::EPSILON {
                    let delta = cur.atan2() - prev.atan2();
                    layer.transform.rotation_deg += delta.to_degrees();
                }
            }
        }
        self.last_world = world;
    }
}

/// Direct move-tool drag: the world delta lands on `(x, y)` unmodified.
pub fn apply_move_delta(transform: &mut LayerTransform, from: Point, to: Point) {
    transform.x += to.x - from.x;
    transform.y += to.y - from.y;
}
