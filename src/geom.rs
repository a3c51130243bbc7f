pub use kurbo::{Affine, Point, Rect, Vec2};

/// Lower bound for interactive scale drags; keeps every transform invertible.
pub const SCALE_MIN: f64 = 0.05;
pub const SCALE_MAX: f64 = 10.0;

pub fn clamped_scale(scale: f64) -> f64 {
    if !scale.is_finite() {
        return 1.0;
    }
    scale.clamp(SCALE_MIN, SCALE_MAX)
}

/// Logical document dimensions in world pixels. Part of every history
/// snapshot, since cropping changes it alongside the layer list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

/// Placement of a layer's local coordinate space in world space:
/// uniform scale, then rotation, then translation.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerTransform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub rotation_deg: f64,
}

impl Default for LayerTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            rotation_deg: 0.0,
        }
    }
}

impl LayerTransform {
    pub fn to_affine(self) -> Affine {
        Affine::translate(Vec2::new(self.x, self.y))
            * Affine::rotate(self.rotation_deg.to_radians())
            * Affine::scale(self.scale)
    }

    pub fn to_world(self, local: Point) -> Point {
        self.to_affine() * local
    }

    /// Inverse of [`to_world`](Self::to_world). Safe because `scale` is kept
    /// strictly positive, so the affine is always invertible.
    pub fn to_local(self, world: Point) -> Point {
        let s = clamped_scale(self.scale);
        let rad = -self.rotation_deg.to_radians();
        let dx = world.x - self.x;
        let dy = world.y - self.y;
        let rx = dx * rad.cos() - dy * rad.sin();
        let ry = dx * rad.sin() + dy * rad.cos();
        Point::new(rx / s, ry / s)
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = clamped_scale(scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn identity_maps_points_unchanged() {
        let t = LayerTransform::default();
        let p = Point::new(3.5, -2.0);
        assert!(close(t.to_world(p), p));
        assert!(close(t.to_local(p), p));
    }

    #[test]
    fn world_local_roundtrip() {
        let t = LayerTransform {
            x: 40.0,
            y: -12.5,
            scale: 2.5,
            rotation_deg: 33.0,
        };
        let p = Point::new(17.0, 9.0);
        assert!(close(t.to_local(t.to_world(p)), p));
        assert!(close(t.to_world(t.to_local(p)), p));
    }

    #[test]
    fn scale_then_rotate_then_translate_order() {
        let t = LayerTransform {
            x: 10.0,
            y: 0.0,
            scale: 2.0,
            rotation_deg: 90.0,
        };
        // (1,0) -> scale (2,0) -> rotate 90° (0,2) -> translate (10,2)
        assert!(close(t.to_world(Point::new(1.0, 0.0)), Point::new(10.0, 2.0)));
    }

    #[test]
    fn clamped_scale_rejects_degenerate_values() {
        assert_eq!(clamped_scale(0.0), SCALE_MIN);
        assert_eq!(clamped_scale(-3.0), SCALE_MIN);
        assert_eq!(clamped_scale(f64::NAN), 1.0);
        assert_eq!(clamped_scale(1e9), SCALE_MAX);
    }
}
