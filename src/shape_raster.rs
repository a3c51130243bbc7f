//! CPU rasterization of vector shape layers into a local premultiplied
//! surface: coverage-tested rectangle/ellipse/line with ~1px soft edges,
//! optional stroke ring, and the two-stop lightened-fill gradient.

use crate::{
    error::{StrataError, StrataResult},
    layer::{GradientMode, ShapeKind, ShapeSpec},
    surface::{Rgba8, Surface},
};

const MAX_SHAPE_DIM: f64 = 4096.0;

/// Second gradient stop: the fill pushed 45% toward white, matching the
/// "lightened fill" look of the canvas editor.
pub(crate) const GRADIENT_LIFT: f32 = 0.45;

pub fn rasterize(spec: &ShapeSpec) -> StrataResult<Surface> {
    if !spec.width.is_finite() || !spec.height.is_finite() {
        return Err(StrataError::validation("shape dimensions must be finite"));
    }
    let w = spec.width.clamp(1.0, MAX_SHAPE_DIM).ceil() as u32;
    let h = spec.height.clamp(1.0, MAX_SHAPE_DIM).ceil() as u32;
    let mut out = Surface::new(w, h)?;

    let light = spec.fill.lightened(GRADIENT_LIFT);
    let stroke_w = spec.stroke_width.max(0.0);

    for y in 0..h {
        for x in 0..w {
            let px = f64::from(x) + 0.5;
            let py = f64::from(y) + 0.5;

            let (fill_cov, stroke_cov) = match spec.kind {
                ShapeKind::Rectangle => rect_coverage(px, py, spec.width, spec.height, stroke_w),
                ShapeKind::Ellipse => ellipse_coverage(px, py, spec.width, spec.height, stroke_w),
                ShapeKind::Line => (0.0, line_coverage(px, py, spec.width, spec.height, stroke_w)),
            };
            if fill_cov <= 0.0 && stroke_cov <= 0.0 {
                continue;
            }

            let fill = match spec.gradient {
                GradientMode::None => spec.fill,
                GradientMode::Vertical => mix(spec.fill, light, py / spec.height.max(1.0)),
                GradientMode::Horizontal => mix(spec.fill, light, px / spec.width.max(1.0)),
            };

            // Stroke paints over fill inside its band.
            let mut color = scale_premul(fill.premul(), fill_cov as f32);
            if stroke_cov > 0.0 {
                color = over_premul(color, scale_premul(spec.stroke.premul(), stroke_cov as f32));
            }
            out.set_pixel(x, y, color);
        }
    }
    Ok(out)
}

/// Signed-distance style coverage for an axis-aligned rectangle spanning
/// the full surface; the stroke is an inward band of `stroke_w`.
fn rect_coverage(px: f64, py: f64, w: f64, h: f64, stroke_w: f64) -> (f64, f64) {
    let inside = px.min(w - px).min(py).min(h - py);
    let fill = soft_step(inside);
    let stroke = if stroke_w > 0.0 {
        fill * soft_step(stroke_w - inside)
    } else {
        0.0
    };
    (fill, stroke)
}

fn ellipse_coverage(px: f64, py: f64, w: f64, h: f64, stroke_w: f64) -> (f64, f64) {
    let rx = (w / 2.0).max(0.5);
    let ry = (h / 2.0).max(0.5);
    let nx = (px - rx) / rx;
    let ny = (py - ry) / ry;
    // Approximate pixel distance to the boundary from the normalized
    // implicit value, scaled by the mean radius.
    let d = (1.0 - (nx * nx + ny * ny).sqrt()) * (rx + ry) / 2.0;
    let fill = soft_step(d);
    let stroke = if stroke_w > 0.0 {
        fill * soft_step(stroke_w - d)
    } else {
        0.0
    };
    (fill, stroke)
}

/// A line runs corner-to-corner through the local box; only the stroke
/// paints.
fn line_coverage(px: f64, py: f64, w: f64, h: f64, stroke_w: f64) -> f64 {
    let half = (stroke_w.max(1.0)) / 2.0;
    let len_sq = w * w + h * h;
    if len_sq <= 0.0 {
        return 0.0;
    }
    let t = ((px * w + py * h) / len_sq).clamp(0.0, 1.0);
    let dx = px - t * w;
    let dy = py - t * h;
    soft_step(half - (dx * dx + dy * dy).sqrt())
}

/// 1px-wide linear edge ramp around distance zero.
fn soft_step(d: f64) -> f64 {
    (d + 0.5).clamp(0.0, 1.0)
}

fn mix(a: Rgba8, b: Rgba8, t: f64) -> Rgba8 {
    let t = t.clamp(0.0, 1.0) as f32;
    let lerp = |x: u8, y: u8| -> u8 { (f32::from(x) + (f32::from(y) - f32::from(x)) * t).round() as u8 };
    Rgba8::new(
        lerp(a.r, b.r),
        lerp(a.g, b.g),
        lerp(a.b, b.b),
        lerp(a.a, b.a),
    )
}

fn scale_premul(px: [u8; 4], f: f32) -> [u8; 4] {
    let f = f.clamp(0.0, 1.0);
    [
        (f32::from(px[0]) * f).round() as u8,
        (f32::from(px[1]) * f).round() as u8,
        (f32::from(px[2]) * f).round() as u8,
        (f32::from(px[3]) * f).round() as u8,
    ]
}

fn over_premul(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    crate::composite::over(dst, src, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: ShapeKind) -> ShapeSpec {
        ShapeSpec {
            kind,
            width: 20.0,
            height: 10.0,
            fill: Rgba8::new(200, 40, 40, 255),
            stroke: Rgba8::BLACK,
            stroke_width: 0.0,
            gradient: GradientMode::None,
        }
    }

    #[test]
    fn rectangle_fills_interior() {
        let s = rasterize(&spec(ShapeKind::Rectangle)).unwrap();
        assert_eq!((s.width(), s.height()), (20, 10));
        assert_eq!(s.pixel(10, 5), [200, 40, 40, 255]);
    }

    #[test]
    fn ellipse_corners_are_empty() {
        let s = rasterize(&spec(ShapeKind::Ellipse)).unwrap();
        assert_eq!(s.pixel(0, 0)[3], 0);
        assert_eq!(s.pixel(10, 5)[3], 255);
    }

    #[test]
    fn line_paints_only_near_the_diagonal() {
        let mut sp = spec(ShapeKind::Line);
        sp.stroke_width = 2.0;
        let s = rasterize(&sp).unwrap();
        // On the diagonal midpoint: covered. Far corner off the diagonal: not.
        assert!(s.pixel(10, 5)[3] > 0);
        assert_eq!(s.pixel(19, 0)[3], 0);
    }

    #[test]
    fn vertical_gradient_lightens_toward_bottom() {
        let mut sp = spec(ShapeKind::Rectangle);
        sp.gradient = GradientMode::Vertical;
        let s = rasterize(&sp).unwrap();
        let top = s.pixel(10, 0);
        let bottom = s.pixel(10, 9);
        assert!(bottom[0] > top[0]);
        assert!(bottom[1] > top[1]);
    }

    #[test]
    fn stroke_ring_darkens_the_border() {
        let mut sp = spec(ShapeKind::Rectangle);
        sp.stroke_width = 2.0;
        let s = rasterize(&sp).unwrap();
        // Border pixel carries stroke color, interior keeps fill.
        assert_eq!(s.pixel(1, 5), [0, 0, 0, 255]);
        assert_eq!(s.pixel(10, 5), [200, 40, 40, 255]);
    }

    #[test]
    fn degenerate_dimensions_are_rejected() {
        let mut sp = spec(ShapeKind::Rectangle);
        sp.width = f64::NAN;
        assert!(rasterize(&sp).is_err());
    }
}
