//! Per-raster-layer alpha matte editing: soft brush reveal/hide strokes and
//! the flood-fill auto cutout with a feathered edge.
//!
//! Every entry point takes world coordinates and maps them through the
//! layer transform into bitmap space. Operations on non-raster layers are
//! silent no-ops returning `false`; the surrounding UI routes them.

use std::collections::VecDeque;

use kurbo::Point;

use crate::{
    blur::box_blur_mask,
    geom::LayerTransform,
    layer::{Layer, LayerContent},
    surface::Mask,
};

/// Fraction of the brush radius painted at full strength before the radial
/// falloff begins.
const BRUSH_CORE: f64 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MaskBrush {
    /// Brush diameter in world pixels.
    pub size_px: f64,
    /// Peak effect per stamp, 0..=1.
    pub opacity: f64,
    /// Fraction of the radius where the falloff reaches half strength.
    pub feather: f64,
}

impl Default for MaskBrush {
    fn default() -> Self {
        Self {
            size_px: 40.0,
            opacity: 1.0,
            feather: 0.5,
        }
    }
}

/// Allocate the layer's mask lazily, fully visible. Returns `false` for
/// non-raster layers.
pub fn ensure_mask(layer: &mut Layer) -> bool {
    let LayerContent::Raster { bitmap, mask, .. } = &mut layer.content else {
        return false;
    };
    if mask.is_none() {
        match Mask::opaque(bitmap.width(), bitmap.height()) {
            Ok(m) => *mask = Some(m),
            Err(_) => return false,
        }
    }
    true
}

/// Stamp one soft circle onto the mask at a world-space point. Paint
/// brightens the matte (reveals), erase darkens it (hides).
pub fn paint_point(layer: &mut Layer, world: Point, brush: &MaskBrush, erase: bool) -> bool {
    if !ensure_mask(layer) {
        return false;
    }
    let transform = layer.transform;
    let LayerContent::Raster { mask: Some(mask), .. } = &mut layer.content else {
        return false;
    };
    stamp(mask, transform, world, brush, erase);
    true
}

/// Stamp interpolated points from `from` to `to`, spaced at half the brush
/// diameter so drag strokes stay gap-free.
pub fn paint_stroke(
    layer: &mut Layer,
    from: Point,
    to: Point,
    brush: &MaskBrush,
    erase: bool,
) -> bool {
    if !ensure_mask(layer) {
        return false;
    }
    let transform = layer.transform;
    let LayerContent::Raster { mask: Some(mask), .. } = &mut layer.content else {
        return false;
    };

    let dist = from.distance(to);
    let step = (brush.size_px / 2.0).max(1.0);
    let steps = (dist / step).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let p = Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t);
        stamp(mask, transform, p, brush, erase);
    }
    true
}

fn stamp(mask: &mut Mask, transform: LayerTransform, world: Point, brush: &MaskBrush, erase: bool) {
    let center = transform.to_local(world);
    // Brush size is expressed in world pixels; divide out the layer scale so
    // the footprint on the bitmap matches what the user sees.
    let radius = (brush.size_px / 2.0 / transform.scale.max(f64::EPSILON)).max(0.5);
    let opacity = brush.opacity.clamp(0.0, 1.0);
    let feather = brush.feather.clamp(BRUSH_CORE, 1.0);

    let x0 = (center.x - radius).floor().max(0.0) as i64;
    let y0 = (center.y - radius).floor().max(0.0) as i64;
    let x1 = (center.x + radius).ceil().min(f64::from(mask.width())) as i64;
    let y1 = (center.y + radius).ceil().min(f64::from(mask.height())) as i64;

    for y in y0..y1 {
        for x in x0..x1 {
            let dx = (x as f64 + 0.5) - center.x;
            let dy = (y as f64 + 0.5) - center.y;
            let t = (dx * dx + dy * dy).sqrt() / radius;
            if t > 1.0 {
                continue;
            }
            let falloff = falloff(t, feather);
            if falloff <= 0.0 {
                continue;
            }
            let delta = (opacity * falloff * 255.0).round() as u8;
            let old = mask.value(x as u32, y as u32);
            let new = if erase {
                old.saturating_sub(delta)
            } else {
                old.saturating_add(delta)
            };
            mask.set_value(x as u32, y as u32, new);
        }
    }
}

/// Radial falloff: full inside the core, half strength at the feather
/// fraction, zero at the rim. Piecewise linear between the stops.
fn falloff(t: f64, feather: f64) -> f64 {
    if t <= BRUSH_CORE {
        1.0
    } else if t <= feather {
        1.0 - 0.5 * (t - BRUSH_CORE) / (feather - BRUSH_CORE)
    } else {
        0.5 * (1.0 - t) / (1.0 - feather)
    }
}

/// Flood-fill cutout: keep everything color-connected to the seed, hide the
/// rest, then feather the matte edge with a box blur.
///
/// The fill walks the bitmap's straight-alpha RGB with an explicit queue
/// (4-connected); Euclidean RGB distance against the seed color decides
/// membership.
#[tracing::instrument(level = "debug", skip(layer), fields(layer = %layer.name))]
pub fn auto_cutout(
    layer: &mut Layer,
    seed_world: Point,
    tolerance: f64,
    feather_px: u32,
) -> bool {
    let transform = layer.transform;
    let LayerContent::Raster { bitmap, mask, .. } = &mut layer.content else {
        return false;
    };

    let (w, h) = (bitmap.width(), bitmap.height());
    let seed = transform.to_local(seed_world);
    if seed.x < 0.0 || seed.y < 0.0 || seed.x >= f64::from(w) || seed.y >= f64::from(h) {
        return false;
    }
    let sx = seed.x as u32;
    let sy = seed.y as u32;

    // Compare in straight-alpha RGB; premultiplied values would skew the
    // distance wherever alpha varies.
    let straight: Vec<[u8; 3]> = bitmap
        .data()
        .chunks_exact(4)
        .map(|px| {
            let a = px[3];
            if a == 0 {
                [0, 0, 0]
            } else {
                let un = |c: u8| -> u8 {
                    ((u32::from(c) * 255 + u32::from(a) / 2) / u32::from(a)).min(255) as u8
                };
                [un(px[0]), un(px[1]), un(px[2])]
            }
        })
        .collect();

    let seed_color = straight[(sy * w + sx) as usize];
    let tol_sq = tolerance * tolerance;
    let within = |c: [u8; 3]| -> bool {
        let dr = f64::from(c[0]) - f64::from(seed_color[0]);
        let dg = f64::from(c[1]) - f64::from(seed_color[1]);
        let db = f64::from(c[2]) - f64::from(seed_color[2]);
        dr * dr + dg * dg + db * db <= tol_sq
    };

    let mut new_mask = match Mask::hidden(w, h) {
        Ok(m) => m,
        Err(_) => return false,
    };
    let mut visited = vec![false; (w * h) as usize];
    let mut queue = VecDeque::new();
    visited[(sy * w + sx) as usize] = true;
    queue.push_back((sx, sy));

    while let Some((x, y)) = queue.pop_front() {
        new_mask.set_value(x, y, 255);
        let mut push = |nx: u32, ny: u32, queue: &mut VecDeque<(u32, u32)>| {
            let idx = (ny * w + nx) as usize;
            if !visited[idx] && within(straight[idx]) {
                visited[idx] = true;
                queue.push_back((nx, ny));
            }
        };
        if x > 0 {
            push(x - 1, y, &mut queue);
        }
        if x + 1 < w {
            push(x + 1, y, &mut queue);
        }
        if y > 0 {
            push(x, y - 1, &mut queue);
        }
        if y + 1 < h {
            push(x, y + 1, &mut queue);
        }
    }

    box_blur_mask(&mut new_mask, feather_px);
    *mask = Some(new_mask);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        layer::LayerId,
        surface::Surface,
    };

    fn raster_layer(w: u32, h: u32) -> Layer {
        Layer::new(
            LayerId(1),
            "photo",
            LayerContent::Raster {
                bitmap: Surface::new(w, h).unwrap(),
                mask: None,
                painted: false,
            },
        )
    }

    fn mask_of(layer: &Layer) -> &Mask {
        match &layer.content {
            LayerContent::Raster { mask: Some(m), .. } => m,
            _ => panic!("expected a masked raster layer"),
        }
    }

    #[test]
    fn ensure_mask_matches_bitmap_dimensions() {
        let mut layer = raster_layer(7, 5);
        assert!(ensure_mask(&mut layer));
        let m = mask_of(&layer);
        assert_eq!((m.width(), m.height()), (7, 5));
        assert!(m.data().iter().all(|&v| v == 255));
    }

    #[test]
    fn mask_ops_on_shape_layer_are_no_ops() {
        let mut layer = Layer::new(
            LayerId(2),
            "shape",
            LayerContent::Shape(crate::layer::ShapeSpec::default()),
        );
        assert!(!ensure_mask(&mut layer));
        assert!(!paint_point(
            &mut layer,
            Point::new(1.0, 1.0),
            &MaskBrush::default(),
            false
        ));
        assert!(!auto_cutout(&mut layer, Point::new(0.0, 0.0), 10.0, 0));
    }

    #[test]
    fn erase_darkens_the_center() {
        let mut layer = raster_layer(21, 21);
        let brush = MaskBrush {
            size_px: 10.0,
            opacity: 1.0,
            feather: 0.5,
        };
        assert!(paint_point(&mut layer, Point::new(10.5, 10.5), &brush, true));
        let m = mask_of(&layer);
        assert_eq!(m.value(10, 10), 0);
        assert_eq!(m.value(0, 0), 255);
    }

    #[test]
    fn paint_reveals_after_erase() {
        let mut layer = raster_layer(21, 21);
        let brush = MaskBrush {
            size_px: 10.0,
            opacity: 1.0,
            feather: 0.5,
        };
        paint_point(&mut layer, Point::new(10.5, 10.5), &brush, true);
        paint_point(&mut layer, Point::new(10.5, 10.5), &brush, false);
        assert_eq!(mask_of(&layer).value(10, 10), 255);
    }

    #[test]
    fn stroke_leaves_no_gaps_along_the_path() {
        let mut layer = raster_layer(60, 9);
        let brush = MaskBrush {
            size_px: 6.0,
            opacity: 1.0,
            feather: 0.5,
        };
        assert!(paint_stroke(
            &mut layer,
            Point::new(4.5, 4.5),
            Point::new(55.5, 4.5),
            &brush,
            true
        ));
        let m = mask_of(&layer);
        for x in 5..55 {
            assert!(m.value(x, 4) < 255, "gap at x={x}");
        }
    }

    #[test]
    fn cutout_uniform_2x2_keeps_everything() {
        let mut layer = raster_layer(2, 2);
        if let LayerContent::Raster { bitmap, .. } = &mut layer.content {
            bitmap.fill([120, 40, 200, 255]);
        }
        assert!(auto_cutout(&mut layer, Point::new(0.0, 0.0), 10.0, 0));
        let m = mask_of(&layer);
        assert!(m.data().iter().all(|&v| v == 255));
    }

    #[test]
    fn cutout_separates_two_color_regions() {
        let mut layer = raster_layer(4, 2);
        if let LayerContent::Raster { bitmap, .. } = &mut layer.content {
            bitmap.fill([255, 0, 0, 255]);
            for y in 0..2 {
                for x in 2..4 {
                    bitmap.set_pixel(x, y, [0, 0, 255, 255]);
                }
            }
        }
        assert!(auto_cutout(&mut layer, Point::new(0.5, 0.5), 30.0, 0));
        let m = mask_of(&layer);
        assert_eq!(m.value(0, 0), 255);
        assert_eq!(m.value(1, 1), 255);
        assert_eq!(m.value(2, 0), 0);
        assert_eq!(m.value(3, 1), 0);
    }

    #[test]
    fn cutout_out_of_bounds_seed_is_a_no_op() {
        let mut layer = raster_layer(2, 2);
        assert!(!auto_cutout(&mut layer, Point::new(99.0, 99.0), 10.0, 0));
        assert!(matches!(
            layer.content,
            LayerContent::Raster { mask: None, .. }
        ));
    }
}
