//! The compositor: flattens the ordered layer list into one output surface.
//!
//! Each visible layer is rasterized in its local space (bitmap gated by its
//! mask, shape/text through the CPU rasterizers), run through its color
//! filter, then resampled into world space through the layer affine and
//! blended with its clamped opacity and blend mode. Layer data is never
//! mutated; repeated renders of unchanged input are byte-identical.

use kurbo::{Affine, Point, Vec2};

use crate::{
    composite::blend_px,
    error::{StrataError, StrataResult},
    filter::apply_color_filter,
    layer::{Layer, LayerContent, TextAlign, TextBaseline},
    shape_raster,
    surface::Surface,
    text_raster::TextRasterizer,
};

#[derive(Default)]
pub struct Compositor {
    text: TextRasterizer,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, layers: &[Layer], out: &mut Surface) -> StrataResult<()> {
        self.render_with_view(layers, out, Affine::IDENTITY)
    }

    /// Render with a view transform applied in front of every layer affine,
    /// for outputs scaled to a host container or device pixel ratio.
    #[tracing::instrument(level = "debug", skip_all, fields(layers = layers.len()))]
    pub fn render_with_view(
        &mut self,
        layers: &[Layer],
        out: &mut Surface,
        view: Affine,
    ) -> StrataResult<()> {
        out.clear();
        for layer in layers {
            if !layer.visible {
                continue;
            }
            let opacity = layer.opacity.clamp(0.0, 1.0);

            let (local, anchor) = match self.rasterize_local(layer) {
                Ok(pair) => pair,
                Err(err) => {
                    // A layer that cannot rasterize (e.g. a text layer with
                    // unusable font bytes) is skipped, not fatal to the frame.
                    tracing::warn!(layer = %layer.name, error = %err, "skipping unrenderable layer");
                    continue;
                }
            };
            let local = apply_color_filter(&local, &layer.filter)?;

            let affine = view * layer.transform.to_affine() * Affine::translate(anchor);
            draw_transformed(out, &local, affine, opacity, layer);
        }
        Ok(())
    }

    /// Local-space premultiplied pixels for a layer, plus the local anchor
    /// offset (non-zero only for text alignment/baseline).
    fn rasterize_local(&mut self, layer: &Layer) -> StrataResult<(Surface, Vec2)> {
        match &layer.content {
            LayerContent::Raster { bitmap, mask, .. } => {
                let mut local = bitmap.clone();
                if let Some(mask) = mask {
                    if mask.width() != bitmap.width() || mask.height() != bitmap.height() {
                        return Err(StrataError::evaluation(
                            "mask dimensions diverged from bitmap",
                        ));
                    }
                    for (px, &m) in local
                        .data_mut()
                        .chunks_exact_mut(4)
                        .zip(mask.data().iter())
                    {
                        for c in px.iter_mut() {
                            *c = crate::composite::mul_div255(u16::from(*c), u16::from(m));
                        }
                    }
                }
                Ok((local, Vec2::ZERO))
            }
            LayerContent::Shape(spec) => Ok((shape_raster::rasterize(spec)?, Vec2::ZERO)),
            LayerContent::Text(spec) => {
                let local = self.text.rasterize(spec)?;
                let w = f64::from(local.width());
                let h = f64::from(local.height());
                let ax = match spec.align {
                    TextAlign::Left => 0.0,
                    TextAlign::Center => -w / 2.0,
                    TextAlign::Right => -w,
                };
                let ay = match spec.baseline {
                    TextBaseline::Top => 0.0,
                    TextBaseline::Middle => -h / 2.0,
                    // Approximate: the alphabetic baseline sits near the
                    // bottom of the tight layout box.
                    TextBaseline::Alphabetic => -h * 0.8,
                };
                Ok((local, Vec2::new(ax, ay)))
            }
        }
    }
}

/// Inverse-mapped resampling: walk the output pixels inside the transformed
/// bounding box, sample the local surface bilinearly, blend.
fn draw_transformed(
    out: &mut Surface,
    local: &Surface,
    affine: Affine,
    opacity: f32,
    layer: &Layer,
) {
    let Some(inverse) = invert(affine) else {
        return;
    };
    let (lw, lh) = (f64::from(local.width()), f64::from(local.height()));

    // World-space bounding box of the local rect, padded a pixel for the
    // bilinear footprint.
    let corners = [
        affine * Point::new(0.0, 0.0),
        affine * Point::new(lw, 0.0),
        affine * Point::new(0.0, lh),
        affine * Point::new(lw, lh),
    ];
    let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min) - 1.0;
    let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min) - 1.0;
    let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max) + 1.0;
    let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max) + 1.0;

    let x0 = min_x.floor().max(0.0) as u32;
    let y0 = min_y.floor().max(0.0) as u32;
    let x1 = (max_x.ceil().max(0.0) as u32).min(out.width());
    let y1 = (max_y.ceil().max(0.0) as u32).min(out.height());

    let mode = layer.blend;
    for y in y0..y1 {
        for x in x0..x1 {
            let world = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
            let lp = inverse * world;
            let sample = local.sample_bilinear(lp.x, lp.y);
            if sample[3] < 0.5 {
                continue;
            }
            let src = [
                sample[0].round() as u8,
                sample[1].round() as u8,
                sample[2].round() as u8,
                sample[3].round() as u8,
            ];
            let dst = out.pixel(x, y);
            out.set_pixel(x, y, blend_px(dst, src, opacity, mode));
        }
    }
}

fn invert(affine: Affine) -> Option<Affine> {
    if affine.determinant().abs() < 1e-12 {
        return None;
    }
    Some(affine.inverse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geom::LayerTransform,
        layer::{BlendMode, ColorFilter, LayerId, ShapeSpec},
        surface::Rgba8,
    };

    fn solid_raster(name: &str, w: u32, h: u32, px: [u8; 4]) -> Layer {
        let mut bitmap = Surface::new(w, h).unwrap();
        bitmap.fill(px);
        Layer::new(
            LayerId(1),
            name,
            LayerContent::Raster {
                bitmap,
                mask: None,
                painted: false,
            },
        )
    }

    #[test]
    fn render_is_idempotent() {
        let mut layers = vec![solid_raster("a", 8, 8, [120, 40, 10, 255])];
        layers[0].transform = LayerTransform {
            x: 3.0,
            y: 2.0,
            scale: 1.7,
            rotation_deg: 20.0,
        };
        let mut comp = Compositor::new();
        let mut out1 = Surface::new(32, 32).unwrap();
        let mut out2 = Surface::new(32, 32).unwrap();
        comp.render(&layers, &mut out1).unwrap();
        comp.render(&layers, &mut out2).unwrap();
        assert_eq!(out1, out2);
    }

    #[test]
    fn hidden_layers_do_not_paint() {
        let mut layer = solid_raster("a", 4, 4, [255, 255, 255, 255]);
        layer.visible = false;
        let mut comp = Compositor::new();
        let mut out = Surface::new(8, 8).unwrap();
        comp.render(&[layer], &mut out).unwrap();
        assert!(out.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn clamped_opacity_extremes_match_exact_bounds() {
        let mut comp = Compositor::new();

        let mut over = solid_raster("over", 4, 4, [200, 0, 0, 255]);
        over.opacity = 1.5;
        let mut exact = over.clone();
        exact.opacity = 1.0;
        let mut out_a = Surface::new(4, 4).unwrap();
        let mut out_b = Surface::new(4, 4).unwrap();
        comp.render(std::slice::from_ref(&over), &mut out_a).unwrap();
        comp.render(std::slice::from_ref(&exact), &mut out_b).unwrap();
        assert_eq!(out_a, out_b);

        let mut under = solid_raster("under", 4, 4, [200, 0, 0, 255]);
        under.opacity = -0.2;
        let mut zero = under.clone();
        zero.opacity = 0.0;
        comp.render(std::slice::from_ref(&under), &mut out_a).unwrap();
        comp.render(std::slice::from_ref(&zero), &mut out_b).unwrap();
        assert_eq!(out_a, out_b);
        assert!(out_a.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn later_layers_paint_over_earlier() {
        let bottom = solid_raster("bottom", 4, 4, [255, 0, 0, 255]);
        let top = solid_raster("top", 4, 4, [0, 255, 0, 255]);
        let mut comp = Compositor::new();
        let mut out = Surface::new(4, 4).unwrap();
        comp.render(&[bottom, top], &mut out).unwrap();
        assert_eq!(out.pixel(2, 2), [0, 255, 0, 255]);
    }

    #[test]
    fn translation_places_the_layer() {
        let mut layer = solid_raster("a", 2, 2, [0, 0, 255, 255]);
        layer.transform.x = 4.0;
        layer.transform.y = 4.0;
        let mut comp = Compositor::new();
        let mut out = Surface::new(8, 8).unwrap();
        comp.render(&[layer], &mut out).unwrap();
        assert_eq!(out.pixel(5, 5), [0, 0, 255, 255]);
        assert_eq!(out.pixel(1, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn mask_gates_raster_visibility() {
        let mut layer = solid_raster("a", 4, 4, [255, 255, 255, 255]);
        crate::mask::ensure_mask(&mut layer);
        if let LayerContent::Raster { mask: Some(m), .. } = &mut layer.content {
            for x in 0..4 {
                m.set_value(x, 0, 0);
            }
        }
        let mut comp = Compositor::new();
        let mut out = Surface::new(4, 4).unwrap();
        comp.render(&[layer], &mut out).unwrap();
        assert_eq!(out.pixel(1, 0)[3], 0);
        assert_eq!(out.pixel(1, 2)[3], 255);
    }

    #[test]
    fn multiply_blend_darkens_against_backdrop() {
        let bottom = solid_raster("bottom", 4, 4, [200, 200, 200, 255]);
        let mut top = solid_raster("top", 4, 4, [128, 128, 128, 255]);
        top.blend = BlendMode::Multiply;
        let mut comp = Compositor::new();
        let mut out = Surface::new(4, 4).unwrap();
        comp.render(&[bottom, top], &mut out).unwrap();
        let px = out.pixel(2, 2);
        assert!(px[0] < 150, "multiply should darken, got {}", px[0]);
    }

    #[test]
    fn shape_layer_renders_through_the_same_path() {
        let spec = ShapeSpec {
            width: 6.0,
            height: 6.0,
            fill: Rgba8::new(0, 200, 0, 255),
            ..ShapeSpec::default()
        };
        let mut layer = Layer::new(LayerId(2), "rect", LayerContent::Shape(spec));
        layer.filter = ColorFilter {
            brightness: 0.0,
            ..ColorFilter::default()
        };
        let mut comp = Compositor::new();
        let mut out = Surface::new(8, 8).unwrap();
        comp.render(&[layer], &mut out).unwrap();
        // Brightness 0 turns the fill black but keeps coverage.
        assert_eq!(out.pixel(3, 3), [0, 0, 0, 255]);
    }
}
