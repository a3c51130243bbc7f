//! Export boundaries: flattened raster encodes and a best-effort SVG
//! serialization of the layer stack.
//!
//! The SVG keeps vector layers vector (shapes and text become real SVG
//! elements) and embeds raster layers as base64 data URIs. Raster masks are
//! intentionally not reproduced; viewers without `mix-blend-mode` support
//! fall back to normal blending.

use std::fmt::Write as _;
use std::io::Cursor;

use base64::Engine as _;

use crate::{
    error::{StrataError, StrataResult},
    layer::{
        ColorFilter, GradientMode, Layer, LayerContent, ShapeKind, ShapeSpec, TextAlign, TextSpec,
    },
    shape_raster,
    surface::{Rgba8, Surface},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    /// Quality 1..=100; alpha is dropped against black.
    Jpeg { quality: u8 },
    WebpLossless,
}

/// Encode a flattened composite. The surface is unpremultiplied into a
/// straight-alpha image first, so the bytes match what any external viewer
/// expects.
pub fn encode_composite(surface: &Surface, format: ExportFormat) -> StrataResult<Vec<u8>> {
    let img = surface.to_rgba_image()?;
    let mut bytes = Vec::new();
    match format {
        ExportFormat::Png => {
            img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
                .map_err(|e| StrataError::export(format!("png encode failed: {e}")))?;
        }
        ExportFormat::Jpeg { quality } => {
            if quality == 0 || quality > 100 {
                return Err(StrataError::export(format!(
                    "jpeg quality {quality} out of range 1..=100"
                )));
            }
            let rgb = image::DynamicImage::ImageRgba8(img).to_rgb8();
            let mut cursor = Cursor::new(&mut bytes);
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
            rgb.write_with_encoder(encoder)
                .map_err(|e| StrataError::export(format!("jpeg encode failed: {e}")))?;
        }
        ExportFormat::WebpLossless => {
            let mut cursor = Cursor::new(&mut bytes);
            let encoder = image::codecs::webp::WebPEncoder::new_lossless(&mut cursor);
            img.write_with_encoder(encoder)
                .map_err(|e| StrataError::export(format!("webp encode failed: {e}")))?;
        }
    }
    Ok(bytes)
}

/// Serialize the layer stack to a standalone SVG document.
pub fn serialize_to_svg(layers: &[Layer], width: u32, height: u32) -> StrataResult<String> {
    let mut defs = String::new();
    let mut body = String::new();

    for (i, layer) in layers.iter().enumerate() {
        if !layer.visible {
            continue;
        }
        let t = layer.transform;
        let mut style = String::new();
        if layer.blend.css_keyword() != "normal" {
            let _ = write!(style, "mix-blend-mode:{};", layer.blend.css_keyword());
        }
        if let Some(filter) = css_filter(&layer.filter) {
            let _ = write!(style, "filter:{filter};");
        }
        let style_attr = if style.is_empty() {
            String::new()
        } else {
            format!(" style=\"{style}\"")
        };
        let _ = write!(
            body,
            "  <g transform=\"translate({} {}) rotate({}) scale({})\" opacity=\"{}\"{}>\n",
            fmt_f64(t.x),
            fmt_f64(t.y),
            fmt_f64(t.rotation_deg),
            fmt_f64(t.scale),
            fmt_f32(layer.opacity.clamp(0.0, 1.0)),
            style_attr,
        );

        match &layer.content {
            LayerContent::Raster { bitmap, .. } => {
                write_raster(&mut body, bitmap)?;
            }
            LayerContent::Shape(spec) => {
                write_shape(&mut body, &mut defs, spec, i);
            }
            LayerContent::Text(spec) => {
                write_text(&mut body, spec);
            }
        }
        body.push_str("  </g>\n");
    }

    let mut doc = String::new();
    let _ = write!(
        doc,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">\n"
    );
    if !defs.is_empty() {
        let _ = write!(doc, "  <defs>\n{defs}  </defs>\n");
    }
    doc.push_str(&body);
    doc.push_str("</svg>\n");
    Ok(doc)
}

fn write_raster(body: &mut String, bitmap: &Surface) -> StrataResult<()> {
    let img = bitmap.to_rgba_image()?;
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| StrataError::export(format!("svg raster encode failed: {e}")))?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(&png);
    let _ = write!(
        body,
        "    <image width=\"{}\" height=\"{}\" href=\"data:image/png;base64,{}\"/>\n",
        bitmap.width(),
        bitmap.height(),
        b64,
    );
    Ok(())
}

fn write_shape(body: &mut String, defs: &mut String, spec: &ShapeSpec, index: usize) {
    let fill = if spec.gradient == GradientMode::None {
        css_color(spec.fill)
    } else {
        let id = format!("grad{index}");
        let (x2, y2) = match spec.gradient {
            GradientMode::Vertical => (0, 1),
            _ => (1, 0),
        };
        let _ = write!(
            defs,
            "    <linearGradient id=\"{id}\" x1=\"0\" y1=\"0\" x2=\"{x2}\" y2=\"{y2}\">\n      <stop offset=\"0\" stop-color=\"{}\"/>\n      <stop offset=\"1\" stop-color=\"{}\"/>\n    </linearGradient>\n",
            css_color(spec.fill),
            css_color(spec.fill.lightened(shape_raster::GRADIENT_LIFT)),
        );
        format!("url(#{id})")
    };

    let stroke = if spec.stroke_width > 0.0 {
        format!(
            " stroke=\"{}\" stroke-width=\"{}\"",
            css_color(spec.stroke),
            fmt_f64(spec.stroke_width)
        )
    } else {
        String::new()
    };

    match spec.kind {
        ShapeKind::Rectangle => {
            let _ = write!(
                body,
                "    <rect width=\"{}\" height=\"{}\" fill=\"{fill}\"{stroke}/>\n",
                fmt_f64(spec.width),
                fmt_f64(spec.height),
            );
        }
        ShapeKind::Ellipse => {
            let _ = write!(
                body,
                "    <ellipse cx=\"{}\" cy=\"{}\" rx=\"{}\" ry=\"{}\" fill=\"{fill}\"{stroke}/>\n",
                fmt_f64(spec.width / 2.0),
                fmt_f64(spec.height / 2.0),
                fmt_f64(spec.width / 2.0),
                fmt_f64(spec.height / 2.0),
            );
        }
        ShapeKind::Line => {
            let sw = if spec.stroke_width > 0.0 {
                spec.stroke_width
            } else {
                2.0
            };
            let _ = write!(
                body,
                "    <line x1=\"0\" y1=\"0\" x2=\"{}\" y2=\"{}\" stroke=\"{}\" stroke-width=\"{}\"/>\n",
                fmt_f64(spec.width),
                fmt_f64(spec.height),
                css_color(spec.fill),
                fmt_f64(sw),
            );
        }
    }
}

fn write_text(body: &mut String, spec: &TextSpec) {
    let anchor = match spec.align {
        TextAlign::Left => "start",
        TextAlign::Center => "middle",
        TextAlign::Right => "end",
    };
    let _ = write!(
        body,
        "    <text x=\"0\" y=\"0\" fill=\"{}\" font-size=\"{}\" font-family=\"{}\" font-weight=\"{}\" text-anchor=\"{anchor}\">{}</text>\n",
        css_color(spec.color),
        fmt_f32(spec.size_px),
        escape_xml(&spec.family),
        spec.weight,
        escape_xml(&spec.text),
    );
}

/// CSS `filter` shorthand matching the raster pipeline; `None` for the
/// identity filter so clean layers carry no style noise.
fn css_filter(f: &ColorFilter) -> Option<String> {
    if f.is_identity() {
        return None;
    }
    let mut out = String::new();
    if f.brightness != 1.0 {
        let _ = write!(out, "brightness({}) ", fmt_f32(f.brightness));
    }
    if f.contrast != 1.0 {
        let _ = write!(out, "contrast({}) ", fmt_f32(f.contrast));
    }
    if f.saturation != 1.0 {
        let _ = write!(out, "saturate({}) ", fmt_f32(f.saturation));
    }
    if f.hue_deg != 0.0 {
        let _ = write!(out, "hue-rotate({}deg) ", fmt_f32(f.hue_deg));
    }
    if f.blur_px != 0 {
        let _ = write!(out, "blur({}px) ", f.blur_px);
    }
    Some(out.trim_end().to_string())
}

fn css_color(c: Rgba8) -> String {
    if c.a == 255 {
        format!("rgb({},{},{})", c.r, c.g, c.b)
    } else {
        format!("rgba({},{},{},{})", c.r, c.g, c.b, fmt_f32(f32::from(c.a) / 255.0))
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

fn fmt_f64(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v:.3}")
    }
}

fn fmt_f32(v: f32) -> String {
    fmt_f64(f64::from(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{BlendMode, LayerId};

    fn shape_layer(spec: ShapeSpec) -> Layer {
        Layer::new(LayerId(1), "shape", LayerContent::Shape(spec))
    }

    #[test]
    fn png_export_decodes_back_to_the_same_pixels() {
        let mut surf = Surface::new(3, 2).unwrap();
        surf.fill([10, 20, 30, 255]);
        let bytes = encode_composite(&surf, ExportFormat::Png).unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30, 255]);
    }

    #[test]
    fn jpeg_quality_out_of_range_is_rejected() {
        let surf = Surface::new(2, 2).unwrap();
        assert!(matches!(
            encode_composite(&surf, ExportFormat::Jpeg { quality: 0 }),
            Err(StrataError::Export(_))
        ));
        assert!(matches!(
            encode_composite(&surf, ExportFormat::Jpeg { quality: 101 }),
            Err(StrataError::Export(_))
        ));
        assert!(encode_composite(&surf, ExportFormat::Jpeg { quality: 85 }).is_ok());
    }

    #[test]
    fn jpeg_export_decodes_to_canvas_dimensions() {
        let mut surf = Surface::new(5, 3).unwrap();
        surf.fill([255, 0, 0, 255]);
        let bytes = encode_composite(&surf, ExportFormat::Jpeg { quality: 90 }).unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (5, 3));
        assert!(img.get_pixel(2, 1).0[0] > 200);
    }

    #[test]
    fn webp_export_produces_a_riff_container() {
        let surf = Surface::new(4, 4).unwrap();
        let bytes = encode_composite(&surf, ExportFormat::WebpLossless).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[test]
    fn svg_carries_transform_opacity_and_blend() {
        let mut layer = shape_layer(ShapeSpec::default());
        layer.transform.x = 12.0;
        layer.transform.y = 8.0;
        layer.transform.rotation_deg = 45.0;
        layer.transform.scale = 2.0;
        layer.opacity = 0.5;
        layer.blend = BlendMode::Multiply;

        let svg = serialize_to_svg(&[layer], 400, 300).unwrap();
        assert!(svg.contains("translate(12 8) rotate(45) scale(2)"));
        assert!(svg.contains("opacity=\"0.500\""));
        assert!(svg.contains("mix-blend-mode:multiply"));
        assert!(svg.contains("<rect width=\"200\" height=\"150\""));
    }

    #[test]
    fn svg_gradient_shapes_emit_defs() {
        let spec = ShapeSpec {
            gradient: GradientMode::Vertical,
            ..ShapeSpec::default()
        };
        let svg = serialize_to_svg(&[shape_layer(spec)], 100, 100).unwrap();
        assert!(svg.contains("<linearGradient id=\"grad0\""));
        assert!(svg.contains("fill=\"url(#grad0)\""));
    }

    #[test]
    fn svg_text_is_escaped() {
        let spec = TextSpec {
            text: "a < b & \"c\"".to_string(),
            ..TextSpec::default()
        };
        let layer = Layer::new(LayerId(3), "t", LayerContent::Text(spec));
        let svg = serialize_to_svg(&[layer], 100, 100).unwrap();
        assert!(svg.contains("a &lt; b &amp; &quot;c&quot;"));
    }

    #[test]
    fn svg_hides_invisible_layers_and_embeds_rasters() {
        let mut bitmap = Surface::new(2, 2).unwrap();
        bitmap.fill([0, 0, 0, 255]);
        let raster = Layer::new(
            LayerId(1),
            "photo",
            LayerContent::Raster {
                bitmap,
                mask: None,
                painted: false,
            },
        );
        let mut hidden = shape_layer(ShapeSpec::default());
        hidden.visible = false;

        let svg = serialize_to_svg(&[raster, hidden], 50, 50).unwrap();
        assert!(svg.contains("data:image/png;base64,"));
        assert!(!svg.contains("<rect"));
    }

    #[test]
    fn svg_filter_string_follows_the_raster_pipeline_order() {
        let mut layer = shape_layer(ShapeSpec::default());
        layer.filter = ColorFilter {
            brightness: 1.2,
            contrast: 0.8,
            saturation: 1.0,
            blur_px: 3,
            hue_deg: 90.0,
        };
        let svg = serialize_to_svg(&[layer], 100, 100).unwrap();
        assert!(svg.contains("filter:brightness(1.200) contrast(0.800) hue-rotate(90deg) blur(3px)"));
    }
}
