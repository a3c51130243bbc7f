//! Text layer rasterization: parley shapes and lays out the string from the
//! host-supplied font bytes; vello_cpu renders the glyph runs into a
//! premultiplied pixmap that the compositor treats like any other local
//! surface.

use crate::{
    error::{StrataError, StrataResult},
    layer::TextSpec,
    surface::Surface,
};

/// Brush carried through the parley layout; one color per text layer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextBrush {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

pub struct TextRasterizer {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
}

impl Default for TextRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRasterizer {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    /// Lay out and rasterize the text into a tightly sized premultiplied
    /// surface.
    pub fn rasterize(&mut self, spec: &TextSpec) -> StrataResult<Surface> {
        if spec.text.is_empty() {
            return Err(StrataError::validation("text layer has no content"));
        }
        if !spec.size_px.is_finite() || spec.size_px <= 0.0 {
            return Err(StrataError::validation("text size_px must be finite and > 0"));
        }
        if spec.font_bytes.is_empty() {
            return Err(StrataError::validation(
                "text layer has no font bytes to shape with",
            ));
        }

        let layout = self.layout(spec)?;
        let width = (layout.width().ceil() as u32).max(1);
        let height = (layout.height().ceil() as u32).max(1);
        let w16: u16 = width
            .try_into()
            .map_err(|_| StrataError::evaluation("text raster width exceeds u16"))?;
        let h16: u16 = height
            .try_into()
            .map_err(|_| StrataError::evaluation("text raster height exceeds u16"))?;

        let font = vello_cpu::peniko::FontData::new(
            vello_cpu::peniko::Blob::from(spec.font_bytes.clone()),
            0,
        );

        let mut ctx = vello_cpu::RenderContext::new(w16, h16);
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let brush = run.style().brush;
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));
                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(&font)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
        ctx.flush();

        let mut pixmap = vello_cpu::Pixmap::new(w16, h16);
        ctx.render_to_pixmap(&mut pixmap);
        Surface::from_premul_bytes(width, height, pixmap.data_as_u8_slice().to_vec())
    }

    fn layout(&mut self, spec: &TextSpec) -> StrataResult<parley::Layout<TextBrush>> {
        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(spec.font_bytes.clone()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            StrataError::validation("no font families registered from font bytes")
        })?;
        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| StrataError::validation("registered font family has no name"))?
            .to_string();

        let brush = TextBrush {
            r: spec.color.r,
            g: spec.color.g,
            b: spec.color.b,
            a: spec.color.a,
        };

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, &spec.text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(spec.size_px));
        builder.push_default(parley::style::StyleProperty::FontWeight(
            parley::style::FontWeight::new(f32::from(spec.weight)),
        ));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrush> = builder.build(&spec.text);
        layout.break_all_lines(None);
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_rejected() {
        let mut r = TextRasterizer::new();
        let spec = TextSpec {
            text: String::new(),
            ..TextSpec::default()
        };
        assert!(matches!(
            r.rasterize(&spec),
            Err(StrataError::Validation(_))
        ));
    }

    #[test]
    fn missing_font_bytes_are_rejected() {
        let mut r = TextRasterizer::new();
        let spec = TextSpec::default();
        assert!(r.rasterize(&spec).is_err());
    }

    #[test]
    fn garbage_font_bytes_are_rejected() {
        let mut r = TextRasterizer::new();
        let spec = TextSpec {
            font_bytes: vec![0xde, 0xad, 0xbe, 0xef],
            ..TextSpec::default()
        };
        assert!(r.rasterize(&spec).is_err());
    }

    #[test]
    fn bad_size_is_rejected() {
        let mut r = TextRasterizer::new();
        let spec = TextSpec {
            size_px: 0.0,
            font_bytes: vec![1, 2, 3],
            ..TextSpec::default()
        };
        assert!(r.rasterize(&spec).is_err());
    }
}
