use crate::{
    geom::LayerTransform,
    surface::{Mask, Rgba8, Surface},
};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct LayerId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BlendMode {
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
}

impl BlendMode {
    /// CSS `mix-blend-mode` keyword, used verbatim in the SVG export.
    pub fn css_keyword(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Multiply => "multiply",
            Self::Screen => "screen",
            Self::Overlay => "overlay",
            Self::Darken => "darken",
            Self::Lighten => "lighten",
        }
    }
}

/// Per-layer color post-processing, applied before compositing.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ColorFilter {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub blur_px: u32,
    pub hue_deg: f32,
}

impl Default for ColorFilter {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
            blur_px: 0,
            hue_deg: 0.0,
        }
    }
}

impl ColorFilter {
    pub fn is_identity(&self) -> bool {
        self.brightness == 1.0
            && self.contrast == 1.0
            && self.saturation == 1.0
            && self.blur_px == 0
            && self.hue_deg == 0.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    Line,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GradientMode {
    None,
    Vertical,
    Horizontal,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ShapeSpec {
    pub kind: ShapeKind,
    pub width: f64,
    pub height: f64,
    pub fill: Rgba8,
    pub stroke: Rgba8,
    pub stroke_width: f64,
    pub gradient: GradientMode,
}

impl Default for ShapeSpec {
    fn default() -> Self {
        Self {
            kind: ShapeKind::Rectangle,
            width: 200.0,
            height: 150.0,
            fill: Rgba8::new(66, 133, 244, 255),
            stroke: Rgba8::BLACK,
            stroke_width: 0.0,
            gradient: GradientMode::None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TextBaseline {
    Top,
    Middle,
    Alphabetic,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextSpec {
    pub text: String,
    pub color: Rgba8,
    pub size_px: f32,
    pub weight: u16,
    pub align: TextAlign,
    pub baseline: TextBaseline,
    pub family: String,
    /// Raw font file contents, supplied by the host the same way it supplies
    /// decoded bitmaps. Empty bytes render nothing.
    pub font_bytes: Vec<u8>,
}

impl Default for TextSpec {
    fn default() -> Self {
        Self {
            text: "Text".to_string(),
            color: Rgba8::BLACK,
            size_px: 32.0,
            weight: 400,
            align: TextAlign::Left,
            baseline: TextBaseline::Alphabetic,
            family: "sans-serif".to_string(),
            font_bytes: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum LayerContent {
    Raster {
        bitmap: Surface,
        mask: Option<Mask>,
        /// Scratch layers created by the brush tool accept further strokes;
        /// imported photos do not.
        painted: bool,
    },
    Shape(ShapeSpec),
    Text(TextSpec),
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub blend: BlendMode,
    pub transform: LayerTransform,
    pub filter: ColorFilter,
    pub content: LayerContent,
}

impl Layer {
    pub fn new(id: LayerId, name: impl Into<String>, content: LayerContent) -> Self {
        Self {
            id,
            name: name.into(),
            visible: true,
            opacity: 1.0,
            blend: BlendMode::Normal,
            transform: LayerTransform::default(),
            filter: ColorFilter::default(),
            content,
        }
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = if opacity.is_finite() {
            opacity.clamp(0.0, 1.0)
        } else {
            1.0
        };
    }

    pub fn is_raster(&self) -> bool {
        matches!(self.content, LayerContent::Raster { .. })
    }

    pub fn as_raster_mut(&mut self) -> Option<(&mut Surface, &mut Option<Mask>)> {
        match &mut self.content {
            LayerContent::Raster { bitmap, mask, .. } => Some((bitmap, mask)),
            _ => None,
        }
    }

    /// Local-space extent used for hit-testing, transform handles and the
    /// SVG export. Text is an estimate from the font metrics; the renderer
    /// measures the real layout.
    pub fn local_size(&self) -> (f64, f64) {
        match &self.content {
            LayerContent::Raster { bitmap, .. } => {
                (f64::from(bitmap.width()), f64::from(bitmap.height()))
            }
            LayerContent::Shape(s) => (s.width.max(1.0), s.height.max(1.0)),
            LayerContent::Text(t) => {
                let w = f64::from(t.size_px) * 0.6 * t.text.chars().count().max(1) as f64;
                (w, f64::from(t.size_px) * 1.2)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opacity_clamps_on_write() {
        let mut layer = Layer::new(LayerId(1), "a", LayerContent::Shape(ShapeSpec::default()));
        layer.set_opacity(1.5);
        assert_eq!(layer.opacity, 1.0);
        layer.set_opacity(-0.2);
        assert_eq!(layer.opacity, 0.0);
        layer.set_opacity(f32::NAN);
        assert_eq!(layer.opacity, 1.0);
    }

    #[test]
    fn local_size_tracks_bitmap_dimensions() {
        let bitmap = Surface::new(64, 48).unwrap();
        let layer = Layer::new(
            LayerId(1),
            "photo",
            LayerContent::Raster {
                bitmap,
                mask: None,
                painted: false,
            },
        );
        assert_eq!(layer.local_size(), (64.0, 48.0));
    }

    #[test]
    fn layer_serde_roundtrip() {
        let layer = Layer::new(LayerId(7), "shape", LayerContent::Shape(ShapeSpec::default()));
        let json = serde_json::to_string(&layer).unwrap();
        let back: Layer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, layer);
    }
}
