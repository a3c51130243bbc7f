//! strata: a layered image compositing and editing engine.
//!
//! The crate models an editing document as an ordered stack of layers
//! (imported photos, brush scratch rasters, vector shapes, text), each with
//! its own transform, opacity, blend mode, color filter and optional raster
//! mask. A CPU compositor flattens the stack into a premultiplied RGBA
//! surface; an [`session::EditorSession`] wraps the whole thing behind a
//! pointer/keyboard event surface with bounded undo/redo.
//!
//! Everything is synchronous and single-threaded; hosts drive the session
//! from their own event loop and read pixels out of
//! [`session::EditorSession::output`].

#![forbid(unsafe_code)]

pub mod blur;
pub mod codec;
pub mod composite;
pub mod error;
pub mod export;
pub mod filter;
pub mod geom;
pub mod history;
pub mod interact;
pub mod layer;
pub mod mask;
pub mod render;
pub mod session;
pub mod shape_raster;
pub mod store;
pub mod surface;
pub mod text_raster;

pub use error::{StrataError, StrataResult};
pub use export::ExportFormat;
pub use geom::LayerTransform;
pub use history::{History, HISTORY_CAP};
pub use layer::{
    BlendMode, ColorFilter, GradientMode, Layer, LayerContent, LayerId, ShapeKind, ShapeSpec,
    TextAlign, TextBaseline, TextSpec,
};
pub use mask::MaskBrush;
pub use render::Compositor;
pub use session::{BrushSettings, CanvasSize, CutoutSettings, EditorSession, Tool, MAX_CANVAS_DIM};
pub use store::LayerStore;
pub use surface::{Mask, Rgba8, Surface};
