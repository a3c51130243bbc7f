//! The editor session: one explicitly-constructed object owning the layer
//! store, history timeline, tool selection and pointer state machine. Hosts
//! feed it pointer/keyboard events in world coordinates and bind their
//! property panel to the accessor surface; nothing in here is global, so
//! independent sessions coexist freely.

use kurbo::{Point, Rect};

use crate::{
    codec::{PngCodec, SurfaceCodec},
    composite,
    error::{StrataError, StrataResult},
    export::{self, ExportFormat},
    history::History,
    interact::TransformDrag,
    layer::{BlendMode, ColorFilter, Layer, LayerContent, LayerId, ShapeSpec, TextSpec},
    mask::{self, MaskBrush},
    render::Compositor,
    store::LayerStore,
    surface::{Rgba8, Surface},
};

pub use crate::geom::CanvasSize;

/// Canvases are bounded so the synchronous pixel passes stay interactive.
pub const MAX_CANVAS_DIM: u32 = 1400;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tool {
    Move,
    Transform,
    MaskPaint,
    MaskErase,
    Cutout,
    Brush,
    Eraser,
    Text,
    Shape,
    Crop,
}

/// Direct bitmap painting settings (brush/eraser tools; the mask tools use
/// [`MaskBrush`]).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushSettings {
    pub size_px: f64,
    pub color: Rgba8,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            size_px: 24.0,
            color: Rgba8::BLACK,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CutoutSettings {
    pub tolerance: f64,
    pub feather_px: u32,
}

impl Default for CutoutSettings {
    fn default() -> Self {
        Self {
            tolerance: 32.0,
            feather_px: 2,
        }
    }
}

enum PointerSession {
    Idle,
    Moving { last: Point },
    Transforming(TransformDrag),
    MaskStroke { last: Point, erase: bool },
    BrushStroke { last: Point, erase: bool },
    CropDrag { start: Point, current: Point },
}

pub struct EditorSession {
    store: LayerStore,
    history: History,
    codec: Box<dyn SurfaceCodec>,
    compositor: Compositor,
    canvas: CanvasSize,
    view_scale: f64,
    output: Surface,
    tool: Tool,
    pointer: PointerSession,
    mutated: bool,
    pub mask_brush: MaskBrush,
    pub brush: BrushSettings,
    pub cutout: CutoutSettings,
    pub text_defaults: TextSpec,
    pub shape_defaults: ShapeSpec,
}

impl EditorSession {
    pub fn new(width: u32, height: u32) -> StrataResult<Self> {
        Self::with_codec(width, height, Box::new(PngCodec))
    }

    pub fn with_codec(
        width: u32,
        height: u32,
        codec: Box<dyn SurfaceCodec>,
    ) -> StrataResult<Self> {
        let width = width.clamp(1, MAX_CANVAS_DIM);
        let height = height.clamp(1, MAX_CANVAS_DIM);
        let output = Surface::new(width, height)?;
        let mut session = Self {
            store: LayerStore::new(),
            history: History::new(),
            codec,
            compositor: Compositor::new(),
            canvas: CanvasSize { width, height },
            view_scale: 1.0,
            output,
            tool: Tool::Move,
            pointer: PointerSession::Idle,
            mutated: false,
            mask_brush: MaskBrush::default(),
            brush: BrushSettings::default(),
            cutout: CutoutSettings::default(),
            text_defaults: TextSpec::default(),
            shape_defaults: ShapeSpec::default(),
        };
        // Baseline snapshot so the first edit can be undone back to empty.
        session
            .history
            .push(session.canvas, session.store.layers(), &*session.codec)?;
        Ok(session)
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    pub fn output(&self) -> &Surface {
        &self.output
    }

    pub fn layers(&self) -> &[Layer] {
        self.store.layers()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.store.active_index()
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.store.active_layer()
    }

    pub fn set_active(&mut self, index: usize) {
        self.store.set_active(index);
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        self.pointer = PointerSession::Idle;
    }

    // ----- host layout -----

    /// Size the output surface for a host container: logical canvas scaled
    /// down to fit `container_width`, multiplied by the device pixel ratio.
    pub fn fit_to_container(&mut self, container_width: u32, dpr: f64) -> StrataResult<()> {
        let dpr = if dpr.is_finite() && dpr > 0.0 { dpr } else { 1.0 };
        let fit = (f64::from(container_width) / f64::from(self.canvas.width)).min(1.0);
        self.view_scale = (fit * dpr).max(f64::MIN_POSITIVE);
        let w = ((f64::from(self.canvas.width) * self.view_scale).round() as u32).max(1);
        let h = ((f64::from(self.canvas.height) * self.view_scale).round() as u32).max(1);
        self.output = Surface::new(w, h)?;
        self.render()
    }

    /// Map a host/device pixel position into world coordinates.
    pub fn screen_to_world(&self, p: Point) -> Point {
        Point::new(p.x / self.view_scale, p.y / self.view_scale)
    }

    // ----- pointer session state machine -----

    pub fn pointer_down(&mut self, world: Point) -> StrataResult<()> {
        self.pointer = PointerSession::Idle;
        match self.tool {
            Tool::Move => {
                if self.store.active_layer().is_some() {
                    self.pointer = PointerSession::Moving { last: world };
                }
            }
            Tool::Transform => {
                if let Some(layer) = self.store.active_layer() {
                    if let Some(drag) = TransformDrag::begin(layer, world) {
                        self.pointer = PointerSession::Transforming(drag);
                    }
                }
            }
            Tool::MaskPaint | Tool::MaskErase => {
                let erase = self.tool == Tool::MaskErase;
                let brush = self.mask_brush;
                if let Some(layer) = self.store.active_layer_mut() {
                    if mask::paint_point(layer, world, &brush, erase) {
                        self.mutated = true;
                        self.pointer = PointerSession::MaskStroke { last: world, erase };
                    }
                }
            }
            Tool::Brush | Tool::Eraser => {
                let erase = self.tool == Tool::Eraser;
                self.ensure_paint_layer()?;
                self.stamp_brush(world, erase);
                self.pointer = PointerSession::BrushStroke { last: world, erase };
            }
            Tool::Text => {
                let mut spec = self.text_defaults.clone();
                if spec.text.is_empty() {
                    spec.text = "Text".to_string();
                }
                let id = self.store.add("Text", LayerContent::Text(spec));
                self.position_layer(id, world);
                self.mutated = true;
            }
            Tool::Shape => {
                let spec = self.shape_defaults.clone();
                let (w, h) = (spec.width, spec.height);
                let id = self.store.add("Shape", LayerContent::Shape(spec));
                self.position_layer(id, Point::new(world.x - w / 2.0, world.y - h / 2.0));
                self.mutated = true;
            }
            Tool::Cutout => {
                let settings = self.cutout;
                if let Some(layer) = self.store.active_layer_mut() {
                    if mask::auto_cutout(layer, world, settings.tolerance, settings.feather_px) {
                        self.mutated = true;
                    }
                }
            }
            Tool::Crop => {
                self.pointer = PointerSession::CropDrag {
                    start: world,
                    current: world,
                };
            }
        }
        Ok(())
    }

    pub fn pointer_move(&mut self, world: Point) -> StrataResult<()> {
        match &mut self.pointer {
            PointerSession::Idle => {}
            PointerSession::Moving { last } => {
                let from = *last;
                *last = world;
                if let Some(layer) = self.store.active_layer_mut() {
                    crate::interact::apply_move_delta(&mut layer.transform, from, world);
                    self.mutated = true;
                }
            }
            PointerSession::Transforming(drag) => {
                let mut drag_copy = *drag;
                if let Some(layer) = self.store.active_layer_mut() {
                    drag_copy.update(layer, world);
                    self.mutated = true;
                }
                self.pointer = PointerSession::Transforming(drag_copy);
            }
            PointerSession::MaskStroke { last, erase } => {
                let (from, erase) = (*last, *erase);
                *last = world;
                let brush = self.mask_brush;
                if let Some(layer) = self.store.active_layer_mut() {
                    if mask::paint_stroke(layer, from, world, &brush, erase) {
                        self.mutated = true;
                    }
                }
            }
            PointerSession::BrushStroke { last, erase } => {
                let (from, erase) = (*last, *erase);
                *last = world;
                self.stamp_brush_stroke(from, world, erase);
            }
            PointerSession::CropDrag { current, .. } => {
                *current = world;
            }
        }
        Ok(())
    }

    /// End the session: apply any pending crop, commit a snapshot if the
    /// drag mutated state, redraw.
    pub fn pointer_up(&mut self) -> StrataResult<()> {
        if let PointerSession::CropDrag { start, current } =
            std::mem::replace(&mut self.pointer, PointerSession::Idle)
        {
            let rect = Rect::from_points(start, current);
            if rect.width() >= 1.0 && rect.height() >= 1.0 {
                self.apply_crop(rect)?;
                self.mutated = true;
            }
        }
        if self.mutated {
            self.mutated = false;
            self.commit()?;
        }
        self.render()
    }

    // ----- structural layer operations (each commits a snapshot) -----

    pub fn add_shape_layer(&mut self, spec: ShapeSpec) -> StrataResult<LayerId> {
        let id = self.store.add("Shape", LayerContent::Shape(spec));
        self.commit()?;
        Ok(id)
    }

    pub fn add_text_layer(&mut self, spec: TextSpec) -> StrataResult<LayerId> {
        let id = self.store.add("Text", LayerContent::Text(spec));
        self.commit()?;
        Ok(id)
    }

    pub fn duplicate_layer(&mut self, index: usize) -> StrataResult<Option<LayerId>> {
        let id = self.store.duplicate(index);
        if id.is_some() {
            self.commit()?;
        }
        Ok(id)
    }

    pub fn move_layer_up(&mut self, index: usize) -> StrataResult<bool> {
        let moved = self.store.move_up(index);
        if moved {
            self.commit()?;
        }
        Ok(moved)
    }

    pub fn move_layer_down(&mut self, index: usize) -> StrataResult<bool> {
        let moved = self.store.move_down(index);
        if moved {
            self.commit()?;
        }
        Ok(moved)
    }

    pub fn delete_layer(&mut self, index: usize) -> StrataResult<bool> {
        let removed = self.store.delete(index);
        if removed {
            self.commit()?;
        }
        Ok(removed)
    }

    pub fn reorder_layer(&mut self, from: usize, to: usize) -> StrataResult<bool> {
        let moved = self.store.reorder(from, to);
        if moved {
            self.commit()?;
        }
        Ok(moved)
    }

    // ----- import / export boundaries -----

    /// Wrap a host-decoded image as a new raster layer, scaled down to fit
    /// the working canvas.
    pub fn import_bitmap(&mut self, img: image::RgbaImage) -> StrataResult<LayerId> {
        if img.width() == 0 || img.height() == 0 {
            return Err(StrataError::import("imported image has zero dimensions"));
        }
        let fit = (f64::from(self.canvas.width) / f64::from(img.width()))
            .min(f64::from(self.canvas.height) / f64::from(img.height()))
            .min(1.0);
        let img = if fit < 1.0 {
            let w = ((f64::from(img.width()) * fit).round() as u32).max(1);
            let h = ((f64::from(img.height()) * fit).round() as u32).max(1);
            image::imageops::resize(&img, w, h, image::imageops::FilterType::Triangle)
        } else {
            img
        };
        let bitmap = Surface::from_rgba_image(&img)?;
        let id = self.store.add(
            "Photo",
            LayerContent::Raster {
                bitmap,
                mask: None,
                painted: false,
            },
        );
        self.commit()?;
        self.render()?;
        Ok(id)
    }

    /// Decode-and-import for hosts handing over raw file bytes. A decode
    /// failure creates no layer.
    pub fn import_encoded(&mut self, bytes: &[u8]) -> StrataResult<LayerId> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| StrataError::import(format!("image decode failed: {e}")))?
            .to_rgba8();
        self.import_bitmap(img)
    }

    /// Flatten and encode the composite at full canvas resolution. A failed
    /// encode leaves all pixel state untouched.
    pub fn export_composite(&mut self, format: ExportFormat) -> StrataResult<Vec<u8>> {
        let mut flat = Surface::new(self.canvas.width, self.canvas.height)?;
        self.compositor.render(self.store.layers(), &mut flat)?;
        export::encode_composite(&flat, format)
    }

    /// Best-effort vector serialization; raster masks are not reproduced.
    pub fn export_svg(&mut self) -> StrataResult<String> {
        export::serialize_to_svg(self.store.layers(), self.canvas.width, self.canvas.height)
    }

    // ----- history -----

    /// Record the current document state as a new snapshot.
    pub fn commit(&mut self) -> StrataResult<()> {
        self.history
            .push(self.canvas, self.store.layers(), &*self.codec)
    }

    pub fn undo(&mut self) -> StrataResult<bool> {
        match self.history.undo(&*self.codec) {
            Ok(Some((canvas, layers))) => {
                self.set_canvas(canvas)?;
                self.store.restore(layers);
                self.render()?;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) => {
                tracing::warn!(error = %err, "undo failed; live state unchanged");
                Err(err)
            }
        }
    }

    pub fn redo(&mut self) -> StrataResult<bool> {
        match self.history.redo(&*self.codec) {
            Ok(Some((canvas, layers))) => {
                self.set_canvas(canvas)?;
                self.store.restore(layers);
                self.render()?;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) => {
                tracing::warn!(error = %err, "redo failed; live state unchanged");
                Err(err)
            }
        }
    }

    /// Keyboard bindings onto the same dispatch: single-letter tool
    /// mnemonics and Ctrl/Cmd+Z (+Shift for redo). Returns whether the key
    /// was consumed.
    pub fn handle_key(&mut self, key: &str, ctrl_or_cmd: bool, shift: bool) -> StrataResult<bool> {
        let key = key.to_ascii_lowercase();
        if ctrl_or_cmd && key == "z" {
            if shift {
                self.redo()?;
            } else {
                self.undo()?;
            }
            return Ok(true);
        }
        if ctrl_or_cmd {
            return Ok(false);
        }
        let tool = match key.as_str() {
            "v" => Tool::Move,
            "t" => Tool::Transform,
            "b" => Tool::Brush,
            "e" => Tool::Eraser,
            "m" => Tool::MaskPaint,
            "u" => Tool::MaskErase,
            "k" => Tool::Cutout,
            "x" => Tool::Text,
            "s" => Tool::Shape,
            "c" => Tool::Crop,
            _ => return Ok(false),
        };
        self.set_tool(tool);
        Ok(true)
    }

    // ----- property panel bindings -----

    pub fn set_active_name(&mut self, name: impl Into<String>) {
        if let Some(layer) = self.store.active_layer_mut() {
            layer.name = name.into();
        }
    }

    pub fn set_active_visible(&mut self, visible: bool) {
        if let Some(layer) = self.store.active_layer_mut() {
            layer.visible = visible;
        }
    }

    pub fn set_active_opacity(&mut self, opacity: f32) {
        if let Some(layer) = self.store.active_layer_mut() {
            layer.set_opacity(opacity);
        }
    }

    pub fn set_active_blend(&mut self, blend: BlendMode) {
        if let Some(layer) = self.store.active_layer_mut() {
            layer.blend = blend;
        }
    }

    pub fn set_active_position(&mut self, x: f64, y: f64) {
        if let Some(layer) = self.store.active_layer_mut() {
            layer.transform.x = x;
            layer.transform.y = y;
        }
    }

    pub fn set_active_scale(&mut self, scale: f64) {
        if let Some(layer) = self.store.active_layer_mut() {
            layer.transform.set_scale(scale);
        }
    }

    pub fn set_active_rotation(&mut self, degrees: f64) {
        if let Some(layer) = self.store.active_layer_mut() {
            layer.transform.rotation_deg = degrees;
        }
    }

    pub fn set_active_filter(&mut self, filter: ColorFilter) {
        if let Some(layer) = self.store.active_layer_mut() {
            layer.filter = filter;
        }
    }

    // ----- rendering -----

    /// Recomposite into the owned output surface at the current view scale.
    pub fn render(&mut self) -> StrataResult<()> {
        let view = kurbo::Affine::scale(self.view_scale);
        self.compositor
            .render_with_view(self.store.layers(), &mut self.output, view)
    }

    // ----- internals -----

    fn position_layer(&mut self, id: LayerId, at: Point) {
        if let Some(index) = self.store.layers().iter().position(|l| l.id == id) {
            if let Some(layer) = self.store.layer_mut(index) {
                layer.transform.x = at.x;
                layer.transform.y = at.y;
            }
        }
    }

    /// Brush/eraser target: the active scratch raster layer, or a fresh
    /// canvas-sized one when the active layer is not paintable.
    fn ensure_paint_layer(&mut self) -> StrataResult<()> {
        let paintable = matches!(
            self.store.active_layer().map(|l| &l.content),
            Some(LayerContent::Raster { painted: true, .. })
        );
        if !paintable {
            let bitmap = Surface::new(self.canvas.width, self.canvas.height)?;
            self.store.add(
                "Paint",
                LayerContent::Raster {
                    bitmap,
                    mask: None,
                    painted: true,
                },
            );
        }
        Ok(())
    }

    fn stamp_brush(&mut self, world: Point, erase: bool) {
        let brush = self.brush;
        let Some(layer) = self.store.active_layer_mut() else {
            return;
        };
        let transform = layer.transform;
        let Some((bitmap, _)) = layer.as_raster_mut() else {
            return;
        };

        let center = transform.to_local(world);
        let radius = (brush.size_px / 2.0 / transform.scale.max(f64::EPSILON)).max(0.5);
        let color = brush.color.premul();

        let x0 = (center.x - radius).floor().max(0.0) as i64;
        let y0 = (center.y - radius).floor().max(0.0) as i64;
        let x1 = (center.x + radius).ceil().min(f64::from(bitmap.width())) as i64;
        let y1 = (center.y + radius).ceil().min(f64::from(bitmap.height())) as i64;

        for y in y0..y1 {
            for x in x0..x1 {
                let dx = (x as f64 + 0.5) - center.x;
                let dy = (y as f64 + 0.5) - center.y;
                let d = radius - (dx * dx + dy * dy).sqrt();
                let cov = (d + 0.5).clamp(0.0, 1.0) as f32;
                if cov <= 0.0 {
                    continue;
                }
                let dst = bitmap.pixel(x as u32, y as u32);
                let out = if erase {
                    // Destination-out: carve coverage out of every channel.
                    let keep = ((1.0 - cov) * 255.0).round() as u16;
                    [
                        composite::mul_div255(u16::from(dst[0]), keep),
                        composite::mul_div255(u16::from(dst[1]), keep),
                        composite::mul_div255(u16::from(dst[2]), keep),
                        composite::mul_div255(u16::from(dst[3]), keep),
                    ]
                } else {
                    composite::over(dst, color, cov)
                };
                bitmap.set_pixel(x as u32, y as u32, out);
            }
        }
        self.mutated = true;
    }

    fn stamp_brush_stroke(&mut self, from: Point, to: Point, erase: bool) {
        let step = (self.brush.size_px / 2.0).max(1.0);
        let dist = from.distance(to);
        let steps = (dist / step).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let p = Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t);
            self.stamp_brush(p, erase);
        }
    }

    /// Crop the canvas to a world rect: canvas dimensions shrink and every
    /// layer is re-based so the rect origin becomes the new world origin.
    fn apply_crop(&mut self, rect: Rect) -> StrataResult<()> {
        let w = (rect.width().round() as u32).clamp(1, MAX_CANVAS_DIM);
        let h = (rect.height().round() as u32).clamp(1, MAX_CANVAS_DIM);
        for i in 0..self.store.len() {
            if let Some(layer) = self.store.layer_mut(i) {
                layer.transform.x -= rect.x0;
                layer.transform.y -= rect.y0;
            }
        }
        self.set_canvas(CanvasSize {
            width: w,
            height: h,
        })
    }

    /// Adopt new canvas dimensions (crop, or a snapshot restore crossing a
    /// crop) and re-size the output surface to match at the current view
    /// scale.
    fn set_canvas(&mut self, canvas: CanvasSize) -> StrataResult<()> {
        if canvas == self.canvas {
            return Ok(());
        }
        self.canvas = canvas;
        let w = ((f64::from(canvas.width) * self.view_scale).round() as u32).max(1);
        let h = ((f64::from(canvas.height) * self.view_scale).round() as u32).max(1);
        self.output = Surface::new(w, h)?;
        Ok(())
    }
}
