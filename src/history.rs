//! Bounded linear undo/redo timeline.
//!
//! Every snapshot is fully self-contained: the canvas dimensions plus the
//! layer list with each bitmap/mask run through the surface codec, so no
//! snapshot ever aliases live editing state. Pushing past the cap evicts
//! the oldest entry; pushing while undone discards the redo tail.

use crate::{
    codec::{EncodedImage, SurfaceCodec},
    error::{StrataError, StrataResult},
    geom::{CanvasSize, LayerTransform},
    layer::{BlendMode, ColorFilter, Layer, LayerContent, LayerId, ShapeSpec, TextSpec},
};

pub const HISTORY_CAP: usize = 40;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    canvas: CanvasSize,
    layers: Vec<LayerRecord>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
struct LayerRecord {
    id: LayerId,
    name: String,
    visible: bool,
    opacity: f32,
    blend: BlendMode,
    transform: LayerTransform,
    filter: ColorFilter,
    content: ContentRecord,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
enum ContentRecord {
    Raster {
        bitmap: EncodedImage,
        mask: Option<EncodedImage>,
        painted: bool,
    },
    Shape(ShapeSpec),
    Text(TextSpec),
}

#[derive(Default)]
pub struct History {
    snapshots: Vec<Snapshot>,
    /// Position of the snapshot matching the live state; `None` until the
    /// first push.
    index: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn can_undo(&self) -> bool {
        self.index.is_some_and(|i| i > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.index
            .is_some_and(|i| i + 1 < self.snapshots.len())
    }

    /// Record the document state. Truncates the redo tail, appends, evicts
    /// the oldest entry past the cap.
    pub fn push(
        &mut self,
        canvas: CanvasSize,
        layers: &[Layer],
        codec: &dyn SurfaceCodec,
    ) -> StrataResult<()> {
        let snapshot = encode_snapshot(canvas, layers, codec)?;
        if let Some(i) = self.index {
            self.snapshots.truncate(i + 1);
        }
        self.snapshots.push(snapshot);
        if self.snapshots.len() > HISTORY_CAP {
            let excess = self.snapshots.len() - HISTORY_CAP;
            self.snapshots.drain(0..excess);
        }
        self.index = Some(self.snapshots.len() - 1);
        tracing::debug!(
            entries = self.snapshots.len(),
            "history snapshot recorded"
        );
        Ok(())
    }

    /// Step back and decode that snapshot. `Ok(None)` at the start of the
    /// timeline. A decode failure leaves the position and live state
    /// untouched.
    pub fn undo(
        &mut self,
        codec: &dyn SurfaceCodec,
    ) -> StrataResult<Option<(CanvasSize, Vec<Layer>)>> {
        let Some(i) = self.index.filter(|&i| i > 0) else {
            return Ok(None);
        };
        let layers = decode_snapshot(&self.snapshots[i - 1], codec)?;
        self.index = Some(i - 1);
        Ok(Some((self.snapshots[i - 1].canvas, layers)))
    }

    /// Step forward; mirror of [`undo`](Self::undo).
    pub fn redo(
        &mut self,
        codec: &dyn SurfaceCodec,
    ) -> StrataResult<Option<(CanvasSize, Vec<Layer>)>> {
        let Some(i) = self.index.filter(|&i| i + 1 < self.snapshots.len()) else {
            return Ok(None);
        };
        let layers = decode_snapshot(&self.snapshots[i + 1], codec)?;
        self.index = Some(i + 1);
        Ok(Some((self.snapshots[i + 1].canvas, layers)))
    }

    #[cfg(test)]
    fn corrupt_entry(&mut self, at: usize) {
        if let Some(snap) = self.snapshots.get_mut(at) {
            for record in &mut snap.layers {
                if let ContentRecord::Raster { bitmap, .. } = &mut record.content {
                    bitmap.bytes.clear();
                }
            }
        }
    }
}

fn encode_snapshot(
    canvas: CanvasSize,
    layers: &[Layer],
    codec: &dyn SurfaceCodec,
) -> StrataResult<Snapshot> {
    let mut records = Vec::with_capacity(layers.len());
    for layer in layers {
        let content = match &layer.content {
            LayerContent::Raster {
                bitmap,
                mask,
                painted,
            } => ContentRecord::Raster {
                bitmap: codec.encode_surface(bitmap)?,
                mask: mask.as_ref().map(|m| codec.encode_mask(m)).transpose()?,
                painted: *painted,
            },
            LayerContent::Shape(spec) => ContentRecord::Shape(spec.clone()),
            LayerContent::Text(spec) => ContentRecord::Text(spec.clone()),
        };
        records.push(LayerRecord {
            id: layer.id,
            name: layer.name.clone(),
            visible: layer.visible,
            opacity: layer.opacity,
            blend: layer.blend,
            transform: layer.transform,
            filter: layer.filter,
            content,
        });
    }
    Ok(Snapshot {
        canvas,
        layers: records,
    })
}

fn decode_snapshot(snapshot: &Snapshot, codec: &dyn SurfaceCodec) -> StrataResult<Vec<Layer>> {
    let mut layers = Vec::with_capacity(snapshot.layers.len());
    for record in &snapshot.layers {
        let content = match &record.content {
            ContentRecord::Raster {
                bitmap,
                mask,
                painted,
            } => {
                let bitmap = codec.decode_surface(bitmap)?;
                let mask = mask.as_ref().map(|m| codec.decode_mask(m)).transpose()?;
                if let Some(mask) = &mask {
                    if mask.width() != bitmap.width() || mask.height() != bitmap.height() {
                        return Err(StrataError::snapshot(
                            "snapshot mask dimensions do not match its bitmap",
                        ));
                    }
                }
                LayerContent::Raster {
                    bitmap,
                    mask,
                    painted: *painted,
                }
            }
            ContentRecord::Shape(spec) => LayerContent::Shape(spec.clone()),
            ContentRecord::Text(spec) => LayerContent::Text(spec.clone()),
        };
        layers.push(Layer {
            id: record.id,
            name: record.name.clone(),
            visible: record.visible,
            opacity: record.opacity,
            blend: record.blend,
            transform: record.transform,
            filter: record.filter,
            content,
        });
    }
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::PngCodec,
        surface::Surface,
    };

    const CANVAS: CanvasSize = CanvasSize {
        width: 64,
        height: 64,
    };

    fn raster_layers(tag: u8) -> Vec<Layer> {
        let mut bitmap = Surface::new(2, 2).unwrap();
        bitmap.fill([tag, tag, tag, 255]);
        vec![Layer::new(
            LayerId(u64::from(tag)),
            format!("layer-{tag}"),
            LayerContent::Raster {
                bitmap,
                mask: None,
                painted: false,
            },
        )]
    }

    #[test]
    fn undo_redo_roundtrip_restores_exactly() {
        let codec = PngCodec;
        let mut h = History::new();
        let s1 = raster_layers(1);
        let s2 = raster_layers(2);
        h.push(CANVAS, &s1, &codec).unwrap();
        h.push(CANVAS, &s2, &codec).unwrap();

        let (_, restored) = h.undo(&codec).unwrap().unwrap();
        assert_eq!(restored, s1);
        let (_, restored) = h.redo(&codec).unwrap().unwrap();
        assert_eq!(restored, s2);
    }

    #[test]
    fn snapshots_carry_their_canvas_dimensions() {
        let codec = PngCodec;
        let mut h = History::new();
        h.push(CANVAS, &raster_layers(1), &codec).unwrap();
        let cropped = CanvasSize {
            width: 32,
            height: 24,
        };
        h.push(cropped, &raster_layers(2), &codec).unwrap();

        let (canvas, _) = h.undo(&codec).unwrap().unwrap();
        assert_eq!(canvas, CANVAS);
        let (canvas, _) = h.redo(&codec).unwrap().unwrap();
        assert_eq!(canvas, cropped);
    }

    #[test]
    fn undo_at_start_and_redo_at_end_are_no_ops() {
        let codec = PngCodec;
        let mut h = History::new();
        assert!(h.undo(&codec).unwrap().is_none());
        h.push(CANVAS, &raster_layers(1), &codec).unwrap();
        assert!(h.undo(&codec).unwrap().is_none());
        assert!(h.redo(&codec).unwrap().is_none());
    }

    #[test]
    fn push_caps_at_40_dropping_oldest() {
        let codec = PngCodec;
        let mut h = History::new();
        for i in 0..45u8 {
            h.push(CANVAS, &raster_layers(i), &codec).unwrap();
        }
        assert_eq!(h.len(), HISTORY_CAP);
        assert_eq!(h.index(), Some(HISTORY_CAP - 1));

        // Walk back to the oldest surviving entry: number 5.
        let mut last = None;
        while let Some((_, layers)) = h.undo(&codec).unwrap() {
            last = Some(layers);
        }
        assert_eq!(last.unwrap()[0].name, "layer-5");
    }

    #[test]
    fn push_after_undo_discards_redo_tail() {
        let codec = PngCodec;
        let mut h = History::new();
        h.push(CANVAS, &raster_layers(1), &codec).unwrap();
        h.push(CANVAS, &raster_layers(2), &codec).unwrap();
        h.push(CANVAS, &raster_layers(3), &codec).unwrap();
        h.undo(&codec).unwrap().unwrap();
        h.push(CANVAS, &raster_layers(9), &codec).unwrap();
        assert!(!h.can_redo());
        assert_eq!(h.undo(&codec).unwrap().unwrap().1[0].name, "layer-2");
    }

    #[test]
    fn corrupt_snapshot_fails_without_moving_the_index() {
        let codec = PngCodec;
        let mut h = History::new();
        h.push(CANVAS, &raster_layers(1), &codec).unwrap();
        h.push(CANVAS, &raster_layers(2), &codec).unwrap();
        h.corrupt_entry(0);

        let before = h.index();
        assert!(matches!(h.undo(&codec), Err(StrataError::Snapshot(_))));
        assert_eq!(h.index(), before);
    }
}
