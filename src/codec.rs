//! Serialization seam between live pixel surfaces and history snapshots.
//!
//! Snapshots must be fully independent of live editing state; the codec
//! decides how the pixel payload is containerized. [`PngCodec`] keeps the
//! portable-image contract, [`RawCodec`] is a plain deep copy with the same
//! isolation guarantees.

use std::io::Cursor;

use crate::{
    error::{StrataError, StrataResult},
    surface::{Mask, Surface},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EncodedFormat {
    Png,
    Raw,
}

/// One encoded pixel payload inside a history snapshot.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EncodedImage {
    pub format: EncodedFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

pub trait SurfaceCodec {
    fn encode_surface(&self, surface: &Surface) -> StrataResult<EncodedImage>;
    fn decode_surface(&self, encoded: &EncodedImage) -> StrataResult<Surface>;
    fn encode_mask(&self, mask: &Mask) -> StrataResult<EncodedImage>;
    fn decode_mask(&self, encoded: &EncodedImage) -> StrataResult<Mask>;
}

/// PNG container codec. Samples are written premultiplied as stored, so a
/// decode restores the exact bytes that were encoded.
#[derive(Clone, Copy, Debug, Default)]
pub struct PngCodec;

impl SurfaceCodec for PngCodec {
    fn encode_surface(&self, surface: &Surface) -> StrataResult<EncodedImage> {
        let img = image::RgbaImage::from_raw(
            surface.width(),
            surface.height(),
            surface.data().to_vec(),
        )
        .ok_or_else(|| StrataError::snapshot("surface buffer does not match its dimensions"))?;
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| StrataError::snapshot(format!("png encode failed: {e}")))?;
        Ok(EncodedImage {
            format: EncodedFormat::Png,
            width: surface.width(),
            height: surface.height(),
            bytes,
        })
    }

    fn decode_surface(&self, encoded: &EncodedImage) -> StrataResult<Surface> {
        if encoded.format != EncodedFormat::Png {
            return Err(StrataError::snapshot("expected a png-encoded surface"));
        }
        let img = image::load_from_memory_with_format(&encoded.bytes, image::ImageFormat::Png)
            .map_err(|e| StrataError::snapshot(format!("png decode failed: {e}")))?
            .to_rgba8();
        if img.width() != encoded.width || img.height() != encoded.height {
            return Err(StrataError::snapshot("decoded surface dimensions mismatch"));
        }
        Surface::from_premul_bytes(encoded.width, encoded.height, img.into_raw())
    }

    fn encode_mask(&self, mask: &Mask) -> StrataResult<EncodedImage> {
        let img = image::GrayImage::from_raw(mask.width(), mask.height(), mask.data().to_vec())
            .ok_or_else(|| StrataError::snapshot("mask buffer does not match its dimensions"))?;
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| StrataError::snapshot(format!("png encode failed: {e}")))?;
        Ok(EncodedImage {
            format: EncodedFormat::Png,
            width: mask.width(),
            height: mask.height(),
            bytes,
        })
    }

    fn decode_mask(&self, encoded: &EncodedImage) -> StrataResult<Mask> {
        if encoded.format != EncodedFormat::Png {
            return Err(StrataError::snapshot("expected a png-encoded mask"));
        }
        let img = image::load_from_memory_with_format(&encoded.bytes, image::ImageFormat::Png)
            .map_err(|e| StrataError::snapshot(format!("png decode failed: {e}")))?
            .to_luma8();
        if img.width() != encoded.width || img.height() != encoded.height {
            return Err(StrataError::snapshot("decoded mask dimensions mismatch"));
        }
        Mask::from_bytes(encoded.width, encoded.height, img.into_raw())
    }
}

/// Buffer-copy codec. Cheaper than an image container while preserving the
/// deep-copy semantics snapshots rely on.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawCodec;

impl SurfaceCodec for RawCodec {
    fn encode_surface(&self, surface: &Surface) -> StrataResult<EncodedImage> {
        Ok(EncodedImage {
            format: EncodedFormat::Raw,
            width: surface.width(),
            height: surface.height(),
            bytes: surface.data().to_vec(),
        })
    }

    fn decode_surface(&self, encoded: &EncodedImage) -> StrataResult<Surface> {
        if encoded.format != EncodedFormat::Raw {
            return Err(StrataError::snapshot("expected a raw-encoded surface"));
        }
        Surface::from_premul_bytes(encoded.width, encoded.height, encoded.bytes.clone())
    }

    fn encode_mask(&self, mask: &Mask) -> StrataResult<EncodedImage> {
        Ok(EncodedImage {
            format: EncodedFormat::Raw,
            width: mask.width(),
            height: mask.height(),
            bytes: mask.data().to_vec(),
        })
    }

    fn decode_mask(&self, encoded: &EncodedImage) -> StrataResult<Mask> {
        if encoded.format != EncodedFormat::Raw {
            return Err(StrataError::snapshot("expected a raw-encoded mask"));
        }
        Mask::from_bytes(encoded.width, encoded.height, encoded.bytes.clone())
    }
}
