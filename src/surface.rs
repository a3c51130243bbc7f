use crate::error::{StrataError, StrataResult};

/// Straight-alpha RGBA color used by shape/text specs and the property panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const BLACK: Self = Self::new(0, 0, 0, 255);

    pub fn premul(self) -> [u8; 4] {
        fn mul(c: u8, a: u8) -> u8 {
            ((u16::from(c) * u16::from(a) + 127) / 255) as u8
        }
        [
            mul(self.r, self.a),
            mul(self.g, self.a),
            mul(self.b, self.a),
            self.a,
        ]
    }

    /// Two-stop gradient companion: the fill color pushed toward white.
    pub fn lightened(self, amount: f32) -> Self {
        let t = amount.clamp(0.0, 1.0);
        let lift = |c: u8| -> u8 { (f32::from(c) + (255.0 - f32::from(c)) * t).round() as u8 };
        Self::new(lift(self.r), lift(self.g), lift(self.b), self.a)
    }
}

/// Premultiplied RGBA8 pixel buffer. Exclusively owned by its layer;
/// `Clone` always deep-copies the data.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> StrataResult<Self> {
        let len = byte_len(width, height, 4)?;
        Ok(Self {
            width,
            height,
            data: vec![0u8; len],
        })
    }

    pub fn from_premul_bytes(width: u32, height: u32, data: Vec<u8>) -> StrataResult<Self> {
        if data.len() != byte_len(width, height, 4)? {
            return Err(StrataError::evaluation(
                "surface byte length must be width*height*4",
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Wrap a straight-alpha decoded image, premultiplying every pixel.
    pub fn from_rgba_image(img: &image::RgbaImage) -> StrataResult<Self> {
        let mut out = Self::new(img.width(), img.height())?;
        for (dst, src) in out.data.chunks_exact_mut(4).zip(img.pixels()) {
            let px = Rgba8::new(src[0], src[1], src[2], src[3]).premul();
            dst.copy_from_slice(&px);
        }
        Ok(out)
    }

    /// Unpremultiply into a straight-alpha image for the export encoders.
    pub fn to_rgba_image(&self) -> StrataResult<image::RgbaImage> {
        let mut bytes = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(4) {
            let a = px[3];
            if a == 0 {
                bytes.extend_from_slice(&[0, 0, 0, 0]);
            } else {
                let un = |c: u8| -> u8 {
                    ((u32::from(c) * 255 + u32::from(a) / 2) / u32::from(a)).min(255) as u8
                };
                bytes.extend_from_slice(&[un(px[0]), un(px[1]), un(px[2]), a]);
            }
        }
        image::RgbaImage::from_raw(self.width, self.height, bytes)
            .ok_or_else(|| StrataError::evaluation("surface to image conversion failed"))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn fill(&mut self, premul: [u8; 4]) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&premul);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, premul: [u8; 4]) {
        let i = ((y * self.width + x) * 4) as usize;
        self.data[i..i + 4].copy_from_slice(&premul);
    }

    /// Bilinear sample in pixel coordinates; reads outside the surface
    /// contribute transparent black, so edges fade rather than smear.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> [f32; 4] {
        let fx = x - 0.5;
        let fy = y - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = (fx - x0) as f32;
        let ty = (fy - y0) as f32;

        let tap = |ix: i64, iy: i64| -> [f32; 4] {
            if ix < 0 || iy < 0 || ix >= i64::from(self.width) || iy >= i64::from(self.height) {
                return [0.0; 4];
            }
            let px = self.pixel(ix as u32, iy as u32);
            [
                f32::from(px[0]),
                f32::from(px[1]),
                f32::from(px[2]),
                f32::from(px[3]),
            ]
        };

        let p00 = tap(x0 as i64, y0 as i64);
        let p10 = tap(x0 as i64 + 1, y0 as i64);
        let p01 = tap(x0 as i64, y0 as i64 + 1);
        let p11 = tap(x0 as i64 + 1, y0 as i64 + 1);

        let mut out = [0.0f32; 4];
        for c in 0..4 {
            let top = p00[c] * (1.0 - tx) + p10[c] * tx;
            let bot = p01[c] * (1.0 - tx) + p11[c] * tx;
            out[c] = top * (1.0 - ty) + bot * ty;
        }
        out
    }
}

/// Single-channel alpha matte gating a raster layer's visibility.
/// 255 is fully visible; freshly allocated masks hide nothing.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Mask {
    pub fn opaque(width: u32, height: u32) -> StrataResult<Self> {
        let len = byte_len(width, height, 1)?;
        Ok(Self {
            width,
            height,
            data: vec![255u8; len],
        })
    }

    pub fn hidden(width: u32, height: u32) -> StrataResult<Self> {
        let len = byte_len(width, height, 1)?;
        Ok(Self {
            width,
            height,
            data: vec![0u8; len],
        })
    }

    pub fn from_bytes(width: u32, height: u32, data: Vec<u8>) -> StrataResult<Self> {
        if data.len() != byte_len(width, height, 1)? {
            return Err(StrataError::evaluation(
                "mask byte length must be width*height",
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn value(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }

    pub fn set_value(&mut self, x: u32, y: u32, v: u8) {
        self.data[(y * self.width + x) as usize] = v;
    }
}

fn byte_len(width: u32, height: u32, channels: usize) -> StrataResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(channels))
        .filter(|_| width > 0 && height > 0)
        .ok_or_else(|| StrataError::evaluation("surface dimensions must be non-zero and in range"))
}
