use crate::{
    error::{StrataError, StrataResult},
    surface::{Mask, Surface},
};

/// Separable gaussian blur over a premultiplied RGBA surface, Q16 fixed
/// point. Used by the per-layer blur filter.
pub fn gaussian_blur(surface: &Surface, radius: u32, sigma: f32) -> StrataResult<Surface> {
    if radius == 0 {
        return Ok(surface.clone());
    }
    let kernel = gaussian_kernel_q16(radius, sigma)?;
    let (w, h) = (surface.width(), surface.height());
    let mut tmp = vec![0u8; surface.data().len()];
    let mut out = vec![0u8; surface.data().len()];

    horizontal_pass(surface.data(), &mut tmp, w, h, &kernel);
    vertical_pass(&tmp, &mut out, w, h, &kernel);
    Surface::from_premul_bytes(w, h, out)
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> StrataResult<Vec<u32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(StrataError::validation("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    let mut weights_f = Vec::<f64>::with_capacity((2 * r + 1) as usize);
    let mut sum = 0.0f64;
    for i in -r..=r {
        let x = f64::from(i);
        let w = (-x * x / denom).exp();
        weights_f.push(w);
        sum += w;
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = ((wf / sum) * 65536.0).round() as i64;
        let q = q.clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    // Force the quantized kernel to sum to exactly 1.0 so constant regions
    // stay constant.
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        let adjusted = (i64::from(weights[mid]) + delta).clamp(0, 65536);
        weights[mid] = adjusted as u32;
    }
    Ok(weights)
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    for y in 0..height as i32 {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sx = (x + ki as i32 - radius).clamp(0, w - 1);
                let idx = ((y * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out_idx = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out_idx + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    let h = height as i32;
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sy = (y + ki as i32 - radius).clamp(0, h - 1);
                let idx = ((sy * w + x) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out_idx = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out_idx + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn q16_to_u8(acc: u64) -> u8 {
    (((acc + 32768) >> 16).min(255)) as u8
}

/// Separable running-sum box blur on a single-channel mask; this is the
/// feather pass after an auto-cutout fill.
pub fn box_blur_mask(mask: &mut Mask, radius: u32) {
    if radius == 0 {
        return;
    }
    let w = mask.width() as usize;
    let h = mask.height() as usize;
    let r = radius as usize;
    let window = (2 * r + 1) as u32;
    let mut tmp = vec![0u8; w * h];

    // Horizontal pass into tmp.
    for y in 0..h {
        let row = &mask.data()[y * w..(y + 1) * w];
        let mut sum: u32 = 0;
        for i in -(r as i64)..=(r as i64) {
            sum += u32::from(row[i.clamp(0, w as i64 - 1) as usize]);
        }
        for x in 0..w {
            tmp[y * w + x] = ((sum + window / 2) / window) as u8;
            let leave = (x as i64 - r as i64).clamp(0, w as i64 - 1) as usize;
            let enter = (x as i64 + r as i64 + 1).clamp(0, w as i64 - 1) as usize;
            sum = sum + u32::from(row[enter]) - u32::from(row[leave]);
        }
    }

    // Vertical pass back into the mask.
    let data = mask.data_mut();
    for x in 0..w {
        let mut sum: u32 = 0;
        for i in -(r as i64)..=(r as i64) {
            let sy = i.clamp(0, h as i64 - 1) as usize;
            sum += u32::from(tmp[sy * w + x]);
        }
        for y in 0..h {
            data[y * w + x] = ((sum + window / 2) / window) as u8;
            let leave = (y as i64 - r as i64).clamp(0, h as i64 - 1) as usize;
            let enter = (y as i64 + r as i64 + 1).clamp(0, h as i64 - 1) as usize;
            sum = sum + u32::from(tmp[enter * w + x]) - u32::from(tmp[leave * w + x]);
        }
    }
}
