use crate::layer::BlendMode;

pub type PremulRgba8 = [u8; 4];

/// Composite one source pixel over a destination pixel.
///
/// Both pixels are premultiplied RGBA8. Normal mode stays in u8 fixed
/// point; the separable blend modes unpremultiply, blend per the CSS
/// compositing formulas, and re-premultiply in f32.
pub fn blend_px(dst: PremulRgba8, src: PremulRgba8, opacity: f32, mode: BlendMode) -> PremulRgba8 {
    match mode {
        BlendMode::Normal => over(dst, src, opacity),
        _ => blended_over(dst, src, opacity, mode),
    }
}

pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = u8::saturating_add(sa, mul_div255(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = u8::saturating_add(sc, dc);
    }
    out
}

fn blended_over(dst: PremulRgba8, src: PremulRgba8, opacity: f32, mode: BlendMode) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let sa = f32::from(src[3]) / 255.0 * opacity;
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }

    let unpremul = |px: PremulRgba8, a_raw: u8| -> [f32; 3] {
        if a_raw == 0 {
            return [0.0; 3];
        }
        let a = f32::from(a_raw);
        [
            f32::from(px[0]) / a,
            f32::from(px[1]) / a,
            f32::from(px[2]) / a,
        ]
    };
    let cs = unpremul(src, src[3]);
    let cb = unpremul(dst, dst[3]);

    let mut out = [0u8; 4];
    out[3] = ((out_a * 255.0).round()).clamp(0.0, 255.0) as u8;
    for i in 0..3 {
        let b = blend_channel(cb[i], cs[i], mode);
        // W3C compositing: Cs mixed with B(Cb,Cs) by the backdrop coverage,
        // then source-over against the backdrop color.
        let co = sa * (1.0 - da) * cs[i] + sa * da * b + (1.0 - sa) * da * cb[i];
        out[i] = ((co * 255.0).round()).clamp(0.0, 255.0) as u8;
    }
    out
}

fn blend_channel(cb: f32, cs: f32, mode: BlendMode) -> f32 {
    match mode {
        BlendMode::Normal => cs,
        BlendMode::Multiply => cb * cs,
        BlendMode::Screen => cb + cs - cb * cs,
        BlendMode::Overlay => {
            if cb <= 0.5 {
                2.0 * cb * cs
            } else {
                1.0 - 2.0 * (1.0 - cb) * (1.0 - cs)
            }
        }
        BlendMode::Darken => cb.min(cs),
        BlendMode::Lighten => cb.max(cs),
    }
}

pub fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}
