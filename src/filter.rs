use crate::{
    blur::gaussian_blur,
    error::StrataResult,
    layer::ColorFilter,
    surface::Surface,
};

/// Apply a layer's color filter ahead of compositing: brightness, contrast,
/// saturation, hue-rotate on straight-alpha color, then the blur pass on the
/// re-premultiplied result. Identity filters return an untouched clone.
pub fn apply_color_filter(surface: &Surface, filter: &ColorFilter) -> StrataResult<Surface> {
    if filter.is_identity() {
        return Ok(surface.clone());
    }

    let mut out = surface.clone();
    if filter.brightness != 1.0
        || filter.contrast != 1.0
        || filter.saturation != 1.0
        || filter.hue_deg != 0.0
    {
        let hue = hue_matrix(filter.hue_deg);
        for px in out.data_mut().chunks_exact_mut(4) {
            let a = px[3];
            if a == 0 {
                continue;
            }
            let af = f32::from(a) / 255.0;
            let mut c = [
                f32::from(px[0]) / 255.0 / af,
                f32::from(px[1]) / 255.0 / af,
                f32::from(px[2]) / 255.0 / af,
            ];

            for v in &mut c {
                *v *= filter.brightness.max(0.0);
            }
            for v in &mut c {
                *v = (*v - 0.5) * filter.contrast.max(0.0) + 0.5;
            }
            if filter.saturation != 1.0 {
                let luma = 0.2126 * c[0] + 0.7152 * c[1] + 0.0722 * c[2];
                let s = filter.saturation.max(0.0);
                for v in &mut c {
                    *v = luma + (*v - luma) * s;
                }
            }
            if filter.hue_deg != 0.0 {
                c = [
                    hue[0] * c[0] + hue[1] * c[1] + hue[2] * c[2],
                    hue[3] * c[0] + hue[4] * c[1] + hue[5] * c[2],
                    hue[6] * c[0] + hue[7] * c[1] + hue[8] * c[2],
                ];
            }

            for (i, v) in c.iter().enumerate() {
                px[i] = ((v.clamp(0.0, 1.0) * af) * 255.0).round() as u8;
            }
        }
    }

    if filter.blur_px > 0 {
        let sigma = (filter.blur_px as f32) / 2.0;
        out = gaussian_blur(&out, filter.blur_px, sigma)?;
    }
    Ok(out)
}

/// Rec.709-weighted hue rotation matrix (row major), matching the CSS
/// `hue-rotate` filter primitive.
fn hue_matrix(degrees: f32) -> [f32; 9] {
    let rad = degrees.to_radians();
    let cos = rad.cos();
    let sin = rad.sin();
    const LR: f32 = 0.2126;
    const LG: f32 = 0.7152;
    const LB: f32 = 0.0722;
    [
        LR + cos * (1.0 - LR) + sin * (-LR),
        LG + cos * (-LG) + sin * (-LG),
        LB + cos * (-LB) + sin * (1.0 - LB),
        LR + cos * (-LR) + sin * 0.143,
        LG + cos * (1.0 - LG) + sin * 0.140,
        LB + cos * (-LB) + sin * (-0.283),
        LR + cos * (-LR) + sin * (-(1.0 - LR)),
        LG + cos * (-LG) + sin * LG,
        LB + cos * (1.0 - LB) + sin * LB,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(px: [u8; 4]) -> Surface {
        let mut s = Surface::new(2, 2).unwrap();
        s.fill(px);
        s
    }

    #[test]
    fn identity_filter_is_untouched_clone() {
        let s = solid([10, 20, 30, 255]);
        let out = apply_color_filter(&s, &ColorFilter::default()).unwrap();
        assert_eq!(out, s);
    }

    #[test]
    fn brightness_zero_goes_black() {
        let s = solid([100, 150, 200, 255]);
        let f = ColorFilter {
            brightness: 0.0,
            ..ColorFilter::default()
        };
        let out = apply_color_filter(&s, &f).unwrap();
        assert_eq!(out.pixel(0, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn saturation_zero_is_grayscale() {
        let s = solid([255, 0, 0, 255]);
        let f = ColorFilter {
            saturation: 0.0,
            ..ColorFilter::default()
        };
        let out = apply_color_filter(&s, &f).unwrap();
        let px = out.pixel(0, 0);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn hue_rotate_360_is_near_identity() {
        let s = solid([120, 60, 200, 255]);
        let f = ColorFilter {
            hue_deg: 360.0,
            ..ColorFilter::default()
        };
        let out = apply_color_filter(&s, &f).unwrap();
        let px = out.pixel(0, 0);
        for (got, want) in px.iter().zip([120u8, 60, 200, 255]) {
            assert!((i16::from(*got) - i16::from(want)).abs() <= 1);
        }
    }

    #[test]
    fn transparent_pixels_stay_transparent() {
        let s = Surface::new(2, 2).unwrap();
        let f = ColorFilter {
            brightness: 2.0,
            ..ColorFilter::default()
        };
        let out = apply_color_filter(&s, &f).unwrap();
        assert!(out.data().iter().all(|&b| b == 0));
    }
}
