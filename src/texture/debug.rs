use image::{Rgb, RgbImage};

use crate::texture::*;

// Cycling the hue by the golden ratio conjugate keeps consecutive
// views visually distinct for any number of views.
const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_749_895;

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb<u8> {
    let h6 = (h.fract() * 6.0).clamp(0.0, 6.0 - f64::EPSILON);
    let f = h6.fract();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match h6 as u32 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    Rgb([
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    ])
}

/// Replaces every view's photograph with a flat distinctive color while
/// keeping the calibration, so a texturing run over the result paints
/// each face with the color of its selected view.
pub fn generate_debug_views(views: &[TextureView]) -> Vec<TextureView> {
    views
        .iter()
        .enumerate()
        .map(|(i, view)| {
            let hue = (i as f64 * GOLDEN_RATIO_CONJUGATE).fract();
            let color = hsv_to_rgb(hue, 0.8, 0.95);
            TextureView::new(
                view.id,
                view.world_to_camera,
                view.focal,
                view.principal,
                RgbImage::from_pixel(view.width(), view.height(), color),
            )
        })
        .collect()
}
