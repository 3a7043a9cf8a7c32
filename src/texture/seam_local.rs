use rayon::prelude::*;

use crate::settings::Settings;
use crate::texture::patches::{TexturePatch, VertexProjectionInfos};
use crate::texture::*;

#[derive(Clone)]
struct BlendTarget {
    center: Vector2,
    color: Vector3,
}

/// Feathers residual high-frequency seams: every vertex shared between
/// patches pulls the surrounding band of each patch raster toward the
/// mean color the patches see at that vertex. Pixels outside the bands
/// are never touched, so interiors corrected by the global step stay
/// intact. Patches blend independently and in parallel.
pub fn local_seam_leveling(
    patches: &mut [TexturePatch],
    infos: &VertexProjectionInfos,
    settings: &Settings,
) {
    let mut work: Vec<Vec<BlendTarget>> = vec![vec![]; patches.len()];

    for projections in infos {
        if projections.len() < 2 {
            continue;
        }
        let samples: Vec<(usize, Vector2, Vector3)> = projections
            .iter()
            .filter_map(|p| {
                patches[p.patch_idx]
                    .color_at(p.pixel)
                    .map(|c| (p.patch_idx, p.pixel, c))
            })
            .collect();
        if samples.len() < 2 {
            continue;
        }
        let mean = samples.iter().map(|&(_, _, c)| c).sum::<Vector3>()
            / samples.len() as f64;
        for &(patch_idx, pixel, _) in &samples {
            work[patch_idx].push(BlendTarget {
                center: pixel,
                color: mean,
            });
        }
    }

    let radius = settings.seam_band_radius;
    patches
        .par_iter_mut()
        .zip(work.into_par_iter())
        .for_each(|(patch, targets)| blend_patch(patch, &targets, radius));
}

fn blend_patch(patch: &mut TexturePatch, targets: &[BlendTarget], radius: f64) {
    let (w, h) = patch.image.dimensions();
    for target in targets {
        let x0 = (target.center[0] - radius).floor().max(0.0) as u32;
        let y0 = (target.center[1] - radius).floor().max(0.0) as u32;
        let x1 = ((target.center[0] + radius).ceil() as u32).min(w - 1);
        let y1 = ((target.center[1] + radius).ceil() as u32).min(h - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                if !patch.is_valid(x, y) {
                    continue;
                }
                let d = (Vector2::new(x as f64, y as f64)
                    - target.center)
                    .norm();
                if d >= radius {
                    continue;
                }
                let weight = 1.0 - d / radius;
                let color =
                    pixel_to_vector3(patch.image.get_pixel(x, y));
                let blended = color + weight * (target.color - color);
                put_pixel_clamped(x, y, blended, &mut patch.image);
            }
        }
    }
}
