use std::collections::BTreeMap;

use image::imageops::{self, FilterType};
use image::RgbImage;
use log::info;
use rectangle_pack::{
    contains_smallest_box, pack_rects, volume_heuristic,
    GroupedRectsToPlace, RectToInsert, TargetBin,
};

use crate::defs::{Error, ErrorKind::*, Result};
use crate::settings::Settings;
use crate::texture::patches::TexturePatch;
use crate::texture::*;

#[derive(Debug)]
pub struct Placement {
    pub page: usize,
    pub rect: Rectangle<u32>,
}

/// Fixed-size atlas pages plus the placement of every patch raster.
#[derive(Debug)]
pub struct TextureAtlas {
    pub pages: Vec<RgbImage>,
    pub placements: Vec<Placement>,
}

pub type EmptinessMask = Vec<Vec<bool>>; // Rectangular, page-shaped grid.

fn downscale_patch(patch: &mut TexturePatch, max_side: u32) {
    let (w, h) = patch.image.dimensions();
    let factor =
        f64::min(max_side as f64 / w as f64, max_side as f64 / h as f64);
    let new_w = ((w as f64 * factor) as u32).max(1);
    let new_h = ((h as f64 * factor) as u32).max(1);

    patch.image =
        imageops::resize(&patch.image, new_w, new_h, FilterType::Triangle);

    let mut mask = mask_new(new_w, new_h);
    for y in 0..new_h {
        for x in 0..new_w {
            let sx = (x as u64 * w as u64 / new_w as u64).min(w as u64 - 1);
            let sy = (y as u64 * h as u64 / new_h as u64).min(h as u64 - 1);
            mask[(y as usize, x as usize)] =
                patch.is_valid(sx as u32, sy as u32);
        }
    }
    patch.mask = mask;

    patch.scale[0] *= new_w as f64 / w as f64;
    patch.scale[1] *= new_h as f64 / h as f64;
}

fn resolve_gutter_source(emask: &EmptinessMask) -> Vec<(u32, u32, u32, u32)> {
    let mut idxs = vec![];
    let height = emask.len() as u32;
    for y in 0..height as i32 {
        let width = emask[y as usize].len() as u32;
        for x in 0..width as i32 {
            if emask[y as usize][x as usize] {
                for (x1, y1) in [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
                {
                    if 0 <= x1
                        && (x1 as u32) < width
                        && 0 <= y1
                        && (y1 as u32) < height
                        && !emask[y1 as usize][x1 as usize]
                    {
                        idxs.push((x as u32, y as u32, x1 as u32, y1 as u32));
                    }
                }
            }
        }
    }
    idxs
}

/// Bleeds valid colors into the empty padding around placed patches so
/// that texture filtering at patch borders does not pick up black.
fn extrapolate_gutter(
    buffer: &mut RgbImage,
    emask: &mut EmptinessMask,
    gutter_size: usize,
) {
    for _ in 0..gutter_size {
        for (x, y, x1, y1) in resolve_gutter_source(emask) {
            *buffer.get_pixel_mut(x, y) = *buffer.get_pixel(x1, y1);
            emask[y as usize][x as usize] = false;
        }
    }
}

/// Packs patch rasters into as few fixed-size pages as possible. Only a
/// single patch exceeding the page size is an error; running out of
/// room in a page just opens another one.
pub fn pack_atlas(
    patches: &mut [TexturePatch],
    settings: &Settings,
) -> Result<TextureAtlas> {
    if patches.is_empty() {
        return Ok(TextureAtlas {
            pages: vec![],
            placements: vec![],
        });
    }

    let padding = settings.atlas_padding;
    let max_side = settings.atlas_size.saturating_sub(2 * padding);
    for (i, patch) in patches.iter_mut().enumerate() {
        let (w, h) = patch.image.dimensions();
        if w > max_side || h > max_side {
            if !settings.downscale_oversize_patches {
                let desc = format!(
                    "patch {} ({}x{} pixels) does not fit an atlas \
                     page of {} pixels",
                    i, w, h, settings.atlas_size
                );
                return Err(Error::new(AtlasOverflow, desc));
            }
            downscale_patch(patch, max_side);
        }
    }

    let mut rects_to_place = GroupedRectsToPlace::<usize, ()>::new();
    for (i, patch) in patches.iter().enumerate() {
        let (w, h) = patch.image.dimensions();
        rects_to_place.push_rect(
            i,
            None,
            RectToInsert::new(w + 2 * padding, h + 2 * padding, 1),
        );
    }

    let mut num_pages = 1;
    let locations = loop {
        let mut target_bins: BTreeMap<usize, TargetBin> = (0..num_pages)
            .map(|p| {
                (p, TargetBin::new(settings.atlas_size, settings.atlas_size, 1))
            })
            .collect();
        match pack_rects(
            &rects_to_place,
            &mut target_bins,
            &volume_heuristic,
            &contains_smallest_box,
        ) {
            Ok(placements) => break placements.packed_locations().clone(),
            Err(_) => {
                num_pages += 1;
                if num_pages > patches.len() {
                    let desc =
                        "packing failed with one page per patch".to_string();
                    return Err(Error::new(AtlasOverflow, desc));
                }
            }
        }
    };

    let size = settings.atlas_size;
    let mut pages = vec![RgbImage::new(size, size); num_pages];
    let mut emasks: Vec<EmptinessMask> =
        vec![vec![vec![true; size as usize]; size as usize]; num_pages];
    let mut placements = Vec::with_capacity(patches.len());

    for (i, patch) in patches.iter().enumerate() {
        let (page, location) = locations[&i];
        let x0 = location.x() + padding;
        let y0 = location.y() + padding;
        let (w, h) = patch.image.dimensions();
        for y in 0..h {
            for x in 0..w {
                if patch.is_valid(x, y) {
                    pages[page].put_pixel(
                        x0 + x,
                        y0 + y,
                        *patch.image.get_pixel(x, y),
                    );
                    emasks[page][(y0 + y) as usize][(x0 + x) as usize] =
                        false;
                }
            }
        }
        placements.push(Placement {
            page,
            rect: Rectangle {
                pos: [x0, y0],
                size: [w, h],
            },
        });
    }

    for (page, emask) in pages.iter_mut().zip(emasks.iter_mut()) {
        extrapolate_gutter(page, emask, padding as usize);
    }

    info!(
        "atlas packing used {} page(s) of {} pixels",
        num_pages, settings.atlas_size
    );

    Ok(TextureAtlas { pages, placements })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn flat_patch(level: u8, width: u32, height: u32) -> TexturePatch {
        let mut mask = mask_new(width, height);
        mask.fill(true);
        TexturePatch {
            label: Some(0),
            faces: vec![],
            image: RgbImage::from_pixel(
                width,
                height,
                Rgb([level, level, level]),
            ),
            mask,
            scale: [1.0, 1.0],
        }
    }

    fn overlap(a: &Placement, b: &Placement) -> bool {
        a.page == b.page
            && a.rect.pos[0] < b.rect.pos[0] + b.rect.size[0]
            && b.rect.pos[0] < a.rect.pos[0] + a.rect.size[0]
            && a.rect.pos[1] < b.rect.pos[1] + b.rect.size[1]
            && b.rect.pos[1] < a.rect.pos[1] + a.rect.size[1]
    }

    #[test]
    fn test_every_patch_placed_once_without_overlap() {
        let mut patches = vec![
            flat_patch(10, 10, 6),
            flat_patch(20, 4, 12),
            flat_patch(30, 8, 8),
        ];
        let settings = Settings {
            atlas_size: 64,
            ..Settings::default()
        };

        let atlas = pack_atlas(&mut patches, &settings).unwrap();
        assert_eq!(atlas.placements.len(), 3);
        assert_eq!(atlas.pages.len(), 1);

        for (i, p) in atlas.placements.iter().enumerate() {
            assert!(p.rect.pos[0] + p.rect.size[0] <= 64);
            assert!(p.rect.pos[1] + p.rect.size[1] <= 64);
            for q in &atlas.placements[i + 1..] {
                assert!(!overlap(p, q));
            }
        }

        // Placed pixels carry the patch color.
        let p = &atlas.placements[0];
        let pixel =
            atlas.pages[p.page].get_pixel(p.rect.pos[0], p.rect.pos[1]);
        assert_eq!(pixel, &Rgb([10, 10, 10]));
    }

    #[test]
    fn test_crowded_patches_open_a_second_page() {
        let mut patches = vec![flat_patch(10, 10, 10), flat_patch(20, 10, 10)];
        let settings = Settings {
            atlas_size: 16,
            atlas_padding: 1,
            ..Settings::default()
        };

        let atlas = pack_atlas(&mut patches, &settings).unwrap();
        assert_eq!(atlas.pages.len(), 2);
        assert_ne!(atlas.placements[0].page, atlas.placements[1].page);
    }

    #[test]
    fn test_oversize_patch_is_an_error_by_default() {
        let mut patches = vec![flat_patch(10, 100, 4)];
        let settings = Settings {
            atlas_size: 32,
            ..Settings::default()
        };

        let err = pack_atlas(&mut patches, &settings).unwrap_err();
        assert_eq!(err.kind, crate::defs::ErrorKind::AtlasOverflow);
    }

    #[test]
    fn test_oversize_patch_downscaled_when_allowed() {
        let mut patches = vec![flat_patch(10, 100, 4)];
        let settings = Settings {
            atlas_size: 32,
            atlas_padding: 1,
            downscale_oversize_patches: true,
            ..Settings::default()
        };

        let atlas = pack_atlas(&mut patches, &settings).unwrap();
        assert_eq!(atlas.pages.len(), 1);
        let (w, h) = (patches[0].image.width(), patches[0].image.height());
        assert!(w <= 30 && h <= 30);
        assert!(patches[0].scale[0] < 1.0);
        assert_eq!(atlas.placements[0].rect.size, [w, h]);
    }

    #[test]
    fn test_gutter_extrapolation_fills_padding() {
        let mut patches = vec![flat_patch(200, 8, 8)];
        let settings = Settings {
            atlas_size: 32,
            atlas_padding: 2,
            ..Settings::default()
        };

        let atlas = pack_atlas(&mut patches, &settings).unwrap();
        let p = &atlas.placements[0];
        // One pixel into the padding ring carries the patch color.
        let pixel = atlas.pages[0]
            .get_pixel(p.rect.pos[0] - 1, p.rect.pos[1]);
        assert_eq!(pixel, &Rgb([200, 200, 200]));
    }
}
