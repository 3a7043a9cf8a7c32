use std::collections::{BTreeMap, BTreeSet, HashMap};

use image::{imageops, Rgb, RgbImage};
use nalgebra::{Matrix3, SVD};
use petgraph::unionfind::UnionFind;
use rayon::prelude::*;

use crate::defs::{Error, ErrorKind::*, Result};
use crate::settings::Settings;
use crate::texture::*;

// Longest side of the synthetic raster built for unseen face groups.
const UNSEEN_PATCH_SIZE: f64 = 32.0;

/// A maximal connected set of faces sharing one label, together with
/// the raster cropped from the assigned view. Seam leveling mutates the
/// raster, never the face membership.
#[derive(Debug)]
pub struct TexturePatch {
    pub label: Option<usize>,
    pub faces: Vec<usize>,
    pub image: RgbImage,
    pub mask: ImageMask,
    pub scale: [f64; 2], // Raster scale applied by atlas downscaling.
}

impl TexturePatch {
    pub fn is_valid(&self, x: u32, y: u32) -> bool {
        *self
            .mask
            .get((y as usize, x as usize))
            .unwrap_or(&false)
    }

    /// Bilinear color at a raster-local coordinate, or None when the
    /// coordinate falls outside the validity mask.
    pub fn color_at(&self, pixel: Vector2) -> Option<Vector3> {
        let x = pixel[0].round();
        let y = pixel[1].round();
        if x < 0.0 || y < 0.0 {
            return None;
        }
        if !self.is_valid(x as u32, y as u32) {
            return None;
        }
        Some(sample_pixel(pixel, &self.image))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct VertexProjection {
    pub patch_idx: usize,
    pub pixel: Vector2, // Raster-local coordinate.
}

/// Per vertex, one entry for every patch the vertex touches. The seam
/// leveling stages use it to find corresponding pixels across patches.
pub type VertexProjectionInfos = Vec<Vec<VertexProjection>>;

fn same_label_components(
    graph: &FaceGraph,
    labels: &[Option<usize>],
) -> Vec<Vec<usize>> {
    let mut partition = UnionFind::new(graph.num_nodes());
    for [f0, f1] in graph.edges() {
        if labels[f0] == labels[f1] {
            partition.union(f0, f1);
        }
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (face_idx, rep) in partition.into_labeling().iter().enumerate() {
        components.entry(*rep).or_insert_with(Vec::new).push(face_idx);
    }

    // Faces were pushed in index order, so sorting by the first face
    // makes the component order deterministic.
    let mut components: Vec<Vec<usize>> = components.into_values().collect();
    components.sort_by_key(|c| c[0]);
    components
}

fn fill_triangle(mask: &mut ImageMask, tri: [Vector2; 3]) {
    let (nrows, ncols) = (mask.nrows(), mask.ncols());

    if let Some(bcs) = BarycentricCoordinateSystem::new(tri) {
        let xys: Vec<[f64; 2]> = tri.iter().map(|v| [v[0], v[1]]).collect();
        let bounds = Rectangle::<f64>::bounding(&xys);
        let x0 = bounds.pos[0].floor().max(0.0) as usize;
        let y0 = bounds.pos[1].floor().max(0.0) as usize;
        let x1 = (bounds.pos[0] + bounds.size[0]).ceil() as usize;
        let y1 = (bounds.pos[1] + bounds.size[1]).ceil() as usize;
        for y in y0..=y1.min(nrows.saturating_sub(1)) {
            for x in x0..=x1.min(ncols.saturating_sub(1)) {
                let bary =
                    bcs.infer(Vector2::new(x as f64, y as f64));
                if all_nonneg(bary) {
                    mask[(y, x)] = true;
                }
            }
        }
    }

    // The corner pixels themselves are always usable.
    for v in tri {
        let (x, y) = (v[0].round(), v[1].round());
        if x >= 0.0 && y >= 0.0 {
            let (x, y) = (x as usize, y as usize);
            if y < nrows && x < ncols {
                mask[(y, x)] = true;
            }
        }
    }
}

fn build_view_patch(
    faces: &[usize],
    view_idx: usize,
    view: &TextureView,
    mesh: &Mesh,
    settings: &Settings,
) -> Result<(TexturePatch, Vec<(usize, Vector2)>)> {
    let vertices: BTreeSet<usize> =
        faces.iter().flat_map(|&f| mesh.faces[f]).collect();

    let mut global = HashMap::new();
    for &v in &vertices {
        let p = view.project(&mesh.vertices[v]);
        if p.depth <= 0.0 {
            let desc = format!(
                "vertex {} of a patch labeled with view {} projects \
                 behind the camera",
                v, view_idx
            );
            return Err(Error::new(Projection, desc));
        }
        global.insert(v, p.pixel);
    }

    let xys: Vec<[f64; 2]> =
        vertices.iter().map(|v| [global[v][0], global[v][1]]).collect();
    let bounds = Rectangle::<f64>::bounding(&xys);
    let margin = settings.patch_margin as f64;
    let x0 = (bounds.pos[0] - margin).floor().max(0.0) as u32;
    let y0 = (bounds.pos[1] - margin).floor().max(0.0) as u32;
    let x1 = ((bounds.pos[0] + bounds.size[0] + margin).ceil() as u32)
        .min(view.width() - 1);
    let y1 = ((bounds.pos[1] + bounds.size[1] + margin).ceil() as u32)
        .min(view.height() - 1);
    let (w, h) = (x1 - x0 + 1, y1 - y0 + 1);

    let image = imageops::crop_imm(&view.image, x0, y0, w, h).to_image();
    let origin = Vector2::new(x0 as f64, y0 as f64);
    let local: HashMap<usize, Vector2> = vertices
        .iter()
        .map(|&v| (v, global[&v] - origin))
        .collect();

    let mut mask = mask_new(w, h);
    for &f in faces {
        let [v0, v1, v2] = mesh.faces[f];
        fill_triangle(&mut mask, [local[&v0], local[&v1], local[&v2]]);
    }

    let vertex_pixels =
        vertices.iter().map(|&v| (v, local[&v])).collect();
    Ok((
        TexturePatch {
            label: Some(view_idx),
            faces: faces.to_vec(),
            image,
            mask,
            scale: [1.0, 1.0],
        },
        vertex_pixels,
    ))
}

// Two unit vectors orthogonal to u0 and to each other.
fn complement(u0: Vector3) -> (Vector3, Vector3) {
    let zero = Vector3::zeros();
    let m33 = Matrix3::from_columns(&[u0, zero, zero]);
    let svd = SVD::new(m33, true, false);
    let u = svd.u.unwrap();
    (Vector3::from(u.column(1)), Vector3::from(u.column(2)))
}

/// Builds a constant-color placeholder patch for a group of unseen
/// faces by projecting it orthographically along its dominant normal.
fn build_unseen_patch(
    faces: &[usize],
    mesh: &Mesh,
    settings: &Settings,
) -> (TexturePatch, Vec<(usize, Vector2)>) {
    let mut axis = faces
        .iter()
        .map(|&f| mesh.face_normal(f))
        .sum::<Vector3>();
    if axis.norm() < f64::EPSILON || !axis.norm().is_finite() {
        axis = Vector3::z();
    }
    let axis = axis.normalize();
    let (eu, ev) = complement(axis);

    let vertices: BTreeSet<usize> =
        faces.iter().flat_map(|&f| mesh.faces[f]).collect();
    let uvs: HashMap<usize, Vector2> = vertices
        .iter()
        .map(|&v| {
            let p = mesh.vertices[v].coords;
            (v, Vector2::new(eu.dot(&p), ev.dot(&p)))
        })
        .collect();

    let xys: Vec<[f64; 2]> =
        vertices.iter().map(|v| [uvs[v][0], uvs[v][1]]).collect();
    let bounds = Rectangle::<f64>::bounding(&xys);
    let extent = f64::max(bounds.size[0], bounds.size[1]);
    let scale = if extent > f64::EPSILON {
        UNSEEN_PATCH_SIZE / extent
    } else {
        1.0
    };

    let margin = settings.patch_margin as f64;
    let local: HashMap<usize, Vector2> = vertices
        .iter()
        .map(|&v| {
            let uv = uvs[&v];
            (
                v,
                Vector2::new(
                    (uv[0] - bounds.pos[0]) * scale + margin,
                    (uv[1] - bounds.pos[1]) * scale + margin,
                ),
            )
        })
        .collect();

    let w = (bounds.size[0] * scale).ceil() as u32 + 2 * (margin as u32) + 1;
    let h = (bounds.size[1] * scale).ceil() as u32 + 2 * (margin as u32) + 1;
    let fill = settings.unseen_fill_level;
    let image = RgbImage::from_pixel(w, h, Rgb([fill, fill, fill]));

    let mut mask = mask_new(w, h);
    for &f in faces {
        let [v0, v1, v2] = mesh.faces[f];
        fill_triangle(&mut mask, [local[&v0], local[&v1], local[&v2]]);
    }

    let vertex_pixels =
        vertices.iter().map(|&v| (v, local[&v])).collect();
    (
        TexturePatch {
            label: None,
            faces: faces.to_vec(),
            image,
            mask,
            scale: [1.0, 1.0],
        },
        vertex_pixels,
    )
}

/// Groups same-labeled connected faces into patches and projects them
/// into their assigned views. Components are independent and processed
/// in parallel; each one only writes to buffers it owns.
pub fn generate_texture_patches(
    graph: &FaceGraph,
    labels: &[Option<usize>],
    mesh: &Mesh,
    views: &[TextureView],
    settings: &Settings,
) -> Result<(Vec<TexturePatch>, VertexProjectionInfos)> {
    let components: Vec<Vec<usize>> = same_label_components(graph, labels)
        .into_iter()
        .filter(|c| labels[c[0]].is_some() || settings.keep_unseen_faces)
        .collect();

    let results: Vec<Result<(TexturePatch, Vec<(usize, Vector2)>)>> =
        components
            .par_iter()
            .map(|faces| match labels[faces[0]] {
                Some(view_idx) => build_view_patch(
                    faces,
                    view_idx,
                    &views[view_idx],
                    mesh,
                    settings,
                ),
                None => Ok(build_unseen_patch(faces, mesh, settings)),
            })
            .collect();

    let mut patches = Vec::with_capacity(results.len());
    let mut infos: VertexProjectionInfos =
        vec![Vec::new(); mesh.vertices.len()];
    for result in results {
        let (patch, vertex_pixels) = result?;
        let patch_idx = patches.len();
        for (v, pixel) in vertex_pixels {
            infos[v].push(VertexProjection { patch_idx, pixel });
        }
        patches.push(patch);
    }

    Ok((patches, infos))
}
