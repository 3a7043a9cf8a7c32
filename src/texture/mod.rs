mod adjacency;
mod atlas;
mod data_costs;
mod debug;
mod labeling;
mod model;
mod patches;
mod seam_global;
mod seam_local;

use std::cmp::Ordering;
use std::ops::Sub;

use image::{Rgb, RgbImage};
use log::info;
use nalgebra::{Dim, Dynamic, OMatrix};

use crate::defs::Result;
use crate::settings::Settings;
pub use crate::texture::{
    adjacency::*, atlas::*, data_costs::*, debug::*, labeling::*, model::*,
    patches::*, seam_global::*, seam_local::*,
};

pub use crate::mesh::{ordered, Mesh, MeshTopology, Point3, Vector3};
pub use crate::view::{ProjectedPoint, TextureView, Vector2};

pub type Matrix2 = nalgebra::Matrix2<f64>;
pub type ImageMask = OMatrix<bool, Dynamic, Dynamic>;

pub fn mask_new(width: u32, height: u32) -> ImageMask {
    let (w, h) = (
        Dim::from_usize(width as usize),
        Dim::from_usize(height as usize),
    );
    ImageMask::from_element_generic(h, w, false)
}

pub fn pixel_to_vector3(p: &Rgb<u8>) -> Vector3 {
    Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}

pub fn put_pixel_clamped(x: u32, y: u32, color: Vector3, image: &mut RgbImage) {
    let [r, g, b] = color.as_ref();
    let r1 = r.clamp(0.0, 255.0).round() as u8;
    let g1 = g.clamp(0.0, 255.0).round() as u8;
    let b1 = b.clamp(0.0, 255.0).round() as u8;
    image.put_pixel(x, y, Rgb([r1, g1, b1]));
}

/// Bilinear sample at a pixel coordinate, clamped to the image bounds.
pub fn sample_pixel(pixel: Vector2, image: &RgbImage) -> Vector3 {
    let (w, h) = image.dimensions();
    let x = pixel[0].clamp(0.0, (w - 1) as f64);
    let y = pixel[1].clamp(0.0, (h - 1) as f64);
    let (x0, y0) = (x as u32, y as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (dx, dy) = (x - x0 as f64, y - y0 as f64);
    let s00 = pixel_to_vector3(image.get_pixel(x0, y0));
    let s10 = pixel_to_vector3(image.get_pixel(x1, y0));
    let s01 = pixel_to_vector3(image.get_pixel(x0, y1));
    let s11 = pixel_to_vector3(image.get_pixel(x1, y1));
    let s0 = (1.0 - dx) * s00 + dx * s10;
    let s1 = (1.0 - dx) * s01 + dx * s11;
    (1.0 - dy) * s0 + dy * s1
}

pub struct BarycentricCoordinateSystem {
    vs: [Vector2; 3],
    n22: nalgebra::QR<f64, nalgebra::U2, nalgebra::U2>,
}

impl BarycentricCoordinateSystem {
    pub fn new(vs: [Vector2; 3]) -> Option<Self> {
        let m22 = Matrix2::from_columns(&[vs[1] - vs[0], vs[2] - vs[0]]);
        let n22 = m22.qr();
        if n22.is_invertible() {
            Some(Self { vs, n22 })
        } else {
            None // The triangle is degenerate in projection.
        }
    }

    // The functions 'infer' and 'apply' are mutually inverse.

    pub fn infer(&self, v: Vector2) -> Vector3 {
        let &[l1, l2] = self.n22.solve(&(v - self.vs[0])).unwrap().as_ref();
        Vector3::new(1.0 - l1 - l2, l1, l2)
    }

    // Assuming the input 'u' sums to 1.0.
    pub fn apply(&self, u: Vector3) -> Vector2 {
        u[0] * self.vs[0] + u[1] * self.vs[1] + u[2] * self.vs[2]
    }
}

pub fn all_nonneg(v: Vector3) -> bool {
    v.iter().all(|&c| c >= 0.0)
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Rectangle<T> {
    pub pos: [T; 2],
    pub size: [T; 2],
}

type Comparator<T> = fn(&T, &T) -> Ordering;

pub fn extremum<
    T: Copy + PartialOrd + Sub<Output = T>,
    I: Iterator<Item = T>,
>(
    it: I,
    f: fn(I, Comparator<T>) -> Option<T>,
) -> T {
    f(it, |p, q| p.partial_cmp(q).unwrap()).unwrap()
}

impl<T> Rectangle<T> {
    pub fn bounding(xys: &[[T; 2]]) -> Rectangle<T>
    where
        T: Copy + PartialOrd + Sub<Output = T>,
    {
        let xys_coord = |k: usize| xys.iter().map(move |xy| xy[k]);

        let xmin = extremum(xys_coord(0), Iterator::min_by);
        let xmax = extremum(xys_coord(0), Iterator::max_by);
        let ymin = extremum(xys_coord(1), Iterator::min_by);
        let ymax = extremum(xys_coord(1), Iterator::max_by);

        Rectangle {
            pos: [xmin, ymin],
            size: [xmax - xmin, ymax - ymin],
        }
    }
}

/// Everything the pipeline produces: the textured model and, when
/// requested, a color-coded view assignment model for debugging.
pub struct TexturingResult {
    pub model: TexturedModel,
    pub view_assignment: Option<TexturedModel>,
}

/// Runs the whole texturing pipeline. Stages execute strictly in
/// dependency order; the first failing stage aborts the run and no
/// partial output is observable.
pub fn texture_mesh(
    mesh: &Mesh,
    views: &[TextureView],
    settings: &Settings,
) -> Result<TexturingResult> {
    let topo = MeshTopology::new(mesh);
    let graph = build_adjacency_graph(mesh, &topo)?;
    info!("built adjacency graph over {} faces", mesh.faces.len());

    let costs = calculate_data_costs(mesh, views, settings);
    let selectable = (0..mesh.faces.len())
        .filter(|&f| !costs.is_unselectable(f))
        .count();
    info!(
        "data costs cover {:.1}% of the faces",
        selectable as f64 / mesh.faces.len().max(1) as f64 * 100.0
    );

    let labels = select_views(&graph, &costs, mesh, views, settings)?;

    let (mut patches, infos) =
        generate_texture_patches(&graph, &labels, mesh, views, settings)?;
    info!("generated {} texture patches", patches.len());

    global_seam_leveling(&mut patches, &infos, settings);
    local_seam_leveling(&mut patches, &infos, settings);

    let atlas = pack_atlas(&mut patches, settings)?;
    info!(
        "packed {} patches into {} atlas pages",
        patches.len(),
        atlas.pages.len()
    );

    let model = build_model(mesh, &patches, &infos, &atlas);

    let view_assignment = if settings.write_view_assignment {
        info!("generating view assignment visualization");
        let debug_views = generate_debug_views(views);
        let (mut dbg_patches, dbg_infos) = generate_texture_patches(
            &graph,
            &labels,
            mesh,
            &debug_views,
            settings,
        )?;
        let dbg_atlas = pack_atlas(&mut dbg_patches, settings)?;
        Some(build_model(mesh, &dbg_patches, &dbg_infos, &dbg_atlas))
    } else {
        None
    };

    Ok(TexturingResult {
        model,
        view_assignment,
    })
}
