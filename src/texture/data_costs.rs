use kiddo::distance::squared_euclidean;
use kiddo::KdTree;
use rayon::prelude::*;

use crate::mesh::Mesh;
use crate::settings::Settings;
use crate::texture::*;

// Faces nearly orthogonal to the viewing ray carry no usable texture.
const MIN_VIEWING_DOT: f64 = 0.01;

/// Sparse per-face data costs. A missing (face, view) entry means the
/// face is not usable in that view; a face with no entries at all must
/// receive the unseen label during view selection.
pub struct DataCosts {
    entries: Vec<Vec<(usize, f64)>>, // Per face, sorted by view index.
}

impl DataCosts {
    pub fn num_faces(&self) -> usize {
        self.entries.len()
    }

    pub fn face(&self, face_idx: usize) -> &[(usize, f64)] {
        &self.entries[face_idx]
    }

    pub fn is_unselectable(&self, face_idx: usize) -> bool {
        self.entries[face_idx].is_empty()
    }

    /// Cheapest view for a face; ties resolve to the lowest view index.
    pub fn cheapest(&self, face_idx: usize) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for &(view_idx, cost) in &self.entries[face_idx] {
            if best.map_or(true, |(_, c)| cost < c) {
                best = Some((view_idx, cost));
            }
        }
        best
    }
}

fn orientation(v0: Vector2, v1: Vector2, v2: Vector2) -> f64 {
    (v1[0] * v2[1] - v1[1] * v2[0])
        + (v2[0] * v0[1] - v2[1] * v0[0])
        + (v0[0] * v1[1] - v0[1] * v1[0])
}

fn containment_check(v: Vector2, f: [Vector2; 3]) -> bool {
    let [v0, v1, v2] = f;
    if v == v0 || v == v1 || v == v2 {
        return false;
    }
    let s0 = orientation(v, v1, v2);
    let s1 = orientation(v0, v, v2);
    let s2 = orientation(v0, v1, v);
    (s0 > 0.0 && s1 > 0.0 && s2 > 0.0) || (s0 < 0.0 && s1 < 0.0 && s2 < 0.0)
}

fn max(a: [f64; 3]) -> f64 {
    *a.iter().max_by(|p, q| p.partial_cmp(q).unwrap()).unwrap()
}

/// Marks vertices hidden behind mesh geometry in projected space. For
/// each triangle, vertices projecting strictly inside it with a larger
/// depth than all three corners are occluded.
fn compute_occlusions(
    vertices_proj: &[ProjectedPoint],
    mesh: &Mesh,
) -> Vec<bool> {
    let mut kdtree = KdTree::new();
    for (i, v) in vertices_proj.iter().enumerate() {
        if v.depth > 0.0 {
            kdtree.add(v.pixel.as_ref(), i).unwrap();
        }
    }

    let mut occluded = vec![false; vertices_proj.len()];

    for face in &mesh.faces {
        let ProjectedPoint {
            pixel: v0,
            depth: d0,
        } = vertices_proj[face[0]];
        let ProjectedPoint {
            pixel: v1,
            depth: d1,
        } = vertices_proj[face[1]];
        let ProjectedPoint {
            pixel: v2,
            depth: d2,
        } = vertices_proj[face[2]];
        if d0 <= 0.0 || d1 <= 0.0 || d2 <= 0.0 {
            continue;
        }
        let v = (v0 + v1 + v2) / 3.0;
        let radius = 1.1
            * max([
                (v0 - v).norm_squared(),
                (v1 - v).norm_squared(),
                (v2 - v).norm_squared(),
            ]);
        for (_dist, &i) in kdtree
            .within_unsorted(v.as_ref(), radius, &squared_euclidean)
            .unwrap()
        {
            let ProjectedPoint {
                pixel: vi,
                depth: di,
            } = vertices_proj[i];
            if d0 < di
                && d1 < di
                && d2 < di
                && containment_check(vi, [v0, v1, v2])
            {
                occluded[i] = true;
            }
        }
    }

    occluded
}

fn projected_area(ps: [&ProjectedPoint; 3]) -> f64 {
    let d1 = ps[1].pixel - ps[0].pixel;
    let d2 = ps[2].pixel - ps[0].pixel;
    0.5 * (d1[0] * d2[1] - d1[1] * d2[0]).abs()
}

fn view_costs(
    view: &TextureView,
    mesh: &Mesh,
    settings: &Settings,
) -> Vec<Option<f64>> {
    let vertices_proj: Vec<ProjectedPoint> =
        mesh.vertices.iter().map(|v| view.project(v)).collect();
    let occluded = compute_occlusions(&vertices_proj, mesh);
    let camera = view.camera_position();

    (0..mesh.faces.len())
        .map(|face_idx| {
            let [v0, v1, v2] = mesh.faces[face_idx];
            let ps = [
                &vertices_proj[v0],
                &vertices_proj[v1],
                &vertices_proj[v2],
            ];
            if ps.iter().any(|p| p.depth <= 0.0 || !view.inside(p.pixel)) {
                return None;
            }
            if [v0, v1, v2].iter().any(|&v| occluded[v]) {
                return None;
            }

            let to_camera =
                (camera - mesh.face_centroid(face_idx)).normalize();
            let dot = mesh.face_normal(face_idx).dot(&to_camera);
            if dot <= MIN_VIEWING_DOT {
                return None;
            }

            let area = projected_area(ps);
            if area <= f64::EPSILON {
                return None;
            }

            let border = ps
                .iter()
                .map(|p| view.border_distance(p.pixel))
                .fold(f64::INFINITY, f64::min);
            let ramp = (1.0 - border / settings.edge_ramp).max(0.0);

            Some(
                1.0 / dot
                    + settings.resolution_bias / area
                    + settings.edge_bias * ramp,
            )
        })
        .collect()
}

/// Computes the suitability cost of every (face, view) pair. The views
/// are independent, so they are processed in parallel; the sparse
/// output is merged per face afterwards.
pub fn calculate_data_costs(
    mesh: &Mesh,
    views: &[TextureView],
    settings: &Settings,
) -> DataCosts {
    let per_view: Vec<Vec<Option<f64>>> = views
        .par_iter()
        .map(|view| view_costs(view, mesh, settings))
        .collect();

    let mut entries = vec![Vec::new(); mesh.faces.len()];
    for (view_idx, costs) in per_view.iter().enumerate() {
        for (face_idx, cost) in costs.iter().enumerate() {
            if let Some(cost) = cost {
                entries[face_idx].push((view_idx, *cost));
            }
        }
    }

    DataCosts { entries }
}
