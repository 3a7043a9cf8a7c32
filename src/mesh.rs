use std::collections::{HashMap, HashSet};

pub type Point3 = nalgebra::Point3<f64>;
pub type Vector3 = nalgebra::Vector3<f64>;

/// Immutable triangle mesh. Face index triples reference `vertices`;
/// the face count is fixed for the lifetime of the texturing pipeline.
#[derive(Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Point3>,
    pub faces: Vec<[usize; 3]>,
}

impl Mesh {
    pub fn face_normal(&self, face_idx: usize) -> Vector3 {
        let [v0, v1, v2] = self.faces[face_idx];
        let d1 = self.vertices[v1] - self.vertices[v0];
        let d2 = self.vertices[v2] - self.vertices[v0];
        d1.cross(&d2).normalize()
    }

    pub fn face_centroid(&self, face_idx: usize) -> Point3 {
        let [v0, v1, v2] = self.faces[face_idx];
        Point3::from(
            (self.vertices[v0].coords
                + self.vertices[v1].coords
                + self.vertices[v2].coords)
                / 3.0,
        )
    }
}

pub fn ordered(e: [usize; 2]) -> [usize; 2] {
    if e[0] < e[1] {
        e
    } else {
        [e[1], e[0]]
    }
}

/// Read-only adjacency index derived from a mesh, built once up front.
#[derive(Debug, Clone)]
pub struct MeshTopology {
    pub faces_around_vertex: Vec<HashSet<usize>>,
    pub faces_around_edge: HashMap<[usize; 2], Vec<usize>>,
    pub neighbouring_vertices: Vec<HashSet<usize>>,
}

impl MeshTopology {
    pub fn new(mesh: &Mesh) -> MeshTopology {
        let mut faces_around_vertex = vec![HashSet::new(); mesh.vertices.len()];
        for (f_idx, &f) in mesh.faces.iter().enumerate() {
            for v in f {
                faces_around_vertex[v].insert(f_idx);
            }
        }

        let mut faces_around_edge = HashMap::new();
        for (f_idx, &[v0, v1, v2]) in mesh.faces.iter().enumerate() {
            for e in [[v0, v1], [v0, v2], [v1, v2]] {
                faces_around_edge
                    .entry(ordered(e))
                    .or_insert_with(Vec::new)
                    .push(f_idx);
            }
        }

        let mut neighbouring_vertices =
            vec![HashSet::new(); mesh.vertices.len()];
        for &[v0, v1, v2] in mesh.faces.iter() {
            for e in [[v0, v1], [v0, v2], [v1, v2]] {
                neighbouring_vertices[e[0]].insert(e[1]);
                neighbouring_vertices[e[1]].insert(e[0]);
            }
        }

        MeshTopology {
            faces_around_vertex,
            faces_around_edge,
            neighbouring_vertices,
        }
    }
}
