use crate::defs::{Error, ErrorKind::*, Result};
use crate::mesh::{ordered, Mesh, MeshTopology};

/// Face adjacency graph: nodes are face indices, edges connect faces
/// sharing a mesh edge. Built once, read-only afterwards.
#[derive(Debug)]
pub struct FaceGraph {
    adjacency: Vec<Vec<usize>>,
}

impl FaceGraph {
    pub fn num_nodes(&self) -> usize {
        self.adjacency.len()
    }

    pub fn neighbors(&self, face_idx: usize) -> &[usize] {
        &self.adjacency[face_idx]
    }

    /// All undirected edges, each reported once with f0 < f1.
    pub fn edges(&self) -> impl Iterator<Item = [usize; 2]> + '_ {
        self.adjacency.iter().enumerate().flat_map(|(f0, ns)| {
            ns.iter()
                .filter(move |&&f1| f0 < f1)
                .map(move |&f1| [f0, f1])
        })
    }
}

/// Builds the adjacency graph over mesh faces. An edge shared by more
/// than two faces means the mesh is not manifold along that edge.
pub fn build_adjacency_graph(
    mesh: &Mesh,
    topo: &MeshTopology,
) -> Result<FaceGraph> {
    let mut adjacency = vec![Vec::new(); mesh.faces.len()];

    for (face_idx, &[v0, v1, v2]) in mesh.faces.iter().enumerate() {
        for e in [[v0, v1], [v0, v2], [v1, v2]] {
            let sharing = &topo.faces_around_edge[&ordered(e)];
            if sharing.len() > 2 {
                let desc = format!(
                    "edge {:?} is shared by {} faces",
                    ordered(e),
                    sharing.len()
                );
                return Err(Error::new(DegenerateMesh, desc));
            }
            for &other in sharing {
                if other != face_idx {
                    adjacency[face_idx].push(other);
                }
            }
        }
        adjacency[face_idx].sort_unstable();
        adjacency[face_idx].dedup();
    }

    Ok(FaceGraph { adjacency })
}
