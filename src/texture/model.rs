use std::collections::HashMap;

use image::RgbImage;

use crate::mesh::Mesh;
use crate::texture::atlas::TextureAtlas;
use crate::texture::patches::{TexturePatch, VertexProjectionInfos};
use crate::texture::*;

// Texture coordinates closer than this are merged into one entry.
const UV_EPS: f64 = 1e-6;

#[derive(Clone, Copy, Debug)]
pub struct FaceTexture {
    pub page: usize,
    pub uv_idxs: [usize; 3],
}

/// The final assembly: the input mesh, a deduplicated texture
/// coordinate table, a per-face reference into it and the atlas pages.
/// Faces dropped as unseen carry no texture reference.
pub struct TexturedModel {
    pub mesh: Mesh,
    pub uv_coords: Vec<Vector2>,
    pub face_textures: Vec<Option<FaceTexture>>,
    pub pages: Vec<RgbImage>,
}

#[derive(Default)]
struct UvInterner {
    idxs: HashMap<(usize, i64, i64), usize>,
    coords: Vec<Vector2>,
}

impl UvInterner {
    fn intern(&mut self, page: usize, uv: Vector2) -> usize {
        let key = (
            page,
            (uv[0] / UV_EPS).round() as i64,
            (uv[1] / UV_EPS).round() as i64,
        );
        *self.idxs.entry(key).or_insert_with(|| {
            self.coords.push(uv);
            self.coords.len() - 1
        })
    }
}

/// Maps every textured face through its patch placement into normalized
/// page coordinates. Texture coordinates follow the raster convention:
/// u grows rightwards, v downwards, both over [0, 1].
pub fn build_model(
    mesh: &Mesh,
    patches: &[TexturePatch],
    infos: &VertexProjectionInfos,
    atlas: &TextureAtlas,
) -> TexturedModel {
    let mut pixel_of: HashMap<(usize, usize), Vector2> = HashMap::new();
    for (v, projections) in infos.iter().enumerate() {
        for p in projections {
            pixel_of.insert((p.patch_idx, v), p.pixel);
        }
    }

    let mut interner = UvInterner::default();
    let mut face_textures: Vec<Option<FaceTexture>> =
        vec![None; mesh.faces.len()];

    for (patch_idx, patch) in patches.iter().enumerate() {
        let placement = &atlas.placements[patch_idx];
        let (pw, ph) = atlas.pages[placement.page].dimensions();
        for &f in &patch.faces {
            let uv_idxs = mesh.faces[f].map(|v| {
                let local = pixel_of[&(patch_idx, v)];
                let uv = Vector2::new(
                    (local[0] * patch.scale[0]
                        + placement.rect.pos[0] as f64)
                        / pw as f64,
                    (local[1] * patch.scale[1]
                        + placement.rect.pos[1] as f64)
                        / ph as f64,
                );
                interner.intern(placement.page, uv)
            });
            face_textures[f] = Some(FaceTexture {
                page: placement.page,
                uv_idxs,
            });
        }
    }

    TexturedModel {
        mesh: mesh.clone(),
        uv_coords: interner.coords,
        face_textures,
        pages: atlas.pages.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::texture::tests::frontal_view;

    fn two_face_mesh() -> Mesh {
        Mesh {
            vertices: vec![
                Point3::new(-0.5, -0.5, 2.0),
                Point3::new(-0.5, 0.5, 2.0),
                Point3::new(0.5, -0.5, 2.0),
                Point3::new(0.5, 0.5, 2.0),
            ],
            faces: vec![[0, 1, 2], [1, 3, 2]],
        }
    }

    fn patches_and_atlas(
        mesh: &Mesh,
        labels: &[Option<usize>],
        views: &[TextureView],
    ) -> (Vec<TexturePatch>, VertexProjectionInfos, TextureAtlas) {
        let topo = MeshTopology::new(mesh);
        let graph = build_adjacency_graph(mesh, &topo).unwrap();
        let settings = Settings {
            atlas_size: 128,
            ..Settings::default()
        };
        let (mut patches, infos) =
            generate_texture_patches(&graph, labels, mesh, views, &settings)
                .unwrap();
        let atlas = pack_atlas(&mut patches, &settings).unwrap();
        (patches, infos, atlas)
    }

    #[test]
    fn test_uv_coords_fall_inside_the_placed_rect() {
        let mesh = two_face_mesh();
        let views = vec![frontal_view(0, 64, 64)];
        let (patches, infos, atlas) =
            patches_and_atlas(&mesh, &[Some(0), Some(0)], &views);

        let model = build_model(&mesh, &patches, &infos, &atlas);
        assert_eq!(model.pages.len(), 1);

        let rect = &atlas.placements[0].rect;
        let (pw, ph) = model.pages[0].dimensions();
        for face in model.face_textures.iter().flatten() {
            for &idx in &face.uv_idxs {
                let uv = model.uv_coords[idx];
                let x = uv[0] * pw as f64;
                let y = uv[1] * ph as f64;
                assert!(x >= rect.pos[0] as f64 - 0.5);
                assert!(x <= (rect.pos[0] + rect.size[0]) as f64 + 0.5);
                assert!(y >= rect.pos[1] as f64 - 0.5);
                assert!(y <= (rect.pos[1] + rect.size[1]) as f64 + 0.5);
            }
        }
    }

    #[test]
    fn test_shared_vertices_share_uv_entries_within_a_patch() {
        let mesh = two_face_mesh();
        let views = vec![frontal_view(0, 64, 64)];
        let (patches, infos, atlas) =
            patches_and_atlas(&mesh, &[Some(0), Some(0)], &views);

        let model = build_model(&mesh, &patches, &infos, &atlas);

        // Two faces reference six slots but only four distinct corners.
        let mut idxs: Vec<usize> = model
            .face_textures
            .iter()
            .flatten()
            .flat_map(|f| f.uv_idxs)
            .collect();
        assert_eq!(idxs.len(), 6);
        idxs.sort_unstable();
        idxs.dedup();
        assert_eq!(idxs.len(), 4);
        assert_eq!(model.uv_coords.len(), 4);
    }

    #[test]
    fn test_split_patches_duplicate_the_seam_vertices() {
        let mesh = two_face_mesh();
        let views = vec![frontal_view(0, 64, 64), frontal_view(1, 64, 64)];
        let (patches, infos, atlas) =
            patches_and_atlas(&mesh, &[Some(0), Some(1)], &views);

        let model = build_model(&mesh, &patches, &infos, &atlas);
        assert_eq!(patches.len(), 2);

        // Seam vertices 1 and 2 appear once per patch.
        assert_eq!(model.uv_coords.len(), 6);
        let f0 = model.face_textures[0].unwrap();
        let f1 = model.face_textures[1].unwrap();
        for &i in &f0.uv_idxs {
            assert!(!f1.uv_idxs.contains(&i));
        }
    }

    #[test]
    fn test_dropped_faces_have_no_texture() {
        let mesh = two_face_mesh();
        let views = vec![frontal_view(0, 64, 64)];
        let (patches, infos, atlas) =
            patches_and_atlas(&mesh, &[Some(0), None], &views);

        let model = build_model(&mesh, &patches, &infos, &atlas);
        assert!(model.face_textures[0].is_some());
        assert!(model.face_textures[1].is_none());
    }
}
