//! Geometry reindexing, skinning and merging

mod chunk;
mod merge;
mod reindex;
mod skinning;

pub use chunk::{GeometryChunk, INFLUENCES_PER_VERTEX, POSITION_DIM, TEXCOORD_DIM};
pub use merge::{merge_by_material, merge_chunks};
pub use reindex::{StreamLayout, compact_index_tuples, compact_indices, re_index, vertex_count};
pub use skinning::{Influences, apply_skin, remap_bone_indices, vertex_influences};

use crate::document::{Document, ElementId};

/// Chunks of every `<triangles>` primitive of a `<geometry>`
pub fn geometry_chunks(doc: &Document, geometry: ElementId) -> Vec<GeometryChunk> {
    let name = doc.element(geometry).label().to_string();
    let Some(mesh) = doc.geometry(geometry).and_then(|g| g.mesh.as_ref()) else {
        tracing::warn!("Geometry '{}' has no supported mesh, skipping", name);
        return Vec::new();
    };

    let single = mesh.triangles.len() == 1;
    mesh.triangles
        .iter()
        .enumerate()
        .filter_map(|(i, triangles)| {
            let chunk_name = if single {
                name.clone()
            } else {
                format!("{name}_{i}")
            };
            GeometryChunk::from_triangles(doc, &chunk_name, triangles)
        })
        .filter(|chunk| chunk.triangle_count > 0)
        .collect()
}
