//! Chunk merging
//!
//! Index buffers are concatenated with a running vertex offset and attribute
//! buffers are appended. An attribute only survives when every merged chunk
//! has it.

use super::chunk::GeometryChunk;

fn merge_attribute<T: Copy>(chunks: &[GeometryChunk], get: impl Fn(&GeometryChunk) -> Option<&Vec<T>>) -> Option<Vec<T>> {
    let mut merged = Vec::new();
    for chunk in chunks {
        merged.extend_from_slice(get(chunk)?);
    }
    Some(merged)
}

/// Merge chunks into one
///
/// All chunks must share a bone index space (skins already remapped into one
/// skeleton). Differing bind-shape matrices are baked into the vertex data
/// first. Returns `None` for an empty slice.
pub fn merge_chunks(name: &str, chunks: &[GeometryChunk]) -> Option<GeometryChunk> {
    let first = chunks.first()?;
    if chunks.len() == 1 {
        return Some(first.clone());
    }

    let shared_bind_shape = chunks
        .iter()
        .all(|c| c.bind_shape_matrix == first.bind_shape_matrix);
    let baked;
    let chunks = if shared_bind_shape {
        chunks
    } else {
        baked = chunks
            .iter()
            .cloned()
            .map(|mut c| {
                c.apply_bind_shape();
                c
            })
            .collect::<Vec<_>>();
        baked.as_slice()
    };

    let mut indices = Vec::with_capacity(chunks.iter().map(|c| c.indices.len()).sum());
    let mut positions = Vec::with_capacity(chunks.iter().map(|c| c.positions.len()).sum());
    let mut vertex_offset = 0u32;
    for chunk in chunks {
        indices.extend(chunk.indices.iter().map(|&i| i + vertex_offset));
        positions.extend_from_slice(&chunk.positions);
        vertex_offset += chunk.vertex_count as u32;
    }

    let normals = merge_attribute(chunks, |c| c.normals.as_ref());
    let texcoords = merge_attribute(chunks, |c| c.texcoords.as_ref());
    let mut bone_weights = merge_attribute(chunks, |c| c.bone_weights.as_ref());
    let mut bone_indices = merge_attribute(chunks, |c| c.bone_indices.as_ref());
    if bone_weights.is_none() || bone_indices.is_none() {
        bone_weights = None;
        bone_indices = None;
    }

    for (label, kept, any) in [
        ("normals", normals.is_some(), chunks.iter().any(|c| c.normals.is_some())),
        ("texcoords", texcoords.is_some(), chunks.iter().any(|c| c.texcoords.is_some())),
        ("skin weights", bone_weights.is_some(), chunks.iter().any(|c| c.is_skinned())),
    ] {
        if any && !kept {
            tracing::warn!("Merged geometry '{}': {} missing from some chunks, dropped", name, label);
        }
    }

    Some(GeometryChunk {
        name: name.to_string(),
        material_symbol: first.material_symbol.clone(),
        material: first.material,
        positions,
        normals,
        texcoords,
        bone_weights,
        bone_indices,
        indices,
        vertex_count: chunks.iter().map(|c| c.vertex_count).sum(),
        triangle_count: chunks.iter().map(|c| c.triangle_count).sum(),
        bind_shape_matrix: chunks[0].bind_shape_matrix,
        bones: None,
        source_positions: Vec::new(),
    })
}

/// Merge chunks that share a material, keeping first-appearance order
pub fn merge_by_material(name: &str, chunks: Vec<GeometryChunk>) -> Vec<GeometryChunk> {
    let mut groups: Vec<(Option<usize>, Vec<GeometryChunk>)> = Vec::new();
    for chunk in chunks {
        match groups.iter_mut().find(|(material, _)| *material == chunk.material) {
            Some((_, group)) => group.push(chunk),
            None => groups.push((chunk.material, vec![chunk])),
        }
    }

    let grouped = groups.len();
    groups
        .into_iter()
        .enumerate()
        .filter_map(|(i, (_, group))| {
            let label = if grouped == 1 {
                name.to_string()
            } else {
                format!("{name}_{i}")
            };
            if group.len() == 1 {
                group.into_iter().next().map(|mut chunk| {
                    chunk.name = label;
                    chunk
                })
            } else {
                merge_chunks(&label, &group)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};

    fn triangle(offset: f32, normals: bool, material: Option<usize>) -> GeometryChunk {
        GeometryChunk {
            name: "tri".into(),
            material,
            positions: vec![offset, 0.0, 0.0, offset + 1.0, 0.0, 0.0, offset, 1.0, 0.0],
            normals: normals.then(|| [0.0, 0.0, 1.0].repeat(3)),
            texcoords: Some(vec![0.0; 6]),
            indices: vec![0, 1, 2],
            vertex_count: 3,
            triangle_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_offsets_indices() {
        let merged = merge_chunks("m", &[triangle(0.0, true, None), triangle(5.0, true, None)]).unwrap();
        assert_eq!(merged.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(merged.vertex_count, 6);
        assert_eq!(merged.triangle_count, 2);
        assert_eq!(merged.positions[9], 5.0);
        assert!(merged.normals.is_some());
        assert!(merged.is_valid());
    }

    #[test]
    fn test_merge_drops_attribute_missing_from_one_chunk() {
        let merged = merge_chunks("m", &[triangle(0.0, true, None), triangle(5.0, false, None)]).unwrap();
        assert!(merged.normals.is_none());
        assert_eq!(merged.texcoords.as_ref().unwrap().len(), 12);
        assert!(merged.is_valid());
    }

    #[test]
    fn test_merge_bakes_differing_bind_shapes() {
        let mut a = triangle(0.0, false, None);
        a.bind_shape_matrix = Some(Mat4::from_translation(Vec3::Z));
        let b = triangle(0.0, false, None);
        let merged = merge_chunks("m", &[a, b]).unwrap();
        assert!(merged.bind_shape_matrix.is_none());
        assert_eq!(merged.positions[2], 1.0);
        assert_eq!(merged.positions[11], 0.0);
    }

    #[test]
    fn test_merge_by_material_groups_in_order() {
        let chunks = vec![
            triangle(0.0, true, Some(1)),
            triangle(1.0, true, Some(0)),
            triangle(2.0, true, Some(1)),
        ];
        let merged = merge_by_material("scene", chunks);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].material, Some(1));
        assert_eq!(merged[0].vertex_count, 6);
        assert_eq!(merged[0].name, "scene_0");
        assert_eq!(merged[1].material, Some(0));
        assert_eq!(merged[1].vertex_count, 3);
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge_chunks("m", &[]).is_none());
        assert!(merge_by_material("m", Vec::new()).is_empty());
    }
}
