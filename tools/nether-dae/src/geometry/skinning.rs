//! Skin weights
//!
//! `<vertex_weights>` lists a variable number of (joint, weight) pairs per
//! document position. They are reduced to the strongest four, renormalised,
//! and expanded onto the chunk's vertices through the position each vertex
//! was built from.

use glam::Mat4;
use smallvec::SmallVec;

use super::chunk::{GeometryChunk, INFLUENCES_PER_VERTEX};
use crate::document::{Document, Skin};
use crate::skeleton::Bone;

/// (joint index, weight) pairs of one position, strongest first
pub type Influences = SmallVec<[(u32, f32); INFLUENCES_PER_VERTEX]>;

/// Per-position influences of a skin
pub fn vertex_influences(doc: &Document, skin: &Skin) -> Vec<Influences> {
    let weights = &skin.weights;
    let joint_offset = weights
        .inputs
        .iter()
        .find(|i| i.semantic == "JOINT")
        .map(|i| i.offset);
    let weight_input = weights.inputs.iter().find(|i| i.semantic == "WEIGHT");

    let (Some(joint_offset), Some(weight_input)) = (joint_offset, weight_input) else {
        tracing::error!("<vertex_weights> needs JOINT and WEIGHT inputs");
        return Vec::new();
    };
    let Some(weight_values) = doc.linked_source(weight_input.source).map(|s| s.floats()) else {
        tracing::warn!(
            "Skin weight source '{}' is unresolved",
            doc.link(weight_input.source).describe()
        );
        return Vec::new();
    };

    let stride = weights.inputs.iter().map(|i| i.offset + 1).max().unwrap_or(1);
    let mut cursor = 0usize;
    let mut truncated = 0usize;
    let mut result = Vec::with_capacity(weights.vcount.len());

    for &n in &weights.vcount {
        let mut all: SmallVec<[(u32, f32); 8]> = SmallVec::new();
        for _ in 0..n {
            let joint = weights.v.get(cursor + joint_offset).copied();
            let weight = weights
                .v
                .get(cursor + weight_input.offset)
                .and_then(|&w| usize::try_from(w).ok())
                .and_then(|w| weight_values.get(w).copied());
            cursor += stride;

            match (joint, weight) {
                // -1 binds to the bind shape itself
                (Some(joint), Some(weight)) if joint >= 0 => all.push((joint as u32, weight)),
                (Some(_), Some(_)) => {}
                _ => {
                    tracing::error!("<vertex_weights> <v> is shorter than <vcount> requires");
                    return result;
                }
            }
        }

        all.sort_by(|a, b| b.1.total_cmp(&a.1));
        if all.len() > INFLUENCES_PER_VERTEX {
            truncated += 1;
            all.truncate(INFLUENCES_PER_VERTEX);
        }
        let sum: f32 = all.iter().map(|(_, w)| w).sum();
        if sum > 0.0 {
            for (_, w) in &mut all {
                *w /= sum;
            }
        }
        result.push(all.into_iter().collect());
    }

    if truncated > 0 {
        tracing::debug!(
            "{} positions had more than {} influences, kept the strongest",
            truncated,
            INFLUENCES_PER_VERTEX
        );
    }
    result
}

/// Attach skin data to a chunk
///
/// `bones` is the bone list built for the skin; its first entries are the
/// skin joints in order, so joint indices are bone indices. Synthesized
/// ancestors follow the joints and are never valid joint indices.
pub fn apply_skin(chunk: &mut GeometryChunk, influences: &[Influences], bind_shape: Option<Mat4>, bones: Vec<Bone>) {
    let joint_count = bones.iter().take_while(|b| b.attached_to_skin).count();
    let mut bone_indices = vec![0u32; chunk.vertex_count * INFLUENCES_PER_VERTEX];
    let mut bone_weights = vec![0.0f32; chunk.vertex_count * INFLUENCES_PER_VERTEX];
    let mut unweighted = 0usize;

    for (vertex, &position) in chunk.source_positions.iter().enumerate() {
        let Some(vertex_influences) = influences.get(position as usize).filter(|i| !i.is_empty()) else {
            unweighted += 1;
            continue;
        };
        let base = vertex * INFLUENCES_PER_VERTEX;
        for (slot, &(joint, weight)) in vertex_influences.iter().enumerate() {
            if joint as usize >= joint_count {
                tracing::error!("Joint index {} out of range for {} joints", joint, joint_count);
                continue;
            }
            bone_indices[base + slot] = joint;
            bone_weights[base + slot] = weight;
        }
    }

    if unweighted > 0 {
        tracing::warn!("Geometry '{}': {} vertices have no skin weights", chunk.name, unweighted);
    }

    chunk.bone_indices = Some(bone_indices);
    chunk.bone_weights = Some(bone_weights);
    chunk.bind_shape_matrix = bind_shape;
    chunk.bones = Some(bones);
}

/// Rewrite bone indices through `mapping` (skin bone index -> skeleton bone index)
pub fn remap_bone_indices(chunk: &mut GeometryChunk, mapping: &[usize]) {
    if let Some(indices) = &mut chunk.bone_indices {
        for index in indices.iter_mut() {
            if let Some(&mapped) = mapping.get(*index as usize) {
                *index = mapped as u32;
            }
        }
    }
    chunk.bones = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Input, Source, SourceData, VertexWeights};
    use crate::link::LinkKind;

    fn skin_with_weights(weight_values: Vec<f32>, vcount: Vec<u32>, v: Vec<i32>) -> (Document, Skin) {
        let mut doc = Document::new();
        let source = doc.add_element(None, "source", Some("weights".into()), None, None);
        doc.set_kind(
            source,
            crate::document::ElementKind::Source(Source {
                count: weight_values.len(),
                stride: 1,
                offset: 0,
                data: SourceData::Float(weight_values),
            }),
        );
        let weights_link = doc.add_link(LinkKind::Global {
            id: "weights".into(),
        });
        let joints_link = doc.add_link(LinkKind::Global { id: "joints".into() });
        let geometry_link = doc.add_link(LinkKind::Global { id: "mesh".into() });
        crate::resolver::resolve_links(&mut doc);

        let skin = Skin {
            source: geometry_link,
            bind_shape_matrix: None,
            joints: Vec::new(),
            weights: VertexWeights {
                count: vcount.len(),
                inputs: vec![
                    Input {
                        semantic: "JOINT".into(),
                        source: joints_link,
                        offset: 0,
                        set: 0,
                    },
                    Input {
                        semantic: "WEIGHT".into(),
                        source: weights_link,
                        offset: 1,
                        set: 0,
                    },
                ],
                vcount,
                v,
            },
        };
        (doc, skin)
    }

    #[test]
    fn test_influences_keep_strongest_four_and_renormalise() {
        let (doc, skin) = skin_with_weights(
            vec![0.1, 0.2, 0.3, 0.4, 0.5, 1.0],
            vec![5, 1],
            vec![0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 2, 5],
        );
        let influences = vertex_influences(&doc, &skin);
        assert_eq!(influences.len(), 2);

        let first = &influences[0];
        assert_eq!(first.len(), 4);
        assert_eq!(first[0].0, 4);
        assert_eq!(first[3].0, 1);
        let sum: f32 = first.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-6);

        assert_eq!(influences[1].as_slice(), &[(2, 1.0)]);
    }

    #[test]
    fn test_influences_skip_bind_shape_joint() {
        let (doc, skin) = skin_with_weights(vec![0.5, 0.5], vec![2], vec![-1, 0, 3, 1]);
        let influences = vertex_influences(&doc, &skin);
        assert_eq!(influences[0].as_slice(), &[(3, 1.0)]);
    }

    #[test]
    fn test_apply_skin_expands_through_positions() {
        let mut chunk = GeometryChunk {
            name: "tri".into(),
            vertex_count: 3,
            source_positions: vec![1, 0, 1],
            ..Default::default()
        };
        let influences: Vec<Influences> = vec![
            [(0u32, 1.0f32)].into_iter().collect(),
            [(1u32, 0.75f32), (0u32, 0.25f32)].into_iter().collect(),
        ];
        let bones = Vec::new();
        apply_skin(&mut chunk, &influences, None, bones);

        // Every joint is out of range for an empty bone list
        assert_eq!(chunk.bone_weights.as_ref().unwrap().iter().sum::<f32>(), 0.0);

        let mut chunk = GeometryChunk {
            name: "tri".into(),
            vertex_count: 3,
            source_positions: vec![1, 0, 1],
            ..Default::default()
        };
        let bones = vec![dummy_bone(0), dummy_bone(1)];
        apply_skin(&mut chunk, &influences, None, bones);
        let indices = chunk.bone_indices.as_ref().unwrap();
        let weights = chunk.bone_weights.as_ref().unwrap();
        assert_eq!(&indices[0..4], &[1, 0, 0, 0]);
        assert_eq!(&weights[0..4], &[0.75, 0.25, 0.0, 0.0]);
        assert_eq!(&indices[4..8], &[0, 0, 0, 0]);
        assert_eq!(&weights[4..8], &[1.0, 0.0, 0.0, 0.0]);
        assert!(chunk.is_skinned());

        remap_bone_indices(&mut chunk, &[5, 7]);
        assert_eq!(&chunk.bone_indices.as_ref().unwrap()[0..2], &[7, 5]);
        assert!(chunk.bones.is_none());
    }

    #[test]
    fn test_apply_skin_rejects_synthesized_ancestor_index() {
        let mut chunk = GeometryChunk {
            name: "tri".into(),
            vertex_count: 1,
            source_positions: vec![0],
            ..Default::default()
        };
        let influences: Vec<Influences> = vec![[(1u32, 0.5f32), (0u32, 0.5f32)].into_iter().collect()];
        let mut ancestor = dummy_bone(1);
        ancestor.attached_to_skin = false;
        apply_skin(&mut chunk, &influences, None, vec![dummy_bone(0), ancestor]);

        let indices = chunk.bone_indices.as_ref().unwrap();
        let weights = chunk.bone_weights.as_ref().unwrap();
        assert_eq!(&indices[0..4], &[0, 0, 0, 0]);
        assert_eq!(&weights[0..4], &[0.0, 0.5, 0.0, 0.0]);
    }

    fn dummy_bone(index: usize) -> Bone {
        Bone {
            node: crate::scene::NodeId(index as u32),
            name: format!("bone{index}"),
            parent: None,
            inv_bind_mat: Mat4::IDENTITY,
            attached_to_skin: true,
            index,
            rest_translation: glam::Vec3::ZERO,
            rest_rotation: glam::Quat::IDENTITY,
            rest_scale: glam::Vec3::ONE,
        }
    }
}
