//! Geometry chunks: one triangle list with a shared index buffer

use glam::{Mat3, Mat4, Vec3};
use smallvec::SmallVec;

use super::reindex::{StreamLayout, compact_index_tuples, compact_indices, re_index, vertex_count};
use crate::document::{Document, Input, Source, Triangles};
use crate::skeleton::Bone;

/// Floats per position and normal
pub const POSITION_DIM: usize = 3;
/// Floats per texture coordinate
pub const TEXCOORD_DIM: usize = 2;
/// Bone influences per vertex
pub const INFLUENCES_PER_VERTEX: usize = 4;

/// GPU-ready triangle list
///
/// Every attribute buffer holds `vertex_count` entries at its stride and every
/// index is below `vertex_count`.
#[derive(Debug, Clone, Default)]
pub struct GeometryChunk {
    pub name: String,
    /// Material symbol of the source primitive
    pub material_symbol: Option<String>,
    /// Index into the converted material list
    pub material: Option<usize>,
    pub positions: Vec<f32>,
    pub normals: Option<Vec<f32>>,
    pub texcoords: Option<Vec<f32>>,
    /// Four weights per vertex
    pub bone_weights: Option<Vec<f32>>,
    /// Four bone indices per vertex
    pub bone_indices: Option<Vec<u32>>,
    pub indices: Vec<u32>,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub bind_shape_matrix: Option<Mat4>,
    /// Bone list of the skin the indices refer to, until they are remapped
    /// into the shared skeleton
    pub bones: Option<Vec<Bone>>,
    /// Document position index each vertex was built from
    pub source_positions: Vec<u32>,
}

struct AttributeInput<'a> {
    source: &'a Source,
    offset: usize,
}

impl AttributeInput<'_> {
    /// Copy the attribute into compacted vertex order
    fn gather(&self, indices: &[u32], stride: usize, compacted: &[u32], count: usize, dim: usize) -> Vec<f32> {
        let mut data = vec![0.0; count * dim];
        re_index(
            self.source.floats(),
            indices,
            StreamLayout::new(stride, self.offset, self.source.stride.max(1)),
            &mut data,
            compacted,
            StreamLayout::new(1, 0, dim),
        );
        data
    }
}

#[derive(Default)]
struct PrimitiveInputs<'a> {
    position: Option<AttributeInput<'a>>,
    normal: Option<AttributeInput<'a>>,
    texcoord: Option<(usize, AttributeInput<'a>)>,
}

impl<'a> PrimitiveInputs<'a> {
    fn collect(doc: &'a Document, triangles: &Triangles, name: &str) -> Self {
        let mut inputs = Self::default();
        for input in &triangles.inputs {
            if input.semantic == "VERTEX" {
                match doc.link_target(input.source).and_then(|id| doc.vertices(id)) {
                    Some(vertices) => {
                        for shared in &vertices.inputs {
                            inputs.add(doc, shared, input.offset, name);
                        }
                    }
                    None => tracing::warn!(
                        "Geometry '{}': <vertices> '{}' is unresolved",
                        name,
                        doc.link(input.source).describe()
                    ),
                }
            } else {
                inputs.add(doc, input, input.offset, name);
            }
        }
        inputs
    }

    fn add(&mut self, doc: &'a Document, input: &Input, offset: usize, name: &str) {
        let Some(source) = doc.linked_source(input.source) else {
            tracing::warn!(
                "Geometry '{}': {} source '{}' is unresolved",
                name,
                input.semantic,
                doc.link(input.source).describe()
            );
            return;
        };
        let attribute = AttributeInput { source, offset };
        match input.semantic.as_str() {
            "POSITION" => self.position = Some(attribute),
            "NORMAL" => self.normal = Some(attribute),
            "TEXCOORD" => {
                if self.texcoord.as_ref().is_none_or(|(set, _)| input.set < *set) {
                    self.texcoord = Some((input.set, attribute));
                }
            }
            other => tracing::debug!("Geometry '{}': ignoring {} input", name, other),
        }
    }
}

impl GeometryChunk {
    /// Build a chunk from a `<triangles>` primitive
    ///
    /// Returns `None` (after logging) when the primitive has no usable
    /// position input.
    pub fn from_triangles(doc: &Document, name: &str, triangles: &Triangles) -> Option<Self> {
        let inputs = PrimitiveInputs::collect(doc, triangles, name);
        let Some(position) = inputs.position else {
            tracing::error!("Geometry '{}': triangles without POSITION input", name);
            return None;
        };

        let stride = triangles.index_stride();
        let available = triangles.indices.len() / stride;
        let expected = triangles.count * 3;
        if available < expected {
            tracing::error!(
                "Geometry '{}': <p> holds {} corners, expected {}",
                name,
                available,
                expected
            );
        }
        let corners = (available.min(expected) / 3) * 3;
        let indices = &triangles.indices[..corners * stride];

        let mut offsets: SmallVec<[usize; 4]> = SmallVec::new();
        offsets.push(position.offset);
        offsets.extend(inputs.normal.as_ref().map(|n| n.offset));
        offsets.extend(inputs.texcoord.as_ref().map(|(_, t)| t.offset));
        offsets.sort_unstable();
        offsets.dedup();

        let compacted = if offsets.len() == 1 {
            compact_indices(indices, stride, offsets[0])
        } else {
            compact_index_tuples(indices, stride, &offsets)
        };
        let count = vertex_count(&compacted);

        let mut source_positions = vec![0u32; count];
        for (k, &vertex) in compacted.iter().enumerate() {
            source_positions[vertex as usize] = indices[k * stride + position.offset];
        }

        let positions = position.gather(indices, stride, &compacted, count, POSITION_DIM);
        let normals = inputs
            .normal
            .map(|n| n.gather(indices, stride, &compacted, count, POSITION_DIM));
        let texcoords = inputs
            .texcoord
            .map(|(_, t)| t.gather(indices, stride, &compacted, count, TEXCOORD_DIM));

        Some(Self {
            name: name.to_string(),
            material_symbol: triangles.material.clone(),
            positions,
            normals,
            texcoords,
            triangle_count: compacted.len() / 3,
            indices: compacted,
            vertex_count: count,
            source_positions,
            ..Default::default()
        })
    }

    pub fn is_skinned(&self) -> bool {
        self.bone_indices.is_some() && self.bone_weights.is_some()
    }

    /// Transform positions and normals by `matrix`
    pub fn transform(&mut self, matrix: Mat4) {
        for p in self.positions.chunks_exact_mut(POSITION_DIM) {
            let v = matrix.transform_point3(Vec3::from_slice(p));
            p.copy_from_slice(&v.to_array());
        }
        if let Some(normals) = &mut self.normals {
            let normal_matrix = Mat3::from_mat4(matrix).inverse().transpose();
            for n in normals.chunks_exact_mut(POSITION_DIM) {
                let v = (normal_matrix * Vec3::from_slice(n)).normalize_or_zero();
                n.copy_from_slice(&v.to_array());
            }
        }
    }

    /// Bake the bind-shape matrix into the vertex data
    pub fn apply_bind_shape(&mut self) {
        if let Some(matrix) = self.bind_shape_matrix.take() {
            self.transform(matrix);
        }
    }

    /// Check the buffer length and index range invariants
    pub fn is_valid(&self) -> bool {
        let n = self.vertex_count;
        self.positions.len() == n * POSITION_DIM
            && self.normals.as_ref().is_none_or(|b| b.len() == n * POSITION_DIM)
            && self.texcoords.as_ref().is_none_or(|b| b.len() == n * TEXCOORD_DIM)
            && self
                .bone_weights
                .as_ref()
                .is_none_or(|b| b.len() == n * INFLUENCES_PER_VERTEX)
            && self
                .bone_indices
                .as_ref()
                .is_none_or(|b| b.len() == n * INFLUENCES_PER_VERTEX)
            && self.indices.len() == self.triangle_count * 3
            && self.indices.iter().all(|&i| (i as usize) < n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_str;

    const QUAD: &str = r##"<?xml version="1.0"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <library_geometries>
    <geometry id="quad" name="quad">
      <mesh>
        <source id="quad-pos">
          <float_array id="quad-pos-array" count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
          <technique_common>
            <accessor source="#quad-pos-array" count="4" stride="3"/>
          </technique_common>
        </source>
        <source id="quad-nrm">
          <float_array id="quad-nrm-array" count="6">0 0 1 0 0 -1</float_array>
          <technique_common>
            <accessor source="#quad-nrm-array" count="2" stride="3"/>
          </technique_common>
        </source>
        <source id="quad-uv">
          <float_array id="quad-uv-array" count="12">0 0 5 1 0 5 1 1 5 0 1 5</float_array>
          <technique_common>
            <accessor source="#quad-uv-array" count="4" stride="3"/>
          </technique_common>
        </source>
        <vertices id="quad-vtx">
          <input semantic="POSITION" source="#quad-pos"/>
        </vertices>
        <triangles material="mat" count="2">
          <input semantic="VERTEX" source="#quad-vtx" offset="0"/>
          <input semantic="NORMAL" source="#quad-nrm" offset="1"/>
          <input semantic="TEXCOORD" source="#quad-uv" offset="0" set="0"/>
          <p>0 0 1 0 2 0 2 1 3 1 0 1</p>
        </triangles>
      </mesh>
    </geometry>
  </library_geometries>
</COLLADA>"##;

    fn quad_chunk() -> GeometryChunk {
        let doc = load_str(QUAD).unwrap();
        let id = doc.find_id("quad").unwrap();
        let mesh = doc.geometry(id).unwrap().mesh.as_ref().unwrap();
        GeometryChunk::from_triangles(&doc, "quad", &mesh.triangles[0]).unwrap()
    }

    #[test]
    fn test_from_triangles_splits_vertices_by_normal() {
        let chunk = quad_chunk();
        assert_eq!(chunk.vertex_count, 6);
        assert_eq!(chunk.triangle_count, 2);
        assert_eq!(chunk.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(chunk.source_positions, vec![0, 1, 2, 2, 3, 0]);
        assert_eq!(chunk.material_symbol.as_deref(), Some("mat"));
        assert!(chunk.is_valid());

        let normals = chunk.normals.as_ref().unwrap();
        assert_eq!(&normals[9..12], &[0.0, 0.0, -1.0]);
        // Texcoords are truncated to two components
        let texcoords = chunk.texcoords.as_ref().unwrap();
        assert_eq!(&texcoords[6..8], &[1.0, 1.0]);
    }

    #[test]
    fn test_transform_and_bind_shape() {
        let mut chunk = quad_chunk();
        chunk.bind_shape_matrix = Some(Mat4::from_translation(Vec3::new(0.0, 0.0, 2.0)));
        chunk.apply_bind_shape();
        assert!(chunk.bind_shape_matrix.is_none());
        assert_eq!(&chunk.positions[3..6], &[1.0, 0.0, 2.0]);

        chunk.transform(Mat4::from_rotation_x(std::f32::consts::PI));
        let normals = chunk.normals.as_ref().unwrap();
        assert!(Vec3::from_slice(&normals[0..3]).abs_diff_eq(Vec3::NEG_Z, 1e-6));
    }

    #[test]
    fn test_is_valid_detects_out_of_range_index() {
        let mut chunk = quad_chunk();
        chunk.indices[0] = 6;
        assert!(!chunk.is_valid());
    }
}
