//! Document conversion
//!
//! Runs the whole pipeline on a resolved document: scene flattening, channel
//! binding, skeleton building, geometry reindexing and merging, and animation
//! resampling. The result only holds converter data, so the parsed document
//! can be dropped afterwards.

use glam::{Mat4, Quat, Vec3};
use hashbrown::HashMap;

use crate::animation::{AnimationData, KeyWindow, Resampler, collect_clips};
use crate::document::{Document, EffectColor, ElementId, LinkId, ParamValue, Skin};
use crate::error::Result;
use crate::geometry::{
    GeometryChunk, apply_skin, geometry_chunks, merge_by_material, remap_bone_indices,
    vertex_influences,
};
use crate::link::LinkKind;
use crate::options::{ConvertOptions, GeometryMerge};
use crate::scene::{GeometryInstance, InstanceKind, NodeId, SceneGraph};
use crate::skeleton::{Bone, JointNames, Skeleton, build_bones};

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedNode {
    pub name: String,
    pub parent: Option<usize>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Indices into [`ConvertedDocument::geometries`]
    pub geometries: Vec<usize>,
    /// Bone driven by this node
    pub bone: Option<usize>,
    /// A channel writes into one of the node's transforms
    pub animated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedMaterial {
    pub name: String,
    /// RGBA, white when a texture is bound
    pub diffuse: [f32; 4],
    /// Image path of the diffuse texture
    pub texture: Option<String>,
}

impl Default for ConvertedMaterial {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse: [1.0; 4],
            texture: None,
        }
    }
}

/// Flattened, GPU-ready scene
#[derive(Debug, Clone, Default)]
pub struct ConvertedDocument {
    pub nodes: Vec<ConvertedNode>,
    pub geometries: Vec<GeometryChunk>,
    pub materials: Vec<ConvertedMaterial>,
    pub skeleton: Skeleton,
    pub animations: Vec<AnimationData>,
}

/// Convert a resolved document
///
/// Only a broken internal invariant is an error; everything the document
/// gets wrong is logged and skipped.
pub fn convert(doc: &Document, options: &ConvertOptions) -> Result<ConvertedDocument> {
    let mut graph = SceneGraph::from_document(doc);
    let clips = collect_clips(doc, &mut graph, options.merge_animations);

    let mut materials = MaterialRegistry::default();
    let mut skeleton = Skeleton::new();
    let mut node_chunks: Vec<(NodeId, GeometryChunk)> = Vec::new();

    for (node_id, node) in graph.nodes() {
        for instance in &node.instances {
            let mut chunks = match &instance.kind {
                InstanceKind::Static { geometry } => geometry_chunks(doc, *geometry),
                InstanceKind::Skinned {
                    controller,
                    skeletons,
                } => skinned_chunks(doc, &graph, &mut skeleton, *controller, skeletons, options),
            };
            for chunk in &mut chunks {
                chunk.material = bind_material(doc, &mut materials, instance, chunk);
            }
            node_chunks.extend(chunks.into_iter().map(|chunk| (node_id, chunk)));
        }
    }

    for (_, chunk) in &mut node_chunks {
        if let Some(bones) = &chunk.bones {
            let mapping = skeleton.bone_index_remap(bones)?;
            remap_bone_indices(chunk, &mapping);
        }
    }

    if node_chunks.is_empty() {
        tracing::error!("No geometry found in the visual scene");
    }
    let (geometries, geometry_owners) = merge_geometry(&graph, node_chunks, options.geometry_merge);

    let nodes = graph
        .nodes()
        .map(|(id, node)| {
            let (translation, rotation, scale) = graph.local_trs(id);
            ConvertedNode {
                name: node.name.clone(),
                parent: node.parent.map(|p| p.0 as usize),
                translation,
                rotation,
                scale,
                geometries: geometry_owners
                    .iter()
                    .enumerate()
                    .filter(|(_, owner)| **owner == Some(id))
                    .map(|(i, _)| i)
                    .collect(),
                bone: skeleton.bones.iter().position(|b| b.node == id),
                animated: graph.is_animated_by(id, None, false),
            }
        })
        .collect();

    let mut animations = Vec::new();
    if options.enable_resampling && !clips.is_empty() {
        if skeleton.is_empty() {
            tracing::info!("No skinned geometry, {} animation clips not resampled", clips.len());
        } else {
            let resampler = Resampler {
                bones: &skeleton.bones,
                fps: options.animation_fps,
                remove_constant_tracks: options.remove_constant_tracks,
            };
            for clip in &clips {
                if options.animation_labels.is_empty() {
                    animations.extend(resampler.create(&mut graph, clip, KeyWindow::ALL, &clip.name));
                } else {
                    animations.extend(resampler.create_labeled(&mut graph, clip, &options.animation_labels));
                }
            }
        }
    }

    tracing::info!(
        "Converted {} nodes, {} geometries, {} materials, {} bones, {} animations",
        graph.len(),
        geometries.len(),
        materials.list.len(),
        skeleton.len(),
        animations.len()
    );

    Ok(ConvertedDocument {
        nodes,
        geometries,
        materials: materials.list,
        skeleton,
        animations,
    })
}

/// Chunks of a skin's geometry, with weights when its skeleton resolves
fn skinned_chunks(
    doc: &Document,
    graph: &SceneGraph,
    skeleton: &mut Skeleton,
    controller: ElementId,
    skeleton_roots: &[ElementId],
    options: &ConvertOptions,
) -> Vec<GeometryChunk> {
    let label = doc.element(controller).label().to_string();
    let Some(skin) = doc.controller(controller).and_then(|c| c.skin.as_ref()) else {
        tracing::warn!("Controller '{}' is not a skin, skipping", label);
        return Vec::new();
    };
    let Some(geometry) = doc.link_target(skin.source) else {
        tracing::warn!("Skin '{}': geometry '{}' is unresolved", label, doc.link(skin.source).describe());
        return Vec::new();
    };

    let mut chunks = geometry_chunks(doc, geometry);
    let bind_shape = skin
        .bind_shape_matrix
        .map(|m| Mat4::from_cols_array(&m).transpose());

    let bones = skin_bones(doc, graph, skin, skeleton_roots, &label);
    if bones.is_empty() {
        // Degrade to static geometry in bind shape space
        for chunk in &mut chunks {
            chunk.bind_shape_matrix = bind_shape;
            chunk.apply_bind_shape();
        }
        return chunks;
    }

    let influences = vertex_influences(doc, skin);
    for chunk in &mut chunks {
        apply_skin(chunk, &influences, bind_shape, bones.clone());
        if options.apply_bind_shape {
            chunk.apply_bind_shape();
        }
    }
    skeleton.merge(&bones);
    chunks
}

fn skin_bones(
    doc: &Document,
    graph: &SceneGraph,
    skin: &Skin,
    skeleton_roots: &[ElementId],
    label: &str,
) -> Vec<Bone> {
    let joint_source = skin
        .joints
        .iter()
        .find(|i| i.semantic == "JOINT")
        .and_then(|i| doc.linked_source(i.source));
    let Some(joint_source) = joint_source else {
        tracing::warn!("Skin '{}' has no resolved JOINT source", label);
        return Vec::new();
    };
    let inverse_bind_matrices = skin
        .joints
        .iter()
        .find(|i| i.semantic == "INV_BIND_MATRIX")
        .and_then(|i| doc.linked_source(i.source))
        .map(|s| s.floats())
        .unwrap_or_default();

    build_bones(
        doc,
        graph,
        JointNames {
            names: joint_source.strings(),
            by_id: joint_source.is_id_ref(),
        },
        skeleton_roots,
        inverse_bind_matrices,
    )
}

/// Merge chunks according to `mode`
///
/// Returns the merged chunks and the node owning each of them; chunks merged
/// across the scene have no owner.
fn merge_geometry(
    graph: &SceneGraph,
    node_chunks: Vec<(NodeId, GeometryChunk)>,
    mode: GeometryMerge,
) -> (Vec<GeometryChunk>, Vec<Option<NodeId>>) {
    match mode {
        GeometryMerge::None => node_chunks
            .into_iter()
            .map(|(node, chunk)| (chunk, Some(node)))
            .unzip(),
        GeometryMerge::PerNode => {
            let mut order: Vec<NodeId> = Vec::new();
            let mut per_node: HashMap<NodeId, Vec<GeometryChunk>> = HashMap::new();
            for (node, chunk) in node_chunks {
                per_node
                    .entry(node)
                    .or_insert_with(|| {
                        order.push(node);
                        Vec::new()
                    })
                    .push(chunk);
            }

            let mut geometries = Vec::new();
            let mut owners = Vec::new();
            for node in order {
                let chunks = per_node.remove(&node).unwrap_or_default();
                let (skinned, rigid): (Vec<_>, Vec<_>) = chunks.into_iter().partition(|c| c.is_skinned());
                let name = &graph.node(node).name;
                let skinned_name = if rigid.is_empty() {
                    name.clone()
                } else {
                    format!("{name}_skinned")
                };
                for merged in merge_by_material(name, rigid)
                    .into_iter()
                    .chain(merge_by_material(&skinned_name, skinned))
                {
                    geometries.push(merged);
                    owners.push(Some(node));
                }
            }
            (geometries, owners)
        }
        GeometryMerge::Scene => {
            let mut rigid = Vec::new();
            let mut skinned = Vec::new();
            for (node, mut chunk) in node_chunks {
                if chunk.is_skinned() {
                    skinned.push(chunk);
                } else {
                    chunk.transform(graph.world_matrix(node));
                    rigid.push(chunk);
                }
            }
            let geometries: Vec<GeometryChunk> = merge_by_material("scene", rigid)
                .into_iter()
                .chain(merge_by_material("scene_skinned", skinned))
                .collect();
            let owners = vec![None; geometries.len()];
            (geometries, owners)
        }
    }
}

#[derive(Default)]
struct MaterialRegistry {
    by_element: HashMap<ElementId, usize>,
    list: Vec<ConvertedMaterial>,
}

impl MaterialRegistry {
    fn index(&mut self, doc: &Document, material: ElementId) -> usize {
        if let Some(&index) = self.by_element.get(&material) {
            return index;
        }
        let index = self.list.len();
        self.list.push(convert_material(doc, material));
        self.by_element.insert(material, index);
        index
    }
}

fn bind_material(
    doc: &Document,
    materials: &mut MaterialRegistry,
    instance: &GeometryInstance,
    chunk: &GeometryChunk,
) -> Option<usize> {
    let symbol = chunk.material_symbol.as_deref()?;
    match instance.material_for(symbol) {
        Some(material) => Some(materials.index(doc, material)),
        None => {
            tracing::warn!("Geometry '{}': material symbol '{}' is not bound", chunk.name, symbol);
            None
        }
    }
}

fn convert_material(doc: &Document, material: ElementId) -> ConvertedMaterial {
    let mut converted = ConvertedMaterial {
        name: doc.element(material).label().to_string(),
        ..Default::default()
    };

    let effect = doc
        .material(material)
        .and_then(|m| m.effect)
        .and_then(|link| doc.link_target(link))
        .and_then(|id| doc.effect(id));
    match effect.and_then(|e| e.diffuse.as_ref()) {
        Some(EffectColor::Color(color)) => converted.diffuse = *color,
        Some(EffectColor::Texture(link)) => {
            converted.texture = texture_path(doc, *link);
            if converted.texture.is_none() {
                tracing::warn!("Material '{}': diffuse texture does not lead to an image", converted.name);
            }
        }
        None => tracing::debug!("Material '{}' has no diffuse channel", converted.name),
    }
    converted
}

/// Follow `texture -> sampler2D -> surface -> image`
fn texture_path(doc: &Document, texture: LinkId) -> Option<String> {
    let image_path = |id: ElementId| doc.image(id).and_then(|i| i.init_from.clone());
    let param_image = |param: ElementId| -> Option<ElementId> {
        match &doc.new_param(param)?.value {
            ParamValue::Surface { image } => image.and_then(|l| doc.link_target(l)),
            _ => None,
        }
    };

    let Some(param) = doc.link_target(texture) else {
        // Some exporters reference the image id directly
        return match &doc.link(texture).kind {
            LinkKind::Fx { name, .. } => doc.find_id(name).and_then(image_path),
            _ => None,
        };
    };

    let image = match &doc.new_param(param)?.value {
        ParamValue::Sampler2D { image, surface } => image
            .and_then(|l| doc.link_target(l))
            .or_else(|| surface.and_then(|l| doc.link_target(l)).and_then(param_image)),
        ParamValue::Surface { .. } => param_image(param),
        ParamValue::Other => None,
    }?;
    image_path(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_str;

    /// One triangle instanced with `symbol` bound to a material using `profile`
    fn textured_doc(profile: &str, bound_symbol: &str) -> String {
        format!(
            r##"<?xml version="1.0"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <library_images>
    <image id="wood-png"><init_from>wood.png</init_from></image>
  </library_images>
  <library_effects>
    <effect id="fx"><profile_COMMON>{profile}</profile_COMMON></effect>
  </library_effects>
  <library_materials>
    <material id="mat" name="wood"><instance_effect url="#fx"/></material>
  </library_materials>
  <library_geometries>
    <geometry id="tri">
      <mesh>
        <source id="tri-pos">
          <float_array id="tri-pos-array" count="9">0 0 0 1 0 0 0 1 0</float_array>
          <technique_common><accessor source="#tri-pos-array" count="3" stride="3"/></technique_common>
        </source>
        <vertices id="tri-vtx"><input semantic="POSITION" source="#tri-pos"/></vertices>
        <triangles material="surface" count="1">
          <input semantic="VERTEX" source="#tri-vtx" offset="0"/>
          <p>0 1 2</p>
        </triangles>
      </mesh>
    </geometry>
  </library_geometries>
  <library_visual_scenes>
    <visual_scene id="scene">
      <node id="n">
        <instance_geometry url="#tri">
          <bind_material><technique_common>
            <instance_material symbol="{bound_symbol}" target="#mat"/>
          </technique_common></bind_material>
        </instance_geometry>
      </node>
    </visual_scene>
  </library_visual_scenes>
</COLLADA>"##
        )
    }

    fn convert_doc(text: &str) -> ConvertedDocument {
        let doc = load_str(text).unwrap();
        convert(&doc, &ConvertOptions::default()).unwrap()
    }

    #[test]
    fn test_texture_referencing_image_directly() {
        let profile = r#"<technique sid="common"><lambert>
            <diffuse><texture texture="wood-png" texcoord="uv"/></diffuse>
        </lambert></technique>"#;
        let converted = convert_doc(&textured_doc(profile, "surface"));

        assert_eq!(converted.geometries[0].material, Some(0));
        let material = &converted.materials[0];
        assert_eq!(material.name, "wood");
        assert_eq!(material.texture.as_deref(), Some("wood.png"));
        assert_eq!(material.diffuse, [1.0; 4]);
    }

    #[test]
    fn test_sampler_with_instance_image() {
        let profile = r##"<newparam sid="wood-sampler">
            <sampler2D><instance_image url="#wood-png"/></sampler2D>
        </newparam>
        <technique sid="common"><lambert>
            <diffuse><texture texture="wood-sampler" texcoord="uv"/></diffuse>
        </lambert></technique>"##;
        let converted = convert_doc(&textured_doc(profile, "surface"));
        assert_eq!(converted.materials[0].texture.as_deref(), Some("wood.png"));
    }

    #[test]
    fn test_diffuse_color() {
        let profile = r#"<technique sid="common"><phong>
            <diffuse><color>0.5 0.25 1 1</color></diffuse>
        </phong></technique>"#;
        let converted = convert_doc(&textured_doc(profile, "surface"));
        assert_eq!(converted.materials[0].diffuse, [0.5, 0.25, 1.0, 1.0]);
        assert_eq!(converted.materials[0].texture, None);
    }

    #[test]
    fn test_unbound_symbol_has_no_material() {
        let converted = convert_doc(&textured_doc("", "other"));
        assert_eq!(converted.geometries.len(), 1);
        assert_eq!(converted.geometries[0].material, None);
        assert!(converted.materials.is_empty());
    }

    #[test]
    fn test_empty_scene_converts() {
        let text = r#"<?xml version="1.0"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <library_visual_scenes><visual_scene id="scene"/></library_visual_scenes>
</COLLADA>"#;
        let converted = convert_doc(text);
        assert!(converted.nodes.is_empty());
        assert!(converted.geometries.is_empty());
        assert!(converted.animations.is_empty());
    }
}
