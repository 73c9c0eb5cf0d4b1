//! Skeleton construction from skin joints
//!
//! A skin names its joints (by sid, or by id) and the instance names one or
//! more skeleton root nodes to search them under. Bones are created for the
//! joints, missing ancestors are synthesized so every chain ends at a root,
//! and bone lists from several skins can be merged into one skeleton.

use glam::{Mat4, Quat, Vec3};

use crate::document::{Document, ElementId};
use crate::error::{DaeError, Result};
use crate::resolver::find_sid_target;
use crate::scene::{NodeId, SceneGraph};

#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    /// Scene node driven by this bone
    pub node: NodeId,
    pub name: String,
    /// Index of the parent bone in the same list
    pub parent: Option<usize>,
    pub inv_bind_mat: Mat4,
    /// `false` for ancestors synthesized to complete a chain
    pub attached_to_skin: bool,
    pub index: usize,
    pub rest_translation: Vec3,
    pub rest_rotation: Quat,
    pub rest_scale: Vec3,
}

impl Bone {
    fn new(graph: &SceneGraph, node: NodeId, inv_bind_mat: Mat4, attached_to_skin: bool) -> Self {
        let (rest_translation, rest_rotation, rest_scale) = graph.local_trs(node);
        Self {
            node,
            name: graph.node(node).name.clone(),
            parent: None,
            inv_bind_mat,
            attached_to_skin,
            index: 0,
            rest_translation,
            rest_rotation,
            rest_scale,
        }
    }

    /// Same scene node and bit-identical inverse bind matrix
    pub fn is_same(&self, other: &Bone) -> bool {
        self.node == other.node
            && self
                .inv_bind_mat
                .to_cols_array()
                .iter()
                .zip(other.inv_bind_mat.to_cols_array().iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }

    /// Parent index for export, -1 for roots
    pub fn parent_index(&self) -> i32 {
        self.parent.map(|p| p as i32).unwrap_or(-1)
    }
}

/// Skin joint names and how to look them up
#[derive(Debug, Clone, Copy)]
pub struct JointNames<'a> {
    pub names: &'a [String],
    /// `IDREF_array` joints are global ids instead of sids
    pub by_id: bool,
}

/// Build the bone list of one skin
///
/// Returns an empty list (after a warning) when a joint cannot be found; the
/// skin is then treated as static geometry. `inverse_bind_matrices` holds 16
/// row-major floats per joint.
pub fn build_bones(
    doc: &Document,
    graph: &SceneGraph,
    joints: JointNames<'_>,
    skeleton_roots: &[ElementId],
    inverse_bind_matrices: &[f32],
) -> Vec<Bone> {
    if !joints.by_id && skeleton_roots.is_empty() {
        tracing::warn!("Skin has no resolved skeleton root, no bones created");
        return Vec::new();
    }

    let mut bones = Vec::with_capacity(joints.names.len());
    for (i, joint) in joints.names.iter().enumerate() {
        let Some(node) = find_joint_node(doc, graph, joint, joints.by_id, skeleton_roots) else {
            tracing::warn!("Joint '{}' not found, no bones created for skin", joint);
            return Vec::new();
        };

        let inv_bind_mat = match inverse_bind_matrices.get(i * 16..i * 16 + 16) {
            Some(values) => Mat4::from_cols_slice(values).transpose(),
            None => {
                tracing::error!("Missing inverse bind matrix for joint '{}'", joint);
                Mat4::IDENTITY
            }
        };
        bones.push(Bone::new(graph, node, inv_bind_mat, true));
    }

    // The list grows while it is scanned: synthesized ancestors get their own
    // parents filled in when the scan reaches them.
    let mut i = 0;
    while i < bones.len() {
        if bones[i].parent.is_none() {
            if let Some(parent_node) = graph.parent(bones[i].node) {
                let parent = match bones.iter().position(|b| b.node == parent_node) {
                    Some(existing) => existing,
                    None => {
                        let inv_bind_mat = graph.world_matrix(parent_node).inverse();
                        bones.push(Bone::new(graph, parent_node, inv_bind_mat, false));
                        bones.len() - 1
                    }
                };
                bones[i].parent = Some(parent);
            }
        }
        i += 1;
    }

    assign_indices(&mut bones);
    bones
}

fn find_joint_node(
    doc: &Document,
    graph: &SceneGraph,
    joint: &str,
    by_id: bool,
    skeleton_roots: &[ElementId],
) -> Option<NodeId> {
    if by_id {
        return doc
            .find_id(joint)
            .and_then(|element| graph.node_for_element(element));
    }

    let path: Vec<String> = joint.split('/').map(str::to_string).collect();
    skeleton_roots
        .iter()
        .filter_map(|&root| find_sid_target(doc, root, &path, true))
        .find_map(|element| graph.node_for_element(element))
}

/// Assign dense indices in list order
pub fn assign_indices(bones: &mut [Bone]) {
    for (index, bone) in bones.iter_mut().enumerate() {
        bone.index = index;
    }
}

/// Merge `src` into `dest`
///
/// Bones identical to an existing destination bone are folded into it (the
/// `attached_to_skin` flags are OR-ed); all other bones are appended, with
/// parents re-pointed through the merge mapping so whole ancestor chains
/// collapse onto existing bones. Returns the `src index -> dest index` map.
pub fn merge_bones(dest: &mut Vec<Bone>, src: &[Bone]) -> Vec<usize> {
    let mut mapping = Vec::with_capacity(src.len());
    let mut appended = Vec::new();

    for (i, bone) in src.iter().enumerate() {
        match dest.iter().position(|d| d.is_same(bone)) {
            Some(existing) => {
                dest[existing].attached_to_skin |= bone.attached_to_skin;
                mapping.push(existing);
            }
            None => {
                dest.push(bone.clone());
                mapping.push(dest.len() - 1);
                appended.push(i);
            }
        }
    }

    for i in appended {
        dest[mapping[i]].parent = src[i].parent.map(|p| mapping[p]);
    }

    assign_indices(dest);
    mapping
}

/// Merged skeleton shared by every skin of a scene
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a skin's bone list into the skeleton
    pub fn merge(&mut self, bones: &[Bone]) -> Vec<usize> {
        merge_bones(&mut self.bones, bones)
    }

    /// Index of the bone identical to `bone`
    pub fn find(&self, bone: &Bone) -> Option<usize> {
        self.bones.iter().position(|b| b.is_same(bone))
    }

    /// Map a skin's bone list onto this skeleton
    ///
    /// Every bone must already be part of the skeleton; a missing bone means
    /// the merge step was skipped and is reported as a hard error.
    pub fn bone_index_remap(&self, bones: &[Bone]) -> Result<Vec<usize>> {
        bones
            .iter()
            .map(|bone| {
                self.find(bone).ok_or_else(|| DaeError::BoneNotFound {
                    name: bone.name.clone(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }
}
