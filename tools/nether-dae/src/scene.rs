//! Converter-side scene graph
//!
//! The instanced visual scene is flattened into an arena of [`SceneNode`]s
//! addressed by [`NodeId`]. Parent links are indices used for lookup only.
//! Side tables map document elements to converter nodes and transforms so
//! the parsed document can be dropped once conversion is done.

use glam::{Mat4, Quat, Vec3};
use hashbrown::HashMap;

use crate::document::{Document, ElementId, InstanceMaterial};
use crate::transform::TransformTarget;

/// Arena index of a converter node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// What a geometry instance points at
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceKind {
    Static {
        geometry: ElementId,
    },
    Skinned {
        controller: ElementId,
        /// Resolved `<skeleton>` root nodes, in document order
        skeletons: Vec<ElementId>,
    },
}

/// `<instance_geometry>` or `<instance_controller>` attached to a node
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryInstance {
    pub kind: InstanceKind,
    /// Material symbol -> `<material>` element
    pub materials: Vec<(String, ElementId)>,
}

impl GeometryInstance {
    pub fn material_for(&self, symbol: &str) -> Option<ElementId> {
        self.materials
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, m)| *m)
    }
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub id: Option<String>,
    pub sid: Option<String>,
    pub element: Option<ElementId>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub transforms: Vec<TransformTarget>,
    pub instances: Vec<GeometryInstance>,
    /// `type="JOINT"` in the document
    pub joint: bool,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            sid: None,
            element: None,
            parent: None,
            children: Vec::new(),
            transforms: Vec::new(),
            instances: Vec::new(),
            joint: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    roots: Vec<NodeId>,
    node_by_element: HashMap<ElementId, NodeId>,
    transform_by_element: HashMap<ElementId, (NodeId, usize)>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten the instanced visual scene of a resolved document
    ///
    /// Uses `<scene>/<instance_visual_scene>` when it resolves, otherwise the
    /// first `<visual_scene>`. A document without a visual scene yields an
    /// empty graph.
    pub fn from_document(doc: &Document) -> Self {
        let mut graph = Self::new();

        let instanced = doc
            .scene
            .and_then(|link| doc.link_target(link))
            .filter(|&id| doc.visual_scene(id).is_some());
        let Some(scene_id) = instanced.or_else(|| doc.visual_scenes.first().copied()) else {
            tracing::error!("Document has no visual scene");
            return graph;
        };

        if let Some(scene) = doc.visual_scene(scene_id) {
            for &node in &scene.nodes {
                graph.add_document_node(doc, node, None);
            }
        }

        tracing::debug!(
            "Flattened visual scene '{}' into {} nodes",
            doc.element(scene_id).label(),
            graph.nodes.len()
        );
        graph
    }

    fn add_document_node(&mut self, doc: &Document, element_id: ElementId, parent: Option<NodeId>) {
        let Some(node) = doc.node(element_id) else {
            return;
        };
        let element = doc.element(element_id);

        let mut scene_node = SceneNode::new(element.label());
        scene_node.id = element.id.clone();
        scene_node.sid = element.sid.clone();
        scene_node.element = Some(element_id);
        scene_node.joint = node.joint;

        let mut transform_elements = Vec::with_capacity(node.transforms.len());
        for &transform_id in &node.transforms {
            if let Some(transform) = doc.transform(transform_id) {
                let sid = doc.element(transform_id).sid.clone();
                scene_node
                    .transforms
                    .push(TransformTarget::from_element(sid, transform));
                transform_elements.push(transform_id);
            }
        }

        for instance in &node.instance_geometries {
            match doc.link_target(instance.geometry) {
                Some(geometry) => scene_node.instances.push(GeometryInstance {
                    kind: InstanceKind::Static { geometry },
                    materials: resolve_materials(doc, &instance.materials),
                }),
                None => tracing::warn!(
                    "Node '{}': instance_geometry '{}' is unresolved, skipping",
                    scene_node.name,
                    doc.link(instance.geometry).describe()
                ),
            }
        }

        for instance in &node.instance_controllers {
            let Some(controller) = doc.link_target(instance.controller) else {
                tracing::warn!(
                    "Node '{}': instance_controller '{}' is unresolved, skipping",
                    scene_node.name,
                    doc.link(instance.controller).describe()
                );
                continue;
            };
            let skeletons = instance
                .skeletons
                .iter()
                .filter_map(|&link| {
                    let target = doc.link_target(link);
                    if target.is_none() {
                        tracing::warn!(
                            "Node '{}': skeleton root '{}' is unresolved",
                            scene_node.name,
                            doc.link(link).describe()
                        );
                    }
                    target
                })
                .collect();
            scene_node.instances.push(GeometryInstance {
                kind: InstanceKind::Skinned {
                    controller,
                    skeletons,
                },
                materials: resolve_materials(doc, &instance.materials),
            });
        }

        let node_id = self.add_node(parent, scene_node);
        self.node_by_element.insert(element_id, node_id);
        for (index, transform_id) in transform_elements.into_iter().enumerate() {
            self.transform_by_element
                .insert(transform_id, (node_id, index));
        }

        for &child in &node.nodes {
            self.add_document_node(doc, child, Some(node_id));
        }
    }

    /// Append a node below `parent` (or as a root)
    pub fn add_node(&mut self, parent: Option<NodeId>, mut node: SceneNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        node.parent = parent;
        self.nodes.push(node);
        match parent {
            Some(parent) => self.nodes[parent.0 as usize].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn node(&self, id: NodeId) -> &SceneNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut SceneNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Converter node created for a document `<node>`
    pub fn node_for_element(&self, element: ElementId) -> Option<NodeId> {
        self.node_by_element.get(&element).copied()
    }

    /// Owning node and list position of a document transform element
    pub fn transform_for_element(&self, element: ElementId) -> Option<(NodeId, usize)> {
        self.transform_by_element.get(&element).copied()
    }

    pub fn transform_mut(&mut self, node: NodeId, index: usize) -> Option<&mut TransformTarget> {
        self.nodes[node.0 as usize].transforms.get_mut(index)
    }

    /// Identity composed with every transform in list order
    pub fn local_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        for transform in &self.node(id).transforms {
            transform.apply_transformation(&mut matrix);
        }
        matrix
    }

    /// `parent.world × local`, recomputed on every call
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let local = self.local_matrix(id);
        match self.parent(id) {
            Some(parent) => self.world_matrix(parent) * local,
            None => local,
        }
    }

    /// Local matrix decomposed into (translation, rotation, scale)
    pub fn local_trs(&self, id: NodeId) -> (Vec3, Quat, Vec3) {
        let (scale, rotation, translation) = self.local_matrix(id).to_scale_rotation_translation();
        (translation, rotation, scale)
    }

    /// Whether a transform of the node is animated by `animation`
    ///
    /// `animation == None` matches any animation. With `recursive`, ancestors
    /// are checked as well.
    pub fn is_animated_by(&self, id: NodeId, animation: Option<ElementId>, recursive: bool) -> bool {
        let node = self.node(id);
        if node.transforms.iter().any(|t| t.is_animated_by(animation)) {
            return true;
        }
        match (recursive, node.parent) {
            (true, Some(parent)) => self.is_animated_by(parent, animation, true),
            _ => false,
        }
    }

    /// Restore the rest pose of every transform
    pub fn reset_animation(&mut self) {
        for node in &mut self.nodes {
            for transform in &mut node.transforms {
                transform.reset_animation();
            }
        }
    }
}

fn resolve_materials(doc: &Document, materials: &[InstanceMaterial]) -> Vec<(String, ElementId)> {
    materials
        .iter()
        .filter_map(|m| match doc.link_target(m.target) {
            Some(target) => Some((m.symbol.clone(), target)),
            None => {
                tracing::warn!(
                    "Material binding '{}' -> '{}' is unresolved",
                    m.symbol,
                    doc.link(m.target).describe()
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TransformKind;

    fn node_with(name: &str, transforms: Vec<TransformTarget>) -> SceneNode {
        let mut node = SceneNode::new(name);
        node.transforms = transforms;
        node
    }

    #[test]
    fn test_world_matrix_composes_parents() {
        let mut graph = SceneGraph::new();
        let root = graph.add_node(
            None,
            node_with(
                "root",
                vec![TransformTarget::new(None, TransformKind::Translate, &[1.0, 0.0, 0.0])],
            ),
        );
        let child = graph.add_node(
            Some(root),
            node_with(
                "child",
                vec![
                    TransformTarget::new(None, TransformKind::Rotate, &[0.0, 0.0, 1.0, 90.0]),
                    TransformTarget::new(None, TransformKind::Translate, &[1.0, 0.0, 0.0]),
                ],
            ),
        );

        let p = graph.world_matrix(child).transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-5));
        assert_eq!(graph.roots(), &[root]);
        assert_eq!(graph.node(root).children, vec![child]);
    }

    #[test]
    fn test_local_trs_decomposition() {
        let mut graph = SceneGraph::new();
        let id = graph.add_node(
            None,
            node_with(
                "n",
                vec![
                    TransformTarget::new(None, TransformKind::Translate, &[1.0, 2.0, 3.0]),
                    TransformTarget::new(None, TransformKind::Scale, &[2.0, 2.0, 2.0]),
                ],
            ),
        );
        let (t, r, s) = graph.local_trs(id);
        assert!(t.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
        assert!(r.abs_diff_eq(Quat::IDENTITY, 1e-6));
        assert!(s.abs_diff_eq(Vec3::splat(2.0), 1e-6));
    }

    #[test]
    fn test_is_animated_by_recursive() {
        let mut graph = SceneGraph::new();
        let mut animated = TransformTarget::new(None, TransformKind::Translate, &[0.0; 3]);
        animated.register_animation(ElementId(1));
        let root = graph.add_node(None, node_with("root", vec![animated]));
        let child = graph.add_node(Some(root), node_with("child", Vec::new()));

        assert!(graph.is_animated_by(root, None, false));
        assert!(!graph.is_animated_by(child, None, false));
        assert!(graph.is_animated_by(child, None, true));
        assert!(graph.is_animated_by(child, Some(ElementId(1)), true));
        assert!(!graph.is_animated_by(child, Some(ElementId(2)), true));
    }
}
