//! Visual scene elements: nodes, transforms and instances

use super::{ElementId, LinkId};

/// `<visual_scene>`
#[derive(Debug, Clone, Default)]
pub struct VisualScene {
    /// Root `<node>` elements
    pub nodes: Vec<ElementId>,
}

/// `<node>`
#[derive(Debug, Clone, Default)]
pub struct NodeElement {
    /// `type="JOINT"`
    pub joint: bool,
    /// Transform elements in document order
    pub transforms: Vec<ElementId>,
    /// Child `<node>` elements
    pub nodes: Vec<ElementId>,
    pub instance_geometries: Vec<InstanceGeometry>,
    pub instance_controllers: Vec<InstanceController>,
}

/// Transform primitive type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    Matrix,
    Rotate,
    Translate,
    Scale,
}

impl TransformKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "matrix" => Some(Self::Matrix),
            "rotate" => Some(Self::Rotate),
            "translate" => Some(Self::Translate),
            "scale" => Some(Self::Scale),
            _ => None,
        }
    }

    /// Number of floats in the element's data buffer
    pub fn value_count(self) -> usize {
        match self {
            Self::Matrix => 16,
            Self::Rotate => 4,
            Self::Translate | Self::Scale => 3,
        }
    }
}

/// `<matrix>`, `<rotate>`, `<translate>` or `<scale>`
#[derive(Debug, Clone)]
pub struct TransformElement {
    pub kind: TransformKind,
    pub values: Vec<f32>,
}

/// `<instance_material symbol=".." target="#..">`
#[derive(Debug, Clone)]
pub struct InstanceMaterial {
    pub symbol: String,
    pub target: LinkId,
}

/// `<instance_geometry url="#..">`
#[derive(Debug, Clone)]
pub struct InstanceGeometry {
    pub geometry: LinkId,
    pub materials: Vec<InstanceMaterial>,
}

/// `<instance_controller url="#..">`
#[derive(Debug, Clone)]
pub struct InstanceController {
    pub controller: LinkId,
    /// `<skeleton>` root node links, in document order
    pub skeletons: Vec<LinkId>,
    pub materials: Vec<InstanceMaterial>,
}
