//! Controller elements (`<skin>`)

use super::{Input, LinkId};

/// `<vertex_weights>`
#[derive(Debug, Clone, Default)]
pub struct VertexWeights {
    pub count: usize,
    pub inputs: Vec<Input>,
    pub vcount: Vec<u32>,
    /// Interleaved (joint, weight) index pairs; joint `-1` is the bind shape
    pub v: Vec<i32>,
}

/// `<skin source="#..">`
#[derive(Debug, Clone)]
pub struct Skin {
    /// Skinned geometry
    pub source: LinkId,
    /// Row-major bind shape matrix, if present
    pub bind_shape_matrix: Option<[f32; 16]>,
    /// `<joints>` inputs (JOINT, INV_BIND_MATRIX)
    pub joints: Vec<Input>,
    pub weights: VertexWeights,
}

/// `<controller>`
#[derive(Debug, Clone, Default)]
pub struct Controller {
    /// `None` for unsupported controllers (`<morph>`)
    pub skin: Option<Skin>,
}
