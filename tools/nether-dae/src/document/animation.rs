//! Animation elements

use super::{ElementId, Input, LinkId};

/// `<animation>`
#[derive(Debug, Clone, Default)]
pub struct AnimationElement {
    /// Nested `<animation>` elements
    pub animations: Vec<ElementId>,
    pub channels: Vec<ElementId>,
}

/// `<sampler>`
#[derive(Debug, Clone, Default)]
pub struct Sampler {
    pub inputs: Vec<Input>,
}

impl Sampler {
    pub fn input(&self, semantic: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.semantic == semantic)
    }
}

/// `<channel source="#sampler" target="node/sid.member">`
#[derive(Debug, Clone)]
pub struct Channel {
    pub source: LinkId,
    pub target: LinkId,
}
