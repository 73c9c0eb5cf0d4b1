//! Material and effect elements
//!
//! Only the parts needed to find a material's diffuse colour or diffuse
//! texture are kept.

use super::LinkId;

/// `<material>`
#[derive(Debug, Clone, Default)]
pub struct Material {
    /// `<instance_effect url="#..">`
    pub effect: Option<LinkId>,
}

/// Diffuse channel of an effect technique
#[derive(Debug, Clone)]
pub enum EffectColor {
    Color([f32; 4]),
    /// `<texture texture="sampler-sid">`, an FX link to a `<newparam>`
    Texture(LinkId),
}

/// `<effect>`
#[derive(Debug, Clone, Default)]
pub struct Effect {
    pub diffuse: Option<EffectColor>,
}

/// Typed `<newparam>` value
#[derive(Debug, Clone)]
pub enum ParamValue {
    /// `<surface><init_from>image-id</init_from></surface>`
    Surface { image: Option<LinkId> },
    /// `<sampler2D>` with a COLLADA 1.4 `<source>` (FX link to a surface) or a
    /// COLLADA 1.5 `<instance_image url>` (global link)
    Sampler2D {
        surface: Option<LinkId>,
        image: Option<LinkId>,
    },
    Other,
}

/// `<newparam sid="..">`
#[derive(Debug, Clone)]
pub struct NewParam {
    pub value: ParamValue,
}

/// `<image>`
#[derive(Debug, Clone, Default)]
pub struct Image {
    /// `<init_from>` file reference
    pub init_from: Option<String>,
}
