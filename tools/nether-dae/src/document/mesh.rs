//! Geometry elements: meshes, sources and primitive index streams

use super::{ElementId, LinkId};

/// `<source>` data array
#[derive(Debug, Clone, Default)]
pub enum SourceData {
    #[default]
    Empty,
    Float(Vec<f32>),
    /// `Name_array` (sids)
    Name(Vec<String>),
    /// `IDREF_array` (global ids)
    IdRef(Vec<String>),
}

/// `<source>` with its `<technique_common>/<accessor>`
#[derive(Debug, Clone, Default)]
pub struct Source {
    pub data: SourceData,
    /// Accessor stride (values per item)
    pub stride: usize,
    /// Accessor count (items)
    pub count: usize,
    /// Accessor offset into the data array
    pub offset: usize,
}

impl Source {
    /// Float data, empty for non-float sources
    pub fn floats(&self) -> &[f32] {
        match &self.data {
            SourceData::Float(values) => &values[self.offset.min(values.len())..],
            _ => &[],
        }
    }

    /// String data (`Name_array` or `IDREF_array`), empty otherwise
    pub fn strings(&self) -> &[String] {
        match &self.data {
            SourceData::Name(values) | SourceData::IdRef(values) => {
                &values[self.offset.min(values.len())..]
            }
            _ => &[],
        }
    }

    pub fn is_id_ref(&self) -> bool {
        matches!(self.data, SourceData::IdRef(_))
    }
}

/// `<input semantic=".." source="#.." offset=".." set="..">`
#[derive(Debug, Clone)]
pub struct Input {
    pub semantic: String,
    pub source: LinkId,
    /// Offset inside the primitive's interleaved index stream
    pub offset: usize,
    pub set: usize,
}

/// `<vertices>`
#[derive(Debug, Clone, Default)]
pub struct Vertices {
    pub inputs: Vec<Input>,
}

/// `<triangles>` (or an all-triangle `<polylist>`)
#[derive(Debug, Clone, Default)]
pub struct Triangles {
    /// Material symbol bound through `<instance_material>`
    pub material: Option<String>,
    pub count: usize,
    pub inputs: Vec<Input>,
    /// Interleaved index stream (`<p>`)
    pub indices: Vec<u32>,
}

impl Triangles {
    /// Number of indices per triangle corner
    pub fn index_stride(&self) -> usize {
        self.inputs.iter().map(|i| i.offset + 1).max().unwrap_or(1)
    }
}

/// `<mesh>`
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Option<ElementId>,
    pub triangles: Vec<Triangles>,
}

/// `<geometry>`
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    pub mesh: Option<Mesh>,
}
