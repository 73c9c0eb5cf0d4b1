//! nether-dae library
//!
//! Converts COLLADA (`.dae`) documents into flattened, GPU-ready scene data:
//! reindexed triangle chunks, a merged skeleton, and resampled skeletal
//! animation tracks, packed into a `dae-common` container.
//!
//! The pipeline is
//! [`loader`] → [`resolver`] → [`scene`] → [`animation`] → [`skeleton`] →
//! [`geometry`] → [`converter`] → [`export`].

pub mod animation;
pub mod converter;
pub mod document;
pub mod error;
pub mod export;
pub mod geometry;
pub mod link;
pub mod loader;
pub mod options;
pub mod resolver;
pub mod scene;
pub mod skeleton;
pub mod transform;

use std::path::Path;

use anyhow::Context;

pub use converter::{ConvertedDocument, ConvertedMaterial, ConvertedNode, convert};
pub use error::{DaeError, Result};
pub use export::{ExportIndex, pack, read_container_file, write_container_file, write_split_files};
pub use loader::{load_file, load_str};
pub use options::{ConvertOptions, GeometryMerge, TimeLabel};

/// Load and convert a `.dae` file
pub fn convert_file(input: &Path, options: &ConvertOptions) -> anyhow::Result<ConvertedDocument> {
    let doc = load_file(input).with_context(|| format!("Failed to load COLLADA: {:?}", input))?;
    let converted =
        convert(&doc, options).with_context(|| format!("Failed to convert {:?}", input))?;
    Ok(converted)
}
