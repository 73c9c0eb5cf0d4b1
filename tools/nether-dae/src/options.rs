//! Conversion options
//!
//! Options can be loaded from a TOML file; every field has a default so a
//! file only needs to list what it changes.
//!
//! ```toml
//! animation_fps = 30.0
//! geometry_merge = "scene"
//!
//! [[animation_labels]]
//! name = "walk"
//! begin = 0
//! end = 24
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// How geometry chunks are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum GeometryMerge {
    /// Every chunk is kept as-is
    None,
    /// Chunks of one node are merged per material
    #[default]
    PerNode,
    /// All chunks of the scene are merged per material
    Scene,
}

/// Named keyframe-index window used to split one animation into clips
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimeLabel {
    pub name: String,
    /// First keyframe index (inclusive)
    pub begin: usize,
    /// Last keyframe index (inclusive)
    pub end: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Resample skeletal animations into dense tracks
    pub enable_resampling: bool,
    /// Resample all animations as one clip instead of one clip per `<animation>`
    pub merge_animations: bool,
    pub geometry_merge: GeometryMerge,
    /// Resample rate; derived from the source keyframes when unset
    pub animation_fps: Option<f32>,
    /// Split animations into one clip per label
    pub animation_labels: Vec<TimeLabel>,
    /// Drop tracks that never leave the rest pose
    pub remove_constant_tracks: bool,
    /// Bake the skin bind-shape matrix into vertex data
    pub apply_bind_shape: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            enable_resampling: true,
            merge_animations: true,
            geometry_merge: GeometryMerge::PerNode,
            animation_fps: None,
            animation_labels: Vec::new(),
            remove_constant_tracks: true,
            apply_bind_shape: false,
        }
    }
}

impl ConvertOptions {
    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read options: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse options from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse conversion options")
    }
}
