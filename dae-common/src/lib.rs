//! Shared container format for converted COLLADA scenes
//!
//! This crate provides the pieces shared between:
//! - `nether-dae` (converter, writes containers)
//! - runtime loaders (read containers)
//!
//! # Modules
//!
//! - [`packer`] - Contiguous chunk packing with recorded byte offsets
//! - [`formats`] - Container header and file layout

pub mod formats;
pub mod packer;

pub use formats::{
    CONTAINER_MAGIC, CONTAINER_VERSION, ContainerHeader, read_container, write_container,
};
pub use packer::{ChunkElement, ChunkInfo, ChunkPacker, ChunkType};
