//! Contiguous chunk packing
//!
//! Typed buffers are copied back to back into one binary blob. Every
//! registered chunk records its element type, byte offset, stride and element
//! count so the JSON index can describe the blob without any padding rules.

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

/// Element type of a packed chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Float32,
    Uint32,
    Uint16,
    Uint8,
}

impl ChunkType {
    /// Size of one element in bytes
    pub fn element_size(self) -> usize {
        match self {
            ChunkType::Float32 | ChunkType::Uint32 => 4,
            ChunkType::Uint16 => 2,
            ChunkType::Uint8 => 1,
        }
    }
}

/// Plain-old-data element types that can be packed
pub trait ChunkElement: Pod {
    const TYPE: ChunkType;
}

impl ChunkElement for f32 {
    const TYPE: ChunkType = ChunkType::Float32;
}

impl ChunkElement for u32 {
    const TYPE: ChunkType = ChunkType::Uint32;
}

impl ChunkElement for u16 {
    const TYPE: ChunkType = ChunkType::Uint16;
}

impl ChunkElement for u8 {
    const TYPE: ChunkType = ChunkType::Uint8;
}

/// JSON index entry for one packed chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,
    /// Byte offset from the start of the binary blob
    pub byte_offset: u32,
    /// Elements per item (3 for positions, 1 for indices, ...)
    pub stride: u32,
    /// Number of items (elements / stride)
    pub count: u32,
}

impl ChunkInfo {
    /// Size of the chunk in bytes
    pub fn byte_length(&self) -> usize {
        self.chunk_type.element_size() * self.stride as usize * self.count as usize
    }
}

/// Builder for the contiguous binary blob
#[derive(Debug, Default)]
pub struct ChunkPacker {
    data: Vec<u8>,
    chunks: Vec<ChunkInfo>,
}

impl ChunkPacker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `data` to the end of the blob and return its index entry
    ///
    /// Offsets increase monotonically with no gaps: each chunk starts exactly
    /// where the previous one ended.
    pub fn register_chunk<T: ChunkElement>(&mut self, data: &[T], stride: usize) -> ChunkInfo {
        let stride = stride.max(1);
        let info = ChunkInfo {
            chunk_type: T::TYPE,
            byte_offset: self.data.len() as u32,
            stride: stride as u32,
            count: (data.len() / stride) as u32,
        };
        self.data.extend_from_slice(bytemuck::cast_slice(data));
        self.chunks.push(info);
        info
    }

    /// Get the binary blob
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get all registered chunks in registration order
    pub fn chunks(&self) -> &[ChunkInfo] {
        &self.chunks
    }

    /// Consume the packer and return the blob
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
