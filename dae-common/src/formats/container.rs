//! Scene container format (.ndae)
//!
//! # Layout
//! ```text
//! 0x00: magic [u8; 4]   - "NDAE"
//! 0x04: version u16 LE
//! 0x06: flags u16 LE    - Reserved, must be 0
//! 0x08: json_len u32 LE - Length of the JSON index in bytes
//! 0x0C: bin_len u32 LE  - Length of the binary blob in bytes
//! 0x10: JSON index (json_len bytes, UTF-8)
//! ....: binary blob (bin_len bytes)
//! ```
//!
//! Chunk byte offsets stored in the JSON index are relative to the start of
//! the binary blob, not the start of the file.

use anyhow::{Result, bail};
use std::io::Write;

/// Magic bytes at the start of every container
pub const CONTAINER_MAGIC: [u8; 4] = *b"NDAE";

/// Current container version
pub const CONTAINER_VERSION: u16 = 1;

/// Container header (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ContainerHeader {
    pub version: u16,
    /// Reserved flags (must be 0)
    pub flags: u16,
    pub json_len: u32,
    pub bin_len: u32,
}

impl ContainerHeader {
    pub const SIZE: usize = 16;

    pub fn new(json_len: u32, bin_len: u32) -> Self {
        Self {
            version: CONTAINER_VERSION,
            flags: 0,
            json_len,
            bin_len,
        }
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&CONTAINER_MAGIC);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.flags.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.json_len.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.bin_len.to_le_bytes());
        bytes
    }

    /// Read header from bytes
    ///
    /// Returns `None` on short input or a magic mismatch.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE || bytes[0..4] != CONTAINER_MAGIC {
            return None;
        }
        Some(Self {
            version: u16::from_le_bytes([bytes[4], bytes[5]]),
            flags: u16::from_le_bytes([bytes[6], bytes[7]]),
            json_len: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            bin_len: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        })
    }

    /// Validate header
    pub fn validate(&self) -> bool {
        self.version == CONTAINER_VERSION && self.flags == 0
    }

    /// Calculate total file size (header + JSON + binary)
    pub fn file_size(&self) -> usize {
        Self::SIZE + self.json_len as usize + self.bin_len as usize
    }
}

/// Write a complete container file
pub fn write_container<W: Write>(w: &mut W, json: &[u8], bin: &[u8]) -> Result<()> {
    let (Ok(json_len), Ok(bin_len)) = (u32::try_from(json.len()), u32::try_from(bin.len())) else {
        bail!(
            "Container too large: {} bytes JSON, {} bytes binary",
            json.len(),
            bin.len()
        );
    };

    let header = ContainerHeader::new(json_len, bin_len);
    w.write_all(&header.to_bytes())?;
    w.write_all(json)?;
    w.write_all(bin)?;
    Ok(())
}

/// Split a container file into its header, JSON index and binary blob
pub fn read_container(bytes: &[u8]) -> Option<(ContainerHeader, &[u8], &[u8])> {
    let header = ContainerHeader::from_bytes(bytes)?;
    if !header.validate() || bytes.len() < header.file_size() {
        return None;
    }
    let json_end = ContainerHeader::SIZE + header.json_len as usize;
    let json = &bytes[ContainerHeader::SIZE..json_end];
    let bin = &bytes[json_end..json_end + header.bin_len as usize];
    Some((header, json, bin))
}
