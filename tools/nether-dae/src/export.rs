//! Packed export of converted scenes
//!
//! Every buffer of a [`ConvertedDocument`] is packed into one binary blob with
//! [`ChunkPacker`]; the JSON index describes nodes, materials, geometries,
//! bones and animations and points into the blob through [`ChunkInfo`]s.
//! Matrices are written column-major.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use dae_common::{ChunkInfo, ChunkPacker, read_container, write_container};
use serde::{Deserialize, Serialize};

use crate::converter::ConvertedDocument;
use crate::geometry::GeometryChunk;

/// Largest vertex count addressable with `u16` indices
const MAX_U16_VERTICES: usize = u16::MAX as usize;
/// Largest bone count addressable with `u8` bone indices
const MAX_U8_BONES: usize = u8::MAX as usize + 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub name: String,
    pub parent: Option<usize>,
    pub translation: [f32; 3],
    /// Quaternion xyzw
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    pub geometries: Vec<usize>,
    pub bone: Option<usize>,
    pub animated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialEntry {
    pub name: String,
    pub diffuse: [f32; 4],
    pub texture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryEntry {
    pub name: String,
    pub material: Option<usize>,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub positions: ChunkInfo,
    pub normals: Option<ChunkInfo>,
    pub texcoords: Option<ChunkInfo>,
    pub bone_indices: Option<ChunkInfo>,
    pub bone_weights: Option<ChunkInfo>,
    pub indices: ChunkInfo,
    pub bind_shape_matrix: Option<[f32; 16]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneEntry {
    pub name: String,
    /// -1 for roots
    pub parent: i32,
    pub inv_bind_matrix: [f32; 16],
    pub rest_translation: [f32; 3],
    pub rest_rotation: [f32; 4],
    pub rest_scale: [f32; 3],
    pub attached_to_skin: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEntry {
    pub bone: usize,
    pub pos: Option<ChunkInfo>,
    pub rot: Option<ChunkInfo>,
    pub scl: Option<ChunkInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationEntry {
    pub name: String,
    pub fps: f32,
    pub keyframe_count: usize,
    pub duration: f32,
    /// Bones whose tracks were all elided are left out
    pub tracks: Vec<TrackEntry>,
}

/// JSON half of an export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportIndex {
    pub nodes: Vec<NodeEntry>,
    pub materials: Vec<MaterialEntry>,
    pub geometries: Vec<GeometryEntry>,
    pub bones: Vec<BoneEntry>,
    pub animations: Vec<AnimationEntry>,
    /// Every packed chunk in blob order
    pub chunks: Vec<ChunkInfo>,
}

/// Pack a converted scene into its JSON index and binary blob
pub fn pack(doc: &ConvertedDocument) -> (ExportIndex, Vec<u8>) {
    let mut packer = ChunkPacker::new();

    let nodes = doc
        .nodes
        .iter()
        .map(|node| NodeEntry {
            name: node.name.clone(),
            parent: node.parent,
            translation: node.translation.to_array(),
            rotation: node.rotation.to_array(),
            scale: node.scale.to_array(),
            geometries: node.geometries.clone(),
            bone: node.bone,
            animated: node.animated,
        })
        .collect();

    let materials = doc
        .materials
        .iter()
        .map(|m| MaterialEntry {
            name: m.name.clone(),
            diffuse: m.diffuse,
            texture: m.texture.clone(),
        })
        .collect();

    let bone_count = doc.skeleton.len();
    let geometries = doc
        .geometries
        .iter()
        .map(|chunk| pack_geometry(&mut packer, chunk, bone_count))
        .collect();

    let bones = doc
        .skeleton
        .bones
        .iter()
        .map(|bone| BoneEntry {
            name: bone.name.clone(),
            parent: bone.parent_index(),
            inv_bind_matrix: bone.inv_bind_mat.to_cols_array(),
            rest_translation: bone.rest_translation.to_array(),
            rest_rotation: bone.rest_rotation.to_array(),
            rest_scale: bone.rest_scale.to_array(),
            attached_to_skin: bone.attached_to_skin,
        })
        .collect();

    let animations = doc
        .animations
        .iter()
        .map(|animation| AnimationEntry {
            name: animation.name.clone(),
            fps: animation.fps,
            keyframe_count: animation.keyframe_count,
            duration: animation.duration,
            tracks: animation
                .tracks
                .iter()
                .enumerate()
                .filter(|(_, t)| t.pos.is_some() || t.rot.is_some() || t.scl.is_some())
                .map(|(bone, track)| TrackEntry {
                    bone,
                    pos: track.pos.as_ref().map(|v| packer.register_chunk(v, 3)),
                    rot: track.rot.as_ref().map(|v| packer.register_chunk(v, 4)),
                    scl: track.scl.as_ref().map(|v| packer.register_chunk(v, 3)),
                })
                .collect(),
        })
        .collect();

    let index = ExportIndex {
        nodes,
        materials,
        geometries,
        bones,
        animations,
        chunks: packer.chunks().to_vec(),
    };
    (index, packer.into_data())
}

fn pack_geometry(packer: &mut ChunkPacker, chunk: &GeometryChunk, bone_count: usize) -> GeometryEntry {
    let positions = packer.register_chunk(&chunk.positions, 3);
    let normals = chunk.normals.as_ref().map(|n| packer.register_chunk(n, 3));
    let texcoords = chunk.texcoords.as_ref().map(|t| packer.register_chunk(t, 2));

    let bone_indices = chunk.bone_indices.as_ref().map(|indices| {
        if bone_count <= MAX_U8_BONES {
            let narrow: Vec<u8> = indices.iter().map(|&i| i as u8).collect();
            packer.register_chunk(&narrow, 4)
        } else {
            let narrow: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
            packer.register_chunk(&narrow, 4)
        }
    });
    let bone_weights = chunk.bone_weights.as_ref().map(|w| packer.register_chunk(w, 4));

    let indices = if chunk.vertex_count <= MAX_U16_VERTICES {
        let narrow: Vec<u16> = chunk.indices.iter().map(|&i| i as u16).collect();
        packer.register_chunk(&narrow, 1)
    } else {
        packer.register_chunk(&chunk.indices, 1)
    };

    GeometryEntry {
        name: chunk.name.clone(),
        material: chunk.material,
        vertex_count: chunk.vertex_count,
        triangle_count: chunk.triangle_count,
        positions,
        normals,
        texcoords,
        bone_indices,
        bone_weights,
        indices,
        bind_shape_matrix: chunk.bind_shape_matrix.map(|m| m.to_cols_array()),
    }
}

/// Write a single container file (header, JSON index, blob)
pub fn write_container_file(doc: &ConvertedDocument, output: &Path) -> Result<()> {
    let (index, blob) = pack(doc);
    let json = serde_json::to_vec(&index).context("Failed to serialize export index")?;

    let file =
        File::create(output).with_context(|| format!("Failed to create output: {:?}", output))?;
    let mut writer = BufWriter::new(file);
    write_container(&mut writer, &json, &blob)?;
    writer
        .flush()
        .with_context(|| format!("Failed to write output: {:?}", output))?;

    tracing::info!(
        "Wrote {:?}: {} chunks, {} bytes of JSON, {} bytes of binary data",
        output,
        index.chunks.len(),
        json.len(),
        blob.len()
    );
    Ok(())
}

/// Write a `.json` index next to a `.bin` blob
pub fn write_split_files(doc: &ConvertedDocument, json_path: &Path, bin_path: &Path) -> Result<()> {
    let (index, blob) = pack(doc);
    let json = serde_json::to_vec_pretty(&index).context("Failed to serialize export index")?;

    std::fs::write(json_path, &json)
        .with_context(|| format!("Failed to write index: {:?}", json_path))?;
    std::fs::write(bin_path, &blob)
        .with_context(|| format!("Failed to write binary data: {:?}", bin_path))?;

    tracing::info!(
        "Wrote {:?} and {:?}: {} chunks, {} bytes of binary data",
        json_path,
        bin_path,
        index.chunks.len(),
        blob.len()
    );
    Ok(())
}

/// Read a container file back into its index and blob
pub fn read_container_file(path: &Path) -> Result<(ExportIndex, Vec<u8>)> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let (_, json, blob) = read_container(&bytes)
        .with_context(|| format!("{:?} is not a valid container", path))?;
    let index: ExportIndex =
        serde_json::from_slice(json).with_context(|| format!("Invalid index in {:?}", path))?;
    Ok((index, blob.to_vec()))
}
