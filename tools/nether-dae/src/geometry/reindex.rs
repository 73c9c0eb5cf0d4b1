//! Index stream consolidation
//!
//! COLLADA primitives interleave one index per input in their `<p>` stream,
//! so positions, normals and texcoords can each be indexed separately. The
//! GPU wants one index per vertex. Compaction assigns the shared indices and
//! [`re_index`] gathers each attribute into the new vertex order.

use hashbrown::HashMap;
use smallvec::SmallVec;

/// Placement of one stream inside an interleaved buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLayout {
    /// Indices per corner
    pub stride: usize,
    /// Position of this stream inside a corner
    pub offset: usize,
    /// Floats per vertex in the data array
    pub dim: usize,
}

impl StreamLayout {
    pub const fn new(stride: usize, offset: usize, dim: usize) -> Self {
        Self {
            stride,
            offset,
            dim,
        }
    }
}

/// Number of corners addressed by an interleaved index stream
fn corner_count(len: usize, stride: usize, offset: usize) -> usize {
    if stride == 0 || offset >= len {
        0
    } else {
        (len - offset).div_ceil(stride)
    }
}

fn corners(indices: &[u32], stride: usize, offset: usize) -> impl Iterator<Item = u32> + '_ {
    let count = corner_count(indices.len(), stride, offset);
    (0..count).map(move |k| indices[offset + k * stride])
}

/// Scatter-gather attribute data from one index stream into another
///
/// Walks both streams in parallel and copies `min(src.dim, dest.dim)` floats
/// for every corner. Writes outside either data array are skipped.
pub fn re_index(
    src_data: &[f32],
    src_indices: &[u32],
    src: StreamLayout,
    dest_data: &mut [f32],
    dest_indices: &[u32],
    dest: StreamLayout,
) {
    let dim = src.dim.min(dest.dim);
    let mut out_of_range = 0usize;

    for (si, di) in corners(src_indices, src.stride, src.offset)
        .zip(corners(dest_indices, dest.stride, dest.offset))
    {
        let s = si as usize * src.dim;
        let d = di as usize * dest.dim;
        match (src_data.get(s..s + dim), dest_data.get_mut(d..d + dim)) {
            (Some(from), Some(to)) => to.copy_from_slice(from),
            _ => out_of_range += 1,
        }
    }

    if out_of_range > 0 {
        tracing::error!("{} indices point outside their source data", out_of_range);
    }
}

/// Dense first-occurrence renumbering of one index stream
///
/// The first distinct raw value becomes 0, the next new one 1, and so on;
/// repeats reuse the number of their first occurrence.
pub fn compact_indices(indices: &[u32], stride: usize, offset: usize) -> Vec<u32> {
    let mut numbering: HashMap<u32, u32> = HashMap::new();
    corners(indices, stride, offset)
        .map(|raw| {
            let next = numbering.len() as u32;
            *numbering.entry(raw).or_insert(next)
        })
        .collect()
}

/// First-occurrence renumbering of index tuples
///
/// Used when a primitive's inputs sit on different offsets: a vertex is the
/// combination of all its attribute indices.
pub fn compact_index_tuples(indices: &[u32], stride: usize, offsets: &[usize]) -> Vec<u32> {
    let count = offsets
        .iter()
        .map(|&offset| corner_count(indices.len(), stride, offset))
        .min()
        .unwrap_or(0);

    let mut numbering: HashMap<SmallVec<[u32; 4]>, u32> = HashMap::new();
    (0..count)
        .map(|k| {
            let key: SmallVec<[u32; 4]> = offsets
                .iter()
                .map(|&offset| indices[k * stride + offset])
                .collect();
            let next = numbering.len() as u32;
            *numbering.entry(key).or_insert(next)
        })
        .collect()
}

/// Vertex count implied by a compacted index buffer
pub fn vertex_count(compacted: &[u32]) -> usize {
    compacted.iter().max().map(|&m| m as usize + 1).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_first_occurrence() {
        assert_eq!(compact_indices(&[5, 5, 7, 5], 1, 0), vec![0, 0, 1, 0]);
        assert_eq!(compact_indices(&[9, 3, 9, 1, 3], 1, 0), vec![0, 1, 0, 2, 1]);
    }

    #[test]
    fn test_compact_interleaved_stream() {
        // (position, normal) pairs; compact the normal stream only
        let indices = [0, 4, 1, 4, 2, 6, 3, 4];
        assert_eq!(compact_indices(&indices, 2, 1), vec![0, 0, 1, 0]);
        assert_eq!(compact_indices(&indices, 2, 0), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_compact_empty() {
        assert!(compact_indices(&[], 1, 0).is_empty());
        assert!(compact_indices(&[1, 2], 2, 5).is_empty());
        assert_eq!(vertex_count(&[]), 0);
    }

    #[test]
    fn test_compact_tuples_splits_shared_positions() {
        // Position 1 is used with two different normals
        let indices = [0, 0, 1, 0, 2, 0, 2, 1, 1, 1, 3, 1];
        let compacted = compact_index_tuples(&indices, 2, &[0, 1]);
        assert_eq!(compacted, vec![0, 1, 2, 3, 4, 5]);

        let repeated = [0, 0, 1, 1, 0, 0];
        assert_eq!(compact_index_tuples(&repeated, 2, &[0, 1]), vec![0, 1, 0]);
    }

    #[test]
    fn test_re_index_truncates_dimension() {
        let src = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut dest = vec![0.0; 4];
        re_index(
            &src,
            &[1, 0],
            StreamLayout::new(1, 0, 3),
            &mut dest,
            &[0, 1],
            StreamLayout::new(1, 0, 2),
        );
        assert_eq!(dest, vec![4.0, 5.0, 1.0, 2.0]);
    }

    #[test]
    fn test_re_index_skips_out_of_range() {
        let src = [1.0, 2.0];
        let mut dest = vec![0.0; 2];
        re_index(
            &src,
            &[0, 7],
            StreamLayout::new(1, 0, 1),
            &mut dest,
            &[0, 1],
            StreamLayout::new(1, 0, 1),
        );
        assert_eq!(dest, vec![1.0, 0.0]);
    }

    #[test]
    fn test_reindex_round_trip() {
        // Distinct position and normal streams over a quad
        let positions = [
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            1.0, 1.0, 0.0, //
            0.0, 1.0, 0.0,
        ];
        let normals = [0.0, 0.0, 1.0, 0.0, 0.0, -1.0];
        let p = [0, 0, 1, 0, 2, 0, 2, 1, 3, 1, 0, 1];
        let stride = 2;

        let compacted = compact_index_tuples(&p, stride, &[0, 1]);
        let count = vertex_count(&compacted);
        assert_eq!(compacted.len(), p.len() / stride);
        assert_eq!(*compacted.iter().max().unwrap() as usize, count - 1);

        let mut out_positions = vec![0.0; count * 3];
        let mut out_normals = vec![0.0; count * 3];
        let dest = StreamLayout::new(1, 0, 3);
        re_index(
            &positions,
            &p,
            StreamLayout::new(stride, 0, 3),
            &mut out_positions,
            &compacted,
            dest,
        );
        re_index(
            &normals,
            &p,
            StreamLayout::new(stride, 1, 3),
            &mut out_normals,
            &compacted,
            dest,
        );

        // Vertex 3 is position 2 with the second normal
        assert_eq!(&out_positions[9..12], &[1.0, 1.0, 0.0]);
        assert_eq!(&out_normals[9..12], &[0.0, 0.0, -1.0]);
        // Recompacting the shared buffer is stable
        assert_eq!(compact_indices(&compacted, 1, 0), compacted);
    }
}
