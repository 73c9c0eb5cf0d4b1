//! Fixed-rate resampling of skeletal animation
//!
//! Channels are applied to the live transform buffers at every keyframe of a
//! regular grid, each bone's local pose is read back, and the scene is reset
//! to its rest pose afterwards. Tracks that never leave the rest pose are
//! dropped.

use serde::Serialize;

use super::AnimationClip;
use crate::options::TimeLabel;
use crate::scene::SceneGraph;
use crate::skeleton::Bone;

/// Maximum deviation from the rest pose for a track to count as constant
pub const ELISION_TOLERANCE: f32 = 1e-4;

/// Upper bound on keyframe intervals of one resampled clip
const MAX_KEYFRAME_INTERVALS: u32 = 1 << 20;

/// Keyframe index window applied to every channel (both ends inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyWindow {
    pub begin: usize,
    pub end: usize,
}

impl KeyWindow {
    pub const ALL: Self = Self {
        begin: 0,
        end: usize::MAX,
    };

    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    /// Key times of `times` inside the window
    fn slice<'a>(&self, times: &'a [f32]) -> &'a [f32] {
        if times.is_empty() || self.begin >= times.len() || self.begin > self.end {
            return &[];
        }
        &times[self.begin..=self.end.min(times.len() - 1)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStatistics {
    pub min_time: f32,
    pub max_time: f32,
    /// Unweighted mean of the per-channel key rates
    pub avg_fps: f32,
}

impl TimeStatistics {
    pub fn duration(&self) -> f32 {
        self.max_time - self.min_time
    }
}

/// Time range and key rate of a clip's channels inside `window`
///
/// Returns `None` when no channel has a key inside the window.
pub fn time_statistics(clip: &AnimationClip, window: KeyWindow) -> Option<TimeStatistics> {
    let mut min_time = f32::INFINITY;
    let mut max_time = f32::NEG_INFINITY;
    let mut fps_sum = 0.0f32;
    let mut fps_count = 0usize;

    for channel in &clip.channels {
        let keys = window.slice(&channel.times);
        let (Some(&first), Some(&last)) = (keys.first(), keys.last()) else {
            continue;
        };
        min_time = min_time.min(first);
        max_time = max_time.max(last);
        if last > first {
            fps_sum += keys.len() as f32 / (last - first);
            fps_count += 1;
        }
    }

    if min_time > max_time {
        return None;
    }
    Some(TimeStatistics {
        min_time,
        max_time,
        avg_fps: if fps_count > 0 {
            fps_sum / fps_count as f32
        } else {
            0.0
        },
    })
}

/// Dense keyframes of one bone; `None` components were elided
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoneTrack {
    /// xyz per keyframe
    pub pos: Option<Vec<f32>>,
    /// Quaternion xyzw per keyframe
    pub rot: Option<Vec<f32>>,
    /// xyz per keyframe
    pub scl: Option<Vec<f32>>,
}

/// One resampled clip
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationData {
    pub name: String,
    pub fps: f32,
    pub keyframe_count: usize,
    pub duration: f32,
    /// Indexed like the bone list
    pub tracks: Vec<BoneTrack>,
}

/// Resampling settings shared by every clip of a conversion
#[derive(Debug, Clone, Copy)]
pub struct Resampler<'a> {
    pub bones: &'a [Bone],
    /// Explicit rate; the clip's average key rate when `None`
    pub fps: Option<f32>,
    pub remove_constant_tracks: bool,
}

impl Resampler<'_> {
    /// Resample `clip` inside `window` into a clip called `name`
    ///
    /// Returns `None` (after a warning) when the rate or the duration is not
    /// positive. The scene is back in its rest pose when this returns.
    pub fn create(
        &self,
        graph: &mut SceneGraph,
        clip: &AnimationClip,
        window: KeyWindow,
        name: &str,
    ) -> Option<AnimationData> {
        let Some(stats) = time_statistics(clip, window) else {
            tracing::warn!("Animation '{}' has no keys, skipping", name);
            return None;
        };
        let fps = self.fps.unwrap_or(stats.avg_fps);
        let duration = stats.duration();
        if !(fps > 0.0 && fps.is_finite()) {
            tracing::warn!("Animation '{}': frame rate {} is not positive and finite, skipping", name, fps);
            return None;
        }
        if !(duration > 0.0 && duration.is_finite()) {
            tracing::warn!("Animation '{}': duration {} is not positive, skipping", name, duration);
            return None;
        }
        let intervals = (fps * duration).ceil();
        if !(intervals <= MAX_KEYFRAME_INTERVALS as f32) {
            tracing::warn!(
                "Animation '{}': {} fps over {:.2}s needs too many keyframes, skipping",
                name,
                fps,
                duration
            );
            return None;
        }

        let keyframe_count = intervals as usize + 1;
        let fps = (keyframe_count - 1) as f32 / duration;

        let mut tracks: Vec<(Vec<f32>, Vec<f32>, Vec<f32>)> = self
            .bones
            .iter()
            .map(|_| {
                (
                    Vec::with_capacity(keyframe_count * 3),
                    Vec::with_capacity(keyframe_count * 4),
                    Vec::with_capacity(keyframe_count * 3),
                )
            })
            .collect();
        let mut clamp_warned = vec![false; clip.channels.len()];

        for frame in 0..keyframe_count {
            let t = if frame + 1 == keyframe_count {
                stats.max_time
            } else {
                stats.min_time + frame as f32 / fps
            };

            for (channel, warned) in clip.channels.iter().zip(clamp_warned.iter_mut()) {
                if channel.apply(graph, t) && !*warned {
                    tracing::warn!(
                        "Animation '{}': channel '{}' has no key at {:.3}s, holding its end value",
                        name,
                        channel.name,
                        t
                    );
                    *warned = true;
                }
            }

            for (bone, (pos, rot, scl)) in self.bones.iter().zip(tracks.iter_mut()) {
                let (translation, rotation, scale) = graph.local_trs(bone.node);
                // Keep the quaternion in the rest pose hemisphere
                let rotation = if rotation.dot(bone.rest_rotation) < 0.0 {
                    -rotation
                } else {
                    rotation
                };
                pos.extend_from_slice(&translation.to_array());
                rot.extend_from_slice(&rotation.to_array());
                scl.extend_from_slice(&scale.to_array());
            }
        }

        graph.reset_animation();

        let tracks = self
            .bones
            .iter()
            .zip(tracks)
            .map(|(bone, (pos, rot, scl))| {
                if self.remove_constant_tracks {
                    BoneTrack {
                        pos: elide(pos, &bone.rest_translation.to_array()),
                        rot: elide(rot, &bone.rest_rotation.to_array()),
                        scl: elide(scl, &bone.rest_scale.to_array()),
                    }
                } else {
                    BoneTrack {
                        pos: Some(pos),
                        rot: Some(rot),
                        scl: Some(scl),
                    }
                }
            })
            .collect();

        tracing::info!(
            "Resampled animation '{}': {} keyframes at {:.2} fps ({:.2}s)",
            name,
            keyframe_count,
            fps,
            duration
        );

        Some(AnimationData {
            name: name.to_string(),
            fps,
            keyframe_count,
            duration,
            tracks,
        })
    }

    /// One clip per label, each named after its label
    pub fn create_labeled(
        &self,
        graph: &mut SceneGraph,
        clip: &AnimationClip,
        labels: &[TimeLabel],
    ) -> Vec<AnimationData> {
        labels
            .iter()
            .filter_map(|label| {
                self.create(graph, clip, KeyWindow::new(label.begin, label.end), &label.name)
            })
            .collect()
    }
}

/// `None` when every keyframe stays within tolerance of `rest`
fn elide(values: Vec<f32>, rest: &[f32]) -> Option<Vec<f32>> {
    let deviation = values
        .chunks_exact(rest.len())
        .flat_map(|frame| frame.iter().zip(rest).map(|(v, r)| (v - r).abs()))
        .fold(0.0f32, f32::max);
    (deviation >= ELISION_TOLERANCE).then_some(values)
}
