//! Animation channels, curves and resampling
//!
//! Channels of the document are bound to converter transforms and grouped
//! into clips. A clip is either every channel of the document or one
//! top-level `<animation>` with everything nested below it.

mod channel;
mod curve;
mod resample;

pub use channel::{AnimationChannel, ChannelSample, ChannelTarget};
pub use curve::{Interpolation, Segment};
pub use resample::{
    AnimationData, BoneTrack, ELISION_TOLERANCE, KeyWindow, Resampler, TimeStatistics,
    time_statistics,
};

use crate::document::{Document, ElementId};
use crate::scene::SceneGraph;

/// Name of the clip holding every channel of a document
pub const MERGED_CLIP_NAME: &str = "default";

/// Channels resampled together
#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: String,
    /// Top-level `<animation>`, `None` for the merged clip
    pub element: Option<ElementId>,
    pub channels: Vec<AnimationChannel>,
}

/// Bind every channel of the document and group them into clips
///
/// Each channel registers its top-level `<animation>` on the transform it
/// drives, so the scene graph can answer `is_animated_by` afterwards.
pub fn collect_clips(doc: &Document, graph: &mut SceneGraph, merge: bool) -> Vec<AnimationClip> {
    let mut clips: Vec<AnimationClip> = Vec::with_capacity(doc.animations.len());

    for &animation in &doc.animations {
        let mut channels = Vec::new();
        collect_channels(doc, graph, animation, animation, &mut channels);
        clips.push(AnimationClip {
            name: doc.element(animation).label().to_string(),
            element: Some(animation),
            channels,
        });
    }

    let channel_count: usize = clips.iter().map(|c| c.channels.len()).sum();
    tracing::debug!("Bound {} animation channels in {} clips", channel_count, clips.len());

    if merge {
        if channel_count == 0 {
            return Vec::new();
        }
        return vec![AnimationClip {
            name: MERGED_CLIP_NAME.to_string(),
            element: None,
            channels: clips.into_iter().flat_map(|c| c.channels).collect(),
        }];
    }

    clips.retain(|clip| !clip.channels.is_empty());
    clips
}

fn collect_channels(
    doc: &Document,
    graph: &mut SceneGraph,
    element: ElementId,
    top_level: ElementId,
    channels: &mut Vec<AnimationChannel>,
) {
    let Some(animation) = doc.animation(element) else {
        return;
    };
    for &channel in &animation.channels {
        if let Some(bound) = AnimationChannel::from_document(doc, graph, channel, top_level) {
            channels.push(bound);
        }
    }
    for &nested in &animation.animations {
        collect_channels(doc, graph, nested, top_level, channels);
    }
}
