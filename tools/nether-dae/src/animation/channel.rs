//! Animation channels bound to converter transforms

use smallvec::SmallVec;

use super::curve::{Interpolation, Segment};
use crate::document::{Document, ElementId, Sampler, Source};
use crate::scene::{NodeId, SceneGraph};

/// Slice of a transform buffer a channel writes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTarget {
    pub node: NodeId,
    /// Index into the node's transform list
    pub transform: usize,
    pub offset: usize,
    pub count: usize,
}

/// Values of one channel at one point in time
pub type ChannelSample = SmallVec<[f32; 16]>;

#[derive(Debug, Clone)]
pub struct AnimationChannel {
    /// Target address, for log messages
    pub name: String,
    /// Interpolation of the segment starting at each key
    pub interpolations: Vec<Interpolation>,
    /// Key times, non-decreasing
    pub times: Vec<f32>,
    /// `count` values per key
    pub outputs: Vec<f32>,
    pub in_tangents: Option<Vec<f32>>,
    pub out_tangents: Option<Vec<f32>>,
    pub target: ChannelTarget,
}

impl AnimationChannel {
    /// Bind a `<channel>` to its converter transform
    ///
    /// Registers `animation` on the target transform. Returns `None` (after
    /// logging) when the sampler or the target cannot be used.
    pub fn from_document(
        doc: &Document,
        graph: &mut SceneGraph,
        channel_id: ElementId,
        animation: ElementId,
    ) -> Option<Self> {
        let channel = doc.channel(channel_id)?;
        let target_link = doc.link(channel.target);
        let name = target_link.describe();

        let Some(sampler) = doc.link_target(channel.source).and_then(|id| doc.sampler(id)) else {
            tracing::warn!("Channel '{}': sampler is unresolved, skipping", name);
            return None;
        };
        let Some(target_element) = target_link.target else {
            tracing::warn!("Channel '{}': target is unresolved, skipping", name);
            return None;
        };
        let Some((node, transform)) = graph.transform_for_element(target_element) else {
            tracing::warn!(
                "Channel '{}': target is not a transform of the visual scene, skipping",
                name
            );
            return None;
        };
        let kind = graph.node(node).transforms[transform].kind();
        let Some((offset, count)) = target_link.selector().range(kind) else {
            tracing::warn!(
                "Channel '{}': selector does not fit a {:?} transform, skipping",
                name,
                kind
            );
            return None;
        };

        let (Some(input), Some(output)) = (
            sampler_source(doc, sampler, "INPUT"),
            sampler_source(doc, sampler, "OUTPUT"),
        ) else {
            tracing::warn!("Channel '{}': sampler lacks INPUT or OUTPUT, skipping", name);
            return None;
        };

        let times = input.floats().to_vec();
        if times.is_empty() {
            tracing::warn!("Channel '{}': no keys, skipping", name);
            return None;
        }
        if !key_times_usable(&name, &times) {
            return None;
        }

        if output.stride.max(1) != count {
            tracing::error!(
                "Channel '{}': output has {} values per key, target takes {}",
                name,
                output.stride,
                count
            );
            return None;
        }
        let outputs = output.floats().to_vec();
        if outputs.len() < times.len() * count {
            tracing::error!(
                "Channel '{}': {} output values for {} keys",
                name,
                outputs.len(),
                times.len()
            );
            return None;
        }

        let interpolations = match sampler_source(doc, sampler, "INTERPOLATION") {
            Some(source) => parse_interpolations(&name, source.strings()),
            None => Vec::new(),
        };
        let in_tangents = sampler_source(doc, sampler, "IN_TANGENT")
            .and_then(|s| tangent_values(s, times.len(), count));
        let out_tangents = sampler_source(doc, sampler, "OUT_TANGENT")
            .and_then(|s| tangent_values(s, times.len(), count));

        if let Some(target) = graph.transform_mut(node, transform) {
            target.register_animation(animation);
        }

        Some(Self {
            name,
            interpolations,
            times,
            outputs,
            in_tangents,
            out_tangents,
            target: ChannelTarget {
                node,
                transform,
                offset,
                count,
            },
        })
    }

    pub fn start_time(&self) -> f32 {
        self.times.first().copied().unwrap_or(0.0)
    }

    pub fn end_time(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }

    pub fn key_count(&self) -> usize {
        self.times.len()
    }

    fn key(&self, index: usize) -> &[f32] {
        let count = self.target.count;
        &self.outputs[index * count..(index + 1) * count]
    }

    fn interpolation(&self, key: usize) -> Interpolation {
        self.interpolations.get(key).copied().unwrap_or_default()
    }

    /// Evaluate the channel at `t`
    ///
    /// Returns the values and whether `t` was outside the key range and
    /// clamped to the nearest key.
    pub fn sample(&self, t: f32) -> (ChannelSample, bool) {
        let last = self.times.len() - 1;
        let clamped = t < self.times[0] || t > self.times[last];
        if last == 0 || t <= self.times[0] {
            return (self.key(0).iter().copied().collect(), clamped);
        }
        if t >= self.times[last] {
            return (self.key(last).iter().copied().collect(), clamped);
        }

        let mut i = 0;
        while i + 1 < last && !(self.times[i] <= t && t < self.times[i + 1]) {
            i += 1;
        }

        let (t0, t1) = (self.times[i], self.times[i + 1]);
        let s = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };

        let mut interpolation = self.interpolation(i);
        let tangents = match (&self.out_tangents, &self.in_tangents) {
            (Some(out), Some(inn)) => Some((out, inn)),
            _ => None,
        };
        if tangents.is_none() && matches!(interpolation, Interpolation::Bezier | Interpolation::Hermite) {
            interpolation = Interpolation::Linear;
        }

        let count = self.target.count;
        let (k0, k1) = (self.key(i), self.key(i + 1));
        let values = (0..count)
            .map(|c| {
                let (tan0, tan1) = tangents
                    .map(|(out, inn)| (out[i * count + c], inn[(i + 1) * count + c]))
                    .unwrap_or((k0[c], k1[c]));
                Segment {
                    p0: k0[c],
                    p1: k1[c],
                    t0: tan0,
                    t1: tan1,
                }
                .evaluate(interpolation, s)
            })
            .collect();
        (values, clamped)
    }

    /// Write the value at `t` into the target transform
    ///
    /// Returns `true` when `t` was clamped.
    pub fn apply(&self, graph: &mut SceneGraph, t: f32) -> bool {
        let (values, clamped) = self.sample(t);
        if let Some(target) = graph.transform_mut(self.target.node, self.target.transform) {
            target.apply_animation(self.target.offset, &values);
        }
        clamped
    }
}

/// Key times must be finite and non-decreasing
fn key_times_usable(name: &str, times: &[f32]) -> bool {
    if times.iter().any(|t| !t.is_finite()) {
        tracing::error!("Channel '{}': non-finite key time, skipping", name);
        return false;
    }
    if times.windows(2).any(|w| w[1] < w[0]) {
        tracing::error!("Channel '{}': key times decrease, skipping", name);
        return false;
    }
    true
}

fn sampler_source<'a>(doc: &'a Document, sampler: &Sampler, semantic: &str) -> Option<&'a Source> {
    sampler.input(semantic).and_then(|i| doc.linked_source(i.source))
}

fn parse_interpolations(name: &str, labels: &[String]) -> Vec<Interpolation> {
    let mut warned = false;
    labels
        .iter()
        .map(|label| {
            Interpolation::parse(label).unwrap_or_else(|| {
                if !warned {
                    tracing::warn!(
                        "Channel '{}': unsupported interpolation '{}', using LINEAR",
                        name,
                        label
                    );
                    warned = true;
                }
                Interpolation::Linear
            })
        })
        .collect()
}

/// Tangent values, `count` per key
///
/// Bezier tangents are often stored as (time, value) control points; only the
/// value component is kept.
fn tangent_values(source: &Source, keys: usize, count: usize) -> Option<Vec<f32>> {
    let data = source.floats();
    let values: Vec<f32> = if source.stride == 2 * count {
        data.chunks_exact(2).map(|pair| pair[1]).collect()
    } else if source.stride.max(1) == count {
        data.to_vec()
    } else {
        tracing::warn!("Tangent source stride {} does not fit {} values per key", source.stride, count);
        return None;
    };
    (values.len() >= keys * count).then_some(values)
}
