//! Batch link resolution
//!
//! Resolves every deferred [`Link`](crate::link::Link) of a document against
//! its symbol tables:
//! - global links: hash lookup of the id
//! - scoped links: breadth-first search over SID children, one path segment at a time
//! - FX links: walk up the FX scope chain
//!
//! Unresolved links are reported and left without a target; consumers treat a
//! missing target as a missing feature.

use std::collections::VecDeque;

use crate::document::{Document, ElementId, FxScopeId};
use crate::link::LinkKind;

/// Summary of one resolution pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub resolved: usize,
    pub unresolved: usize,
}

/// Resolve all links of the document in one pass
pub fn resolve_links(doc: &mut Document) -> ResolveStats {
    let mut stats = ResolveStats::default();

    let targets: Vec<Option<ElementId>> = doc
        .links()
        .iter()
        .map(|link| {
            let target = resolve_kind(doc, &link.kind);
            if target.is_none() {
                tracing::warn!("Unresolved link '{}'", link.describe());
            }
            target
        })
        .collect();

    for (link, target) in doc.links_mut().iter_mut().zip(targets) {
        link.target = target;
        if target.is_some() {
            stats.resolved += 1;
        } else {
            stats.unresolved += 1;
        }
    }

    tracing::debug!(
        "Resolved {} links ({} unresolved)",
        stats.resolved,
        stats.unresolved
    );
    stats
}

fn resolve_kind(doc: &Document, kind: &LinkKind) -> Option<ElementId> {
    match kind {
        LinkKind::Global { id } => doc.find_id(id),
        LinkKind::Scoped { root_id, path, .. } => {
            let Some(root) = doc.find_id(root_id) else {
                tracing::warn!("Scoped link root '{}' not found", root_id);
                return None;
            };
            find_sid_target(doc, root, path, false)
        }
        LinkKind::Fx { name, scope } => find_fx_target(doc, *scope, name),
    }
}

/// Breadth-first scoped search
///
/// Consumes one path segment at a time. The queue for a segment is seeded
/// with the SID children of the previous match (with `start` itself also
/// considered for the first segment when `include_start` is set). The first
/// match in breadth-first order wins; later duplicates are shadowed.
pub fn find_sid_target(
    doc: &Document,
    start: ElementId,
    path: &[String],
    include_start: bool,
) -> Option<ElementId> {
    let mut current = start;
    let mut queue: VecDeque<ElementId> = VecDeque::new();

    for (depth, segment) in path.iter().enumerate() {
        queue.clear();
        if depth == 0 && include_start {
            queue.push_back(current);
        } else {
            queue.extend(doc.element(current).sid_children.iter().copied());
        }

        let mut found = None;
        while let Some(candidate) = queue.pop_front() {
            let element = doc.element(candidate);
            if element.sid.as_deref() == Some(segment.as_str()) {
                found = Some(candidate);
                break;
            }
            queue.extend(element.sid_children.iter().copied());
        }

        match found {
            Some(element) => current = element,
            None => {
                tracing::warn!(
                    "Sid '{}' not found below '{}'",
                    segment,
                    doc.element(current).label()
                );
                return None;
            }
        }
    }

    Some(current)
}

/// Look up an FX parameter, walking up parent scopes on a miss
pub fn find_fx_target(doc: &Document, scope: FxScopeId, name: &str) -> Option<ElementId> {
    let mut current = Some(scope);
    while let Some(id) = current {
        let scope = doc.fx_scope(id);
        if let Some(&element) = scope.children.get(name) {
            return Some(element);
        }
        current = scope.parent;
    }
    None
}
