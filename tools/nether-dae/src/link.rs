//! Deferred references between document elements
//!
//! Links are created while the document is built and resolved afterwards by
//! [`crate::resolver::resolve_links`].

use crate::document::{ElementId, FxScopeId, TransformKind};

/// Member or index selector at the end of a scoped address
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    #[default]
    None,
    /// `.X`, `.ANGLE`, ...
    Member(String),
    /// `(i)`
    Index(usize),
    /// `(row)(col)`
    Index2(usize, usize),
}

impl Selector {
    /// Range `(offset, count)` addressed inside a transform data buffer
    ///
    /// Returns `None` when the selector does not fit the transform type.
    pub fn range(&self, kind: TransformKind) -> Option<(usize, usize)> {
        let len = kind.value_count();
        let range = match self {
            Selector::None => (0, len),
            Selector::Member(member) => {
                let offset = match (kind, member.to_ascii_uppercase().as_str()) {
                    (TransformKind::Rotate, "ANGLE") => 3,
                    (TransformKind::Matrix, _) => return None,
                    (_, "X") => 0,
                    (_, "Y") => 1,
                    (_, "Z") => 2,
                    _ => return None,
                };
                (offset, 1)
            }
            Selector::Index(i) => (*i, 1),
            Selector::Index2(row, col) => {
                if kind != TransformKind::Matrix || *row >= 4 || *col >= 4 {
                    return None;
                }
                (row * 4 + col, 1)
            }
        };
        (range.0 + range.1 <= len).then_some(range)
    }
}

/// Kind of deferred reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    /// `#id` URL reference
    Global { id: String },
    /// `rootId/sid/sid.member` address
    Scoped {
        root_id: String,
        path: Vec<String>,
        selector: Selector,
    },
    /// Effect parameter looked up through the FX scope chain
    Fx { name: String, scope: FxScopeId },
}

/// A deferred reference and its resolution result
#[derive(Debug, Clone)]
pub struct Link {
    pub kind: LinkKind,
    /// `None` until resolved, and forever if resolution failed
    pub target: Option<ElementId>,
}

impl Link {
    pub fn new(kind: LinkKind) -> Self {
        Self { kind, target: None }
    }

    /// Selector of a scoped link, `Selector::None` otherwise
    pub fn selector(&self) -> &Selector {
        match &self.kind {
            LinkKind::Scoped { selector, .. } => selector,
            _ => &Selector::None,
        }
    }

    /// Original address text for log messages
    pub fn describe(&self) -> String {
        match &self.kind {
            LinkKind::Global { id } => format!("#{id}"),
            LinkKind::Scoped {
                root_id,
                path,
                selector,
            } => {
                let mut text = root_id.clone();
                for segment in path {
                    text.push('/');
                    text.push_str(segment);
                }
                match selector {
                    Selector::None => {}
                    Selector::Member(m) => {
                        text.push('.');
                        text.push_str(m);
                    }
                    Selector::Index(i) => text.push_str(&format!("({i})")),
                    Selector::Index2(r, c) => text.push_str(&format!("({r})({c})")),
                }
                text
            }
            LinkKind::Fx { name, .. } => format!("fx:{name}"),
        }
    }
}

/// Parse a URL reference (`#id`, or a bare id)
pub fn parse_url(url: &str) -> LinkKind {
    LinkKind::Global {
        id: url.trim().trim_start_matches('#').to_string(),
    }
}

/// Parse a scoped address `rootId/sid/sid[.member|(i)|(i)(j)]`
///
/// Returns `None` for malformed addresses (empty root, empty path segment,
/// unparsable index). Relative addresses (`./sid`) are not supported.
pub fn parse_scoped_address(address: &str) -> Option<LinkKind> {
    let address = address.trim();
    let mut segments: Vec<&str> = address.split('/').collect();
    let root_id = segments.first()?.to_string();
    if root_id.is_empty() || root_id == "." {
        return None;
    }

    let mut selector = Selector::None;
    if segments.len() > 1 {
        let last = segments.pop()?;
        let (name, parsed) = split_selector(last)?;
        selector = parsed;
        segments.push(name);
    }

    let path: Vec<String> = segments[1..].iter().map(|s| s.to_string()).collect();
    if path.iter().any(|s| s.is_empty()) {
        return None;
    }

    Some(LinkKind::Scoped {
        root_id,
        path,
        selector,
    })
}

fn split_selector(segment: &str) -> Option<(&str, Selector)> {
    if let Some(paren) = segment.find('(') {
        let (name, rest) = segment.split_at(paren);
        let indices: Vec<usize> = rest
            .split(')')
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_start_matches('(').parse::<usize>().ok())
            .collect::<Option<Vec<_>>>()?;
        let selector = match indices.as_slice() {
            [i] => Selector::Index(*i),
            [row, col] => Selector::Index2(*row, *col),
            _ => return None,
        };
        Some((name, selector))
    } else if let Some((name, member)) = segment.split_once('.') {
        Some((name, Selector::Member(member.to_string())))
    } else {
        Some((segment, Selector::None))
    }
}
