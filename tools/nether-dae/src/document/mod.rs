//! Parsed COLLADA document graph
//!
//! The document is an arena of [`Element`]s addressed by [`ElementId`]. Cross
//! references are not followed while the arena is built: every reference is
//! recorded as a [`Link`] in the document's link table and resolved in one
//! batch pass afterwards (see [`crate::resolver`]), because forward
//! references are legal.
//!
//! Three namespaces coexist:
//! - global ids (`id="..."`), unique document-wide, kept in a hash table
//! - scoped ids (`sid="..."`), unique only inside their scope, reachable through
//!   each element's `sid_children`
//! - FX scopes, a parallel tree of effect parameter tables walked upwards on a miss

mod animation;
mod fx;
mod mesh;
mod scene;
mod skin;

pub use animation::{AnimationElement, Channel, Sampler};
pub use fx::{Effect, EffectColor, Image, Material, NewParam, ParamValue};
pub use mesh::{Geometry, Input, Mesh, Source, SourceData, Triangles, Vertices};
pub use scene::{
    InstanceController, InstanceGeometry, InstanceMaterial, NodeElement, TransformElement,
    TransformKind, VisualScene,
};
pub use skin::{Controller, Skin, VertexWeights};

use hashbrown::HashMap;

use crate::link::{Link, LinkKind};

/// Arena index of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u32);

/// Index into the document's link table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub u32);

/// Index of an FX scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FxScopeId(pub u32);

/// One element of the document tree
#[derive(Debug, Clone)]
pub struct Element {
    /// XML tag name (`node`, `source`, ...)
    pub tag: String,
    pub id: Option<String>,
    pub sid: Option<String>,
    pub name: Option<String>,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
    /// Elements with a `sid` whose nearest id- or sid-bearing ancestor is this element
    pub sid_children: Vec<ElementId>,
    pub kind: ElementKind,
}

impl Element {
    /// Human readable name for log messages
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .or(self.sid.as_deref())
            .unwrap_or(&self.tag)
    }
}

/// Typed payload of an element
#[derive(Debug, Clone, Default)]
pub enum ElementKind {
    #[default]
    Other,
    VisualScene(VisualScene),
    Node(NodeElement),
    Transform(TransformElement),
    Geometry(Geometry),
    Source(Source),
    Vertices(Vertices),
    Controller(Controller),
    Animation(AnimationElement),
    Sampler(Sampler),
    Channel(Channel),
    Material(Material),
    Effect(Effect),
    NewParam(NewParam),
    Image(Image),
}

/// A node of the FX scope tree
#[derive(Debug, Clone, Default)]
pub struct FxScope {
    pub parent: Option<FxScopeId>,
    pub children: HashMap<String, ElementId>,
}

/// The whole parsed document plus its symbol tables
#[derive(Debug, Default)]
pub struct Document {
    elements: Vec<Element>,
    links: Vec<Link>,
    fx_scopes: Vec<FxScope>,
    ids: HashMap<String, ElementId>,
    /// `<visual_scene>` elements in document order
    pub visual_scenes: Vec<ElementId>,
    /// `<scene>/<instance_visual_scene>` link, if present
    pub scene: Option<LinkId>,
    /// Top-level `<animation>` elements of `<library_animations>`
    pub animations: Vec<ElementId>,
}

macro_rules! typed_accessor {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        pub fn $fn_name(&self, id: ElementId) -> Option<&$ty> {
            match &self.element(id).kind {
                ElementKind::$variant(value) => Some(value),
                _ => None,
            }
        }
    };
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element to the arena
    ///
    /// Registers the global id (a duplicate id is reported and the first
    /// definition is kept) and the sid-child relation.
    pub fn add_element(
        &mut self,
        parent: Option<ElementId>,
        tag: &str,
        id: Option<String>,
        sid: Option<String>,
        name: Option<String>,
    ) -> ElementId {
        let element_id = ElementId(self.elements.len() as u32);

        if let Some(id) = &id {
            if self.ids.contains_key(id) {
                tracing::error!("Duplicate element id '{}' on <{}>, keeping the first", id, tag);
            } else {
                self.ids.insert(id.clone(), element_id);
            }
        }

        if sid.is_some() {
            if let Some(scope) = self.sid_scope_of(parent) {
                self.elements[scope.0 as usize].sid_children.push(element_id);
            }
        }

        if let Some(parent) = parent {
            self.elements[parent.0 as usize].children.push(element_id);
        }

        self.elements.push(Element {
            tag: tag.to_string(),
            id,
            sid,
            name,
            parent,
            children: Vec::new(),
            sid_children: Vec::new(),
            kind: ElementKind::Other,
        });
        element_id
    }

    /// Nearest element at or above `start` that carries an id or a sid
    fn sid_scope_of(&self, start: Option<ElementId>) -> Option<ElementId> {
        let mut current = start;
        while let Some(id) = current {
            let element = self.element(id);
            if element.id.is_some() || element.sid.is_some() {
                return Some(id);
            }
            current = element.parent;
        }
        None
    }

    /// Set the typed payload of an element
    pub fn set_kind(&mut self, id: ElementId, kind: ElementKind) {
        self.elements[id.0 as usize].kind = kind;
    }

    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.0 as usize]
    }

    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, e)| (ElementId(i as u32), e))
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Look up an element by global id
    pub fn find_id(&self, id: &str) -> Option<ElementId> {
        self.ids.get(id).copied()
    }

    /// Register a deferred reference
    pub fn add_link(&mut self, kind: LinkKind) -> LinkId {
        let id = LinkId(self.links.len() as u32);
        self.links.push(Link::new(kind));
        id
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0 as usize]
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub(crate) fn links_mut(&mut self) -> &mut [Link] {
        &mut self.links
    }

    /// Resolved target of a link, `None` if unresolved
    pub fn link_target(&self, id: LinkId) -> Option<ElementId> {
        self.link(id).target
    }

    /// Create a new FX scope below `parent`
    pub fn add_fx_scope(&mut self, parent: Option<FxScopeId>) -> FxScopeId {
        let id = FxScopeId(self.fx_scopes.len() as u32);
        self.fx_scopes.push(FxScope {
            parent,
            children: HashMap::new(),
        });
        id
    }

    /// Register an FX parameter in a scope
    pub fn register_fx(&mut self, scope: FxScopeId, name: &str, element: ElementId) {
        let children = &mut self.fx_scopes[scope.0 as usize].children;
        if children.contains_key(name) {
            tracing::warn!("Duplicate FX parameter '{}' in one scope, keeping the first", name);
            return;
        }
        children.insert(name.to_string(), element);
    }

    pub fn fx_scope(&self, id: FxScopeId) -> &FxScope {
        &self.fx_scopes[id.0 as usize]
    }

    typed_accessor!(visual_scene, VisualScene, VisualScene);
    typed_accessor!(node, Node, NodeElement);
    typed_accessor!(transform, Transform, TransformElement);
    typed_accessor!(geometry, Geometry, Geometry);
    typed_accessor!(source, Source, Source);
    typed_accessor!(vertices, Vertices, Vertices);
    typed_accessor!(controller, Controller, Controller);
    typed_accessor!(animation, Animation, AnimationElement);
    typed_accessor!(sampler, Sampler, Sampler);
    typed_accessor!(channel, Channel, Channel);
    typed_accessor!(material, Material, Material);
    typed_accessor!(effect, Effect, Effect);
    typed_accessor!(new_param, NewParam, NewParam);
    typed_accessor!(image, Image, Image);

    /// Source element behind a resolved link
    pub fn linked_source(&self, link: LinkId) -> Option<&Source> {
        self.link_target(link).and_then(|id| self.source(id))
    }
}
