//! COLLADA XML loader
//!
//! Builds the [`Document`] arena from XML text. Every XML element becomes a
//! document element so ids and sids are registered for all of them; the
//! elements the converter consumes also get a typed payload. References are
//! recorded as links and resolved in one pass once the whole tree exists.

use std::path::Path;

use xmltree::{Element as XmlElement, XMLNode};

use crate::document::{
    AnimationElement, Channel, Controller, Document, Effect, EffectColor, ElementId, ElementKind,
    FxScopeId, Geometry, Image, Input, InstanceController, InstanceGeometry, InstanceMaterial,
    Material, Mesh, NewParam, NodeElement, ParamValue, Sampler, Skin, Source, SourceData,
    TransformElement, TransformKind, Triangles, Vertices, VertexWeights, VisualScene,
};
use crate::error::{DaeError, Result};
use crate::link::{LinkKind, parse_scoped_address, parse_url};
use crate::resolver::resolve_links;

/// Load and resolve a document from a file
pub fn load_file(path: &Path) -> Result<Document> {
    let bytes = std::fs::read(path)?;
    load_bytes(&bytes)
}

/// Load and resolve a document from XML text
pub fn load_str(text: &str) -> Result<Document> {
    load_bytes(text.as_bytes())
}

fn load_bytes(bytes: &[u8]) -> Result<Document> {
    let root = XmlElement::parse(bytes)?;
    if root.name != "COLLADA" {
        return Err(DaeError::NotCollada(root.name));
    }

    let mut loader = Loader::default();
    loader.walk(None, &root, "", None);
    let mut doc = loader.doc;

    let stats = resolve_links(&mut doc);
    tracing::info!(
        "Loaded {} elements, {} links ({} unresolved)",
        doc.element_count(),
        stats.resolved + stats.unresolved,
        stats.unresolved
    );
    Ok(doc)
}

fn attr(xml: &XmlElement, name: &str) -> Option<String> {
    xml.attributes.get(name).cloned()
}

fn attr_usize(xml: &XmlElement, name: &str) -> Option<usize> {
    let value = xml.attributes.get(name)?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::error!("<{}> {}=\"{}\" is not a count", xml.name, name, value);
            None
        }
    }
}

fn text(xml: &XmlElement) -> String {
    xml.get_text().map(|t| t.into_owned()).unwrap_or_default()
}

fn child_elements(xml: &XmlElement) -> impl Iterator<Item = &XmlElement> {
    xml.children.iter().filter_map(|node| match node {
        XMLNode::Element(e) => Some(e),
        _ => None,
    })
}

fn children_named<'a>(xml: &'a XmlElement, tag: &'a str) -> impl Iterator<Item = &'a XmlElement> {
    child_elements(xml).filter(move |e| e.name == tag)
}

/// Whitespace separated numbers; unparsable entries become the default
fn parse_list<T: std::str::FromStr + Default>(tag: &str, text: &str) -> Vec<T> {
    let mut invalid = 0usize;
    let values = text
        .split_whitespace()
        .map(|token| {
            token.parse().unwrap_or_else(|_| {
                invalid += 1;
                T::default()
            })
        })
        .collect();
    if invalid > 0 {
        tracing::error!("<{}>: {} malformed numbers replaced by 0", tag, invalid);
    }
    values
}

#[derive(Default)]
struct Loader {
    doc: Document,
    /// Diffuse channel of the effect currently being walked
    diffuse: Option<EffectColor>,
}

impl Loader {
    fn walk(
        &mut self,
        parent: Option<ElementId>,
        xml: &XmlElement,
        parent_tag: &str,
        scope: Option<FxScopeId>,
    ) -> ElementId {
        let id = self.doc.add_element(
            parent,
            &xml.name,
            attr(xml, "id"),
            attr(xml, "sid"),
            attr(xml, "name"),
        );

        let scope = match xml.name.as_str() {
            "effect" => Some(self.doc.add_fx_scope(None)),
            tag if tag.starts_with("profile_") => Some(self.doc.add_fx_scope(scope)),
            _ => scope,
        };

        let children: Vec<(ElementId, &XmlElement)> = child_elements(xml)
            .map(|child| (self.walk(Some(id), child, &xml.name, scope), child))
            .collect();

        self.parse_kind(id, xml, parent_tag, &children, scope);
        id
    }

    fn parse_kind(
        &mut self,
        id: ElementId,
        xml: &XmlElement,
        parent_tag: &str,
        children: &[(ElementId, &XmlElement)],
        scope: Option<FxScopeId>,
    ) {
        let tag = xml.name.as_str();
        let kind = match tag {
            "visual_scene" => {
                self.doc.visual_scenes.push(id);
                ElementKind::VisualScene(VisualScene {
                    nodes: ids_tagged(children, "node"),
                })
            }
            "node" => ElementKind::Node(self.node(xml, children)),
            "matrix" | "rotate" | "translate" | "scale" if parent_tag == "node" => {
                ElementKind::Transform(transform_element(xml))
            }
            "source" if parent_tag != "sampler2D" => ElementKind::Source(source(xml)),
            "vertices" => ElementKind::Vertices(Vertices {
                inputs: self.inputs(xml),
            }),
            "geometry" => ElementKind::Geometry(self.geometry(xml, children)),
            "controller" => ElementKind::Controller(self.controller(xml)),
            "animation" => {
                if parent_tag == "library_animations" {
                    self.doc.animations.push(id);
                }
                ElementKind::Animation(AnimationElement {
                    animations: ids_tagged(children, "animation"),
                    channels: ids_tagged(children, "channel"),
                })
            }
            "sampler" => ElementKind::Sampler(Sampler {
                inputs: self.inputs(xml),
            }),
            "channel" => ElementKind::Channel(self.channel(xml)),
            "material" => ElementKind::Material(Material {
                effect: children_named(xml, "instance_effect")
                    .next()
                    .and_then(|e| attr(e, "url"))
                    .map(|url| self.doc.add_link(parse_url(&url))),
            }),
            "diffuse" => {
                self.diffuse = self.diffuse_color(xml, scope);
                return;
            }
            "effect" => ElementKind::Effect(Effect {
                diffuse: self.diffuse.take(),
            }),
            "newparam" => {
                if let (Some(scope), Some(sid)) = (scope, attr(xml, "sid")) {
                    self.doc.register_fx(scope, &sid, id);
                }
                ElementKind::NewParam(NewParam {
                    value: self.param_value(xml, scope),
                })
            }
            "image" => ElementKind::Image(Image {
                init_from: children_named(xml, "init_from").next().map(|init| {
                    // COLLADA 1.5 wraps the path in <ref>
                    children_named(init, "ref")
                        .next()
                        .map(text)
                        .unwrap_or_else(|| text(init))
                        .trim()
                        .to_string()
                }),
            }),
            "instance_visual_scene" if parent_tag == "scene" => {
                if let Some(url) = attr(xml, "url") {
                    self.doc.scene = Some(self.doc.add_link(parse_url(&url)));
                }
                return;
            }
            "lookat" | "skew" if parent_tag == "node" => {
                tracing::error!("<{}> transforms are not supported, ignoring", tag);
                return;
            }
            "instance_node" | "morph" | "polygons" | "lines" | "linestrips" | "tristrips"
            | "trifans" => {
                tracing::warn!("<{}> is not supported, skipping", tag);
                return;
            }
            _ => return,
        };
        self.doc.set_kind(id, kind);
    }

    fn inputs(&mut self, xml: &XmlElement) -> Vec<Input> {
        children_named(xml, "input")
            .map(|input| Input {
                semantic: attr(input, "semantic").unwrap_or_default(),
                source: self
                    .doc
                    .add_link(parse_url(&attr(input, "source").unwrap_or_default())),
                offset: attr_usize(input, "offset").unwrap_or(0),
                set: attr_usize(input, "set").unwrap_or(0),
            })
            .collect()
    }

    fn instance_materials(&mut self, xml: &XmlElement) -> Vec<InstanceMaterial> {
        let Some(technique) = children_named(xml, "bind_material")
            .next()
            .and_then(|b| children_named(b, "technique_common").next())
        else {
            return Vec::new();
        };
        children_named(technique, "instance_material")
            .filter_map(|m| {
                let symbol = attr(m, "symbol")?;
                let target = attr(m, "target")?;
                Some(InstanceMaterial {
                    symbol,
                    target: self.doc.add_link(parse_url(&target)),
                })
            })
            .collect()
    }

    fn node(&mut self, xml: &XmlElement, children: &[(ElementId, &XmlElement)]) -> NodeElement {
        let mut node = NodeElement {
            joint: attr(xml, "type").as_deref() == Some("JOINT"),
            ..Default::default()
        };

        for &(child, child_xml) in children {
            match child_xml.name.as_str() {
                "node" => node.nodes.push(child),
                tag if TransformKind::from_tag(tag).is_some() => node.transforms.push(child),
                "instance_geometry" => {
                    let Some(url) = attr(child_xml, "url") else {
                        tracing::error!("<instance_geometry> without url");
                        continue;
                    };
                    let geometry = self.doc.add_link(parse_url(&url));
                    let materials = self.instance_materials(child_xml);
                    node.instance_geometries.push(InstanceGeometry {
                        geometry,
                        materials,
                    });
                }
                "instance_controller" => {
                    let Some(url) = attr(child_xml, "url") else {
                        tracing::error!("<instance_controller> without url");
                        continue;
                    };
                    let controller = self.doc.add_link(parse_url(&url));
                    let skeletons = children_named(child_xml, "skeleton")
                        .map(|s| self.doc.add_link(parse_url(&text(s))))
                        .collect::<Vec<_>>();
                    if skeletons.len() > 1 {
                        tracing::debug!(
                            "<instance_controller> with {} skeleton roots, searching in order",
                            skeletons.len()
                        );
                    }
                    let materials = self.instance_materials(child_xml);
                    node.instance_controllers.push(InstanceController {
                        controller,
                        skeletons,
                        materials,
                    });
                }
                _ => {}
            }
        }
        node
    }

    fn geometry(&mut self, xml: &XmlElement, children: &[(ElementId, &XmlElement)]) -> Geometry {
        let Some(&(mesh_id, mesh_xml)) = children.iter().find(|(_, c)| c.name == "mesh") else {
            tracing::warn!(
                "Geometry '{}' has no <mesh>, skipping",
                attr(xml, "id").unwrap_or_default()
            );
            return Geometry::default();
        };

        let mesh_children: Vec<(ElementId, &XmlElement)> = self
            .doc
            .element(mesh_id)
            .children
            .clone()
            .into_iter()
            .zip(child_elements(mesh_xml))
            .collect();

        let mut mesh = Mesh {
            vertices: ids_tagged(&mesh_children, "vertices").first().copied(),
            triangles: Vec::new(),
        };
        for (_, primitive) in &mesh_children {
            match primitive.name.as_str() {
                "triangles" => mesh.triangles.push(self.triangles(primitive)),
                "polylist" => {
                    if let Some(triangles) = self.polylist(primitive) {
                        mesh.triangles.push(triangles);
                    }
                }
                _ => {}
            }
        }
        Geometry { mesh: Some(mesh) }
    }

    fn triangles(&mut self, xml: &XmlElement) -> Triangles {
        let indices: Vec<u32> = children_named(xml, "p")
            .flat_map(|p| parse_list::<u32>("p", &text(p)))
            .collect();
        let inputs = self.inputs(xml);
        let count = match attr_usize(xml, "count") {
            Some(count) => count,
            None => {
                let stride = inputs.iter().map(|i| i.offset + 1).max().unwrap_or(1);
                let derived = indices.len() / stride / 3;
                tracing::error!(
                    "<{}> without count attribute, assuming {} triangles from <p>",
                    xml.name,
                    derived
                );
                derived
            }
        };
        Triangles {
            material: attr(xml, "material"),
            count,
            inputs,
            indices,
        }
    }

    /// A `<polylist>` whose polygons are all triangles
    fn polylist(&mut self, xml: &XmlElement) -> Option<Triangles> {
        let vcount: Vec<u32> = children_named(xml, "vcount")
            .next()
            .map(|v| parse_list("vcount", &text(v)))
            .unwrap_or_default();
        if vcount.iter().any(|&n| n != 3) {
            tracing::warn!("<polylist> with non-triangle polygons is not supported, skipping");
            return None;
        }
        Some(self.triangles(xml))
    }

    fn controller(&mut self, xml: &XmlElement) -> Controller {
        let Some(skin) = children_named(xml, "skin").next() else {
            tracing::warn!(
                "Controller '{}' has no <skin>, skipping",
                attr(xml, "id").unwrap_or_default()
            );
            return Controller::default();
        };

        let bind_shape_matrix = children_named(skin, "bind_shape_matrix").next().and_then(|m| {
            let values: Vec<f32> = parse_list("bind_shape_matrix", &text(m));
            let matrix = <[f32; 16]>::try_from(values.as_slice()).ok();
            if matrix.is_none() {
                tracing::error!("<bind_shape_matrix> needs 16 values, got {}", values.len());
            }
            matrix
        });

        let joints = children_named(skin, "joints")
            .next()
            .map(|j| self.inputs(j))
            .unwrap_or_default();

        let weights = match children_named(skin, "vertex_weights").next() {
            Some(w) => VertexWeights {
                count: attr_usize(w, "count").unwrap_or(0),
                inputs: self.inputs(w),
                vcount: children_named(w, "vcount")
                    .next()
                    .map(|v| parse_list("vcount", &text(v)))
                    .unwrap_or_default(),
                v: children_named(w, "v")
                    .next()
                    .map(|v| parse_list("v", &text(v)))
                    .unwrap_or_default(),
            },
            None => {
                tracing::error!("<skin> without <vertex_weights>");
                VertexWeights::default()
            }
        };

        Controller {
            skin: Some(Skin {
                source: self
                    .doc
                    .add_link(parse_url(&attr(skin, "source").unwrap_or_default())),
                bind_shape_matrix,
                joints,
                weights,
            }),
        }
    }

    fn channel(&mut self, xml: &XmlElement) -> Channel {
        let source = self
            .doc
            .add_link(parse_url(&attr(xml, "source").unwrap_or_default()));
        let address = attr(xml, "target").unwrap_or_default();
        let target_kind = parse_scoped_address(&address).unwrap_or_else(|| {
            tracing::error!("Malformed channel target '{}'", address);
            LinkKind::Global { id: address }
        });
        Channel {
            source,
            target: self.doc.add_link(target_kind),
        }
    }

    fn diffuse_color(&mut self, xml: &XmlElement, scope: Option<FxScopeId>) -> Option<EffectColor> {
        if let Some(color) = children_named(xml, "color").next() {
            let values: Vec<f32> = parse_list("color", &text(color));
            let mut rgba = [0.0, 0.0, 0.0, 1.0];
            for (dst, src) in rgba.iter_mut().zip(values) {
                *dst = src;
            }
            return Some(EffectColor::Color(rgba));
        }
        let texture = children_named(xml, "texture").next()?;
        let name = attr(texture, "texture")?;
        let Some(scope) = scope else {
            tracing::warn!("<texture> outside an effect profile, ignoring");
            return None;
        };
        Some(EffectColor::Texture(
            self.doc.add_link(LinkKind::Fx { name, scope }),
        ))
    }

    fn param_value(&mut self, xml: &XmlElement, scope: Option<FxScopeId>) -> ParamValue {
        if let Some(surface) = children_named(xml, "surface").next() {
            let image = children_named(surface, "init_from")
                .next()
                .map(|init| self.doc.add_link(parse_url(&text(init))));
            return ParamValue::Surface { image };
        }
        if let Some(sampler) = children_named(xml, "sampler2D").next() {
            let surface = match (children_named(sampler, "source").next(), scope) {
                (Some(source), Some(scope)) => Some(self.doc.add_link(LinkKind::Fx {
                    name: text(source).trim().to_string(),
                    scope,
                })),
                _ => None,
            };
            let image = children_named(sampler, "instance_image")
                .next()
                .and_then(|i| attr(i, "url"))
                .map(|url| self.doc.add_link(parse_url(&url)));
            return ParamValue::Sampler2D { surface, image };
        }
        ParamValue::Other
    }
}

fn ids_tagged(children: &[(ElementId, &XmlElement)], tag: &str) -> Vec<ElementId> {
    children
        .iter()
        .filter(|(_, xml)| xml.name == tag)
        .map(|(id, _)| *id)
        .collect()
}

fn transform_element(xml: &XmlElement) -> TransformElement {
    TransformElement {
        kind: TransformKind::from_tag(&xml.name).unwrap_or(TransformKind::Matrix),
        values: parse_list(&xml.name, &text(xml)),
    }
}

fn source(xml: &XmlElement) -> Source {
    let data = child_elements(xml)
        .find_map(|array| match array.name.as_str() {
            "float_array" => Some(SourceData::Float(parse_list("float_array", &text(array)))),
            "Name_array" => Some(SourceData::Name(
                text(array).split_whitespace().map(str::to_string).collect(),
            )),
            "IDREF_array" => Some(SourceData::IdRef(
                text(array).split_whitespace().map(str::to_string).collect(),
            )),
            _ => None,
        })
        .unwrap_or_default();

    let len = match &data {
        SourceData::Empty => 0,
        SourceData::Float(v) => v.len(),
        SourceData::Name(v) | SourceData::IdRef(v) => v.len(),
    };

    let accessor = children_named(xml, "technique_common")
        .next()
        .and_then(|t| children_named(t, "accessor").next());
    match accessor {
        Some(accessor) => Source {
            stride: attr_usize(accessor, "stride").unwrap_or(1).max(1),
            count: attr_usize(accessor, "count").unwrap_or(len),
            offset: attr_usize(accessor, "offset").unwrap_or(0),
            data,
        },
        None => Source {
            stride: 1,
            count: len,
            offset: 0,
            data,
        },
    }
}
