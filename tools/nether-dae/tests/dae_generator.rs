//! Programmatic COLLADA generation for integration tests.
//!
//! Builds `.dae` text for:
//! - a 3-joint chain (Root → Spine → Head) skinning a stacked triangle mesh,
//!   with a keyed rotation on Spine
//! - a static scene with two nodes sharing one textured material

#![allow(dead_code)]

use std::fmt::Write;

/// Joint count of the test chain
pub const BONE_COUNT: usize = 3;
/// Joint names in skin order
pub const JOINTS: [&str; BONE_COUNT] = ["Root", "Spine", "Head"];
/// Distance between joints along +Y
const SEGMENT_HEIGHT: f32 = 1.0;

const HEADER: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">"#;

const MATERIAL_LIBRARIES: &str = r##"
  <library_images>
    <image id="skin-png" name="skin-png"><init_from>textures/skin.png</init_from></image>
  </library_images>
  <library_effects>
    <effect id="skin-effect">
      <profile_COMMON>
        <newparam sid="skin-surface">
          <surface type="2D"><init_from>skin-png</init_from></surface>
        </newparam>
        <newparam sid="skin-sampler">
          <sampler2D><source>skin-surface</source></sampler2D>
        </newparam>
        <technique sid="common">
          <lambert>
            <diffuse><texture texture="skin-sampler" texcoord="UVMap"/></diffuse>
          </lambert>
        </technique>
      </profile_COMMON>
    </effect>
  </library_effects>
  <library_materials>
    <material id="skin-material" name="skin"><instance_effect url="#skin-effect"/></material>
  </library_materials>"##;

/// Animation keys of the Spine rotation
#[derive(Debug, Clone)]
pub struct SpineKeys {
    pub times: Vec<f32>,
    /// Degrees about +Z
    pub angles: Vec<f32>,
}

impl Default for SpineKeys {
    fn default() -> Self {
        Self {
            times: vec![0.0, 1.0],
            angles: vec![0.0, 90.0],
        }
    }
}

fn join(values: impl IntoIterator<Item = impl ToString>) -> String {
    values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn float_source(id: &str, values: &[f32], stride: usize, params: &[&str]) -> String {
    let params: String = params
        .iter()
        .map(|p| format!(r#"<param name="{p}" type="float"/>"#))
        .collect();
    format!(
        r##"<source id="{id}">
          <float_array id="{id}-array" count="{count}">{values}</float_array>
          <technique_common>
            <accessor source="#{id}-array" count="{items}" stride="{stride}">{params}</accessor>
          </technique_common>
        </source>"##,
        count = values.len(),
        values = join(values),
        items = values.len() / stride,
    )
}

fn name_source(id: &str, names: &[&str], param: &str) -> String {
    format!(
        r##"<source id="{id}">
          <Name_array id="{id}-array" count="{count}">{names}</Name_array>
          <technique_common>
            <accessor source="#{id}-array" count="{count}" stride="1"><param name="{param}" type="name"/></accessor>
          </technique_common>
        </source>"##,
        count = names.len(),
        names = names.join(" "),
    )
}

/// One triangle per joint, triangle `i` sitting at the height of joint `i`
fn stacked_positions() -> Vec<f32> {
    (0..BONE_COUNT)
        .flat_map(|i| {
            let y = i as f32 * SEGMENT_HEIGHT;
            [-0.5, y, 0.0, 0.5, y, 0.0, 0.0, y + 0.5, 0.0]
        })
        .collect()
}

fn triangle_geometry(id: &str, material_symbol: &str) -> String {
    let positions = stacked_positions();
    let vertex_count = positions.len() / 3;
    let p = join((0..vertex_count).flat_map(|v| [v, 0]));
    format!(
        r##"
    <geometry id="{id}" name="{id}">
      <mesh>
        {positions}
        {normals}
        <vertices id="{id}-vertices"><input semantic="POSITION" source="#{id}-positions"/></vertices>
        <triangles material="{material_symbol}" count="{triangles}">
          <input semantic="VERTEX" source="#{id}-vertices" offset="0"/>
          <input semantic="NORMAL" source="#{id}-normals" offset="1"/>
          <p>{p}</p>
        </triangles>
      </mesh>
    </geometry>"##,
        positions = float_source(&format!("{id}-positions"), &positions, 3, &["X", "Y", "Z"]),
        normals = float_source(&format!("{id}-normals"), &[0.0, 0.0, 1.0], 3, &["X", "Y", "Z"]),
        triangles = vertex_count / 3,
    )
}

/// Row-major inverse bind matrices: joint `i` sits at `(0, i, 0)` in world space
fn inverse_bind_matrices() -> Vec<f32> {
    (0..BONE_COUNT)
        .flat_map(|i| {
            let y = -(i as f32) * SEGMENT_HEIGHT;
            [
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, y, //
                0.0, 0.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ]
        })
        .collect()
}

fn joint_nodes(depth: usize) -> String {
    if depth == BONE_COUNT {
        return String::new();
    }
    let name = JOINTS[depth];
    let offset = if depth == 0 { 0.0 } else { SEGMENT_HEIGHT };
    format!(
        r#"<node id="{name}" sid="{name}" name="{name}" type="JOINT">
          <translate sid="location">0 {offset} 0</translate>
          <rotate sid="rotateZ">0 0 1 0</rotate>
          {children}
        </node>"#,
        children = joint_nodes(depth + 1),
    )
}

/// Skinned 3-joint chain with one keyed channel on `Spine/rotateZ.ANGLE`
pub fn skinned_chain(keys: &SpineKeys) -> String {
    let vertex_count = stacked_positions().len() / 3;
    let weights_v = join((0..vertex_count).flat_map(|v| [v / 3, 0]));

    let mut dae = String::from(HEADER);
    dae.push_str(MATERIAL_LIBRARIES);

    dae.push_str("\n  <library_geometries>");
    dae.push_str(&triangle_geometry("body-mesh", "skin-symbol"));
    dae.push_str("\n  </library_geometries>");

    let _ = write!(
        dae,
        r##"
  <library_controllers>
    <controller id="body-skin">
      <skin source="#body-mesh">
        <bind_shape_matrix>1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1</bind_shape_matrix>
        {joints}
        {bind_poses}
        {weights}
        <joints>
          <input semantic="JOINT" source="#body-joints"/>
          <input semantic="INV_BIND_MATRIX" source="#body-bind-poses"/>
        </joints>
        <vertex_weights count="{vertex_count}">
          <input semantic="JOINT" source="#body-joints" offset="0"/>
          <input semantic="WEIGHT" source="#body-weights" offset="1"/>
          <vcount>{vcount}</vcount>
          <v>{weights_v}</v>
        </vertex_weights>
      </skin>
    </controller>
  </library_controllers>"##,
        joints = name_source("body-joints", &JOINTS, "JOINT"),
        bind_poses = float_source("body-bind-poses", &inverse_bind_matrices(), 16, &["TRANSFORM"]),
        weights = float_source("body-weights", &[1.0], 1, &["WEIGHT"]),
        vcount = join(std::iter::repeat_n(1, vertex_count)),
    );

    let interpolations: Vec<&str> = keys.times.iter().map(|_| "LINEAR").collect();
    let _ = write!(
        dae,
        r##"
  <library_animations>
    <animation id="spine-bend" name="bend">
      {input}
      {output}
      {interpolation}
      <sampler id="spine-bend-sampler">
        <input semantic="INPUT" source="#spine-bend-input"/>
        <input semantic="OUTPUT" source="#spine-bend-output"/>
        <input semantic="INTERPOLATION" source="#spine-bend-interpolation"/>
      </sampler>
      <channel source="#spine-bend-sampler" target="Spine/rotateZ.ANGLE"/>
    </animation>
  </library_animations>"##,
        input = float_source("spine-bend-input", &keys.times, 1, &["TIME"]),
        output = float_source("spine-bend-output", &keys.angles, 1, &["ANGLE"]),
        interpolation = name_source("spine-bend-interpolation", &interpolations, "INTERPOLATION"),
    );

    let _ = write!(
        dae,
        r##"
  <library_visual_scenes>
    <visual_scene id="scene" name="scene">
      {joints}
      <node id="Body" name="Body">
        <instance_controller url="#body-skin">
          <skeleton>#Root</skeleton>
          <bind_material>
            <technique_common>
              <instance_material symbol="skin-symbol" target="#skin-material"/>
            </technique_common>
          </bind_material>
        </instance_controller>
      </node>
    </visual_scene>
  </library_visual_scenes>
  <scene><instance_visual_scene url="#scene"/></scene>
</COLLADA>"##,
        joints = joint_nodes(0),
    );
    dae
}

/// Two static nodes instancing the same mesh, one translated by `(2, 0, 0)`
pub fn static_pair() -> String {
    let mut dae = String::from(HEADER);
    dae.push_str(MATERIAL_LIBRARIES);
    dae.push_str("\n  <library_geometries>");
    dae.push_str(&triangle_geometry("tri-mesh", "mat"));
    let _ = write!(
        dae,
        r##"
  </library_geometries>
  <library_visual_scenes>
    <visual_scene id="scene">
      <node id="Left" name="Left">
        <instance_geometry url="#tri-mesh">
          <bind_material><technique_common>
            <instance_material symbol="mat" target="#skin-material"/>
          </technique_common></bind_material>
        </instance_geometry>
      </node>
      <node id="Right" name="Right">
        <translate sid="location">2 0 0</translate>
        <instance_geometry url="#tri-mesh">
          <bind_material><technique_common>
            <instance_material symbol="mat" target="#skin-material"/>
          </technique_common></bind_material>
        </instance_geometry>
      </node>
    </visual_scene>
  </library_visual_scenes>
</COLLADA>"##
    );
    dae
}
