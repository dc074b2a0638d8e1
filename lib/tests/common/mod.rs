//! Fixture builders shared by the integration tests.
#![allow(dead_code)]

use std::io::{self, Cursor, Write};

use uuid::Uuid;
use xraylib::format::{
    chunk::{write_chunk, write_string_z},
    ogf::{
        VertexFormat, OGF_CHILDREN, OGF_HEADER, OGF_INDICES, OGF_SWIDATA, OGF_S_BONE_NAMES,
        OGF_S_IKDATA, OGF_TEXTURE, OGF_VERTEXFORMAT_FVF_2L, OGF_VERTICES,
    },
    scene::{
        objects::{
            ClassId, CHUNK_OBJECT_BODY, CHUNK_OBJECT_CLASS, CUSTOMOBJECT_CHUNK_FLAGS,
            CUSTOMOBJECT_CHUNK_NAME, CUSTOMOBJECT_CHUNK_TRANSFORM,
        },
        options::{CHUNK_LO_BOP, CHUNK_LO_NAMES, CHUNK_LO_VERSION},
        CHUNK_LEVELOP, CHUNK_LEVEL_TAG, CHUNK_OBJECT_COUNT, CHUNK_OBJECT_LIST, CHUNK_TOOLS_DATA,
        CHUNK_TOOLS_GUID, CHUNK_VERSION, TOOL_CHUNK_OBJECTS, TOOL_CHUNK_VERSION,
    },
};

pub type Writer = Cursor<Vec<u8>>;

pub fn build(cb: impl FnOnce(&mut Writer) -> io::Result<()>) -> Vec<u8> {
    let mut w = Cursor::new(Vec::new());
    cb(&mut w).unwrap();
    w.into_inner()
}

pub fn write_f32s(w: &mut Writer, values: &[f32]) -> io::Result<()> {
    for v in values {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

pub fn write_u32(w: &mut Writer, v: u32) -> io::Result<()> { w.write_all(&v.to_le_bytes()) }

pub fn write_u16(w: &mut Writer, v: u16) -> io::Result<()> { w.write_all(&v.to_le_bytes()) }

// OGF

/// Skinned vertex; the child's format decides how many bone slots and
/// explicit weights are written.
#[derive(Clone, Copy, Debug)]
pub struct Vertex {
    pub bones: [u32; 4],
    pub position: [f32; 3],
    pub weights: [f32; 3],
}

impl Vertex {
    /// Two-weight vertex: bone pair and first weight.
    pub fn at(x: f32, bones: [u16; 2], weight: f32) -> Self {
        Self::linked(x, &[bones[0].into(), bones[1].into()], &[weight])
    }

    pub fn linked(x: f32, bones: &[u32], weights: &[f32]) -> Self {
        let mut out = Self { bones: [0; 4], position: [x, 0.0, 0.0], weights: [0.0; 3] };
        out.bones[..bones.len()].copy_from_slice(bones);
        out.weights[..weights.len()].copy_from_slice(weights);
        out
    }

    fn write(&self, w: &mut Writer, format: VertexFormat) -> io::Result<()> {
        // normal, tangent, binormal
        const FRAME: [f32; 9] = [0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        const UV: [f32; 2] = [0.25, 0.75];
        let links = match format {
            VertexFormat::OneLink => {
                write_f32s(w, &self.position)?;
                write_f32s(w, &FRAME)?;
                write_f32s(w, &UV)?;
                return write_u32(w, self.bones[0]);
            }
            VertexFormat::TwoLink => 2,
            VertexFormat::ThreeLink => 3,
            VertexFormat::FourLink => 4,
        };
        for &bone in &self.bones[..links] {
            write_u16(w, bone as u16)?;
        }
        write_f32s(w, &self.position)?;
        write_f32s(w, &FRAME)?;
        write_f32s(w, &self.weights[..links - 1])?;
        write_f32s(w, &UV)
    }
}

#[derive(Clone, Debug)]
pub struct ChildFixture {
    pub format_tag: u32,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
    /// Slide windows as (first triangle, triangle count), base LOD first.
    pub windows: Option<Vec<(u32, u16)>>,
    /// (texture, shader)
    pub material: Option<(&'static str, &'static str)>,
}

impl ChildFixture {
    /// One triangle per three vertices, in order.
    pub fn triangles(vertices: Vec<Vertex>) -> Self {
        let indices = (0..vertices.len() as u16).collect();
        Self {
            format_tag: OGF_VERTEXFORMAT_FVF_2L,
            vertices,
            indices,
            windows: None,
            material: Some(("act\\act_stalker", "models\\model")),
        }
    }

    fn write(&self, w: &mut Writer) -> io::Result<()> {
        if let Some((texture, shader)) = self.material {
            write_chunk(w, OGF_TEXTURE, |w| {
                write_string_z(w, texture)?;
                write_string_z(w, shader)
            })?;
        }
        write_chunk(w, OGF_VERTICES, |w| {
            write_u32(w, self.format_tag)?;
            write_u32(w, self.vertices.len() as u32)?;
            // Unknown tags still get a two-link body
            let format = VertexFormat::from_tag(self.format_tag).unwrap_or(VertexFormat::TwoLink);
            for v in &self.vertices {
                v.write(w, format)?;
            }
            Ok(())
        })?;
        write_chunk(w, OGF_INDICES, |w| {
            write_u32(w, self.indices.len() as u32)?;
            for &i in &self.indices {
                write_u16(w, i)?;
            }
            Ok(())
        })?;
        if let Some(windows) = &self.windows {
            write_chunk(w, OGF_SWIDATA, |w| {
                w.write_all(&[0; 16])?;
                write_u32(w, windows.len() as u32)?;
                for &(offset, num_tris) in windows {
                    write_u32(w, offset)?;
                    write_u16(w, num_tris)?;
                    write_u16(w, num_tris * 3)?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct OgfFixture {
    pub model_type: u8,
    /// (name, parent) in file order.
    pub bones: Vec<(&'static str, &'static str)>,
    pub ik_version: u32,
    pub children: Vec<ChildFixture>,
}

impl Default for OgfFixture {
    fn default() -> Self {
        Self {
            model_type: 3,
            bones: vec![("root", ""), ("spine", "root")],
            ik_version: 1,
            children: vec![ChildFixture::triangles(vec![
                Vertex::at(0.0, [0, 1], 0.3),
                Vertex::at(1.0, [0, 1], 0.3),
                Vertex::at(2.0, [1, 0], 0.5),
            ])],
        }
    }
}

impl OgfFixture {
    pub fn build(&self) -> Vec<u8> { build(|w| self.write(w)) }

    fn write(&self, w: &mut Writer) -> io::Result<()> {
        write_chunk(w, OGF_HEADER, |w| {
            w.write_all(&[4, self.model_type])?;
            write_u16(w, 0)?;
            write_f32s(w, &[-1.0, -1.0, -1.0, 1.0, 1.0, 1.0])?;
            write_f32s(w, &[0.0, 0.0, 0.0, 2.0])
        })?;
        write_chunk(w, OGF_CHILDREN, |w| {
            for (i, child) in self.children.iter().enumerate() {
                write_chunk(w, i as u32, |w| child.write(w))?;
            }
            Ok(())
        })?;
        write_chunk(w, OGF_S_BONE_NAMES, |w| {
            write_u32(w, self.bones.len() as u32)?;
            for (name, parent) in &self.bones {
                write_string_z(w, name)?;
                write_string_z(w, parent)?;
                write_obb(w)?;
            }
            Ok(())
        })?;
        write_chunk(w, OGF_S_IKDATA, |w| {
            for (i, _) in self.bones.iter().enumerate() {
                write_u32(w, self.ik_version)?;
                write_string_z(w, "bones")?;
                // Shape: sphere
                write_u16(w, 2)?;
                write_u16(w, 0)?;
                write_obb(w)?;
                write_f32s(w, &[0.0, 0.0, 0.0, 0.5])?;
                write_f32s(w, &[0.0; 8])?;
                // Joint: rigid
                write_u32(w, 0)?;
                write_f32s(w, &[0.0; 12])?;
                write_f32s(w, &[1.0, 1.0])?;
                write_u32(w, 0)?;
                write_f32s(w, &[0.0, 0.0, 0.0])?;
                // Bind pose, mass, center of mass
                write_f32s(w, &[0.0, 0.0, 0.0])?;
                write_f32s(w, &[0.0, i as f32, 0.0])?;
                write_f32s(w, &[2.5])?;
                write_f32s(w, &[0.0, 0.0, 0.0])?;
            }
            Ok(())
        })
    }
}

fn write_obb(w: &mut Writer) -> io::Result<()> {
    write_f32s(w, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])?;
    write_f32s(w, &[0.0; 3])?;
    write_f32s(w, &[0.1; 3])
}

// Levels

pub fn guid(seed: u8) -> Uuid { Uuid::from_bytes_le([seed; 16]) }

/// One entry of an object list: class chunk, body with flags, name and
/// transform.
pub fn write_object(w: &mut Writer, index: u32, class: u32, name: &str) -> io::Result<()> {
    write_chunk(w, index, |w| {
        write_chunk(w, CHUNK_OBJECT_CLASS, |w| write_u32(w, class))?;
        write_chunk(w, CHUNK_OBJECT_BODY, |w| {
            write_chunk(w, CUSTOMOBJECT_CHUNK_FLAGS, |w| write_u32(w, 1))?;
            write_chunk(w, CUSTOMOBJECT_CHUNK_NAME, |w| write_string_z(w, name))?;
            write_chunk(w, CUSTOMOBJECT_CHUNK_TRANSFORM, |w| {
                write_f32s(w, &[index as f32, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0])
            })
        })
    })
}

pub fn write_object_list(w: &mut Writer, id: u32, objects: &[(u32, &str)]) -> io::Result<()> {
    write_chunk(w, id, |w| {
        for (i, (class, name)) in objects.iter().enumerate() {
            write_object(w, i as u32, *class, name)?;
        }
        Ok(())
    })
}

pub fn write_tool(w: &mut Writer, class: ClassId, objects: &[(u32, &str)]) -> io::Result<()> {
    write_chunk(w, CHUNK_TOOLS_DATA + class.id(), |w| {
        write_chunk(w, TOOL_CHUNK_VERSION, |w| write_u16(w, 0))?;
        write_object_list(w, TOOL_CHUNK_OBJECTS, objects)
    })
}

#[derive(Clone, Debug)]
pub struct LevelFixture {
    pub version: u32,
    pub guid: Uuid,
    pub with_options: bool,
    pub objects: Vec<(u32, &'static str)>,
    pub tools: Vec<(ClassId, Vec<(u32, &'static str)>)>,
}

impl Default for LevelFixture {
    fn default() -> Self {
        Self {
            version: 5,
            guid: guid(7),
            with_options: true,
            objects: Vec::new(),
            tools: Vec::new(),
        }
    }
}

impl LevelFixture {
    pub fn build(&self) -> Vec<u8> {
        build(|w| {
            write_chunk(w, CHUNK_VERSION, |w| write_u32(w, self.version))?;
            if self.with_options {
                write_chunk(w, CHUNK_LEVELOP, |w| {
                    write_chunk(w, CHUNK_LO_VERSION, |w| write_u32(w, 0xC))?;
                    write_chunk(w, CHUNK_LO_NAMES, |w| write_string_z(w, "levels\\test"))?;
                    write_chunk(w, CHUNK_LO_BOP, |w| write_string_z(w, ""))
                })?;
            }
            write_chunk(w, CHUNK_TOOLS_GUID, |w| w.write_all(&self.guid.to_bytes_le()))?;
            write_chunk(w, CHUNK_LEVEL_TAG, |w| {
                write_string_z(w, "tester")?;
                write_u32(w, 1_600_000_000)
            })?;
            write_chunk(w, CHUNK_OBJECT_COUNT, |w| write_u32(w, self.objects.len() as u32))?;
            write_object_list(w, CHUNK_OBJECT_LIST, &self.objects)?;
            for (class, objects) in &self.tools {
                write_tool(w, *class, objects)?;
            }
            Ok(())
        })
    }
}

/// Binary level part holding one tool section.
pub fn binary_part(guid: Uuid, class: ClassId, objects: &[(u32, &str)]) -> Vec<u8> {
    build(|w| {
        write_chunk(w, CHUNK_TOOLS_GUID, |w| w.write_all(&guid.to_bytes_le()))?;
        write_tool(w, class, objects)
    })
}

pub fn ltx_guid(guid: Uuid) -> String {
    let bytes = guid.to_bytes_le();
    let g0 = u64::from_le_bytes(bytes[..8].try_into().unwrap());
    let g1 = u64::from_le_bytes(bytes[8..].try_into().unwrap());
    format!("[guid]\nguid_g0 = {g0}\nguid_g1 = {g1}\n")
}

/// LTX level part; each object section gets `clsid`, `name` and a
/// position, followed by `extra` lines.
pub fn ltx_part(guid: Uuid, objects: &[(u32, &str, &str)]) -> String {
    let mut out = ltx_guid(guid);
    out += &format!("\n[main]\nversion = 0\nobject_count = {}\n", objects.len());
    for (i, (class, name, extra)) in objects.iter().enumerate() {
        out += &format!(
            "\n[main_object_{i}]\nclsid = {class}\nname = {name}\nposition = {i}, 0, 0\n{extra}"
        );
    }
    out
}

pub fn ltx_level(guid: Uuid) -> String {
    format!(
        "[version]\nvalue = 5\n\n{}\n[level_tag]\nowner = tester\ncreate_time = 1600000000\n\n\
         [level_options]\nversion = 12\nlevel_path = levels\\test\nlevel_prefix = test\n\
         bop = \"\"\nmap_version = 1.2\nusage_deathmatch = on\n",
        ltx_guid(guid)
    )
}
