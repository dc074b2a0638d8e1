use std::collections::HashMap;

use binrw::binrw;
use serde_derive::Serialize;
use strum::FromRepr;

use crate::{
    error::{Error, Result},
    format::{chunk::ChunkReader, Aabb, Cylinder, Obb, Sphere, Vector2f, Vector3f},
};

// Model header
pub const OGF_HEADER: u32 = 0x1;
// Material reference
pub const OGF_TEXTURE: u32 = 0x2;
// Vertex buffer
pub const OGF_VERTICES: u32 = 0x3;
// Index buffer
pub const OGF_INDICES: u32 = 0x4;
// Slide window (progressive LOD) data
pub const OGF_SWIDATA: u32 = 0x6;
// Mesh children
pub const OGF_CHILDREN: u32 = 0x9;
// Bone names and parents
pub const OGF_S_BONE_NAMES: u32 = 0xD;
// Per-bone IK and shape data
pub const OGF_S_IKDATA: u32 = 0x10;

/// The only accepted per-bone IK record version.
pub const OGF_IKDATA_VERSION: u32 = 1;

const FVF_BASE: u32 = 0x1207_1980;
pub const OGF_VERTEXFORMAT_FVF_1L: u32 = FVF_BASE;
pub const OGF_VERTEXFORMAT_FVF_2L: u32 = 2 * FVF_BASE;
pub const OGF_VERTEXFORMAT_FVF_3L: u32 = 4 * FVF_BASE;
pub const OGF_VERTEXFORMAT_FVF_4L: u32 = 5 * FVF_BASE;

/// Bone slot not in use.
pub const BONE_NONE: u16 = 0xFFFF;

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromRepr, Serialize)]
#[repr(u8)]
pub enum ModelType {
    Normal = 0,
    Hierarchy = 1,
    Progressive = 2,
    SkeletonAnim = 3,
    SkeletonGeomdefPm = 4,
    SkeletonGeomdefSt = 5,
    Lod = 6,
    TreeSt = 7,
    ParticleEffect = 8,
    ParticleGroup = 9,
    SkeletonRigid = 10,
    TreePm = 11,
}

#[binrw]
#[derive(Clone, Debug, Serialize)]
pub struct OgfHeader {
    pub format_version: u8,
    pub model_type: u8,
    pub shader_id: u16,
    pub bbox: Aabb,
    pub bsphere: Sphere,
}

impl OgfHeader {
    pub fn model_type(&self) -> Option<ModelType> { ModelType::from_repr(self.model_type) }
}

#[binrw]
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct JointLimit {
    pub limit: Vector2f,
    pub spring_factor: f32,
    pub damping_factor: f32,
}

#[binrw]
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct JointIk {
    pub joint_type: u32,
    pub limits: [JointLimit; 3],
    pub spring_factor: f32,
    pub damping_factor: f32,
    pub ik_flags: u32,
    pub break_force: f32,
    pub break_torque: f32,
    pub friction: f32,
}

impl Default for JointIk {
    fn default() -> Self {
        Self {
            // jtNone
            joint_type: 4,
            limits: [JointLimit::default(); 3],
            spring_factor: 1.0,
            damping_factor: 1.0,
            ik_flags: 0,
            break_force: 0.0,
            break_torque: 0.0,
            friction: 0.0,
        }
    }
}

/// On-disk bone shape: all three geometries are stored, `ty` selects one.
#[binrw]
#[derive(Clone, Debug)]
struct RawBoneShape {
    ty: u16,
    flags: u16,
    obb: Obb,
    sphere: Sphere,
    cylinder: Cylinder,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub enum ShapeKind {
    #[default]
    None,
    Box(Obb),
    Sphere(Sphere),
    Cylinder(Cylinder),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct BoneShape {
    pub kind: ShapeKind,
    pub flags: u16,
}

impl TryFrom<RawBoneShape> for BoneShape {
    type Error = Error;

    fn try_from(raw: RawBoneShape) -> Result<Self> {
        let kind = match raw.ty {
            0 => ShapeKind::None,
            1 => ShapeKind::Box(raw.obb),
            2 => ShapeKind::Sphere(raw.sphere),
            3 => ShapeKind::Cylinder(raw.cylinder),
            ty => return Err(Error::UnsupportedFormat(format!("bone shape type {ty}"))),
        };
        Ok(Self { kind, flags: raw.flags })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BoneRecord {
    pub id: usize,
    pub name: String,
    /// Raw parent name; empty for the root.
    pub parent: String,
    pub parent_id: Option<usize>,
    pub obb: Obb,
    pub game_material: String,
    pub shape: BoneShape,
    pub ik: JointIk,
    /// XYZ euler angles in radians.
    pub bind_rotation: Vector3f,
    pub bind_translation: Vector3f,
    pub mass: f32,
    pub center_of_mass: Vector3f,
}

impl BoneRecord {
    /// A bone with default physical data and an unresolved parent.
    pub fn new(id: usize, name: String, parent: String, obb: Obb) -> Self {
        Self {
            id,
            name,
            parent,
            parent_id: None,
            obb,
            game_material: String::new(),
            shape: BoneShape::default(),
            ik: JointIk::default(),
            bind_rotation: Vector3f::ZERO,
            bind_translation: Vector3f::ZERO,
            mass: 10.0,
            center_of_mass: Vector3f::ZERO,
        }
    }

    fn reset_physics(&mut self) {
        let Self { id, name, parent, parent_id, obb, .. } = self.clone();
        *self = Self { parent_id, ..Self::new(id, name, parent, obb) };
    }

    #[inline]
    pub fn is_root(&self) -> bool { self.parent_id.is_none() }
}

#[derive(Clone, Debug, Serialize)]
pub struct MeshVertex {
    pub position: Vector3f,
    pub normal: Vector3f,
    pub uv: Vector2f,
    pub bones: [u16; 4],
    pub weights: [f32; 4],
}

impl MeshVertex {
    /// Bone slots in use.
    pub fn influences(&self) -> impl Iterator<Item = (u16, f32)> + '_ {
        self.bones
            .iter()
            .zip(&self.weights)
            .take_while(|(bone, _)| **bone != BONE_NONE)
            .map(|(&bone, &weight)| (bone, weight))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MaterialRef {
    pub shader: String,
    pub texture: String,
}

impl Default for MaterialRef {
    fn default() -> Self { Self { shader: "default".into(), texture: "unknown".into() } }
}

#[binrw]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlideWindow {
    /// First triangle of the window.
    pub offset: u32,
    pub num_tris: u16,
    pub num_verts: u16,
}

#[derive(Clone, Debug, Serialize)]
pub struct MeshElement {
    pub material: MaterialRef,
    /// One vertex per index, three per triangle.
    pub vertices: Vec<MeshVertex>,
    pub slide_window: Option<SlideWindow>,
}

impl MeshElement {
    #[inline]
    pub fn triangle_count(&self) -> usize { self.vertices.len() / 3 }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum VertexFormat {
    OneLink,
    TwoLink,
    ThreeLink,
    FourLink,
}

impl VertexFormat {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            OGF_VERTEXFORMAT_FVF_1L | 1 => Some(Self::OneLink),
            OGF_VERTEXFORMAT_FVF_2L | 2 => Some(Self::TwoLink),
            OGF_VERTEXFORMAT_FVF_3L | 3 => Some(Self::ThreeLink),
            OGF_VERTEXFORMAT_FVF_4L | 4 => Some(Self::FourLink),
            _ => None,
        }
    }

    /// On-disk record size.
    pub fn stride(self) -> usize {
        match self {
            Self::OneLink => 60,
            Self::TwoLink => 64,
            Self::ThreeLink => 70,
            Self::FourLink => 76,
        }
    }
}

/// Fixed-size skinned vertex record.
trait SkinnedVertex {
    fn to_mesh_vertex(&self, bone_count: usize) -> Result<MeshVertex>;
}

/// Fills bone slots and derives the last weight as the remainder.
///
/// Every slot the record defines must name a bone of the skeleton.
fn skin<const N: usize>(
    bones: [u32; N],
    explicit: &[f32],
    bone_count: usize,
) -> Result<([u16; 4], [f32; 4])> {
    debug_assert_eq!(explicit.len() + 1, N);
    let mut out_bones = [BONE_NONE; 4];
    let mut out_weights = [0.0f32; 4];
    for (slot, &bone) in out_bones.iter_mut().zip(&bones) {
        *slot = u16::try_from(bone)
            .ok()
            .filter(|&b| b != BONE_NONE && (b as usize) < bone_count)
            .ok_or_else(|| {
                Error::malformed_chunk(
                    format!("vertex references bone {bone} of {bone_count}"),
                    OGF_VERTICES,
                )
            })?;
    }
    out_weights[..N - 1].copy_from_slice(explicit);
    out_weights[N - 1] = 1.0 - explicit.iter().sum::<f32>();
    Ok((out_bones, out_weights))
}

#[binrw]
#[derive(Clone, Debug)]
struct VertexBoned1W {
    p: Vector3f,
    n: Vector3f,
    t: Vector3f,
    b: Vector3f,
    uv: Vector2f,
    matrix: u32,
}

impl SkinnedVertex for VertexBoned1W {
    fn to_mesh_vertex(&self, bone_count: usize) -> Result<MeshVertex> {
        let (bones, weights) = skin([self.matrix], &[], bone_count)?;
        Ok(MeshVertex { position: self.p, normal: self.n, uv: self.uv, bones, weights })
    }
}

#[binrw]
#[derive(Clone, Debug)]
struct VertexBoned2W {
    m: [u16; 2],
    p: Vector3f,
    n: Vector3f,
    t: Vector3f,
    b: Vector3f,
    w: f32,
    uv: Vector2f,
}

impl SkinnedVertex for VertexBoned2W {
    fn to_mesh_vertex(&self, bone_count: usize) -> Result<MeshVertex> {
        let (bones, weights) = skin(self.m.map(u32::from), &[self.w], bone_count)?;
        Ok(MeshVertex { position: self.p, normal: self.n, uv: self.uv, bones, weights })
    }
}

#[binrw]
#[derive(Clone, Debug)]
struct VertexBoned3W {
    m: [u16; 3],
    p: Vector3f,
    n: Vector3f,
    t: Vector3f,
    b: Vector3f,
    w: [f32; 2],
    uv: Vector2f,
}

impl SkinnedVertex for VertexBoned3W {
    fn to_mesh_vertex(&self, bone_count: usize) -> Result<MeshVertex> {
        let (bones, weights) = skin(self.m.map(u32::from), &self.w, bone_count)?;
        Ok(MeshVertex { position: self.p, normal: self.n, uv: self.uv, bones, weights })
    }
}

#[binrw]
#[derive(Clone, Debug)]
struct VertexBoned4W {
    m: [u16; 4],
    p: Vector3f,
    n: Vector3f,
    t: Vector3f,
    b: Vector3f,
    w: [f32; 3],
    uv: Vector2f,
}

impl SkinnedVertex for VertexBoned4W {
    fn to_mesh_vertex(&self, bone_count: usize) -> Result<MeshVertex> {
        let (bones, weights) = skin(self.m.map(u32::from), &self.w, bone_count)?;
        Ok(MeshVertex { position: self.p, normal: self.n, uv: self.uv, bones, weights })
    }
}

/// Reads the vertex pool and emits one vertex per index.
fn expand<V>(
    r: &mut ChunkReader,
    count: usize,
    indices: &[u16],
    bone_count: usize,
) -> Result<Vec<MeshVertex>>
where
    V: SkinnedVertex + for<'b> binrw::BinRead<Args<'b> = ()>,
{
    let pool = r
        .read_vec::<V>(count)?
        .iter()
        .map(|v| v.to_mesh_vertex(bone_count))
        .collect::<Result<Vec<_>>>()?;
    indices
        .iter()
        .map(|&idx| {
            pool.get(idx as usize).cloned().ok_or_else(|| {
                Error::malformed(format!("index {idx} outside vertex pool of {count}"))
            })
        })
        .collect()
}

#[derive(Copy, Clone, Debug, Default)]
pub struct OgfOptions {
    /// Substitute default physical data when the IK block has an
    /// unsupported version instead of failing.
    pub ik_fallback: bool,
}

/// Decoded skeletal OGF.
#[derive(Clone, Debug, Serialize)]
pub struct OgfModel {
    pub header: OgfHeader,
    pub bones: Vec<BoneRecord>,
    pub elements: Vec<MeshElement>,
}

impl OgfModel {
    pub fn decode(data: &[u8], options: &OgfOptions) -> Result<Self> {
        let mut file = ChunkReader::new(data);

        file.expect_chunk(OGF_HEADER, "OGF header")?;
        let header: OgfHeader = file.read_type().map_err(|e| e.in_chunk(OGF_HEADER))?;
        match header.model_type() {
            Some(ModelType::SkeletonAnim | ModelType::SkeletonRigid) => {}
            _ => {
                return Err(Error::UnsupportedFormat(format!(
                    "OGF model type {:#X}",
                    header.model_type
                )))
            }
        }
        log::debug!(
            "OGF v{} type {:?} shader {}",
            header.format_version,
            header.model_type(),
            header.shader_id
        );

        let mut bones = read_bone_names(&mut file)?;
        let ik = file.require_chunk(OGF_S_IKDATA, "IK data")?;
        match read_ik_data(ik, &mut bones) {
            Ok(()) => {}
            Err(Error::UnsupportedVersion { found, .. }) if options.ik_fallback => {
                log::warn!("IK data version {found} unsupported, using default bone physics");
                bones.iter_mut().for_each(BoneRecord::reset_physics);
            }
            Err(e) => return Err(e.in_chunk(OGF_S_IKDATA)),
        }

        let children = file.require_chunk(OGF_CHILDREN, "mesh children")?;
        let mut streams = Vec::new();
        let mut materials = Vec::new();
        let mut windows = Vec::new();
        for (index, mut child) in children.list().enumerate() {
            let (vertices, window) = read_child_geometry(&mut child, bones.len())
                .map_err(|e| e.in_chunk(index as u32))?;
            streams.push(vertices);
            windows.push(window);
            materials.push(read_child_material(&mut child)?);
        }
        if streams.len() != materials.len() {
            return Err(Error::Internal(format!(
                "{} mesh elements but {} materials",
                streams.len(),
                materials.len()
            )));
        }

        let elements: Vec<MeshElement> = streams
            .into_iter()
            .zip(materials)
            .zip(windows)
            .map(|((vertices, material), slide_window)| MeshElement {
                material,
                vertices,
                slide_window,
            })
            .collect();
        log::debug!("Decoded {} bones, {} mesh elements", bones.len(), elements.len());
        Ok(Self { header, bones, elements })
    }

    pub fn materials(&self) -> impl Iterator<Item = &MaterialRef> {
        self.elements.iter().map(|e| &e.material)
    }

    pub fn find_bone(&self, name: &str) -> Option<&BoneRecord> {
        self.bones.iter().find(|b| b.name.eq_ignore_ascii_case(name))
    }
}

fn read_bone_names(file: &mut ChunkReader) -> Result<Vec<BoneRecord>> {
    file.expect_chunk(OGF_S_BONE_NAMES, "bone names")?;
    let count = file.read_u32()? as usize;
    if count >= BONE_NONE as usize {
        return Err(Error::malformed_chunk(format!("bone count {count}"), OGF_S_BONE_NAMES));
    }

    let mut bones = Vec::with_capacity(count.min(file.remaining()));
    let mut by_name = HashMap::with_capacity(count);
    for id in 0..count {
        let name = file.read_name_z()?;
        let parent = file.read_name_z()?;
        let obb: Obb = file.read_type()?;
        if by_name.insert(name.clone(), id).is_some() {
            return Err(Error::malformed_chunk(
                format!("duplicate bone name '{name}'"),
                OGF_S_BONE_NAMES,
            ));
        }
        bones.push(BoneRecord::new(id, name, parent, obb));
    }

    for bone in &mut bones {
        if bone.parent.is_empty() {
            continue;
        }
        match by_name.get(&bone.parent) {
            Some(&parent_id) => bone.parent_id = Some(parent_id),
            None => {
                return Err(Error::malformed_chunk(
                    format!("bone '{}' has unknown parent '{}'", bone.name, bone.parent),
                    OGF_S_BONE_NAMES,
                ))
            }
        }
    }
    Ok(bones)
}

fn read_ik_data(mut ik: ChunkReader, bones: &mut [BoneRecord]) -> Result<()> {
    for bone in bones {
        let version = ik.read_u32()?;
        if version != OGF_IKDATA_VERSION {
            return Err(Error::UnsupportedVersion {
                what: "bone IK data",
                expected: OGF_IKDATA_VERSION,
                found: version,
            });
        }
        bone.game_material = ik.read_string_z()?;
        bone.shape = ik.read_type::<RawBoneShape>()?.try_into()?;
        bone.ik = ik.read_type()?;
        bone.bind_rotation = ik.read_vec3()?;
        bone.bind_translation = ik.read_vec3()?;
        bone.mass = ik.read_f32()?;
        bone.center_of_mass = ik.read_vec3()?;
    }
    Ok(())
}

fn read_child_geometry(
    child: &mut ChunkReader,
    bone_count: usize,
) -> Result<(Vec<MeshVertex>, Option<SlideWindow>)> {
    child.expect_chunk(OGF_INDICES, "index buffer")?;
    let index_count = child.read_u32()? as usize;
    let indices: Vec<u16> = child.read_vec(index_count)?;
    if index_count % 3 != 0 {
        return Err(Error::malformed_chunk(format!("{index_count} indices"), OGF_INDICES));
    }

    child.expect_chunk(OGF_VERTICES, "vertex buffer")?;
    let tag = child.read_u32()?;
    let vertex_count = child.read_u32()? as usize;
    let format = VertexFormat::from_tag(tag)
        .ok_or_else(|| Error::UnsupportedFormat(format!("vertex format {tag:#X}")))?;
    let mut vertices = match format {
        VertexFormat::OneLink => {
            expand::<VertexBoned1W>(child, vertex_count, &indices, bone_count)?
        }
        VertexFormat::TwoLink => {
            expand::<VertexBoned2W>(child, vertex_count, &indices, bone_count)?
        }
        VertexFormat::ThreeLink => {
            expand::<VertexBoned3W>(child, vertex_count, &indices, bone_count)?
        }
        VertexFormat::FourLink => {
            expand::<VertexBoned4W>(child, vertex_count, &indices, bone_count)?
        }
    };

    let window = match child.open_chunk(OGF_SWIDATA) {
        Some(mut swi) => read_slide_window(&mut swi).map_err(|e| e.in_chunk(OGF_SWIDATA))?,
        None => None,
    };
    if let Some(window) = window {
        vertices = apply_slide_window(vertices, window)?;
    }
    Ok((vertices, window))
}

fn read_slide_window(swi: &mut ChunkReader) -> Result<Option<SlideWindow>> {
    // Reserved
    swi.read_bytes(16)?;
    let count = swi.read_u32()? as usize;
    let windows: Vec<SlideWindow> = swi.read_vec(count)?;
    if windows.len() > 1 {
        log::debug!("Using base LOD window, ignoring {} more", windows.len() - 1);
    }
    let first = windows.first().copied();
    if first.is_none() {
        log::warn!("Slide window record without windows, keeping whole element");
    }
    Ok(first)
}

/// Keeps triangles `[offset, offset + num_tris)` of a flat triangle stream.
pub fn apply_slide_window(
    mut vertices: Vec<MeshVertex>,
    window: SlideWindow,
) -> Result<Vec<MeshVertex>> {
    let start = window.offset as usize * 3;
    let end = start + window.num_tris as usize * 3;
    if end > vertices.len() {
        return Err(Error::malformed_chunk(
            format!(
                "slide window triangles {}..{} outside {} triangles",
                window.offset,
                end / 3,
                vertices.len() / 3
            ),
            OGF_SWIDATA,
        ));
    }
    vertices.truncate(end);
    vertices.drain(..start);
    Ok(vertices)
}

fn read_child_material(child: &mut ChunkReader) -> Result<MaterialRef> {
    if !child.find_chunk(OGF_TEXTURE) {
        return Ok(MaterialRef::default());
    }
    let texture = child.read_string_z().map_err(|e| e.in_chunk(OGF_TEXTURE))?;
    let shader = child.read_string_z().map_err(|e| e.in_chunk(OGF_TEXTURE))?;
    Ok(MaterialRef { shader, texture })
}
