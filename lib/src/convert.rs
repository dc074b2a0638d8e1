//! Flattening of decoded OGF models into host-neutral skeletal imports.
//!
//! X-Ray is left-handed, Y-up, in metres. Imports are right-handed, Z-up,
//! in centimetres: `(x, y, z)` becomes `(-x, z, y) * 100`.

use mint::{Quaternion, Vector2, Vector3};
use serde_derive::Serialize;

use crate::{
    error::{Error, Result},
    format::{
        ogf::{MaterialRef, MeshVertex, OgfModel},
        Vector3f,
    },
    skeleton::Skeleton,
};

/// Metres to centimetres.
pub const UNIT_SCALE: f32 = 100.0;

#[derive(Clone, Debug, Serialize)]
pub struct ImportBone {
    pub name: String,
    /// Index into [`SkeletalImport::bones`]; bones are root-first.
    pub parent: Option<usize>,
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Wedge {
    pub position: Vector3<f32>,
    pub normal: Vector3<f32>,
    pub uv: Vector2<f32>,
    /// (normalized bone index, weight)
    pub influences: Vec<(usize, f32)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ImportSection {
    /// Slot name, `Mat_<element index>`.
    pub material_slot: String,
    pub material: MaterialRef,
    /// Three wedges per triangle.
    pub wedges: Vec<Wedge>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SkeletalImport {
    pub bones: Vec<ImportBone>,
    pub sections: Vec<ImportSection>,
}

impl SkeletalImport {
    pub fn triangle_count(&self) -> usize {
        self.sections.iter().map(|s| s.wedges.len() / 3).sum()
    }
}

#[inline]
pub fn convert_position(v: Vector3f) -> Vector3<f32> {
    Vector3 { x: -v.x * UNIT_SCALE, y: v.z * UNIT_SCALE, z: v.y * UNIT_SCALE }
}

#[inline]
pub fn convert_direction(v: Vector3f) -> Vector3<f32> { Vector3 { x: -v.x, y: v.z, z: v.y } }

/// Rotation matrix rows (`i`, `j`, `k`) from heading, pitch and bank.
fn hpb_matrix(h: f32, p: f32, b: f32) -> [[f32; 3]; 3] {
    let (sh, ch) = h.sin_cos();
    let (sp, cp) = p.sin_cos();
    let (sb, cb) = b.sin_cos();
    let cc = ch * cb;
    let cs = ch * sb;
    let sc = sh * cb;
    let ss = sh * sb;
    [
        [cc - sp * ss, -cp * sb, sp * cs + sc],
        [sp * sc + cs, cp * cb, ss - sp * cc],
        [-cp * sh, sp, cp * ch],
    ]
}

/// Inverse XYZ euler rotation, as bind rotations are stored.
pub fn xyzi_matrix(r: Vector3f) -> [[f32; 3]; 3] { hpb_matrix(-r.y, -r.x, -r.z) }

fn matrix_to_quaternion(m: [[f32; 3]; 3]) -> Quaternion<f32> {
    let trace = m[0][0] + m[1][1] + m[2][2];
    let (x, y, z, w);
    if trace > 0.0 {
        let s = (trace + 1.0).sqrt();
        w = s * 0.5;
        let s = 0.5 / s;
        x = (m[1][2] - m[2][1]) * s;
        y = (m[2][0] - m[0][2]) * s;
        z = (m[0][1] - m[1][0]) * s;
    } else if m[0][0] >= m[1][1] && m[0][0] >= m[2][2] {
        let s = (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt();
        x = s * 0.5;
        let s = 0.5 / s;
        y = (m[0][1] + m[1][0]) * s;
        z = (m[0][2] + m[2][0]) * s;
        w = (m[1][2] - m[2][1]) * s;
    } else if m[1][1] >= m[2][2] {
        let s = (1.0 + m[1][1] - m[0][0] - m[2][2]).sqrt();
        y = s * 0.5;
        let s = 0.5 / s;
        x = (m[0][1] + m[1][0]) * s;
        z = (m[1][2] + m[2][1]) * s;
        w = (m[2][0] - m[0][2]) * s;
    } else {
        let s = (1.0 + m[2][2] - m[0][0] - m[1][1]).sqrt();
        z = s * 0.5;
        let s = 0.5 / s;
        x = (m[0][2] + m[2][0]) * s;
        y = (m[1][2] + m[2][1]) * s;
        w = (m[0][1] - m[1][0]) * s;
    }
    Quaternion { v: Vector3 { x, y, z }, s: w }
}

/// Host rotation for an X-Ray bind rotation.
pub fn convert_rotation(r: Vector3f) -> Quaternion<f32> {
    let q = matrix_to_quaternion(xyzi_matrix(r));
    Quaternion { v: Vector3 { x: q.v.x, y: -q.v.z, z: -q.v.y }, s: q.s }
}

/// Builds the host import record: root-first bones in host space and one
/// section per non-empty mesh element.
pub fn skeletal_import(model: &OgfModel) -> Result<SkeletalImport> {
    let skeleton = Skeleton::from_bones(&model.bones)?;
    let remap = skeleton.remap();

    let bones = skeleton
        .order
        .iter()
        .zip(&skeleton.parents)
        .map(|(&i, &parent)| {
            let bone = &model.bones[i];
            ImportBone {
                name: bone.name.clone(),
                parent,
                position: convert_position(bone.bind_translation),
                rotation: convert_rotation(bone.bind_rotation),
            }
        })
        .collect();

    let mut sections = Vec::new();
    for (index, element) in model.elements.iter().enumerate() {
        if element.vertices.is_empty() {
            log::debug!("Skipping empty mesh element {index}");
            continue;
        }
        let wedges = element
            .vertices
            .chunks_exact(3)
            .flat_map(|tri| [&tri[0], &tri[2], &tri[1]])
            .map(|v| wedge(v, &remap))
            .collect::<Result<Vec<_>>>()?;
        sections.push(ImportSection {
            material_slot: format!("Mat_{index}"),
            material: element.material.clone(),
            wedges,
        });
    }
    Ok(SkeletalImport { bones, sections })
}

fn wedge(v: &MeshVertex, remap: &[usize]) -> Result<Wedge> {
    let influences = v
        .influences()
        .map(|(bone, weight)| {
            remap.get(bone as usize).map(|&b| (b, weight)).ok_or_else(|| {
                Error::malformed(format!("vertex references bone {bone} of {}", remap.len()))
            })
        })
        .collect::<Result<_>>()?;
    Ok(Wedge {
        position: convert_position(v.position),
        normal: convert_direction(v.normal),
        uv: Vector2 { x: v.uv.x, y: v.uv.y },
        influences,
    })
}
