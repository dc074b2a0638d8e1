pub mod chunk;
pub mod ltx;
pub mod ogf;
pub mod scene;
pub mod way;

use binrw::binrw;
use serde_derive::Serialize;

#[binrw]
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Vector2f {
    pub x: f32,
    pub y: f32,
}

#[binrw]
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Vector3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3f {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self { Self { x, y, z } }
}

impl From<Vector3f> for mint::Vector3<f32> {
    fn from(v: Vector3f) -> Self { mint::Vector3 { x: v.x, y: v.y, z: v.z } }
}

/// Row-major 3x3 rotation (`i`, `j`, `k` axes).
#[binrw]
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Matrix33f {
    pub i: Vector3f,
    pub j: Vector3f,
    pub k: Vector3f,
}

impl Default for Matrix33f {
    fn default() -> Self {
        Self {
            i: Vector3f::new(1.0, 0.0, 0.0),
            j: Vector3f::new(0.0, 1.0, 0.0),
            k: Vector3f::new(0.0, 0.0, 1.0),
        }
    }
}

/// Oriented bounding box.
#[binrw]
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Obb {
    pub rotate: Matrix33f,
    pub translate: Vector3f,
    pub halfsize: Vector3f,
}

#[binrw]
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Sphere {
    pub center: Vector3f,
    pub radius: f32,
}

#[binrw]
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Cylinder {
    pub center: Vector3f,
    pub direction: Vector3f,
    pub height: f32,
    pub radius: f32,
}

#[binrw]
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Aabb {
    pub min: Vector3f,
    pub max: Vector3f,
}
