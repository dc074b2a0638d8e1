use std::{collections::BTreeMap, fmt};

use indexmap::IndexMap;
use serde_derive::Serialize;
use strum::{EnumIter, FromRepr, IntoEnumIterator, IntoStaticStr};

use crate::{
    error::{Error, Result},
    format::{chunk::ChunkReader, ltx::Ltx, way, Vector3f},
    way::WayGraph,
};

pub const CHUNK_OBJECT_CLASS: u32 = 0x7703;
pub const CHUNK_OBJECT_BODY: u32 = 0x7777;

pub const CUSTOMOBJECT_CHUNK_TRANSFORM: u32 = 0xF903;
pub const CUSTOMOBJECT_CHUNK_FLAGS: u32 = 0xF906;
pub const CUSTOMOBJECT_CHUNK_NAME: u32 = 0xF907;

/// Keys of an LTX object section read into [`SceneObject`] itself.
const LTX_COMMON_KEYS: [&str; 6] = ["clsid", "co_flags", "name", "position", "rotation", "scale"];

/// Scene tool / object class. The string form is the tool name used for
/// level part files.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, FromRepr, EnumIter, IntoStaticStr, Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum ClassId {
    Group = 0,
    Glow = 1,
    SceneObject = 2,
    Light = 3,
    Shape = 4,
    SoundSrc = 5,
    Spawn = 6,
    Way = 7,
    Sector = 8,
    Portal = 9,
    SoundEnv = 10,
    Ps = 11,
    DetailObject = 12,
    AiMap = 13,
    Wallmark = 14,
    FogVol = 15,
}

impl ClassId {
    #[inline]
    pub fn id(self) -> u32 { self as u32 }

    #[inline]
    pub fn tool_name(self) -> &'static str { self.into() }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.tool_name()) }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Transform {
    pub position: Vector3f,
    /// Euler angles, radians.
    pub rotation: Vector3f,
    pub scale: Vector3f,
}

impl Default for Transform {
    fn default() -> Self {
        Self { position: Vector3f::ZERO, rotation: Vector3f::ZERO, scale: Vector3f::new(1.0, 1.0, 1.0) }
    }
}

#[derive(Clone, Debug, Serialize)]
pub enum ObjectBody {
    Way(WayGraph),
    /// Undecoded body chunk payload.
    Raw(Vec<u8>),
    /// Class-specific keys of an LTX object section.
    Properties(IndexMap<String, String>),
}

/// Where an object body is decoded from.
#[derive(Clone, Debug)]
pub enum BodySource<'a> {
    Chunk(ChunkReader<'a>),
    Ltx { ltx: &'a Ltx, section: &'a str },
}

pub type BodyDecoder = fn(BodySource) -> Result<ObjectBody>;

/// Keeps the body without interpreting it.
pub fn opaque_body(source: BodySource) -> Result<ObjectBody> {
    match source {
        BodySource::Chunk(r) => Ok(ObjectBody::Raw(r.data().to_vec())),
        BodySource::Ltx { ltx, section } => {
            let props = ltx
                .section(section)
                .map(|s| {
                    s.iter()
                        .filter(|(k, _)| !LTX_COMMON_KEYS.contains(k))
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            Ok(ObjectBody::Properties(props))
        }
    }
}

/// Class id to body decoder table.
#[derive(Clone, Debug)]
pub struct ClassRegistry {
    decoders: BTreeMap<ClassId, BodyDecoder>,
}

impl Default for ClassRegistry {
    /// Every known class; way objects get their graph decoded.
    fn default() -> Self {
        let mut registry = Self::empty();
        for class in ClassId::iter() {
            registry.register(class, opaque_body);
        }
        registry.register(ClassId::Way, way::decode_body);
        registry
    }
}

impl ClassRegistry {
    pub fn empty() -> Self { Self { decoders: BTreeMap::new() } }

    pub fn register(&mut self, class: ClassId, decoder: BodyDecoder) {
        self.decoders.insert(class, decoder);
    }

    pub fn unregister(&mut self, class: ClassId) { self.decoders.remove(&class); }

    /// Looks up a raw class id.
    pub fn decoder(&self, id: u32) -> Result<(ClassId, BodyDecoder)> {
        ClassId::from_repr(id)
            .and_then(|class| self.decoders.get(&class).map(|&d| (class, d)))
            .ok_or(Error::UnknownClass(id))
    }

    /// Registered classes in id order.
    pub fn classes(&self) -> impl Iterator<Item = ClassId> + '_ { self.decoders.keys().copied() }
}

#[derive(Clone, Debug, Serialize)]
pub struct SceneObject {
    pub class: ClassId,
    pub name: String,
    pub flags: u32,
    pub transform: Transform,
    pub body: ObjectBody,
}

impl SceneObject {
    /// Decodes one entry of a binary object list: a class chunk and a
    /// body chunk.
    pub fn read(entry: &ChunkReader, registry: &ClassRegistry) -> Result<Self> {
        let mut r = entry.clone();
        let class_id = r
            .r_chunk_u32(CHUNK_OBJECT_CLASS)?
            .ok_or_else(|| Error::malformed_chunk("missing object class", CHUNK_OBJECT_CLASS))?;
        let (class, decoder) = registry.decoder(class_id)?;

        let mut body = r.require_chunk(CHUNK_OBJECT_BODY, "object body")?;
        let flags = body.r_chunk_u32(CUSTOMOBJECT_CHUNK_FLAGS)?.unwrap_or(0);
        body.expect_chunk(CUSTOMOBJECT_CHUNK_NAME, "object name")?;
        let name = body.read_string_z().map_err(|e| e.in_chunk(CUSTOMOBJECT_CHUNK_NAME))?;
        let mut transform = Transform::default();
        if body.find_chunk(CUSTOMOBJECT_CHUNK_TRANSFORM) {
            let mut read = || -> Result<Transform> {
                Ok(Transform {
                    position: body.read_vec3()?,
                    rotation: body.read_vec3()?,
                    scale: body.read_vec3()?,
                })
            };
            transform = read().map_err(|e| e.in_chunk(CUSTOMOBJECT_CHUNK_TRANSFORM))?;
        }

        let body = decoder(BodySource::Chunk(ChunkReader::new(body.data())))
            .map_err(|e| e.in_chunk(CHUNK_OBJECT_BODY))?;
        Ok(Self { class, name, flags, transform, body })
    }

    /// Decodes an object section of an LTX level part.
    pub fn read_ltx(ltx: &Ltx, section: &str, registry: &ClassRegistry) -> Result<Self> {
        let (class, decoder) = registry.decoder(ltx.r_u32(section, "clsid")?)?;
        let flags =
            if ltx.line_exist(section, "co_flags") { ltx.r_u32(section, "co_flags")? } else { 0 };
        let name = ltx.r_string(section, "name")?.to_string();
        let mut transform = Transform::default();
        if ltx.line_exist(section, "position") {
            transform.position = ltx.r_vec3(section, "position")?;
        }
        if ltx.line_exist(section, "rotation") {
            transform.rotation = ltx.r_vec3(section, "rotation")?;
        }
        if ltx.line_exist(section, "scale") {
            transform.scale = ltx.r_vec3(section, "scale")?;
        }
        let body = decoder(BodySource::Ltx { ltx, section })?;
        Ok(Self { class, name, flags, transform, body })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub class: ClassId,
    pub old: String,
    pub new: String,
}

/// Objects of a scene; names are unique per class (case-insensitive).
#[derive(Clone, Debug, Default, Serialize)]
pub struct ObjectList {
    objects: Vec<SceneObject>,
}

impl ObjectList {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.objects.len() }

    pub fn is_empty(&self) -> bool { self.objects.is_empty() }

    pub fn get(&self, index: usize) -> Option<&SceneObject> { self.objects.get(index) }

    pub fn iter(&self) -> impl Iterator<Item = &SceneObject> { self.objects.iter() }

    pub fn of_class(&self, class: ClassId) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter().filter(move |o| o.class == class)
    }

    pub fn find(&self, class: ClassId, name: &str) -> Option<&SceneObject> {
        self.of_class(class).find(|o| o.name.eq_ignore_ascii_case(name))
    }

    /// First free `<base>_NN` name for `class`, where `base` is `name`
    /// without a trailing `_<digits>` (or the tool name if empty).
    pub fn generate_name(&self, class: ClassId, name: &str) -> String {
        let base = strip_counter(name);
        let base = if base.is_empty() { class.tool_name() } else { base };
        (0u32..)
            .map(|i| format!("{base}_{i:02}"))
            .find(|candidate| self.find(class, candidate).is_none())
            .unwrap_or_default()
    }

    /// Appends an object, renaming it if its name is taken. Returns its
    /// index and the rename applied, if any.
    pub fn push(&mut self, mut object: SceneObject) -> (usize, Option<Rename>) {
        let mut rename = None;
        if self.find(object.class, &object.name).is_some() {
            let new = self.generate_name(object.class, &object.name);
            log::info!("Renaming {} object '{}' to '{}'", object.class, object.name, new);
            let old = std::mem::replace(&mut object.name, new.clone());
            rename = Some(Rename { class: object.class, old, new });
        }
        self.objects.push(object);
        (self.objects.len() - 1, rename)
    }
}

fn strip_counter(name: &str) -> &str {
    match name.rsplit_once('_') {
        Some((base, digits)) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            base
        }
        _ => name,
    }
}
