//! Level (scene) files and their per-tool level parts.
//!
//! A level is either a chunked binary file or an LTX text file; the first
//! byte decides (`[` starts an LTX file). Tool data that is not embedded
//! in the level lives in part files next to it:
//! `<dir>/<level stem>/<tool name>.part`, `.part1`, `.part2`, ...

pub mod objects;
pub mod options;

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use serde_derive::Serialize;
use uuid::Uuid;

pub use self::{
    objects::{
        BodySource, ClassId, ClassRegistry, ObjectBody, ObjectList, Rename, SceneObject, Transform,
    },
    options::{BuildParams, GameTypes, LevelOptions},
};
use crate::{
    error::{Error, Result},
    format::{chunk::ChunkReader, ltx::Ltx},
    util::file::map_file,
};

pub const CURRENT_FILE_VERSION: u32 = 0x5;

pub const CHUNK_VERSION: u32 = 0x9df3;
pub const CHUNK_OBJECT_LIST: u32 = 0x7708;
pub const CHUNK_LEVELOP: u32 = 0x7711;
pub const CHUNK_OBJECT_COUNT: u32 = 0x7712;
pub const CHUNK_LEVEL_TAG: u32 = 0x7777;
pub const CHUNK_TOOLS_GUID: u32 = 0x7000;
pub const CHUNK_TOOLS_DATA: u32 = 0x8000;

// Tool section chunks
pub const TOOL_CHUNK_VERSION: u32 = 0x1001;
pub const TOOL_CHUNK_OBJECTS: u32 = 0x1003;
pub const TOOL_VERSION: u16 = 0x0000;

const LTX_TOOL_SECTION: &str = "main";
const LTX_OBJECT_PREFIX: &str = "object";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SectionOrigin {
    /// `CHUNK_TOOLS_DATA` chunk inside the level file.
    Embedded,
    BinaryPart(PathBuf),
    LtxPart(PathBuf),
}

#[derive(Clone, Debug, Serialize)]
pub struct ToolSection {
    pub class: ClassId,
    pub origins: Vec<SectionOrigin>,
    /// Indices into [`Scene::objects`].
    pub objects: Vec<usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Scene {
    pub version: u32,
    pub guid: Uuid,
    pub owner: String,
    pub create_time: u32,
    pub options: LevelOptions,
    pub objects: ObjectList,
    pub tools: IndexMap<ClassId, ToolSection>,
}

/// A section or object that failed to load without failing the level.
#[derive(Debug)]
pub struct SectionFailure {
    pub class: Option<ClassId>,
    pub path: Option<PathBuf>,
    pub error: Error,
}

/// Everything a load skipped, renamed or failed on.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub failures: Vec<SectionFailure>,
    /// Class ids of skipped objects with no registered decoder.
    pub skipped: Vec<u32>,
    pub renames: Vec<Rename>,
    /// Level part files that were loaded.
    pub parts: Vec<PathBuf>,
}

impl LoadReport {
    pub fn is_partial(&self) -> bool { !self.failures.is_empty() }

    fn fail(&mut self, class: Option<ClassId>, path: Option<&Path>, error: Error) {
        match path {
            Some(p) => log::warn!("Failed to load '{}': {error}", p.display()),
            None => log::warn!("Failed to load {} section: {error}", DisplayClass(class)),
        }
        self.failures.push(SectionFailure { class, path: path.map(Path::to_path_buf), error });
    }
}

struct DisplayClass(Option<ClassId>);

impl std::fmt::Display for DisplayClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(class) => write!(f, "{class}"),
            None => f.write_str("object"),
        }
    }
}

impl Scene {
    fn new(version: u32) -> Self {
        Self {
            version,
            guid: Uuid::nil(),
            owner: String::new(),
            create_time: 0,
            options: LevelOptions::default(),
            objects: ObjectList::new(),
            tools: IndexMap::new(),
        }
    }

    /// Loads a level and every level part found for the registered classes.
    pub fn load<P: AsRef<Path>>(path: P, registry: &ClassRegistry) -> Result<(Self, LoadReport)> {
        let path = path.as_ref();
        log::info!("Loading level '{}'", path.display());
        let data = map_file(path)?;
        let (scene, report) = if is_ltx(&data) {
            Self::load_ltx(path, &data, registry)?
        } else {
            Self::load_binary(path, &data, registry)?
        };
        log::info!(
            "Loaded {} objects, {} parts, {} failures",
            scene.objects.len(),
            report.parts.len(),
            report.failures.len()
        );
        Ok((scene, report))
    }

    /// Decodes a binary level. `path` locates its level parts.
    pub fn load_binary(
        path: &Path,
        data: &[u8],
        registry: &ClassRegistry,
    ) -> Result<(Self, LoadReport)> {
        let mut r = ChunkReader::new(data);
        let version = r
            .r_chunk_u32(CHUNK_VERSION)?
            .ok_or_else(|| Error::malformed_chunk("missing file version", CHUNK_VERSION))?;
        check_file_version(version)?;

        let mut scene = Self::new(version);
        let mut report = LoadReport::default();
        match r.open_chunk(CHUNK_LEVELOP) {
            Some(lop) => scene.options = LevelOptions::read(lop)?,
            None => log::warn!("Level has no level options, using defaults"),
        }
        if r.find_chunk(CHUNK_TOOLS_GUID) {
            scene.guid = read_guid(&mut r).map_err(|e| e.in_chunk(CHUNK_TOOLS_GUID))?;
        }
        if r.find_chunk(CHUNK_LEVEL_TAG) {
            scene.owner = r.read_string_z().map_err(|e| e.in_chunk(CHUNK_LEVEL_TAG))?;
            scene.create_time = r.read_u32().map_err(|e| e.in_chunk(CHUNK_LEVEL_TAG))?;
        }
        let declared = r.r_chunk_u32(CHUNK_OBJECT_COUNT)?;

        if let Some(list) = r.open_chunk(CHUNK_OBJECT_LIST) {
            read_objects(&list, registry, &mut scene.objects, &mut report);
        }
        if let Some(declared) = declared {
            if declared as usize != scene.objects.len() {
                log::debug!("Level declares {declared} objects, read {}", scene.objects.len());
            }
        }

        for class in registry.classes() {
            match r.open_chunk(CHUNK_TOOLS_DATA + class.id()) {
                Some(chunk) => {
                    let mut section = ToolSection::new(class);
                    match read_tool(&chunk, registry, &mut scene.objects, &mut report) {
                        Ok(indices) => {
                            section.objects = indices;
                            section.origins.push(SectionOrigin::Embedded);
                            scene.tools.insert(class, section);
                        }
                        Err(e) => report.fail(Some(class), None, e),
                    }
                }
                None => scene.load_parts(path, class, registry, &mut report),
            }
        }
        Ok((scene, report))
    }

    /// Decodes an LTX level. `path` locates its level parts.
    pub fn load_ltx(path: &Path, data: &[u8], registry: &ClassRegistry) -> Result<(Self, LoadReport)> {
        let ltx = Ltx::from_bytes(data)?;
        let version = ltx.r_u32("version", "value")?;
        check_file_version(version)?;

        let mut scene = Self::new(version);
        let mut report = LoadReport::default();
        scene.options = LevelOptions::read_ltx(&ltx)?;
        scene.guid = read_guid_ltx(&ltx, "guid")?;
        if ltx.section_exist("level_tag") {
            scene.owner = ltx.r_string("level_tag", "owner")?.to_string();
            scene.create_time = ltx.r_u32("level_tag", "create_time")?;
        }

        for class in registry.classes() {
            scene.load_parts(path, class, registry, &mut report);
        }
        Ok((scene, report))
    }

    /// Loads every part file of one tool. Parts are independent: one
    /// failing does not stop the others.
    fn load_parts(
        &mut self,
        level: &Path,
        class: ClassId,
        registry: &ClassRegistry,
        report: &mut LoadReport,
    ) {
        for part in probe_parts(&part_path(level, class)) {
            match self.load_part(&part, class, registry, report) {
                Ok((origin, indices)) => {
                    log::debug!("Loaded level part '{}'", part.display());
                    let section =
                        self.tools.entry(class).or_insert_with(|| ToolSection::new(class));
                    section.origins.push(origin);
                    section.objects.extend(indices);
                    report.parts.push(part);
                }
                Err(e) => report.fail(Some(class), Some(&part), e),
            }
        }
    }

    fn load_part(
        &mut self,
        part: &Path,
        class: ClassId,
        registry: &ClassRegistry,
        report: &mut LoadReport,
    ) -> Result<(SectionOrigin, Vec<usize>)> {
        let data = map_file(part)?;
        if is_ltx(&data) {
            let ltx = Ltx::from_bytes(&data)?;
            self.check_part_guid(part, read_guid_ltx(&ltx, "guid")?)?;
            let indices = read_tool_ltx(&ltx, registry, &mut self.objects, report)?;
            return Ok((SectionOrigin::LtxPart(part.to_path_buf()), indices));
        }

        let mut r = ChunkReader::new(&data);
        r.expect_chunk(CHUNK_TOOLS_GUID, "level part GUID")?;
        self.check_part_guid(part, read_guid(&mut r).map_err(|e| e.in_chunk(CHUNK_TOOLS_GUID))?)?;
        let id = CHUNK_TOOLS_DATA + class.id();
        let chunk = r.require_chunk(id, "tool data")?;
        let indices = read_tool(&chunk, registry, &mut self.objects, report)?;
        Ok((SectionOrigin::BinaryPart(part.to_path_buf()), indices))
    }

    fn check_part_guid(&self, part: &Path, found: Uuid) -> Result<()> {
        if found != self.guid {
            return Err(Error::IdentityMismatch { path: part.to_path_buf(), expected: self.guid, found });
        }
        Ok(())
    }
}

impl ToolSection {
    fn new(class: ClassId) -> Self { Self { class, origins: Vec::new(), objects: Vec::new() } }
}

fn is_ltx(data: &[u8]) -> bool { data.first() == Some(&b'[') }

fn check_file_version(version: u32) -> Result<()> {
    if version != CURRENT_FILE_VERSION {
        return Err(Error::UnsupportedVersion {
            what: "level file",
            expected: CURRENT_FILE_VERSION,
            found: version,
        });
    }
    Ok(())
}

/// 16 raw bytes, little-endian GUID layout.
fn read_guid(r: &mut ChunkReader) -> Result<Uuid> {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(r.read_bytes(16)?);
    Ok(Uuid::from_bytes_le(bytes))
}

/// Two `u64` halves, `guid_g0` and `guid_g1`, matching the binary layout.
fn read_guid_ltx(ltx: &Ltx, section: &str) -> Result<Uuid> {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&ltx.r_u64(section, "guid_g0")?.to_le_bytes());
    bytes[8..].copy_from_slice(&ltx.r_u64(section, "guid_g1")?.to_le_bytes());
    Ok(Uuid::from_bytes_le(bytes))
}

/// First level part file of `class` for the level at `level`.
pub fn part_path(level: &Path, class: ClassId) -> PathBuf {
    let dir = level.parent().unwrap_or_else(|| Path::new(""));
    let stem = level.file_stem().unwrap_or_default();
    dir.join(stem).join(format!("{}.part", class.tool_name()))
}

/// `base`, `base1`, `base2`, ... up to the first one that does not exist.
pub fn probe_parts(base: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for index in 0usize.. {
        let candidate = if index == 0 {
            base.to_path_buf()
        } else {
            let mut name = OsString::from(base.as_os_str());
            name.push(index.to_string());
            PathBuf::from(name)
        };
        if !candidate.is_file() {
            break;
        }
        out.push(candidate);
    }
    out
}

fn add_object(objects: &mut ObjectList, report: &mut LoadReport, object: SceneObject) -> usize {
    let (index, rename) = objects.push(object);
    report.renames.extend(rename);
    index
}

/// Reads a binary object list. Unknown classes are skipped and failing
/// objects recorded; neither stops the list.
fn read_objects(
    list: &ChunkReader,
    registry: &ClassRegistry,
    objects: &mut ObjectList,
    report: &mut LoadReport,
) -> Vec<usize> {
    let mut indices = Vec::new();
    for (n, entry) in list.list().enumerate() {
        match SceneObject::read(&entry, registry) {
            Ok(object) => indices.push(add_object(objects, report, object)),
            Err(Error::UnknownClass(id)) => {
                log::warn!("Skipping object {n} of unknown class {id}");
                report.skipped.push(id);
            }
            Err(e) => report.fail(None, None, e.in_chunk(n as u32)),
        }
    }
    indices
}

fn read_tool(
    chunk: &ChunkReader,
    registry: &ClassRegistry,
    objects: &mut ObjectList,
    report: &mut LoadReport,
) -> Result<Vec<usize>> {
    let mut r = chunk.clone();
    if let Some(version) = r.r_chunk_u16(TOOL_CHUNK_VERSION)? {
        if version != TOOL_VERSION {
            return Err(Error::UnsupportedVersion {
                what: "tool section",
                expected: TOOL_VERSION as u32,
                found: version as u32,
            });
        }
    }
    Ok(match r.open_chunk(TOOL_CHUNK_OBJECTS) {
        Some(list) => read_objects(&list, registry, objects, report),
        None => Vec::new(),
    })
}

fn read_tool_ltx(
    ltx: &Ltx,
    registry: &ClassRegistry,
    objects: &mut ObjectList,
    report: &mut LoadReport,
) -> Result<Vec<usize>> {
    let main = LTX_TOOL_SECTION;
    if ltx.line_exist(main, "version") {
        let version = ltx.r_u32(main, "version")?;
        if version != TOOL_VERSION as u32 {
            return Err(Error::UnsupportedVersion {
                what: "tool section",
                expected: TOOL_VERSION as u32,
                found: version,
            });
        }
    }
    let count_key = format!("{LTX_OBJECT_PREFIX}_count");
    if !ltx.line_exist(main, &count_key) {
        return Ok(Vec::new());
    }

    let mut indices = Vec::new();
    for n in 0..ltx.r_u32(main, &count_key)? {
        let section = format!("{main}_{LTX_OBJECT_PREFIX}_{n}");
        match SceneObject::read_ltx(ltx, &section, registry) {
            Ok(object) => indices.push(add_object(objects, report, object)),
            Err(Error::UnknownClass(id)) => {
                log::warn!("Skipping [{section}] of unknown class {id}");
                report.skipped.push(id);
            }
            Err(e) => report.fail(None, None, e),
        }
    }
    Ok(indices)
}
