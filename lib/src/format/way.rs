use crate::{
    error::{Error, Result},
    format::{
        chunk::ChunkReader,
        ltx::Ltx,
        scene::objects::{BodySource, ObjectBody},
    },
    way::{LinkRecord, WayGraph, WayPoint},
};

pub const WAYOBJECT_VERSION: u16 = 0x0013;

pub const WAYOBJECT_CHUNK_VERSION: u32 = 0x0001;
pub const WAYOBJECT_CHUNK_POINTS: u32 = 0x0002;
pub const WAYOBJECT_CHUNK_LINKS: u32 = 0x0003;
pub const WAYOBJECT_CHUNK_TYPE: u32 = 0x0004;

/// Body decoder registered for way objects.
pub fn decode_body(source: BodySource) -> Result<ObjectBody> {
    let graph = match source {
        BodySource::Chunk(r) => read_way(r)?,
        BodySource::Ltx { ltx, section } => read_way_ltx(ltx, section)?,
    };
    Ok(ObjectBody::Way(graph))
}

fn check_version(version: u32) -> Result<()> {
    if version != WAYOBJECT_VERSION as u32 {
        return Err(Error::UnsupportedVersion {
            what: "way object",
            expected: WAYOBJECT_VERSION as u32,
            found: version,
        });
    }
    Ok(())
}

pub fn read_way(mut r: ChunkReader) -> Result<WayGraph> {
    let version = r
        .r_chunk_u16(WAYOBJECT_CHUNK_VERSION)?
        .ok_or_else(|| Error::malformed_chunk("missing way version", WAYOBJECT_CHUNK_VERSION))?;
    check_version(version as u32)?;

    r.expect_chunk(WAYOBJECT_CHUNK_POINTS, "way points")?;
    let count = r.read_u16()? as usize;
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        let mut read = || -> Result<WayPoint> {
            let position = r.read_vec3()?;
            let flags = r.read_u32()?;
            let selected = r.read_u16()? != 0;
            let name = r.read_string_z()?;
            Ok(WayPoint { name, position, flags, selected, links: Vec::new() })
        };
        points.push(read().map_err(|e| e.in_chunk(WAYOBJECT_CHUNK_POINTS))?);
    }

    r.expect_chunk(WAYOBJECT_CHUNK_LINKS, "way links")?;
    let count = r.read_u16()? as usize;
    let mut links = Vec::with_capacity(count);
    for _ in 0..count {
        let mut read = || -> Result<LinkRecord> {
            Ok(LinkRecord { from: r.read_u16()?, to: r.read_u16()?, probability: r.read_f32()? })
        };
        links.push(read().map_err(|e| e.in_chunk(WAYOBJECT_CHUNK_LINKS))?);
    }

    let way_type = r.r_chunk_u32(WAYOBJECT_CHUNK_TYPE)?.unwrap_or(0);
    WayGraph::from_records(way_type, points, &links).map_err(|e| e.in_chunk(WAYOBJECT_CHUNK_LINKS))
}

/// Reads `wp_<i>_*` point keys and `link_<i> = from, to, probability`.
pub fn read_way_ltx(ltx: &Ltx, section: &str) -> Result<WayGraph> {
    check_version(ltx.r_u32(section, "version")?)?;
    let way_type = if ltx.line_exist(section, "type") { ltx.r_u32(section, "type")? } else { 0 };

    let count = ltx.r_u32(section, "wp_count")?;
    let mut points = Vec::with_capacity(count as usize);
    for i in 0..count {
        let key = |suffix: &str| format!("wp_{i}_{suffix}");
        let selected_key = key("selected");
        points.push(WayPoint {
            name: ltx.r_string(section, &key("name"))?.to_string(),
            position: ltx.r_vec3(section, &key("pos"))?,
            flags: ltx.r_u32(section, &key("flags"))?,
            selected: ltx.line_exist(section, &selected_key)
                && ltx.r_bool(section, &selected_key)?,
            links: Vec::new(),
        });
    }

    let count = if ltx.line_exist(section, "link_count") {
        ltx.r_u32(section, "link_count")?
    } else {
        0
    };
    let mut links = Vec::with_capacity(count as usize);
    for i in 0..count {
        let key = format!("link_{i}");
        let value = ltx.r_string(section, &key)?;
        let invalid = || Error::ltx(None, format!("invalid way link '{value}' for key '{key}'"));
        let mut parts = value.split(',').map(str::trim);
        let from = parts.next().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;
        let to = parts.next().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;
        let probability = match parts.next() {
            Some(s) => s.parse().map_err(|_| invalid())?,
            None => 1.0,
        };
        links.push(LinkRecord { from, to, probability });
    }
    WayGraph::from_records(way_type, points, &links)
}
