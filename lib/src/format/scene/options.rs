use binrw::binrw;
use bitflags::bitflags;
use serde::Serializer;
use serde_derive::Serialize;

use crate::{
    error::{Error, Result},
    format::{chunk::ChunkReader, ltx::Ltx},
};

pub const CURRENT_LEVELOP_VERSION: u32 = 0xC;
pub const CURRENT_LEVELOP_BP_VERSION: u32 = 0x9;
/// Oldest level options version that is read at all.
pub const MIN_LEVELOP_VERSION: u32 = 0x8;

pub const CHUNK_LO_VERSION: u32 = 0x7801;
pub const CHUNK_LO_NAMES: u32 = 0x7802;
pub const CHUNK_LO_BOP: u32 = 0x7803;
pub const CHUNK_LO_PREFIX: u32 = 0x7804;
pub const CHUNK_LO_BP_VERSION: u32 = 0x7849;
pub const CHUNK_BUILD_PARAMS: u32 = 0x7850;
pub const CHUNK_LIGHT_QUALITY: u32 = 0x7851;
pub const CHUNK_MAP_USAGE: u32 = 0x7852;
pub const CHUNK_LO_MAP_VER: u32 = 0x7853;

const LTX_SECTION: &str = "level_options";
const LTX_BUILD_SECTION: &str = "build_params";

pub const QUALITY_DRAFT: u16 = 0;
pub const QUALITY_HIGH: u16 = 1;
pub const QUALITY_CUSTOM: u16 = 2;

/// Lightmap and geometry compiler settings.
#[binrw]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BuildParams {
    pub sm_angle: f32,
    pub weld_distance: f32,
    pub lm_pixels_per_meter: f32,
    pub lm_jitter_samples: u32,
    pub lm_rms_zero: u32,
    pub lm_rms: u32,
    pub quality: u16,
    pub reserved: u16,
    pub f_reserved: [f32; 6],
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            sm_angle: 75.0,
            weld_distance: 0.005,
            lm_pixels_per_meter: 10.0,
            lm_jitter_samples: 9,
            lm_rms_zero: 4,
            lm_rms: 4,
            quality: QUALITY_HIGH,
            reserved: 0,
            f_reserved: [0.0; 6],
        }
    }
}

impl BuildParams {
    fn read_ltx(ltx: &Ltx) -> Result<Self> {
        let s = LTX_BUILD_SECTION;
        let mut f_reserved = [0.0; 6];
        for (i, v) in f_reserved.iter_mut().enumerate() {
            *v = ltx.r_f32(s, &format!("reserved_{i}"))?;
        }
        Ok(Self {
            sm_angle: ltx.r_f32(s, "smooth_angle")?,
            weld_distance: ltx.r_f32(s, "weld_distance")?,
            lm_pixels_per_meter: ltx.r_f32(s, "light_pixel_per_meter")?,
            lm_jitter_samples: ltx.r_u32(s, "light_jitter_samples")?,
            lm_rms_zero: ltx.r_u32(s, "light_rms_zero")?,
            lm_rms: ltx.r_u32(s, "light_rms")?,
            quality: ltx.r_u16(s, "light_quality")?,
            reserved: ltx.r_u16(s, "light_quality_reserved")?,
            f_reserved,
        })
    }
}

bitflags! {
    /// Game modes a map is playable in.
    #[derive(Default)]
    pub struct GameTypes: u16 {
        const SINGLE = 1 << 0;
        const DEATHMATCH = 1 << 1;
        const TEAM_DEATHMATCH = 1 << 2;
        const ARTEFACT_HUNT = 1 << 3;
        const CAPTURE_THE_ARTEFACT = 1 << 4;
        const DOMINATION_ZONE = 1 << 5;
        const TEAM_DOMINATION_ZONE = 1 << 6;
    }
}

/// Mode names as written in `usage_<name>` keys.
const GAME_TYPE_NAMES: [(GameTypes, &str); 7] = [
    (GameTypes::SINGLE, "single"),
    (GameTypes::DEATHMATCH, "deathmatch"),
    (GameTypes::TEAM_DEATHMATCH, "team_deathmatch"),
    (GameTypes::ARTEFACT_HUNT, "artefact_hunt"),
    (GameTypes::CAPTURE_THE_ARTEFACT, "capture_the_artefact"),
    (GameTypes::DOMINATION_ZONE, "domination_zone"),
    (GameTypes::TEAM_DOMINATION_ZONE, "team_domination_zone"),
];

impl GameTypes {
    /// Names of the set modes, lowest bit first.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        GAME_TYPE_NAMES.into_iter().filter(move |(t, _)| self.contains(*t)).map(|(_, n)| n)
    }
}

fn usage_names<S>(usage: &GameTypes, serializer: S) -> Result<S::Ok, S::Error>
where S: Serializer {
    serializer.collect_seq(usage.names())
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LevelOptions {
    pub version: u32,
    pub level_path: String,
    pub level_prefix: String,
    pub bop: String,
    pub map_version: String,
    pub build: BuildParams,
    #[serde(serialize_with = "usage_names")]
    pub usage: GameTypes,
}

impl Default for LevelOptions {
    fn default() -> Self {
        Self {
            version: CURRENT_LEVELOP_VERSION,
            level_path: "level".into(),
            level_prefix: "level_prefix".into(),
            bop: String::new(),
            map_version: "1.0".into(),
            build: BuildParams::default(),
            usage: GameTypes::SINGLE,
        }
    }
}

impl LevelOptions {
    /// Decodes the payload of a level options chunk.
    pub fn read(mut r: ChunkReader) -> Result<Self> {
        let version = r.r_chunk_u32(CHUNK_LO_VERSION)?.ok_or_else(|| {
            Error::malformed_chunk("missing level options version", CHUNK_LO_VERSION)
        })?;
        if version < MIN_LEVELOP_VERSION {
            log::warn!("Skipping level options version {version}, using defaults");
            return Ok(Self::default());
        }

        let mut out = Self { version, ..Self::default() };
        r.expect_chunk(CHUNK_LO_NAMES, "level path")?;
        out.level_path = r.read_string_z().map_err(|e| e.in_chunk(CHUNK_LO_NAMES))?;
        if r.find_chunk(CHUNK_LO_PREFIX) {
            out.level_prefix = r.read_string_z().map_err(|e| e.in_chunk(CHUNK_LO_PREFIX))?;
        }
        r.expect_chunk(CHUNK_LO_BOP, "build options")?;
        out.bop = r.read_text_z().map_err(|e| e.in_chunk(CHUNK_LO_BOP))?;
        if r.find_chunk(CHUNK_LO_MAP_VER) {
            out.map_version = r.read_string_z().map_err(|e| e.in_chunk(CHUNK_LO_MAP_VER))?;
        }

        let bp_version = r.r_chunk_u32(CHUNK_LO_BP_VERSION)?.unwrap_or(0);
        if bp_version == CURRENT_LEVELOP_BP_VERSION {
            if r.find_chunk(CHUNK_BUILD_PARAMS) {
                out.build = r.read_type().map_err(|e| e.in_chunk(CHUNK_BUILD_PARAMS))?;
            }
        } else {
            log::warn!("Skipping build params version {bp_version}, using defaults");
        }

        if r.find_chunk(CHUNK_MAP_USAGE) {
            out.usage = read_map_usage(&mut r, bp_version).map_err(|e| e.in_chunk(CHUNK_MAP_USAGE))?;
        }
        Ok(out)
    }

    pub fn read_ltx(ltx: &Ltx) -> Result<Self> {
        let s = LTX_SECTION;
        let version = ltx.r_u32(s, "version")?;
        if version < MIN_LEVELOP_VERSION {
            log::warn!("Skipping level options version {version}, using defaults");
            return Ok(Self::default());
        }

        let mut out = Self {
            version,
            level_path: ltx.r_string(s, "level_path")?.to_string(),
            level_prefix: ltx.r_string(s, "level_prefix")?.to_string(),
            bop: ltx.r_string_wb(s, "bop")?.to_string(),
            ..Self::default()
        };
        if version > 0xB {
            out.map_version = ltx.r_string(s, "map_version")?.to_string();
        }

        if version > 0xA {
            out.usage = read_usage_ltx(ltx, s)?;
        } else {
            let usage = &mut out.usage;
            usage.set(GameTypes::DEATHMATCH, ltx.r_i32(s, "usage_deathmatch")? != 0);
            usage.set(GameTypes::TEAM_DEATHMATCH, ltx.r_i32(s, "usage_teamdeathmatch")? != 0);
            usage.set(GameTypes::ARTEFACT_HUNT, ltx.r_i32(s, "usage_artefacthunt")? != 0);
            if version > 0x8 {
                usage.set(
                    GameTypes::CAPTURE_THE_ARTEFACT,
                    ltx.r_i32(s, "usage_captretheartefact")? != 0,
                );
                usage.set(
                    GameTypes::TEAM_DOMINATION_ZONE,
                    ltx.r_i32(s, "usage_team_domination_zone")? != 0,
                );
                let key = if version == 0x9 { "domination_zone" } else { "usage_domination_zone" };
                usage.set(GameTypes::DOMINATION_ZONE, ltx.r_i32(s, key)? != 0);
            }
        }

        if ltx.section_exist(LTX_BUILD_SECTION) {
            out.build = BuildParams::read_ltx(ltx)?;
        }
        Ok(out)
    }
}

fn read_map_usage(r: &mut ChunkReader, bp_version: u32) -> Result<GameTypes> {
    if bp_version > 0x8 {
        return Ok(GameTypes::from_bits_truncate(r.read_u16()?));
    }
    let mut usage = GameTypes::empty();
    usage.set(GameTypes::DEATHMATCH, r.read_i32()? != 0);
    usage.set(GameTypes::TEAM_DEATHMATCH, r.read_i32()? != 0);
    usage.set(GameTypes::ARTEFACT_HUNT, r.read_i32()? != 0);
    Ok(usage)
}

/// Current-format usage keys; absent keys keep their defaults.
fn read_usage_ltx(ltx: &Ltx, section: &str) -> Result<GameTypes> {
    let mut usage = GameTypes::SINGLE;
    for (t, name) in GAME_TYPE_NAMES {
        let key = format!("usage_{name}");
        if ltx.line_exist(section, &key) {
            usage.set(t, ltx.r_bool(section, &key)?);
        }
    }
    Ok(usage)
}
