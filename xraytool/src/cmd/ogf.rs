use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use argh::FromArgs;
use serde_json::json;
use xraylib::{
    format::{
        chunk::ChunkReader,
        ogf::{OgfOptions, OGF_CHILDREN},
        scene::ClassRegistry,
    },
    session::ImportSession,
    util::file::map_file,
};

#[derive(FromArgs, PartialEq, Debug)]
/// process OGF files
#[argh(subcommand, name = "ogf")]
pub struct Args {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Info(InfoArgs),
    Dump(DumpArgs),
    Convert(ConvertArgs),
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// print a summary of a skeletal OGF
#[argh(subcommand, name = "info")]
pub struct InfoArgs {
    #[argh(positional)]
    /// input OGF
    input: PathBuf,
    #[argh(switch)]
    /// use default bone physics when IK data has an unsupported version
    ik_fallback: bool,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// print the chunk tree of an OGF
#[argh(subcommand, name = "dump")]
pub struct DumpArgs {
    #[argh(positional)]
    /// input OGF
    input: PathBuf,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// write the host-space skeletal import of an OGF as JSON
#[argh(subcommand, name = "convert")]
pub struct ConvertArgs {
    #[argh(positional)]
    /// input OGF
    input: PathBuf,
    #[argh(positional)]
    /// output JSON file
    output: PathBuf,
    #[argh(switch)]
    /// use default bone physics when IK data has an unsupported version
    ik_fallback: bool,
}

pub fn run(args: Args) -> Result<()> {
    match args.command {
        SubCommand::Info(c_args) => info(c_args),
        SubCommand::Dump(c_args) => dump(c_args),
        SubCommand::Convert(c_args) => convert(c_args),
    }
}

fn session(ik_fallback: bool) -> ImportSession {
    ImportSession::new(ClassRegistry::default(), OgfOptions { ik_fallback })
}

fn info(args: InfoArgs) -> Result<()> {
    let mut session = session(args.ik_fallback);
    let model = session
        .import_ogf(&args.input)
        .with_context(|| format!("Failed to decode '{}'", args.input.display()))?;
    let summary = json!({
        "format_version": model.header.format_version,
        "model_type": model.header.model_type(),
        "bones": model.bones.iter().map(|b| json!({
            "name": b.name,
            "parent": b.parent,
            "game_material": b.game_material,
            "mass": b.mass,
        })).collect::<Vec<_>>(),
        "elements": model.elements.iter().map(|e| json!({
            "shader": e.material.shader,
            "texture": e.material.texture,
            "triangles": e.triangle_count(),
            "slide_window": e.slide_window,
        })).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn dump(args: DumpArgs) -> Result<()> {
    let data = map_file(&args.input)?;
    dump_level(&ChunkReader::new(&data), 0, true);
    Ok(())
}

/// Logs one chunk level; `OGF_CHILDREN` and its entries are descended into.
fn dump_level(r: &ChunkReader, depth: usize, top: bool) {
    for (desc, payload) in r.children() {
        log::info!(
            "{:indent$}{:#06X} size {:#X}{}",
            "",
            desc.id(),
            payload.len(),
            if desc.is_compressed() { " (compressed)" } else { "" },
            indent = depth * 2
        );
        if desc.is_compressed() {
            continue;
        }
        if (top && desc.id() == OGF_CHILDREN) || (!top && depth == 1) {
            dump_level(&ChunkReader::new(payload), depth + 1, false);
        }
    }
}

fn convert(args: ConvertArgs) -> Result<()> {
    let mut session = session(args.ik_fallback);
    let import = session
        .import_skeletal(&args.input)
        .with_context(|| format!("Failed to convert '{}'", args.input.display()))?;
    log::info!(
        "{} bones, {} sections, {} triangles",
        import.bones.len(),
        import.sections.len(),
        import.triangle_count()
    );
    let mut out = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("Failed to create file '{}'", args.output.display()))?,
    );
    serde_json::to_writer_pretty(&mut out, &import)?;
    out.flush()?;
    Ok(())
}
