use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use argh::FromArgs;
use serde_json::json;
use xraylib::{
    format::scene::{LoadReport, Scene},
    session::ImportSession,
};

#[derive(FromArgs, PartialEq, Debug)]
/// process level files
#[argh(subcommand, name = "scene")]
pub struct Args {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Info(InfoArgs),
    Export(ExportArgs),
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// print a summary of a level and its level parts
#[argh(subcommand, name = "info")]
pub struct InfoArgs {
    #[argh(positional)]
    /// input level (binary or LTX)
    input: PathBuf,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// write a decoded level as JSON
#[argh(subcommand, name = "export")]
pub struct ExportArgs {
    #[argh(positional)]
    /// input level (binary or LTX)
    input: PathBuf,
    #[argh(positional)]
    /// output JSON file
    output: PathBuf,
}

pub fn run(args: Args) -> Result<()> {
    match args.command {
        SubCommand::Info(c_args) => info(c_args),
        SubCommand::Export(c_args) => export(c_args),
    }
}

fn load(session: &ImportSession, input: &Path) -> Result<(Scene, LoadReport)> {
    session
        .load_scene(input)
        .with_context(|| format!("Failed to load level '{}'", input.display()))
}

fn report_json(report: &LoadReport) -> serde_json::Value {
    json!({
        "partial": report.is_partial(),
        "parts": report.parts,
        "skipped_classes": report.skipped,
        "renames": report.renames,
        "failures": report.failures.iter().map(|f| json!({
            "class": f.class,
            "path": f.path,
            "error": f.error.to_string(),
        })).collect::<Vec<_>>(),
    })
}

fn info(args: InfoArgs) -> Result<()> {
    let session = ImportSession::default();
    let (scene, report) = load(&session, &args.input)?;
    let mut per_class = BTreeMap::<&str, usize>::new();
    for object in scene.objects.iter() {
        *per_class.entry(object.class.tool_name()).or_default() += 1;
    }
    let summary = json!({
        "version": scene.version,
        "guid": scene.guid,
        "owner": scene.owner,
        "create_time": scene.create_time,
        "options": scene.options,
        "objects": per_class,
        "tools": scene.tools.values().map(|t| json!({
            "class": t.class,
            "origins": t.origins,
            "objects": t.objects.len(),
        })).collect::<Vec<_>>(),
        "report": report_json(&report),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn export(args: ExportArgs) -> Result<()> {
    let session = ImportSession::default();
    let (scene, report) = load(&session, &args.input)?;
    if report.is_partial() {
        log::warn!("Level loaded with {} failed sections", report.failures.len());
    }
    let mut out = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("Failed to create file '{}'", args.output.display()))?,
    );
    serde_json::to_writer_pretty(&mut out, &json!({ "scene": scene, "report": report_json(&report) }))?;
    out.flush()?;
    Ok(())
}
