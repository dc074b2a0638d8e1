mod cmd;

use argh::FromArgs;

#[derive(FromArgs, PartialEq, Debug)]
/// Tools for working with X-Ray Engine model and level files.
struct TopLevel {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub enum SubCommand {
    Ogf(cmd::ogf::Args),
    Scene(cmd::scene::Args),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .format_level(false)
        .init();

    let args: TopLevel = argh::from_env();
    let result = match args.command {
        SubCommand::Ogf(args) => cmd::ogf::run(args),
        SubCommand::Scene(args) => cmd::scene::run(args),
    };
    if let Err(e) = result {
        eprintln!("Failed: {e:?}");
        std::process::exit(1);
    }
}
