mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{BuildArgs, Cli, Commands};
use quill::build::build_site;
use quill::config::Config;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let result = match &cli.command {
        Commands::Build(args) => build(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn build(args: &BuildArgs) -> Result<()> {
    let mut config = Config::from_directory(&args.source, &args.destination)
        .with_context(|| format!("loading site `{}`", args.source.display()))?;
    args.apply(&mut config);

    let report = build_site(&config)?;
    print!("{}", report);
    Ok(())
}
