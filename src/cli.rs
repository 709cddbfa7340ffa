//! Command-line interface definitions.

use clap::{ArgAction, Parser, Subcommand};
use quill::config::{Config, Policy};
use std::path::PathBuf;

/// A static site generator for a personal markdown blog
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Increase logging verbosity (-v info, -vv debug). `QUILL_LOG`
    /// overrides this.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Deletes the destination directory if there is one and builds the site
    Build(BuildArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// The site root, holding `quill.yaml` and the `content` and `layouts`
    /// directories
    pub source: PathBuf,

    /// The output directory
    pub destination: PathBuf,

    /// Abort on the first document that fails to load or render
    #[arg(long, conflicts_with = "lenient")]
    pub strict: bool,

    /// Skip documents that fail to load or render and report them
    #[arg(long)]
    pub lenient: bool,

    /// The number of worker threads (default: one per CPU)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Build documents marked `draft: true`
    #[arg(long)]
    pub drafts: bool,
}

impl BuildArgs {
    pub fn policy(&self) -> Option<Policy> {
        match (self.strict, self.lenient) {
            (true, _) => Some(Policy::Strict),
            (_, true) => Some(Policy::Lenient),
            _ => None,
        }
    }

    /// Applies the flags on top of the project file's settings.
    pub fn apply(&self, config: &mut Config) {
        if let Some(policy) = self.policy() {
            config.policy = policy;
        }
        if self.threads.is_some() {
            config.threads = self.threads;
        }
        config.drafts |= self.drafts;
    }
}
