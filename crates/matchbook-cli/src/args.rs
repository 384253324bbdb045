use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Matchbook - cached match explanations for seekers and projects
#[derive(Parser, Debug)]
#[command(name = "matchbook")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// JSON configuration file
    #[arg(short, long, global = true, env = "MATCHBOOK_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database path, overrides the configuration file
    #[arg(long, global = true, env = "MATCHBOOK_DB")]
    pub database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or upgrade the database schema
    Migrate,

    /// Load seeker and project profiles from a JSON file
    ImportProfiles(ImportProfilesArgs),

    /// Print the explanation for a seeker/project pair, generating it on first use
    Explain(ExplainArgs),

    /// List projects that already have a cached explanation for a seeker
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct ImportProfilesArgs {
    /// File shaped as {"seekers": [...], "projects": [...]}
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct ExplainArgs {
    #[arg(long)]
    pub seeker: u64,

    #[arg(long)]
    pub project: u64,

    /// Explain the seeker to the project owner instead
    #[arg(long)]
    pub owner: bool,

    /// Print the configured fallback text if generation is unavailable
    #[arg(long)]
    pub fallback: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub seeker: u64,
}
