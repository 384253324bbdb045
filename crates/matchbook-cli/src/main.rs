mod args;
mod config;
mod error;
mod http_generator;

use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use matchbook_core::models::{
    ExplanationSource, PairKey, Perspective, ProjectKey, ProjectProfile, SeekerKey, SeekerProfile,
};
use matchbook_core::orchestration::ExplanationCache;
use matchbook_core::persistence::ProfileCatalogStore;
use matchbook_core::sqlite::SqliteStore;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::args::{Cli, Commands, ExplainArgs, ImportProfilesArgs, ListArgs};
use crate::config::MatchbookConfig;
use crate::error::{CliError, CliResult};
use crate::http_generator::HttpExplanationGenerator;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileImport {
    seekers: Vec<SeekerProfile>,
    projects: Vec<ProjectProfile>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = MatchbookConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    tracing::debug!(database = %config.database_path.display(), "loaded configuration");

    let store = Arc::new(SqliteStore::new(&config.database_path));

    match cli.command {
        Commands::Migrate => {
            store.migrate_to_latest()?;
            println!("schema is up to date at {}", store.database_path().display());
            Ok(())
        }
        Commands::ImportProfiles(args) => {
            store.migrate_to_latest()?;
            import_profiles(store.as_ref(), &args)
        }
        Commands::Explain(args) => {
            store.migrate_to_latest()?;
            explain(&config, store, &args).await
        }
        Commands::List(args) => {
            store.migrate_to_latest()?;
            list(&config, store, &args).await
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_env("MATCHBOOK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_log_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn default_log_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "info,matchbook=debug,matchbook_core=debug",
        _ => "debug,matchbook=trace,matchbook_core=trace",
    }
}

fn import_profiles(store: &SqliteStore, args: &ImportProfilesArgs) -> CliResult<()> {
    let import = read_profile_import(&args.path)?;

    for seeker in &import.seekers {
        store.upsert_seeker_profile(seeker)?;
    }
    for project in &import.projects {
        store.upsert_project_profile(project)?;
    }

    tracing::info!(
        seekers = import.seekers.len(),
        projects = import.projects.len(),
        "imported profiles"
    );
    println!(
        "imported {} seekers and {} projects",
        import.seekers.len(),
        import.projects.len()
    );
    Ok(())
}

fn read_profile_import(path: &Path) -> CliResult<ProfileImport> {
    let raw = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn build_cache(config: &MatchbookConfig, store: Arc<SqliteStore>) -> CliResult<ExplanationCache> {
    let generator = Arc::new(HttpExplanationGenerator::from_config(&config.generator));
    ExplanationCache::new(store.clone(), store, generator, config.cache_config())
        .map_err(CliError::from)
}

async fn explain(
    config: &MatchbookConfig,
    store: Arc<SqliteStore>,
    args: &ExplainArgs,
) -> CliResult<()> {
    let cache = build_cache(config, store)?;
    let pair = PairKey::new(SeekerKey(args.seeker), ProjectKey(args.project));
    let perspective = if args.owner {
        Perspective::Owner
    } else {
        Perspective::Seeker
    };

    let explanation = if args.fallback {
        cache.get_explanation_or_fallback(pair, perspective).await?
    } else {
        cache.get_explanation_for(pair, perspective).await?
    };

    println!("{}", explanation.text);
    if explanation.source == ExplanationSource::Fallback {
        eprintln!("note: generator unavailable; fallback text shown and not cached");
    }
    Ok(())
}

async fn list(
    config: &MatchbookConfig,
    store: Arc<SqliteStore>,
    args: &ListArgs,
) -> CliResult<()> {
    let cache = build_cache(config, store)?;
    let projects = cache
        .list_cached_projects_for_seeker(SeekerKey(args.seeker))
        .await?;

    for project in projects {
        println!("{}", project.0);
    }
    Ok(())
}
