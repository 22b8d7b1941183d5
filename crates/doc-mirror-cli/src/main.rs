mod commands;
mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc_mirror::{Engine, EntryTypeRegistry, ImportOptions};
use doc_mirror_github::{GitHubClient, GitHubConfig};
use doc_mirror_store::MirrorStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, ResolvedSources};

#[derive(Parser)]
#[command(name = "doc-mirror")]
#[command(about = "Mirror documentation from GitHub repositories into a local content store")]
struct Cli {
    /// Path to the sources file (defaults to ~/.config/doc-mirror/sources.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import every enabled source into the local store
    Sync {
        /// Replace every entry, even when its content is unchanged
        #[arg(long)]
        clear: bool,
        /// Remove entries that disappeared upstream
        #[arg(long)]
        cleanup: bool,
        /// Walk sources whose latest commit was already synced
        #[arg(long)]
        force: bool,
        /// Only sync the source with this name
        #[arg(long)]
        source: Option<String>,
    },
    /// Report which sources changed since their last sync, without writing
    Check {
        /// List the changed files under each changed source
        #[arg(long)]
        deep: bool,
        /// Only check the source with this name
        #[arg(long)]
        source: Option<String>,
    },
    /// Remove entries that no longer exist upstream
    Cleanup {
        /// Only clean up the source with this name
        #[arg(long)]
        source: Option<String>,
    },
    /// Show the last synced commit of each source
    Status,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cache_dir() -> Result<PathBuf> {
    let base = dirs::cache_dir().context("could not determine cache directory")?;
    Ok(base.join("doc-mirror"))
}

fn db_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.database {
        Some(path) => Ok(path.clone()),
        None => Ok(cache_dir()?.join("mirror.db")),
    }
}

fn open_store(path: &Path) -> Result<MirrorStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    MirrorStore::open(path).with_context(|| format!("failed to open database: {}", path.display()))
}

fn github_token() -> Option<String> {
    std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty())
}

/// Everything a subcommand needs, built once from the config file.
struct App {
    sources: ResolvedSources,
    store: Arc<MirrorStore>,
    engine: Engine,
}

impl App {
    fn build(config_path: Option<&Path>) -> Result<Self> {
        let config = config::load_config(config_path)?;
        let sources = config::resolve_sources(&config.sources);
        let store = Arc::new(open_store(&db_path(&config)?)?);

        let remote = Arc::new(GitHubClient::new(GitHubConfig {
            token: github_token(),
            api_base_url: config.api_base_url.clone(),
        }));

        let engine = Engine::new(
            remote,
            store.clone(),
            store.clone(),
            EntryTypeRegistry::with_defaults(),
            &config.output_dir,
        )
        .with_source_delay(Duration::from_millis(config.source_delay_ms));

        Ok(Self {
            sources,
            store,
            engine,
        })
    }

    /// The configured sources, or just the one named `name`.
    fn select(&self, name: Option<&str>) -> Result<ResolvedSources> {
        let Some(name) = name else {
            return Ok(self.sources.clone());
        };

        let selected = self.sources.named(name);
        if selected.is_empty() {
            anyhow::bail!("no source named `{name}` in the config");
        }
        Ok(selected)
    }
}

/// Cancel the returned token on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping after the current file");
            child.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let app = App::build(cli.config.as_deref())?;

    match cli.command {
        Command::Sync {
            clear,
            cleanup,
            force,
            source,
        } => {
            let sources = app.select(source.as_deref())?;
            let options = ImportOptions {
                clear,
                force,
                cleanup,
            };
            commands::sync::run(&app.engine, &sources, &options, &cancel_on_ctrl_c()).await
        }
        Command::Check { deep, source } => {
            let sources = app.select(source.as_deref())?;
            commands::check::run(&app.engine, &sources, deep).await
        }
        Command::Cleanup { source } => {
            let sources = app.select(source.as_deref())?;
            commands::cleanup::run(&app.engine, &sources, &cancel_on_ctrl_c()).await
        }
        Command::Status => commands::status::run(&app.store, &app.sources),
    }
}
