//! Hubsim CLI - run and manage the local CRM API emulator

use clap::{Args, Parser, Subcommand};
use hubsim::config::{self, HubsimConfig, Overrides};
use hubsim::server::{self, AppState};
use hubsim::ui::{self, Icons};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "hubsim")]
#[command(version)]
#[command(about = "Local emulator of a CRM REST API backed by SQLite")]
#[command(long_about = r#"
Hubsim serves a CRM-shaped REST API from a single SQLite file:
objects and properties, associations and labels, search, pipelines,
owners and lists.

Example usage:
  hubsim init
  hubsim serve --port 8080
  hubsim serve --database :memory:
  hubsim stats
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true, default_value = "hubsim.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct StoreArgs {
    /// Path to the database file, or :memory:
    #[arg(short, long)]
    database: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[command(flatten)]
        store: StoreArgs,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory of static UI files served for unknown paths
        #[arg(long)]
        ui_dir: Option<PathBuf>,
    },

    /// Write a default config file and ignore the data directory in git
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,

        /// Port written to the config
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show row counts of the database
    Stats {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Delete all data and restore the built-in seed
    Reset {
        #[command(flatten)]
        store: StoreArgs,
    },
}

fn resolve_config(path: &Path, overrides: Overrides) -> anyhow::Result<HubsimConfig> {
    let mut config = HubsimConfig::load(Some(path))?;
    config.apply_env(|key| std::env::var(key).ok())?;
    config.apply_overrides(overrides);
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    if let Err(e) = run(cli).await {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { store, host, port, ui_dir } => {
            let config = resolve_config(
                &cli.config,
                Overrides {
                    database: store.database,
                    host,
                    port,
                    ui_dir,
                },
            )?;
            let addr = config.addr()?;
            let store = config.open_store()?;

            if !config.owners.is_empty() {
                let session = store.session();
                for owner in &config.owners {
                    session.owners().ensure(owner)?;
                }
                tracing::info!(count = config.owners.len(), "seeded owners from config");
            }

            ui::serve_banner(addr, &config.database, config.ui_dir.as_deref());

            let state = AppState::new(store).with_ui_dir(config.ui_dir.clone());
            server::start_server(addr, state).await?;
        }

        Commands::Init { force, port } => {
            let mut config = resolve_config(&cli.config, Overrides::default())?;
            if let Some(port) = port {
                config.port = port;
            }
            config::write_config(&cli.config, &config, force)?;
            let root = cli
                .config
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            config::ensure_gitignore(&root)?;
            ui::success(&format!("Wrote {}", cli.config.display()));
        }

        Commands::Stats { store } => {
            let config = resolve_config(
                &cli.config,
                Overrides {
                    database: store.database,
                    ..Default::default()
                },
            )?;
            let stats = config.open_store()?.stats()?;
            ui::header(Icons::STATS, "Database statistics");
            ui::info("database", &config.database);
            println!("{}", ui::stats_table(&stats));
        }

        Commands::Reset { store } => {
            let config = resolve_config(
                &cli.config,
                Overrides {
                    database: store.database,
                    ..Default::default()
                },
            )?;
            if config.is_in_memory() {
                ui::warn("An in-memory database starts empty; nothing to reset");
                return Ok(());
            }
            config.open_store()?.reset()?;
            ui::success(&format!("Reset {}", config.database));
        }
    }

    Ok(())
}
