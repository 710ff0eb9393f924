//! depot CLI: store definitions, group resolution, content lookup and
//! AutoProx rules from the command line.

mod commands;
mod config;
mod context;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::DepotConfig;
use context::Depot;

#[derive(Parser)]
#[command(name = "depot", version, about = "Artifact repository store management")]
struct Cli {
    /// Path to depot.toml (default: search upward from the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage store definitions
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
    /// Inspect group membership
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },
    /// List groups that transitively contain the given stores
    Affected {
        /// Store keys (packageType:storeType:name)
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Find the store that serves a path
    Locate {
        /// Store key to resolve through
        key: String,
        /// Content path (e.g. /org/foo/1.0/foo-1.0.pom)
        path: String,
        /// List every member holding the path
        #[arg(long)]
        all: bool,
    },
    /// Manage AutoProx rules
    Autoprox {
        #[command(subcommand)]
        action: AutoproxAction,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// List stores
    List {
        /// Only this package type (e.g. maven, npm)
        #[arg(long)]
        package_type: Option<String>,
        /// Only this store type (remote, hosted, group)
        #[arg(long = "type")]
        store_type: Option<String>,
    },
    /// Print a store definition as JSON
    Show {
        key: String,
        /// Let AutoProx create the store if it does not exist
        #[arg(long)]
        provision: bool,
    },
    /// Create a store from a JSON definition
    Create {
        /// JSON file holding the definition
        #[arg(long)]
        file: PathBuf,
        /// Replace an existing store with the same key
        #[arg(long)]
        overwrite: bool,
    },
    /// Delete a store and remove it from all groups
    Delete {
        key: String,
    },
}

#[derive(Subcommand)]
enum GroupAction {
    /// Print the stores a group searches, in order
    Flatten {
        key: String,
        /// Keep nested groups in the output
        #[arg(long)]
        include_groups: bool,
        /// Include disabled stores
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum AutoproxAction {
    /// List rules in match order
    Rules,
    /// Show what would be created for a key
    Eval {
        key: String,
    },
    /// Add or replace a rule from a TOML file
    Add {
        name: String,
        file: PathBuf,
    },
    /// Remove a rule
    Remove {
        name: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let config = load_config(cli.config.as_deref(), &cwd)?;
    init_logging(config.log_level.as_deref());

    let depot = Depot::open(&config)?;
    let result = dispatch(&depot, cli.command);
    depot.close();
    result
}

fn dispatch(depot: &Depot, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Store { action } => match action {
            StoreAction::List {
                package_type,
                store_type,
            } => commands::store::list(&depot.registry, package_type.as_deref(), store_type.as_deref()),
            StoreAction::Show { key, provision } => {
                if provision {
                    commands::store::show(depot.resolver.as_ref(), &key)
                } else {
                    commands::store::show(depot.registry.as_ref(), &key)
                }
            }
            StoreAction::Create { file, overwrite } => commands::store::create(&depot.registry, &file, overwrite),
            StoreAction::Delete { key } => commands::store::delete(&depot.registry, &key),
        },

        Commands::Group { action } => match action {
            GroupAction::Flatten {
                key,
                include_groups,
                all,
            } => commands::group::flatten(&depot.registry, &key, include_groups, all),
        },

        Commands::Affected { keys } => commands::group::affected(&depot.registry, &keys),

        Commands::Locate { key, path, all } => commands::locate::run(depot, &key, &path, all),

        Commands::Autoprox { action } => match action {
            AutoproxAction::Rules => commands::autoprox::rules(depot),
            AutoproxAction::Eval { key } => commands::autoprox::eval(depot, &key),
            AutoproxAction::Add { name, file } => commands::autoprox::add(depot, &name, &file),
            AutoproxAction::Remove { name } => commands::autoprox::remove(depot, &name),
        },
    }
}

/// Explicit `--config`, else the nearest `depot.toml`, else defaults rooted at `cwd`.
fn load_config(explicit: Option<&Path>, cwd: &Path) -> anyhow::Result<DepotConfig> {
    let (mut config, base) = match explicit {
        Some(path) => {
            let config = DepotConfig::load(path)?;
            let base = path
                .parent()
                .map(Path::to_path_buf)
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| cwd.to_path_buf());
            (config, base)
        }
        None => match DepotConfig::find_and_load(cwd).context("locating depot.toml")? {
            Some((config, dir)) => (config, dir),
            None => (DepotConfig::default(), cwd.to_path_buf()),
        },
    };
    config.resolve_paths(&base);
    Ok(config)
}

/// `RUST_LOG` wins, then the configured level, then `warn`.
fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
