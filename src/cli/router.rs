//! Command routing and execution
//!
//! This module handles routing CLI commands to their respective implementations.

use crate::cli::args::{Commands, OutputFormat};
use crate::config::{load_snapshot, ConfigLoader};
use crate::materialize::MaterializeOptions;
use crate::snapshot::{CollisionPolicy, ConfigSnapshot};
use anyhow::{anyhow, Context, Result};
use std::ffi::OsString;
use std::path::Path;
use tracing::{debug, info};

/// Execute a CLI command based on the parsed arguments
pub async fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Expand {
            config,
            format,
            reject_collisions,
        } => run_expand(&config, format, reject_collisions),
        Commands::Groups { config } => run_groups(&config),
        Commands::Check {
            config,
            reject_collisions,
        } => run_check(&config, reject_collisions),
        Commands::Watch {
            config,
            reject_collisions,
        } => run_watch(&config, reject_collisions).await,
    }
}

/// Options for a CLI load: host name and process environment become tokens.
pub fn cli_options(reject_collisions: bool) -> MaterializeOptions {
    let policy = if reject_collisions {
        CollisionPolicy::Reject
    } else {
        CollisionPolicy::Overwrite
    };

    let mut options = MaterializeOptions::default()
        .with_collision_policy(policy)
        .with_environment(utf8_environment(std::env::vars_os()));
    match hostname::get() {
        Ok(host) => options = options.with_host_node_name(host.to_string_lossy()),
        Err(e) => debug!("Host name unavailable, %(host_node_name)s stays unbound: {}", e),
    }
    options
}

/// Keep the variables whose name and value are both valid UTF-8.
pub fn utf8_environment<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                debug!("Skipping non UTF-8 environment variable {:?}", key);
                None
            }
        })
        .collect()
}

fn load(config: &Path, reject_collisions: bool) -> Result<ConfigSnapshot> {
    load_snapshot(config, &cli_options(reject_collisions))
        .with_context(|| format!("Failed to load {}", config.display()))
}

fn run_expand(config: &Path, format: OutputFormat, reject_collisions: bool) -> Result<()> {
    let snapshot = load(config, reject_collisions)?;
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(snapshot.entries())?,
        OutputFormat::Yaml => serde_yaml::to_string(snapshot.entries())?,
    };
    println!("{rendered}");
    Ok(())
}

fn run_groups(config: &Path) -> Result<()> {
    let snapshot = load(config, false)?;
    for group in snapshot.registry().groups() {
        println!("{}: {}", group, snapshot.registry().programs(group).join(", "));
    }
    Ok(())
}

fn run_check(config: &Path, reject_collisions: bool) -> Result<()> {
    let snapshot = load(config, reject_collisions)?;

    println!(
        "{} entries, {} process instances, {} groups",
        snapshot.entries().len(),
        snapshot.loaded_programs().len(),
        snapshot.registry().len()
    );
    for skipped in snapshot.skipped() {
        println!(
            "skipped {} instance {}: {}",
            skipped.program, skipped.process_num, skipped.reason
        );
    }

    if snapshot.skipped().is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} process instance(s) could not be materialized",
            snapshot.skipped().len()
        ))
    }
}

async fn run_watch(config: &Path, reject_collisions: bool) -> Result<()> {
    let mut loader = ConfigLoader::load(config, cli_options(reject_collisions))
        .with_context(|| format!("Failed to load {}", config.display()))?;
    loader.enable_hot_reload();
    loader.watch_config_file()?;

    info!("Watching {} for changes (Ctrl-C to stop)", loader.path().display());
    tokio::signal::ctrl_c().await?;
    info!("Stopped after {} generation(s)", loader.generation());
    Ok(())
}
