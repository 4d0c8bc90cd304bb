//! Barvault CLI — bundle ingestion and snapshot management commands.
//!
//! Commands:
//! - `ingest <bundle>` — run one ingestion; exit 0 on commit, 1 on failure
//! - `clean <bundle>` — apply a retention policy to committed snapshots
//! - `run --bundle <bundle>` — resolve the as-of snapshot and print what's in it
//! - `bundles` — list registered bundles

use anyhow::{bail, Result};
use barvault_core::domain::Granularity;
use barvault_core::store::RetentionPolicy;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use barvault_runner::{
    register_builtins, BundleRegistry, IngestionCoordinator, VaultConfig,
};

#[derive(Parser)]
#[command(
    name = "barvault",
    about = "Barvault CLI — versioned market-data bundle store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingestion for a registered bundle.
    Ingest {
        /// Bundle name (see `bundles`).
        bundle: String,

        /// Print per-step progress where the routine supports it.
        #[arg(long, default_value_t = false)]
        show_progress: bool,

        /// Vault root directory. Defaults to ./vault.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Path to a vault TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Extra environment entries for the ingest routine (KEY=VALUE).
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
    },
    /// Delete committed snapshots according to a retention policy.
    Clean {
        /// Bundle name.
        bundle: String,

        /// Delete snapshots strictly older than this date/datetime.
        #[arg(long)]
        before: Option<String>,

        /// Delete snapshots strictly newer than this date/datetime.
        #[arg(long)]
        after: Option<String>,

        /// Keep only the N most recent snapshots (exclusive with before/after).
        #[arg(long)]
        keep_last: Option<usize>,

        /// Vault root directory. Defaults to ./vault.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Path to a vault TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Resolve the as-of snapshot for a bundle and print its contents.
    Run {
        /// Bundle name.
        #[arg(long)]
        bundle: String,

        /// As-of date (YYYY-MM-DD, end of day) or datetime. Defaults to now.
        #[arg(long)]
        bundle_date: Option<String>,

        /// Vault root directory. Defaults to ./vault.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Path to a vault TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List registered bundles.
    Bundles,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            bundle,
            show_progress,
            root,
            config,
            env,
        } => run_ingest(&bundle, show_progress, root, config, env),
        Commands::Clean {
            bundle,
            before,
            after,
            keep_last,
            root,
            config,
        } => run_clean(&bundle, before, after, keep_last, root, config),
        Commands::Run {
            bundle,
            bundle_date,
            root,
            config,
        } => run_resolve(&bundle, bundle_date, root, config),
        Commands::Bundles => {
            let mut registry = BundleRegistry::new();
            register_builtins(&mut registry);
            for name in registry.names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn load_config(
    config_path: Option<PathBuf>,
    root: Option<PathBuf>,
    env: Vec<String>,
) -> Result<VaultConfig> {
    let mut config = match config_path {
        Some(path) => VaultConfig::from_file(&path)?,
        None => VaultConfig::default(),
    };
    if let Some(root) = root {
        config.root = root;
    }
    for pair in env {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("--env expects KEY=VALUE, got '{pair}'");
        };
        config.set_env(key, value);
    }
    Ok(config)
}

fn run_ingest(
    bundle_name: &str,
    show_progress: bool,
    root: Option<PathBuf>,
    config_path: Option<PathBuf>,
    env: Vec<String>,
) -> Result<()> {
    let config = load_config(config_path, root, env)?;
    let coordinator = IngestionCoordinator::new(config);

    let mut registry = BundleRegistry::new();
    register_builtins(&mut registry);

    let bundle = match registry.resolve(bundle_name) {
        Ok(bundle) => bundle,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    match coordinator.ingest(bundle, show_progress) {
        Ok(committed) => {
            println!(
                "Ingested '{bundle_name}' as snapshot {}",
                committed.timestamp()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Ingestion failed for '{bundle_name}': {e}");
            std::process::exit(1);
        }
    }
}

fn run_clean(
    bundle_name: &str,
    before: Option<String>,
    after: Option<String>,
    keep_last: Option<usize>,
    root: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path, root, Vec::new())?;
    let coordinator = IngestionCoordinator::new(config);

    let policy = RetentionPolicy {
        before: before.as_deref().map(parse_cutoff).transpose()?,
        after: after.as_deref().map(parse_cutoff).transpose()?,
        keep_last,
    };

    match coordinator.clean(bundle_name, &policy) {
        Ok(report) => {
            if report.removed.is_empty() {
                println!("Nothing to remove for '{bundle_name}'.");
            }
            for ts in &report.removed {
                println!("Removed: {ts}");
            }
            if !report.failed.is_empty() {
                for (ts, reason) in &report.failed {
                    eprintln!("Failed to remove {ts}: {reason}");
                }
                std::process::exit(1);
            }
            println!("{} snapshot(s) kept.", report.kept.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("Clean failed for '{bundle_name}': {e}");
            std::process::exit(1);
        }
    }
}

fn run_resolve(
    bundle_name: &str,
    bundle_date: Option<String>,
    root: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path, root, Vec::new())?;
    let coordinator = IngestionCoordinator::new(config);

    let as_of = match bundle_date.as_deref() {
        Some(raw) => parse_as_of(raw)?,
        None => Utc::now().naive_utc(),
    };

    let data = match coordinator.load(bundle_name, as_of) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let snapshot = data.snapshot();
    println!("Bundle:    {bundle_name}");
    println!("As of:     {as_of}");
    println!("Snapshot:  {}", snapshot.timestamp());
    println!("Location:  {}", snapshot.path().display());
    println!("Assets:    {}", data.assets.len());
    println!(
        "Daily:     {} sid(s)",
        data.bars.sids(Granularity::Daily)?.len()
    );
    println!(
        "Minute:    {} sid(s)",
        data.bars.sids(Granularity::Minute)?.len()
    );
    println!("Adjustments: {}", data.adjustments.len());
    if let Some(manifest) = data.manifest()? {
        println!("Content:   {}", manifest.content_hash);
    }
    Ok(())
}

/// A bare date means midnight: `--before 2024-06-01` deletes snapshots
/// strictly older than that day.
fn parse_cutoff(raw: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap());
    }
    bail!("cannot parse '{raw}' as YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS")
}

/// A bare as-of date means end of that day: `run --bundle-date 2024-06-01`
/// sees everything ingested during the day.
fn parse_as_of(raw: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(23, 59, 59).unwrap());
    }
    bail!("cannot parse '{raw}' as YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS")
}
