//! maws-cache: inspect and export the local AWS login cache
//!
//! Reads what a previous login left behind without contacting the identity
//! provider or STS.

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use maws_cache::{disable_caching, CacheConfig, ConfigError, CredentialCache, CredentialsFile};
use tracing::info;

#[derive(Parser)]
#[command(name = "maws-cache")]
#[command(about = "Inspect and export cached federated AWS credentials")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Disable the cache, including the shared credentials file
    #[arg(long, global = true)]
    no_cache: bool,

    /// Configuration root (defaults to MAWS_CACHE_ROOT or ~/.maws)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the cache location, its trust state and cached entries
    Status,

    /// Print cached STS credentials for a role as JSON
    Sts {
        /// IAM role ARN
        #[arg(long)]
        role_arn: String,
    },

    /// Write cached STS credentials into the shared credentials file
    Export {
        /// IAM role ARN
        #[arg(long)]
        role_arn: String,

        /// Profile (section) name to write
        #[arg(long)]
        profile: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "maws_cache=debug"
    } else {
        "maws_cache=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.no_cache {
        disable_caching();
    }

    let mut config = match CacheConfig::load() {
        // An explicit --root stands in for a missing home directory
        Err(ConfigError::NoRoot) if cli.root.is_some() => CacheConfig::default(),
        result => result.context("Failed to load cache configuration")?,
    };
    if let Some(root) = cli.root {
        config.root = root;
        config.validate().context("Invalid --root")?;
    }
    let cache = CredentialCache::new(&config);

    match cli.command {
        Commands::Status => run_status(&cache),
        Commands::Sts { role_arn } => run_sts(&cache, &role_arn),
        Commands::Export { role_arn, profile } => run_export(&cache, &role_arn, &profile),
    }
}

fn run_status(cache: &CredentialCache) -> anyhow::Result<()> {
    println!("Root: {}", cache.root().display());

    if maws_cache::caching_disabled() {
        println!("Cache: disabled");
        return Ok(());
    }

    if !cache.is_trusted() {
        println!("Cache: UNTRUSTED (directory must be owned by you with mode 0700)");
        return Ok(());
    }

    let entries = cache.entries().context("Failed to list cache directory")?;
    println!("Cache: {} ({} entries)", cache.cache_dir().display(), entries.len());

    let now = Utc::now();
    for entry in entries {
        let age = (now - entry.modified).num_seconds().max(0);
        println!("  {:<16} {} ({}s old)", entry.kind.as_str(), entry.file_name, age);
    }

    Ok(())
}

fn run_sts(cache: &CredentialCache, role_arn: &str) -> anyhow::Result<()> {
    let credentials = cache
        .read_sts_credentials(role_arn)
        .with_context(|| format!("No valid cached STS credentials for {role_arn}"))?;

    println!("{}", serde_json::to_string_pretty(&credentials)?);
    Ok(())
}

fn run_export(cache: &CredentialCache, role_arn: &str, profile: &str) -> anyhow::Result<()> {
    let credentials = cache
        .read_sts_credentials(role_arn)
        .with_context(|| format!("No valid cached STS credentials for {role_arn}"))?;

    let update: CredentialsFile = [(profile.to_string(), credentials.to_profile_section())]
        .into_iter()
        .collect();

    let path = cache
        .write_shared_credentials(&update)
        .context("Unable to write AWS shared credentials")?;

    info!(profile, expiration = %credentials.expiration, "Exported cached credentials");
    println!("{}", path.display());
    Ok(())
}
