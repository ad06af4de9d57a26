//! Exposes the command line application.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use resource_cache::caching::{CacheEntry, Callback, DiskCache, Resource, ResourceCache};
use resource_cache::config::Config;
use resource_cache::main_context;
use tokio::runtime::Handle;

use crate::logging;

/// How fetched resources are printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// A single JSON object, mapping every name to its resource or error.
    Json,
    /// Every resource pretty-printed under its name.
    Pretty,
}

/// Resourcectl commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch resources through the cache and print them.
    Fetch {
        /// The names of the resources to fetch, like `au_becs_bsb`.
        #[arg(required = true)]
        names: Vec<String>,

        /// The output format.
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// Remove all resources from the disk cache.
    Cleanup,
}

/// Fetches named JSON resources through a tiered cache.
///
/// Resources are looked up in the disk cache, if one is configured, and downloaded from the CDN
/// otherwise.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    let dsn = config
        .sentry_dsn
        .as_deref()
        .map(str::parse::<sentry::types::Dsn>)
        .transpose()
        .context("invalid sentry DSN")?;
    let _sentry = sentry::init(sentry::ClientOptions {
        dsn,
        release: sentry::release_name!(),
        ..Default::default()
    });

    // SAFETY: No other threads have been spawned yet.
    unsafe { logging::init_logging(&config) };

    match cli.command {
        Command::Fetch { names, format } => fetch(&config, names, format),
        Command::Cleanup => cleanup(&config).context("failed to clean up caches"),
    }
}

fn fetch(config: &Config, names: Vec<String>, format: OutputFormat) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("resourcectl-worker")
        .enable_all()
        .build()
        .context("failed to start the runtime")?;

    let mut unique = Vec::with_capacity(names.len());
    for name in names {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }

    let results = runtime.block_on(fetch_all(config, &unique))?;
    print_results(&results, format)?;

    let failed = results.values().filter(|result| result.is_err()).count();
    if failed > 0 {
        let retryable = results
            .values()
            .filter(|result| matches!(result, Err(error) if error.is_retryable()))
            .count();
        anyhow::bail!(
            "failed to fetch {failed} of {} resources ({retryable} may succeed on retry)",
            results.len()
        );
    }
    Ok(())
}

/// Requests all `names` at once and runs the main loop until every callback was delivered.
async fn fetch_all(
    config: &Config,
    names: &[String],
) -> Result<BTreeMap<String, CacheEntry<Resource>>> {
    let (main, mut main_loop) = main_context::channel();
    let cache = ResourceCache::from_config(config, Handle::current(), main)
        .context("failed to create the cache")?;

    let results = Arc::new(Mutex::new(BTreeMap::new()));
    for name in names {
        let callback: Callback = {
            let results = results.clone();
            let name = name.clone();
            Box::new(move |result: CacheEntry<Resource>| {
                if let Err(error) = &result {
                    tracing::error!(
                        error = error as &dyn std::error::Error,
                        resource = %name,
                        "Failed to fetch resource"
                    );
                }
                results
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(name, result);
            })
        };

        // A fresh cache has nothing in memory, so every callback is going to be invoked.
        if cache.fetch(name, Some(callback)).is_some() {
            tracing::debug!(resource = %name, "Serving bundled asset while fetching");
        }
    }

    loop {
        if results.lock().unwrap_or_else(|e| e.into_inner()).len() == names.len() {
            break;
        }
        if !main_loop.turn().await {
            anyhow::bail!("main loop closed with pending fetches");
        }
    }

    let results = std::mem::take(&mut *results.lock().unwrap_or_else(|e| e.into_inner()));
    Ok(results)
}

/// Renders every result, errors become `{"error": <message>, "retryable": <bool>}`.
fn render_json(results: &BTreeMap<String, CacheEntry<Resource>>) -> serde_json::Value {
    results
        .iter()
        .map(|(name, result)| {
            let value = match result {
                Ok(resource) => resource.as_ref().clone(),
                Err(error) => serde_json::json!({
                    "error": error.to_string(),
                    "retryable": error.is_retryable(),
                }),
            };
            (name.clone(), value)
        })
        .collect::<serde_json::Map<_, _>>()
        .into()
}

fn print_results(
    results: &BTreeMap<String, CacheEntry<Resource>>,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&render_json(results))?);
        }
        OutputFormat::Pretty => {
            for (name, result) in results {
                match result {
                    Ok(resource) => {
                        println!("{name}:");
                        println!("{}", serde_json::to_string_pretty(resource.as_ref())?);
                    }
                    Err(error) if error.is_retryable() => {
                        println!("{name}: error: {error} (try again later)")
                    }
                    Err(error) => println!("{name}: error: {error}"),
                }
            }
        }
    }
    Ok(())
}

fn cleanup(config: &Config) -> Result<()> {
    let disk = DiskCache::from_config(config)?;
    if disk.cache_dir().is_none() {
        tracing::info!("No cache_dir configured, nothing to clean up");
        return Ok(());
    }

    let removed = disk.cleanup()?;
    tracing::info!(removed, "Cleaned up disk cache");
    Ok(())
}
