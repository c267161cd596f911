//! `trawl` — distributed file storage over FTP/FTPS.
//!
//! Splits files into content-hashed chunks, stores each chunk on
//! several servers, and reassembles, verifies, or repairs them later
//! from the surviving replicas.

mod config;
mod progress;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use trawl_engine::{EngineConfig, HealthMonitor, TrawlEngine};
use trawl_manifest::ManifestStore;
use trawl_transport::{PoolOptions, ServerPool};

use crate::config::{expand_path, Config};
use crate::progress::{format_bytes, format_duration, CliProgress};

#[derive(Parser)]
#[command(
    name = "trawl",
    version,
    about = "Distributed file storage across FTP servers",
    after_help = "EXAMPLES:\n  trawl upload /path/to/file.txt myfile.txt\n  trawl download myfile.txt /path/to/restored.txt\n  trawl verify myfile.txt --repair\n  trawl health"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose progress output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show operation statistics.
    #[arg(short = 's', long = "stats", global = true)]
    stats: bool,

    /// Repair problems found by `verify`.
    #[arg(short = 'r', long = "repair", global = true)]
    repair: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a file to distributed storage.
    Upload {
        /// Local file to upload.
        local_file: PathBuf,
        /// Name to store it under.
        remote_name: String,
    },
    /// Download a file from distributed storage.
    Download {
        /// Stored file name.
        remote_name: String,
        /// Where to write the reassembled file.
        local_file: PathBuf,
    },
    /// List all files in distributed storage.
    List,
    /// Delete a file and all of its chunk replicas.
    Delete {
        /// Stored file name.
        remote_name: String,
    },
    /// Verify a file's integrity, optionally repairing it.
    Verify {
        /// Stored file name.
        remote_name: String,
    },
    /// Check the health of every configured server.
    Health,
    /// Print version information.
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if matches!(cli.command, Command::Version) {
        println!("trawl {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let _log_guard = telemetry::init(
        &config.general.log_level,
        &config.general.log_file,
        cli.verbose,
        cli.quiet,
    );
    tracing::info!(
        servers = config.servers.len(),
        replication = config.general.replication_factor,
        "configuration loaded"
    );

    let pool = Arc::new(ServerPool::for_ftp(
        config.servers.clone(),
        Duration::from_secs(config.general.ftp_timeout_secs),
        config.security.verify_ssl_certificates,
        PoolOptions {
            max_concurrent_operations: config.general.max_concurrent_operations,
            ..PoolOptions::default()
        },
    ));

    let manifest_cache = ManifestStore::open(
        expand_path(&config.general.local_storage_path).join("manifests"),
    )
    .await
    .context("opening local manifest store")?;

    let engine = TrawlEngine::new(
        pool.clone(),
        EngineConfig {
            chunk_size: config.general.chunk_size,
            replication_factor: config.general.replication_factor,
            always_verify_integrity: config.security.always_verify_integrity,
        },
    )
    .with_progress(Arc::new(CliProgress::new(cli.verbose, cli.quiet)))
    .with_local_manifests(manifest_cache);

    // Keep the health registry fresh while a command runs.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let monitor_task = config.general.health_monitoring_enabled.then(|| {
        let monitor = HealthMonitor::new(
            pool.clone(),
            Duration::from_secs(config.general.health_check_interval_secs),
            Some(config.monitoring.latency_alert_threshold_ms as f64),
        );
        tokio::spawn(async move { monitor.run(shutdown_rx).await })
    });

    let outcome = execute(&cli, &engine, &config).await;

    let _ = shutdown_tx.send(true);
    if let Some(task) = monitor_task {
        let _ = task.await;
    }

    outcome
}

async fn execute(cli: &Cli, engine: &TrawlEngine, config: &Config) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Command::Upload {
            local_file,
            remote_name,
        } => {
            if cli.verbose {
                println!("Uploading '{}' as '{remote_name}'...", local_file.display());
            }
            let stats = engine
                .upload(local_file, remote_name)
                .await
                .with_context(|| format!("uploading {remote_name}"))?;
            if !cli.quiet {
                println!("Upload completed successfully.");
            }
            if cli.stats {
                print_stats(&stats);
            }
            log_performance(config, "upload", &stats);
            Ok(ExitCode::SUCCESS)
        }

        Command::Download {
            remote_name,
            local_file,
        } => {
            if cli.verbose {
                println!(
                    "Downloading '{remote_name}' to '{}'...",
                    local_file.display()
                );
            }
            let stats = engine
                .download(remote_name, local_file)
                .await
                .with_context(|| format!("downloading {remote_name}"))?;
            if !cli.quiet {
                println!("Download completed successfully.");
            }
            if cli.stats {
                print_stats(&stats);
            }
            log_performance(config, "download", &stats);
            Ok(ExitCode::SUCCESS)
        }

        Command::List => {
            let manifests = engine.list().await.context("listing files")?;
            if manifests.is_empty() {
                println!("No files found in distributed storage.");
            } else {
                println!("Files in distributed storage:\n");
                println!("{:<30} {:>12} {:>8}  Upload Time", "Name", "Size", "Chunks");
                println!("{:<30} {:>12} {:>8}  -----------", "----", "----", "------");
                for manifest in &manifests {
                    println!(
                        "{:<30} {:>12} {:>8}  {}",
                        manifest.original_filename,
                        format_bytes(manifest.total_size),
                        manifest.chunk_count,
                        format_timestamp(manifest.created_timestamp),
                    );
                }
                println!("\nTotal: {} files", manifests.len());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Delete { remote_name } => {
            if cli.verbose {
                println!("Deleting '{remote_name}'...");
            }
            engine
                .delete(remote_name)
                .await
                .with_context(|| format!("deleting {remote_name}"))?;
            if !cli.quiet {
                println!("File deleted successfully.");
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Verify { remote_name } => {
            if cli.repair && !config.repair.auto_repair_enabled {
                anyhow::bail!("repair requested but auto_repair_enabled = false in configuration");
            }
            if cli.verbose {
                println!(
                    "Verifying '{remote_name}'{}...",
                    if cli.repair { " (repair mode)" } else { "" }
                );
            }
            let mut stats = engine
                .verify(remote_name, cli.repair)
                .await
                .with_context(|| format!("verifying {remote_name}"))?;

            if cli.repair {
                // The first pass classifies before it mends; re-verify
                // until clean or the attempt budget runs out.
                let mut attempts = 1;
                while attempts < config.repair.max_repair_attempts
                    && stats.chunks_degraded + stats.chunks_critical > stats.chunks_repaired
                {
                    tokio::time::sleep(Duration::from_secs(config.repair.repair_delay_secs)).await;
                    attempts += 1;
                    stats = engine
                        .verify(remote_name, true)
                        .await
                        .with_context(|| format!("re-verifying {remote_name}"))?;
                }

                if config.repair.rebalancing_enabled {
                    let moves = engine
                        .rebalance(remote_name)
                        .await
                        .with_context(|| format!("rebalancing {remote_name}"))?;
                    if moves > 0 && !cli.quiet {
                        println!("Rebalanced {moves} replicas.");
                    }
                }
            }

            if !cli.quiet {
                print!(
                    "Verification completed: {} chunks verified",
                    stats.chunks_verified
                );
                if cli.repair && stats.chunks_repaired > 0 {
                    print!(", {} chunks repaired", stats.chunks_repaired);
                }
                println!(".");
                if stats.chunks_lost > 0 {
                    println!("WARNING: {} chunks have no healthy replica.", stats.chunks_lost);
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Health => {
            if cli.verbose {
                println!("Checking server health...");
            }
            let (healthy, total) = engine.health_check().await;
            println!("Server Health Status:");
            println!("  Healthy servers: {healthy} / {total}");
            if healthy == total {
                println!("  Status: All servers healthy");
                Ok(ExitCode::SUCCESS)
            } else if healthy == 0 {
                println!("  Status: All servers offline");
                Ok(ExitCode::FAILURE)
            } else {
                println!("  Status: Partial connectivity");
                Ok(ExitCode::FAILURE)
            }
        }

        Command::Version => unreachable!("handled before configuration load"),
    }
}

fn log_performance(config: &Config, operation: &str, stats: &trawl_types::TransferStats) {
    if config.monitoring.performance_logging {
        tracing::info!(
            operation,
            bytes = stats.bytes_processed,
            chunks = stats.chunks_processed,
            servers = stats.servers_used,
            retries = stats.retries_performed,
            elapsed_secs = stats.elapsed_seconds,
            "operation statistics"
        );
    }
}

fn print_stats(stats: &trawl_types::TransferStats) {
    println!("\nOperation Statistics:");
    println!("  Bytes processed:  {}", format_bytes(stats.bytes_processed));
    println!("  Chunks processed: {}", stats.chunks_processed);
    println!("  Servers used:     {}", stats.servers_used);
    println!("  Duration:         {}", format_duration(stats.elapsed_seconds));
    println!("  Retries:          {}", stats.retries_performed);
    if stats.elapsed_seconds > 0.0 {
        let rate = (stats.bytes_processed as f64 / 1024.0 / 1024.0) / stats.elapsed_seconds;
        println!("  Transfer rate:    {rate:.1} MB/s");
    }
}

fn format_timestamp(secs: u64) -> String {
    use chrono::TimeZone as _;
    match chrono::Local.timestamp_opt(secs as i64, 0).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M").to_string(),
        None => secs.to_string(),
    }
}
