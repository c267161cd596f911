//! Tracing initialization for the CLI.
//!
//! One init point, called before any event is emitted. The filter comes
//! from `RUST_LOG` when set, otherwise from the configured level as
//! adjusted by `-v`/`-q`. With a configured log file, records go to a
//! daily-rotated file through a non-blocking writer; otherwise to
//! stderr, keeping stdout for command output.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::expand_path;

/// Initialize the subscriber; the returned guard must live until exit
/// so buffered file records are flushed.
pub fn init(config_level: &str, log_file: &str, verbose: bool, quiet: bool) -> Option<WorkerGuard> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        config_level
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if log_file.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return None;
    }

    let path = expand_path(log_file);
    let directory = path.parent().unwrap_or(std::path::Path::new(".")).to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "trawl.log".to_string());
    if let Err(e) = std::fs::create_dir_all(&directory) {
        eprintln!(
            "warning: cannot create log directory {}: {e}; logging to stderr",
            directory.display()
        );
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}
