//! Console progress rendering and human-readable formatting.

use std::io::Write as _;
use std::sync::Mutex;

use trawl_engine::{ProgressEvent, ProgressSink};
use trawl_types::now_secs;

/// Progress sink that renders a single updating line in verbose mode.
///
/// Updates are rate-limited to one per second except for phase changes
/// and final updates. Quiet mode swallows everything. The sink never
/// cancels.
pub struct CliProgress {
    verbose: bool,
    quiet: bool,
    state: Mutex<RenderState>,
}

#[derive(Default)]
struct RenderState {
    operation: String,
    last_update: u64,
}

impl CliProgress {
    /// Create a sink honoring the `-v`/`-q` flags.
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            state: Mutex::new(RenderState::default()),
        }
    }
}

impl ProgressSink for CliProgress {
    fn report(&self, event: &ProgressEvent<'_>) -> bool {
        if self.quiet || !self.verbose {
            return true;
        }
        let mut state = self.state.lock().unwrap();

        if state.operation != event.operation {
            state.operation = event.operation.to_string();
            println!("\n{}...", event.operation);
        }

        let now = now_secs();
        let finished = event.total > 0 && event.current == event.total;
        if now == state.last_update && !finished {
            return true;
        }
        state.last_update = now;

        if event.total > 0 {
            let percent = event.current as f64 / event.total as f64 * 100.0;
            if event.bytes_total > 0 {
                print!(
                    "\rProgress: {percent:.1}% ({}/{}) - {} / {}",
                    event.current,
                    event.total,
                    format_bytes(event.bytes_processed),
                    format_bytes(event.bytes_total),
                );
            } else {
                print!("\rProgress: {percent:.1}% ({}/{})", event.current, event.total);
            }
            let _ = std::io::stdout().flush();
            if finished {
                println!();
            }
        }
        true
    }
}

/// Render a byte count with a binary unit, e.g. `10.0 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

/// Render seconds as `12.3s`, `4.5m`, or `1.2h`.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else if seconds < 3600.0 {
        format!("{:.1}m", seconds / 60.0)
    } else {
        format!("{:.1}h", seconds / 3600.0)
    }
}
