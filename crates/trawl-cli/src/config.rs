//! INI configuration: defaults, parsing, validation, discovery.
//!
//! Recognized sections are `[general]`, `[server_N]` for `N = 1..32`,
//! `[repair]`, `[monitoring]`, and `[security]`. Unknown sections and
//! keys are ignored for forward compatibility. Size values accept
//! `K`/`M`/`G` (or `KB`/`MB`/`GB`) suffixes, and path values starting
//! with `~` expand to the user's home directory.

use std::path::{Path, PathBuf};

use ini::Ini;
use trawl_types::{
    ServerDescriptor, ServerId, DEFAULT_CHUNK_SIZE, DEFAULT_REPLICATION_FACTOR, MAX_CHUNK_SIZE,
    MAX_REPLICATION_FACTOR, MAX_SERVERS, MIN_CHUNK_SIZE, MIN_REPLICATION_FACTOR,
};

/// Configuration errors; all are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No configuration file was given or discovered.
    #[error("no configuration file found (searched {0:?})")]
    NotFound(Vec<PathBuf>),

    /// The file could not be read or is not valid INI.
    #[error("cannot parse configuration: {0}")]
    Parse(String),

    /// A value is outside its allowed range or a required key is missing.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// Fewer servers configured than the replication factor requires.
    #[error("insufficient servers: replication factor {required} needs at least {required} servers, {configured} configured")]
    InsufficientServers {
        /// The configured replication factor.
        required: u32,
        /// Number of `[server_N]` sections found.
        configured: usize,
    },
}

/// `[general]` settings.
#[derive(Debug, Clone)]
pub struct GeneralConfig {
    /// Chunk split size in bytes.
    pub chunk_size: u64,
    /// Target replicas per chunk.
    pub replication_factor: u32,
    /// Aggregate transfer concurrency.
    pub max_concurrent_operations: usize,
    /// Per-primitive FTP timeout in seconds.
    pub ftp_timeout_secs: u64,
    /// Local working directory (manifest cache, scratch space).
    pub local_storage_path: String,
    /// Log level filter (`error`/`warn`/`info`/`debug`).
    pub log_level: String,
    /// Log file path; empty logs to stderr.
    pub log_file: String,
    /// Run periodic server probes during long operations.
    pub health_monitoring_enabled: bool,
    /// Probe cadence in seconds.
    pub health_check_interval_secs: u64,
}

/// `[repair]` settings.
#[derive(Debug, Clone)]
pub struct RepairConfig {
    /// Repair (rather than just report) during verify runs by default.
    pub auto_repair_enabled: bool,
    /// Upper bound on repair passes per file.
    pub max_repair_attempts: u32,
    /// Delay between repair passes, seconds.
    pub repair_delay_secs: u64,
    /// Allow replica rebalancing.
    pub rebalancing_enabled: bool,
}

/// `[monitoring]` settings.
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Percent of server storage use that triggers an alert.
    pub storage_alert_threshold: u32,
    /// Probe latency above this many milliseconds logs a warning.
    pub latency_alert_threshold_ms: u32,
    /// Log per-operation performance details.
    pub performance_logging: bool,
    /// Where monitoring data is written.
    pub monitoring_data_path: String,
}

/// `[security]` settings.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Verify TLS certificates on FTPS connections.
    pub verify_ssl_certificates: bool,
    /// Re-hash whole files after download.
    pub always_verify_integrity: bool,
    /// Unsupported; rejected when enabled.
    pub encrypt_chunks: bool,
}

/// Full process configuration. Read-only after load.
#[derive(Debug, Clone)]
pub struct Config {
    /// `[general]`.
    pub general: GeneralConfig,
    /// One entry per `[server_N]` section, in section order.
    pub servers: Vec<ServerDescriptor>,
    /// `[repair]`.
    pub repair: RepairConfig,
    /// `[monitoring]`.
    pub monitoring: MonitoringConfig,
    /// `[security]`.
    pub security: SecurityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig {
                chunk_size: DEFAULT_CHUNK_SIZE,
                replication_factor: DEFAULT_REPLICATION_FACTOR,
                max_concurrent_operations: 4,
                ftp_timeout_secs: 30,
                local_storage_path: "~/.trawl/data".to_string(),
                log_level: "info".to_string(),
                log_file: "~/.trawl/trawl.log".to_string(),
                health_monitoring_enabled: true,
                health_check_interval_secs: 300,
            },
            servers: Vec::new(),
            repair: RepairConfig {
                auto_repair_enabled: true,
                max_repair_attempts: 3,
                repair_delay_secs: 10,
                rebalancing_enabled: true,
            },
            monitoring: MonitoringConfig {
                storage_alert_threshold: 85,
                latency_alert_threshold_ms: 1000,
                performance_logging: false,
                monitoring_data_path: "~/.trawl/monitoring".to_string(),
            },
            security: SecurityConfig {
                verify_ssl_certificates: true,
                always_verify_integrity: true,
                encrypt_chunks: false,
            },
        }
    }
}

/// Paths searched when no `-c` flag is given, in order.
fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("trawl.conf")];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".trawl/trawl.conf"));
        paths.push(home.join(".trawl/config"));
    }
    paths.push(PathBuf::from("/etc/trawl/trawl.conf"));
    paths.push(PathBuf::from("/usr/local/etc/trawl/trawl.conf"));
    paths
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            if rest.is_empty() {
                return home;
            }
            return home.join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}

impl Config {
    /// Load from `path`, or discover a file when `None`. The result is
    /// validated; any violation is fatal.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => expand_path(&p.to_string_lossy()),
            None => search_paths()
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| ConfigError::NotFound(search_paths()))?,
        };

        let ini = Ini::load_from_file(&file)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", file.display())))?;
        let config = Self::from_ini(&ini)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from an INI string. Used by tests; validation is separate.
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(props) = ini.section(Some("general")) {
            let g = &mut config.general;
            if let Some(v) = props.get("chunk_size") {
                g.chunk_size = parse_size(v)
                    .ok_or_else(|| ConfigError::Parse(format!("bad chunk_size {v:?}")))?;
            }
            if let Some(v) = props.get("replication_factor") {
                g.replication_factor = parse_int(v)? as u32;
            }
            if let Some(v) = props.get("max_concurrent_operations") {
                g.max_concurrent_operations = parse_int(v)? as usize;
            }
            if let Some(v) = props.get("ftp_timeout") {
                g.ftp_timeout_secs = parse_int(v)? as u64;
            }
            if let Some(v) = props.get("local_storage_path") {
                g.local_storage_path = v.to_string();
            }
            if let Some(v) = props.get("log_level") {
                g.log_level = v.to_lowercase();
            }
            if let Some(v) = props.get("log_file") {
                g.log_file = v.to_string();
            }
            if let Some(v) = props.get("health_monitoring_enabled") {
                g.health_monitoring_enabled = parse_bool(v);
            }
            if let Some(v) = props.get("health_check_interval") {
                g.health_check_interval_secs = parse_int(v)? as u64;
            }
        }

        // [server_N] sections, in N order.
        let mut numbered: Vec<(u32, ServerDescriptor)> = Vec::new();
        for (section, props) in ini.iter() {
            let Some(name) = section else { continue };
            let Some(number) = name.strip_prefix("server_") else {
                continue;
            };
            let number: u32 = number
                .parse()
                .map_err(|_| ConfigError::Parse(format!("bad server section [{name}]")))?;
            if number == 0 || number as usize > MAX_SERVERS {
                return Err(ConfigError::Parse(format!(
                    "server section [{name}] outside 1..{MAX_SERVERS}"
                )));
            }

            let get = |key: &str| props.get(key).map(str::to_string);
            let descriptor = ServerDescriptor {
                id: ServerId::new(name),
                host: get("host").unwrap_or_default(),
                port: match props.get("port") {
                    Some(v) => parse_int(v)? as u16,
                    None => 21,
                },
                username: get("username").unwrap_or_default(),
                password: get("password").unwrap_or_default(),
                base_path: get("base_path").unwrap_or_default(),
                use_ssl: props.get("use_ssl").map(parse_bool).unwrap_or(false),
                passive_mode: props.get("passive_mode").map(parse_bool).unwrap_or(true),
                priority: match props.get("priority") {
                    Some(v) => parse_int(v)? as i32,
                    None => 0,
                },
            };
            numbered.push((number, descriptor));
        }
        numbered.sort_by_key(|(n, _)| *n);
        config.servers = numbered.into_iter().map(|(_, s)| s).collect();

        if let Some(props) = ini.section(Some("repair")) {
            let r = &mut config.repair;
            if let Some(v) = props.get("auto_repair_enabled") {
                r.auto_repair_enabled = parse_bool(v);
            }
            if let Some(v) = props.get("max_repair_attempts") {
                r.max_repair_attempts = parse_int(v)? as u32;
            }
            if let Some(v) = props.get("repair_delay") {
                r.repair_delay_secs = parse_int(v)? as u64;
            }
            if let Some(v) = props.get("rebalancing_enabled") {
                r.rebalancing_enabled = parse_bool(v);
            }
        }

        if let Some(props) = ini.section(Some("monitoring")) {
            let m = &mut config.monitoring;
            if let Some(v) = props.get("storage_alert_threshold") {
                m.storage_alert_threshold = parse_int(v)? as u32;
            }
            if let Some(v) = props.get("latency_alert_threshold") {
                m.latency_alert_threshold_ms = parse_int(v)? as u32;
            }
            if let Some(v) = props.get("performance_logging") {
                m.performance_logging = parse_bool(v);
            }
            if let Some(v) = props.get("monitoring_data_path") {
                m.monitoring_data_path = v.to_string();
            }
        }

        if let Some(props) = ini.section(Some("security")) {
            let s = &mut config.security;
            if let Some(v) = props.get("verify_ssl_certificates") {
                s.verify_ssl_certificates = parse_bool(v);
            }
            if let Some(v) = props.get("always_verify_integrity") {
                s.always_verify_integrity = parse_bool(v);
            }
            if let Some(v) = props.get("encrypt_chunks") {
                s.encrypt_chunks = parse_bool(v);
            }
        }

        Ok(config)
    }

    /// Assert every range and cross-field constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Validation(msg));
        let g = &self.general;

        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&g.chunk_size) {
            return invalid(format!(
                "chunk_size {} outside [{MIN_CHUNK_SIZE}, {MAX_CHUNK_SIZE}]",
                g.chunk_size
            ));
        }
        if !(MIN_REPLICATION_FACTOR..=MAX_REPLICATION_FACTOR).contains(&g.replication_factor) {
            return invalid(format!(
                "replication_factor {} outside [{MIN_REPLICATION_FACTOR}, {MAX_REPLICATION_FACTOR}]",
                g.replication_factor
            ));
        }
        if !(1..=32).contains(&g.max_concurrent_operations) {
            return invalid(format!(
                "max_concurrent_operations {} outside [1, 32]",
                g.max_concurrent_operations
            ));
        }
        if !(5..=300).contains(&g.ftp_timeout_secs) {
            return invalid(format!(
                "ftp_timeout {} outside [5, 300]",
                g.ftp_timeout_secs
            ));
        }
        if !(30..=3600).contains(&g.health_check_interval_secs) {
            return invalid(format!(
                "health_check_interval {} outside [30, 3600]",
                g.health_check_interval_secs
            ));
        }

        if self.servers.is_empty() {
            return invalid("at least one [server_N] section is required".to_string());
        }
        if self.servers.len() < g.replication_factor as usize {
            return Err(ConfigError::InsufficientServers {
                required: g.replication_factor,
                configured: self.servers.len(),
            });
        }
        for server in &self.servers {
            if server.host.is_empty() {
                return invalid(format!("server {} has no host", server.id));
            }
            if server.port == 0 {
                return invalid(format!("server {} has port 0", server.id));
            }
            if server.username.is_empty() {
                return invalid(format!("server {} has no username", server.id));
            }
            if server.base_path.is_empty() {
                return invalid(format!("server {} has no base_path", server.id));
            }
        }

        if self.security.encrypt_chunks {
            return invalid(
                "encrypt_chunks is not supported; chunk payloads are stored as-is".to_string(),
            );
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "yes" | "1" | "on"
    )
}

fn parse_int(value: &str) -> Result<i64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Parse(format!("bad integer {value:?}")))
}

/// Parse a size with an optional `K`/`M`/`G` (or `KB`/`MB`/`GB`) suffix.
fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, suffix) = value.split_at(split);
    let base: u64 = digits.parse().ok()?;
    let multiplier = match suffix.trim().to_ascii_uppercase().as_str() {
        "" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        _ => return None,
    };
    Some(base * multiplier)
}
