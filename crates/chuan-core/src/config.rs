//! Configuration for the chuan server
//!
//! Sources, in order of precedence:
//! - command-line flags (applied by the binary)
//! - environment variables
//! - the `.chuan.env` dotfile in the working directory
//! - built-in defaults
//!
//! The dotfile uses `KEY=VALUE` lines with `#` comments and optional
//! surrounding quotes; it never overrides a variable that is already
//! set in the environment.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Dotfile loaded automatically from the working directory
pub const ENV_FILE: &str = ".chuan.env";

/// Default HTTP listen port
pub const DEFAULT_PORT: u16 = 8080;

/// Default TURN listen port
pub const DEFAULT_TURN_PORT: u16 = 3478;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen port
    pub port: u16,
    /// External static frontend directory (embedded tree when unset)
    pub frontend_dir: Option<PathBuf>,
    /// TURN relay settings
    pub turn: TurnConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            frontend_dir: None,
            turn: TurnConfig::default(),
        }
    }
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Start the embedded TURN server
    pub enabled: bool,
    /// UDP+TCP listen port
    pub port: u16,
    /// Single allowed username
    pub username: String,
    /// That user's secret
    pub password: String,
    /// Authentication realm
    pub realm: String,
    /// Host advertised to clients in `turn:` URLs
    pub public_host: String,
    /// Relay address handed to the TURN library; must be the public IP
    /// in a production deployment
    pub relay_ip: IpAddr,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_TURN_PORT,
            username: "chuan".to_string(),
            password: "chuan123".to_string(),
            realm: "localhost".to_string(),
            public_host: "localhost".to_string(),
            relay_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

impl Config {
    /// Load configuration: dotfile first, then environment overrides.
    /// Flags are applied afterwards by the binary.
    pub fn load() -> Self {
        if load_env_file(Path::new(ENV_FILE)).is_ok() {
            info!("Loaded config file: {}", ENV_FILE);
        }
        Self::from_env()
    }

    /// Build configuration from the current environment
    pub fn from_env() -> Self {
        let defaults = TurnConfig::default();

        let turn = TurnConfig {
            enabled: env_var("TURN_ENABLED").as_deref() == Some("true"),
            port: env_parsed("TURN_PORT").unwrap_or(defaults.port),
            username: env_var("TURN_USERNAME").unwrap_or(defaults.username),
            password: env_var("TURN_PASSWORD").unwrap_or(defaults.password),
            realm: env_var("TURN_REALM").unwrap_or(defaults.realm),
            public_host: env_var("TURN_PUBLIC_HOST").unwrap_or(defaults.public_host),
            relay_ip: env_parsed("TURN_RELAY_IP").unwrap_or(defaults.relay_ip),
        };

        Self {
            port: env_parsed("PORT").unwrap_or(DEFAULT_PORT),
            frontend_dir: env_var("FRONTEND_DIR").map(PathBuf::from),
            turn,
        }
    }

    /// Log the effective configuration at startup
    pub fn log_summary(&self) {
        match &self.frontend_dir {
            Some(dir) if dir.is_dir() => info!("Serving frontend from {:?}", dir),
            Some(dir) => warn!(
                "Frontend directory {:?} not usable, falling back to embedded files",
                dir
            ),
            None => info!("Serving embedded frontend files"),
        }

        if self.turn.enabled {
            info!(
                "TURN server enabled on port {} (user: {}, realm: {})",
                self.turn.port, self.turn.username, self.turn.realm
            );
        } else {
            info!("TURN server disabled");
        }
    }
}

/// Read a non-empty environment variable
fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read and parse an environment variable, warning on garbage
fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_var(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

/// Load a `KEY=VALUE` dotfile into the process environment.
///
/// Variables already present in the environment win over the file.
pub fn load_env_file(path: &Path) -> std::io::Result<()> {
    let content = std::fs::read_to_string(path)?;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = strip_quotes(value.trim());

        if std::env::var_os(key).is_none() {
            std::env::set_var(key, value);
        }
    }

    Ok(())
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
