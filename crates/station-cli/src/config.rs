//! Configuration Vault – reads/writes `~/.weatherstation/config.toml`.

use serde::{Deserialize, Serialize};
use station_runtime::StationConfig;
use station_types::StationError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the station gets its bus from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// JSON gateway in front of the brick daemon.
    #[default]
    Gateway,
    /// Built-in simulated weather station kit.
    Simulate,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Gateway => write!(f, "gateway"),
            Backend::Simulate => write!(f, "simulate"),
        }
    }
}

/// Persisted user configuration stored in `~/.weatherstation/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Gateway address, `host:port` or a `ws://` URL.
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Echo displayed lines on stdout.
    #[serde(default)]
    pub console_echo: bool,

    #[serde(default = "default_period_ms")]
    pub callback_period_ms: u32,

    #[serde(default)]
    pub backend: Backend,

    /// Per-request timeout of the gateway client.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_addr() -> String {
    "localhost:4223".to_string()
}
fn default_period_ms() -> u32 {
    1000
}
fn default_request_timeout_ms() -> u64 {
    2500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            console_echo: false,
            callback_period_ms: default_period_ms(),
            backend: Backend::default(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Config {
    /// The part of the configuration the running station sees.
    pub fn station_config(&self) -> StationConfig {
        StationConfig {
            console_echo: self.console_echo,
            callback_period_ms: self.callback_period_ms,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Return the path to `~/.weatherstation/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".weatherstation").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, StationError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, StationError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        StationError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| StationError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `WEATHERSTATION_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `WEATHERSTATION_ADDR` | `addr` |
/// | `WEATHERSTATION_CONSOLE` | `console_echo` (`1`/`true`/`yes`/`on` or `0`/`false`/`no`/`off`) |
/// | `WEATHERSTATION_PERIOD_MS` | `callback_period_ms` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("WEATHERSTATION_ADDR") {
        cfg.addr = v;
    }
    if let Ok(v) = std::env::var("WEATHERSTATION_CONSOLE")
        && let Some(echo) = parse_flag(&v)
    {
        cfg.console_echo = echo;
    }
    if let Ok(v) = std::env::var("WEATHERSTATION_PERIOD_MS")
        && let Ok(ms) = v.parse::<u32>()
    {
        cfg.callback_period_ms = ms;
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Save the config to disk, creating `~/.weatherstation/` if necessary.
pub fn save(cfg: &Config) -> Result<(), StationError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), StationError> {
    let write_err = |e: std::io::Error| {
        StationError::Config(format!("failed to write {}: {e}", path.display()))
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(write_err)?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| StationError::Config(format!("failed to serialize config: {e}")))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_kit() {
        let cfg = Config::default();
        assert_eq!(cfg.addr, "localhost:4223");
        assert!(!cfg.console_echo);
        assert_eq!(cfg.callback_period_ms, 1000);
        assert_eq!(cfg.backend, Backend::Gateway);
        assert_eq!(cfg.request_timeout(), Duration::from_millis(2500));
        assert_eq!(cfg.station_config(), StationConfig::default());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_custom_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config {
            addr: "ws://station.local:4280".to_string(),
            console_echo: true,
            callback_period_ms: 250,
            backend: Backend::Simulate,
            request_timeout_ms: 1000,
        };
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "console_echo = true\nbackend = \"simulate\"\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert!(loaded.console_echo);
        assert_eq!(loaded.backend, Backend::Simulate);
        assert_eq!(loaded.addr, "localhost:4223");
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "callback_period_ms = \"soon\"").unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, StationError::Config(_)));
    }

    #[test]
    fn config_path_points_to_station_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".weatherstation"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" Yes "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    // Env overrides share one test: the variables are process-wide.
    #[test]
    fn apply_env_overrides_changes_fields() {
        // SAFETY: the only test touching WEATHERSTATION_* variables.
        unsafe {
            std::env::set_var("WEATHERSTATION_ADDR", "rpi:4223");
            std::env::set_var("WEATHERSTATION_CONSOLE", "true");
            std::env::set_var("WEATHERSTATION_PERIOD_MS", "not-a-number");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.addr, "rpi:4223");
        assert!(cfg.console_echo);
        assert_eq!(cfg.callback_period_ms, 1000);

        unsafe { std::env::set_var("WEATHERSTATION_PERIOD_MS", "500") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.callback_period_ms, 500);

        unsafe {
            std::env::remove_var("WEATHERSTATION_ADDR");
            std::env::remove_var("WEATHERSTATION_CONSOLE");
            std::env::remove_var("WEATHERSTATION_PERIOD_MS");
        }
    }
}
