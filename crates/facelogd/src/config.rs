use crate::service::ServiceLimits;
use anyhow::{Context, Result};
use facelog_core::types::DEFAULT_PAGE_SIZE;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Which message bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Session,
    System,
}

impl BusKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "session" => Some(Self::Session),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Daemon configuration: an optional TOML file, overridden by `FACELOG_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    pub bus: BusKind,
    /// Page size for log queries that do not ask for one.
    pub default_page_size: u32,
    /// Failed attempts listed on the dashboard.
    pub dashboard_failures: u32,
    /// Users listed in the dashboard's most-active table.
    pub dashboard_top_users: usize,
}

/// On-disk shape of the config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    bus: Option<String>,
    default_page_size: Option<u32>,
    dashboard_failures: Option<u32>,
    dashboard_top_users: Option<usize>,
}

impl Config {
    /// Load the file named by `FACELOG_CONFIG` (if any), then apply
    /// environment overrides.
    pub fn from_env() -> Result<Self> {
        let file = match std::env::var_os("FACELOG_CONFIG") {
            Some(path) => read_file(Path::new(&path))?,
            None => FileConfig::default(),
        };
        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = env("FACELOG_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(|| default_data_dir(&env).join("authlog.db"));

        let bus = env("FACELOG_BUS")
            .or(file.bus)
            .and_then(|v| BusKind::parse(&v))
            .unwrap_or(BusKind::Session);

        Self {
            db_path,
            bus,
            default_page_size: parsed(&env, "FACELOG_DEFAULT_PAGE_SIZE")
                .or(file.default_page_size)
                .unwrap_or(DEFAULT_PAGE_SIZE),
            dashboard_failures: parsed(&env, "FACELOG_DASHBOARD_FAILURES")
                .or(file.dashboard_failures)
                .unwrap_or(10),
            dashboard_top_users: parsed(&env, "FACELOG_DASHBOARD_TOP_USERS")
                .or(file.dashboard_top_users)
                .unwrap_or(5),
        }
    }

    pub fn limits(&self) -> ServiceLimits {
        ServiceLimits {
            dashboard_failures: self.dashboard_failures,
            dashboard_top_users: self.dashboard_top_users,
        }
    }
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

fn default_data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facelog")
}

/// Parse an environment value; unparsable values are treated as unset.
fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.trim().parse().ok())
}
