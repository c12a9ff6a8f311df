use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use eduq_model::ProfileCatalog;
use eduq_reconcile::{DEFAULT_BULK_TIMEOUT, DEFAULT_TRIGGER_TIMEOUT, MAX_DEADLINE};

use crate::db::DbConfig;
use crate::openstack::OpenStackConfig;

/// Default capacity of the reconcile trigger queue.
pub const DEFAULT_TRIGGER_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    pub database: DbConfig,
    pub profiles_path: Option<PathBuf>,
    pub bulk_timeout: Duration,
    pub trigger_timeout: Duration,
    pub trigger_queue_capacity: usize,
    pub mock_backends: bool,
    pub openstack: Option<OpenStackConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("QUOTA_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .context("invalid QUOTA_LISTEN_ADDR")?;

        let log_level = std::env::var("QUOTA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = env_flag("QUOTA_DEV");
        let mock_backends = env_flag("QUOTA_MOCK_BACKENDS");

        let profiles_path = std::env::var("QUOTA_PROFILES_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let bulk_timeout = env_secs("QUOTA_BULK_TIMEOUT_SECS").unwrap_or(DEFAULT_BULK_TIMEOUT);
        let trigger_timeout =
            env_secs("QUOTA_TRIGGER_TIMEOUT_SECS").unwrap_or(DEFAULT_TRIGGER_TIMEOUT);

        let trigger_queue_capacity = std::env::var("QUOTA_TRIGGER_QUEUE_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(DEFAULT_TRIGGER_QUEUE_CAPACITY);

        let database = DbConfig::from_env();
        let openstack = OpenStackConfig::from_env()?;

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            database,
            profiles_path,
            bulk_timeout,
            trigger_timeout,
            trigger_queue_capacity,
            mock_backends,
            openstack,
        })
    }

    /// Load the profile catalog, falling back to the built-in one.
    pub fn load_catalog(&self) -> Result<ProfileCatalog> {
        let Some(path) = &self.profiles_path else {
            return Ok(ProfileCatalog::builtin());
        };

        let doc = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read profile catalog {}", path.display()))?;
        ProfileCatalog::from_toml_str(&doc)
            .with_context(|| format!("failed to load profile catalog {}", path.display()))
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name).ok().and_then(|s| parse_secs(&s))
}

/// Parse a positive deadline no longer than [`MAX_DEADLINE`].
fn parse_secs(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse()
        .ok()
        .filter(|&secs: &u64| secs > 0)
        .map(Duration::from_secs)
        .filter(|&d| d <= MAX_DEADLINE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_with_profiles(path: Option<PathBuf>) -> Config {
        Config {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            dev_mode: false,
            database: DbConfig::default(),
            profiles_path: path,
            bulk_timeout: DEFAULT_BULK_TIMEOUT,
            trigger_timeout: DEFAULT_TRIGGER_TIMEOUT,
            trigger_queue_capacity: DEFAULT_TRIGGER_QUEUE_CAPACITY,
            mock_backends: false,
            openstack: None,
        }
    }

    #[test]
    fn test_deadline_parsing_is_bounded() {
        assert_eq!(parse_secs("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_secs("0"), None);
        assert_eq!(parse_secs("soon"), None);
        assert_eq!(parse_secs("18446744073709551615"), None);
    }

    #[test]
    fn test_builtin_catalog_without_path() {
        let catalog = config_with_profiles(None).load_catalog().unwrap();
        assert_eq!(catalog, ProfileCatalog::builtin());
    }

    #[test]
    fn test_catalog_from_file() {
        let path = std::env::temp_dir().join(format!(
            "eduq-profiles-{}.toml",
            uuid::Uuid::new_v4()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[profiles.basic]\ncores = 2\n\n[profiles.gpu]\ncores = 32").unwrap();

        let catalog = config_with_profiles(Some(path.clone()))
            .load_catalog()
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(catalog.baseline().cores, 2);
        assert_eq!(catalog.get("GPU").unwrap().cores, 32);
        assert!(catalog.get("lab").is_none());
    }

    #[test]
    fn test_missing_catalog_file_is_an_error() {
        let path = std::env::temp_dir().join("eduq-does-not-exist.toml");
        assert!(config_with_profiles(Some(path)).load_catalog().is_err());
    }
}
