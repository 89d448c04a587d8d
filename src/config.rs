use std::{fs, path::Path, path::PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CinemaError, Result};
use crate::store::Store;
use crate::utils;

const DEFAULT_TIMEZONE: &str = "Asia/Jakarta";
const DEFAULT_MORNING_HOUR: u32 = 7;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
const DEFAULT_USER_AGENT: &str = "showtimes/0.1 (+https://github.com/showtimes/showtimes)";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendKind,
    /// Only used by the sqlite backend; defaults to the data root.
    pub database_path: Option<PathBuf>,
    pub timezone: String,
    /// Local hour of the same-day refresh; midnight is the other boundary.
    pub morning_refresh_hour: u32,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub providers: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            database_path: None,
            timezone: DEFAULT_TIMEZONE.to_string(),
            morning_refresh_hour: DEFAULT_MORNING_HOUR,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            providers: vec!["xxi".to_string(), "cgvblitz".to_string()],
        }
    }
}

impl AppConfig {
    /// Reads `config.json` from the data root (if present), then applies
    /// `SHOWTIMES_*` environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(&utils::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = read_config(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("SHOWTIMES_BACKEND") {
            self.backend = match backend.trim().to_ascii_lowercase().as_str() {
                "memory" => BackendKind::Memory,
                "sqlite" => BackendKind::Sqlite,
                other => return Err(CinemaError::Config(format!("unknown backend: {other}"))),
            };
        }
        if let Some(path) = lookup("SHOWTIMES_DB_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(timezone) = lookup("SHOWTIMES_TIMEZONE") {
            self.timezone = timezone;
        }
        if let Some(hour) = lookup("SHOWTIMES_MORNING_HOUR").and_then(|s| s.trim().parse().ok()) {
            self.morning_refresh_hour = hour;
        }
        if let Some(secs) =
            lookup("SHOWTIMES_HTTP_TIMEOUT_SECS").and_then(|s| s.trim().parse().ok())
        {
            self.http_timeout_secs = secs;
        }
        if let Some(providers) = lookup("SHOWTIMES_PROVIDERS") {
            self.providers = providers
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.timezone()?;
        if self.morning_refresh_hour > 23 {
            return Err(CinemaError::Config(format!(
                "morning_refresh_hour must be 0-23, got {}",
                self.morning_refresh_hour
            )));
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|err| CinemaError::Config(format!("timezone {}: {err}", self.timezone)))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(utils::database_path)
    }

    pub fn open_store(&self) -> Result<Store> {
        match self.backend {
            BackendKind::Memory => Ok(Store::in_memory()),
            BackendKind::Sqlite => Store::open_sqlite(&self.database_path()),
        }
    }
}

fn read_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .map_err(|err| CinemaError::Config(format!("{}: {err}", path.display())))?;
    serde_json::from_str(&contents)
        .map_err(|err| CinemaError::Config(format!("{}: {err}", path.display())))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = read_config(&dir.path().join("config.json")).expect("read");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.timezone().expect("tz"), chrono_tz::Asia::Jakarta);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"backend": "sqlite", "morning_refresh_hour": 6}"#).expect("write");

        let config = read_config(&path).expect("read");
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.morning_refresh_hour, 6);
        assert_eq!(config.providers.len(), 2);
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SHOWTIMES_BACKEND", "SQLite"),
            ("SHOWTIMES_PROVIDERS", "xxi, "),
            ("SHOWTIMES_TIMEZONE", "Asia/Makassar"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .expect("apply");

        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.providers, vec!["xxi".to_string()]);
        assert_eq!(config.timezone().expect("tz"), chrono_tz::Asia::Makassar);
    }

    #[test]
    fn rejects_bad_timezone_and_hour() {
        let config = AppConfig {
            timezone: "Mars/Olympus".into(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            morning_refresh_hour: 24,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
