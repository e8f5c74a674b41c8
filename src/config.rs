use std::path::PathBuf;

use serde::Deserialize;

use crate::domain::models::SortField;

/// Planet identity and render options loaded from `planetd.toml`, per
/// spec §6's enumerated configuration surface. Environment variables
/// (`PLANETD_*`) override individual fields, matching the teacher's
/// `Config::from_env` pattern generalized to a file-backed config.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_path: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    pub planet: PlanetIdentity,
    #[serde(default = "default_render")]
    pub render: RenderOptions,
    #[serde(default)]
    pub feeds: Vec<FeedOverride>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanetIdentity {
    pub name: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub owner_name: String,
    #[serde(default)]
    pub owner_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderOptions {
    #[serde(default = "default_days")]
    pub days: i64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_true")]
    pub group_by_date: bool,
    #[serde(default)]
    pub filter_by_first_seen: bool,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default)]
    pub static_source_dir: Option<PathBuf>,
}

/// A per-feed polling override, keyed by the feed's registered URL.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedOverride {
    pub url: String,
    pub fetch_interval: Option<i64>,
    pub active: Option<bool>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}
fn default_days() -> i64 {
    14
}
fn default_concurrency() -> usize {
    5
}
fn default_true() -> bool {
    true
}
fn default_sort_by() -> String {
    "published".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_render() -> RenderOptions {
    RenderOptions {
        days: default_days(),
        concurrency: default_concurrency(),
        group_by_date: true,
        filter_by_first_seen: false,
        sort_by: default_sort_by(),
        static_source_dir: None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("sort_by must be \"published\" or \"first_seen\", got {0:?}")]
    InvalidSortBy(String),
    #[error("concurrency must be between 1 and 50, got {0}")]
    InvalidConcurrency(usize),
}

impl Config {
    /// Load configuration from `path`, then apply `PLANETD_*` environment
    /// variable overrides (via `dotenvy`, mirroring the teacher's
    /// `Config::from_env`) for the fields most commonly tweaked per
    /// deployment.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&raw)?;

        if let Ok(database_path) = std::env::var("PLANETD_DATABASE_PATH") {
            config.database_path = database_path;
        }
        if let Ok(output_dir) = std::env::var("PLANETD_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(output_dir);
        }
        if let Ok(log_level) = std::env::var("PLANETD_LOG_LEVEL") {
            config.log_level = log_level;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if SortField::parse(&self.render.sort_by).is_none() {
            return Err(ConfigError::InvalidSortBy(self.render.sort_by.clone()));
        }
        if self.render.concurrency == 0 || self.render.concurrency > 50 {
            return Err(ConfigError::InvalidConcurrency(self.render.concurrency));
        }
        Ok(())
    }

    pub fn sort_field(&self) -> SortField {
        SortField::parse(&self.render.sort_by).expect("validated at load time")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml_str = r#"
            database_path = "planet.db"

            [planet]
            name = "My Planet"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.planet.name, "My Planet");
        assert_eq!(config.render.days, 14);
        assert_eq!(config.render.concurrency, 5);
        assert!(config.render.group_by_date);
    }

    #[test]
    fn rejects_invalid_sort_by() {
        let toml_str = r#"
            database_path = "planet.db"

            [planet]
            name = "My Planet"

            [render]
            sort_by = "nonsense"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSortBy(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_concurrency() {
        let toml_str = r#"
            database_path = "planet.db"

            [planet]
            name = "My Planet"

            [render]
            concurrency = 0
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConcurrency(_))
        ));
    }
}
