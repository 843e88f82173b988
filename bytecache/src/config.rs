//! Cache configuration.
//!
//! Construction normally goes through [`crate::CacheBuilder`]; `Config` is
//! the file-friendly form of the same knobs, loadable from TOML.

use std::path::{Path, PathBuf};

use cache_policy::{BasicLru, Policy, TwoQ};
use serde::Deserialize;

/// Default database path.
pub const DEFAULT_DB_PATH: &str = "/tmp/lru.db";
/// Default table name inside the database.
pub const DEFAULT_BUCKET: &str = "lru";
/// Default cache capacity in bytes (1 GiB).
pub const DEFAULT_CAPACITY: u64 = 1 << 30;

/// Cache configuration loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Path of the database file holding the persisted entries.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Name of the table inside the database.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Total capacity in bytes.
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// Replacement policy selection.
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Replacement policy selection and tuning.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PolicyConfig {
    /// The 2Q engine.
    TwoQ {
        /// Share of capacity freed beyond the limit per eviction pass.
        #[serde(default = "default_evict_ratio")]
        evict_ratio: f64,
        /// Share of capacity reserved for once-requested keys.
        #[serde(default = "default_warm_hot_ratio")]
        warm_hot_ratio: f64,
        /// Ghost queue size relative to total capacity.
        #[serde(default = "default_cold_ratio")]
        cold_ratio: f64,
    },
    /// The plain LRU engine.
    Lru {
        /// Share of capacity freed beyond the limit per eviction pass.
        #[serde(default = "default_evict_ratio")]
        evict_ratio: f64,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bucket: default_bucket(),
            capacity: default_capacity(),
            policy: PolicyConfig::default(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::TwoQ {
            evict_ratio: default_evict_ratio(),
            warm_hot_ratio: default_warm_hot_ratio(),
            cold_ratio: default_cold_ratio(),
        }
    }
}

impl Config {
    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Construct the configured replacement policy.
    pub fn build_policy(&self) -> Box<dyn Policy> {
        match self.policy {
            PolicyConfig::TwoQ {
                evict_ratio,
                warm_hot_ratio,
                cold_ratio,
            } => Box::new(TwoQ::new(
                self.capacity,
                evict_ratio,
                warm_hot_ratio,
                cold_ratio,
            )),
            PolicyConfig::Lru { evict_ratio } => {
                Box::new(BasicLru::new(self.capacity, evict_ratio))
            }
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_capacity() -> u64 {
    DEFAULT_CAPACITY
}

fn default_evict_ratio() -> f64 {
    cache_policy::DEFAULT_EVICT_RATIO
}

fn default_warm_hot_ratio() -> f64 {
    cache_policy::DEFAULT_WARM_HOT_RATIO
}

fn default_cold_ratio() -> f64 {
    cache_policy::DEFAULT_COLD_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.db_path, PathBuf::from("/tmp/lru.db"));
        assert_eq!(config.bucket, "lru");
        assert_eq!(config.capacity, 1 << 30);
        assert!(matches!(config.policy, PolicyConfig::TwoQ { .. }));
    }

    #[test]
    fn empty_toml_yields_the_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.bucket, "lru");
        assert_eq!(config.capacity, 1 << 30);
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/var/cache/pages.db"
            capacity = 4096

            [policy]
            kind = "twoq"
            warm_hot_ratio = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/cache/pages.db"));
        assert_eq!(config.bucket, "lru");
        assert_eq!(config.capacity, 4096);
        match config.policy {
            PolicyConfig::TwoQ {
                evict_ratio,
                warm_hot_ratio,
                cold_ratio,
            } => {
                assert_eq!(evict_ratio, 0.001);
                assert_eq!(warm_hot_ratio, 0.5);
                assert_eq!(cold_ratio, 0.5);
            }
            PolicyConfig::Lru { .. } => panic!("wrong policy"),
        }
    }

    #[test]
    fn lru_policy_is_selectable() {
        let config: Config = toml::from_str(
            r#"
            [policy]
            kind = "lru"
            "#,
        )
        .unwrap();
        let policy = config.build_policy();
        assert_eq!(policy.cap(), 1 << 30);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Config>("nope = true").is_err());
    }

    #[test]
    fn load_reads_a_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.toml");
        std::fs::write(&path, "capacity = 2048\nbucket = \"pages\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.capacity, 2048);
        assert_eq!(config.bucket, "pages");
        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }
}
