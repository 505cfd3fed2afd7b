//! Layered configuration.
//!
//! Sources, lowest precedence first:
//! 1. Defaults in code
//! 2. Optional `config/stockkeep.{toml,yaml,json}` file
//! 3. `STOCKKEEP__SECTION__KEY` environment variables

use config::{ConfigBuilder, ConfigError, Environment, File, FileFormat, builder::DefaultState};
use serde::Deserialize;

use stockkeep_inventory::{BulkMode, validate_multiplier};

const ENV_PREFIX: &str = "STOCKKEEP";
const CONFIG_FILE: &str = "config/stockkeep";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InventoryConfig {
    pub database: DatabaseConfig,
    pub bulk: BulkConfig,
    pub alerts: AlertConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres URL. Without one, callers fall back to the in-memory store.
    #[serde(default)]
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BulkConfig {
    pub mode: BulkMode,
    /// Larger batches are rejected before a transaction opens.
    pub max_items: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AlertConfig {
    /// How many alerts the dashboard lists as priority items.
    pub priority_limit: usize,
    pub default_threshold_multiplier: f64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                acquire_timeout_secs: 5,
            },
            bulk: BulkConfig {
                mode: BulkMode::Strict,
                max_items: 500,
            },
            alerts: AlertConfig {
                priority_limit: 10,
                default_threshold_multiplier: 1.0,
            },
        }
    }
}

impl InventoryConfig {
    /// Load from the config file (if present) and environment.
    pub fn load() -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()
            .and_then(Self::validated)
    }

    /// Defaults overlaid with a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize::<Self>()
            .and_then(Self::validated)
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "database.max_connections must be positive".to_string(),
            ));
        }
        if self.bulk.max_items == 0 {
            return Err(ConfigError::Message(
                "bulk.max_items must be positive".to_string(),
            ));
        }
        validate_multiplier(self.alerts.default_threshold_multiplier).map_err(|_| {
            ConfigError::Message(
                "alerts.default_threshold_multiplier must be a finite positive number".to_string(),
            )
        })?;
        Ok(self)
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let d = InventoryConfig::default();
    config::Config::builder()
        .set_default("database.max_connections", i64::from(d.database.max_connections))?
        .set_default("database.acquire_timeout_secs", d.database.acquire_timeout_secs as i64)?
        .set_default("bulk.mode", "strict")?
        .set_default("bulk.max_items", d.bulk.max_items as i64)?
        .set_default("alerts.priority_limit", d.alerts.priority_limit as i64)?
        .set_default(
            "alerts.default_threshold_multiplier",
            d.alerts.default_threshold_multiplier,
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(InventoryConfig::from_toml("").unwrap(), InventoryConfig::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let cfg = InventoryConfig::from_toml(
            r#"
            [database]
            url = "postgres://localhost/stock"

            [bulk]
            mode = "best_effort"
            max_items = 20

            [alerts]
            default_threshold_multiplier = 1.5
            "#,
        )
        .unwrap();

        assert_eq!(cfg.database.url.as_deref(), Some("postgres://localhost/stock"));
        assert_eq!(cfg.database.max_connections, 10);
        assert_eq!(cfg.bulk.mode, BulkMode::BestEffort);
        assert_eq!(cfg.bulk.max_items, 20);
        assert_eq!(cfg.alerts.default_threshold_multiplier, 1.5);
        assert_eq!(cfg.alerts.priority_limit, 10);
    }

    #[test]
    fn non_positive_values_are_rejected() {
        assert!(InventoryConfig::from_toml("[bulk]\nmax_items = 0").is_err());
        assert!(InventoryConfig::from_toml("[alerts]\ndefault_threshold_multiplier = 0.0").is_err());
    }

    #[test]
    fn unknown_bulk_mode_is_rejected() {
        assert!(InventoryConfig::from_toml("[bulk]\nmode = \"lenient\"").is_err());
    }
}
