//! Engine configuration.
//!
//! Configuration is loaded from `COMPTOIR_*` environment variables with
//! fallback to defaults.
//!
//! | Variable | Default |
//! |---|---|
//! | `COMPTOIR_DB_PATH` | `comptoir.db` |
//! | `COMPTOIR_DB_MAX_CONNECTIONS` | `5` |
//! | `COMPTOIR_CURRENCY_SYMBOL` | `€` |
//! | `COMPTOIR_PRICE_VISIBILITY` | `visible` |
//! | `COMPTOIR_READ_RETRY_ATTEMPTS` | `3` |
//! | `COMPTOIR_READ_RETRY_DELAY_MS` | `50` |
//! | `COMPTOIR_TOP_N` | `5` |
//! | `COMPTOIR_MAX_CART_ITEMS` | `100` |
//! | `COMPTOIR_MAX_ITEM_QUANTITY` | `999` |

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use comptoir_core::stats::DEFAULT_TOP_N;
use comptoir_core::{CartLimits, MAX_CART_ITEMS, MAX_ITEM_QUANTITY};
use comptoir_db::DbConfig;

use crate::presentation::PriceVisibility;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite database file.
    pub db_path: PathBuf,

    /// Pool size.
    pub db_max_connections: u32,

    /// Symbol appended to displayed amounts.
    pub currency_symbol: String,

    /// Default audience for rendered carts.
    pub price_visibility: PriceVisibility,

    /// Total attempts for a read that hits a transient storage error.
    pub read_retry_attempts: u32,

    /// Fixed pause between read attempts.
    pub read_retry_delay: Duration,

    /// Length of the company/client rankings in stats.
    pub top_n: usize,

    /// Distinct products per cart.
    pub max_cart_items: usize,

    /// Quantity per line.
    pub max_item_quantity: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            db_path: PathBuf::from("comptoir.db"),
            db_max_connections: 5,
            currency_symbol: "€".to_string(),
            price_visibility: PriceVisibility::Visible,
            read_retry_attempts: 3,
            read_retry_delay: Duration::from_millis(50),
            top_n: DEFAULT_TOP_N,
            max_cart_items: MAX_CART_ITEMS,
            max_item_quantity: MAX_ITEM_QUANTITY,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            db_path: lookup("COMPTOIR_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),

            db_max_connections: parse_or(&lookup, "COMPTOIR_DB_MAX_CONNECTIONS", defaults.db_max_connections)?,

            currency_symbol: lookup("COMPTOIR_CURRENCY_SYMBOL").unwrap_or(defaults.currency_symbol),

            price_visibility: parse_or(&lookup, "COMPTOIR_PRICE_VISIBILITY", defaults.price_visibility)?,

            read_retry_attempts: parse_or(&lookup, "COMPTOIR_READ_RETRY_ATTEMPTS", defaults.read_retry_attempts)?,

            read_retry_delay: Duration::from_millis(parse_or(
                &lookup,
                "COMPTOIR_READ_RETRY_DELAY_MS",
                defaults.read_retry_delay.as_millis() as u64,
            )?),

            top_n: parse_or(&lookup, "COMPTOIR_TOP_N", defaults.top_n)?,

            max_cart_items: parse_or(&lookup, "COMPTOIR_MAX_CART_ITEMS", defaults.max_cart_items)?,

            max_item_quantity: parse_or(&lookup, "COMPTOIR_MAX_ITEM_QUANTITY", defaults.max_item_quantity)?,
        };

        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("COMPTOIR_DB_MAX_CONNECTIONS".to_string()));
        }
        if config.max_cart_items == 0 {
            return Err(ConfigError::InvalidValue("COMPTOIR_MAX_CART_ITEMS".to_string()));
        }
        if config.max_item_quantity < 1 {
            return Err(ConfigError::InvalidValue("COMPTOIR_MAX_ITEM_QUANTITY".to_string()));
        }

        Ok(config)
    }

    /// Database settings derived from this configuration.
    pub fn to_db_config(&self) -> DbConfig {
        DbConfig::new(&self.db_path).max_connections(self.db_max_connections)
    }

    /// Cart size limits.
    pub fn cart_limits(&self) -> CartLimits {
        CartLimits {
            max_items: self.max_cart_items,
            max_item_quantity: self.max_item_quantity,
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
