//! Environment-driven server configuration.
//!
//! | Variable             | Default            | Meaning                      |
//! |----------------------|--------------------|------------------------------|
//! | `MERIDIAN_ADDR`      | `127.0.0.1:8787`   | Listen address               |
//! | `MERIDIAN_DB`        | `./meridian_dev.db`| SQLite database path         |
//! | `MERIDIAN_SLIPS_DIR` | `./slips`          | Payment-slip directory       |
//! | `MERIDIAN_USER_ID`   | `1`                | Actor attributed to orders   |

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub addr: SocketAddr,
    pub database_path: PathBuf,
    pub slips_dir: PathBuf,
    /// Orders are attributed to this user until real authentication lands
    /// in front of the API.
    pub default_user_id: i64,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr_raw = env::var("MERIDIAN_ADDR").unwrap_or_else(|_| "127.0.0.1:8787".to_string());
        let addr = addr_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "MERIDIAN_ADDR",
            value: addr_raw.clone(),
        })?;

        let database_path =
            env::var("MERIDIAN_DB").unwrap_or_else(|_| "./meridian_dev.db".to_string());
        let slips_dir = env::var("MERIDIAN_SLIPS_DIR").unwrap_or_else(|_| "./slips".to_string());

        let user_raw = env::var("MERIDIAN_USER_ID").unwrap_or_else(|_| "1".to_string());
        let default_user_id = user_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "MERIDIAN_USER_ID",
            value: user_raw.clone(),
        })?;

        Ok(ApiConfig {
            addr,
            database_path: PathBuf::from(database_path),
            slips_dir: PathBuf::from(slips_dir),
            default_user_id,
        })
    }
}
