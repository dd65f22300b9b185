//! Configuration from the environment

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;

use crate::delivery::AlarmSettings;
use crate::storage::SqliteConfig;
use crate::storage::StorageConfig;
use crate::utils::env_var_or_else;
use crate::utils::optional_env_var;
use crate::utils::parse_flag;

const DEFAULT_ADDRESS: &str = "0.0.0.0:6000";

/// Everything configurable about Pillbox
pub struct Config {
    /// Where the API listens
    pub address: SocketAddr,

    /// Storage of items and reminders
    pub storage: StorageConfig,

    /// Alarm delivery
    pub alarms: AlarmSettings,

    /// Program that shows notifications, log only when not set
    pub notify_command: Option<String>,
}

impl Config {
    /// Read the configuration from the environment
    ///
    /// # Errors
    ///
    /// Will return `Err` when a variable is set to something unusable
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            address: setup_address()?,
            storage: setup_storage(),
            alarms: setup_alarms()?,
            notify_command: optional_env_var("NOTIFY_COMMAND"),
        })
    }
}

fn setup_address() -> Result<SocketAddr> {
    let mut address = env_var_or_else("ADDRESS", || String::from(DEFAULT_ADDRESS))
        .parse::<SocketAddr>()
        .context("`ADDRESS` is not a valid socket address")?;

    // optional override of just the port
    if let Some(port) = optional_env_var("PORT") {
        let port = port.parse::<u16>().context("`PORT` is not a valid port")?;

        address.set_port(port);
    }

    Ok(address)
}

fn setup_storage() -> StorageConfig {
    match optional_env_var("DATABASE_URL") {
        Some(url) => StorageConfig::Sqlite(SqliteConfig::Url(url)),
        None => {
            tracing::info!("`DATABASE_URL` is not set, items are kept in memory only");

            StorageConfig::Memory
        }
    }
}

fn setup_alarms() -> Result<AlarmSettings> {
    let mut alarms = AlarmSettings::default();

    if let Some(exact) = optional_env_var("EXACT_ALARMS") {
        let Some(exact) = parse_flag(&exact) else {
            bail!("`EXACT_ALARMS` should be `true` or `false`, got `{exact}`");
        };

        alarms.exact_allowed = exact;
    }

    if let Some(window) = optional_env_var("ALARM_BATCH_WINDOW") {
        let seconds = window
            .trim()
            .parse::<u64>()
            .context("`ALARM_BATCH_WINDOW` should be a number of seconds")?;

        alarms.batch_window = Duration::from_secs(seconds);
    }

    Ok(alarms)
}
