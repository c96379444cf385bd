use deadpool_postgres::Pool;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

use crate::config::BotConfig;

const SHORTENER_KEY: &str = "shortener";
const ACCESS_TOKEN_KEY: &str = "access_token";

pub const DEFAULT_VALIDITY_HOURS: i32 = 12;
pub const MIN_VALIDITY_HOURS: i32 = 1;
pub const MAX_VALIDITY_HOURS: i32 = 720;

#[derive(Debug)]
pub enum SettingsError {
    InvalidValue(String),
    DatabaseError(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::InvalidValue(msg) => write!(f, "Invalid setting: {}", msg),
            SettingsError::DatabaseError(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl Error for SettingsError {}

impl From<tokio_postgres::Error> for SettingsError {
    fn from(err: tokio_postgres::Error) -> Self {
        SettingsError::DatabaseError(Box::new(err))
    }
}

impl From<deadpool_postgres::PoolError> for SettingsError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        SettingsError::DatabaseError(Box::new(err))
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(err: serde_json::Error) -> Self {
        SettingsError::DatabaseError(Box::new(err))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortenerSettings {
    pub enabled: bool,
    pub domain: String,
    pub api_key: String,
    pub tutorial_link: String,
}

impl ShortenerSettings {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            enabled: true,
            domain: config.default_short_url.clone(),
            api_key: config.default_short_api.clone(),
            tutorial_link: config.default_tutorial_link.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenSettings {
    pub enabled: bool,
    pub validity_hours: i32,
}

impl Default for AccessTokenSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            validity_hours: DEFAULT_VALIDITY_HOURS,
        }
    }
}

/// persistence for admin-editable settings, one JSONB document per key
pub struct SettingsStore {
    pool: Pool,
}

impl SettingsStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SettingsError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT value FROM bot_settings WHERE key = $1", &[&key])
            .await?;

        match row {
            Some(row) => {
                let value: serde_json::Value = row.get(0);
                match serde_json::from_value(value) {
                    Ok(parsed) => Ok(Some(parsed)),
                    Err(e) => {
                        // an unreadable document is treated as unset so defaults apply
                        warn!("Failed to parse stored setting '{}': {}", key, e);
                        Ok(None)
                    }
                }
            }
            None => Ok(None),
        }
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SettingsError> {
        let json = serde_json::to_value(value)?;
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO bot_settings (key, value, updated_at) VALUES ($1, $2, NOW())
                 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
                &[&key, &json],
            )
            .await?;
        info!("Saved setting '{}'", key);
        Ok(())
    }

    /// stored shortener settings, or `defaults` when none were saved yet
    pub async fn load_shortener(
        &self,
        defaults: &ShortenerSettings,
    ) -> Result<ShortenerSettings, SettingsError> {
        Ok(self
            .load(SHORTENER_KEY)
            .await?
            .unwrap_or_else(|| defaults.clone()))
    }

    pub async fn save_shortener(&self, settings: &ShortenerSettings) -> Result<(), SettingsError> {
        self.save(SHORTENER_KEY, settings).await
    }

    pub async fn load_access_token(&self) -> Result<AccessTokenSettings, SettingsError> {
        Ok(self.load(ACCESS_TOKEN_KEY).await?.unwrap_or_default())
    }

    pub async fn save_access_token(
        &self,
        settings: &AccessTokenSettings,
    ) -> Result<(), SettingsError> {
        if !(MIN_VALIDITY_HOURS..=MAX_VALIDITY_HOURS).contains(&settings.validity_hours) {
            return Err(SettingsError::InvalidValue(format!(
                "validity must be between {} and {} hours, got {}",
                MIN_VALIDITY_HOURS, MAX_VALIDITY_HOURS, settings.validity_hours
            )));
        }
        self.save(ACCESS_TOKEN_KEY, settings).await
    }
}
