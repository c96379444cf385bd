use log::info;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::settings_store::{
    AccessTokenSettings, SettingsError, SettingsStore, ShortenerSettings, MAX_VALIDITY_HOURS,
    MIN_VALIDITY_HOURS,
};

/// immutable view of every admin-editable setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotSettings {
    pub shortener: ShortenerSettings,
    pub access_token: AccessTokenSettings,
}

/// single owner of the bot settings.
///
/// handlers take a [`BotSettings`] snapshot per update and never mutate it;
/// every change goes through the store first and only then replaces the
/// published snapshot, so a failed write leaves readers untouched.
pub struct SettingsService {
    store: SettingsStore,
    current: RwLock<Arc<BotSettings>>,
    // serialises read-modify-write cycles between concurrent admins
    write_lock: tokio::sync::Mutex<()>,
}

impl SettingsService {
    pub async fn load(
        store: SettingsStore,
        shortener_defaults: ShortenerSettings,
    ) -> Result<Self, SettingsError> {
        let shortener = store.load_shortener(&shortener_defaults).await?;
        let access_token = store.load_access_token().await?;
        info!(
            "Loaded settings: shortener {} ({}), access token {} ({}h)",
            if shortener.enabled { "enabled" } else { "disabled" },
            shortener.domain,
            if access_token.enabled { "enabled" } else { "disabled" },
            access_token.validity_hours
        );

        Ok(Self {
            store,
            current: RwLock::new(Arc::new(BotSettings {
                shortener,
                access_token,
            })),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub async fn snapshot(&self) -> Arc<BotSettings> {
        self.current.read().await.clone()
    }

    async fn update_shortener<F>(&self, change: F) -> Result<Arc<BotSettings>, SettingsError>
    where
        F: FnOnce(&mut ShortenerSettings),
    {
        let _guard = self.write_lock.lock().await;
        let mut next = (*self.snapshot().await).clone();
        change(&mut next.shortener);
        self.store.save_shortener(&next.shortener).await?;
        Ok(self.publish(next).await)
    }

    async fn update_access_token<F>(&self, change: F) -> Result<Arc<BotSettings>, SettingsError>
    where
        F: FnOnce(&mut AccessTokenSettings),
    {
        let _guard = self.write_lock.lock().await;
        let mut next = (*self.snapshot().await).clone();
        change(&mut next.access_token);
        self.store.save_access_token(&next.access_token).await?;
        Ok(self.publish(next).await)
    }

    async fn publish(&self, next: BotSettings) -> Arc<BotSettings> {
        let next = Arc::new(next);
        *self.current.write().await = next.clone();
        next
    }

    pub async fn toggle_shortener(&self) -> Result<Arc<BotSettings>, SettingsError> {
        self.update_shortener(|s| s.enabled = !s.enabled).await
    }

    pub async fn set_shortener_credentials(
        &self,
        domain: &str,
        api_key: &str,
    ) -> Result<Arc<BotSettings>, SettingsError> {
        self.update_shortener(|s| {
            s.domain = domain.to_string();
            s.api_key = api_key.to_string();
        })
        .await
    }

    pub async fn set_tutorial_link(&self, link: &str) -> Result<Arc<BotSettings>, SettingsError> {
        self.update_shortener(|s| s.tutorial_link = link.to_string())
            .await
    }

    pub async fn toggle_access_token(&self) -> Result<Arc<BotSettings>, SettingsError> {
        self.update_access_token(|s| s.enabled = !s.enabled).await
    }

    pub async fn set_token_validity(&self, hours: i32) -> Result<Arc<BotSettings>, SettingsError> {
        if !(MIN_VALIDITY_HOURS..=MAX_VALIDITY_HOURS).contains(&hours) {
            return Err(SettingsError::InvalidValue(format!(
                "validity must be between {} and {} hours",
                MIN_VALIDITY_HOURS, MAX_VALIDITY_HOURS
            )));
        }
        self.update_access_token(|s| s.validity_hours = hours).await
    }
}
