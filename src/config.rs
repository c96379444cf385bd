use std::env;
use std::error::Error;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// telegram media groups hold 2 to 10 items
pub const ALBUM_SIZE: RangeInclusive<usize> = 2..=10;

pub const DEFAULT_SHORT_URL: &str = "inshorturl.com";
pub const DEFAULT_TUTORIAL_LINK: &str = "https://t.me/How_to_Download_7x/26";
pub const DEFAULT_START_MESSAGE: &str = "Hello {first}\n\n\
    I can store private files in a specified channel and other users can access them from a special link.";
pub const DEFAULT_REPLY_TEXT: &str = "❌ Don't send me messages directly, I'm only a file share bot!";

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} environment variable is required", key),
            ConfigError::Invalid { key, value } => {
                write!(f, "Invalid value for {}: '{}'", key, value)
            }
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    pub database_url: String,
    pub db_channel: i64,
    pub admins: Vec<i64>,
    pub default_short_url: String,
    pub default_short_api: String,
    pub default_tutorial_link: String,
    pub protect_content: bool,
    pub disable_button: bool,
    pub auto_delete: Option<Duration>,
    pub start_message: String,
    pub reply_text: String,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub screenshot_count: usize,
    pub max_batch_size: u64,
    pub short_cache_ttl: Duration,
    pub short_cache_capacity: usize,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// builds the config from an arbitrary key lookup (env in production, maps in tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let db_channel: i64 = parse_value("DB_CHANNEL", &required("DB_CHANNEL")?)?;
        if db_channel == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_CHANNEL",
                value: "0".to_string(),
            });
        }

        let admins = match get("ADMINS") {
            Some(raw) => parse_admins(&raw)?,
            None => Vec::new(),
        };

        let auto_delete_secs: u64 = parse_or("AUTO_DELETE_SECS", get("AUTO_DELETE_SECS"), 0)?;
        let screenshot_count: usize = parse_or("SCREENSHOT_COUNT", get("SCREENSHOT_COUNT"), 4)?;
        if !ALBUM_SIZE.contains(&screenshot_count) {
            return Err(ConfigError::Invalid {
                key: "SCREENSHOT_COUNT",
                value: screenshot_count.to_string(),
            });
        }
        let max_batch_size: u64 = parse_or("MAX_BATCH_SIZE", get("MAX_BATCH_SIZE"), 200)?;
        if max_batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_BATCH_SIZE",
                value: "0".to_string(),
            });
        }
        let short_cache_ttl_secs: u64 =
            parse_or("SHORT_CACHE_TTL_SECS", get("SHORT_CACHE_TTL_SECS"), 86_400)?;
        let short_cache_capacity: usize =
            parse_or("SHORT_CACHE_CAPACITY", get("SHORT_CACHE_CAPACITY"), 1024)?;

        Ok(Self {
            bot_token: required("BOT_TOKEN")?,
            database_url: required("DATABASE_URL")?,
            db_channel,
            admins,
            default_short_url: get("SHORT_URL").unwrap_or_else(|| DEFAULT_SHORT_URL.to_string()),
            default_short_api: get("SHORT_API").unwrap_or_default(),
            default_tutorial_link: get("TUTORIAL_LINK")
                .unwrap_or_else(|| DEFAULT_TUTORIAL_LINK.to_string()),
            protect_content: parse_flag("PROTECT_CONTENT", get("PROTECT_CONTENT"))?,
            disable_button: parse_flag("DISABLE_BTN", get("DISABLE_BTN"))?,
            auto_delete: (auto_delete_secs > 0).then(|| Duration::from_secs(auto_delete_secs)),
            start_message: get("START_MESSAGE")
                .unwrap_or_else(|| DEFAULT_START_MESSAGE.to_string()),
            reply_text: get("REPLY_TEXT").unwrap_or_else(|| DEFAULT_REPLY_TEXT.to_string()),
            ffmpeg_path: get("FFMPEG_PATH").map(PathBuf::from),
            ffprobe_path: get("FFPROBE_PATH").map(PathBuf::from),
            screenshot_count,
            max_batch_size,
            short_cache_ttl: Duration::from_secs(short_cache_ttl_secs),
            short_cache_capacity,
        })
    }

    pub fn is_admin(&self, telegram_user_id: i64) -> bool {
        self.admins.contains(&telegram_user_id)
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_flag(key: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            key,
            value: other.to_string(),
        }),
    }
}

/// accepts ids separated by commas and/or whitespace
fn parse_admins(raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| parse_value("ADMINS", part))
        .collect()
}
