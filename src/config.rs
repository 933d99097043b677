use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

use crate::platform::RegistrationScope;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Process-wide bot settings.
///
/// Read from `config.json` and then overridden from the environment (see
/// [`BotConfig::apply_overrides`]). Keys written by older deployments in
/// camelCase (`clientId`, `guildId`, `ownerId`, `defaultCooldown`) are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default, alias = "clientId")]
    pub client_id: Option<String>,

    #[serde(default, alias = "ownerId")]
    pub owner_id: Option<String>,

    #[serde(default, alias = "guildId")]
    pub guild_id: Option<String>,

    /// Development mode restricts registration to `guild_id`.
    #[serde(default)]
    pub development: bool,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(
        default = "default_cooldown",
        alias = "defaultCooldown",
        with = "duration_secs"
    )]
    pub default_cooldown: Duration,

    #[serde(default = "default_slash_dir")]
    pub slash_dir: PathBuf,

    #[serde(default = "default_message_dir")]
    pub message_dir: PathBuf,

    #[serde(default = "default_events_dir")]
    pub events_dir: Option<PathBuf>,

    #[serde(default = "default_unit_cache_path")]
    pub unit_cache_path: PathBuf,

    #[serde(default = "default_registration_state_path")]
    pub registration_state_path: PathBuf,

    #[serde(default = "default_source_suffix")]
    pub source_suffix: String,

    #[serde(default = "default_rate_limit_backoff", with = "duration_ms")]
    pub rate_limit_backoff: Duration,

    #[serde(default = "default_component_timeout", with = "duration_ms")]
    pub component_timeout: Duration,

    #[serde(default = "default_modal_timeout", with = "duration_ms")]
    pub modal_timeout: Duration,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    // never written back to disk
    #[serde(skip)]
    pub token: Option<SecretString>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            owner_id: None,
            guild_id: None,
            development: false,
            prefix: default_prefix(),
            default_cooldown: default_cooldown(),
            slash_dir: default_slash_dir(),
            message_dir: default_message_dir(),
            events_dir: default_events_dir(),
            unit_cache_path: default_unit_cache_path(),
            registration_state_path: default_registration_state_path(),
            source_suffix: default_source_suffix(),
            rate_limit_backoff: default_rate_limit_backoff(),
            component_timeout: default_component_timeout(),
            modal_timeout: default_modal_timeout(),
            api_base_url: default_api_base_url(),
            token: None,
        }
    }
}

impl BotConfig {
    // JSONファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Reads `path` when it exists, otherwise starts from defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::warn!("{} not found; using default configuration", path.display());
            Ok(Self::default())
        }
    }

    /// Applies `HERALD_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary variable source.
    ///
    /// * `HERALD_TOKEN` - bot token
    /// * `HERALD_ENV` - `development` enables guild-scoped registration
    /// * `HERALD_CLIENT_ID`, `HERALD_GUILD_ID`, `HERALD_OWNER_ID`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(token) = non_empty("HERALD_TOKEN") {
            self.token = Some(SecretString::new(Box::from(token)));
        }
        if let Some(env) = non_empty("HERALD_ENV") {
            self.development = env.eq_ignore_ascii_case("development");
        }
        if let Some(client_id) = non_empty("HERALD_CLIENT_ID") {
            self.client_id = Some(client_id);
        }
        if let Some(guild_id) = non_empty("HERALD_GUILD_ID") {
            self.guild_id = Some(guild_id);
        }
        if let Some(owner_id) = non_empty("HERALD_OWNER_ID") {
            self.owner_id = Some(owner_id);
        }
    }

    pub fn registration_scope(&self) -> RegistrationScope {
        match (&self.guild_id, self.development) {
            (Some(guild_id), true) => RegistrationScope::Guild(guild_id.clone()),
            _ => RegistrationScope::Global,
        }
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id.as_deref() == Some(user_id)
    }
}

// デフォルト値の定義
fn default_prefix() -> String {
    "!".to_string()
}
fn default_cooldown() -> Duration {
    Duration::from_secs(3)
}
fn default_slash_dir() -> PathBuf {
    PathBuf::from("commands/slash")
}
fn default_message_dir() -> PathBuf {
    PathBuf::from("commands/message")
}
fn default_events_dir() -> Option<PathBuf> {
    Some(PathBuf::from("events"))
}
fn default_unit_cache_path() -> PathBuf {
    PathBuf::from("command-cache.json")
}
fn default_registration_state_path() -> PathBuf {
    PathBuf::from("commands-cache.json")
}
fn default_source_suffix() -> String {
    "json".to_string()
}
fn default_rate_limit_backoff() -> Duration {
    Duration::from_secs(5)
}
fn default_component_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_modal_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

// Duration型のシリアライズ/デシリアライズヘルパー
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Seconds as a JSON number; fractions are kept (`2.5`).
pub mod duration_secs {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid seconds {}: {}", secs, e)))
    }
}
