//! REST command registration.

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{CommandPublisher, PlatformError, PlatformResult, RegistrationScope};
use crate::config::{BotConfig, ConfigError, ConfigResult};

/// Publishes structured commands with `PUT` on the application command route
/// of the chosen scope (a full overwrite of the remote set).
pub struct RestPublisher {
    client: reqwest::Client,
    base_url: String,
    application_id: String,
    token: SecretString,
}

impl RestPublisher {
    pub fn new(
        base_url: impl Into<String>,
        application_id: impl Into<String>,
        token: SecretString,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            application_id: application_id.into(),
            token,
        }
    }

    pub fn from_config(config: &BotConfig) -> ConfigResult<Self> {
        let application_id = config
            .client_id
            .clone()
            .ok_or(ConfigError::Missing("client_id"))?;
        let token = config.token.clone().ok_or(ConfigError::Missing("HERALD_TOKEN"))?;
        Ok(Self::new(&config.api_base_url, application_id, token))
    }

    pub fn route(&self, scope: &RegistrationScope) -> String {
        match scope {
            RegistrationScope::Global => {
                format!("{}/applications/{}/commands", self.base_url, self.application_id)
            }
            RegistrationScope::Guild(guild_id) => format!(
                "{}/applications/{}/guilds/{}/commands",
                self.base_url, self.application_id, guild_id
            ),
        }
    }
}

#[async_trait]
impl CommandPublisher for RestPublisher {
    async fn put_commands(
        &self,
        scope: &RegistrationScope,
        commands: &[Value],
    ) -> PlatformResult<()> {
        let url = self.route(scope);
        debug!("PUT {} ({} commands)", url, commands.len());

        let response = self
            .client
            .put(&url)
            .header(
                AUTHORIZATION,
                format!("Bot {}", self.token.expose_secret()),
            )
            .json(commands)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64);
            return Err(PlatformError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PlatformError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}
