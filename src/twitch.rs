//! Twitch Helix client for the channel live-status lookup.
//!
//! Helix calls authenticate with an app access token obtained through the
//! client-credentials grant. The token is a short-lived credential owned by
//! this client: it lives behind a mutex, is refreshed by the client when it
//! nears expiry, and is invalidated and re-fetched once if Helix answers 401.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{
    api::models::twitch::{StreamInfo, StreamStatusResponse},
    config::TwitchConfig,
    errors::Error,
};

pub struct TwitchClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    auth_url: String,
    api_base: String,
    refresh_margin: ChronoDuration,
    token: Mutex<Option<AppAccessToken>>,
}

/// Short-lived app access token from the client-credentials grant.
#[derive(Debug, Clone)]
struct AppAccessToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl AppAccessToken {
    fn is_expired(&self, margin: ChronoDuration) -> bool {
        Utc::now() + margin >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct StreamsEnvelope {
    data: Vec<StreamInfo>,
}

impl TwitchClient {
    pub fn new(config: &TwitchConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Internal {
                operation: format!("create Twitch HTTP client: {e}"),
            })?;

        let refresh_margin = ChronoDuration::from_std(config.token_refresh_margin).unwrap_or_else(|_| ChronoDuration::seconds(60));

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            auth_url: config.auth_url.as_str().trim_end_matches('/').to_string(),
            api_base: config.api_base_url.as_str().trim_end_matches('/').to_string(),
            refresh_margin,
            token: Mutex::new(None),
        })
    }

    /// Whether `channel` is currently live, with the stream payload when it is.
    pub async fn stream_status(&self, channel: &str) -> Result<StreamStatusResponse, Error> {
        let token = self.current_token().await?;
        let response = self.fetch_streams(channel, &token).await?;

        let response = if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            // Token was revoked or expired server-side; refresh once and retry.
            tracing::debug!("Twitch rejected app token, refreshing and retrying");
            self.invalidate_token().await;
            let token = self.current_token().await?;
            self.fetch_streams(channel, &token).await?
        } else {
            response
        };

        if !response.status().is_success() {
            return Err(Error::Internal {
                operation: format!("check Twitch stream status (HTTP {})", response.status()),
            });
        }

        let envelope: StreamsEnvelope = response.json().await.map_err(|e| Error::Internal {
            operation: format!("parse Twitch stream response: {e}"),
        })?;

        Ok(StreamStatusResponse {
            is_live: !envelope.data.is_empty(),
            stream: envelope.data.into_iter().next(),
        })
    }

    async fn fetch_streams(&self, channel: &str, token: &str) -> Result<reqwest::Response, Error> {
        self.http
            .get(format!("{}/streams", self.api_base))
            .query(&[("user_login", channel)])
            .header("Client-ID", &self.client_id)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::Internal {
                operation: format!("call Twitch streams API: {e}"),
            })
    }

    /// Return the cached app token, fetching a fresh one when missing or
    /// within the refresh margin of expiry.
    async fn current_token(&self) -> Result<String, Error> {
        let mut guard = self.token.lock().await;

        if let Some(token) = guard.as_ref()
            && !token.is_expired(self.refresh_margin)
        {
            return Ok(token.access_token.clone());
        }

        let fresh = self.fetch_token().await?;
        let access_token = fresh.access_token.clone();
        *guard = Some(fresh);
        Ok(access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn fetch_token(&self) -> Result<AppAccessToken, Error> {
        let response = self
            .http
            .post(&self.auth_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| Error::Internal {
                operation: format!("request Twitch app access token: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(Error::Internal {
                operation: format!("authenticate with Twitch (HTTP {})", response.status()),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| Error::Internal {
            operation: format!("parse Twitch token response: {e}"),
        })?;

        Ok(AppAccessToken {
            access_token: token.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(token.expires_in),
        })
    }
}
