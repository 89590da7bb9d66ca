use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::error::ClientError;
use crate::truncate_body;

/// A token with less remaining lifetime than this is replaced before use.
pub const REFRESH_BUFFER_SECS: i64 = 120;

/// Format of the token endpoint's `.expires` field, e.g.
/// `"Sat, 01 Mar 2025 15:04:05 GMT"`.
const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// A bearer token snapshot. Never mutated; a stale token is replaced by a
/// freshly acquired one.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub access_token: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// True once the remaining lifetime drops below the refresh buffer.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now) < Duration::seconds(REFRESH_BUFFER_SECS)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(rename = ".expires")]
    expires: String,
}

fn parse_expiry(raw: &str) -> Result<DateTime<Utc>, ClientError> {
    NaiveDateTime::parse_from_str(raw, EXPIRES_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ClientError::Token(format!("bad .expires value '{raw}': {e}")))
}

/// Source of a valid bearer token. Mockable for testing.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer(&mut self) -> Result<String, ClientError>;
}

/// Owns the credential for the life of the process. Acquires on first use
/// and replaces the token whenever its remaining lifetime drops below the
/// refresh buffer; the check runs on every use, so even a freshly acquired
/// token that arrives near expiry gets replaced.
pub struct TokenManager {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    token: Option<AuthToken>,
}

impl TokenManager {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            token: None,
        }
    }

    /// Acquire a fresh token from the remote credential endpoint.
    pub async fn acquire(&self) -> Result<AuthToken, ClientError> {
        let url = format!("{}/token", self.base_url);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
                ("grant_type", "password"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = truncate_body(&response.text().await.unwrap_or_default());
            tracing::error!(status = status.as_u16(), body = %body, "Token endpoint error");
            return Err(ClientError::Auth {
                status: status.as_u16(),
                body,
            });
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Token(e.to_string()))?;

        let now = Utc::now();
        let expires_at = parse_expiry(&payload.expires)?;
        tracing::info!(expires_at = %expires_at, "Token acquired");

        Ok(AuthToken {
            access_token: payload.access_token,
            acquired_at: now,
            expires_at,
        })
    }

    /// Return the token unchanged while it has more than the buffer left,
    /// otherwise acquire a replacement.
    pub async fn refresh_if_needed(&self, token: AuthToken) -> Result<AuthToken, ClientError> {
        if token.needs_refresh(Utc::now()) {
            self.acquire().await
        } else {
            Ok(token)
        }
    }
}

#[async_trait]
impl TokenProvider for TokenManager {
    async fn bearer(&mut self) -> Result<String, ClientError> {
        let token = match self.token.take() {
            Some(token) => self.refresh_if_needed(token).await?,
            None => {
                let token = self.acquire().await?;
                self.refresh_if_needed(token).await?
            }
        };
        let access = token.access_token.clone();
        self.token = Some(token);
        Ok(access)
    }
}
