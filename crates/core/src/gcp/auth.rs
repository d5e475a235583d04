use crate::config::Settings;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::time::Duration;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

// Refresh a little before the server-side expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone)]
enum TokenSource {
    Static(String),
    MetadataServer { url: String },
}

/// OAuth bearer tokens for Google APIs.
///
/// Uses `GOOGLE_ACCESS_TOKEN` when set (local development), otherwise asks the
/// metadata server of the runtime's service account and caches the token for
/// the process lifetime until it expires.
#[derive(Debug)]
pub struct AccessTokenProvider {
    http: reqwest::Client,
    source: TokenSource,
    token_cache: tokio::sync::Mutex<Option<CachedToken>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired_or_stale(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: i64,
}

impl AccessTokenProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let source = match settings.google_access_token.as_deref() {
            Some(token) => TokenSource::Static(token.trim().to_string()),
            None => TokenSource::MetadataServer {
                url: std::env::var("GCP_METADATA_TOKEN_URL")
                    .unwrap_or_else(|_| METADATA_TOKEN_URL.to_string()),
            },
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build metadata http client")?;

        Ok(Self {
            http,
            source,
            token_cache: tokio::sync::Mutex::new(None),
        })
    }

    pub fn from_static(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            source: TokenSource::Static(token.into()),
            token_cache: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn bearer(&self) -> Result<String> {
        let url = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::MetadataServer { url } => url,
        };

        let mut guard = self.token_cache.lock().await;
        if let Some(cached) = guard.as_ref() {
            if !cached.is_expired_or_stale(Utc::now()) {
                return Ok(cached.access_token.clone());
            }
        }

        let fetched_at = Utc::now();
        let res = self
            .http
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .context("metadata token request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read metadata token response")?;
        if !status.is_success() {
            anyhow::bail!("metadata token HTTP {status}: {text}");
        }

        let parsed = serde_json::from_str::<MetadataTokenResponse>(&text)
            .context("failed to parse metadata token response")?;
        let cached = CachedToken {
            access_token: parsed.access_token,
            expires_at: fetched_at + ChronoDuration::seconds(parsed.expires_in),
        };
        tracing::debug!(expires_at = %cached.expires_at, "issued GCP access token");

        let token = cached.access_token.clone();
        *guard = Some(cached);
        Ok(token)
    }
}
