use crate::config::Settings;
use crate::gcp::auth::AccessTokenProvider;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_UPLOAD_BASE_URL: &str = "https://storage.googleapis.com/upload/storage/v1";
const PUBLIC_BASE_URL: &str = "https://storage.googleapis.com";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Durable object storage with world-readable objects.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes (or overwrites) `path` and returns its public URL.
    async fn put_public(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> anyhow::Result<String>;
}

/// Google Cloud Storage bucket accessed through the JSON API.
#[derive(Debug, Clone)]
pub struct GcsObjectStore {
    http: reqwest::Client,
    tokens: Arc<AccessTokenProvider>,
    bucket: String,
    upload_base_url: String,
}

impl GcsObjectStore {
    pub fn from_settings(
        settings: &Settings,
        tokens: Arc<AccessTokenProvider>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build storage http client")?;

        Ok(Self {
            http,
            tokens,
            bucket: settings.storage_bucket.clone(),
            upload_base_url: std::env::var("GCS_UPLOAD_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_UPLOAD_BASE_URL.to_string()),
        })
    }

    pub fn public_url(&self, path: &str) -> String {
        public_url(&self.bucket, path)
    }
}

pub fn public_url(bucket: &str, path: &str) -> String {
    format!("{PUBLIC_BASE_URL}/{bucket}/{}", path.trim_start_matches('/'))
}

#[async_trait::async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put_public(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> anyhow::Result<String> {
        let token = self.tokens.bearer().await?;
        let url = format!(
            "{}/b/{}/o",
            self.upload_base_url.trim_end_matches('/'),
            self.bucket
        );
        let size = bytes.len();

        let res = self
            .http
            .post(url)
            .bearer_auth(token)
            .query(&[
                ("uploadType", "media"),
                ("name", path),
                ("predefinedAcl", "publicRead"),
            ])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("storage upload failed for {path}"))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("storage upload HTTP {status} for {path}: {body}");
        }

        tracing::debug!(%path, size, "uploaded public object");
        Ok(self.public_url(path))
    }
}
