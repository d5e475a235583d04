pub mod domain;
pub mod gcp;
pub mod generate;
pub mod imaging;
pub mod llm;
pub mod storage;
pub mod time;
pub mod trigger;

pub mod config {
    use anyhow::Context;

    const DEFAULT_GCP_PROJECT: &str = "market-a-day";
    const DEFAULT_GCP_LOCATION: &str = "us-central1";
    const DEFAULT_STORAGE_BUCKET: &str = "market-a-day.firebasestorage.app";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub gcp_project: String,
        pub gcp_location: String,
        pub storage_bucket: String,
        pub google_access_token: Option<String>,
        pub manual_trigger_key: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                gcp_project: env_or("GCP_PROJECT", DEFAULT_GCP_PROJECT),
                gcp_location: env_or("GCP_LOCATION", DEFAULT_GCP_LOCATION),
                storage_bucket: env_or("STORAGE_BUCKET", DEFAULT_STORAGE_BUCKET),
                google_access_token: std::env::var("GOOGLE_ACCESS_TOKEN")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                manual_trigger_key: std::env::var("MANUAL_TRIGGER_KEY").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_manual_trigger_key(&self) -> anyhow::Result<&str> {
            self.manual_trigger_key
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .context("MANUAL_TRIGGER_KEY is required")
        }
    }

    fn env_or(key: &str, default: &str) -> String {
        std::env::var(key)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}
