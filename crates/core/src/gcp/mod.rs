pub mod auth;

use crate::config::Settings;

/// Base URL of the regional Vertex AI endpoint for publisher models.
pub fn vertex_model_url(settings: &Settings, model: &str, method: &str) -> String {
    let base = std::env::var("VERTEX_BASE_URL").unwrap_or_else(|_| {
        format!("https://{}-aiplatform.googleapis.com", settings.gcp_location)
    });
    format!(
        "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:{}",
        base.trim_end_matches('/'),
        settings.gcp_project,
        settings.gcp_location,
        model,
        method
    )
}

/// Google API error envelope (`{"error": {"code", "status", "message"}}`).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GoogleApiError {
    pub error: GoogleApiErrorBody,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GoogleApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl GoogleApiError {
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    pub fn is_resource_exhausted(&self) -> bool {
        self.error.status == "RESOURCE_EXHAUSTED" || self.error.code == 429
    }
}
