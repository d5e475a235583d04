use crate::config::Settings;
use crate::gcp::auth::AccessTokenProvider;
use crate::gcp::{vertex_model_url, GoogleApiError};
use crate::imaging::{GeneratedImage, ImageModel, ImageModelError};
use anyhow::{anyhow, Context};
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MODEL: &str = "imagen-3.0-generate-001";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const ASPECT_RATIO: &str = "1:1";
const OUTPUT_MIME_TYPE: &str = "image/jpeg";

/// Vertex AI Imagen `predict` client.
#[derive(Debug, Clone)]
pub struct ImagenClient {
    http: reqwest::Client,
    tokens: Arc<AccessTokenProvider>,
    url: String,
}

impl ImagenClient {
    pub fn from_settings(
        settings: &Settings,
        tokens: Arc<AccessTokenProvider>,
    ) -> anyhow::Result<Self> {
        let model = std::env::var("IMAGEN_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let timeout_secs = std::env::var("IMAGEN_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build Imagen http client")?;

        Ok(Self {
            http,
            tokens,
            url: vertex_model_url(settings, &model, "predict"),
        })
    }

    fn request(prompt: &str) -> PredictRequest<'_> {
        PredictRequest {
            instances: vec![Instance { prompt }],
            parameters: Parameters {
                sample_count: 1,
                aspect_ratio: ASPECT_RATIO,
                add_watermark: false,
                output_options: OutputOptions {
                    mime_type: OUTPUT_MIME_TYPE,
                },
            },
        }
    }

    fn decode_first(res: PredictResponse) -> Result<GeneratedImage, ImageModelError> {
        let prediction = res
            .predictions
            .into_iter()
            .find(|p| p.bytes_base64_encoded.is_some())
            .ok_or_else(|| anyhow!("no image in Imagen response (prompt may have been filtered)"))?;

        let b64 = prediction.bytes_base64_encoded.unwrap_or_default();
        let bytes = STANDARD
            .decode(b64.trim())
            .context("failed to decode base64 image")?;

        Ok(GeneratedImage {
            bytes,
            mime_type: prediction
                .mime_type
                .unwrap_or_else(|| OUTPUT_MIME_TYPE.to_string()),
        })
    }
}

pub(crate) fn classify_error(status: StatusCode, body: &str) -> ImageModelError {
    let envelope = GoogleApiError::parse(body);
    let exhausted = status == StatusCode::TOO_MANY_REQUESTS
        || envelope.as_ref().is_some_and(GoogleApiError::is_resource_exhausted);

    let detail = envelope
        .map(|e| format!("{} {}", e.error.status, e.error.message))
        .unwrap_or_else(|| body.chars().take(500).collect());

    if exhausted {
        ImageModelError::QuotaExceeded { detail }
    } else {
        ImageModelError::Failed(anyhow!("Imagen HTTP {status}: {detail}"))
    }
}

#[async_trait::async_trait]
impl ImageModel for ImagenClient {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageModelError> {
        let token = self.tokens.bearer().await?;

        let res = self
            .http
            .post(&self.url)
            .bearer_auth(token)
            .json(&Self::request(prompt))
            .send()
            .await
            .context("Imagen request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Imagen response body")?;
        if !status.is_success() {
            return Err(classify_error(status, &text));
        }

        let parsed = serde_json::from_str::<PredictResponse>(&text)
            .context("failed to decode Imagen response into PredictResponse")?;
        let image = Self::decode_first(parsed)?;
        tracing::debug!(
            bytes = image.bytes.len(),
            mime = %image.mime_type,
            "imagen sample decoded"
        );
        Ok(image)
    }
}

#[derive(Debug, Clone, Serialize)]
struct PredictRequest<'a> {
    instances: Vec<Instance<'a>>,
    parameters: Parameters,
}

#[derive(Debug, Clone, Serialize)]
struct Instance<'a> {
    prompt: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters {
    sample_count: u32,
    aspect_ratio: &'static str,
    add_watermark: bool,
    output_options: OutputOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputOptions {
    mime_type: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}
