pub mod imagen;
pub mod publisher;
pub mod thumbnail;

use std::fmt;

const SECONDARY_SUFFIX: &str = "_social";

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug)]
pub enum ImageModelError {
    /// Provider reported resource exhaustion; the only retryable failure.
    QuotaExceeded { detail: String },
    Failed(anyhow::Error),
}

impl fmt::Display for ImageModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageModelError::QuotaExceeded { detail } => {
                write!(f, "image quota exceeded: {detail}")
            }
            ImageModelError::Failed(err) => write!(f, "image generation failed: {err:#}"),
        }
    }
}

impl std::error::Error for ImageModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageModelError::QuotaExceeded { .. } => None,
            ImageModelError::Failed(err) => Some(err.as_ref()),
        }
    }
}

impl From<anyhow::Error> for ImageModelError {
    fn from(err: anyhow::Error) -> Self {
        ImageModelError::Failed(err)
    }
}

/// A generative image model producing one square image per prompt.
#[async_trait::async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageModelError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
    pub prompt: String,
    pub dest_path: String,
    pub with_secondary: bool,
}

/// Produces a public URL for a prompt.
///
/// `None` is the failure signal: the caller decides whether a missing image
/// is fatal.
#[async_trait::async_trait]
pub trait ImageClient: Send + Sync {
    async fn generate(&self, job: &ImageJob) -> Option<String>;
}

/// `markets/2025-01-02/hero.jpg` -> `markets/2025-01-02/hero_social.jpg`.
pub fn secondary_path(dest_path: &str) -> String {
    let file_start = dest_path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match dest_path[file_start..].rfind('.') {
        Some(dot) => {
            let dot = file_start + dot;
            format!("{}{SECONDARY_SUFFIX}{}", &dest_path[..dot], &dest_path[dot..])
        }
        None => format!("{dest_path}{SECONDARY_SUFFIX}"),
    }
}
