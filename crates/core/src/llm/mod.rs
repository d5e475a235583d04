pub mod error;
pub mod gemini;
pub mod json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    VertexGemini,
}

impl Provider {
    pub const fn as_str(self) -> &'static str {
        match self {
            Provider::VertexGemini => "vertex_gemini",
        }
    }
}

/// A generative text model: free-text prompt in, completion text out.
#[async_trait::async_trait]
pub trait TextModel: Send + Sync {
    fn provider(&self) -> Provider;

    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}
