use crate::imaging::thumbnail::ThumbnailSpec;
use crate::imaging::{secondary_path, ImageClient, ImageJob, ImageModel, ImageModelError};
use crate::storage::objects::ObjectStore;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_QUOTA_RETRY_DELAYS_SECS: [u64; 2] = [10, 20];

/// Delays applied after successive quota-exceeded failures. The number of
/// delays is the number of retries, so the default allows 3 attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub quota_delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            quota_delays: DEFAULT_QUOTA_RETRY_DELAYS_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// `IMAGE_QUOTA_RETRY_DELAYS_SECS="10,20"`; an empty value disables retries.
    pub fn from_env() -> Self {
        match std::env::var("IMAGE_QUOTA_RETRY_DELAYS_SECS") {
            Ok(s) => Self::parse(&s).unwrap_or_else(|| {
                tracing::warn!(value = %s, "invalid IMAGE_QUOTA_RETRY_DELAYS_SECS; using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let mut quota_delays = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            quota_delays.push(Duration::from_secs(part.parse::<u64>().ok()?));
        }
        Some(Self { quota_delays })
    }

    pub fn max_attempts(&self) -> usize {
        self.quota_delays.len() + 1
    }
}

/// Generates an image, publishes it and optionally a reduced copy.
pub struct ImagePublisher {
    model: Arc<dyn ImageModel>,
    objects: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    thumbnail: ThumbnailSpec,
}

impl ImagePublisher {
    pub fn new(model: Arc<dyn ImageModel>, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            model,
            objects,
            retry: RetryPolicy::default(),
            thumbnail: ThumbnailSpec::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn attempt(&self, job: &ImageJob) -> Result<String, ImageModelError> {
        let image = self.model.generate(&job.prompt).await?;

        let url = self
            .objects
            .put_public(&job.dest_path, image.bytes.clone(), &image.mime_type)
            .await?;

        if job.with_secondary {
            if let Err(err) = self.publish_secondary(&job.dest_path, &image.bytes).await {
                tracing::warn!(
                    dest = %job.dest_path,
                    error = %err,
                    "secondary image failed; keeping primary"
                );
            }
        }

        Ok(url)
    }

    async fn publish_secondary(&self, dest_path: &str, bytes: &[u8]) -> anyhow::Result<String> {
        let small = self.thumbnail.derive(bytes)?;
        let path = secondary_path(dest_path);
        let url = self.objects.put_public(&path, small, "image/jpeg").await?;
        tracing::info!(%path, "secondary image stored");
        Ok(url)
    }
}

#[async_trait::async_trait]
impl ImageClient for ImagePublisher {
    async fn generate(&self, job: &ImageJob) -> Option<String> {
        let mut retries_used = 0usize;
        loop {
            tracing::info!(dest = %job.dest_path, attempt = retries_used + 1, "generating image");
            match self.attempt(job).await {
                Ok(url) => return Some(url),
                Err(ImageModelError::QuotaExceeded { detail })
                    if retries_used < self.retry.quota_delays.len() =>
                {
                    let delay = self.retry.quota_delays[retries_used];
                    retries_used += 1;
                    tracing::warn!(
                        dest = %job.dest_path,
                        ?delay,
                        %detail,
                        "image quota exceeded; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::error!(
                        dest = %job.dest_path,
                        attempts = retries_used + 1,
                        error = %err,
                        "image generation failed"
                    );
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::GeneratedImage;
    use anyhow::anyhow;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::Mutex;
    use tokio::time::Instant;

    enum Scripted {
        Ok(Vec<u8>),
        Quota,
        Fail,
    }

    struct ScriptedModel {
        script: Mutex<VecDeque<Scripted>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedModel {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ImageModel for ScriptedModel {
        async fn generate(&self, _prompt: &str) -> Result<GeneratedImage, ImageModelError> {
            self.calls.lock().unwrap().push(Instant::now());
            match self.script.lock().unwrap().pop_front() {
                Some(Scripted::Ok(bytes)) => Ok(GeneratedImage {
                    bytes,
                    mime_type: "image/jpeg".into(),
                }),
                Some(Scripted::Quota) => Err(ImageModelError::QuotaExceeded {
                    detail: "RESOURCE_EXHAUSTED".into(),
                }),
                Some(Scripted::Fail) | None => Err(ImageModelError::Failed(anyhow!("boom"))),
            }
        }
    }

    #[derive(Default)]
    struct MemoryObjects {
        puts: Mutex<Vec<(String, usize)>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl ObjectStore for MemoryObjects {
        async fn put_public(
            &self,
            path: &str,
            bytes: Vec<u8>,
            _content_type: &str,
        ) -> anyhow::Result<String> {
            anyhow::ensure!(!self.fail, "bucket unavailable");
            self.puts.lock().unwrap().push((path.to_string(), bytes.len()));
            Ok(format!("https://storage.test/{path}"))
        }
    }

    fn job(with_secondary: bool) -> ImageJob {
        ImageJob {
            prompt: "Wide shot of a market".into(),
            dest_path: "markets/2025-06-01/hero.jpg".into(),
            with_secondary,
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test(start_paused = true)]
    async fn retries_quota_with_escalating_delays() {
        let model = ScriptedModel::new(vec![
            Scripted::Quota,
            Scripted::Quota,
            Scripted::Ok(b"img".to_vec()),
        ]);
        let objects = Arc::new(MemoryObjects::default());
        let publisher = ImagePublisher::new(model.clone(), objects.clone());

        let url = publisher.generate(&job(false)).await;
        assert_eq!(url.as_deref(), Some("https://storage.test/markets/2025-06-01/hero.jpg"));

        let times = model.call_times();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], Duration::from_secs(10));
        assert_eq!(times[2] - times[1], Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_quota_failures() {
        let model = ScriptedModel::new(vec![
            Scripted::Quota,
            Scripted::Quota,
            Scripted::Quota,
            Scripted::Ok(b"never".to_vec()),
        ]);
        let objects = Arc::new(MemoryObjects::default());
        let publisher = ImagePublisher::new(model.clone(), objects.clone());

        assert_eq!(publisher.generate(&job(false)).await, None);
        assert_eq!(model.call_times().len(), 3);
        assert!(objects.puts.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let model = ScriptedModel::new(vec![Scripted::Fail, Scripted::Ok(b"never".to_vec())]);
        let publisher = ImagePublisher::new(model.clone(), Arc::new(MemoryObjects::default()));

        assert_eq!(publisher.generate(&job(false)).await, None);
        assert_eq!(model.call_times().len(), 1);
    }

    #[tokio::test]
    async fn upload_failure_yields_none() {
        let model = ScriptedModel::new(vec![Scripted::Ok(b"img".to_vec())]);
        let objects = Arc::new(MemoryObjects {
            fail: true,
            ..Default::default()
        });
        let publisher = ImagePublisher::new(model, objects);
        assert_eq!(publisher.generate(&job(false)).await, None);
    }

    #[tokio::test]
    async fn stores_secondary_asset_next_to_primary() {
        let model = ScriptedModel::new(vec![Scripted::Ok(png(1024, 1024))]);
        let objects = Arc::new(MemoryObjects::default());
        let publisher = ImagePublisher::new(model, objects.clone());

        assert!(publisher.generate(&job(true)).await.is_some());
        let puts = objects.puts.lock().unwrap();
        let paths: Vec<_> = puts.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec!["markets/2025-06-01/hero.jpg", "markets/2025-06-01/hero_social.jpg"]
        );
    }

    #[tokio::test]
    async fn secondary_failure_keeps_primary_result() {
        let model = ScriptedModel::new(vec![Scripted::Ok(b"not decodable".to_vec())]);
        let objects = Arc::new(MemoryObjects::default());
        let publisher = ImagePublisher::new(model, objects.clone());

        let url = publisher.generate(&job(true)).await;
        assert_eq!(url.as_deref(), Some("https://storage.test/markets/2025-06-01/hero.jpg"));
        assert_eq!(objects.puts.lock().unwrap().len(), 1);
    }

    #[test]
    fn parses_retry_delays() {
        let policy = RetryPolicy::parse("5, 15 ,45").unwrap();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.quota_delays[2], Duration::from_secs(45));
        assert_eq!(RetryPolicy::parse("").unwrap().max_attempts(), 1);
        assert!(RetryPolicy::parse("ten").is_none());
        assert_eq!(RetryPolicy::default().max_attempts(), 3);
    }
}
