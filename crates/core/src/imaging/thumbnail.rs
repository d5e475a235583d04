use anyhow::Context;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

const DEFAULT_MAX_WIDTH: u32 = 600;
const DEFAULT_QUALITY: u8 = 80;

/// Reduced-size JPEG derived from a generated image (social previews).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSpec {
    pub max_width: u32,
    pub quality: u8,
}

impl Default for ThumbnailSpec {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            quality: DEFAULT_QUALITY,
        }
    }
}

impl ThumbnailSpec {
    pub fn derive(&self, bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
        let image = image::load_from_memory(bytes).context("failed to decode source image")?;

        // Never upscale.
        let resized = if image.width() > self.max_width {
            image.resize(self.max_width, image.height(), FilterType::Lanczos3)
        } else {
            image
        };

        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
        encoder
            .encode_image(&DynamicImage::ImageRgb8(resized.to_rgb8()))
            .context("failed to encode thumbnail JPEG")?;
        Ok(out)
    }
}
