//! Image Payload Optimizer - Size-Bounded JPEG for the Generator
//!
//! The generation endpoint has a hard input ceiling, so oversized uploads are
//! shrunk locally: area cap, width/height clamp, white background, then a
//! bounded quality ramp and at most one geometric correction.
//!
//! The byte budget is soft. If the single geometric pass still misses it the
//! result is returned anyway, flagged `within_budget: false`.

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage, RgbaImage};
use psd::Psd;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Leading bytes of a Photoshop document
pub const PSD_SIGNATURE: &[u8] = b"8BPS";

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("Image could not be decoded: {0}")]
    ImageDecode(String),

    #[error("Encoding error: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerConfig {
    /// Hard target for the encoded payload, in bytes
    #[serde(default = "default_byte_budget")]
    pub byte_budget: usize,
    /// Pixel area cap applied before the width/height clamps
    #[serde(default = "default_max_area")]
    pub max_area: u64,
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    #[serde(default = "default_initial_quality")]
    pub initial_quality: f32,
    #[serde(default = "default_quality_step")]
    pub quality_step: f32,
    #[serde(default = "default_quality_floor")]
    pub quality_floor: f32,
    /// Quality of the one-shot encode after geometric shrinking
    #[serde(default = "default_fallback_quality")]
    pub fallback_quality: f32,
}

fn default_byte_budget() -> usize { 3 * 1024 * 1024 }
fn default_max_area() -> u64 { 4_000_000 }
fn default_max_width() -> u32 { 1600 }
fn default_max_height() -> u32 { 4096 }
fn default_initial_quality() -> f32 { 0.7 }
fn default_quality_step() -> f32 { 0.1 }
fn default_quality_floor() -> f32 { 0.3 }
fn default_fallback_quality() -> f32 { 0.5 }

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            byte_budget: default_byte_budget(),
            max_area: default_max_area(),
            max_width: default_max_width(),
            max_height: default_max_height(),
            initial_quality: default_initial_quality(),
            quality_step: default_quality_step(),
            quality_floor: default_quality_floor(),
            fallback_quality: default_fallback_quality(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeStage {
    /// First encode met the budget
    Initial,
    /// Budget met (or floor reached) by lowering quality
    QualityRamp,
    /// One-shot resize after the quality floor
    GeometricFallback,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedImage {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
    /// JPEG quality in percent
    pub quality: u8,
    pub attempts: u32,
    pub stage: EncodeStage,
    pub size_bytes: usize,
    pub within_budget: bool,
}

impl OptimizedImage {
    pub const MIME_TYPE: &'static str = "image/jpeg";

    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", Self::MIME_TYPE, self.base64())
    }
}

pub struct ImageOptimizer {
    config: OptimizerConfig,
}

impl ImageOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Decode and optimize raw image bytes (PNG, JPEG, WEBP, PSD)
    pub fn optimize(&self, input: &[u8]) -> Result<OptimizedImage, OptimizeError> {
        let image = decode_source(input)?;
        self.optimize_image(&image)
    }

    pub fn optimize_image(&self, image: &DynamicImage) -> Result<OptimizedImage, OptimizeError> {
        let (original_width, original_height) = image.dimensions();
        if original_width == 0 || original_height == 0 {
            return Err(OptimizeError::ImageDecode("image has no pixels".into()));
        }

        let (width, height) = target_dimensions(original_width, original_height, &self.config);
        let mut canvas = render_on_white(image, width, height);

        let budget = self.config.byte_budget;
        let floor = percent(self.config.quality_floor);
        let step = percent(self.config.quality_step).max(1);
        let mut quality = percent(self.config.initial_quality).max(floor);

        let mut encoded = encode_jpeg(&canvas, quality)?;
        let mut attempts = 1;
        let mut stage = EncodeStage::Initial;
        debug!(width, height, quality, size = encoded.len(), "initial encode");

        let ramp_steps = quality.saturating_sub(floor).div_ceil(step);
        for _ in 0..ramp_steps {
            if encoded.len() <= budget {
                break;
            }
            quality = quality.saturating_sub(step).max(floor);
            encoded = encode_jpeg(&canvas, quality)?;
            attempts += 1;
            stage = EncodeStage::QualityRamp;
            debug!(quality, size = encoded.len(), "quality ramp encode");
        }

        if encoded.len() > budget {
            let factor = (budget as f64 / encoded.len() as f64).sqrt();
            let (w, h) = scale(canvas.width(), canvas.height(), factor);
            canvas = image::imageops::resize(&canvas, w, h, FilterType::Triangle);
            quality = percent(self.config.fallback_quality);
            encoded = encode_jpeg(&canvas, quality)?;
            attempts += 1;
            stage = EncodeStage::GeometricFallback;
            debug!(width = w, height = h, quality, size = encoded.len(), "geometric fallback encode");
        }

        let size_bytes = encoded.len();
        let within_budget = size_bytes <= budget;
        info!(
            original = %format!("{}x{}", original_width, original_height),
            output = %format!("{}x{}", canvas.width(), canvas.height()),
            size_bytes,
            attempts,
            within_budget,
            "image optimized"
        );

        Ok(OptimizedImage {
            bytes: encoded,
            width: canvas.width(),
            height: canvas.height(),
            original_width,
            original_height,
            quality,
            attempts,
            stage,
            size_bytes,
            within_budget,
        })
    }
}

impl Default for ImageOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

/// Output dimensions after the area cap and the width/height clamps.
///
/// Never larger than the input in either dimension and never zero.
pub fn target_dimensions(width: u32, height: u32, config: &OptimizerConfig) -> (u32, u32) {
    let (mut w, mut h) = (width as f64, height as f64);

    let area = w * h;
    let max_area = config.max_area as f64;
    if max_area > 0.0 && area > max_area {
        let factor = (max_area / area).sqrt();
        w = (w * factor).floor();
        h = (h * factor).floor();
    }

    let max_w = config.max_width as f64;
    if max_w > 0.0 && w > max_w {
        h = (h * max_w / w).floor();
        w = max_w;
    }

    let max_h = config.max_height as f64;
    if max_h > 0.0 && h > max_h {
        w = (w * max_h / h).floor();
        h = max_h;
    }

    (w.max(1.0) as u32, h.max(1.0) as u32)
}

/// Rasters go through `image`; Photoshop files are flattened to their composite
pub fn decode_source(input: &[u8]) -> Result<DynamicImage, OptimizeError> {
    if !input.starts_with(PSD_SIGNATURE) {
        return image::load_from_memory(input).map_err(|e| OptimizeError::ImageDecode(e.to_string()));
    }
    let psd = Psd::from_bytes(input).map_err(|e| OptimizeError::ImageDecode(e.to_string()))?;
    let composite = RgbaImage::from_raw(psd.width(), psd.height(), psd.rgba())
        .ok_or_else(|| OptimizeError::ImageDecode("PSD composite does not match its dimensions".into()))?;
    debug!(width = psd.width(), height = psd.height(), "flattened PSD");
    Ok(DynamicImage::ImageRgba8(composite))
}

fn scale(width: u32, height: u32, factor: f64) -> (u32, u32) {
    let factor = factor.min(1.0);
    let w = ((width as f64) * factor).floor().max(1.0) as u32;
    let h = ((height as f64) * factor).floor().max(1.0) as u32;
    (w, h)
}

fn percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Resize to the target and composite over opaque white
fn render_on_white(image: &DynamicImage, width: u32, height: u32) -> RgbImage {
    let resized;
    let source = if image.dimensions() == (width, height) {
        image
    } else {
        resized = image.resize_exact(width, height, FilterType::Triangle);
        &resized
    };

    let rgba = source.to_rgba8();
    RgbImage::from_fn(width, height, |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

fn encode_jpeg(canvas: &RgbImage, quality: u8) -> Result<Vec<u8>, OptimizeError> {
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    canvas.write_with_encoder(encoder)?;
    Ok(bytes)
}
